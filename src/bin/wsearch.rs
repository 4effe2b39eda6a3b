//! `wsearch`: a small CLI driving [`wsearch_core::SearchService`] end to
//! end, for manual exercising of the engine outside of a host process.
//! Argument parsing follows the pack's own CLI teacher (`sharkdp-fd`
//! depends on `clap` for the identical job); the wire format printed with
//! `--json` matches spec §6 exactly, one item per line.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use wsearch_core::config::EngineConfig;
use wsearch_core::query::{ContentPattern, FolderQuery, GlobExpr, GlobRule, PreviewOptions, SearchQuery};
use wsearch_core::search::{SearchService, StreamItem};

/// Search one or more directory roots by file name, or by content when
/// `--content` is given.
#[derive(Parser, Debug)]
#[command(name = "wsearch", version, about)]
struct Cli {
    /// Root directories to search. Defaults to the current directory.
    #[arg(default_value = ".")]
    roots: Vec<PathBuf>,

    /// Fuzzy file-name pattern. With `--content`, filters candidate files
    /// by name in addition to the content match.
    #[arg(short = 'p', long = "pattern")]
    pattern: Option<String>,

    /// Content pattern; switches to text search.
    #[arg(short = 'e', long = "content")]
    content: Option<String>,

    /// Treat `--content` as a regular expression rather than a literal.
    #[arg(long)]
    regex: bool,

    /// Case-sensitive content matching (default: case-insensitive).
    #[arg(long)]
    case_sensitive: bool,

    /// Match whole words only.
    #[arg(long)]
    word_regexp: bool,

    /// Stop after this many results.
    #[arg(short = 'n', long)]
    max_results: Option<usize>,

    /// Glob to exclude, may be given multiple times.
    #[arg(long = "exclude")]
    excludes: Vec<String>,

    /// Glob to include, may be given multiple times.
    #[arg(long = "include")]
    includes: Vec<String>,

    /// Search files ignored by `.gitignore` too.
    #[arg(long)]
    no_ignore: bool,

    /// Follow symlinks while walking.
    #[arg(long)]
    follow_symlinks: bool,

    /// Rank file-search results by fuzzy score against `--pattern` instead
    /// of walk order.
    #[arg(long)]
    sort_by_score: bool,

    /// Emit each progress item as one JSON line (spec §6 wire format)
    /// instead of a bare path per line.
    #[arg(long)]
    json: bool,

    /// Path to the grep binary (`rg`) to invoke.
    #[arg(long, default_value = "rg")]
    grep_binary: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let query = build_query(&cli);
    let config = EngineConfig { grep_binary: cli.grep_binary.clone(), ..EngineConfig::default() };
    let service = SearchService::new(config);

    let (mut stream, handle) = service.search(query);

    let ctrl_c = tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        handle.cancel();
    });

    let mut exit_code = ExitCode::SUCCESS;
    while let Some(item) = stream.recv().await {
        match item {
            StreamItem::Match(m) => print_match(&cli, &m),
            StreamItem::Info(info) if cli.json => {
                println!("{}", serde_json::to_string(&info).unwrap_or_default());
            }
            StreamItem::Info(_) => {}
            StreamItem::Terminal(terminal) => {
                exit_code = print_terminal(&cli, &terminal);
            }
        }
    }

    ctrl_c.abort();
    exit_code
}

fn build_query(cli: &Cli) -> SearchQuery {
    let global_exclude = glob_expr(&cli.excludes);
    let global_include = glob_expr(&cli.includes);

    let folder_queries = cli
        .roots
        .iter()
        .map(|root| FolderQuery {
            root: root.clone(),
            exclude: GlobExpr::new(),
            include: GlobExpr::new(),
            encoding: None,
            disregard_ignore_files: cli.no_ignore,
        })
        .collect();

    let content = cli.content.as_ref().map(|pattern| ContentPattern {
        pattern: pattern.clone(),
        is_regex: cli.regex,
        is_case_sensitive: cli.case_sensitive,
        is_word_match: cli.word_regexp,
        word_separators: None,
    });

    SearchQuery {
        folder_queries,
        extra_files: Vec::new(),
        file_pattern: cli.pattern.clone(),
        global_exclude,
        global_include,
        max_results: cli.max_results,
        exists_only: false,
        max_filesize: None,
        sort_by_score: cli.sort_by_score,
        cache_key: None,
        follow_symlinks: cli.follow_symlinks,
        content,
        preview: PreviewOptions::default(),
    }
}

fn glob_expr(patterns: &[String]) -> GlobExpr {
    let mut expr = GlobExpr::new();
    for pattern in patterns {
        expr = expr.with(pattern.clone(), GlobRule::Always(true));
    }
    expr
}

fn print_match(cli: &Cli, m: &wsearch_core::MatchItem) {
    if cli.json {
        println!("{}", serde_json::to_string(m).unwrap_or_default());
        return;
    }
    match &m.matches {
        None => println!("{}", m.path),
        Some(matches) => {
            for pm in matches {
                println!("{}:{}: {}", m.path, pm.range.line + 1, pm.preview);
            }
        }
    }
}

fn print_terminal(cli: &Cli, terminal: &wsearch_core::Terminal) -> ExitCode {
    if cli.json {
        println!("{}", serde_json::to_string(terminal).unwrap_or_default());
    }
    match terminal {
        wsearch_core::Terminal::Success { limit_hit, stats } => {
            log::info!(
                "{} results in {}ms (limit_hit={limit_hit})",
                stats.result_count,
                stats.traversal_ms.max(stats.cmd_time_ms)
            );
            ExitCode::SUCCESS
        }
        wsearch_core::Terminal::Error { error } => {
            eprintln!("wsearch: {}", error.message);
            ExitCode::FAILURE
        }
    }
}
