//! Fixture-tree integration tests driving [`SearchService`] end to end
//! against a real, temporary directory tree (spec §8's scenarios).
//!
//! Every test forces the native backend (`max_filesize: Some(u64::MAX)`,
//! spec §4.3's own trigger for it) so these tests are hermetic regardless of
//! whether `rg`/`find` are installed on the machine that runs them. The
//! post-filter path they exercise (`GlobMatcher` + `DirectoryTree`) is the
//! same one the grep-files and posix-find backends share, which is covered
//! directly by `glob_matcher.rs`'s and `directory_tree.rs`'s own unit tests,
//! and `grep/driver.rs`'s unit tests cover the external-process argv side.

use test_case::test_case;
use wsearch_core::config::EngineConfig;
use wsearch_core::query::{FolderQuery, GlobExpr, GlobRule, SearchQuery};
use wsearch_core::search::{SearchService, StreamItem};
use wsearch_core::{MatchItem, Terminal};

fn write_files(dir: &std::path::Path, files: &[(&str, &str)]) {
    for (name, content) in files {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }
}

fn force_native(query: &mut SearchQuery) {
    query.max_filesize = Some(u64::MAX);
}

async fn drain(service: &SearchService, query: SearchQuery) -> (Vec<MatchItem>, Terminal) {
    let (mut rx, _handle) = service.search(query);
    let mut matches = Vec::new();
    loop {
        match rx.recv().await.expect("stream ended without a terminal item") {
            StreamItem::Match(m) => matches.push(m),
            StreamItem::Info(_) => {}
            StreamItem::Terminal(t) => return (matches, t),
        }
    }
}

#[tokio::test]
async fn multi_root_include_and_max_results_caps_at_one() {
    // Scenario 3 (spec §8): two roots each with one `.txt` and one `.js`,
    // includePattern={*.txt:true,*.js:true}, maxResults=1 -> exactly 1
    // result and limitHit:true.
    let root_a = tempfile::tempdir().unwrap();
    let root_b = tempfile::tempdir().unwrap();
    write_files(root_a.path(), &[("notes.txt", "a"), ("app.js", "b")]);
    write_files(root_b.path(), &[("readme.txt", "a"), ("index.js", "b")]);

    let include = GlobExpr::new()
        .with("*.txt", GlobRule::Always(true))
        .with("*.js", GlobRule::Always(true));

    let service = SearchService::new(EngineConfig::default());
    let mut query = SearchQuery {
        folder_queries: vec![FolderQuery::new(root_a.path()), FolderQuery::new(root_b.path())],
        global_include: include,
        max_results: Some(1),
        ..SearchQuery::default()
    };
    force_native(&mut query);

    let (matches, terminal) = drain(&service, query).await;
    assert_eq!(matches.len(), 1);
    match terminal {
        Terminal::Success { limit_hit, stats } => {
            assert!(limit_hit);
            assert_eq!(stats.result_count, 1);
        }
        Terminal::Error { error } => panic!("unexpected error: {}", error.message),
    }
}

#[tokio::test]
async fn exists_only_stops_after_the_first_match() {
    // Scenario 4 (spec §8): `exists:true` on the same roots/includes — the
    // walk budget caps emission at one slot and reports limitHit, the same
    // reservation mechanism `maxResults=1` uses (`WalkBudget::reserve`).
    let root_a = tempfile::tempdir().unwrap();
    let root_b = tempfile::tempdir().unwrap();
    write_files(root_a.path(), &[("notes.txt", "a"), ("app.js", "b")]);
    write_files(root_b.path(), &[("readme.txt", "a"), ("index.js", "b")]);

    let include = GlobExpr::new()
        .with("*.txt", GlobRule::Always(true))
        .with("*.js", GlobRule::Always(true));

    let service = SearchService::new(EngineConfig::default());
    let mut query = SearchQuery {
        folder_queries: vec![FolderQuery::new(root_a.path()), FolderQuery::new(root_b.path())],
        global_include: include,
        exists_only: true,
        ..SearchQuery::default()
    };
    force_native(&mut query);

    let (matches, terminal) = drain(&service, query).await;
    assert_eq!(matches.len(), 1);
    match terminal {
        Terminal::Success { limit_hit, .. } => assert!(limit_hit),
        Terminal::Error { error } => panic!("unexpected error: {}", error.message),
    }
}

#[tokio::test]
async fn sorted_ranking_orders_by_fuzzy_score() {
    // Scenario 5 (spec §8): files `bab, bbc, abb`, pattern "bb",
    // sortByScore:true, maxResults:2 -> [bbc, bab] in that order.
    let root = tempfile::tempdir().unwrap();
    write_files(root.path(), &[("bab", ""), ("bbc", ""), ("abb", "")]);

    let service = SearchService::new(EngineConfig::default());
    let mut query = SearchQuery {
        folder_queries: vec![FolderQuery::new(root.path())],
        file_pattern: Some("bb".to_string()),
        sort_by_score: true,
        max_results: Some(2),
        ..SearchQuery::default()
    };
    force_native(&mut query);

    let (matches, terminal) = drain(&service, query).await;
    let names: Vec<&str> =
        matches.iter().map(|m| m.path.rsplit('/').next().unwrap()).collect();
    assert_eq!(names, vec!["bbc", "bab"]);
    assert!(matches!(terminal, Terminal::Success { .. }));
}

#[tokio::test]
async fn cache_reuse_narrows_without_rewalking() {
    // Scenario 6 (spec §8): a cache row for "b" is reused (narrowed) by the
    // query "bc" rather than re-walked, then invalidated by `clear_cache`.
    let root = tempfile::tempdir().unwrap();
    write_files(root.path(), &[("bcb", ""), ("bbc", ""), ("aab", "")]);

    let service = SearchService::new(EngineConfig::default());
    let base_query = |pattern: &str| {
        let mut q = SearchQuery {
            folder_queries: vec![FolderQuery::new(root.path())],
            file_pattern: Some(pattern.to_string()),
            cache_key: Some("x".to_string()),
            ..SearchQuery::default()
        };
        force_native(&mut q);
        q
    };

    let (first, first_terminal) = drain(&service, base_query("b")).await;
    let first_names: std::collections::HashSet<_> =
        first.iter().map(|m| m.path.rsplit('/').next().unwrap().to_string()).collect();
    assert_eq!(
        first_names,
        ["bcb", "bbc", "aab"].into_iter().map(String::from).collect()
    );
    match first_terminal {
        Terminal::Success { stats, .. } => assert_eq!(stats.from_cache, Some(false)),
        Terminal::Error { error } => panic!("unexpected error: {}", error.message),
    }

    let (second, second_terminal) = drain(&service, base_query("bc")).await;
    let second_names: std::collections::HashSet<_> =
        second.iter().map(|m| m.path.rsplit('/').next().unwrap().to_string()).collect();
    assert_eq!(second_names, ["bcb", "bbc"].into_iter().map(String::from).collect());
    match second_terminal {
        Terminal::Success { stats, .. } => assert_eq!(stats.from_cache, Some(true)),
        Terminal::Error { error } => panic!("unexpected error: {}", error.message),
    }

    service.clear_cache("x");
    write_files(root.path(), &[("bc", "")]);

    let (third, third_terminal) = drain(&service, base_query("bc")).await;
    let third_names: std::collections::HashSet<_> =
        third.iter().map(|m| m.path.rsplit('/').next().unwrap().to_string()).collect();
    assert!(third_names.contains("bc"));
    match third_terminal {
        Terminal::Success { stats, .. } => assert_eq!(stats.from_cache, Some(false)),
        Terminal::Error { error } => panic!("unexpected error: {}", error.message),
    }
}

#[test_case(&[("a.js", ""), ("a.ts", "")], &[] ; "sibling ts present excludes the js")]
#[test_case(&[("b.js", "")], &["b.js"] ; "no sibling ts keeps the js")]
#[test_case(&[("c.js", ""), ("c.ts", ""), ("d.js", "")], &["d.js"] ; "only the unsidled js survives")]
#[tokio::test]
async fn sibling_dependent_exclude_depends_on_directory_context(
    files: &[(&str, &str)],
    expected_kept: &[&str],
) {
    // Regression coverage for the over-exclusion / under-exclusion bugs a
    // maintainer review found across all three walker backends: a rule
    // like `{"*.js": {when: "$(basename).ts"}}` must exclude a `.js` file
    // only when its `.ts` sibling actually exists next to it.
    let root = tempfile::tempdir().unwrap();
    write_files(root.path(), files);

    let exclude = GlobExpr::new()
        .with("*.js", GlobRule::WhenSiblingExists { pattern: "$(basename).ts".to_string() });

    let service = SearchService::new(EngineConfig::default());
    let mut query = SearchQuery {
        folder_queries: vec![FolderQuery::new(root.path())],
        global_exclude: exclude,
        ..SearchQuery::default()
    };
    force_native(&mut query);

    let (matches, _terminal) = drain(&service, query).await;
    let mut kept: Vec<&str> =
        matches.iter().map(|m| m.path.rsplit('/').next().unwrap()).collect();
    kept.sort_unstable();
    let mut expected = expected_kept.to_vec();
    expected.sort_unstable();
    assert_eq!(kept, expected);
}
