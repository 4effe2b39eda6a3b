//! Text search's grep-backed engine: the parser (C4) decoding a child
//! process's colorized output, and the driver (C5) that spawns and manages
//! that child.

pub mod driver;
pub mod parser;
