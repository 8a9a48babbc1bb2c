//! User-facing command line layer.

pub mod cli;
