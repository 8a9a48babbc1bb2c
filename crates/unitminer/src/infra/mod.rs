//! Infrastructure adapters for config, git, patches, logging, and the bundled oracle.

pub mod config;
pub mod git;
pub mod logging;
pub mod outline;
pub mod patch;
