//! Domain types, ports, and errors shared by the resolver and the mining pipeline.

pub mod errors;
pub mod model;
pub mod oracle;
pub mod record;
