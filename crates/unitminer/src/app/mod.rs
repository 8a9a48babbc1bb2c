//! Application layer: unit resolution algorithms and the mining pipeline.

pub mod batch;
pub mod boundary;
pub mod class_unit;
pub mod context;
pub mod extract;
pub mod filter;
pub mod job;
pub mod lines;
pub mod mapper;
pub mod normalize;

#[cfg(test)]
pub(crate) mod test_support;
