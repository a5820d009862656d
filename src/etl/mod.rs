//! The leg derivation and aggregation pipeline.

pub mod aggregate;
pub mod cleaner;
pub mod direction;
pub mod job;
pub mod legs;
pub mod partitioning;
