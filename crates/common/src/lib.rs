//! Shared types for the order write side.

mod types;

pub use types::AggregateId;
