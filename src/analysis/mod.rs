//! Rollups and batch-wide summaries over validated snapshots.

pub mod rollup;
pub mod services;
pub mod stats;

pub use rollup::{aggregate, AggregateInsight};
pub use services::ServiceStatusSummary;
