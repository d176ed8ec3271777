//! Container Registry Usage
//!
//! Aggregates tag sizes into per-registry and per-group totals and streams the
//! results to a [`UsageSink`].

pub mod aggregator;
pub mod events;

pub use aggregator::{Filters, UsageAggregator};
pub use events::{
    GroupUsage, RegistryUsage, RunSummary, TagFailure, TagUsage, UsageEvent, UsageSink,
};
