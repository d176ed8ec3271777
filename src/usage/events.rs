//! Usage Events
//!
//! The aggregator streams results as they become available: one event per
//! enriched tag, per failed tag, per registry total and per group total.

use crate::gitlab::Tag;
use serde::Serialize;
use tokio::sync::mpsc;

/// A single usage result
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UsageEvent {
    /// A tag was enriched with its size
    Tag(TagUsage),

    /// A tag detail fetch failed; the tag counts as 0 bytes
    TagFailed(TagFailure),

    /// All tags of a registry were processed
    Registry(RegistryUsage),

    /// All registries of a group were processed
    Group(GroupUsage),
}

/// Size of one tag
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagUsage {
    /// Path of the owning group
    pub group: String,

    /// Path of the owning registry
    pub registry: String,

    /// The enriched tag
    pub tag: Tag,
}

/// A tag whose detail fetch failed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagFailure {
    pub group: String,
    pub registry: String,
    pub tag: String,
    pub error: String,
}

/// Total size of a registry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegistryUsage {
    pub group: String,
    pub registry: String,
    pub registry_id: i64,
    pub project_id: i64,

    /// Number of tags processed
    pub tags: usize,

    /// Tags whose detail fetch failed
    pub failed_tags: usize,

    /// Sum of the sizes of successfully enriched tags, in bytes
    pub total_size: u64,
}

/// Total size of a group
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupUsage {
    pub group: String,
    pub group_id: i64,
    pub name: String,

    /// Number of registries processed
    pub registries: usize,

    /// Sum of the registry totals, in bytes
    pub total_size: u64,
}

/// Totals over a whole run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub groups: usize,
    pub registries: usize,
    pub tags: usize,
    pub failed_tags: usize,
    pub total_size: u64,
}

/// Receiver of usage events
pub trait UsageSink {
    /// Handle one event; called in traversal order
    fn emit(&mut self, event: UsageEvent);
}

impl UsageSink for Vec<UsageEvent> {
    fn emit(&mut self, event: UsageEvent) {
        self.push(event);
    }
}

impl UsageSink for mpsc::UnboundedSender<UsageEvent> {
    fn emit(&mut self, event: UsageEvent) {
        if self.send(event).is_err() {
            tracing::debug!("Usage event receiver dropped, discarding event");
        }
    }
}
