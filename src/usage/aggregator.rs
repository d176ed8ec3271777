//! Usage Aggregator
//!
//! Walks groups, then the registries of each group, then the tags of each
//! registry, and sums tag sizes into registry and group totals.
//!
//! Listing failures end the run. A failed tag detail fetch is reported and
//! counted as 0 bytes, except when the cause is cancellation. Totals saturate
//! at `u64::MAX`.

use super::events::{
    GroupUsage, RegistryUsage, RunSummary, TagFailure, TagUsage, UsageEvent, UsageSink,
};
use crate::cancel::CancelToken;
use crate::gitlab::{ApiError, ContainerRepository, Group, RegistryApi};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Path allow-lists; an empty list lets everything through
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Filters {
    /// Group paths to include
    pub groups: Vec<String>,

    /// Registry paths to include
    pub registries: Vec<String>,
}

impl Filters {
    /// Whether `group` passes the group allow-list
    pub fn allows_group(&self, group: &Group) -> bool {
        self.groups.is_empty() || self.groups.iter().any(|p| *p == group.path)
    }

    /// Whether `registry` passes the registry allow-list
    pub fn allows_registry(&self, registry: &ContainerRepository) -> bool {
        self.registries.is_empty() || self.registries.iter().any(|p| *p == registry.path)
    }
}

/// Drives a full usage traversal over a [`RegistryApi`]
pub struct UsageAggregator<A> {
    api: A,
    filters: Filters,
}

impl<A: RegistryApi> UsageAggregator<A> {
    /// Create an aggregator over `api`
    pub fn new(api: A, filters: Filters) -> Self {
        Self { api, filters }
    }

    /// The underlying API client
    pub fn api(&self) -> &A {
        &self.api
    }

    /// Run one complete traversal, streaming events into `sink`
    ///
    /// # Errors
    ///
    /// Returns the first fatal error: a failed group or registry listing, or
    /// cancellation at any point.
    pub async fn run<S>(&self, cancel: &CancelToken, sink: &mut S) -> Result<RunSummary, ApiError>
    where
        S: UsageSink + ?Sized,
    {
        let groups = self.api.list_groups(cancel).await.into_result()?;
        info!("Found {} groups", groups.len());

        let mut summary = RunSummary::default();
        for group in &groups {
            if !self.filters.allows_group(group) {
                debug!("Skipping group {}", group.path);
                continue;
            }

            let usage = self.group_usage(cancel, group, sink, &mut summary).await?;
            info!(
                "Group {}: {} registries, {} bytes",
                usage.group, usage.registries, usage.total_size
            );
            summary.groups += 1;
            summary.total_size = summary.total_size.saturating_add(usage.total_size);
            sink.emit(UsageEvent::Group(usage));
        }

        Ok(summary)
    }

    async fn group_usage<S>(
        &self,
        cancel: &CancelToken,
        group: &Group,
        sink: &mut S,
        summary: &mut RunSummary,
    ) -> Result<GroupUsage, ApiError>
    where
        S: UsageSink + ?Sized,
    {
        let registries = self
            .api
            .list_registries_in_group(cancel, group)
            .await
            .into_result()?;
        debug!("Group {} has {} registries", group.path, registries.len());

        let mut usage = GroupUsage {
            group: group.path.clone(),
            group_id: group.id,
            name: group.name.clone(),
            registries: 0,
            total_size: 0,
        };

        for mut registry in registries {
            if !self.filters.allows_registry(&registry) {
                debug!("Skipping registry {}", registry.path);
                continue;
            }

            let registry_usage = self
                .registry_usage(cancel, group, &mut registry, sink, summary)
                .await?;
            info!(
                "Registry {}: {} tags, {} bytes",
                registry_usage.registry, registry_usage.tags, registry_usage.total_size
            );
            usage.registries += 1;
            usage.total_size = usage.total_size.saturating_add(registry_usage.total_size);
            summary.registries += 1;
            sink.emit(UsageEvent::Registry(registry_usage));
        }

        Ok(usage)
    }

    async fn registry_usage<S>(
        &self,
        cancel: &CancelToken,
        group: &Group,
        registry: &mut ContainerRepository,
        sink: &mut S,
        summary: &mut RunSummary,
    ) -> Result<RegistryUsage, ApiError>
    where
        S: UsageSink + ?Sized,
    {
        let mut usage = RegistryUsage {
            group: group.path.clone(),
            registry: registry.path.clone(),
            registry_id: registry.id,
            project_id: registry.project_id,
            tags: 0,
            failed_tags: 0,
            total_size: 0,
        };

        // Enrich the stored elements, then put them back on the registry.
        let mut tags = std::mem::take(&mut registry.tags);
        let mut canceled = None;
        for tag in tags.iter_mut() {
            usage.tags += 1;
            summary.tags += 1;

            match self.api.get_registry_tag_info(cancel, registry, tag).await {
                Ok(()) => {
                    usage.total_size = usage.total_size.saturating_add(tag.total_size);
                    sink.emit(UsageEvent::Tag(TagUsage {
                        group: group.path.clone(),
                        registry: registry.path.clone(),
                        tag: tag.clone(),
                    }));
                }
                Err(err) if err.is_canceled() => {
                    canceled = Some(err);
                    break;
                }
                Err(err) => {
                    warn!("Skipping tag {} of {}: {}", tag.name, registry.path, err);
                    usage.failed_tags += 1;
                    summary.failed_tags += 1;
                    sink.emit(UsageEvent::TagFailed(TagFailure {
                        group: group.path.clone(),
                        registry: registry.path.clone(),
                        tag: tag.name.clone(),
                        error: err.to_string(),
                    }));
                }
            }
        }
        registry.tags = tags;

        match canceled {
            Some(err) => Err(err),
            None => Ok(usage),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel;
    use crate::gitlab::{Listing, Tag, TagDetails, Visibility};
    use reqwest::{Method, StatusCode};
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// In-memory GitLab: tag sizes by tag name, `None` makes the fetch fail
    #[derive(Default)]
    struct FakeGitlab {
        groups: Vec<Group>,
        registries: HashMap<i64, Vec<ContainerRepository>>,
        tag_sizes: HashMap<String, Option<u64>>,
        fail_groups: bool,
        cancel_on_tag: Option<String>,
        calls: RefCell<Vec<String>>,
    }

    impl FakeGitlab {
        fn group(mut self, id: i64, path: &str) -> Self {
            self.groups.push(Group {
                id,
                name: path.to_uppercase(),
                path: path.to_string(),
                visibility: Visibility::Private,
            });
            self
        }

        fn registry(mut self, group_id: i64, id: i64, path: &str, tags: &[(&str, Option<u64>)]) -> Self {
            let stubs = tags
                .iter()
                .map(|(name, _)| Tag {
                    name: name.to_string(),
                    path: format!("{}:{}", path, name),
                    ..Tag::default()
                })
                .collect::<Vec<_>>();
            for (name, size) in tags {
                self.tag_sizes.insert(name.to_string(), *size);
            }
            self.registries.entry(group_id).or_default().push(ContainerRepository {
                id,
                name: String::new(),
                path: path.to_string(),
                project_id: id * 10,
                location: String::new(),
                created_at: String::new(),
                cleanup_policy_started_at: String::new(),
                tags_count: stubs.len() as i64,
                tags: stubs,
            });
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.borrow().clone()
        }
    }

    impl RegistryApi for FakeGitlab {
        async fn list_groups(&self, _cancel: &CancelToken) -> Listing<Group> {
            self.calls.borrow_mut().push("groups".to_string());
            if self.fail_groups {
                return Listing {
                    items: self.groups.clone(),
                    error: Some(
                        ApiError::Status {
                            status: StatusCode::UNAUTHORIZED,
                            method: Method::GET,
                            url: "https://git.example.com/api/v4/groups".into(),
                        }
                        .context("listing groups"),
                    ),
                };
            }
            Listing {
                items: self.groups.clone(),
                error: None,
            }
        }

        async fn list_registries_in_group(
            &self,
            _cancel: &CancelToken,
            group: &Group,
        ) -> Listing<ContainerRepository> {
            self.calls.borrow_mut().push(format!("registries:{}", group.path));
            Listing {
                items: self.registries.get(&group.id).cloned().unwrap_or_default(),
                error: None,
            }
        }

        async fn get_registry_tag_info(
            &self,
            _cancel: &CancelToken,
            registry: &ContainerRepository,
            tag: &mut Tag,
        ) -> Result<(), ApiError> {
            self.calls
                .borrow_mut()
                .push(format!("tag:{}:{}", registry.path, tag.name));
            if self.cancel_on_tag.as_deref() == Some(tag.name.as_str()) {
                return Err(ApiError::Canceled.context("getting tag details"));
            }
            match self.tag_sizes.get(&tag.name).copied().flatten() {
                Some(size) => {
                    tag.merge(TagDetails {
                        total_size: Some(size),
                        ..TagDetails::default()
                    });
                    Ok(())
                }
                None => Err(ApiError::Status {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    method: Method::GET,
                    url: format!("tags/{}", tag.name),
                }
                .context(format!(
                    "getting tag details for container repository {}",
                    tag.path
                ))),
            }
        }
    }

    fn registry_totals(events: &[UsageEvent]) -> Vec<(String, u64)> {
        events
            .iter()
            .filter_map(|e| match e {
                UsageEvent::Registry(r) => Some((r.registry.clone(), r.total_size)),
                _ => None,
            })
            .collect()
    }

    fn group_totals(events: &[UsageEvent]) -> Vec<(String, u64)> {
        events
            .iter()
            .filter_map(|e| match e {
                UsageEvent::Group(g) => Some((g.group.clone(), g.total_size)),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_registry_and_group_totals() {
        let api = FakeGitlab::default()
            .group(1, "teamA")
            .registry(1, 11, "teamA/app", &[("a1", Some(10)), ("a2", Some(20))])
            .registry(1, 12, "teamA/db", &[("b1", Some(5))]);
        let aggregator = UsageAggregator::new(api, Filters::default());

        let mut events = Vec::new();
        let summary = aggregator.run(&CancelToken::never(), &mut events).await.unwrap();

        assert_eq!(
            registry_totals(&events),
            vec![("teamA/app".to_string(), 30), ("teamA/db".to_string(), 5)]
        );
        assert_eq!(group_totals(&events), vec![("teamA".to_string(), 35)]);
        assert_eq!(
            summary,
            RunSummary {
                groups: 1,
                registries: 2,
                tags: 3,
                failed_tags: 0,
                total_size: 35,
            }
        );
    }

    #[tokio::test]
    async fn test_totals_saturate_on_huge_sizes() {
        let huge = u64::MAX / 2 + 1;
        let api = FakeGitlab::default()
            .group(1, "teamA")
            .registry(1, 11, "teamA/app", &[("big1", Some(huge)), ("big2", Some(huge))])
            .group(2, "teamB")
            .registry(2, 21, "teamB/app", &[("big3", Some(huge))]);
        let aggregator = UsageAggregator::new(api, Filters::default());

        let mut events = Vec::new();
        let summary = aggregator.run(&CancelToken::never(), &mut events).await.unwrap();

        assert_eq!(
            registry_totals(&events),
            vec![("teamA/app".to_string(), u64::MAX), ("teamB/app".to_string(), huge)]
        );
        assert_eq!(
            group_totals(&events),
            vec![("teamA".to_string(), u64::MAX), ("teamB".to_string(), huge)]
        );
        assert_eq!(summary.total_size, u64::MAX);
        assert_eq!(summary.tags, 3);
        assert_eq!(summary.failed_tags, 0);
    }

    #[tokio::test]
    async fn test_events_stream_in_traversal_order() {
        let api = FakeGitlab::default()
            .group(1, "teamA")
            .registry(1, 11, "teamA/app", &[("a1", Some(1)), ("a2", Some(2))])
            .registry(1, 12, "teamA/db", &[("b1", Some(3))]);
        let aggregator = UsageAggregator::new(api, Filters::default());

        let mut events = Vec::new();
        aggregator.run(&CancelToken::never(), &mut events).await.unwrap();

        let kinds: Vec<&str> = events
            .iter()
            .map(|e| match e {
                UsageEvent::Tag(_) => "tag",
                UsageEvent::TagFailed(_) => "tag_failed",
                UsageEvent::Registry(_) => "registry",
                UsageEvent::Group(_) => "group",
            })
            .collect();
        assert_eq!(kinds, vec!["tag", "tag", "registry", "tag", "registry", "group"]);
    }

    #[tokio::test]
    async fn test_failed_tag_counts_as_zero() {
        let api = FakeGitlab::default().group(1, "teamA").registry(
            1,
            11,
            "teamA/app",
            &[("ok1", Some(100)), ("broken", None), ("ok2", Some(50))],
        );
        let aggregator = UsageAggregator::new(api, Filters::default());

        let mut events = Vec::new();
        let summary = aggregator.run(&CancelToken::never(), &mut events).await.unwrap();

        assert_eq!(registry_totals(&events), vec![("teamA/app".to_string(), 150)]);
        assert_eq!(summary.failed_tags, 1);
        assert_eq!(summary.tags, 3);

        let failure = events
            .iter()
            .find_map(|e| match e {
                UsageEvent::TagFailed(f) => Some(f.clone()),
                _ => None,
            })
            .expect("failed tag should be reported");
        assert_eq!(failure.tag, "broken");
        assert!(failure.error.contains("500"));
        assert!(failure.error.contains("teamA/app:broken"));

        // processing continued after the failure
        assert!(aggregator.api().calls().contains(&"tag:teamA/app:ok2".to_string()));
    }

    #[tokio::test]
    async fn test_group_allow_list_skips_other_groups() {
        let api = FakeGitlab::default()
            .group(1, "teamA")
            .group(2, "teamB")
            .registry(1, 11, "teamA/app", &[("a1", Some(1))])
            .registry(2, 21, "teamB/app", &[("b1", Some(1))]);
        let filters = Filters {
            groups: vec!["teamA".to_string()],
            registries: vec![],
        };
        let aggregator = UsageAggregator::new(api, filters);

        let mut events = Vec::new();
        let summary = aggregator.run(&CancelToken::never(), &mut events).await.unwrap();

        let calls = aggregator.api().calls();
        assert!(calls.contains(&"registries:teamA".to_string()));
        assert!(!calls.contains(&"registries:teamB".to_string()));
        assert_eq!(summary.groups, 1);
        assert_eq!(group_totals(&events), vec![("teamA".to_string(), 1)]);
    }

    #[tokio::test]
    async fn test_registry_allow_list() {
        let api = FakeGitlab::default()
            .group(1, "teamA")
            .registry(1, 11, "teamA/app", &[("a1", Some(7))])
            .registry(1, 12, "teamA/db", &[("b1", Some(9))]);
        let filters = Filters {
            groups: vec![],
            registries: vec!["teamA/db".to_string()],
        };
        let aggregator = UsageAggregator::new(api, filters);

        let mut events = Vec::new();
        aggregator.run(&CancelToken::never(), &mut events).await.unwrap();

        assert_eq!(registry_totals(&events), vec![("teamA/db".to_string(), 9)]);
        assert!(!aggregator.api().calls().contains(&"tag:teamA/app:a1".to_string()));
    }

    #[test]
    fn test_filter_is_exact_match() {
        let group = Group {
            id: 1,
            name: "A".into(),
            path: "teamA-extra".into(),
            visibility: Visibility::Public,
        };
        let filters = Filters {
            groups: vec!["teamA".into(), "team*".into()],
            registries: vec![],
        };
        assert!(!filters.allows_group(&group));
        assert!(Filters::default().allows_group(&group));
    }

    #[tokio::test]
    async fn test_group_listing_failure_is_fatal() {
        let mut api = FakeGitlab::default().group(1, "teamA");
        api.fail_groups = true;
        let aggregator = UsageAggregator::new(api, Filters::default());

        let mut events = Vec::new();
        let err = aggregator
            .run(&CancelToken::never(), &mut events)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("listing groups"));
        assert_eq!(err.status(), Some(StatusCode::UNAUTHORIZED));
        assert!(events.is_empty());
        assert_eq!(aggregator.api().calls(), vec!["groups".to_string()]);
    }

    #[tokio::test]
    async fn test_cancellation_during_tag_is_fatal() {
        let mut api = FakeGitlab::default()
            .group(1, "teamA")
            .group(2, "teamB")
            .registry(1, 11, "teamA/app", &[("a1", Some(1)), ("a2", Some(2)), ("a3", Some(3))])
            .registry(2, 21, "teamB/app", &[("b1", Some(1))]);
        api.cancel_on_tag = Some("a2".to_string());
        let aggregator = UsageAggregator::new(api, Filters::default());

        let mut events = Vec::new();
        let err = aggregator
            .run(&CancelToken::never(), &mut events)
            .await
            .unwrap_err();

        assert!(err.is_canceled());
        assert!(group_totals(&events).is_empty());
        let calls = aggregator.api().calls();
        assert!(!calls.contains(&"tag:teamA/app:a3".to_string()));
        assert!(!calls.contains(&"registries:teamB".to_string()));
    }

    #[tokio::test]
    async fn test_channel_sink_receives_events() {
        let api = FakeGitlab::default()
            .group(1, "teamA")
            .registry(1, 11, "teamA/app", &[("a1", Some(4))]);
        let aggregator = UsageAggregator::new(api, Filters::default());
        let (_handle, token) = cancel::channel();

        let (mut tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        aggregator.run(&token, &mut tx).await.unwrap();
        drop(tx);

        let mut received = Vec::new();
        while let Some(event) = rx.recv().await {
            received.push(event);
        }
        assert_eq!(received.len(), 3);
        assert_eq!(group_totals(&received), vec![("teamA".to_string(), 4)]);
    }

    #[tokio::test]
    async fn test_group_without_registries() {
        let api = FakeGitlab::default().group(1, "empty");
        let aggregator = UsageAggregator::new(api, Filters::default());

        let mut events = Vec::new();
        let summary = aggregator.run(&CancelToken::never(), &mut events).await.unwrap();

        assert_eq!(group_totals(&events), vec![("empty".to_string(), 0)]);
        assert_eq!(summary.registries, 0);
    }
}
