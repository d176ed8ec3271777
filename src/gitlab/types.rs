//! GitLab API Resource Types
//!
//! Wire types for the groups and container registry endpoints.
//!
//! Gitlab docs:
//! - https://docs.gitlab.com/ee/api/groups.html#list-groups
//! - https://docs.gitlab.com/ee/api/container_registry.html#within-a-group
//! - https://docs.gitlab.com/ee/api/container_registry.html#get-details-of-a-registry-repository-tag

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Deserializer, Serialize};

/// Group visibility level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Internal,
    Private,
}

/// A GitLab group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: i64,
    pub name: String,
    pub path: String,
    pub visibility: Visibility,
}

/// A container registry (repository) inside a group's project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerRepository {
    pub id: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    pub path: String,
    pub project_id: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub location: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub created_at: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub cleanup_policy_started_at: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags_count: i64,
    /// Tag stubs listed inline with `?tags=1`
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<Tag>,
}

/// An image tag
///
/// Listed as a stub (name, path, location) and filled in by
/// [`Tag::merge`] with the tag detail response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub path: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_revision: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    #[serde(default, with = "rfc3339_nano")]
    pub created_at: Option<DateTime<FixedOffset>>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub total_size: u64,
}

/// Tag detail response; absent fields leave the stub untouched
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TagDetails {
    pub name: Option<String>,
    pub path: Option<String>,
    pub location: Option<String>,
    pub revision: Option<String>,
    pub short_revision: Option<String>,
    pub digest: Option<String>,
    #[serde(default, with = "rfc3339_nano")]
    pub created_at: Option<DateTime<FixedOffset>>,
    pub total_size: Option<u64>,
}

impl Tag {
    /// Apply a detail response to this tag in place
    pub fn merge(&mut self, details: TagDetails) {
        if let Some(name) = details.name {
            self.name = name;
        }
        if let Some(path) = details.path {
            self.path = path;
        }
        if let Some(location) = details.location {
            self.location = location;
        }
        if details.revision.is_some() {
            self.revision = details.revision;
        }
        if details.short_revision.is_some() {
            self.short_revision = details.short_revision;
        }
        if details.digest.is_some() {
            self.digest = details.digest;
        }
        if details.created_at.is_some() {
            self.created_at = details.created_at;
        }
        if let Some(size) = details.total_size {
            self.total_size = size;
        }
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// RFC 3339 with 3, 6 or 9 fraction digits as needed, `Z` for UTC
mod rfc3339_nano {
    use chrono::{DateTime, FixedOffset, SecondsFormat};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<DateTime<FixedOffset>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(t) => serializer.serialize_str(&t.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<FixedOffset>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<String>::deserialize(deserializer)? {
            Some(s) if !s.is_empty() => DateTime::parse_from_rfc3339(&s)
                .map(Some)
                .map_err(serde::de::Error::custom),
            _ => Ok(None),
        }
    }
}
