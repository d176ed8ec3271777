//! GitLab REST API Client
//!
//! The client is organized into layers:
//!
//! 1. **Types** (`types`): groups, container repositories, tags
//! 2. **Pagination** (`pagination`): `link` header cursors and the page walker
//! 3. **Endpoint** (`endpoint`): authenticated, rate-limited request executor

pub mod endpoint;
pub mod error;
pub mod pagination;
pub mod types;

pub use endpoint::{normalize_base_url, Endpoint, RegistryApi, API_PREFIX};
pub use error::ApiError;
pub use pagination::{next_page, walk, Listing};
pub use types::{ContainerRepository, Group, Tag, TagDetails, Visibility};

#[cfg(test)]
mod proptests;
