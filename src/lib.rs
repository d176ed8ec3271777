//! GitLab Container Registry Usage
//!
//! Walks every group visible to a GitLab token, lists the container
//! registries of each group, fetches tag details and reports the disk usage
//! per registry and per group.
//!
//! All GitLab traffic goes through a single rate limiter and every request
//! can be aborted with a shared cancellation signal.

pub mod cancel;
pub mod config;
pub mod gitlab;
pub mod logging;
pub mod rate_limit;
pub mod report;
pub mod usage;
