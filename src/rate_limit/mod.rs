//! Outbound Rate Limiting
//!
//! A single token bucket gates every call to the GitLab API.
//!
//! # Features
//!
//! - Steady rate in requests per second, no burst beyond one request
//! - Hard ceiling of [`MAX_REQUESTS_PER_SECOND`]
//! - Waits are cancelable through [`CancelToken`](crate::cancel::CancelToken)
//! - Shareable between tasks behind an `Arc`

pub mod limiter;

pub use limiter::{RateLimiter, MAX_REQUESTS_PER_SECOND};
