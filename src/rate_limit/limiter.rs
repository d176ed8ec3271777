//! Token Bucket Limiter
//!
//! Bucket capacity is one token, refilled at the configured rate. Instead of
//! counting tokens the limiter tracks the instant the next token becomes
//! available, which makes each `acquire` a single reservation under the lock.

use crate::cancel::CancelToken;
use crate::gitlab::ApiError;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Upper bound on the configured rate (requests per second)
pub const MAX_REQUESTS_PER_SECOND: f64 = 100.0;

/// Rate limiter shared by every outbound request
#[derive(Debug)]
pub struct RateLimiter {
    /// Effective rate after clamping
    rate: f64,

    /// Time between two tokens
    interval: Duration,

    /// Earliest instant the next token is available
    next_slot: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Create a limiter allowing `requests_per_second`
    ///
    /// Rates above [`MAX_REQUESTS_PER_SECOND`] are reduced to it.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidConfig`] for zero, negative or non-finite rates.
    pub fn new(requests_per_second: f64) -> Result<Self, ApiError> {
        if !requests_per_second.is_finite() || requests_per_second <= 0.0 {
            return Err(ApiError::InvalidConfig(format!(
                "requests per second must be a positive number, got {}",
                requests_per_second
            )));
        }

        let rate = requests_per_second.min(MAX_REQUESTS_PER_SECOND);
        Ok(Self {
            rate,
            interval: Duration::from_secs_f64(1.0 / rate),
            next_slot: Mutex::new(None),
        })
    }

    /// Effective requests per second
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Time between two requests at the effective rate
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait for one request slot
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Canceled`] if `cancel` fires before the slot is
    /// reached. The slot is handed back when no later reservation was made.
    pub async fn acquire(&self, cancel: &CancelToken) -> Result<(), ApiError> {
        if cancel.is_canceled() {
            return Err(ApiError::Canceled);
        }

        let slot = self.reserve();
        if slot <= Instant::now() {
            return Ok(());
        }

        tokio::select! {
            biased;
            _ = cancel.canceled() => {
                self.release(slot);
                Err(ApiError::Canceled)
            }
            _ = tokio::time::sleep_until(slot) => Ok(()),
        }
    }

    fn reserve(&self) -> Instant {
        let mut next = self.next_slot.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        let slot = match *next {
            Some(t) if t > now => t,
            _ => now,
        };
        *next = Some(slot + self.interval);
        slot
    }

    fn release(&self, slot: Instant) {
        let mut next = self.next_slot.lock().unwrap_or_else(|e| e.into_inner());
        if *next == Some(slot + self.interval) {
            *next = Some(slot);
        }
    }
}
