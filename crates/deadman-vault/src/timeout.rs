//! Liveness timeout duration and its bounds.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Shortest allowed timeout: 1 hour
pub const MIN_TIMEOUT: u64 = 60 * 60;

/// Longest allowed timeout: 10 years
pub const MAX_TIMEOUT: u64 = 10 * 365 * SECS_PER_DAY;

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// Seconds without a ping before a vault becomes claimable.
///
/// Always within `[MIN_TIMEOUT, MAX_TIMEOUT]`; the bound is checked on
/// construction and on deserialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct Timeout(u64);

impl Timeout {
    /// Create a timeout from a number of seconds
    pub fn from_secs(secs: u64) -> Result<Self, ValidationError> {
        if !(MIN_TIMEOUT..=MAX_TIMEOUT).contains(&secs) {
            return Err(ValidationError::TimeoutOutOfBounds {
                secs,
                min: MIN_TIMEOUT,
                max: MAX_TIMEOUT,
            });
        }
        Ok(Self(secs))
    }

    /// Custom duration in days
    pub fn days(days: u64) -> Result<Self, ValidationError> {
        Self::from_secs(days.saturating_mul(SECS_PER_DAY))
    }

    /// 7 days
    pub fn one_week() -> Self {
        Self(7 * SECS_PER_DAY)
    }

    /// 30 days
    pub fn one_month() -> Self {
        Self(30 * SECS_PER_DAY)
    }

    /// 90 days
    pub fn three_months() -> Self {
        Self(90 * SECS_PER_DAY)
    }

    /// 180 days
    pub fn six_months() -> Self {
        Self(180 * SECS_PER_DAY)
    }

    /// 365 days
    pub fn one_year() -> Self {
        Self(365 * SECS_PER_DAY)
    }

    pub fn secs(&self) -> u64 {
        self.0
    }
}

impl TryFrom<u64> for Timeout {
    type Error = ValidationError;

    fn try_from(secs: u64) -> Result<Self, Self::Error> {
        Self::from_secs(secs)
    }
}

impl From<Timeout> for u64 {
    fn from(timeout: Timeout) -> Self {
        timeout.0
    }
}
