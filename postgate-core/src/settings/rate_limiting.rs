use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("Flood protection configuration error: {message}")]
pub struct FloodProtectionValidationError {
    pub message: String,
}

/// IP-keyed request ceiling in front of the whole API.
///
/// This is independent from the per-identity call budget: it only protects
/// the process against request floods from a single address.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct TierConfig {
    /// Maximum requests per minute, 0 disables the tier
    #[serde(default)]
    pub requests_per_minute: u64,

    #[serde(default)]
    pub burst_size: u32,
}

impl TierConfig {
    pub fn is_enabled(&self) -> bool {
        self.requests_per_minute > 0
    }

    pub fn validate(&self) -> Result<(), FloodProtectionValidationError> {
        let fail = |message: String| Err(FloodProtectionValidationError { message });

        if self.requests_per_minute == 0 && self.burst_size > 0 {
            return fail("burst_size must be 0 when requests_per_minute is 0".to_string());
        }
        if self.requests_per_minute > 0 && self.burst_size == 0 {
            return fail("burst_size must be greater than 0 when enabled".to_string());
        }
        if self.burst_size as u64 > self.requests_per_minute {
            return fail(format!(
                "burst_size ({}) should not exceed requests_per_minute ({})",
                self.burst_size, self.requests_per_minute
            ));
        }
        Ok(())
    }

    /// Interval at which one request slot is replenished.
    pub fn replenish_interval_ms(&self) -> u64 {
        if self.requests_per_minute == 0 {
            return 0;
        }
        (60_000 / self.requests_per_minute).max(1)
    }
}
