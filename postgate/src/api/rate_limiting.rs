//! Flood protection in front of the API routes.
//!
//! Independent of the per-identity call budget the pipeline enforces, this
//! caps how fast a single client address may hit the server at all.

use std::sync::Arc;

use anyhow::anyhow;
use governor::middleware::NoOpMiddleware;
use postgate_core::settings::rate_limiting::TierConfig;
use tower_governor::governor::GovernorConfigBuilder;
use tower_governor::key_extractor::SmartIpKeyExtractor;
use tower_governor::GovernorLayer;

pub type FloodLimiter = GovernorLayer<SmartIpKeyExtractor, NoOpMiddleware, axum::body::Body>;

/// Builds the IP based limiter, `None` when flood protection is switched off.
pub fn create_flood_limiter(config: &TierConfig) -> anyhow::Result<Option<FloodLimiter>> {
    if !config.is_enabled() {
        return Ok(None);
    }
    config.validate()?;

    let governor_config = GovernorConfigBuilder::default()
        .per_millisecond(config.replenish_interval_ms())
        .burst_size(config.burst_size)
        .key_extractor(SmartIpKeyExtractor)
        .finish()
        .ok_or_else(|| anyhow!("invalid flood protection config"))?;

    Ok(Some(GovernorLayer::new(Arc::new(governor_config))))
}
