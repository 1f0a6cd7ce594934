use crate::budget::BYTES_PER_MB;
use crate::decode::{DEFAULT_IMAGE_TTL, DEFAULT_MAX_DECODE_DIMENSION};
use crate::error::ConfigError;
use crate::preload::DEFAULT_PRELOAD_DISTANCE;
use crate::render_cache::DEFAULT_RENDER_CACHE_CAPACITY;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables for one chat list and its image pipeline.
///
/// Every field has a default, so a JSON document only needs the keys it
/// overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListConfig {
    /// Rendered items kept in the render cache.
    pub max_cache_size: usize,
    /// Lists longer than this are diffed off the calling task.
    pub diff_threshold: usize,
    pub background_diff: bool,
    /// How long to wait for a worker reply before diffing inline. `None`
    /// waits indefinitely.
    pub diff_worker_timeout_ms: Option<u64>,
    pub animation_clear_ms: u64,
    pub scroll_settle_ms: u64,
    /// Grace period before gallery images outside the window are disposed.
    pub cleanup_delay_seconds: u64,
    pub max_memory_mb: u64,
    pub preload_distance: usize,
    pub image_ttl_seconds: u64,
    pub max_cached_images: usize,
    pub max_decode_dimension: u32,
}

impl Default for ListConfig {
    fn default() -> Self {
        Self {
            max_cache_size: DEFAULT_RENDER_CACHE_CAPACITY,
            diff_threshold: 100,
            background_diff: true,
            diff_worker_timeout_ms: Some(2000),
            animation_clear_ms: 300,
            scroll_settle_ms: 100,
            cleanup_delay_seconds: 10,
            max_memory_mb: 150,
            preload_distance: DEFAULT_PRELOAD_DISTANCE,
            image_ttl_seconds: DEFAULT_IMAGE_TTL.as_secs(),
            max_cached_images: 100,
            max_decode_dimension: DEFAULT_MAX_DECODE_DIMENSION,
        }
    }
}

impl ListConfig {
    /// Parse and validate a JSON document.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        fn non_zero(field: &'static str, value: u64) -> Result<(), ConfigError> {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must be greater than zero".to_string(),
                });
            }
            Ok(())
        }

        non_zero("max_cache_size", self.max_cache_size as u64)?;
        non_zero("max_memory_mb", self.max_memory_mb)?;
        non_zero("max_cached_images", self.max_cached_images as u64)?;
        non_zero("max_decode_dimension", u64::from(self.max_decode_dimension))?;
        non_zero("image_ttl_seconds", self.image_ttl_seconds)?;
        if self.diff_worker_timeout_ms == Some(0) {
            return Err(ConfigError::Invalid {
                field: "diff_worker_timeout_ms",
                reason: "use null to wait indefinitely".to_string(),
            });
        }
        Ok(())
    }

    pub fn animation_clear_delay(&self) -> Duration {
        Duration::from_millis(self.animation_clear_ms)
    }

    pub fn scroll_settle_delay(&self) -> Duration {
        Duration::from_millis(self.scroll_settle_ms)
    }

    pub fn cleanup_delay(&self) -> Duration {
        Duration::from_secs(self.cleanup_delay_seconds)
    }

    pub fn diff_worker_timeout(&self) -> Option<Duration> {
        self.diff_worker_timeout_ms.map(Duration::from_millis)
    }

    pub fn image_ttl(&self) -> Duration {
        Duration::from_secs(self.image_ttl_seconds)
    }

    pub fn max_memory_bytes(&self) -> u64 {
        self.max_memory_mb.saturating_mul(BYTES_PER_MB)
    }
}
