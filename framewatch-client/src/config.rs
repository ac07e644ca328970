/*
 * Copyright 2025 Security Union LLC
 *
 * Licensed under either of
 *
 * * Apache License, Version 2.0
 *   (http://www.apache.org/licenses/LICENSE-2.0)
 * * MIT license
 *   (http://opensource.org/licenses/MIT)
 *
 * at your option.
 *
 * Unless you explicitly state otherwise, any contribution intentionally
 * submitted for inclusion in the work by you, as defined in the Apache-2.0
 * license, shall be dual licensed as above, without any additional terms or
 * conditions.
 */

//! Session configuration.
//!
//! Every field has a default (500 ms discovery poll, one JPEG at 0.8 per
//! second, red-bordered overlay), so `CaptureConfig::default()` is what a
//! bare page attach uses. On wasm a config object can also be passed in from
//! JavaScript.

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_MEDIA_SELECTOR, LOCATOR_INTERVAL_MS, OVERLAY_BORDER, OVERLAY_ELEMENT_ID,
    OVERLAY_Z_INDEX, SAMPLE_INTERVAL_MS, VIEWPORT_RESYNC_THROTTLE_MS,
};
use crate::error::{CaptureError, Result};
use crate::snapshot::SnapshotEncoding;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// CSS selector for the media element; the first match wins.
    pub media_selector: String,
    pub locator: LocatorPolicy,
    pub sample_interval_ms: u32,
    pub encoding: SnapshotEncoding,
    pub overlay: OverlayStyle,
    /// Resynchronize on window resize and scroll. Off unless configured.
    pub viewport_resync: Option<ViewportResync>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            media_selector: DEFAULT_MEDIA_SELECTOR.to_string(),
            locator: LocatorPolicy::default(),
            sample_interval_ms: SAMPLE_INTERVAL_MS,
            encoding: SnapshotEncoding::default(),
            overlay: OverlayStyle::default(),
            viewport_resync: None,
        }
    }
}

impl CaptureConfig {
    /// Parses a (possibly partial) JSON config and validates it.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| CaptureError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.media_selector.trim().is_empty() {
            return Err(CaptureError::InvalidConfig(
                "media_selector must not be empty".into(),
            ));
        }
        if self.sample_interval_ms == 0 {
            return Err(CaptureError::InvalidConfig(
                "sample_interval_ms must be positive".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.encoding.quality) {
            return Err(CaptureError::InvalidConfig(format!(
                "encoding.quality {} is outside 0.0..=1.0",
                self.encoding.quality
            )));
        }
        if self.overlay.element_id.trim().is_empty() {
            return Err(CaptureError::InvalidConfig(
                "overlay.element_id must not be empty".into(),
            ));
        }
        if let Some(resync) = &self.viewport_resync {
            if resync.throttle_ms == 0 {
                return Err(CaptureError::InvalidConfig(
                    "viewport_resync.throttle_ms must be positive".into(),
                ));
            }
        }
        self.locator.validate()
    }
}

/// How the locator retries while the media element is absent.
///
/// The defaults poll every 500 ms forever. `backoff_factor > 1` stretches the
/// delay after every miss up to `max_interval_ms` (raised to `interval_ms`
/// when lower); `max_attempts` bounds the search.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocatorPolicy {
    pub interval_ms: u32,
    pub backoff_factor: f64,
    pub max_interval_ms: u32,
    pub max_attempts: Option<u32>,
}

impl Default for LocatorPolicy {
    fn default() -> Self {
        Self {
            interval_ms: LOCATOR_INTERVAL_MS,
            backoff_factor: 1.0,
            max_interval_ms: LOCATOR_INTERVAL_MS,
            max_attempts: None,
        }
    }
}

impl LocatorPolicy {
    pub fn validate(&self) -> Result<()> {
        if self.interval_ms == 0 {
            return Err(CaptureError::InvalidConfig(
                "locator.interval_ms must be positive".into(),
            ));
        }
        if !self.backoff_factor.is_finite() || self.backoff_factor < 1.0 {
            return Err(CaptureError::InvalidConfig(format!(
                "locator.backoff_factor {} must be >= 1.0",
                self.backoff_factor
            )));
        }
        if self.max_attempts == Some(0) {
            return Err(CaptureError::InvalidConfig(
                "locator.max_attempts must be positive when set".into(),
            ));
        }
        Ok(())
    }

    /// Backoff ceiling. Never below `interval_ms`, so a config that only
    /// raises the interval polls at that interval.
    pub fn effective_max_interval_ms(&self) -> u32 {
        self.max_interval_ms.max(self.interval_ms)
    }

    /// Delay before poll number `attempt` (1-based).
    pub fn delay_before(&self, attempt: u32) -> u32 {
        let exponent = attempt.saturating_sub(1) as i32;
        let delay = self.interval_ms as f64 * self.backoff_factor.powi(exponent);
        delay.min(self.effective_max_interval_ms() as f64) as u32
    }

    pub fn allows(&self, attempt: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempt <= max)
    }
}

/// Styling of the overlay node. Position, pointer transparency and stacking
/// are not configurable: they are what make it an overlay.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayStyle {
    /// Stable id annotation collaborators can use to find the node.
    pub element_id: String,
    pub z_index: i32,
    /// CSS border shorthand; makes the overlay visible when debugging alignment.
    pub border: String,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            element_id: OVERLAY_ELEMENT_ID.to_string(),
            z_index: OVERLAY_Z_INDEX,
            border: OVERLAY_BORDER.to_string(),
        }
    }
}

/// Coalesces bursts of resize/scroll events into one recompute per window.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewportResync {
    pub throttle_ms: u32,
}

impl Default for ViewportResync {
    fn default() -> Self {
        Self {
            throttle_ms: VIEWPORT_RESYNC_THROTTLE_MS,
        }
    }
}
