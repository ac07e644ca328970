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

//! Off-screen raster the frame sampler draws into and exports from.
//!
//! The surface stays unconfigured until the media reports its intrinsic
//! resolution. Capturing before that fails with
//! [`CaptureError::SurfaceNotConfigured`] so the caller can skip the tick
//! instead of exporting a 0x0 image.

use log::{debug, info};
use web_time::Instant;

use crate::error::{CaptureError, Result};
use crate::geometry::Resolution;
use crate::host::RasterTarget;
use crate::platform::now_ms;
use crate::snapshot::{Snapshot, SnapshotEncoding};

pub struct SamplingSurface<R: RasterTarget> {
    raster: R,
    resolution: Option<Resolution>,
    encoding: SnapshotEncoding,
    sequence: u64,
    last_capture_ms: Option<f64>,
}

impl<R: RasterTarget> SamplingSurface<R> {
    pub fn new(raster: R, encoding: SnapshotEncoding) -> Self {
        Self {
            raster,
            resolution: None,
            encoding,
            sequence: 0,
            last_capture_ms: None,
        }
    }

    /// Sizes the raster buffer. Returns `Ok(true)` if the size changed and
    /// `Ok(false)` for a repeat of the current size.
    pub fn configure(&mut self, width: u32, height: u32) -> Result<bool> {
        let resolution = Resolution::from_intrinsic(width, height)
            .ok_or(CaptureError::InvalidResolution(Resolution::new(width, height)))?;
        if self.resolution == Some(resolution) {
            return Ok(false);
        }
        self.raster.resize(resolution)?;
        match self.resolution.replace(resolution) {
            Some(previous) => info!("Sampling surface resized {previous} -> {resolution}"),
            None => info!("Sampling surface size set to {resolution}"),
        }
        Ok(true)
    }

    pub fn resolution(&self) -> Option<Resolution> {
        self.resolution
    }

    pub fn is_configured(&self) -> bool {
        self.resolution.is_some()
    }

    pub fn encoding(&self) -> &SnapshotEncoding {
        &self.encoding
    }

    /// Number of snapshots produced so far.
    pub fn captured(&self) -> u64 {
        self.sequence
    }

    /// Wall time the last draw + encode took.
    pub fn last_capture_ms(&self) -> Option<f64> {
        self.last_capture_ms
    }

    /// Draws the current frame of `source` and encodes it.
    pub fn capture_frame(&mut self, source: &R::Media) -> Result<Snapshot> {
        let resolution = self.resolution.ok_or(CaptureError::SurfaceNotConfigured)?;
        let started = Instant::now();
        self.raster.draw(source, resolution)?;
        let data_url = self.raster.export(&self.encoding)?;
        self.last_capture_ms = Some(started.elapsed().as_secs_f64() * 1000.0);
        self.sequence += 1;
        debug!(
            "Encoded frame #{} at {} as {}",
            self.sequence,
            resolution,
            self.encoding.format.mime_type()
        );
        Ok(Snapshot {
            sequence: self.sequence,
            captured_at_ms: now_ms(),
            resolution,
            encoding: self.encoding,
            data_url,
        })
    }
}
