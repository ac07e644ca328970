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

//! Framework-agnostic lifecycle events for the capture engine.
//!
//! These events are emitted via the event bus and can be subscribed to by any
//! consumer living in the same page (a recognition pipeline, a debug panel,
//! the extension's popup bridge).

use crate::geometry::{Rect, Resolution};
use crate::sampler::SkipReason;

/// Events emitted by a `CaptureSession`.
#[derive(Clone, Debug, PartialEq)]
pub enum CaptureEvent {
    // === Discovery ===
    /// The media element was found after `attempts` polls
    MediaFound { attempts: u32 },

    /// The locator gave up after exhausting its attempt budget
    LocatorExhausted { attempts: u32 },

    // === Initialization ===
    /// The sampling surface was sized to the media's intrinsic resolution
    SurfaceConfigured(Resolution),

    /// The overlay node was inserted into the document
    OverlayAttached { element_id: String },

    // === Layout ===
    /// The overlay was moved to match the media's bounding box
    GeometryUpdated(Rect),

    // === Sampling ===
    /// A snapshot was produced and handed to the sink
    SnapshotCaptured { sequence: u64, resolution: Resolution },

    /// A sampling tick produced nothing
    TickSkipped(SkipReason),

    // === Teardown ===
    /// The session released its timers, listeners and overlay
    Stopped,
}
