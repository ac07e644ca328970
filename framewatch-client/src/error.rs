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

use thiserror::Error;

use crate::geometry::Resolution;

/// Result type for capture operations
pub type Result<T> = std::result::Result<T, CaptureError>;

/// Errors raised inside the engine.
///
/// None of these ever reach the host page: timer and event callbacks log them
/// and skip the affected tick or pass.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CaptureError {
    #[error("Sampling surface used before it was configured")]
    SurfaceNotConfigured,

    #[error("Intrinsic resolution is not known yet")]
    ResolutionUnknown,

    #[error("Invalid resolution: {0}")]
    InvalidResolution(Resolution),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("DOM error: {0}")]
    Dom(String),

    #[error("Draw failed: {0}")]
    Draw(String),

    #[error("Encode failed: {0}")]
    Encode(String),

    #[error("Malformed snapshot payload: {0}")]
    Payload(String),
}
