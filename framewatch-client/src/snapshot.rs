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

//! Encoded still frames handed downstream, one per active sampling tick.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::constants::JPEG_QUALITY;
use crate::error::{CaptureError, Result};
use crate::geometry::Resolution;

/// Snapshot container format.
///
/// Production capture is lossy JPEG at a fixed quality. `Png` is a debugging
/// override for inspecting exact pixels; sessions configured with it log a
/// warning at start.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    #[default]
    Jpeg,
    Png,
}

impl ImageFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
        }
    }

    /// Only lossy formats honour a quality parameter.
    pub fn is_lossy(&self) -> bool {
        matches!(self, ImageFormat::Jpeg)
    }
}

/// Export parameters, fixed for the lifetime of a session.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotEncoding {
    pub format: ImageFormat,
    /// 0.0 ..= 1.0, as accepted by `HTMLCanvasElement.toDataURL`.
    pub quality: f64,
}

impl Default for SnapshotEncoding {
    fn default() -> Self {
        Self {
            format: ImageFormat::Jpeg,
            quality: JPEG_QUALITY,
        }
    }
}

impl SnapshotEncoding {
    /// True when the format departs from the lossy production encoding.
    pub fn is_debug_override(&self) -> bool {
        !self.format.is_lossy()
    }

    /// Quality on the 1..=100 scale used by native encoders.
    pub fn quality_percent(&self) -> u8 {
        (self.quality.clamp(0.0, 1.0) * 100.0).round().max(1.0) as u8
    }
}

/// One encoded frame. The core keeps no history: each tick's snapshot
/// supersedes the last one as soon as the sink returns.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Starts at 1 and grows by one per captured frame.
    pub sequence: u64,
    pub captured_at_ms: f64,
    pub resolution: Resolution,
    pub encoding: SnapshotEncoding,
    /// `data:<mime>;base64,<payload>`
    pub data_url: String,
}

impl Snapshot {
    pub fn mime_type(&self) -> &'static str {
        self.encoding.format.mime_type()
    }

    /// Returns the encoded image bytes carried by the data URL.
    pub fn decode_payload(&self) -> Result<Vec<u8>> {
        let (header, payload) = self
            .data_url
            .split_once(',')
            .ok_or_else(|| CaptureError::Payload("missing ',' separator".to_string()))?;
        if !header.starts_with("data:") || !header.ends_with(";base64") {
            return Err(CaptureError::Payload(format!("unexpected header {header}")));
        }
        STANDARD
            .decode(payload)
            .map_err(|e| CaptureError::Payload(e.to_string()))
    }

    /// Number of base64 characters after the header.
    pub fn payload_len(&self) -> usize {
        self.data_url
            .split_once(',')
            .map(|(_, payload)| payload.len())
            .unwrap_or(0)
    }
}

/// Builds a data URL from raw encoded bytes.
pub fn data_url(format: ImageFormat, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", format.mime_type(), STANDARD.encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(data_url: String) -> Snapshot {
        Snapshot {
            sequence: 1,
            captured_at_ms: 0.0,
            resolution: Resolution::new(2, 2),
            encoding: SnapshotEncoding::default(),
            data_url,
        }
    }

    #[test]
    fn default_encoding_is_jpeg_at_080() {
        let encoding = SnapshotEncoding::default();
        assert_eq!(encoding.format, ImageFormat::Jpeg);
        assert_eq!(encoding.quality, 0.8);
        assert_eq!(encoding.quality_percent(), 80);
        assert!(encoding.format.is_lossy());
        assert!(!encoding.is_debug_override());
    }

    #[test]
    fn png_is_flagged_as_debug_override() {
        let png = SnapshotEncoding {
            format: ImageFormat::Png,
            ..SnapshotEncoding::default()
        };
        assert!(png.is_debug_override());
        assert_eq!(png.quality, 0.8);
    }

    #[test]
    fn quality_percent_is_clamped() {
        let high = SnapshotEncoding {
            format: ImageFormat::Jpeg,
            quality: 4.0,
        };
        let low = SnapshotEncoding {
            format: ImageFormat::Jpeg,
            quality: 0.0,
        };
        assert_eq!(high.quality_percent(), 100);
        assert_eq!(low.quality_percent(), 1);
    }

    #[test]
    fn payload_survives_data_url_wrapping() {
        let bytes = vec![0xff, 0xd8, 0xff, 0xe0, 0x00, 0x10];
        let snap = snapshot(data_url(ImageFormat::Jpeg, &bytes));
        assert!(snap.data_url.starts_with("data:image/jpeg;base64,"));
        assert_eq!(snap.decode_payload().unwrap(), bytes);
        assert_eq!(snap.mime_type(), "image/jpeg");
    }

    #[test]
    fn malformed_data_urls_are_rejected() {
        assert!(matches!(
            snapshot("not a data url".into()).decode_payload(),
            Err(CaptureError::Payload(_))
        ));
        assert!(matches!(
            snapshot("data:image/jpeg,plain".into()).decode_payload(),
            Err(CaptureError::Payload(_))
        ));
        assert_eq!(snapshot("garbage".into()).payload_len(), 0);
    }
}
