pub static DEFAULT_MEDIA_SELECTOR: &str = "video";

// Discovery poll. The page gives no ready signal for its player, so we look again on a timer.
pub const LOCATOR_INTERVAL_MS: u32 = 500;

// One sample per second is plenty for card recognition and keeps drawImage off the hot path.
pub const SAMPLE_INTERVAL_MS: u32 = 1000;

pub const JPEG_QUALITY: f64 = 0.8;

pub static OVERLAY_ELEMENT_ID: &str = "card-overlay-container";
pub const OVERLAY_Z_INDEX: i32 = 9999;
pub static OVERLAY_BORDER: &str = "2px solid red";
pub static ANNOTATION_BORDER: &str = "2px solid lime";
pub static ANNOTATION_CLASS: &str = "framewatch-annotation";

pub const VIEWPORT_RESYNC_THROTTLE_MS: u32 = 100;

// How much of a data URL the log sink prints.
pub const LOG_PREVIEW_CHARS: usize = 64;
