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

//! Seams between the engine and the page it is injected into.
//!
//! The engine never touches the DOM directly. It talks to a [`Host`], which
//! hands out the media element, the overlay node, the off-screen raster and
//! event subscriptions. `crate::web` implements these with `web-sys` for the
//! browser; `crate::headless` keeps everything in memory for native
//! embedding and tests.

use std::any::Any;
use std::rc::Rc;

use crate::config::OverlayStyle;
use crate::error::Result;
use crate::geometry::{Rect, Resolution};
use crate::snapshot::SnapshotEncoding;

/// Playback state as observed at a single instant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaybackState {
    Playing,
    Paused,
    Ended,
}

impl PlaybackState {
    /// Maps the `paused`/`ended` flags of an HTML media element. An ended
    /// element also reports paused, so `ended` wins.
    pub fn from_flags(paused: bool, ended: bool) -> Self {
        if ended {
            PlaybackState::Ended
        } else if paused {
            PlaybackState::Paused
        } else {
            PlaybackState::Playing
        }
    }

    pub fn is_playing(&self) -> bool {
        matches!(self, PlaybackState::Playing)
    }
}

/// The observed media element. Cheap to clone; clones refer to the same element.
pub trait MediaElement: Clone + 'static {
    /// `None` until metadata has loaded.
    fn intrinsic_resolution(&self) -> Option<Resolution>;
    fn playback_state(&self) -> PlaybackState;
    /// Rendered geometry in viewport coordinates.
    fn bounding_box(&self) -> Rect;
}

/// The overlay node attached to the document.
pub trait OverlayNode: 'static {
    fn id(&self) -> &str;
    fn set_geometry(&self, rect: &Rect) -> Result<()>;
    /// Adds a child box positioned relative to the overlay's top-left corner.
    fn add_annotation(&self, local: &Rect, label: Option<&str>) -> Result<()>;
    fn clear_annotations(&self) -> Result<()>;
    fn detach(&self);
}

/// Off-screen raster the sampler draws frames into.
pub trait RasterTarget: 'static {
    type Media: MediaElement;

    fn resize(&mut self, resolution: Resolution) -> Result<()>;
    /// Draws the media's current frame scaled to `resolution`.
    fn draw(&mut self, media: &Self::Media, resolution: Resolution) -> Result<()>;
    /// Exports the current raster contents as a data URL.
    fn export(&self, encoding: &SnapshotEncoding) -> Result<String>;
}

/// Events that may move or resize the media element on screen.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LayoutTrigger {
    FullscreenChange,
    Resize,
    Scroll,
}

/// Keeps an event listener registered for as long as it is alive.
pub struct Subscription {
    _guard: Box<dyn Any>,
}

impl Subscription {
    pub fn new<G: 'static>(guard: G) -> Self {
        Self {
            _guard: Box::new(guard),
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

pub type Callback = Rc<dyn Fn()>;

/// The document the engine is attached to.
pub trait Host: 'static {
    type Media: MediaElement;
    type Overlay: OverlayNode;
    type Raster: RasterTarget<Media = Self::Media>;

    /// First element matching `selector`, if it exists yet.
    fn query_media(&self, selector: &str) -> Option<Self::Media>;
    /// Creates the overlay node and inserts it into the document, replacing
    /// any stale node carrying the same id.
    fn create_overlay(&self, style: &OverlayStyle) -> Result<Self::Overlay>;
    /// Creates a detached raster target; it is never inserted into the page.
    fn create_raster(&self) -> Result<Self::Raster>;
    fn on_metadata_loaded(&self, media: &Self::Media, callback: Callback) -> Result<Subscription>;
    fn on_layout_trigger(
        &self,
        media: &Self::Media,
        trigger: LayoutTrigger,
        callback: Callback,
    ) -> Result<Subscription>;
}
