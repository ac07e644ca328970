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

//! Keeps the overlay on top of the media element.
//!
//! Recomputation is pushed by events (metadata loaded, fullscreen change,
//! and optionally viewport resize/scroll) rather than polled. Viewport
//! events arrive in bursts, so they only mark the layout dirty; a throttle
//! timer calls [`LayoutSynchronizer::flush`] to apply one recompute per window.

use std::cell::Cell;

use log::warn;

use crate::event_bus::emit_capture_event;
use crate::events::CaptureEvent;
use crate::geometry::Rect;
use crate::host::{Host, MediaElement};
use crate::overlay::OverlayHandle;

pub struct LayoutSynchronizer<H: Host> {
    media: H::Media,
    overlay: OverlayHandle<H::Overlay>,
    dirty: Cell<bool>,
    passes: Cell<u64>,
}

impl<H: Host> LayoutSynchronizer<H> {
    pub fn new(media: H::Media, overlay: OverlayHandle<H::Overlay>) -> Self {
        Self {
            media,
            overlay,
            dirty: Cell::new(false),
            passes: Cell::new(0),
        }
    }

    pub fn overlay(&self) -> &OverlayHandle<H::Overlay> {
        &self.overlay
    }

    /// Number of completed synchronization passes.
    pub fn passes(&self) -> u64 {
        self.passes.get()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.get()
    }

    /// Copies the media's rendered bounding box onto the overlay.
    ///
    /// Returns the applied rect, or `None` if the write failed (logged; the
    /// next event retries).
    pub fn recompute(&self) -> Option<Rect> {
        self.dirty.set(false);
        let rect = self.media.bounding_box();
        match self.overlay.set_geometry(rect) {
            Ok(()) => {
                self.passes.set(self.passes.get() + 1);
                emit_capture_event(CaptureEvent::GeometryUpdated(rect));
                Some(rect)
            }
            Err(e) => {
                warn!("Overlay geometry update failed: {e}");
                None
            }
        }
    }

    /// Records that the layout may have changed without recomputing yet.
    pub fn mark_dirty(&self) {
        self.dirty.set(true);
    }

    /// Recomputes if anything marked the layout dirty since the last pass.
    pub fn flush(&self) -> Option<Rect> {
        if self.dirty.get() {
            self.recompute()
        } else {
            None
        }
    }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;
    use crate::config::OverlayStyle;
    use crate::headless::{HeadlessHost, HeadlessMedia};

    fn synchronizer(
        host: &HeadlessHost,
        media: &HeadlessMedia,
    ) -> LayoutSynchronizer<HeadlessHost> {
        let overlay = OverlayHandle::attach(host, &OverlayStyle::default()).unwrap();
        LayoutSynchronizer::new(media.clone(), overlay)
    }

    #[test]
    fn recompute_copies_bounding_box() {
        let host = HeadlessHost::new();
        let media = HeadlessMedia::new().with_bounding_box(Rect::new(80.0, 40.0, 640.0, 360.0));
        let sync = synchronizer(&host, &media);

        assert_eq!(sync.recompute(), Some(Rect::new(80.0, 40.0, 640.0, 360.0)));
        assert_eq!(sync.overlay().geometry(), Some(media.bounding_box()));

        media.set_bounding_box(Rect::new(0.0, 0.0, 1920.0, 1080.0));
        sync.recompute();
        assert_eq!(
            host.overlay(sync.overlay().id()).unwrap().geometry,
            Some(Rect::new(0.0, 0.0, 1920.0, 1080.0))
        );
        assert_eq!(sync.passes(), 2);
    }

    #[test]
    fn recompute_without_layout_change_round_trips() {
        let host = HeadlessHost::new();
        let media = HeadlessMedia::new().with_bounding_box(Rect::new(5.0, 6.0, 7.0, 8.0));
        let sync = synchronizer(&host, &media);
        let before = sync.recompute();
        let after = sync.recompute();
        assert_eq!(before, after);
    }

    #[test]
    fn flush_only_recomputes_when_dirty() {
        let host = HeadlessHost::new();
        let media = HeadlessMedia::new().with_bounding_box(Rect::new(1.0, 2.0, 3.0, 4.0));
        let sync = synchronizer(&host, &media);

        assert_eq!(sync.flush(), None);
        assert_eq!(sync.passes(), 0);

        sync.mark_dirty();
        sync.mark_dirty();
        assert!(sync.is_dirty());
        assert_eq!(sync.flush(), Some(Rect::new(1.0, 2.0, 3.0, 4.0)));
        assert!(!sync.is_dirty());
        assert_eq!(sync.flush(), None);
        assert_eq!(sync.passes(), 1);
    }

    #[test]
    fn failed_write_is_swallowed() {
        let host = HeadlessHost::new();
        let media = HeadlessMedia::new();
        let sync = synchronizer(&host, &media);
        host.fail_overlay_writes(true);
        assert_eq!(sync.recompute(), None);
        assert_eq!(sync.passes(), 0);
        host.fail_overlay_writes(false);
        assert!(sync.recompute().is_some());
    }
}
