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

//! In-memory [`Host`] for native embedding and tests.
//!
//! `HeadlessHost` models just enough of a document: at most one media element
//! (matched against simple `tag.class#id` selectors), overlay nodes keyed by
//! id, and event listeners that are dispatched synchronously. Frames are
//! solid-colour rasters encoded for real with the `image` crate, so a snapshot
//! decodes to an image of the configured size.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ColorType, DynamicImage, ImageEncoder, Rgba, RgbaImage};
use log::debug;

use crate::config::OverlayStyle;
use crate::error::{CaptureError, Result};
use crate::geometry::{Rect, Resolution};
use crate::host::{
    Callback, Host, LayoutTrigger, MediaElement, OverlayNode, PlaybackState, RasterTarget,
    Subscription,
};
use crate::snapshot::{data_url, ImageFormat, SnapshotEncoding};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum HostEvent {
    MetadataLoaded,
    Layout(LayoutTrigger),
}

struct Listener {
    id: u64,
    event: HostEvent,
    callback: Callback,
    /// Cleared by the guard; inactive listeners are skipped and pruned.
    active: Rc<Cell<bool>>,
}

/// What the document knows about an inserted overlay node.
#[derive(Clone, Debug, PartialEq)]
pub struct OverlayRecord {
    pub id: String,
    /// Distinguishes this node from earlier ones inserted under the same id.
    pub node: u64,
    pub position: &'static str,
    pub pointer_transparent: bool,
    pub z_index: i32,
    pub border: String,
    pub geometry: Option<Rect>,
    pub annotations: Vec<(Rect, Option<String>)>,
}

#[derive(Default)]
struct Document {
    media: Option<HeadlessMedia>,
    overlays: BTreeMap<String, OverlayRecord>,
    listeners: Vec<Listener>,
    next_listener_id: u64,
    next_node: u64,
    query_count: u32,
    attach_count: u32,
    detach_count: u32,
    fail_overlay_writes: bool,
}

/// A document without a browser.
#[derive(Clone, Default)]
pub struct HeadlessHost {
    doc: Rc<RefCell<Document>>,
}

impl HeadlessHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Puts `media` into the document, replacing any previous one.
    pub fn insert_media(&self, media: HeadlessMedia) {
        self.doc.borrow_mut().media = Some(media);
    }

    pub fn remove_media(&self) -> Option<HeadlessMedia> {
        self.doc.borrow_mut().media.take()
    }

    /// How many times the document was searched for media.
    pub fn query_count(&self) -> u32 {
        self.doc.borrow().query_count
    }

    /// Overlay nodes currently in the document.
    pub fn overlay_count(&self) -> usize {
        self.doc.borrow().overlays.len()
    }

    /// Overlay insertions over the document's lifetime.
    pub fn attach_count(&self) -> u32 {
        self.doc.borrow().attach_count
    }

    pub fn detach_count(&self) -> u32 {
        self.doc.borrow().detach_count
    }

    pub fn overlay(&self, id: &str) -> Option<OverlayRecord> {
        self.doc.borrow().overlays.get(id).cloned()
    }

    /// Listeners still registered.
    pub fn listener_count(&self) -> usize {
        self.doc
            .borrow()
            .listeners
            .iter()
            .filter(|l| l.active.get())
            .count()
    }

    /// Makes every overlay geometry write fail until switched off again.
    pub fn fail_overlay_writes(&self, fail: bool) {
        self.doc.borrow_mut().fail_overlay_writes = fail;
    }

    /// Sets the media's intrinsic size and fires `loadedmetadata`.
    pub fn load_metadata(&self, width: u32, height: u32) {
        if let Some(media) = self.doc.borrow().media.clone() {
            media.set_intrinsic(Resolution::from_intrinsic(width, height));
        }
        self.dispatch(HostEvent::MetadataLoaded);
    }

    pub fn dispatch_metadata_loaded(&self) {
        self.dispatch(HostEvent::MetadataLoaded);
    }

    pub fn dispatch_layout(&self, trigger: LayoutTrigger) {
        self.dispatch(HostEvent::Layout(trigger));
    }

    /// Moves the media to `rect` and fires `fullscreenchange`, the way a
    /// browser does when the player enters or leaves fullscreen.
    pub fn toggle_fullscreen(&self, rect: Rect) {
        if let Some(media) = self.doc.borrow().media.clone() {
            media.set_bounding_box(rect);
        }
        self.dispatch_layout(LayoutTrigger::FullscreenChange);
    }

    fn dispatch(&self, event: HostEvent) {
        // Collect first: callbacks may subscribe or unsubscribe.
        let callbacks: Vec<(Rc<Cell<bool>>, Callback)> = {
            let mut doc = self.doc.borrow_mut();
            doc.listeners.retain(|l| l.active.get());
            doc.listeners
                .iter()
                .filter(|l| l.event == event)
                .map(|l| (l.active.clone(), l.callback.clone()))
                .collect()
        };
        for (active, callback) in callbacks {
            // A listener removed earlier in this dispatch is not called.
            if active.get() {
                callback();
            }
        }
    }

    fn subscribe(&self, event: HostEvent, callback: Callback) -> Subscription {
        let mut doc = self.doc.borrow_mut();
        doc.next_listener_id += 1;
        let id = doc.next_listener_id;
        let active = Rc::new(Cell::new(true));
        doc.listeners.push(Listener {
            id,
            event,
            callback,
            active: active.clone(),
        });
        Subscription::new(ListenerGuard {
            doc: Rc::downgrade(&self.doc),
            id,
            active,
        })
    }
}

struct ListenerGuard {
    doc: Weak<RefCell<Document>>,
    id: u64,
    active: Rc<Cell<bool>>,
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        self.active.set(false);
        let Some(doc) = self.doc.upgrade() else {
            return;
        };
        match doc.try_borrow_mut() {
            Ok(mut doc) => doc.listeners.retain(|l| l.id != self.id),
            Err(_) => debug!(
                "Listener {} deactivated while the document is busy, pruned on next dispatch",
                self.id
            ),
        };
    }
}

impl Host for HeadlessHost {
    type Media = HeadlessMedia;
    type Overlay = HeadlessOverlay;
    type Raster = HeadlessRaster;

    fn query_media(&self, selector: &str) -> Option<HeadlessMedia> {
        let mut doc = self.doc.borrow_mut();
        doc.query_count += 1;
        doc.media
            .as_ref()
            .filter(|media| media.matches(selector))
            .cloned()
    }

    fn create_overlay(&self, style: &OverlayStyle) -> Result<HeadlessOverlay> {
        let mut doc = self.doc.borrow_mut();
        doc.attach_count += 1;
        doc.next_node += 1;
        let node = doc.next_node;
        doc.overlays.insert(
            style.element_id.clone(),
            OverlayRecord {
                id: style.element_id.clone(),
                node,
                position: "fixed",
                pointer_transparent: true,
                z_index: style.z_index,
                border: style.border.clone(),
                geometry: None,
                annotations: Vec::new(),
            },
        );
        Ok(HeadlessOverlay {
            id: style.element_id.clone(),
            node,
            doc: Rc::downgrade(&self.doc),
        })
    }

    fn create_raster(&self) -> Result<HeadlessRaster> {
        Ok(HeadlessRaster {
            buffer: RgbaImage::new(0, 0),
        })
    }

    fn on_metadata_loaded(
        &self,
        _media: &HeadlessMedia,
        callback: Callback,
    ) -> Result<Subscription> {
        Ok(self.subscribe(HostEvent::MetadataLoaded, callback))
    }

    fn on_layout_trigger(
        &self,
        _media: &HeadlessMedia,
        trigger: LayoutTrigger,
        callback: Callback,
    ) -> Result<Subscription> {
        Ok(self.subscribe(HostEvent::Layout(trigger), callback))
    }
}

#[derive(Debug, Clone)]
struct MediaState {
    id: Option<String>,
    classes: Vec<String>,
    intrinsic: Option<Resolution>,
    playback: PlaybackState,
    bounding_box: Rect,
    fill: [u8; 4],
    draw_failure: Option<String>,
}

/// An in-memory `<video>`. Clones share state, like references to one element.
#[derive(Clone, Debug)]
pub struct HeadlessMedia {
    state: Rc<RefCell<MediaState>>,
}

impl PartialEq for HeadlessMedia {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }
}

impl Default for HeadlessMedia {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessMedia {
    /// A paused element without metadata, like a freshly created `<video>`.
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(MediaState {
                id: None,
                classes: Vec::new(),
                intrinsic: None,
                playback: PlaybackState::Paused,
                bounding_box: Rect::default(),
                fill: [200, 30, 30, 255],
                draw_failure: None,
            })),
        }
    }

    pub fn with_id(self, id: &str) -> Self {
        self.state.borrow_mut().id = Some(id.to_string());
        self
    }

    pub fn with_class(self, class: &str) -> Self {
        self.state.borrow_mut().classes.push(class.to_string());
        self
    }

    pub fn with_intrinsic(self, width: u32, height: u32) -> Self {
        self.set_intrinsic(Resolution::from_intrinsic(width, height));
        self
    }

    pub fn with_playback(self, playback: PlaybackState) -> Self {
        self.set_playback(playback);
        self
    }

    pub fn with_bounding_box(self, rect: Rect) -> Self {
        self.set_bounding_box(rect);
        self
    }

    pub fn with_fill(self, rgba: [u8; 4]) -> Self {
        self.state.borrow_mut().fill = rgba;
        self
    }

    pub fn set_intrinsic(&self, resolution: Option<Resolution>) {
        self.state.borrow_mut().intrinsic = resolution;
    }

    pub fn set_playback(&self, playback: PlaybackState) {
        self.state.borrow_mut().playback = playback;
    }

    pub fn play(&self) {
        self.set_playback(PlaybackState::Playing);
    }

    pub fn pause(&self) {
        self.set_playback(PlaybackState::Paused);
    }

    pub fn set_bounding_box(&self, rect: Rect) {
        self.state.borrow_mut().bounding_box = rect;
    }

    /// Makes subsequent draws fail with `reason`, as a tainted canvas would.
    pub fn set_draw_failure(&self, reason: Option<String>) {
        self.state.borrow_mut().draw_failure = reason;
    }

    /// Matches compound selectors such as `video`, `video.player`, `#main` or `.a.b`.
    pub fn matches(&self, selector: &str) -> bool {
        let state = self.state.borrow();
        let selector = selector.trim();
        let markers: &[char] = &['.', '#'];
        let tag_end = selector.find(markers).unwrap_or(selector.len());
        let (tag, mut rest) = selector.split_at(tag_end);
        if !(tag.is_empty() || tag == "*" || tag.eq_ignore_ascii_case("video")) {
            return false;
        }
        if selector.is_empty() {
            return false;
        }
        while let Some(marker) = rest.chars().next() {
            let body = &rest[1..];
            let end = body.find(markers).unwrap_or(body.len());
            let name = &body[..end];
            let matched = !name.is_empty()
                && match marker {
                    '.' => state.classes.iter().any(|c| c == name),
                    _ => state.id.as_deref() == Some(name),
                };
            if !matched {
                return false;
            }
            rest = &body[end..];
        }
        true
    }
}

impl MediaElement for HeadlessMedia {
    fn intrinsic_resolution(&self) -> Option<Resolution> {
        self.state.borrow().intrinsic
    }

    fn playback_state(&self) -> PlaybackState {
        self.state.borrow().playback
    }

    fn bounding_box(&self) -> Rect {
        self.state.borrow().bounding_box
    }
}

/// Handle to an overlay record inside a [`HeadlessHost`] document.
///
/// Like a DOM node reference, a handle only ever touches the node it created;
/// a later node inserted under the same id is out of its reach.
#[derive(Debug)]
pub struct HeadlessOverlay {
    id: String,
    node: u64,
    doc: Weak<RefCell<Document>>,
}

impl HeadlessOverlay {
    fn with_record<T>(&self, f: impl FnOnce(&mut OverlayRecord) -> T) -> Result<T> {
        let doc = self
            .doc
            .upgrade()
            .ok_or_else(|| CaptureError::Dom("document is gone".into()))?;
        let mut doc = doc.borrow_mut();
        let record = doc
            .overlays
            .get_mut(&self.id)
            .filter(|record| record.node == self.node)
            .ok_or_else(|| CaptureError::Dom(format!("overlay '{}' not in document", self.id)))?;
        Ok(f(record))
    }
}

impl OverlayNode for HeadlessOverlay {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_geometry(&self, rect: &Rect) -> Result<()> {
        let failing = self
            .doc
            .upgrade()
            .map(|doc| doc.borrow().fail_overlay_writes)
            .unwrap_or(false);
        if failing {
            return Err(CaptureError::Dom("style write rejected".into()));
        }
        self.with_record(|record| record.geometry = Some(*rect))
    }

    fn add_annotation(&self, local: &Rect, label: Option<&str>) -> Result<()> {
        self.with_record(|record| {
            record
                .annotations
                .push((*local, label.map(str::to_string)))
        })
    }

    fn clear_annotations(&self) -> Result<()> {
        self.with_record(|record| record.annotations.clear())
    }

    fn detach(&self) {
        if let Some(doc) = self.doc.upgrade() {
            let mut doc = doc.borrow_mut();
            let owned = doc
                .overlays
                .get(&self.id)
                .is_some_and(|record| record.node == self.node);
            if owned {
                doc.overlays.remove(&self.id);
                doc.detach_count += 1;
            }
        }
    }
}

/// RGBA buffer standing in for an off-screen canvas.
pub struct HeadlessRaster {
    buffer: RgbaImage,
}

impl HeadlessRaster {
    pub fn size(&self) -> (u32, u32) {
        self.buffer.dimensions()
    }
}

impl RasterTarget for HeadlessRaster {
    type Media = HeadlessMedia;

    fn resize(&mut self, resolution: Resolution) -> Result<()> {
        self.buffer = RgbaImage::new(resolution.width, resolution.height);
        Ok(())
    }

    fn draw(&mut self, media: &HeadlessMedia, resolution: Resolution) -> Result<()> {
        let state = media.state.borrow();
        if let Some(reason) = &state.draw_failure {
            return Err(CaptureError::Draw(reason.clone()));
        }
        if self.buffer.dimensions() != (resolution.width, resolution.height) {
            self.buffer = RgbaImage::new(resolution.width, resolution.height);
        }
        let fill = Rgba(state.fill);
        for pixel in self.buffer.pixels_mut() {
            *pixel = fill;
        }
        Ok(())
    }

    fn export(&self, encoding: &SnapshotEncoding) -> Result<String> {
        let (width, height) = self.buffer.dimensions();
        if width == 0 || height == 0 {
            return Err(CaptureError::SurfaceNotConfigured);
        }
        let mut out = Vec::new();
        match encoding.format {
            ImageFormat::Jpeg => {
                let rgb = DynamicImage::ImageRgba8(self.buffer.clone()).to_rgb8();
                JpegEncoder::new_with_quality(&mut out, encoding.quality_percent())
                    .encode(rgb.as_raw(), width, height, ColorType::Rgb8)
                    .map_err(|e| CaptureError::Encode(e.to_string()))?;
            }
            ImageFormat::Png => {
                PngEncoder::new(&mut out)
                    .write_image(self.buffer.as_raw(), width, height, ColorType::Rgba8)
                    .map_err(|e| CaptureError::Encode(e.to_string()))?;
            }
        }
        Ok(data_url(encoding.format, &out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn selector_matching() {
        let media = HeadlessMedia::new().with_id("main").with_class("player");
        assert!(media.matches("video"));
        assert!(media.matches("VIDEO"));
        assert!(media.matches("video.player"));
        assert!(media.matches("#main"));
        assert!(media.matches("video.player#main"));
        assert!(media.matches(".player"));
        assert!(!media.matches("audio"));
        assert!(!media.matches("video.ad"));
        assert!(!media.matches("#other"));
        assert!(!media.matches(""));
        assert!(!media.matches("video."));
    }

    #[test]
    fn dropping_subscription_unregisters_listener() {
        let host = HeadlessHost::new();
        let media = HeadlessMedia::new();
        let hits = Rc::new(Cell::new(0));
        let h = hits.clone();
        let sub = host
            .on_layout_trigger(
                &media,
                LayoutTrigger::FullscreenChange,
                Rc::new(move || h.set(h.get() + 1)),
            )
            .unwrap();
        host.dispatch_layout(LayoutTrigger::FullscreenChange);
        host.dispatch_layout(LayoutTrigger::Resize);
        assert_eq!(hits.get(), 1);

        drop(sub);
        assert_eq!(host.listener_count(), 0);
        host.dispatch_layout(LayoutTrigger::FullscreenChange);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn listener_dropped_during_dispatch_is_removed() {
        let host = HeadlessHost::new();
        let media = HeadlessMedia::new();
        let hits = Rc::new(Cell::new(0));
        let slot: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));

        // The first listener drops the second one's subscription mid-dispatch.
        let victim = slot.clone();
        let _first = host
            .on_metadata_loaded(&media, Rc::new(move || drop(victim.borrow_mut().take())))
            .unwrap();
        let h = hits.clone();
        let second = host
            .on_metadata_loaded(&media, Rc::new(move || h.set(h.get() + 1)))
            .unwrap();
        *slot.borrow_mut() = Some(second);
        assert_eq!(host.listener_count(), 2);

        host.dispatch_metadata_loaded();
        assert_eq!(hits.get(), 0);
        assert_eq!(host.listener_count(), 1);

        host.dispatch_metadata_loaded();
        assert_eq!(hits.get(), 0);
        assert_eq!(host.listener_count(), 1);
    }

    #[test]
    fn guard_dropped_while_document_is_borrowed_still_unregisters() {
        let host = HeadlessHost::new();
        let media = HeadlessMedia::new();
        let hits = Rc::new(Cell::new(0));
        let h = hits.clone();
        let sub = host
            .on_layout_trigger(
                &media,
                LayoutTrigger::Resize,
                Rc::new(move || h.set(h.get() + 1)),
            )
            .unwrap();
        {
            let _busy = host.doc.borrow();
            drop(sub);
        }
        assert_eq!(host.listener_count(), 0);
        host.dispatch_layout(LayoutTrigger::Resize);
        assert_eq!(hits.get(), 0);
        assert!(host.doc.borrow().listeners.is_empty());
    }

    #[test]
    fn recreating_overlay_replaces_stale_node() {
        let host = HeadlessHost::new();
        let style = OverlayStyle::default();
        host.create_overlay(&style).unwrap();
        host.create_overlay(&style).unwrap();
        assert_eq!(host.overlay_count(), 1);
        assert_eq!(host.attach_count(), 2);
    }

    #[test]
    fn stale_overlay_handle_leaves_its_replacement_alone() {
        let host = HeadlessHost::new();
        let style = OverlayStyle::default();
        let stale = host.create_overlay(&style).unwrap();
        let current = host.create_overlay(&style).unwrap();
        let rect = Rect::new(0.0, 0.0, 320.0, 180.0);

        assert!(stale.set_geometry(&rect).is_err());
        stale.detach();
        assert_eq!(host.overlay_count(), 1);
        assert_eq!(host.detach_count(), 0);

        current.set_geometry(&rect).unwrap();
        assert_eq!(host.overlay(&style.element_id).unwrap().geometry, Some(rect));
        current.detach();
        assert_eq!(host.overlay_count(), 0);
        assert_eq!(host.detach_count(), 1);
    }

    #[test]
    fn png_export_keeps_dimensions() {
        let host = HeadlessHost::new();
        let media = HeadlessMedia::new().with_fill([1, 2, 3, 255]);
        let mut raster = host.create_raster().unwrap();
        raster.resize(Resolution::new(8, 4)).unwrap();
        raster.draw(&media, Resolution::new(8, 4)).unwrap();
        let url = raster
            .export(&SnapshotEncoding {
                format: ImageFormat::Png,
                quality: 1.0,
            })
            .unwrap();
        assert!(url.starts_with("data:image/png;base64,"));
        assert_eq!(raster.size(), (8, 4));
    }

    #[test]
    fn export_of_empty_raster_is_refused() {
        let host = HeadlessHost::new();
        let raster = host.create_raster().unwrap();
        assert_eq!(
            raster.export(&SnapshotEncoding::default()),
            Err(CaptureError::SurfaceNotConfigured)
        );
    }
}
