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

//! The input-transparent layer kept over the media element.
//!
//! [`OverlayHandle`] is the owned handle returned by [`OverlayHandle::attach`].
//! Annotation collaborators get a clone of it (or just its element id) and
//! may add or clear child boxes, but only the layout synchronizer moves it.
//! Boxes are kept in intrinsic pixels and redrawn on every geometry write.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::config::OverlayStyle;
use crate::error::{CaptureError, Result};
use crate::geometry::{Rect, Resolution};
use crate::host::{Host, OverlayNode};

/// A region of interest to outline on top of the video.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    /// In intrinsic frame pixels, the coordinate space of a snapshot.
    pub region: Rect,
    pub label: Option<String>,
}

impl Annotation {
    pub fn new(region: Rect) -> Self {
        Self {
            region,
            label: None,
        }
    }

    pub fn labelled(region: Rect, label: impl Into<String>) -> Self {
        Self {
            region,
            label: Some(label.into()),
        }
    }
}

struct OverlayInner<O: OverlayNode> {
    node: O,
    geometry: Cell<Option<Rect>>,
    intrinsic: Cell<Option<Resolution>>,
    attached: Cell<bool>,
    geometry_writes: Cell<u64>,
    annotations: RefCell<Vec<Annotation>>,
}

pub struct OverlayHandle<O: OverlayNode> {
    inner: Rc<OverlayInner<O>>,
}

impl<O: OverlayNode> Clone for OverlayHandle<O> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<O: OverlayNode> std::fmt::Debug for OverlayHandle<O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlayHandle")
            .field("id", &self.id())
            .field("geometry", &self.geometry())
            .field("attached", &self.is_attached())
            .finish()
    }
}

impl<O: OverlayNode> OverlayHandle<O> {
    /// Creates the overlay node and inserts it into the host document.
    pub fn attach<H: Host<Overlay = O>>(host: &H, style: &OverlayStyle) -> Result<Self> {
        let node = host.create_overlay(style)?;
        info!("Overlay '{}' attached", node.id());
        Ok(Self {
            inner: Rc::new(OverlayInner {
                node,
                geometry: Cell::new(None),
                intrinsic: Cell::new(None),
                attached: Cell::new(true),
                geometry_writes: Cell::new(0),
                annotations: RefCell::new(Vec::new()),
            }),
        })
    }

    /// Stable element id of the overlay node.
    pub fn id(&self) -> &str {
        self.inner.node.id()
    }

    /// Last geometry written, `None` before the first synchronization pass.
    pub fn geometry(&self) -> Option<Rect> {
        self.inner.geometry.get()
    }

    pub fn is_attached(&self) -> bool {
        self.inner.attached.get()
    }

    /// Number of geometry writes so far.
    pub fn geometry_writes(&self) -> u64 {
        self.inner.geometry_writes.get()
    }

    pub fn node(&self) -> &O {
        &self.inner.node
    }

    pub(crate) fn set_geometry(&self, rect: Rect) -> Result<()> {
        if !self.is_attached() {
            return Ok(());
        }
        self.inner.node.set_geometry(&rect)?;
        self.inner.geometry.set(Some(rect));
        self.inner
            .geometry_writes
            .set(self.inner.geometry_writes.get() + 1);
        debug!(
            "Overlay '{}' -> top {} left {} {}x{}",
            self.id(),
            rect.top,
            rect.left,
            rect.width,
            rect.height
        );
        self.redraw_annotations()
    }

    /// Remaps every drawn annotation onto the current geometry.
    fn redraw_annotations(&self) -> Result<()> {
        let annotations = self.inner.annotations.borrow();
        if annotations.is_empty() {
            return Ok(());
        }
        let (Some(intrinsic), Some(display)) = (self.inner.intrinsic.get(), self.geometry()) else {
            return Ok(());
        };
        self.inner.node.clear_annotations()?;
        for annotation in annotations.iter() {
            self.draw(annotation, intrinsic, &display)?;
        }
        Ok(())
    }

    fn draw(&self, annotation: &Annotation, intrinsic: Resolution, display: &Rect) -> Result<()> {
        let local = annotation.region.map_from_intrinsic(intrinsic, display);
        self.inner
            .node
            .add_annotation(&local, annotation.label.as_deref())
    }

    /// Annotations currently drawn, in intrinsic frame pixels.
    pub fn annotations(&self) -> Vec<Annotation> {
        self.inner.annotations.borrow().clone()
    }

    pub(crate) fn set_intrinsic(&self, resolution: Resolution) {
        self.inner.intrinsic.set(Some(resolution));
    }

    /// Outlines `annotations`, given in intrinsic frame pixels, inside the
    /// overlay. Returns how many were drawn. They follow later geometry
    /// changes until [`clear_annotations`](Self::clear_annotations).
    pub fn annotate(&self, annotations: &[Annotation]) -> Result<usize> {
        if !self.is_attached() {
            return Ok(0);
        }
        let intrinsic = self
            .inner
            .intrinsic
            .get()
            .ok_or(CaptureError::ResolutionUnknown)?;
        let display = self.geometry().ok_or(CaptureError::ResolutionUnknown)?;
        for annotation in annotations {
            self.draw(annotation, intrinsic, &display)?;
            self.inner.annotations.borrow_mut().push(annotation.clone());
        }
        Ok(annotations.len())
    }

    pub fn clear_annotations(&self) -> Result<()> {
        if !self.is_attached() {
            return Ok(());
        }
        self.inner.annotations.borrow_mut().clear();
        self.inner.node.clear_annotations()
    }

    pub(crate) fn detach(&self) {
        if self.inner.attached.replace(false) {
            self.inner.node.detach();
            info!("Overlay '{}' detached", self.id());
        }
    }
}
