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

//! Browser [`Host`] backed by `web-sys`.
//!
//! The overlay is a `position: fixed` div appended to `<body>`, so the
//! viewport coordinates from `getBoundingClientRect()` can be applied as-is.
//! Frames are drawn into a detached `<canvas>` and exported with
//! `toDataURL`.

use gloo::events::EventListener;
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{
    CanvasRenderingContext2d, Document, HtmlCanvasElement, HtmlElement, HtmlVideoElement, Window,
};

use crate::config::OverlayStyle;
use crate::constants::{ANNOTATION_BORDER, ANNOTATION_CLASS};
use crate::error::{CaptureError, Result};
use crate::geometry::{Rect, Resolution};
use crate::host::{
    Callback, Host, LayoutTrigger, MediaElement, OverlayNode, PlaybackState, RasterTarget,
    Subscription,
};
use crate::snapshot::SnapshotEncoding;

fn dom_err(context: &'static str) -> impl Fn(JsValue) -> CaptureError {
    move |e| CaptureError::Dom(format!("{context}: {e:?}"))
}

fn set_styles(element: &HtmlElement, styles: &[(&str, &str)]) -> Result<()> {
    let style = element.style();
    for (name, value) in styles {
        style
            .set_property(name, value)
            .map_err(dom_err("style write"))?;
    }
    Ok(())
}

/// The page the content script runs in.
#[derive(Clone)]
pub struct WebHost {
    window: Window,
    document: Document,
}

impl WebHost {
    pub fn new() -> Result<Self> {
        let window =
            web_sys::window().ok_or_else(|| CaptureError::Dom("no global window".into()))?;
        let document = window
            .document()
            .ok_or_else(|| CaptureError::Dom("window has no document".into()))?;
        Ok(Self { window, document })
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    fn listen(
        &self,
        target: &web_sys::EventTarget,
        event: &'static str,
        callback: Callback,
    ) -> Subscription {
        Subscription::new(EventListener::new(target, event, move |_| callback()))
    }
}

impl Host for WebHost {
    type Media = WebMedia;
    type Overlay = WebOverlay;
    type Raster = WebRaster;

    fn query_media(&self, selector: &str) -> Option<WebMedia> {
        // An invalid selector is treated like an absent element.
        let element = self.document.query_selector(selector).ok().flatten()?;
        element.dyn_into::<HtmlVideoElement>().ok().map(WebMedia)
    }

    fn create_overlay(&self, style: &OverlayStyle) -> Result<WebOverlay> {
        if let Some(stale) = self.document.get_element_by_id(&style.element_id) {
            stale.remove();
        }
        let element = self
            .document
            .create_element("div")
            .map_err(dom_err("create overlay"))?
            .dyn_into::<HtmlElement>()
            .map_err(|_| CaptureError::Dom("overlay is not an HtmlElement".into()))?;
        element.set_id(&style.element_id);
        let z_index = style.z_index.to_string();
        set_styles(
            &element,
            &[
                ("position", "fixed"),
                ("pointer-events", "none"),
                ("box-sizing", "border-box"),
                ("z-index", z_index.as_str()),
                ("border", style.border.as_str()),
            ],
        )?;
        let parent: web_sys::Node = match self.document.body() {
            Some(body) => body.into(),
            None => self
                .document
                .document_element()
                .ok_or_else(|| CaptureError::Dom("document has no root element".into()))?
                .into(),
        };
        parent
            .append_child(&element)
            .map_err(dom_err("insert overlay"))?;
        Ok(WebOverlay {
            id: style.element_id.clone(),
            document: self.document.clone(),
            element,
        })
    }

    fn create_raster(&self) -> Result<WebRaster> {
        let canvas = self
            .document
            .create_element("canvas")
            .map_err(dom_err("create canvas"))?
            .dyn_into::<HtmlCanvasElement>()
            .map_err(|_| CaptureError::Dom("canvas is not an HtmlCanvasElement".into()))?;
        let context = canvas
            .get_context("2d")
            .map_err(dom_err("get 2d context"))?
            .ok_or_else(|| CaptureError::Dom("2d context unavailable".into()))?
            .dyn_into::<CanvasRenderingContext2d>()
            .map_err(|_| CaptureError::Dom("unexpected context type".into()))?;
        Ok(WebRaster { canvas, context })
    }

    fn on_metadata_loaded(&self, media: &WebMedia, callback: Callback) -> Result<Subscription> {
        Ok(self.listen(&media.0, "loadedmetadata", callback))
    }

    fn on_layout_trigger(
        &self,
        _media: &WebMedia,
        trigger: LayoutTrigger,
        callback: Callback,
    ) -> Result<Subscription> {
        Ok(match trigger {
            LayoutTrigger::FullscreenChange => {
                self.listen(&self.document, "fullscreenchange", callback)
            }
            LayoutTrigger::Resize => self.listen(&self.window, "resize", callback),
            LayoutTrigger::Scroll => self.listen(&self.window, "scroll", callback),
        })
    }
}

/// The page's `<video>` element.
#[derive(Clone, Debug, PartialEq)]
pub struct WebMedia(pub HtmlVideoElement);

impl MediaElement for WebMedia {
    fn intrinsic_resolution(&self) -> Option<Resolution> {
        Resolution::from_intrinsic(self.0.video_width(), self.0.video_height())
    }

    fn playback_state(&self) -> PlaybackState {
        PlaybackState::from_flags(self.0.paused(), self.0.ended())
    }

    fn bounding_box(&self) -> Rect {
        let r = self.0.get_bounding_client_rect();
        Rect::new(r.top(), r.left(), r.width(), r.height())
    }
}

pub struct WebOverlay {
    id: String,
    document: Document,
    element: HtmlElement,
}

impl OverlayNode for WebOverlay {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_geometry(&self, rect: &Rect) -> Result<()> {
        let style = self.element.style();
        for (name, value) in rect.css_properties() {
            style
                .set_property(name, &value)
                .map_err(dom_err("overlay geometry"))?;
        }
        Ok(())
    }

    fn add_annotation(&self, local: &Rect, label: Option<&str>) -> Result<()> {
        let child = self
            .document
            .create_element("div")
            .map_err(dom_err("create annotation"))?
            .dyn_into::<HtmlElement>()
            .map_err(|_| CaptureError::Dom("annotation is not an HtmlElement".into()))?;
        child.set_class_name(ANNOTATION_CLASS);
        set_styles(
            &child,
            &[
                ("position", "absolute"),
                ("box-sizing", "border-box"),
                ("border", ANNOTATION_BORDER),
                ("color", "lime"),
                ("font", "12px sans-serif"),
            ],
        )?;
        let style = child.style();
        for (name, value) in local.css_properties() {
            style
                .set_property(name, &value)
                .map_err(dom_err("annotation geometry"))?;
        }
        if let Some(label) = label {
            child.set_text_content(Some(label));
        }
        self.element
            .append_child(&child)
            .map_err(dom_err("insert annotation"))?;
        Ok(())
    }

    fn clear_annotations(&self) -> Result<()> {
        self.element.set_inner_html("");
        Ok(())
    }

    fn detach(&self) {
        self.element.remove();
    }
}

/// Detached `<canvas>` used as the sampling surface's raster buffer.
pub struct WebRaster {
    canvas: HtmlCanvasElement,
    context: CanvasRenderingContext2d,
}

impl RasterTarget for WebRaster {
    type Media = WebMedia;

    fn resize(&mut self, resolution: Resolution) -> Result<()> {
        self.canvas.set_width(resolution.width);
        self.canvas.set_height(resolution.height);
        Ok(())
    }

    fn draw(&mut self, media: &WebMedia, resolution: Resolution) -> Result<()> {
        self.context
            .draw_image_with_html_video_element_and_dw_and_dh(
                &media.0,
                0.0,
                0.0,
                resolution.width as f64,
                resolution.height as f64,
            )
            .map_err(|e| CaptureError::Draw(format!("{e:?}")))
    }

    fn export(&self, encoding: &SnapshotEncoding) -> Result<String> {
        // A tainted (cross-origin) canvas throws here; that tick is skipped.
        self.canvas
            .to_data_url_with_type_and_encoder_options(
                encoding.format.mime_type(),
                &JsValue::from_f64(encoding.quality),
            )
            .map_err(|e| CaptureError::Encode(format!("{e:?}")))
    }
}
