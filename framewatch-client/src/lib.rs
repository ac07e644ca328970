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

//! This crate finds the video element on a page it does not control, keeps an
//! input-transparent overlay pixel-aligned to it and samples its frames once a
//! second for a downstream recognition pipeline.
//!
//! The engine is written against the [`Host`] trait. In the browser the
//! [`WebHost`](web::WebHost) implementation drives real DOM nodes; natively the
//! [`HeadlessHost`](headless::HeadlessHost) keeps an in-memory document that
//! tests and embedders can script.
//!
//! # Outline of usage
//!
//! ```no_run
//! # use std::rc::Rc;
//! # use framewatch_client::*;
//! # fn run<H: Host>(host: H) -> Result<()> {
//! let latest = LatestSnapshot::new();
//! let session =
//!     CaptureSession::start(Rc::new(host), CaptureConfig::default(), Rc::new(latest.clone()))?;
//!
//! // later, from any callback
//! if let Some(snapshot) = latest.take() {
//!     let jpeg = snapshot.decode_payload()?;
//! }
//! if let Some(overlay) = session.overlay() {
//!     overlay.annotate(&[Annotation::labelled(Rect::new(40.0, 60.0, 200.0, 280.0), "card")])?;
//! }
//!
//! session.stop();
//! # Ok(())
//! # }
//! ```
//!
//! With the default `content-script` feature on wasm, a start function
//! attaches to the page automatically once it has loaded.

pub mod config;
pub mod constants;
pub mod error;
pub mod event_bus;
pub mod events;
pub mod geometry;
pub mod host;
pub mod layout_sync;
pub mod locator;
pub mod overlay;
pub mod platform;
pub mod sampler;
pub mod session;
pub mod sink;
pub mod snapshot;
pub mod surface;

#[cfg(not(target_arch = "wasm32"))]
pub mod headless;
#[cfg(target_arch = "wasm32")]
pub mod web;

#[cfg(all(target_arch = "wasm32", feature = "content-script"))]
mod content_script;

pub use config::{CaptureConfig, LocatorPolicy, OverlayStyle, ViewportResync};
pub use error::{CaptureError, Result};
pub use event_bus::{emit_capture_event, global_capture_sender, subscribe_capture_events};
pub use events::CaptureEvent;
pub use geometry::{Rect, Resolution};
pub use host::{Host, LayoutTrigger, MediaElement, OverlayNode, PlaybackState, RasterTarget};
pub use layout_sync::LayoutSynchronizer;
pub use locator::{ElementLocator, LocatorPoll};
pub use overlay::{Annotation, OverlayHandle};
pub use sampler::{FrameSampler, SamplerStats, SkipReason, TickOutcome, TickState};
pub use session::{CaptureSession, SessionState};
pub use sink::{create_frame_sink, FanoutSink, FnSink, FrameSink, LatestSnapshot, LogSink};
pub use snapshot::{ImageFormat, Snapshot, SnapshotEncoding};
pub use surface::SamplingSurface;
