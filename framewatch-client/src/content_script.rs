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

//! Content-script entry point.
//!
//! On module start the engine waits for the page's `load` event and then
//! starts a session with the default configuration, logging snapshots to the
//! console. The extension can restart it with its own configuration through
//! `startCapture(config)` or stop it with `stopCapture()`.

use std::cell::RefCell;
use std::rc::Rc;

use anyhow::{anyhow, Context};
use framewatch_logger::{ConsoleConfig, ConsoleLogger};
use gloo::events::EventListener;
use log::{error, info};
use wasm_bindgen::prelude::*;

use crate::config::CaptureConfig;
use crate::session::CaptureSession;
use crate::sink::LogSink;
use crate::web::WebHost;

thread_local! {
    static ACTIVE: RefCell<Option<CaptureSession<WebHost>>> = const { RefCell::new(None) };
    static LOAD_LISTENER: RefCell<Option<EventListener>> = const { RefCell::new(None) };
}

#[wasm_bindgen(start)]
pub fn start() {
    console_error_panic_hook::set_once();
    // A second copy of the module on the page already owns the logger.
    let _ = ConsoleLogger::init(ConsoleConfig::default());
    info!("framewatch content script loaded");

    if let Err(e) = when_loaded(|| {
        if let Err(e) = attach(CaptureConfig::default()) {
            error!("Could not start capture: {e:#}");
        }
    }) {
        error!("Could not wait for page load: {e:#}");
    }
}

/// Starts (or restarts) capture. `config` is a partial `CaptureConfig`
/// object; missing fields take their defaults.
#[wasm_bindgen(js_name = startCapture)]
pub fn start_capture(config: JsValue) -> Result<(), JsValue> {
    let config = if config.is_undefined() || config.is_null() {
        CaptureConfig::default()
    } else {
        serde_wasm_bindgen::from_value(config)?
    };
    attach(config).map_err(|e| JsValue::from_str(&format!("{e:#}")))
}

#[wasm_bindgen(js_name = stopCapture)]
pub fn stop_capture() {
    let session = ACTIVE.with(|active| active.borrow_mut().take());
    if let Some(session) = session {
        session.stop();
    }
}

/// `"Searching"`, `"Running"`, `"Exhausted"`, `"Stopped"` or `undefined`.
#[wasm_bindgen(js_name = captureState)]
pub fn capture_state() -> JsValue {
    ACTIVE.with(|active| {
        active
            .borrow()
            .as_ref()
            .and_then(|session| serde_wasm_bindgen::to_value(&session.state()).ok())
            .unwrap_or(JsValue::UNDEFINED)
    })
}

fn attach(config: CaptureConfig) -> anyhow::Result<()> {
    let host = WebHost::new().context("no document to attach to")?;
    let session = CaptureSession::start(Rc::new(host), config, Rc::new(LogSink))
        .context("invalid capture configuration")?;
    let previous = ACTIVE.with(|active| active.borrow_mut().replace(session));
    // Dropped outside the borrow; tears down the old overlay and timers.
    drop(previous);
    Ok(())
}

fn when_loaded(run: impl FnOnce() + 'static) -> anyhow::Result<()> {
    let window = web_sys::window().ok_or_else(|| anyhow!("no global window"))?;
    let document = window
        .document()
        .ok_or_else(|| anyhow!("window has no document"))?;
    if document.ready_state() == "complete" {
        run();
        return Ok(());
    }
    let listener = EventListener::once(&window, "load", move |_| run());
    LOAD_LISTENER.with(|slot| *slot.borrow_mut() = Some(listener));
    Ok(())
}
