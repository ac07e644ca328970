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

//! Downstream hooks that receive each captured snapshot.

use std::cell::RefCell;
use std::rc::Rc;

use log::info;

use crate::constants::LOG_PREVIEW_CHARS;
use crate::snapshot::Snapshot;

/// Receives snapshots from the frame sampler.
///
/// Called synchronously from the sampling tick, so implementations should hand
/// heavy work (recognition, network) off to a task of their own. The snapshot
/// is only borrowed: a sink that wants to keep it must clone it.
pub trait FrameSink: 'static {
    fn on_snapshot(&self, snapshot: &Snapshot);
}

/// Logs a short preview of each snapshot.
#[derive(Clone, Debug, Default)]
pub struct LogSink;

impl FrameSink for LogSink {
    fn on_snapshot(&self, snapshot: &Snapshot) {
        let preview: String = snapshot.data_url.chars().take(LOG_PREVIEW_CHARS).collect();
        info!(
            "Captured frame #{} ({}, {} base64 chars): {}...",
            snapshot.sequence,
            snapshot.resolution,
            snapshot.payload_len(),
            preview
        );
    }
}

/// Keeps only the most recent snapshot.
#[derive(Clone, Debug, Default)]
pub struct LatestSnapshot {
    latest: Rc<RefCell<Option<Snapshot>>>,
}

impl LatestSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<Snapshot> {
        self.latest.borrow().clone()
    }

    pub fn take(&self) -> Option<Snapshot> {
        self.latest.borrow_mut().take()
    }
}

impl FrameSink for LatestSnapshot {
    fn on_snapshot(&self, snapshot: &Snapshot) {
        *self.latest.borrow_mut() = Some(snapshot.clone());
    }
}

/// A sink backed by a closure.
pub struct FnSink {
    on_snapshot: Box<dyn Fn(&Snapshot)>,
}

impl FnSink {
    pub fn new<F>(on_snapshot: F) -> Self
    where
        F: Fn(&Snapshot) + 'static,
    {
        Self {
            on_snapshot: Box::new(on_snapshot),
        }
    }
}

impl FrameSink for FnSink {
    fn on_snapshot(&self, snapshot: &Snapshot) {
        (self.on_snapshot)(snapshot)
    }
}

/// Create a shared [`FnSink`] from a closure.
///
/// ```ignore
/// let sink = create_frame_sink(|snapshot| pipeline.submit(snapshot.data_url.clone()));
/// ```
pub fn create_frame_sink<F>(on_snapshot: F) -> Rc<dyn FrameSink>
where
    F: Fn(&Snapshot) + 'static,
{
    Rc::new(FnSink::new(on_snapshot))
}

/// Forwards each snapshot to several sinks in order.
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Rc<dyn FrameSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Rc<dyn FrameSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl FrameSink for FanoutSink {
    fn on_snapshot(&self, snapshot: &Snapshot) {
        for sink in &self.sinks {
            sink.on_snapshot(snapshot);
        }
    }
}
