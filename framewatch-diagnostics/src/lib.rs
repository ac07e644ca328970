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

//! Diagnostics bus for the framewatch engine.
//!
//! The locator and the frame sampler publish a [`DiagEvent`] per poll or tick.
//! Anything interested (a debug panel in the host extension, a test) calls
//! [`subscribe`] and reads them back. The bus is bounded and overwrites its
//! oldest entries, so a page that never subscribes never accumulates events.

use async_broadcast::{broadcast, InactiveReceiver, Receiver, Sender};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// Number of events retained for slow subscribers before the oldest is dropped.
pub const DIAG_BUS_CAPACITY: usize = 128;

// --- events ---

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DiagEvent {
    /// Sub-system that produced this event (e.g. "sampler", "locator").
    pub subsystem: &'static str,
    /// Optional identifier of the observed element (the overlay id for sampler events).
    pub stream_id: Option<String>,
    /// Unix time in milliseconds when the metric was captured.
    pub ts_ms: u64,
    /// Arbitrary key/value metrics.
    pub metrics: Vec<Metric>,
}

impl DiagEvent {
    pub fn new(subsystem: &'static str) -> Self {
        Self {
            subsystem,
            stream_id: None,
            ts_ms: now_ms(),
            metrics: Vec::new(),
        }
    }

    pub fn with_stream(mut self, stream_id: impl Into<String>) -> Self {
        self.stream_id = Some(stream_id.into());
        self
    }

    pub fn with_metric(mut self, metric: Metric) -> Self {
        self.metrics.push(metric);
        self
    }

    /// Looks up a metric by name.
    pub fn metric(&self, name: &str) -> Option<&MetricValue> {
        self.metrics
            .iter()
            .find(|m| m.name == name)
            .map(|m| &m.value)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Metric {
    pub name: &'static str,
    pub value: MetricValue,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum MetricValue {
    I64(i64),
    U64(u64),
    F64(f64),
    Text(String),
}

// --- bus ---

static BUS: Lazy<(Sender<DiagEvent>, InactiveReceiver<DiagEvent>)> = Lazy::new(|| {
    let (mut sender, receiver) = broadcast(DIAG_BUS_CAPACITY);
    sender.set_overflow(true);
    // Keeping an inactive receiver stops the channel from closing while
    // nobody is subscribed, without buffering anything for it.
    (sender, receiver.deactivate())
});

/// Sender side of the bus, for publishers that batch their own events.
pub fn global_sender() -> &'static Sender<DiagEvent> {
    &BUS.0
}

/// A fresh receiver; it sees every event published from now on.
pub fn subscribe() -> Receiver<DiagEvent> {
    BUS.0.new_receiver()
}

/// Publish an event. Never blocks; a bus without subscribers discards the event.
#[cfg(feature = "diagnostics")]
pub fn publish(event: DiagEvent) {
    let _ = BUS.0.try_broadcast(event);
}

#[cfg(not(feature = "diagnostics"))]
pub fn publish(_event: DiagEvent) {}

// --- clock ---

/// Milliseconds since the Unix epoch.
#[cfg(not(target_arch = "wasm32"))]
pub fn now_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(target_arch = "wasm32")]
pub fn now_ms() -> u64 {
    js_sys::Date::now() as u64
}

// --- metric! ---

/// `metric!("ticks", 3u64)` builds a [`Metric`].
#[macro_export]
macro_rules! metric {
    ($name:expr, $value:expr) => {
        $crate::Metric {
            name: $name,
            value: $crate::MetricValue::from($value),
        }
    };
}

// Implement `From` conversions so `metric!("captured", 3u64)` works for common types.
impl From<i64> for MetricValue {
    fn from(v: i64) -> Self {
        MetricValue::I64(v)
    }
}
impl From<u64> for MetricValue {
    fn from(v: u64) -> Self {
        MetricValue::U64(v)
    }
}
impl From<u32> for MetricValue {
    fn from(v: u32) -> Self {
        MetricValue::U64(v as u64)
    }
}
impl From<usize> for MetricValue {
    fn from(v: usize) -> Self {
        MetricValue::U64(v as u64)
    }
}
impl From<f64> for MetricValue {
    fn from(v: f64) -> Self {
        MetricValue::F64(v)
    }
}
impl From<&str> for MetricValue {
    fn from(v: &str) -> Self {
        MetricValue::Text(v.to_string())
    }
}
impl From<String> for MetricValue {
    fn from(v: String) -> Self {
        MetricValue::Text(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_macro_converts_common_types() {
        let m = metric!("ticks", 3u64);
        assert_eq!(m.value, MetricValue::U64(3));
        let m = metric!("state", "idle");
        assert_eq!(m.value, MetricValue::Text("idle".into()));
        let m = metric!("quality", 0.8);
        assert_eq!(m.value, MetricValue::F64(0.8));
    }

    #[test]
    fn event_builder_and_lookup() {
        let event = DiagEvent::new("sampler")
            .with_stream("card-overlay-container")
            .with_metric(metric!("captured", 2u64));
        assert_eq!(event.stream_id.as_deref(), Some("card-overlay-container"));
        assert_eq!(event.metric("captured"), Some(&MetricValue::U64(2)));
        assert!(event.metric("missing").is_none());
        assert!(event.to_json().contains("\"subsystem\":\"sampler\""));
    }

    #[test]
    fn subscriber_receives_published_events() {
        let mut rx = subscribe();
        publish(DiagEvent::new("diag-test").with_metric(metric!("n", 7u64)));
        let mut found = false;
        loop {
            match rx.try_recv() {
                Ok(event) if event.subsystem == "diag-test" => {
                    assert_eq!(event.metric("n"), Some(&MetricValue::U64(7)));
                    found = true;
                }
                Ok(_) | Err(async_broadcast::TryRecvError::Overflowed(_)) => continue,
                Err(_) => break,
            }
        }
        assert!(found, "published event was not delivered");
    }

    #[test]
    fn publishing_without_subscribers_keeps_bus_open() {
        publish(DiagEvent::new("unobserved"));
        assert!(!global_sender().is_closed());
    }
}
