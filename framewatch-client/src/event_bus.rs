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

//! Global event bus for capture lifecycle events.
//!
//! This module provides a MPMC (multi-producer, multi-consumer) broadcast channel
//! for capture events. Any component can subscribe to receive events, and any
//! component can emit events.
//!
//! # Example
//!
//! ```ignore
//! use framewatch_client::{subscribe_capture_events, CaptureEvent};
//!
//! let mut rx = subscribe_capture_events();
//! wasm_bindgen_futures::spawn_local(async move {
//!     while let Ok(event) = rx.recv().await {
//!         if let CaptureEvent::GeometryUpdated(rect) = event {
//!             // re-layout annotation widgets
//!         }
//!     }
//! });
//! ```

use crate::events::CaptureEvent;
use async_broadcast::{broadcast, InactiveReceiver, Receiver, Sender};
use once_cell::sync::Lazy;

/// Capacity of the event bus channel
pub const EVENT_BUS_CAPACITY: usize = 256;

/// Global sender plus an inactive receiver that keeps the channel open while
/// nobody is subscribed.
static BUS: Lazy<(Sender<CaptureEvent>, InactiveReceiver<CaptureEvent>)> = Lazy::new(|| {
    let (mut sender, receiver) = broadcast(EVENT_BUS_CAPACITY);
    // Drop the oldest event instead of failing when a subscriber lags.
    sender.set_overflow(true);
    (sender, receiver.deactivate())
});

/// Get the global sender for emitting capture events.
pub fn global_capture_sender() -> Sender<CaptureEvent> {
    BUS.0.clone()
}

/// Subscribe to capture events.
///
/// Returns a receiver that will receive all future capture events.
/// Each subscriber receives all events independently (broadcast pattern).
pub fn subscribe_capture_events() -> Receiver<CaptureEvent> {
    BUS.0.new_receiver()
}

/// Emit a capture event to all subscribers.
///
/// This is a non-blocking operation. Without subscribers the event is
/// discarded; a full channel drops its oldest message.
pub fn emit_capture_event(event: CaptureEvent) {
    let _ = BUS.0.try_broadcast(event);
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_broadcast::TryRecvError;

    fn drain(rx: &mut Receiver<CaptureEvent>) -> Vec<CaptureEvent> {
        let mut out = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(event) => out.push(event),
                Err(TryRecvError::Overflowed(_)) => continue,
                Err(_) => return out,
            }
        }
    }

    #[test]
    fn subscribers_each_receive_emitted_events() {
        let mut rx1 = subscribe_capture_events();
        let mut rx2 = subscribe_capture_events();
        let marker = CaptureEvent::LocatorExhausted { attempts: 4242 };
        emit_capture_event(marker.clone());
        assert!(drain(&mut rx1).contains(&marker));
        assert!(drain(&mut rx2).contains(&marker));
    }

    #[test]
    fn emitting_without_subscribers_keeps_bus_usable() {
        emit_capture_event(CaptureEvent::Stopped);
        assert!(!global_capture_sender().is_closed());
        assert_eq!(subscribe_capture_events().capacity(), EVENT_BUS_CAPACITY);
    }
}
