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

//! Periodic frame capture.
//!
//! Each tick looks at the playback state afresh: playing means capture and
//! forward, anything else means skip. There is no hysteresis, so a pause is
//! honoured on the very next tick and so is a resume.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use framewatch_diagnostics::{metric, publish, DiagEvent};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::{CaptureError, Result};
use crate::event_bus::emit_capture_event;
use crate::events::CaptureEvent;
use crate::geometry::Resolution;
use crate::host::{Host, MediaElement, PlaybackState};
use crate::sink::FrameSink;
use crate::surface::SamplingSurface;

/// What a tick decides to do, from the playback state alone.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickState {
    Idle,
    Active,
}

impl From<PlaybackState> for TickState {
    fn from(state: PlaybackState) -> Self {
        if state.is_playing() {
            TickState::Active
        } else {
            TickState::Idle
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    Paused,
    Ended,
    /// Metadata has not loaded, so the surface has no size yet.
    Unconfigured,
    /// Drawing or encoding failed for this tick only.
    CaptureFailed,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TickOutcome {
    Captured { sequence: u64, resolution: Resolution },
    Skipped(SkipReason),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplerStats {
    pub ticks: u64,
    pub captured: u64,
    pub skipped_inactive: u64,
    pub skipped_unconfigured: u64,
    pub failed: u64,
    /// Total base64 payload bytes handed to the sink.
    pub encoded_bytes: u64,
}

pub struct FrameSampler<H: Host> {
    media: H::Media,
    surface: RefCell<SamplingSurface<H::Raster>>,
    sink: Rc<dyn FrameSink>,
    stream_id: String,
    stats: Cell<SamplerStats>,
}

impl<H: Host> FrameSampler<H> {
    pub fn new(
        media: H::Media,
        surface: SamplingSurface<H::Raster>,
        sink: Rc<dyn FrameSink>,
        stream_id: impl Into<String>,
    ) -> Self {
        Self {
            media,
            surface: RefCell::new(surface),
            sink,
            stream_id: stream_id.into(),
            stats: Cell::new(SamplerStats::default()),
        }
    }

    /// Sizes the owned surface; see [`SamplingSurface::configure`].
    pub fn configure(&self, resolution: Resolution) -> Result<bool> {
        let changed = self
            .surface
            .borrow_mut()
            .configure(resolution.width, resolution.height)?;
        if changed {
            emit_capture_event(CaptureEvent::SurfaceConfigured(resolution));
        }
        Ok(changed)
    }

    pub fn resolution(&self) -> Option<Resolution> {
        self.surface.borrow().resolution()
    }

    pub fn stats(&self) -> SamplerStats {
        self.stats.get()
    }

    /// Runs one sampling tick. Never fails: every problem becomes a skip.
    pub fn tick(&self) -> TickOutcome {
        let mut stats = self.stats.get();
        let encoded_before = stats.encoded_bytes;
        stats.ticks += 1;

        let playback = self.media.playback_state();
        let outcome = match TickState::from(playback) {
            TickState::Idle => {
                stats.skipped_inactive += 1;
                TickOutcome::Skipped(match playback {
                    PlaybackState::Ended => SkipReason::Ended,
                    _ => SkipReason::Paused,
                })
            }
            TickState::Active => self.capture(&mut stats),
        };
        self.stats.set(stats);

        match &outcome {
            TickOutcome::Captured {
                sequence,
                resolution,
            } => emit_capture_event(CaptureEvent::SnapshotCaptured {
                sequence: *sequence,
                resolution: *resolution,
            }),
            TickOutcome::Skipped(reason) => emit_capture_event(CaptureEvent::TickSkipped(*reason)),
        }
        self.report(&stats, stats.encoded_bytes - encoded_before);
        outcome
    }

    fn capture(&self, stats: &mut SamplerStats) -> TickOutcome {
        let result = self.surface.borrow_mut().capture_frame(&self.media);
        match result {
            Ok(snapshot) => {
                stats.captured += 1;
                stats.encoded_bytes += snapshot.payload_len() as u64;
                // The surface borrow is released before handing off, so a
                // sink may call back into the sampler.
                self.sink.on_snapshot(&snapshot);
                TickOutcome::Captured {
                    sequence: snapshot.sequence,
                    resolution: snapshot.resolution,
                }
            }
            Err(CaptureError::SurfaceNotConfigured) => {
                stats.skipped_unconfigured += 1;
                debug!("Playing but metadata not loaded yet, skipping tick");
                TickOutcome::Skipped(SkipReason::Unconfigured)
            }
            Err(e) => {
                stats.failed += 1;
                warn!("Frame capture failed, skipping tick: {e}");
                TickOutcome::Skipped(SkipReason::CaptureFailed)
            }
        }
    }

    /// Publishes the running counters plus this tick's encoded size.
    fn report(&self, stats: &SamplerStats, encode_bytes: u64) {
        let surface = self.surface.borrow();
        let mut event = DiagEvent::new("sampler")
            .with_stream(self.stream_id.clone())
            .with_metric(metric!("ticks", stats.ticks))
            .with_metric(metric!("captured", stats.captured))
            .with_metric(metric!(
                "skipped",
                stats.skipped_inactive + stats.skipped_unconfigured
            ))
            .with_metric(metric!("encode_bytes", encode_bytes))
            .with_metric(metric!("failed", stats.failed));
        if let Some(ms) = surface.last_capture_ms() {
            event = event.with_metric(metric!("capture_ms", ms));
        }
        publish(event);
    }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;
    use crate::headless::{HeadlessHost, HeadlessMedia};
    use crate::host::Host;
    use crate::sink::LatestSnapshot;
    use crate::snapshot::SnapshotEncoding;
    use async_broadcast::{Receiver, TryRecvError};
    use framewatch_diagnostics::{subscribe, MetricValue};

    fn sampler(
        host: &HeadlessHost,
        media: &HeadlessMedia,
        sink: &LatestSnapshot,
    ) -> FrameSampler<HeadlessHost> {
        let surface =
            SamplingSurface::new(host.create_raster().unwrap(), SnapshotEncoding::default());
        FrameSampler::new(media.clone(), surface, Rc::new(sink.clone()), "test-overlay")
    }

    #[test]
    fn paused_and_ended_ticks_are_skipped() {
        let host = HeadlessHost::new();
        let media = HeadlessMedia::new().with_playback(PlaybackState::Paused);
        let sink = LatestSnapshot::new();
        let sampler = sampler(&host, &media, &sink);
        sampler.configure(Resolution::new(64, 36)).unwrap();

        assert_eq!(sampler.tick(), TickOutcome::Skipped(SkipReason::Paused));
        media.set_playback(PlaybackState::Ended);
        assert_eq!(sampler.tick(), TickOutcome::Skipped(SkipReason::Ended));
        assert!(sink.get().is_none());
        assert_eq!(sampler.stats().skipped_inactive, 2);
        assert_eq!(sampler.stats().captured, 0);
    }

    #[test]
    fn playing_tick_produces_one_snapshot_at_configured_size() {
        let host = HeadlessHost::new();
        let media = HeadlessMedia::new().with_playback(PlaybackState::Playing);
        let sink = LatestSnapshot::new();
        let sampler = sampler(&host, &media, &sink);
        sampler.configure(Resolution::new(128, 72)).unwrap();

        assert_eq!(
            sampler.tick(),
            TickOutcome::Captured {
                sequence: 1,
                resolution: Resolution::new(128, 72)
            }
        );
        let snapshot = sink.take().unwrap();
        assert_eq!(snapshot.resolution, Resolution::new(128, 72));
        assert_eq!(sampler.stats().captured, 1);
    }

    #[test]
    fn playing_before_metadata_skips_without_snapshot() {
        let host = HeadlessHost::new();
        let media = HeadlessMedia::new().with_playback(PlaybackState::Playing);
        let sink = LatestSnapshot::new();
        let sampler = sampler(&host, &media, &sink);

        assert_eq!(sampler.tick(), TickOutcome::Skipped(SkipReason::Unconfigured));
        assert!(sink.get().is_none());
        assert_eq!(sampler.stats().skipped_unconfigured, 1);
    }

    #[test]
    fn draw_failure_degrades_to_skip() {
        let host = HeadlessHost::new();
        let media = HeadlessMedia::new().with_playback(PlaybackState::Playing);
        let sink = LatestSnapshot::new();
        let sampler = sampler(&host, &media, &sink);
        sampler.configure(Resolution::new(16, 16)).unwrap();

        media.set_draw_failure(Some("tainted canvas".into()));
        assert_eq!(sampler.tick(), TickOutcome::Skipped(SkipReason::CaptureFailed));
        media.set_draw_failure(None);
        assert!(matches!(sampler.tick(), TickOutcome::Captured { sequence: 1, .. }));
        assert_eq!(sampler.stats().failed, 1);
        assert_eq!(sampler.stats().ticks, 2);
    }

    fn sampler_events(rx: &mut Receiver<DiagEvent>, stream_id: &str) -> Vec<DiagEvent> {
        let mut events = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(event) if event.stream_id.as_deref() == Some(stream_id) => events.push(event),
                Ok(_) | Err(TryRecvError::Overflowed(_)) => continue,
                Err(_) => break,
            }
        }
        events
    }

    #[test]
    fn every_tick_publishes_counters_and_encoded_size() {
        let host = HeadlessHost::new();
        let media = HeadlessMedia::new().with_playback(PlaybackState::Playing);
        let sink = LatestSnapshot::new();
        let surface =
            SamplingSurface::new(host.create_raster().unwrap(), SnapshotEncoding::default());
        let sampler: FrameSampler<HeadlessHost> =
            FrameSampler::new(media.clone(), surface, Rc::new(sink.clone()), "sampler-metrics");
        sampler.configure(Resolution::new(32, 18)).unwrap();
        let mut rx = subscribe();

        sampler.tick();
        let captured = sampler_events(&mut rx, "sampler-metrics");
        let payload = sink.take().unwrap().payload_len() as u64;
        assert!(payload > 0);
        assert_eq!(captured.len(), 1);
        let event = &captured[0];
        assert_eq!(event.subsystem, "sampler");
        assert_eq!(event.metric("ticks"), Some(&MetricValue::U64(1)));
        assert_eq!(event.metric("captured"), Some(&MetricValue::U64(1)));
        assert_eq!(event.metric("skipped"), Some(&MetricValue::U64(0)));
        assert_eq!(event.metric("encode_bytes"), Some(&MetricValue::U64(payload)));

        media.pause();
        sampler.tick();
        let skipped = sampler_events(&mut rx, "sampler-metrics");
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].metric("ticks"), Some(&MetricValue::U64(2)));
        assert_eq!(skipped[0].metric("skipped"), Some(&MetricValue::U64(1)));
        assert_eq!(skipped[0].metric("encode_bytes"), Some(&MetricValue::U64(0)));
        assert_eq!(sampler.stats().encoded_bytes, payload);
    }

    #[test]
    fn tick_state_follows_playback_without_hysteresis() {
        assert_eq!(TickState::from(PlaybackState::Playing), TickState::Active);
        assert_eq!(TickState::from(PlaybackState::Paused), TickState::Idle);
        assert_eq!(TickState::from(PlaybackState::Ended), TickState::Idle);
    }
}
