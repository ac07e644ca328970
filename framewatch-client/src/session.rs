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

//! The capture session: locator, surface, overlay, synchronizer and sampler
//! wired together.
//!
//! ```text
//!   Searching --found--> Running --stop/drop--> Stopped
//!       |                                          ^
//!       +--max_attempts--> Exhausted --stop/drop---+
//! ```
//!
//! Everything a session starts (the locator task, the sample timer, the
//! optional viewport timer and every event listener) is owned by the session
//! and released by [`CaptureSession::stop`] or on drop. Timer and listener
//! callbacks only hold weak references, so nothing outlives the handle.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use log::{error, info, warn};
use serde::{Deserialize, Serialize};

use crate::config::CaptureConfig;
use crate::error::Result;
use crate::event_bus::emit_capture_event;
use crate::events::CaptureEvent;
use crate::geometry::Rect;
use crate::host::{Callback, Host, LayoutTrigger, MediaElement, Subscription};
use crate::layout_sync::LayoutSynchronizer;
use crate::locator::{ElementLocator, LocatorPoll};
use crate::overlay::OverlayHandle;
use crate::platform::{sleep_ms, spawn_cancellable, IntervalHandle, TaskHandle};
use crate::sampler::{FrameSampler, SamplerStats};
use crate::sink::FrameSink;
use crate::surface::SamplingSurface;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// Polling for the media element.
    Searching,
    /// Initialized; sampling and keeping the overlay aligned.
    Running,
    /// The locator ran out of attempts without finding anything.
    Exhausted,
    Stopped,
}

/// Everything that exists once the media element is found.
struct Pipeline<H: Host> {
    media: H::Media,
    sampler: Rc<FrameSampler<H>>,
    synchronizer: Rc<LayoutSynchronizer<H>>,
    _subscriptions: Vec<Subscription>,
    _sample_timer: IntervalHandle,
    _resync_timer: Option<IntervalHandle>,
}

struct SessionInner<H: Host> {
    host: Rc<H>,
    config: CaptureConfig,
    sink: Rc<dyn FrameSink>,
    state: Cell<SessionState>,
    locator_attempts: Cell<u32>,
    locator_task: RefCell<Option<TaskHandle>>,
    pipeline: RefCell<Option<Pipeline<H>>>,
}

/// Owning handle to a running capture. Dropping it tears everything down.
pub struct CaptureSession<H: Host> {
    inner: Rc<SessionInner<H>>,
}

impl<H: Host> CaptureSession<H> {
    /// Validates `config` and starts looking for the media element.
    ///
    /// Must be called from within the platform executor (the browser, or a
    /// tokio `LocalSet` natively). The first poll happens one locator
    /// interval after this call.
    pub fn start(host: Rc<H>, config: CaptureConfig, sink: Rc<dyn FrameSink>) -> Result<Self> {
        config.validate()?;
        if config.encoding.is_debug_override() {
            warn!(
                "Snapshots will be {} instead of lossy JPEG; use this for debugging only",
                config.encoding.format.mime_type()
            );
        }
        let inner = Rc::new(SessionInner {
            host,
            config,
            sink,
            state: Cell::new(SessionState::Searching),
            locator_attempts: Cell::new(0),
            locator_task: RefCell::new(None),
            pipeline: RefCell::new(None),
        });

        let locator = ElementLocator::new(
            inner.config.media_selector.clone(),
            inner.config.locator.clone(),
        );
        let task = spawn_cancellable(run_locator(Rc::downgrade(&inner), locator));
        *inner.locator_task.borrow_mut() = Some(task);

        info!(
            "Capture session started, looking for '{}'",
            inner.config.media_selector
        );
        Ok(Self { inner })
    }

    pub fn state(&self) -> SessionState {
        self.inner.state.get()
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.inner.config
    }

    /// Element id annotation collaborators can look the overlay up by.
    pub fn overlay_id(&self) -> &str {
        &self.inner.config.overlay.element_id
    }

    /// The overlay handle, once the session is running.
    pub fn overlay(&self) -> Option<OverlayHandle<H::Overlay>> {
        self.inner
            .pipeline
            .borrow()
            .as_ref()
            .map(|p| p.synchronizer.overlay().clone())
    }

    pub fn media(&self) -> Option<H::Media> {
        self.inner.pipeline.borrow().as_ref().map(|p| p.media.clone())
    }

    pub fn locator_attempts(&self) -> u32 {
        self.inner.locator_attempts.get()
    }

    pub fn sampler_stats(&self) -> Option<SamplerStats> {
        self.inner
            .pipeline
            .borrow()
            .as_ref()
            .map(|p| p.sampler.stats())
    }

    /// Forces a layout pass, for embedders that know about layout changes
    /// the engine does not listen for.
    pub fn recompute_layout(&self) -> Option<Rect> {
        let synchronizer = self
            .inner
            .pipeline
            .borrow()
            .as_ref()
            .map(|p| p.synchronizer.clone())?;
        synchronizer.recompute()
    }

    /// Cancels every timer, removes every listener and detaches the overlay.
    /// Idempotent.
    pub fn stop(&self) {
        self.inner.teardown();
    }
}

impl<H: Host> Drop for CaptureSession<H> {
    fn drop(&mut self) {
        self.inner.teardown();
    }
}

async fn run_locator<H: Host>(session: Weak<SessionInner<H>>, mut locator: ElementLocator) {
    loop {
        sleep_ms(locator.next_delay_ms()).await;
        let Some(inner) = session.upgrade() else {
            return;
        };
        let poll = locator.poll(inner.host.as_ref());
        inner.locator_attempts.set(locator.attempts());
        match poll {
            LocatorPoll::Pending { .. } => continue,
            LocatorPoll::Found(media) => {
                emit_capture_event(CaptureEvent::MediaFound {
                    attempts: locator.attempts(),
                });
                inner.initialize(media);
                return;
            }
            LocatorPoll::Exhausted { attempts } => {
                inner.state.set(SessionState::Exhausted);
                emit_capture_event(CaptureEvent::LocatorExhausted { attempts });
                return;
            }
            LocatorPoll::Finished { .. } => return,
        }
    }
}

impl<H: Host> SessionInner<H> {
    fn initialize(&self, media: H::Media) {
        if self.state.get() != SessionState::Searching {
            return;
        }
        match self.build_pipeline(media) {
            Ok(pipeline) => {
                *self.pipeline.borrow_mut() = Some(pipeline);
                self.state.set(SessionState::Running);
                info!("Capture session running");
            }
            Err(e) => {
                error!("Capture session failed to initialize: {e}");
                self.state.set(SessionState::Stopped);
                emit_capture_event(CaptureEvent::Stopped);
            }
        }
    }

    /// Surface, overlay, synchronizer, sampler; in that order.
    fn build_pipeline(&self, media: H::Media) -> Result<Pipeline<H>> {
        let host = self.host.as_ref();
        let surface = SamplingSurface::new(host.create_raster()?, self.config.encoding);

        let overlay = OverlayHandle::attach(host, &self.config.overlay)?;
        emit_capture_event(CaptureEvent::OverlayAttached {
            element_id: overlay.id().to_string(),
        });

        let synchronizer = Rc::new(LayoutSynchronizer::<H>::new(media.clone(), overlay.clone()));
        let sampler = Rc::new(FrameSampler::<H>::new(
            media.clone(),
            surface,
            self.sink.clone(),
            overlay.id(),
        ));

        let wired = self.wire(&media, &sampler, &synchronizer);
        let (subscriptions, resync_timer) = match wired {
            Ok(wired) => wired,
            Err(e) => {
                overlay.detach();
                return Err(e);
            }
        };

        let weak_sampler = Rc::downgrade(&sampler);
        let sample_timer = IntervalHandle::new(self.config.sample_interval_ms, move || {
            if let Some(sampler) = weak_sampler.upgrade() {
                sampler.tick();
            }
        });

        Ok(Pipeline {
            media,
            sampler,
            synchronizer,
            _subscriptions: subscriptions,
            _sample_timer: sample_timer,
            _resync_timer: resync_timer,
        })
    }

    fn wire(
        &self,
        media: &H::Media,
        sampler: &Rc<FrameSampler<H>>,
        synchronizer: &Rc<LayoutSynchronizer<H>>,
    ) -> Result<(Vec<Subscription>, Option<IntervalHandle>)> {
        let host = self.host.as_ref();
        let mut subscriptions = Vec::new();

        let on_metadata: Callback = {
            let media = media.clone();
            let sampler = Rc::downgrade(sampler);
            let synchronizer = Rc::downgrade(synchronizer);
            Rc::new(move || {
                if let (Some(sampler), Some(synchronizer)) =
                    (sampler.upgrade(), synchronizer.upgrade())
                {
                    apply_metadata(&media, &sampler, &synchronizer);
                }
            })
        };
        subscriptions.push(host.on_metadata_loaded(media, on_metadata.clone())?);

        let on_fullscreen: Callback = {
            let synchronizer = Rc::downgrade(synchronizer);
            Rc::new(move || {
                if let Some(synchronizer) = synchronizer.upgrade() {
                    synchronizer.recompute();
                }
            })
        };
        subscriptions.push(host.on_layout_trigger(
            media,
            LayoutTrigger::FullscreenChange,
            on_fullscreen,
        )?);

        let resync_timer = match &self.config.viewport_resync {
            Some(resync) => {
                for trigger in [LayoutTrigger::Resize, LayoutTrigger::Scroll] {
                    let synchronizer = Rc::downgrade(synchronizer);
                    let mark: Callback = Rc::new(move || {
                        if let Some(synchronizer) = synchronizer.upgrade() {
                            synchronizer.mark_dirty();
                        }
                    });
                    subscriptions.push(host.on_layout_trigger(media, trigger, mark)?);
                }
                let synchronizer = Rc::downgrade(synchronizer);
                Some(IntervalHandle::new(resync.throttle_ms, move || {
                    if let Some(synchronizer) = synchronizer.upgrade() {
                        synchronizer.flush();
                    }
                }))
            }
            None => None,
        };

        // The element may have finished loading before it was found, in
        // which case no loadedmetadata event is coming.
        if media.intrinsic_resolution().is_some() {
            on_metadata();
        }

        Ok((subscriptions, resync_timer))
    }

    fn teardown(&self) {
        let previous = self.state.replace(SessionState::Stopped);
        if previous == SessionState::Stopped {
            return;
        }
        self.locator_task.borrow_mut().take();
        let pipeline = self.pipeline.borrow_mut().take();
        if let Some(pipeline) = pipeline {
            pipeline.synchronizer.overlay().detach();
            let stats = pipeline.sampler.stats();
            drop(pipeline);
            info!(
                "Capture session stopped after {} tick(s), {} snapshot(s)",
                stats.ticks, stats.captured
            );
        } else {
            info!("Capture session stopped while {previous:?}");
        }
        emit_capture_event(CaptureEvent::Stopped);
    }
}

fn apply_metadata<H: Host>(
    media: &H::Media,
    sampler: &FrameSampler<H>,
    synchronizer: &LayoutSynchronizer<H>,
) {
    let Some(resolution) = media.intrinsic_resolution() else {
        warn!("loadedmetadata fired without intrinsic dimensions, waiting for the next one");
        return;
    };
    if let Err(e) = sampler.configure(resolution) {
        warn!("Could not size the sampling surface: {e}");
        return;
    }
    synchronizer.overlay().set_intrinsic(resolution);
    synchronizer.recompute();
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;
    use crate::config::LocatorPolicy;
    use crate::error::CaptureError;
    use crate::headless::{HeadlessHost, HeadlessMedia};
    use crate::host::PlaybackState;
    use crate::sink::LatestSnapshot;
    use tokio::task::LocalSet;
    use tokio::time::{sleep, Duration};

    fn start(
        host: &HeadlessHost,
        config: CaptureConfig,
    ) -> (CaptureSession<HeadlessHost>, LatestSnapshot) {
        let latest = LatestSnapshot::new();
        let session =
            CaptureSession::start(Rc::new(host.clone()), config, Rc::new(latest.clone())).unwrap();
        (session, latest)
    }

    #[test]
    fn invalid_config_is_rejected_before_anything_starts() {
        let config = CaptureConfig {
            sample_interval_ms: 0,
            ..CaptureConfig::default()
        };
        let result = CaptureSession::start(
            Rc::new(HeadlessHost::new()),
            config,
            Rc::new(LatestSnapshot::new()),
        );
        assert!(matches!(result, Err(CaptureError::InvalidConfig(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn media_already_loaded_at_discovery_is_configured_immediately() {
        LocalSet::new()
            .run_until(async {
                let host = HeadlessHost::new();
                let media = HeadlessMedia::new()
                    .with_intrinsic(640, 360)
                    .with_bounding_box(Rect::new(10.0, 20.0, 320.0, 180.0))
                    .with_playback(PlaybackState::Playing);
                host.insert_media(media);
                let (session, latest) = start(&host, CaptureConfig::default());

                sleep(Duration::from_millis(600)).await;
                assert_eq!(session.state(), SessionState::Running);
                let overlay = session.overlay().unwrap();
                assert_eq!(overlay.geometry(), Some(Rect::new(10.0, 20.0, 320.0, 180.0)));

                sleep(Duration::from_millis(1000)).await;
                let snapshot = latest.get().unwrap();
                assert_eq!(snapshot.resolution.width, 640);
                assert_eq!(snapshot.resolution.height, 360);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_locator_initializes_nothing() {
        LocalSet::new()
            .run_until(async {
                let host = HeadlessHost::new();
                let config = CaptureConfig {
                    locator: LocatorPolicy {
                        max_attempts: Some(2),
                        ..LocatorPolicy::default()
                    },
                    ..CaptureConfig::default()
                };
                let (session, _latest) = start(&host, config);

                sleep(Duration::from_millis(1250)).await;
                assert_eq!(session.state(), SessionState::Exhausted);
                assert_eq!(session.locator_attempts(), 2);

                // Media showing up later changes nothing.
                host.insert_media(HeadlessMedia::new());
                sleep(Duration::from_millis(2000)).await;
                assert_eq!(host.query_count(), 2);
                assert_eq!(host.attach_count(), 0);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_idempotent_and_detaches_once() {
        LocalSet::new()
            .run_until(async {
                let host = HeadlessHost::new();
                host.insert_media(HeadlessMedia::new());
                let (session, _latest) = start(&host, CaptureConfig::default());
                sleep(Duration::from_millis(600)).await;
                assert_eq!(host.overlay_count(), 1);

                session.stop();
                session.stop();
                assert_eq!(session.state(), SessionState::Stopped);
                assert_eq!(host.detach_count(), 1);
                assert_eq!(host.listener_count(), 0);
                assert!(session.overlay().is_none());
                drop(session);
                assert_eq!(host.detach_count(), 1);
            })
            .await;
    }
}
