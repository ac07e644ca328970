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

//! Finds the media element once the page has created it.
//!
//! Players are often built long after `load`, and the page gives no signal
//! when that happens, so the locator simply asks again on every poll. Not
//! finding the element is a normal state, never an error.

use framewatch_diagnostics::{metric, publish, DiagEvent};
use log::{debug, info, warn};

use crate::config::LocatorPolicy;
use crate::host::Host;

/// Result of a single poll.
#[derive(Debug, PartialEq)]
pub enum LocatorPoll<M> {
    Found(M),
    /// Not there yet; poll again after `next_delay_ms`.
    Pending { attempt: u32, next_delay_ms: u32 },
    /// The attempt budget is spent. Only possible with `max_attempts` set.
    Exhausted { attempts: u32 },
    /// The element was already handed out by an earlier `Found`.
    Finished { attempts: u32 },
}

#[derive(Debug, Clone)]
pub struct ElementLocator {
    selector: String,
    policy: LocatorPolicy,
    attempts: u32,
    found: bool,
}

impl ElementLocator {
    pub fn new(selector: impl Into<String>, policy: LocatorPolicy) -> Self {
        Self {
            selector: selector.into(),
            policy,
            attempts: 0,
            found: false,
        }
    }

    pub fn selector(&self) -> &str {
        &self.selector
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Delay to wait before the next poll.
    pub fn next_delay_ms(&self) -> u32 {
        self.policy.delay_before(self.attempts + 1)
    }

    pub fn is_exhausted(&self) -> bool {
        !self.found && !self.policy.allows(self.attempts + 1)
    }

    /// Queries the document once.
    ///
    /// After a `Found` the locator is finished: further polls report
    /// `Finished` without querying rather than handing out the element a
    /// second time.
    pub fn poll<H: Host>(&mut self, host: &H) -> LocatorPoll<H::Media> {
        if self.found {
            return LocatorPoll::Finished {
                attempts: self.attempts,
            };
        }
        if self.is_exhausted() {
            return LocatorPoll::Exhausted {
                attempts: self.attempts,
            };
        }
        self.attempts += 1;
        let found = host.query_media(&self.selector);
        publish(
            DiagEvent::new("locator")
                .with_stream(self.selector.clone())
                .with_metric(metric!("attempt", self.attempts))
                .with_metric(metric!("found", found.is_some() as u64)),
        );
        match found {
            Some(media) => {
                self.found = true;
                info!(
                    "Media element '{}' found after {} poll(s)",
                    self.selector, self.attempts
                );
                LocatorPoll::Found(media)
            }
            None if self.is_exhausted() => {
                warn!(
                    "Giving up on '{}' after {} poll(s)",
                    self.selector, self.attempts
                );
                LocatorPoll::Exhausted {
                    attempts: self.attempts,
                }
            }
            None => {
                let next_delay_ms = self.next_delay_ms();
                debug!(
                    "No '{}' yet (poll {}), retrying in {} ms",
                    self.selector, self.attempts, next_delay_ms
                );
                LocatorPoll::Pending {
                    attempt: self.attempts,
                    next_delay_ms,
                }
            }
        }
    }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;
    use crate::headless::{HeadlessHost, HeadlessMedia};
    use async_broadcast::TryRecvError;
    use framewatch_diagnostics::{subscribe, MetricValue};

    #[test]
    fn pending_until_media_inserted() {
        let host = HeadlessHost::new();
        let mut locator = ElementLocator::new("video", LocatorPolicy::default());
        for attempt in 1..=3 {
            assert_eq!(
                locator.poll(&host),
                LocatorPoll::Pending {
                    attempt,
                    next_delay_ms: 500
                }
            );
        }
        host.insert_media(HeadlessMedia::new());
        assert!(matches!(locator.poll(&host), LocatorPoll::Found(_)));
        assert_eq!(locator.attempts(), 4);
        assert_eq!(host.query_count(), 4);
    }

    #[test]
    fn found_is_reported_once() {
        let host = HeadlessHost::new();
        host.insert_media(HeadlessMedia::new());
        let mut locator = ElementLocator::new("video", LocatorPolicy::default());
        assert!(matches!(locator.poll(&host), LocatorPoll::Found(_)));
        assert_eq!(locator.poll(&host), LocatorPoll::Finished { attempts: 1 });
        assert_eq!(locator.poll(&host), LocatorPoll::Finished { attempts: 1 });
        assert_eq!(host.query_count(), 1);
        assert!(!locator.is_exhausted());
    }

    #[test]
    fn found_on_the_last_allowed_attempt_is_not_exhausted() {
        let host = HeadlessHost::new();
        let policy = LocatorPolicy {
            max_attempts: Some(2),
            ..LocatorPolicy::default()
        };
        let mut locator = ElementLocator::new("video", policy);
        assert!(matches!(locator.poll(&host), LocatorPoll::Pending { .. }));
        host.insert_media(HeadlessMedia::new());
        assert!(matches!(locator.poll(&host), LocatorPoll::Found(_)));
        assert_eq!(locator.poll(&host), LocatorPoll::Finished { attempts: 2 });
    }

    #[test]
    fn every_poll_publishes_attempt_and_outcome() {
        let host = HeadlessHost::new();
        let selector = "video#locator-metrics";
        let mut rx = subscribe();
        let mut locator = ElementLocator::new(selector, LocatorPolicy::default());
        locator.poll(&host);
        host.insert_media(HeadlessMedia::new().with_id("locator-metrics"));
        locator.poll(&host);
        // Finished polls do not query and publish nothing.
        locator.poll(&host);

        let mut events = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(event) if event.stream_id.as_deref() == Some(selector) => events.push(event),
                Ok(_) | Err(TryRecvError::Overflowed(_)) => continue,
                Err(_) => break,
            }
        }
        let outcomes: Vec<_> = events
            .iter()
            .map(|e| (e.subsystem, e.metric("attempt").cloned(), e.metric("found").cloned()))
            .collect();
        assert_eq!(
            outcomes,
            vec![
                ("locator", Some(MetricValue::U64(1)), Some(MetricValue::U64(0))),
                ("locator", Some(MetricValue::U64(2)), Some(MetricValue::U64(1))),
            ]
        );
    }

    #[test]
    fn selector_must_match() {
        let host = HeadlessHost::new();
        host.insert_media(HeadlessMedia::new());
        let mut locator = ElementLocator::new("video.main-player", LocatorPolicy::default());
        assert!(matches!(locator.poll(&host), LocatorPoll::Pending { .. }));
    }

    #[test]
    fn bounded_policy_exhausts_with_backoff() {
        let host = HeadlessHost::new();
        let policy = LocatorPolicy {
            interval_ms: 100,
            backoff_factor: 2.0,
            max_interval_ms: 300,
            max_attempts: Some(3),
        };
        let mut locator = ElementLocator::new("video", policy);
        assert_eq!(
            locator.poll(&host),
            LocatorPoll::Pending {
                attempt: 1,
                next_delay_ms: 200
            }
        );
        assert_eq!(
            locator.poll(&host),
            LocatorPoll::Pending {
                attempt: 2,
                next_delay_ms: 300
            }
        );
        assert_eq!(locator.poll(&host), LocatorPoll::Exhausted { attempts: 3 });
        assert_eq!(locator.poll(&host), LocatorPoll::Exhausted { attempts: 3 });
        assert_eq!(host.query_count(), 3);
    }
}
