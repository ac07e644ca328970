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

//! Tokio-backed timers for native embedding and tests.
//!
//! Everything is spawned with `spawn_local`, so callbacks may hold `Rc`
//! state. Create timers and tasks from inside a `tokio::task::LocalSet`.

use std::future::Future;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

pub fn now_ms() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as f64
}

/// Periodic callback with `setInterval` semantics: nothing fires at time
/// zero, and a late tick is not followed by a burst of catch-up ticks.
pub struct IntervalHandle {
    period_ms: u32,
    task: Option<JoinHandle<()>>,
}

impl IntervalHandle {
    pub fn new<F: Fn() + 'static>(period_ms: u32, callback: F) -> Self {
        let period = Duration::from_millis(u64::from(period_ms));
        let start = tokio::time::Instant::now() + period;
        let task = tokio::task::spawn_local(async move {
            let mut ticks = tokio::time::interval_at(start, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticks.tick().await;
                callback();
            }
        });
        Self {
            period_ms,
            task: Some(task),
        }
    }

    pub fn period_ms(&self) -> u32 {
        self.period_ms
    }

    pub fn is_active(&self) -> bool {
        self.task.is_some()
    }

    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for IntervalHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

pub async fn sleep_ms(ms: u32) {
    tokio::time::sleep(Duration::from_millis(u64::from(ms))).await;
}

/// Spawns onto the current `LocalSet`.
pub fn spawn<F: Future<Output = ()> + 'static>(future: F) {
    tokio::task::spawn_local(future);
}
