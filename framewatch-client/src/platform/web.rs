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

//! Browser timers.
//!
//! `setInterval`/`setTimeout` through `gloo`, tasks on the microtask queue
//! through `wasm-bindgen-futures`.

use std::future::Future;

use gloo::timers::callback::Interval;

pub fn now_ms() -> f64 {
    js_sys::Date::now()
}

/// `setInterval` owned by a handle; `clearInterval` runs on drop or
/// [`cancel`](Self::cancel).
pub struct IntervalHandle {
    period_ms: u32,
    timer: Option<Interval>,
}

impl IntervalHandle {
    /// Starts the timer. The first call to `callback` is one period away.
    pub fn new<F: Fn() + 'static>(period_ms: u32, callback: F) -> Self {
        Self {
            period_ms,
            timer: Some(Interval::new(period_ms, callback)),
        }
    }

    pub fn period_ms(&self) -> u32 {
        self.period_ms
    }

    pub fn is_active(&self) -> bool {
        self.timer.is_some()
    }

    pub fn cancel(&mut self) {
        self.timer.take();
    }
}

pub async fn sleep_ms(ms: u32) {
    gloo_timers::future::TimeoutFuture::new(ms).await;
}

/// Queues `future` on the page's event loop. No `Send` bound: there is one thread.
pub fn spawn<F: Future<Output = ()> + 'static>(future: F) {
    wasm_bindgen_futures::spawn_local(future);
}
