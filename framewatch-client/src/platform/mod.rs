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

//! Platform abstraction layer for framewatch-client.
//!
//! This module provides the timing primitives the engine runs on, for both
//! WASM (browser) and native environments:
//!
//! - **`now_ms()`**: current time in milliseconds since the Unix epoch
//! - **`IntervalHandle`**: a repeating timer that fires a callback at a fixed interval
//! - **`sleep_ms(ms)`**: a future that resolves after a delay
//! - **`spawn(future)`**: spawn a local task on the platform's executor
//! - **`spawn_cancellable(future)`**: the same, returning a [`TaskHandle`]
//!
//! Everything is single-threaded: callbacks and tasks are `!Send` and run on
//! the browser event loop, or on a tokio `LocalSet` natively. Two callbacks
//! never run at the same time, so engine state lives in `Rc`/`RefCell`.

use std::future::Future;

use futures::future::{AbortHandle, Abortable};

#[cfg(not(target_arch = "wasm32"))]
mod native;
#[cfg(target_arch = "wasm32")]
mod web;

#[cfg(not(target_arch = "wasm32"))]
pub use native::*;
#[cfg(target_arch = "wasm32")]
pub use web::*;

/// Owns a spawned task. Dropping the handle (or calling [`cancel`](Self::cancel))
/// aborts the task at its next suspension point.
#[derive(Debug)]
pub struct TaskHandle {
    abort: AbortHandle,
}

impl TaskHandle {
    pub fn cancel(&self) {
        self.abort.abort();
    }

    pub fn is_cancelled(&self) -> bool {
        self.abort.is_aborted()
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.abort.abort();
    }
}

/// Spawn a local task that stops when the returned handle is dropped.
pub fn spawn_cancellable<F: Future<Output = ()> + 'static>(future: F) -> TaskHandle {
    let (abort, registration) = AbortHandle::new_pair();
    spawn(async move {
        let _ = Abortable::new(future, registration).await;
    });
    TaskHandle { abort }
}
