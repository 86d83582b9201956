// SPDX-License-Identifier: (Apache-2.0)
// Copyright Authors of requester

use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Cooperative stop signal for a run.
///
/// Cloning is cheap and every clone refers to the same signal. Once stopped,
/// a signal stays stopped.
#[derive(Clone, Default)]
pub struct StopHandle {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    stopped: AtomicBool,
    notify: Notify,
}

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the run to stop. Workers finish their in-flight request and do not
    /// start another one.
    pub fn stop(&self) {
        if !self.inner.stopped.swap(true, Ordering::AcqRel) {
            self.inner.notify.notify_waiters();
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::Acquire)
    }

    /// Completes once [`StopHandle::stop`] has been called.
    pub async fn stopped(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);

            // register before checking the flag so a concurrent stop() is not
            // missed between the check and the await
            notified.as_mut().enable();

            if self.is_stopped() {
                return;
            }

            notified.await;
        }
    }
}
