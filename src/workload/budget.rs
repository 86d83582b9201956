// SPDX-License-Identifier: (Apache-2.0)
// Copyright Authors of requester

use core::sync::atomic::{AtomicU64, Ordering};

/// The number of dispatches still owed by a run, shared by all workers.
///
/// This is the only authority on whether the run has issued all of its
/// requests. It never goes below zero, so workers cannot overdraw it.
pub struct Budget {
    remaining: AtomicU64,
}

impl Budget {
    pub fn new(total: u64) -> Self {
        Self {
            remaining: AtomicU64::new(total),
        }
    }

    /// Claim one dispatch. Returns `false` once the budget is exhausted.
    pub fn claim(&self) -> bool {
        self.remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }

    /// Give back a claimed dispatch that was never started.
    pub fn release(&self) {
        self.remaining.fetch_add(1, Ordering::AcqRel);
    }

    pub fn remaining(&self) -> u64 {
        self.remaining.load(Ordering::Acquire)
    }
}
