// SPDX-License-Identifier: (Apache-2.0)
// Copyright Authors of requester

use crate::error::{Error, Result};
use crate::signal::StopHandle;
use ratelimit::Ratelimiter;
use std::time::Duration;

/// Global pacing of request starts.
///
/// One throttle is shared by every worker of a run, so the configured rate is
/// the aggregate rate regardless of concurrency.
pub struct Throttle {
    ratelimiter: Option<Ratelimiter>,
    qps: Option<f64>,
}

impl Throttle {
    /// A throttle that never blocks.
    pub fn unlimited() -> Self {
        Self {
            ratelimiter: None,
            qps: None,
        }
    }

    /// Create a throttle for `qps` request starts per second. `None` or zero
    /// disables throttling.
    pub fn new(qps: Option<f64>) -> Result<Self> {
        let qps = match qps {
            Some(qps) if !qps.is_finite() || qps < 0.0 => return Err(Error::InvalidQps(qps)),
            Some(qps) if qps > 0.0 => qps,
            _ => return Ok(Self::unlimited()),
        };

        // refill in batches once the per-token interval would drop below a
        // microsecond
        let amount = (qps / 1_000_000.0).ceil().max(1.0) as u64;
        let interval =
            Duration::try_from_secs_f64(amount as f64 / qps).map_err(|_| Error::InvalidQps(qps))?;

        // the bucket holds one interval's worth of tokens and starts full so
        // the first request is not delayed
        let ratelimiter = Ratelimiter::builder(amount, interval)
            .max_tokens(amount)
            .initial_available(amount)
            .build()
            .map_err(|e| Error::Throttle(format!("{e:?}")))?;

        Ok(Self {
            ratelimiter: Some(ratelimiter),
            qps: Some(qps),
        })
    }

    pub fn qps(&self) -> Option<f64> {
        self.qps
    }

    /// Wait for a permit to start one request.
    ///
    /// Returns `false` without a permit if the stop signal fires first.
    pub async fn acquire(&self, stop: &StopHandle) -> bool {
        let ratelimiter = match &self.ratelimiter {
            Some(ratelimiter) => ratelimiter,
            None => return !stop.is_stopped(),
        };

        loop {
            if stop.is_stopped() {
                return false;
            }

            match ratelimiter.try_wait() {
                Ok(()) => return true,
                Err(wait) => {
                    tokio::select! {
                        _ = tokio::time::sleep(wait) => {}
                        _ = stop.stopped() => return false,
                    }
                }
            }
        }
    }
}
