// SPDX-License-Identifier: (Apache-2.0)
// Copyright Authors of requester

use super::*;

#[derive(Clone, Deserialize)]
pub struct General {
    /// Total number of requests to send.
    #[serde(default = "requests")]
    requests: u64,
    /// The number of workers sending requests concurrently.
    #[serde(default = "concurrency")]
    concurrency: usize,
    /// Aggregate rate limit across all workers. Zero is treated as unlimited.
    #[serde(default)]
    qps: f64,
    /// Per-request timeout. Zero disables it.
    #[serde(default = "timeout", deserialize_with = "deserialize_duration")]
    timeout: Duration,
    /// Run for this long instead of a fixed number of requests. Zero disables
    /// it.
    #[serde(default, deserialize_with = "deserialize_duration")]
    duration: Duration,
    // number of threads driving the workers
    threads: Option<usize>,
}

impl Default for General {
    fn default() -> Self {
        Self {
            requests: requests(),
            concurrency: concurrency(),
            qps: 0.0,
            timeout: timeout(),
            duration: Duration::ZERO,
            threads: None,
        }
    }
}

fn requests() -> u64 {
    200
}

fn concurrency() -> usize {
    50
}

fn timeout() -> Duration {
    Duration::from_secs(20)
}

impl General {
    pub fn requests(&self) -> u64 {
        // a time bounded run stops on the clock, not on a count
        if self.duration().is_some() {
            u64::MAX
        } else {
            self.requests
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn qps(&self) -> f64 {
        self.qps
    }

    pub fn timeout(&self) -> Option<Duration> {
        Some(self.timeout).filter(|t| !t.is_zero())
    }

    pub fn duration(&self) -> Option<Duration> {
        Some(self.duration).filter(|d| !d.is_zero())
    }

    pub fn threads(&self) -> Option<usize> {
        self.threads
    }
}
