// SPDX-License-Identifier: (Apache-2.0)
// Copyright Authors of requester

use histogram::Histogram;
use requester::stats::*;
use requester::{Completion, RequestResult};
use std::collections::BTreeMap;
use std::time::Duration;

#[macro_export]
macro_rules! output {
    () => {
        let now = chrono::Utc::now();
        println!("{}", now.to_rfc3339_opts(chrono::SecondsFormat::Millis, false));
    };
    ($($arg:tt)*) => {{
        let now = chrono::Utc::now();
        println!("{} {}", now.to_rfc3339_opts(chrono::SecondsFormat::Millis, false), format_args!($($arg)*));
    }};
}

pub static PERCENTILES: &[(&str, f64)] = &[
    ("p10", 10.0),
    ("p25", 25.0),
    ("p50", 50.0),
    ("p75", 75.0),
    ("p90", 90.0),
    ("p95", 95.0),
    ("p99", 99.0),
];

#[derive(Default)]
struct Phase {
    total: Duration,
    count: u64,
}

impl Phase {
    fn record(&mut self, duration: Duration) {
        self.total += duration;
        self.count += 1;
    }

    fn average(&self) -> Duration {
        if self.count == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(self.total.as_secs_f64() / self.count as f64)
        }
    }
}

/// Aggregates the results of a run for the final report.
pub struct Summary {
    // response latency in nanoseconds
    latency: Histogram,
    count: u64,
    ok: u64,
    fastest: Option<Duration>,
    slowest: Duration,
    total: Duration,
    size: u64,
    dns: Phase,
    dial: Phase,
    wait: Phase,
    read: Phase,
    status: BTreeMap<u16, u64>,
    errors: BTreeMap<String, u64>,
}

impl Summary {
    pub fn new() -> Result<Self, histogram::Error> {
        Ok(Self {
            latency: Histogram::new(7, 64)?,
            count: 0,
            ok: 0,
            fastest: None,
            slowest: Duration::ZERO,
            total: Duration::ZERO,
            size: 0,
            dns: Phase::default(),
            dial: Phase::default(),
            wait: Phase::default(),
            read: Phase::default(),
            status: BTreeMap::new(),
            errors: BTreeMap::new(),
        })
    }

    pub fn record(&mut self, result: &RequestResult) {
        self.count += 1;

        if let Some(status) = result.status {
            *self.status.entry(status.as_u16()).or_insert(0) += 1;
        }

        if let Some(error) = &result.error {
            *self.errors.entry(error.to_string()).or_insert(0) += 1;
            return;
        }

        self.ok += 1;

        let _ = self.latency.increment(result.duration.as_nanos() as u64);

        self.fastest = Some(match self.fastest {
            Some(fastest) => fastest.min(result.duration),
            None => result.duration,
        });
        self.slowest = self.slowest.max(result.duration);
        self.total += result.duration;
        self.size += result.size;

        if let Some(connection) = result.connection {
            self.dns.record(connection.dns);
            self.dial.record(connection.total());
        }

        self.wait.record(result.wait);
        self.read.record(result.read);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// Latency at each of the reported percentiles, in nanoseconds. Empty if
    /// no request succeeded.
    pub fn percentiles(&self) -> Vec<(&'static str, u64)> {
        let mut result = Vec::new();

        let percentiles: Vec<f64> = PERCENTILES
            .iter()
            .map(|(_, percentile)| *percentile)
            .collect();

        if let Ok(Some(percentiles)) = self.latency.percentiles(&percentiles) {
            for ((label, _), (_, bucket)) in PERCENTILES.iter().zip(percentiles.iter()) {
                result.push((*label, bucket.end()));
            }
        }

        result
    }

    pub fn print(&self, completion: &Completion) {
        let elapsed = completion.elapsed.as_secs_f64();

        output!("-----");
        output!("Summary:");
        output!("  Total: {:.4} secs", elapsed);
        output!("  Requests: {} Ok: {} Errors: {}", self.count, self.ok, self.count - self.ok);

        if completion.cancelled {
            output!("  Stopped before all requests were sent");
        }

        if self.ok > 0 {
            output!("  Slowest: {:.4} secs", self.slowest.as_secs_f64());
            output!(
                "  Fastest: {:.4} secs",
                self.fastest.unwrap_or_default().as_secs_f64()
            );
            output!(
                "  Average: {:.4} secs",
                self.total.as_secs_f64() / self.ok as f64
            );
            output!("  Total data: {} bytes", self.size);
            output!("  Size/request: {} bytes", self.size / self.ok);
        }

        if elapsed > 0.0 {
            output!("  Requests/sec: {:.4}", self.count as f64 / elapsed);
        }

        let percentiles = self.percentiles();
        if !percentiles.is_empty() {
            let mut latencies = "Response Latency (us):".to_owned();

            for (label, nanoseconds) in percentiles {
                let microseconds = nanoseconds / 1000;
                latencies.push_str(&format!(" {label}: {microseconds}"))
            }

            output!("{latencies}");
        }

        output!(
            "Details (average): DNS+dialup: {:.4} secs DNS-lookup: {:.4} secs resp wait: {:.4} secs resp read: {:.4} secs",
            self.dial.average().as_secs_f64(),
            self.dns.average().as_secs_f64(),
            self.wait.average().as_secs_f64(),
            self.read.average().as_secs_f64(),
        );

        output!(
            "Connections: Attempt: {} Opened: {} Errors: {} Closed by server: {} Redirects: {}",
            CONNECT.value(),
            CONNECT_OK.value(),
            CONNECT_EX.value(),
            SESSION_CLOSED_SERVER.value(),
            REQUEST_REDIRECT.value(),
        );

        if !self.status.is_empty() {
            output!("Status code distribution:");
            for (status, count) in &self.status {
                output!("  [{status}] {count} responses");
            }
        }

        if !self.errors.is_empty() {
            output!("Error distribution:");
            for (error, count) in &self.errors {
                output!("  [{count}] {error}");
            }
        }

        let feed_errors = USER_AGENT_FEED_EX.value();
        if feed_errors > 0 {
            output!("User agent feed errors: {feed_errors}");
        }
    }
}
