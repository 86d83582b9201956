// SPDX-License-Identifier: (Apache-2.0)
// Copyright Authors of requester

use thiserror::Error;

/// Errors that prevent a run from starting.
///
/// All of these are detected before the first worker is launched. Failures of
/// individual requests are never reported through this type, see
/// [`RequestError`](crate::RequestError) instead.
#[derive(Error, Debug)]
pub enum Error {
    #[error("concurrency must be at least 1")]
    ZeroConcurrency,

    #[error("concurrency ({concurrency}) cannot exceed the number of requests ({requests})")]
    ConcurrencyExceedsRequests { concurrency: usize, requests: u64 },

    #[error("qps must be a finite, non-negative rate, got {0}")]
    InvalidQps(f64),

    #[error("invalid target url: {0}")]
    InvalidTarget(String),

    #[error("invalid request: {0}")]
    InvalidRequest(#[from] http::Error),

    #[error("failed to initialize ratelimiter: {0}")]
    Throttle(String),

    #[error("failed to initialize runtime: {0}")]
    Runtime(#[source] std::io::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
