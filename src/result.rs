// SPDX-License-Identifier: (Apache-2.0)
// Copyright Authors of requester

use async_channel::Receiver;
use http::StatusCode;
use std::io;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Time spent establishing a new connection. Only present on results whose
/// request had to open a connection.
#[derive(Clone, Copy, Debug)]
pub struct ConnectionTime {
    /// Name resolution.
    pub dns: Duration,
    /// TCP connect plus TLS and HTTP handshakes.
    pub dial: Duration,
}

impl ConnectionTime {
    pub fn total(&self) -> Duration {
        self.dns + self.dial
    }
}

/// Why a single request failed. Recorded in its result, never fatal to the run.
#[derive(Error, Debug)]
pub enum RequestError {
    #[error("dns lookup failed: {0}")]
    Resolve(#[source] io::Error),

    #[error("connect failed: {0}")]
    Connect(#[source] io::Error),

    #[error("tls handshake failed: {0}")]
    Tls(#[source] io::Error),

    #[error("{0}")]
    Http(#[from] hyper::Error),

    #[error("request timed out")]
    Timeout,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("stopped after {0} redirects")]
    TooManyRedirects(usize),
}

/// Outcome of one dispatch.
#[derive(Debug)]
pub struct RequestResult {
    pub start: Instant,
    pub duration: Duration,
    pub connection: Option<ConnectionTime>,
    /// From sending the request to receiving the response head.
    pub wait: Duration,
    /// Reading the response body.
    pub read: Duration,
    pub status: Option<StatusCode>,
    /// Response body bytes read.
    pub size: u64,
    pub error: Option<RequestError>,
}

impl RequestResult {
    pub(crate) fn failed(start: Instant, error: RequestError) -> Self {
        Self {
            start,
            duration: start.elapsed(),
            connection: None,
            wait: Duration::ZERO,
            read: Duration::ZERO,
            status: None,
            size: 0,
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// The stream of results of a run.
///
/// Iterating blocks until the next result arrives and ends once the run has
/// finished and every result was consumed. Clones share the one stream.
#[derive(Clone)]
pub struct Results {
    receiver: Receiver<RequestResult>,
}

impl Results {
    pub(crate) fn new(receiver: Receiver<RequestResult>) -> Self {
        Self { receiver }
    }

    pub async fn recv(&self) -> Option<RequestResult> {
        self.receiver.recv().await.ok()
    }

    pub fn recv_blocking(&self) -> Option<RequestResult> {
        self.receiver.recv_blocking().ok()
    }
}

impl Iterator for Results {
    type Item = RequestResult;

    fn next(&mut self) -> Option<Self::Item> {
        self.recv_blocking()
    }
}
