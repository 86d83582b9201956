// SPDX-License-Identifier: (Apache-2.0)
// Copyright Authors of requester

//! An HTTP load generation engine.
//!
//! A run sends a fixed number of copies of one prototype request, spread
//! across a pool of concurrent workers and optionally capped at an aggregate
//! rate. Every request that is started produces exactly one [`RequestResult`]
//! on the run's result stream.
//!
//! ```no_run
//! use http::Method;
//! use requester::{Prototype, Work, WorkSpec};
//!
//! let prototype = Prototype::new(Method::GET, "http://localhost:8080/")?;
//! let work = Work::new(WorkSpec::new(prototype).requests(100).concurrency(4))?;
//!
//! let completion = work.run(|result| {
//!     println!("{:?} {:?}", result.status, result.duration);
//! })?;
//! println!("done in {:?}", completion.elapsed);
//! # Ok::<(), requester::Error>(())
//! ```

mod clients;
mod error;
mod feeder;
mod metrics;
mod net;
mod request;
mod result;
mod signal;
mod throttle;
mod workload;

pub use clients::MAX_REDIRECTS;
pub use error::{Error, Result};
pub use feeder::{FeedSource, UserAgentFeeder};
pub use request::Prototype;
pub use result::{ConnectionTime, RequestError, RequestResult, Results};
pub use signal::StopHandle;
pub use throttle::Throttle;
pub use workload::{Completion, Running, Work, WorkSpec};

/// Transport counters shared by every run in the process.
pub mod stats {
    pub use crate::metrics::{
        CONNECT, CONNECT_EX, CONNECT_OK, REQUEST, REQUEST_REDIRECT, RESPONSE_EX, RESPONSE_OK,
        RESPONSE_TIMEOUT, SESSION_CLOSED_SERVER, USER_AGENT_FEED_EX,
    };
}
