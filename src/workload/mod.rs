// SPDX-License-Identifier: (Apache-2.0)
// Copyright Authors of requester

use crate::clients::Session;
use crate::error::{Error, Result};
use crate::feeder::{FeedSource, UserAgentFeeder};
use crate::metrics::USER_AGENT_FEED_EX;
use crate::net::Connector;
use crate::request::Prototype;
use crate::result::{RequestResult, Results};
use crate::signal::StopHandle;
use crate::throttle::Throttle;
use async_channel::{bounded, Sender};
use core::sync::atomic::{AtomicU64, Ordering};
use ringlog::{debug, error};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::runtime::Builder;

mod budget;

pub use budget::Budget;

// queue depth per worker
static QUEUE_DEPTH: usize = 64;

// upper bound on buffered results regardless of concurrency
static MAX_QUEUE_CAPACITY: usize = 65_536;

/// Everything a run needs, handed over by the caller before the run starts.
pub struct WorkSpec {
    prototype: Prototype,
    requests: u64,
    concurrency: usize,
    qps: Option<f64>,
    user_agent_feed: Option<Box<dyn FeedSource>>,
    timeout: Option<Duration>,
    disable_keepalive: bool,
    disable_redirects: bool,
    threads: Option<usize>,
}

impl WorkSpec {
    /// 200 requests over 50 workers, unthrottled.
    pub fn new(prototype: Prototype) -> Self {
        Self {
            prototype,
            requests: 200,
            concurrency: 50,
            qps: None,
            user_agent_feed: None,
            timeout: None,
            disable_keepalive: false,
            disable_redirects: false,
            threads: None,
        }
    }

    pub fn requests(mut self, requests: u64) -> Self {
        self.requests = requests;
        self
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Aggregate rate limit across all workers. Zero disables throttling.
    pub fn qps(mut self, qps: f64) -> Self {
        self.qps = Some(qps);
        self
    }

    pub fn user_agent_feed<T: FeedSource + 'static>(mut self, source: T) -> Self {
        self.user_agent_feed = Some(Box::new(source));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn disable_keepalive(mut self, disable: bool) -> Self {
        self.disable_keepalive = disable;
        self
    }

    pub fn disable_redirects(mut self, disable: bool) -> Self {
        self.disable_redirects = disable;
        self
    }

    /// Number of runtime threads driving the workers. Defaults to the
    /// available parallelism.
    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }
}

/// How a run ended.
#[derive(Clone, Copy, Debug)]
pub struct Completion {
    pub elapsed: Duration,
    /// Results delivered to the stream.
    pub completed: u64,
    /// The run was stopped before its budget was exhausted.
    pub cancelled: bool,
}

/// A validated run, ready to start.
pub struct Work {
    prototype: Prototype,
    requests: u64,
    concurrency: usize,
    threads: usize,
    timeout: Option<Duration>,
    keepalive: bool,
    redirects: bool,
    throttle: Throttle,
    feeder: Option<UserAgentFeeder>,
    connector: Connector,
}

impl Work {
    /// Validate the run. Nothing is sent until the work is started.
    pub fn new(spec: WorkSpec) -> Result<Self> {
        if spec.concurrency == 0 {
            return Err(Error::ZeroConcurrency);
        }

        if spec.requests > 0 && spec.concurrency as u64 > spec.requests {
            return Err(Error::ConcurrencyExceedsRequests {
                concurrency: spec.concurrency,
                requests: spec.requests,
            });
        }

        let throttle = Throttle::new(spec.qps)?;
        let connector = Connector::new()?;

        let threads = spec
            .threads
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1)
            })
            .clamp(1, spec.concurrency);

        Ok(Self {
            prototype: spec.prototype,
            requests: spec.requests,
            concurrency: spec.concurrency,
            threads,
            timeout: spec.timeout,
            keepalive: !spec.disable_keepalive,
            redirects: !spec.disable_redirects,
            throttle,
            feeder: spec.user_agent_feed.map(UserAgentFeeder::from_boxed),
            connector,
        })
    }

    /// Run to completion, handing every result to `sink` on the calling
    /// thread as it arrives.
    pub fn run<F: FnMut(RequestResult)>(self, mut sink: F) -> Result<Completion> {
        let running = self.start();

        for result in running.results() {
            sink(result);
        }

        running.join()
    }

    /// Start the run in the background and return immediately.
    pub fn start(self) -> Running {
        let (sender, receiver) = bounded(queue_capacity(self.concurrency));
        let stop = StopHandle::new();

        let thread = {
            let stop = stop.clone();
            std::thread::Builder::new()
                .name("requester".to_string())
                .spawn(move || self.execute(sender, stop))
        };

        Running {
            results: Results::new(receiver),
            stop,
            thread,
        }
    }

    fn execute(self, sender: Sender<RequestResult>, stop: StopHandle) -> Result<Completion> {
        // spawn the workers on their own runtime
        let runtime = Builder::new_multi_thread()
            .enable_all()
            .worker_threads(self.threads)
            .build()
            .map_err(Error::Runtime)?;

        let completion = runtime.block_on(self.drive(sender, stop));

        runtime.shutdown_timeout(Duration::from_millis(100));

        Ok(completion)
    }

    async fn drive(self, sender: Sender<RequestResult>, stop: StopHandle) -> Completion {
        debug!(
            "launching {} workers on {} threads for {} requests",
            self.concurrency, self.threads, self.requests
        );

        if let Some(qps) = self.throttle.qps() {
            debug!("request starts throttled to {qps} per second");
        }

        let start = Instant::now();
        let concurrency = self.concurrency;

        let dispatch = Arc::new(Dispatch {
            prototype: self.prototype,
            budget: Budget::new(self.requests),
            throttle: self.throttle,
            feeder: self.feeder,
            connector: Arc::new(self.connector),
            stop: stop.clone(),
            timeout: self.timeout,
            keepalive: self.keepalive,
            redirects: self.redirects,
            completed: AtomicU64::new(0),
        });

        let workers: Vec<_> = (0..concurrency)
            .map(|_| tokio::spawn(worker(dispatch.clone(), sender.clone())))
            .collect();

        for worker in workers {
            if let Err(e) = worker.await {
                error!("worker failed: {e}");
            }
        }

        // every worker is done, so this is the only close of the stream
        sender.close();

        let completion = Completion {
            elapsed: start.elapsed(),
            completed: dispatch.completed.load(Ordering::Acquire),
            cancelled: stop.is_stopped() && dispatch.budget.remaining() > 0,
        };

        debug!(
            "run finished: {} results in {:?}",
            completion.completed, completion.elapsed
        );

        completion
    }
}

fn queue_capacity(concurrency: usize) -> usize {
    concurrency
        .saturating_mul(QUEUE_DEPTH)
        .min(MAX_QUEUE_CAPACITY)
}

/// State shared by the workers of one run.
struct Dispatch {
    prototype: Prototype,
    budget: Budget,
    throttle: Throttle,
    feeder: Option<UserAgentFeeder>,
    connector: Arc<Connector>,
    stop: StopHandle,
    timeout: Option<Duration>,
    keepalive: bool,
    redirects: bool,
    completed: AtomicU64,
}

async fn worker(dispatch: Arc<Dispatch>, sender: Sender<RequestResult>) {
    let mut session = Session::new(
        dispatch.connector.clone(),
        dispatch.keepalive,
        dispatch.redirects,
    );

    while !dispatch.stop.is_stopped() && dispatch.budget.claim() {
        if !dispatch.throttle.acquire(&dispatch.stop).await {
            // stopped while waiting, the claimed unit was never started
            dispatch.budget.release();
            break;
        }

        let mut request = dispatch.prototype.build();

        if let Some(feeder) = &dispatch.feeder {
            // a bad feed entry leaves the prototype's user agent in place
            if feeder.apply(&mut request).is_err() {
                USER_AGENT_FEED_EX.increment();
            }
        }

        let result = session.dispatch(request, dispatch.timeout).await;

        // the only way this fails is that nobody is reading results anymore
        if sender.send(result).await.is_err() {
            break;
        }

        dispatch.completed.fetch_add(1, Ordering::AcqRel);
    }
}

/// A run in progress on a background thread.
pub struct Running {
    results: Results,
    stop: StopHandle,
    thread: std::io::Result<JoinHandle<Result<Completion>>>,
}

impl Running {
    /// The result stream. Every call returns a handle onto the same stream,
    /// so each result is delivered to exactly one consumer.
    pub fn results(&self) -> Results {
        self.results.clone()
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Stop drawing new work. In-flight requests still produce results.
    pub fn stop(&self) {
        self.stop.stop();
    }

    /// Wait for the run to finish.
    ///
    /// Results nobody holds a [`Results`] handle for are discarded.
    pub fn join(self) -> Result<Completion> {
        let Running {
            results, thread, ..
        } = self;

        // with no consumer left, workers stop instead of blocking on a full
        // stream
        drop(results);

        match thread {
            Ok(handle) => handle
                .join()
                .map_err(|_| Error::Runtime(std::io::Error::other("run thread panicked")))?,
            Err(e) => Err(Error::Runtime(e)),
        }
    }
}
