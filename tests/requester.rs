// SPDX-License-Identifier: (Apache-2.0)
// Copyright Authors of requester

mod common;

use bytes::Bytes;
use common::{closed_port, TestServer};
use http::header::{CONTENT_TYPE, USER_AGENT};
use http::{Method, StatusCode};
use requester::{
    stats, Error, Prototype, RequestError, RequestResult, Work, WorkSpec, MAX_REDIRECTS,
};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use warp::Filter;

fn counting_server() -> (TestServer, Arc<AtomicUsize>) {
    let count = Arc::new(AtomicUsize::new(0));

    let routes = {
        let count = count.clone();
        warp::any().map(move || {
            count.fetch_add(1, Ordering::SeqCst);
            "ok"
        })
    };

    let server = TestServer::start(move || {
        warp::serve(routes).bind_ephemeral(([127, 0, 0, 1], 0))
    });

    (server, count)
}

fn collect(work: Work) -> Vec<RequestResult> {
    let mut results = Vec::new();
    let completion = work.run(|result| results.push(result)).unwrap();
    assert!(!completion.cancelled);
    assert_eq!(completion.completed, results.len() as u64);
    results
}

#[test]
fn sends_exactly_n() {
    let (server, count) = counting_server();

    let prototype = Prototype::new(Method::GET, &server.url("/")).unwrap();
    let work = Work::new(WorkSpec::new(prototype).requests(20).concurrency(2)).unwrap();

    let results = collect(work);

    assert_eq!(results.len(), 20);
    assert_eq!(count.load(Ordering::SeqCst), 20);

    for result in &results {
        assert!(result.is_ok(), "{:?}", result.error);
        assert_eq!(result.status, Some(StatusCode::OK));
        assert_eq!(result.size, 2);
    }
}

#[test]
fn zero_requests() {
    let (server, count) = counting_server();

    let prototype = Prototype::new(Method::GET, &server.url("/")).unwrap();
    let work = Work::new(WorkSpec::new(prototype).requests(0).concurrency(5)).unwrap();

    assert!(collect(work).is_empty());
    assert_eq!(count.load(Ordering::SeqCst), 0);
}

#[test]
fn qps_caps_aggregate_rate() {
    let (server, count) = counting_server();

    let prototype = Prototype::new(Method::GET, &server.url("/")).unwrap();
    let work = Work::new(
        WorkSpec::new(prototype)
            .requests(20)
            .concurrency(2)
            .qps(1.0),
    )
    .unwrap();

    let running = work.start();
    let results = running.results();

    std::thread::sleep(Duration::from_secs(1));
    let observed = count.load(Ordering::SeqCst);
    assert!(observed <= 2, "{observed} requests within one second");

    running.stop();
    let received = results.count();
    let completion = running.join().unwrap();

    assert!(completion.cancelled);
    assert_eq!(completion.completed, received as u64);
    assert!(received < 20);
}

#[test]
fn request_arrives_intact() {
    // warp has its own http types, so the server side records plain strings
    #[derive(Default)]
    struct Seen {
        method: String,
        path: String,
        headers: HashMap<String, String>,
    }

    let seen = Arc::new(Mutex::new(Seen::default()));

    let routes = {
        let seen = seen.clone();
        warp::method()
            .and(warp::path::full())
            .and(warp::header::headers_cloned())
            .map(
                move |method: warp::http::Method,
                      path: warp::path::FullPath,
                      headers: warp::http::HeaderMap| {
                    let mut seen = seen.lock().unwrap();
                    seen.method = method.as_str().to_string();
                    seen.path = path.as_str().to_string();
                    seen.headers = headers
                        .iter()
                        .map(|(name, value)| {
                            (
                                name.as_str().to_string(),
                                value.to_str().unwrap_or_default().to_string(),
                            )
                        })
                        .collect();
                    "ok"
                },
            )
    };

    let server = TestServer::start(move || {
        warp::serve(routes).bind_ephemeral(([127, 0, 0, 1], 0))
    });

    let prototype = Prototype::new(Method::PUT, &server.url("/"))
        .unwrap()
        .header(CONTENT_TYPE, "text/html")
        .unwrap()
        .header("X-some-header", "value")
        .unwrap()
        .basic_auth("username", "password")
        .unwrap();

    let work = Work::new(WorkSpec::new(prototype).requests(1).concurrency(1)).unwrap();
    let results = collect(work);
    assert_eq!(results.len(), 1);

    let seen = seen.lock().unwrap();
    assert_eq!(seen.method, "PUT");
    assert_eq!(seen.path, "/");

    let header = |name: &str| seen.headers.get(name).map(String::as_str);
    assert_eq!(header("content-type"), Some("text/html"));
    assert_eq!(header("x-some-header"), Some("value"));
    assert_eq!(
        header("authorization"),
        Some("Basic dXNlcm5hbWU6cGFzc3dvcmQ=")
    );
    assert_eq!(
        header("host").map(str::to_string),
        Some(format!("127.0.0.1:{}", server.port()))
    );
}

#[test]
fn body_is_sent_with_every_request() {
    let bodies = Arc::new(Mutex::new(Vec::new()));

    let routes = {
        let bodies = bodies.clone();
        warp::body::bytes().map(move |body: Bytes| {
            bodies.lock().unwrap().push(body);
            "ok"
        })
    };

    let server = TestServer::start(move || {
        warp::serve(routes).bind_ephemeral(([127, 0, 0, 1], 0))
    });

    let prototype = Prototype::new(Method::POST, &server.url("/"))
        .unwrap()
        .body("Body");

    let work = Work::new(WorkSpec::new(prototype).requests(10).concurrency(1)).unwrap();
    assert_eq!(collect(work).len(), 10);

    let bodies = bodies.lock().unwrap();
    assert_eq!(bodies.len(), 10);
    assert!(bodies.iter().all(|body| body.as_ref() == b"Body"));
}

#[test]
fn hostname_targets_under_load() {
    let (server, count) = counting_server();

    let url = format!("http://localhost:{}/", server.port());
    let prototype = Prototype::new(Method::GET, &url).unwrap();
    let work = Work::new(WorkSpec::new(prototype).requests(5000).concurrency(20)).unwrap();

    let results = collect(work);

    assert_eq!(results.len(), 5000);
    assert!(results.iter().all(|result| result.is_ok()));
    assert_eq!(count.load(Ordering::SeqCst), 5000);
}

#[test]
fn user_agent_feed_cycles() {
    let agents = Arc::new(Mutex::new(HashMap::<String, usize>::new()));

    let routes = {
        let agents = agents.clone();
        warp::header::<String>("user-agent").map(move |agent: String| {
            *agents.lock().unwrap().entry(agent).or_insert(0) += 1;
            "ok"
        })
    };

    let server = TestServer::start(move || {
        warp::serve(routes).bind_ephemeral(([127, 0, 0, 1], 0))
    });

    let prototype = Prototype::new(Method::GET, &server.url("/"))
        .unwrap()
        .header(USER_AGENT, "hey/0.0.1")
        .unwrap();

    let feed = Cursor::new(b"hey/1.0.0\n\nhey/1.1.0".to_vec());

    let work = Work::new(
        WorkSpec::new(prototype)
            .requests(6)
            .concurrency(2)
            .user_agent_feed(feed),
    )
    .unwrap();

    assert_eq!(collect(work).len(), 6);

    let agents = agents.lock().unwrap();
    assert_eq!(agents.len(), 3);
    assert_eq!(agents.get("hey/1.0.0"), Some(&2));
    assert_eq!(agents.get("hey/0.0.1"), Some(&2));
    assert_eq!(agents.get("hey/1.1.0"), Some(&2));
}

fn user_agent_server() -> (TestServer, Arc<Mutex<Vec<Vec<u8>>>>) {
    let agents = Arc::new(Mutex::new(Vec::new()));

    let routes = {
        let agents = agents.clone();
        warp::header::headers_cloned().map(move |headers: warp::http::HeaderMap| {
            let agent = headers
                .get("user-agent")
                .map(|value| value.as_bytes().to_vec())
                .unwrap_or_default();
            agents.lock().unwrap().push(agent);
            "ok"
        })
    };

    let server = TestServer::start(move || {
        warp::serve(routes).bind_ephemeral(([127, 0, 0, 1], 0))
    });

    (server, agents)
}

#[test]
fn bad_feed_entries_fall_back_to_default() {
    let (server, agents) = user_agent_server();

    let prototype = Prototype::new(Method::GET, &server.url("/"))
        .unwrap()
        .header(USER_AGENT, "def")
        .unwrap();

    // DEL and other control bytes are not valid in a header value
    let feed = Cursor::new(b"a\nb\x7fc\nd\x01e\n".to_vec());
    let before = stats::USER_AGENT_FEED_EX.value();

    let work = Work::new(
        WorkSpec::new(prototype)
            .requests(6)
            .concurrency(1)
            .user_agent_feed(feed),
    )
    .unwrap();

    let results = collect(work);
    assert_eq!(results.len(), 6);
    assert!(results.iter().all(|result| result.is_ok()));

    // one worker consumes the feed in order
    let agents = agents.lock().unwrap();
    let expected: [&[u8]; 6] = [b"a", b"def", b"def", b"a", b"def", b"def"];
    assert_eq!(*agents, expected);

    assert!(stats::USER_AGENT_FEED_EX.value() >= before + 4);
}

#[test]
fn feed_entries_are_sent_as_raw_bytes() {
    let (server, agents) = user_agent_server();

    let prototype = Prototype::new(Method::GET, &server.url("/")).unwrap();
    let feed = Cursor::new(b"caf\xe9/1.0\n".to_vec());

    let work = Work::new(
        WorkSpec::new(prototype)
            .requests(2)
            .concurrency(1)
            .user_agent_feed(feed),
    )
    .unwrap();

    assert!(collect(work).iter().all(|result| result.is_ok()));

    let agents = agents.lock().unwrap();
    assert_eq!(agents.len(), 2);
    assert!(agents.iter().all(|agent| agent.as_slice() == b"caf\xe9/1.0"));
}

#[test]
fn stop_ends_run_early() {
    let (server, _count) = counting_server();

    let prototype = Prototype::new(Method::GET, &server.url("/")).unwrap();
    let work = Work::new(
        WorkSpec::new(prototype)
            .requests(1_000_000)
            .concurrency(10),
    )
    .unwrap();

    let running = work.start();
    let results = running.results();

    std::thread::sleep(Duration::from_millis(100));

    let stopped = Instant::now();
    running.stop();

    let received = results.count();
    let completion = running.join().unwrap();

    assert!(stopped.elapsed() < Duration::from_secs(5));
    assert!(completion.cancelled);
    assert_eq!(completion.completed, received as u64);
    assert!(received < 1_000_000);
}

#[test]
fn async_consumer() {
    let (server, count) = counting_server();

    let prototype = Prototype::new(Method::GET, &server.url("/")).unwrap();
    let work = Work::new(WorkSpec::new(prototype).requests(8).concurrency(4)).unwrap();

    let running = work.start();
    let results = running.results();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    let received = runtime.block_on(async move {
        let mut received = 0;
        while let Some(result) = results.recv().await {
            assert!(result.is_ok());
            received += 1;
        }
        received
    });

    running.join().unwrap();

    assert_eq!(received, 8);
    assert_eq!(count.load(Ordering::SeqCst), 8);
}

#[test]
fn refused_connections_still_produce_results() {
    let url = format!("http://127.0.0.1:{}/", closed_port());
    let prototype = Prototype::new(Method::GET, &url).unwrap();
    let work = Work::new(
        WorkSpec::new(prototype)
            .requests(10)
            .concurrency(2)
            .timeout(Duration::from_secs(5)),
    )
    .unwrap();

    let results = collect(work);

    assert_eq!(results.len(), 10);
    for result in &results {
        assert!(result.status.is_none());
        assert!(
            matches!(result.error, Some(RequestError::Connect(_))),
            "{:?}",
            result.error
        );
    }
}

#[test]
fn slow_responses_time_out() {
    let routes = warp::any().and_then(|| async {
        tokio::time::sleep(Duration::from_secs(2)).await;
        Ok::<_, warp::Rejection>("late")
    });

    let server = TestServer::start(move || {
        warp::serve(routes).bind_ephemeral(([127, 0, 0, 1], 0))
    });

    let prototype = Prototype::new(Method::GET, &server.url("/")).unwrap();
    let work = Work::new(
        WorkSpec::new(prototype)
            .requests(2)
            .concurrency(1)
            .timeout(Duration::from_millis(100)),
    )
    .unwrap();

    let results = collect(work);

    assert_eq!(results.len(), 2);
    for result in &results {
        assert!(matches!(result.error, Some(RequestError::Timeout)));
        assert!(result.duration < Duration::from_secs(1));
    }
}

fn redirecting_server() -> TestServer {
    let redirect = warp::path("redirect").map(|| {
        warp::redirect::found(warp::http::Uri::from_static("/target"))
    });
    let target = warp::path("target").map(|| "done");

    let routes = redirect.or(target);

    TestServer::start(move || warp::serve(routes).bind_ephemeral(([127, 0, 0, 1], 0)))
}

#[test]
fn redirects_are_followed() {
    let server = redirecting_server();

    let prototype = Prototype::new(Method::GET, &server.url("/redirect")).unwrap();
    let work = Work::new(WorkSpec::new(prototype).requests(3).concurrency(1)).unwrap();

    for result in collect(work) {
        assert_eq!(result.status, Some(StatusCode::OK));
        assert_eq!(result.size, 4);
    }
}

#[test]
fn redirects_can_be_disabled() {
    let server = redirecting_server();

    let prototype = Prototype::new(Method::GET, &server.url("/redirect")).unwrap();
    let work = Work::new(
        WorkSpec::new(prototype)
            .requests(3)
            .concurrency(1)
            .disable_redirects(true),
    )
    .unwrap();

    for result in collect(work) {
        assert!(result.is_ok());
        assert_eq!(result.status, Some(StatusCode::FOUND));
    }
}

/// `/hop/n` redirects to `/hop/n-1` until `/hop/0`, `/loop` redirects to
/// itself. Every request is counted.
fn redirect_chain_server() -> (TestServer, Arc<AtomicUsize>) {
    let count = Arc::new(AtomicUsize::new(0));

    let hop = {
        let count = count.clone();
        warp::path!("hop" / u32).map(move |n: u32| -> Box<dyn warp::Reply> {
            count.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                Box::new("done")
            } else {
                let next = warp::http::Uri::try_from(format!("/hop/{}", n - 1)).unwrap();
                Box::new(warp::redirect::found(next))
            }
        })
    };

    let looping = {
        let count = count.clone();
        warp::path("loop").map(move || {
            count.fetch_add(1, Ordering::SeqCst);
            warp::redirect::found(warp::http::Uri::from_static("/loop"))
        })
    };

    let routes = hop.or(looping);

    let server =
        TestServer::start(move || warp::serve(routes).bind_ephemeral(([127, 0, 0, 1], 0)));

    (server, count)
}

#[test]
fn redirect_loops_are_cut_off() {
    let (server, count) = redirect_chain_server();

    let prototype = Prototype::new(Method::GET, &server.url("/loop")).unwrap();
    let work = Work::new(WorkSpec::new(prototype).requests(3).concurrency(1)).unwrap();

    let results = collect(work);

    assert_eq!(results.len(), 3);
    for result in &results {
        assert!(
            matches!(result.error, Some(RequestError::TooManyRedirects(_))),
            "{:?}",
            result.error
        );
        assert_eq!(result.status, None);
    }

    assert_eq!(count.load(Ordering::SeqCst), 3 * MAX_REDIRECTS);
}

#[test]
fn redirect_limit_counts_requests() {
    let (server, count) = redirect_chain_server();

    // nine redirects, ten requests in total
    let longest = format!("/hop/{}", MAX_REDIRECTS - 1);
    let prototype = Prototype::new(Method::GET, &server.url(&longest)).unwrap();
    let work = Work::new(WorkSpec::new(prototype).requests(1).concurrency(1)).unwrap();

    let results = collect(work);
    assert!(results[0].is_ok(), "{:?}", results[0].error);
    assert_eq!(results[0].status, Some(StatusCode::OK));
    assert_eq!(count.load(Ordering::SeqCst), MAX_REDIRECTS);

    // one more hop is too many
    let too_long = format!("/hop/{}", MAX_REDIRECTS);
    let prototype = Prototype::new(Method::GET, &server.url(&too_long)).unwrap();
    let work = Work::new(WorkSpec::new(prototype).requests(1).concurrency(1)).unwrap();

    let results = collect(work);
    assert!(matches!(
        results[0].error,
        Some(RequestError::TooManyRedirects(_))
    ));
    assert_eq!(count.load(Ordering::SeqCst), 2 * MAX_REDIRECTS);
}

#[test]
fn keepalive_can_be_disabled() {
    let (server, count) = counting_server();

    let prototype = Prototype::new(Method::GET, &server.url("/")).unwrap();
    let work = Work::new(
        WorkSpec::new(prototype)
            .requests(5)
            .concurrency(1)
            .disable_keepalive(true),
    )
    .unwrap();

    // every request dials a fresh connection
    for result in collect(work) {
        assert!(result.is_ok());
        assert!(result.connection.is_some());
    }

    assert_eq!(count.load(Ordering::SeqCst), 5);
}

#[test]
fn invalid_configurations_are_rejected() {
    assert!(matches!(
        Prototype::new(Method::GET, "ftp://localhost/"),
        Err(Error::InvalidTarget(_))
    ));
    assert!(matches!(
        Prototype::new(Method::GET, "/relative"),
        Err(Error::InvalidTarget(_))
    ));

    let prototype = Prototype::new(Method::GET, "http://localhost/").unwrap();

    assert!(matches!(
        Work::new(WorkSpec::new(prototype.clone()).concurrency(0)),
        Err(Error::ZeroConcurrency)
    ));
    assert!(matches!(
        Work::new(WorkSpec::new(prototype.clone()).requests(1).concurrency(2)),
        Err(Error::ConcurrencyExceedsRequests { .. })
    ));
    assert!(matches!(
        Work::new(WorkSpec::new(prototype).qps(f64::NAN)),
        Err(Error::InvalidQps(_))
    ));
}
