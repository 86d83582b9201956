// SPDX-License-Identifier: (Apache-2.0)
// Copyright Authors of requester

use crate::metrics::*;
use crate::net::Connector;
use crate::request::host_header;
use crate::result::{ConnectionTime, RequestError, RequestResult};
use bytes::Bytes;
use http::header::{
    HeaderMap, HeaderValue, AUTHORIZATION, CONNECTION, CONTENT_LENGTH, CONTENT_TYPE, COOKIE, HOST,
    LOCATION,
};
use http::uri::PathAndQuery;
use http::{Method, Request, StatusCode, Uri};
use http_body_util::{BodyExt, Full};
use hyper::client::conn::http1::SendRequest;
use hyper_util::rt::TokioIo;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;

/// Requests one dispatch may make, the original included. A redirect answered
/// to the last of them fails the dispatch, so at most `MAX_REDIRECTS - 1`
/// redirects are followed.
pub const MAX_REDIRECTS: usize = 10;

#[derive(Clone, Debug, PartialEq, Eq)]
struct Endpoint {
    tls: bool,
    host: String,
    port: u16,
}

impl Endpoint {
    fn from_uri(uri: &Uri) -> Result<Self, RequestError> {
        let tls = match uri.scheme_str() {
            Some("http") => false,
            Some("https") => true,
            _ => {
                return Err(RequestError::InvalidRequest(format!(
                    "unsupported scheme in {uri}"
                )));
            }
        };

        let host = uri
            .host()
            .ok_or_else(|| RequestError::InvalidRequest(format!("no host in {uri}")))?
            .to_string();

        let port = uri.port_u16().unwrap_or(if tls { 443 } else { 80 });

        Ok(Self { tls, host, port })
    }
}

struct Connection {
    endpoint: Endpoint,
    sender: SendRequest<Full<Bytes>>,
}

/// What is needed to re-issue a request when following a redirect.
struct Replay {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
}

/// A worker's HTTP/1.1 session.
///
/// HTTP/1.1 is not mux'd, so each worker owns at most one connection and
/// reuses it for consecutive requests while keep-alive allows it.
pub struct Session {
    connector: Arc<Connector>,
    keepalive: bool,
    redirects: bool,
    connection: Option<Connection>,
}

impl Session {
    pub fn new(connector: Arc<Connector>, keepalive: bool, redirects: bool) -> Self {
        Self {
            connector,
            keepalive,
            redirects,
            connection: None,
        }
    }

    /// Send one request and read its response. Always produces a result,
    /// failures are recorded in it.
    pub async fn dispatch(
        &mut self,
        request: Request<Bytes>,
        request_timeout: Option<Duration>,
    ) -> RequestResult {
        let start = Instant::now();

        REQUEST.increment();

        let result = match request_timeout {
            Some(duration) => match timeout(duration, self.execute(request, start)).await {
                Ok(result) => result,
                Err(_) => {
                    RESPONSE_TIMEOUT.increment();
                    Err(RequestError::Timeout)
                }
            },
            None => self.execute(request, start).await,
        };

        match result {
            Ok(result) => {
                RESPONSE_OK.increment();
                result
            }
            Err(e) => {
                RESPONSE_EX.increment();
                // the connection may be mid-exchange, never reuse it
                self.connection = None;
                RequestResult::failed(start, e)
            }
        }
    }

    async fn execute(
        &mut self,
        mut request: Request<Bytes>,
        start: Instant,
    ) -> Result<RequestResult, RequestError> {
        let mut connection_time = None;
        let mut hops = 0;

        loop {
            let endpoint = Endpoint::from_uri(request.uri())?;
            let (mut sender, time) = self.checkout(&endpoint).await?;
            if time.is_some() {
                connection_time = time;
            }

            if !self.keepalive {
                request
                    .headers_mut()
                    .insert(CONNECTION, HeaderValue::from_static("close"));
            }

            let replay = self.redirects.then(|| Replay {
                method: request.method().clone(),
                uri: request.uri().clone(),
                headers: request.headers().clone(),
                body: request.body().clone(),
            });

            let request_line = origin_form(request.uri())?;
            let (mut parts, body) = request.into_parts();
            parts.uri = request_line;
            let wire = Request::from_parts(parts, Full::new(body));

            let sent = Instant::now();
            let response = sender.send_request(wire).await?;
            let head = Instant::now();

            let (parts, mut body) = response.into_parts();

            let mut size = 0;
            while let Some(frame) = body.frame().await {
                if let Some(data) = frame?.data_ref() {
                    size += data.len() as u64;
                }
            }
            let done = Instant::now();

            self.checkin(endpoint, sender, &parts.headers).await;

            if let Some(replay) = replay {
                if let Some(next) = redirect(replay, parts.status, &parts.headers) {
                    hops += 1;
                    if hops >= MAX_REDIRECTS {
                        return Err(RequestError::TooManyRedirects(MAX_REDIRECTS));
                    }
                    REQUEST_REDIRECT.increment();
                    request = next;
                    continue;
                }
            }

            return Ok(RequestResult {
                start,
                duration: done - start,
                connection: connection_time,
                wait: head - sent,
                read: done - head,
                status: Some(parts.status),
                size,
                error: None,
            });
        }
    }

    /// Take the current connection if it goes to `endpoint` and is ready,
    /// otherwise open a new one.
    async fn checkout(
        &mut self,
        endpoint: &Endpoint,
    ) -> Result<(SendRequest<Full<Bytes>>, Option<ConnectionTime>), RequestError> {
        if let Some(mut connection) = self.connection.take() {
            if connection.endpoint == *endpoint && connection.sender.ready().await.is_ok() {
                return Ok((connection.sender, None));
            }
        }

        CONNECT.increment();

        let (stream, mut time) = match self
            .connector
            .connect(&endpoint.host, endpoint.port, endpoint.tls)
            .await
        {
            Ok(connected) => connected,
            Err(e) => {
                CONNECT_EX.increment();
                return Err(e);
            }
        };

        let handshake = Instant::now();
        let (sender, conn) = match hyper::client::conn::http1::handshake(TokioIo::new(stream)).await
        {
            Ok(handshake) => handshake,
            Err(e) => {
                CONNECT_EX.increment();
                return Err(e.into());
            }
        };
        time.dial += handshake.elapsed();

        CONNECT_OK.increment();

        tokio::spawn(async move {
            let _ = conn.await;
        });

        Ok((sender, Some(time)))
    }

    /// Keep the connection for the next request unless it can't be reused.
    async fn checkin(
        &mut self,
        endpoint: Endpoint,
        mut sender: SendRequest<Full<Bytes>>,
        headers: &HeaderMap,
    ) {
        let server_closed = headers
            .get(CONNECTION)
            .map(|v| v.as_bytes().eq_ignore_ascii_case(b"close"))
            .unwrap_or(false);

        if server_closed {
            SESSION_CLOSED_SERVER.increment();
            return;
        }

        if !self.keepalive || sender.ready().await.is_err() {
            return;
        }

        self.connection = Some(Connection { endpoint, sender });
    }
}

/// The request target as sent on the wire: path and query only.
fn origin_form(uri: &Uri) -> Result<Uri, RequestError> {
    let path_and_query = match uri.path_and_query() {
        Some(pq) if pq.as_str().starts_with('/') => pq.clone(),
        Some(pq) => format!("/{}", pq.as_str())
            .parse::<PathAndQuery>()
            .map_err(|e| RequestError::InvalidRequest(e.to_string()))?,
        None => PathAndQuery::from_static("/"),
    };

    Uri::builder()
        .path_and_query(path_and_query)
        .build()
        .map_err(|e| RequestError::InvalidRequest(e.to_string()))
}

/// Builds the follow-up request for a redirect response, or `None` if the
/// response is final.
fn redirect(replay: Replay, status: StatusCode, headers: &HeaderMap) -> Option<Request<Bytes>> {
    let keep_method = match status {
        StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND | StatusCode::SEE_OTHER => false,
        StatusCode::TEMPORARY_REDIRECT | StatusCode::PERMANENT_REDIRECT => true,
        _ => return None,
    };

    let location = headers.get(LOCATION)?.to_str().ok()?;
    let uri = resolve_location(&replay.uri, location)?;

    let mut method = replay.method;
    let mut body = replay.body;
    let mut headers = replay.headers;

    if !keep_method && method != Method::HEAD {
        method = Method::GET;
        body = Bytes::new();
        headers.remove(CONTENT_TYPE);
        headers.remove(CONTENT_LENGTH);
    }

    // credentials are only forwarded to the same authority
    if uri.authority() != replay.uri.authority() {
        headers.remove(AUTHORIZATION);
        headers.remove(COOKIE);
    }

    headers.remove(HOST);
    headers.insert(HOST, host_header(&uri)?);

    let mut request = Request::new(body);
    *request.method_mut() = method;
    *request.uri_mut() = uri;
    *request.headers_mut() = headers;

    Some(request)
}

/// Resolve a `Location` header against the url that produced it.
fn resolve_location(base: &Uri, location: &str) -> Option<Uri> {
    if let Ok(uri) = location.parse::<Uri>() {
        if uri.scheme().is_some() && uri.authority().is_some() {
            return Some(uri);
        }
    }

    let scheme = base.scheme_str()?;

    if let Some(rest) = location.strip_prefix("//") {
        return format!("{scheme}://{rest}").parse().ok();
    }

    let authority = base.authority()?.as_str();

    let target = if location.starts_with('/') {
        location.to_string()
    } else {
        let path = base.path();
        let dir = &path[..path.rfind('/').map(|i| i + 1).unwrap_or(0)];
        format!("{dir}{location}")
    };

    format!("{scheme}://{authority}{target}").parse().ok()
}
