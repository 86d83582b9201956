// SPDX-License-Identifier: (Apache-2.0)
// Copyright Authors of requester

use crate::error::{Error, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, HOST};
use http::{Method, Request, Uri};

/// The request every dispatch is cloned from.
///
/// A `Prototype` is never sent itself. Each worker calls [`Prototype::build`]
/// to get a request that it exclusively owns for the duration of one call.
#[derive(Clone, Debug)]
pub struct Prototype {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    // `Host` value derived from the url, used unless a header overrides it
    host: HeaderValue,
    body: Bytes,
}

impl Prototype {
    /// Create a prototype for an absolute `http://` or `https://` url.
    pub fn new(method: Method, url: &str) -> Result<Self> {
        let uri: Uri = url
            .parse()
            .map_err(|e| Error::InvalidTarget(format!("{url}: {e}")))?;

        match uri.scheme_str() {
            Some("http") | Some("https") => {}
            _ => {
                return Err(Error::InvalidTarget(format!(
                    "{url}: scheme must be http or https"
                )));
            }
        }

        let host = host_header(&uri)
            .ok_or_else(|| Error::InvalidTarget(format!("{url}: missing host")))?;

        Ok(Self {
            method,
            uri,
            headers: HeaderMap::new(),
            host,
            body: Bytes::new(),
        })
    }

    /// Sets a header, replacing any previous values for the same name.
    pub fn header<K, V>(mut self, name: K, value: V) -> Result<Self>
    where
        HeaderName: TryFrom<K>,
        <HeaderName as TryFrom<K>>::Error: Into<http::Error>,
        HeaderValue: TryFrom<V>,
        <HeaderValue as TryFrom<V>>::Error: Into<http::Error>,
    {
        let name = HeaderName::try_from(name).map_err(|e| Error::InvalidRequest(e.into()))?;
        let value = HeaderValue::try_from(value).map_err(|e| Error::InvalidRequest(e.into()))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Sets the `Authorization` header for HTTP basic authentication.
    pub fn basic_auth(self, username: &str, password: &str) -> Result<Self> {
        let credentials = STANDARD.encode(format!("{username}:{password}"));
        self.header(AUTHORIZATION, format!("Basic {credentials}"))
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Produce an independent copy of the prototype.
    ///
    /// The header map and url are deep copies. The body is a new handle onto
    /// the same immutable bytes, so every clone reads it from the start.
    pub fn build(&self) -> Request<Bytes> {
        let mut request = Request::new(self.body.clone());
        *request.method_mut() = self.method.clone();
        *request.uri_mut() = self.uri.clone();
        *request.headers_mut() = self.headers.clone();

        if !request.headers().contains_key(HOST) {
            request.headers_mut().insert(HOST, self.host.clone());
        }

        request
    }
}

/// The `Host` header value for a url: host and explicit port, without any
/// userinfo.
pub(crate) fn host_header(uri: &Uri) -> Option<HeaderValue> {
    let host = uri.host().filter(|host| !host.is_empty())?;

    let host = match uri.port() {
        Some(port) => format!("{host}:{}", port.as_str()),
        None => host.to_string(),
    };

    HeaderValue::try_from(host).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::{CONTENT_TYPE, USER_AGENT};

    #[test]
    fn rejects_invalid_targets() {
        assert!(Prototype::new(Method::GET, "ftp://example.com/").is_err());
        assert!(Prototype::new(Method::GET, "/relative/path").is_err());
        assert!(Prototype::new(Method::GET, "not a url").is_err());
        assert!(Prototype::new(Method::GET, "http://example.com/").is_ok());
        assert!(Prototype::new(Method::GET, "https://example.com:8443/a?b=c").is_ok());
    }

    #[test]
    fn clones_do_not_share_headers() {
        let prototype = Prototype::new(Method::POST, "http://example.com/path")
            .unwrap()
            .header(USER_AGENT, "default/1.0")
            .unwrap();

        let mut first = prototype.build();
        let second = prototype.build();

        first
            .headers_mut()
            .insert(USER_AGENT, HeaderValue::from_static("changed/2.0"));
        first
            .headers_mut()
            .insert("x-extra", HeaderValue::from_static("1"));

        assert_eq!(second.headers()[USER_AGENT], "default/1.0");
        assert!(second.headers().get("x-extra").is_none());
        assert_eq!(prototype.headers()[USER_AGENT], "default/1.0");
        assert_eq!(prototype.headers().len(), 1);
    }

    #[test]
    fn every_clone_sees_the_whole_body() {
        let prototype = Prototype::new(Method::POST, "http://example.com/")
            .unwrap()
            .body("Body");

        for _ in 0..3 {
            let request = prototype.build();
            assert_eq!(request.method(), Method::POST);
            assert_eq!(request.body().as_ref(), b"Body");
        }
    }

    #[test]
    fn host_header_defaults_to_authority() {
        let prototype = Prototype::new(Method::GET, "http://example.com:8080/x").unwrap();
        assert_eq!(prototype.build().headers()[HOST], "example.com:8080");

        let prototype = prototype.header(HOST, "override.test").unwrap();
        assert_eq!(prototype.build().headers()[HOST], "override.test");
    }

    #[test]
    fn basic_auth_is_base64_encoded() {
        let request = Prototype::new(Method::GET, "http://example.com/")
            .unwrap()
            .header(CONTENT_TYPE, "text/html")
            .unwrap()
            .basic_auth("username", "password")
            .unwrap()
            .build();

        assert_eq!(
            request.headers()[AUTHORIZATION],
            "Basic dXNlcm5hbWU6cGFzc3dvcmQ="
        );
        assert_eq!(request.headers()[CONTENT_TYPE], "text/html");
    }
}
