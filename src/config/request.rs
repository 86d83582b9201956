// SPDX-License-Identifier: (Apache-2.0)
// Copyright Authors of requester

use super::*;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Clone, Deserialize)]
pub struct Request {
    #[serde(default = "method")]
    method: String,
    url: String,
    /// Extra headers, added to every request.
    #[serde(default)]
    headers: BTreeMap<String, String>,
    body: Option<String>,
    /// Read the body from this file. Takes precedence over `body`.
    body_file: Option<PathBuf>,
    #[serde(default = "content_type")]
    content_type: String,
    accept: Option<String>,
    /// Overrides the `Host` header derived from the url.
    host: Option<String>,
    username: Option<String>,
    password: Option<String>,
    /// A file with one user agent per line, cycled through across requests.
    user_agent_feed: Option<PathBuf>,
    #[serde(default)]
    disable_keepalive: bool,
    #[serde(default)]
    disable_redirects: bool,
}

fn method() -> String {
    "GET".to_string()
}

fn content_type() -> String {
    "text/html".to_string()
}

impl Request {
    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    pub fn body(&self) -> std::io::Result<Option<Bytes>> {
        if let Some(path) = &self.body_file {
            return std::fs::read(path).map(|body| Some(Bytes::from(body)));
        }

        Ok(self.body.clone().map(Bytes::from))
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn accept(&self) -> Option<&str> {
        self.accept.as_deref()
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    pub fn user_agent_feed(&self) -> Option<&Path> {
        self.user_agent_feed.as_deref()
    }

    pub fn disable_keepalive(&self) -> bool {
        self.disable_keepalive
    }

    pub fn disable_redirects(&self) -> bool {
        self.disable_redirects
    }
}
