// SPDX-License-Identifier: (Apache-2.0)
// Copyright Authors of requester

use http::header::{ACCEPT, CONTENT_TYPE, HOST};
use http::Method;
use requester::{Error, Prototype, WorkSpec};
use serde::{Deserialize, Deserializer};
use std::io::Read;
use std::path::Path;
use std::time::Duration;

mod debug;
mod general;
mod request;

pub use debug::Debug;
pub use general::General;
pub use request::Request;

#[derive(Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    general: General,
    request: Request,
    #[serde(default)]
    debug: Debug,
}

impl Config {
    pub fn new(filename: &Path) -> Self {
        let mut file = match std::fs::File::open(filename) {
            Ok(c) => c,
            Err(error) => {
                eprintln!("error loading config file: {}\n{error}", filename.display());
                std::process::exit(1);
            }
        };
        let mut content = String::new();
        match file.read_to_string(&mut content) {
            Ok(_) => {}
            Err(error) => {
                eprintln!("error reading config file: {}\n{error}", filename.display());
                std::process::exit(1);
            }
        }
        let toml = toml::from_str(&content);
        match toml {
            Ok(toml) => toml,
            Err(error) => {
                eprintln!("Failed to parse TOML config: {}\n{error}", filename.display());
                std::process::exit(1);
            }
        }
    }

    pub fn general(&self) -> &General {
        &self.general
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn debug(&self) -> &Debug {
        &self.debug
    }

    /// Turn the config into a run description. Files named by the config
    /// (body, user agent feed) are opened here.
    pub fn work_spec(&self) -> Result<WorkSpec, Error> {
        let general = self.general();
        let request = self.request();

        let method = Method::from_bytes(request.method().to_uppercase().as_bytes())
            .map_err(|e| Error::InvalidRequest(e.into()))?;

        let mut prototype =
            Prototype::new(method, request.url())?.header(CONTENT_TYPE, request.content_type())?;

        if let Some(accept) = request.accept() {
            prototype = prototype.header(ACCEPT, accept)?;
        }

        for (name, value) in request.headers() {
            prototype = prototype.header(name.as_str(), value.as_str())?;
        }

        // an explicit host wins over a `Host` entry in the header table
        if let Some(host) = request.host() {
            prototype = prototype.header(HOST, host)?;
        }

        if let Some(username) = request.username() {
            prototype = prototype.basic_auth(username, request.password().unwrap_or(""))?;
        }

        if let Some(body) = request.body()? {
            prototype = prototype.body(body);
        }

        let mut spec = WorkSpec::new(prototype)
            .requests(general.requests())
            .concurrency(general.concurrency())
            .qps(general.qps())
            .disable_keepalive(request.disable_keepalive())
            .disable_redirects(request.disable_redirects());

        if let Some(timeout) = general.timeout() {
            spec = spec.timeout(timeout);
        }

        if let Some(threads) = general.threads() {
            spec = spec.threads(threads);
        }

        if let Some(path) = request.user_agent_feed() {
            spec = spec.user_agent_feed(std::fs::File::open(path)?);
        }

        Ok(spec)
    }
}

// durations are written as humantime strings, eg: "20s" or "1m 30s"
fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let value = String::deserialize(deserializer)?;
    humantime::parse_duration(&value).map_err(serde::de::Error::custom)
}
