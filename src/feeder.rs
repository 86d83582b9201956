// SPDX-License-Identifier: (Apache-2.0)
// Copyright Authors of requester

//! Cyclic User-Agent feed.
//!
//! Each dispatch takes the next line of the feed as its `User-Agent`. When the
//! feed is exhausted it starts over from the beginning, so the feed never runs
//! out. A blank line means "keep whatever the prototype request had".

use http::header::{HeaderValue, USER_AGENT};
use http::Request;
use std::io::{BufRead, BufReader, Error, ErrorKind, Read, Result, Seek, SeekFrom};
use std::sync::Mutex;

/// Anything the feed can be read from. Must be seekable so the feed can
/// restart from the beginning.
pub trait FeedSource: Read + Seek + Send {}

impl<T: Read + Seek + Send> FeedSource for T {}

pub struct UserAgentFeeder {
    inner: Mutex<Feed>,
}

struct Feed {
    reader: BufReader<Box<dyn FeedSource>>,
    line: Vec<u8>,
}

impl Feed {
    fn next_line(&mut self) -> Result<Vec<u8>> {
        let mut restarted = false;

        loop {
            self.line.clear();

            if self.reader.read_until(b'\n', &mut self.line)? > 0 {
                let mut line = self.line.as_slice();
                while let [rest @ .., b'\n' | b'\r'] = line {
                    line = rest;
                }
                return Ok(line.to_vec());
            }

            // an empty source yields nothing even after a restart
            if restarted {
                return Ok(Vec::new());
            }

            self.reader.seek(SeekFrom::Start(0))?;
            restarted = true;
        }
    }
}

impl UserAgentFeeder {
    pub fn new<T: FeedSource + 'static>(source: T) -> Self {
        Self::from_boxed(Box::new(source))
    }

    pub fn from_boxed(source: Box<dyn FeedSource>) -> Self {
        Self {
            inner: Mutex::new(Feed {
                reader: BufReader::new(source),
                line: Vec::new(),
            }),
        }
    }

    /// Returns the next entry of the feed as raw bytes, wrapping around to the
    /// first entry once the end is reached.
    pub fn next(&self) -> Result<Vec<u8>> {
        let mut feed = self
            .inner
            .lock()
            .map_err(|_| Error::other("user agent feed lock poisoned"))?;

        feed.next_line()
    }

    /// Sets the request's `User-Agent` from the feed. A blank entry leaves the
    /// existing header untouched.
    pub fn apply<B>(&self, request: &mut Request<B>) -> Result<()> {
        let user_agent = self.next()?;

        if user_agent.is_empty() {
            return Ok(());
        }

        let value = HeaderValue::from_bytes(&user_agent)
            .map_err(|e| Error::new(ErrorKind::InvalidData, e))?;
        request.headers_mut().insert(USER_AGENT, value);

        Ok(())
    }
}
