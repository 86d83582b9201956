// SPDX-License-Identifier: (Apache-2.0)
// Copyright Authors of requester

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use tokio::runtime::{Builder, Runtime};

/// A warp server running on its own runtime, so the engine under test and the
/// server never share threads.
pub struct TestServer {
    addr: SocketAddr,
    _runtime: Runtime,
}

impl TestServer {
    /// `bind` is called inside the server runtime and is expected to return
    /// `warp::serve(..).bind_ephemeral(..)`.
    pub fn start<F, S>(bind: F) -> Self
    where
        F: FnOnce() -> (SocketAddr, S),
        S: Future<Output = ()> + Send + 'static,
    {
        let runtime = Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();

        let addr = runtime.block_on(async {
            let (addr, server) = bind();
            tokio::spawn(server);
            addr
        });

        Self {
            addr,
            _runtime: runtime,
        }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }
}

/// An address that refuses connections.
pub fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}
