// SPDX-License-Identifier: (Apache-2.0)
// Copyright Authors of requester

use crate::result::{ConnectionTime, RequestError};
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use std::io::{Error, ErrorKind};
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

/// Opens plaintext or TLS streams to the target. One connector is shared by
/// all sessions of a run.
pub struct Connector {
    tls: TlsConnector,
}

impl Connector {
    pub fn new() -> std::io::Result<Self> {
        let roots = RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let config = ClientConfig::builder_with_provider(Arc::new(
            rustls::crypto::aws_lc_rs::default_provider(),
        ))
        .with_safe_default_protocol_versions()
        .map_err(Error::other)?
        .with_root_certificates(roots)
        .with_no_client_auth();

        Ok(Self {
            tls: TlsConnector::from(Arc::new(config)),
        })
    }

    /// Resolve `host` and connect to the first address that accepts. The
    /// returned timings cover resolution and the dial (including TLS).
    pub async fn connect(
        &self,
        host: &str,
        port: u16,
        tls: bool,
    ) -> Result<(Stream, ConnectionTime), RequestError> {
        // ipv6 literals come bracketed out of a uri authority
        let host = host.trim_start_matches('[').trim_end_matches(']');

        let start = Instant::now();
        let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, port))
            .await
            .map_err(RequestError::Resolve)?
            .collect();
        let resolved = Instant::now();

        if addrs.is_empty() {
            return Err(RequestError::Resolve(Error::new(
                ErrorKind::NotFound,
                "dns found no addresses",
            )));
        }

        // try every address, a name like localhost may resolve to both ::1
        // and 127.0.0.1 while the server listens on only one of them
        let mut last_error = Error::new(ErrorKind::NotFound, "dns found no addresses");
        let mut tcp = None;
        for addr in addrs {
            match TcpStream::connect(addr).await {
                Ok(s) => {
                    tcp = Some(s);
                    break;
                }
                Err(e) => last_error = e,
            }
        }

        let tcp = tcp.ok_or(RequestError::Connect(last_error))?;

        if let Err(e) = tcp.set_nodelay(true) {
            return Err(RequestError::Connect(e));
        }

        let stream = if tls {
            let domain = ServerName::try_from(host.to_string())
                .map_err(|e| RequestError::Tls(Error::new(ErrorKind::InvalidInput, e)))?;

            let stream = self
                .tls
                .connect(domain, tcp)
                .await
                .map_err(RequestError::Tls)?;

            Stream {
                inner: StreamImpl::RustlsTcp(Box::new(stream)),
            }
        } else {
            Stream {
                inner: StreamImpl::Tcp(tcp),
            }
        };

        let time = ConnectionTime {
            dns: resolved - start,
            dial: resolved.elapsed(),
        };

        Ok((stream, time))
    }
}

pub struct Stream {
    inner: StreamImpl,
}

enum StreamImpl {
    Tcp(TcpStream),
    RustlsTcp(Box<TlsStream<TcpStream>>),
}

impl AsyncRead for Stream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match &mut self.inner {
            StreamImpl::Tcp(s) => Pin::new(s).poll_read(cx, buf),
            StreamImpl::RustlsTcp(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Stream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match &mut self.inner {
            StreamImpl::Tcp(s) => Pin::new(s).poll_write(cx, buf),
            StreamImpl::RustlsTcp(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match &mut self.inner {
            StreamImpl::Tcp(s) => Pin::new(s).poll_flush(cx),
            StreamImpl::RustlsTcp(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match &mut self.inner {
            StreamImpl::Tcp(s) => Pin::new(s).poll_shutdown(cx),
            StreamImpl::RustlsTcp(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn connects_by_hostname() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let _ = listener.accept().await;
        });

        let connector = Connector::new().unwrap();
        let (_stream, time) = connector.connect("localhost", port, false).await.unwrap();
        assert!(time.total() >= time.dns);
    }

    #[tokio::test]
    async fn refused_connection_is_a_connect_error() {
        // bind then drop to find a port nobody listens on
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let connector = Connector::new().unwrap();
        let result = connector.connect("127.0.0.1", port, false).await;
        assert!(matches!(result, Err(RequestError::Connect(_))));
    }
}
