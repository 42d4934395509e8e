// Copyright (C) 2024, Tony Rippy
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! HTTP transport for scrape requests. `Hyper1Fetcher` hand-rolls an
//! HTTP/1 client on top of `hyper`'s connection primitives rather than
//! pulling in a full client crate, the same way the teacher's own fetch
//! path does, but keeps one connection per authority alive across scrapes
//! instead of reconnecting every cycle.
//!
//! The fallback sample timestamp is the scrape engine's own clock at the
//! start of the cycle (spec §4.6 step 1), captured by the caller before
//! `fetch` is even invoked — this module has no opinion on timestamps and
//! does not look at the response's `Date` header.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Empty};
use hyper::client::conn::http1::{self, SendRequest};
use hyper::header::{ACCEPT, CONTENT_TYPE, HOST};
use hyper::{Request, Uri};
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;

use crate::error::ScrapeError;

/// The Prometheus text exposition media type this crate understands, used
/// as the fallback `Content-Type` when a response omits the header.
pub const ACCEPT_TEXT_FORMAT: &str = "text/plain;version=0.0.4";

/// Content-negotiated `Accept` header sent on every scrape request: prefers
/// delimited protobuf, falls back to the text exposition format. Matching
/// a q=0.7/q=0.3 preference means a target that supports both picks
/// protobuf; one that only understands the text format still answers.
pub const ACCEPT_NEGOTIATED: &str = "application/vnd.google.protobuf;proto=io.prometheus.client.MetricFamily;encoding=delimited;q=0.7,text/plain;version=0.0.4;q=0.3";

/// A successfully fetched scrape response: the body and the media type the
/// target reported. The caller supplies its own fallback timestamp; this
/// type carries none.
pub struct FetchResponse {
    pub content_type: String,
    pub body: String,
}

#[async_trait]
pub trait HttpFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchResponse, ScrapeError>;
}

fn authority_of(uri: &Uri) -> Result<String, ScrapeError> {
    uri.authority()
        .map(|a| a.to_string())
        .ok_or_else(|| ScrapeError::Transport {
            url: uri.to_string(),
            source: "url has no host".into(),
        })
}

/// Connection-reusing HTTP/1 client built directly on `hyper::client::conn`.
/// One live connection is kept per authority (`host:port`); a send that
/// fails because the peer closed the connection triggers a fresh connect
/// and a single retry.
pub struct Hyper1Fetcher {
    connections: Mutex<HashMap<String, SendRequest<Empty<Bytes>>>>,
}

impl Hyper1Fetcher {
    pub fn new() -> Self {
        Hyper1Fetcher {
            connections: Mutex::new(HashMap::new()),
        }
    }

    async fn connect(&self, uri: &Uri) -> Result<SendRequest<Empty<Bytes>>, ScrapeError> {
        let authority = authority_of(uri)?;
        let stream = TcpStream::connect(&authority)
            .await
            .map_err(|e| ScrapeError::Transport {
                url: uri.to_string(),
                source: Box::new(e),
            })?;
        let io = TokioIo::new(stream);
        let (sender, connection) = http1::handshake(io)
            .await
            .map_err(|e| ScrapeError::Transport {
                url: uri.to_string(),
                source: Box::new(e),
            })?;
        tokio::spawn(async move {
            if let Err(err) = connection.await {
                log::debug!("scrape connection closed: {err}");
            }
        });
        Ok(sender)
    }

    async fn send_once(
        &self,
        uri: &Uri,
        sender: &mut SendRequest<Empty<Bytes>>,
    ) -> Result<FetchResponse, ScrapeError> {
        let authority = authority_of(uri)?;
        let request = Request::builder()
            .uri(uri.clone())
            .header(HOST, authority)
            .header(ACCEPT, ACCEPT_NEGOTIATED)
            .body(Empty::<Bytes>::new())
            .map_err(|e| ScrapeError::Transport {
                url: uri.to_string(),
                source: Box::new(e),
            })?;
        let response = sender
            .send_request(request)
            .await
            .map_err(|e| ScrapeError::Transport {
                url: uri.to_string(),
                source: Box::new(e),
            })?;
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(ACCEPT_TEXT_FORMAT)
            .to_string();
        let body = response
            .collect()
            .await
            .map_err(|e| ScrapeError::Transport {
                url: uri.to_string(),
                source: Box::new(e),
            })?
            .to_bytes();
        let body = String::from_utf8_lossy(&body).into_owned();
        Ok(FetchResponse { content_type, body })
    }
}

impl Default for Hyper1Fetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpFetcher for Hyper1Fetcher {
    async fn fetch(&self, url: &str) -> Result<FetchResponse, ScrapeError> {
        let uri: Uri = url.parse().map_err(|e: hyper::http::uri::InvalidUri| ScrapeError::Transport {
            url: url.to_string(),
            source: Box::new(e),
        })?;
        let authority = authority_of(&uri)?;

        let cached = self.connections.lock().unwrap().remove(&authority);
        let (mut sender, reused) = match cached {
            Some(sender) if !sender.is_closed() => (sender, true),
            _ => (self.connect(&uri).await?, false),
        };

        let mut result = self.send_once(&uri, &mut sender).await;
        // A reused connection can have been closed by the peer between
        // being cached and this send; give it one fresh-connect retry
        // before giving up. A connection we just opened gets no retry.
        if result.is_err() && reused {
            sender = self.connect(&uri).await?;
            result = self.send_once(&uri, &mut sender).await;
        }
        if result.is_ok() && !sender.is_closed() {
            self.connections.lock().unwrap().insert(authority, sender);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authority_extraction_rejects_relative_urls() {
        let uri: Uri = "/metrics".parse().unwrap();
        assert!(authority_of(&uri).is_err());
    }
}
