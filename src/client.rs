//! Client Module
//!
//! Typed key-value operations over one multiplexed connection.
//!
//! ## Call Flow
//! 1. Take a fresh tag from the client's counter
//! 2. Encode the request payload
//! 3. Submit, then block on that tag's slot
//! 4. Decode the response for the request type
//!
//! There is no lock around a call: threads sharing one `KvClient` have
//! independent requests in flight at the same time, kept apart by tag.

use std::collections::HashMap;
use std::net::TcpStream;
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::{Duration, Instant};

use bytes::Bytes;

use crate::config::Config;
use crate::demux::Demultiplexer;
use crate::error::{MuxError, Result};
use crate::network::TaggedConnection;
use crate::protocol::{decode_response, encode_request, Request, Response};

/// Client for the key-value service
///
/// `Send + Sync`; share it between threads by reference or `Arc`.
pub struct KvClient {
    demux: Demultiplexer,
    config: Config,

    /// Next tag to hand out (wraps around)
    next_tag: AtomicI32,
}

impl KvClient {
    /// Connect to `addr` (host:port) with default settings
    pub fn connect(addr: impl Into<String>) -> Result<Self> {
        Self::connect_with_config(Config::builder().server_addr(addr).build())
    }

    /// Connect to `config.server_addr`
    pub fn connect_with_config(config: Config) -> Result<Self> {
        let conn = TaggedConnection::connect(&config)?;
        Self::with_connection(conn, config)
    }

    /// Build a client over an already connected stream
    pub fn from_stream(stream: TcpStream, config: Config) -> Result<Self> {
        config.validate()?;
        let conn = TaggedConnection::from_stream(stream, &config)?;
        Self::with_connection(conn, config)
    }

    fn with_connection(conn: TaggedConnection, config: Config) -> Result<Self> {
        tracing::debug!("Client connected to {}", conn.peer_addr());
        let demux = Demultiplexer::new(conn, config.slot_capacity)?;

        Ok(Self {
            demux,
            config,
            next_tag: AtomicI32::new(1),
        })
    }

    // =========================================================================
    // Account Operations
    // =========================================================================

    /// Check credentials
    ///
    /// `Ok(false)` only for a well-formed "no" from the server.
    pub fn authenticate(&self, username: &str, password: &str) -> Result<bool> {
        let request = Request::Authenticate {
            username: username.to_string(),
            password: password.to_string(),
        };
        match self.call(&request)? {
            Response::Bool(accepted) => Ok(accepted),
            other => Err(unexpected(&request, &other)),
        }
    }

    /// Create an account; `Ok(false)` if the server refuses
    pub fn register(&self, username: &str, password: &str) -> Result<bool> {
        let request = Request::Register {
            username: username.to_string(),
            password: password.to_string(),
        };
        match self.call(&request)? {
            Response::Bool(created) => Ok(created),
            other => Err(unexpected(&request, &other)),
        }
    }

    // =========================================================================
    // Key-Value Operations
    // =========================================================================

    /// Store `value` under `key`
    pub fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        self.call(&Request::Put {
            key: key.to_string(),
            value: value.to_vec(),
        })?;
        Ok(())
    }

    /// Fetch the value of `key`, `None` if absent
    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let request = Request::Get {
            key: key.to_string(),
        };
        match self.call(&request)? {
            Response::Value(value) => Ok(value),
            other => Err(unexpected(&request, &other)),
        }
    }

    /// Store several pairs in one request
    pub fn multi_put(&self, pairs: &HashMap<String, Vec<u8>>) -> Result<()> {
        self.call(&Request::MultiPut {
            pairs: pairs.clone(),
        })?;
        Ok(())
    }

    /// Fetch several keys in one request
    ///
    /// Keys the server does not know are left out of the result.
    pub fn multi_get<I, K>(&self, keys: I) -> Result<HashMap<String, Vec<u8>>>
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let request = Request::MultiGet {
            keys: keys.into_iter().map(Into::into).collect(),
        };
        match self.call(&request)? {
            Response::Values(values) => Ok(values),
            other => Err(unexpected(&request, &other)),
        }
    }

    /// Fetch `key` once `cond_key` holds `cond_value`
    ///
    /// Blocks through any number of pending answers on the request's tag
    /// until the server sends the real result. Waits without limit.
    pub fn get_when(&self, key: &str, cond_key: &str, cond_value: &[u8]) -> Result<Vec<u8>> {
        self.conditional(key, cond_key, cond_value, None)
    }

    /// `get_when` bounded by `timeout` across all pending answers
    pub fn get_when_timeout(
        &self,
        key: &str,
        cond_key: &str,
        cond_value: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>> {
        self.conditional(key, cond_key, cond_value, Some(Instant::now() + timeout))
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Say goodbye to the server (best-effort) and close the connection
    ///
    /// Idempotent. Calls blocked on other threads fail with
    /// `ConnectionClosed`.
    pub fn close(&self) -> Result<()> {
        if self.demux.is_closed() {
            return Ok(());
        }

        let tag = self.next_tag();
        let goodbye = encode_request(&Request::Disconnect)
            .and_then(|payload| self.demux.submit(tag, &payload));
        if let Err(e) = goodbye {
            tracing::debug!("Disconnect notice to {} failed: {}", self.demux.peer_addr(), e);
        }

        self.demux.close()
    }

    pub fn is_closed(&self) -> bool {
        self.demux.is_closed()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Number of tags with a live slot; zero when no call is in flight
    pub fn pending_slots(&self) -> usize {
        self.demux.pending_slots()
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn next_tag(&self) -> i32 {
        // fetch_add wraps on overflow
        self.next_tag.fetch_add(1, Ordering::Relaxed)
    }

    /// One request, one response
    fn call(&self, request: &Request) -> Result<Response> {
        let tag = self.next_tag();
        let payload = encode_request(request)?;

        tracing::trace!("Submitting {:?} as tag {}", request.request_type(), tag);
        self.demux.submit(tag, &payload)?;

        let response = match self.config.request_timeout() {
            Some(timeout) => self.demux.await_response_timeout(tag, timeout)?,
            None => self.demux.await_response(tag)?,
        };
        decode_response(request.request_type(), &response)
    }

    fn conditional(
        &self,
        key: &str,
        cond_key: &str,
        cond_value: &[u8],
        deadline: Option<Instant>,
    ) -> Result<Vec<u8>> {
        let request = Request::GetWhen {
            key: key.to_string(),
            cond_key: cond_key.to_string(),
            cond_value: cond_value.to_vec(),
        };
        let tag = self.next_tag();
        self.demux.submit(tag, &encode_request(&request)?)?;

        loop {
            let payload = self.await_until(tag, deadline)?;
            match decode_response(request.request_type(), &payload)? {
                Response::Pending => {
                    tracing::trace!("Condition for tag {} not satisfied yet", tag);
                }
                Response::Ready(value) => return Ok(value),
                other => return Err(unexpected(&request, &other)),
            }
        }
    }

    fn await_until(&self, tag: i32, deadline: Option<Instant>) -> Result<Bytes> {
        match deadline {
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                self.demux.await_response_timeout(tag, remaining)
            }
            None => self.demux.await_response(tag),
        }
    }
}

impl Drop for KvClient {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::debug!("Error closing client: {}", e);
        }
    }
}

fn unexpected(request: &Request, response: &Response) -> MuxError {
    MuxError::Protocol(format!(
        "Unexpected response {:?} to {:?}",
        response,
        request.request_type()
    ))
}
