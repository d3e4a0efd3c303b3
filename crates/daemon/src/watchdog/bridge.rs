// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The bridge: out-of-band channel between controller and sessions.
//!
//! Each launch generates an access identifier; the session passes it back
//! on every inbound bridge request, and the registrar routes the request
//! to the owning session. Outbound, the controller talks to the game
//! server over the topic port. The topic wire format is structural only:
//! newline-delimited JSON to loopback, payloads opaque.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use gk_core::Error;

/// Inbound request from a running session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeRequest {
    /// Handshake: the server is up and serving.
    Startup,
    /// The server reached its natural reboot point.
    Reboot,
    /// A chat command invoked in game.
    Chat { message: String },
}

/// Routes inbound bridge requests to sessions by access identifier.
#[derive(Clone, Default)]
pub struct BridgeRegistrar {
    routes: Arc<Mutex<HashMap<String, mpsc::UnboundedSender<BridgeRequest>>>>,
}

impl BridgeRegistrar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an identifier before its process launches; requests for
    /// it flow out of the returned receiver.
    pub fn register(&self, access_identifier: &str) -> mpsc::UnboundedReceiver<BridgeRequest> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.routes.lock().insert(access_identifier.to_string(), tx);
        rx
    }

    pub fn deregister(&self, access_identifier: &str) {
        self.routes.lock().remove(access_identifier);
    }

    /// Route one inbound request. Unknown identifiers are rejected — the
    /// caller answers it as an auth failure.
    pub fn dispatch(&self, access_identifier: &str, request: BridgeRequest) -> Result<(), Error> {
        let routes = self.routes.lock();
        let Some(tx) = routes.get(access_identifier) else {
            return Err(Error::new(
                gk_core::ErrorKind::Auth,
                "unknown bridge access identifier",
            ));
        };
        tx.send(request)
            .map_err(|_| Error::gone("session bridge channel closed"))
    }

    #[cfg(test)]
    pub fn registered(&self, access_identifier: &str) -> bool {
        self.routes.lock().contains_key(access_identifier)
    }

    #[cfg(test)]
    pub fn identifiers(&self) -> Vec<String> {
        self.routes.lock().keys().cloned().collect()
    }
}

/// Outbound topic channel to a running game server.
#[async_trait]
pub trait TopicClient: Send + Sync {
    /// Send one payload and wait for one response line. The timeout is
    /// applied symmetrically to send and receive.
    async fn send(&self, port: u16, payload: &str, timeout: Duration) -> Result<String, Error>;
}

/// Default client: one newline-delimited exchange over loopback TCP.
#[derive(Debug, Default)]
pub struct TcpTopicClient;

#[async_trait]
impl TopicClient for TcpTopicClient {
    async fn send(&self, port: u16, payload: &str, timeout: Duration) -> Result<String, Error> {
        let connect = TcpStream::connect(("127.0.0.1", port));
        let mut stream = tokio::time::timeout(timeout, connect)
            .await
            .map_err(|_| transient("topic connect timed out"))?
            .map_err(|e| transient(format!("topic connect failed: {}", e)))?;

        let mut line = payload.to_string();
        line.push('\n');
        tokio::time::timeout(timeout, stream.write_all(line.as_bytes()))
            .await
            .map_err(|_| transient("topic send timed out"))?
            .map_err(|e| transient(format!("topic send failed: {}", e)))?;

        let mut reader = BufReader::new(stream);
        let mut response = String::new();
        tokio::time::timeout(timeout, reader.read_line(&mut response))
            .await
            .map_err(|_| transient("topic receive timed out"))?
            .map_err(|e| transient(format!("topic receive failed: {}", e)))?;
        Ok(response.trim_end().to_string())
    }
}

fn transient(message: impl Into<String>) -> Error {
    Error::new(gk_core::ErrorKind::Transient, message)
}

#[cfg(test)]
#[path = "bridge_tests.rs"]
mod tests;
