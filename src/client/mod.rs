//! Client-side connection + load-balancing transport.
//!
//! Grounded on `multirpc.py`'s `LoadBalancingTransport`/`BackEnd`: a set of
//! agent backends, a pluggable next-backend policy, and a thin
//! request/response value type pair. The Python original wrapped
//! `xmlrpclib.Transport`; here `connection.rs` drives `reqwest` JSON-RPC
//! calls directly instead of an XML-RPC transport shim, since the wire
//! protocol this crate speaks is JSON-RPC, not XML-RPC.

pub mod connection;
pub mod lb;
pub mod pool;

use serde_json::Value;
use tokio::time::Instant;

pub use connection::Connection;
pub use lb::{BackendPolicy, LowestLatency, Random, RoundRobin};
pub use pool::Pool;

/// One backend's last-known reachability state, matching the original
/// `BackEnd.state` constants (`IDLE`/`ACTIVE`/`CONNECTED`/`ERROR`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendState {
    Idle,
    Active,
    Connected,
    Error,
}

/// A single agent endpoint this client can send requests to.
#[derive(Debug, Clone)]
pub struct Backend {
    pub address: String,
    pub handler_uri: String,
    pub state: BackendState,
    pub in_flight: u64,
    pub last_rtt: Option<std::time::Duration>,
    pub total: u64,
    pub errors: u64,
}

impl Backend {
    pub fn new(address: impl Into<String>, handler_uri: impl Into<String>) -> Self {
        Backend {
            address: address.into(),
            handler_uri: handler_uri.into(),
            state: BackendState::Idle,
            in_flight: 0,
            last_rtt: None,
            total: 0,
            errors: 0,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}{}", self.address, self.handler_uri)
    }
}

/// A single outstanding client-side request, tracked through its lifecycle.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: String,
    pub arguments: Value,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub timeout: Option<std::time::Duration>,
    pub completed: bool,
    pub sent_at: Option<Instant>,
    pub completed_at: Option<Instant>,
}

impl Request {
    pub fn new(method: impl Into<String>, arguments: Value) -> Self {
        Request {
            method: method.into(),
            arguments,
            result: None,
            error: None,
            timeout: None,
            completed: false,
            sent_at: None,
            completed_at: None,
        }
    }

    pub fn with_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub(crate) fn start(&mut self) {
        self.sent_at = Some(Instant::now());
    }

    pub(crate) fn complete(&mut self, outcome: Result<Value, String>) {
        match outcome {
            Ok(value) => self.result = Some(value),
            Err(message) => self.error = Some(message),
        }
        self.completed = true;
        self.completed_at = Some(Instant::now());
    }
}
