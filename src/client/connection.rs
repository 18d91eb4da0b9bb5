//! A client-side connection: issues JSON-RPC calls against a set of
//! backends through a [`BackendPolicy`], respecting a per-request
//! timeout/cancellation.
//!
//! `exec_request`/`exec_requests` are the low-level entry points;
//! everything else (`command`, `devices_matching`, ...) is xmlrpclib-style
//! sugar, mirroring the original `client/client.py` proxy's method-per-RPC
//! convenience wrappers.

use std::sync::Mutex;
use std::time::Duration;

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::error::ApiError;
use crate::rpc::RPC_PATH;

use super::pool::Pool;
use super::{Backend, BackendPolicy, BackendState, Request};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

pub struct Connection {
    backends: Mutex<Vec<Backend>>,
    policy: Mutex<Box<dyn BackendPolicy>>,
    pool: Pool,
    http: reqwest::Client,
    cancel: CancellationToken,
}

impl Connection {
    pub fn new(backends: Vec<Backend>, policy: Box<dyn BackendPolicy>) -> Self {
        Connection {
            backends: Mutex::new(backends),
            policy: Mutex::new(policy),
            pool: Pool::from_env(),
            http: reqwest::Client::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Cancels every request currently awaiting a response; each sees
    /// `ApiError::Internal` as soon as its next cancellation checkpoint
    /// runs.
    pub fn kill_all(&self) {
        self.cancel.cancel();
    }

    /// Sends one request to a backend chosen by the policy, honoring
    /// `request.timeout` (falling back to [`DEFAULT_TIMEOUT`]).
    pub async fn exec_request(&self, mut request: Request) -> Request {
        let timeout = request.timeout.unwrap_or(DEFAULT_TIMEOUT);
        request.start();

        let backend_url = {
            let backends = self.backends.lock().expect("backends lock poisoned");
            let mut policy = self.policy.lock().expect("policy lock poisoned");
            policy.select(&backends).map(Backend::base_url)
        };
        let Some(url) = backend_url else {
            request.complete(Err(ApiError::Internal("no backends configured".into()).to_string()));
            return request;
        };

        let _permit = self.pool.acquire().await;
        let outcome = self.send(&url, &request, timeout).await;
        self.record_outcome(&url, &outcome);
        request.complete(outcome.map_err(|e| e.to_string()));
        request
    }

    /// Fires every request concurrently and returns them in the same
    /// order, each carrying its own completed result/error.
    pub async fn exec_requests(&self, requests: Vec<Request>) -> Vec<Request> {
        let futures = requests.into_iter().map(|r| self.exec_request(r));
        futures::future::join_all(futures).await
    }

    async fn send(&self, url: &str, request: &Request, timeout: Duration) -> Result<Value, ApiError> {
        let body = json!({
            "jsonrpc": "2.0",
            "method": request.method,
            "params": request.arguments,
            "id": 1,
        });

        let send = self.http.post(url).json(&body).send();
        let response = tokio::select! {
            result = tokio::time::timeout(timeout, send) => result
                .map_err(|_| ApiError::Internal(format!("timed out after {timeout:?}")))
                .and_then(|r| r.map_err(|e| ApiError::Internal(format!("http error: {e}")))),
            () = self.cancel.cancelled() => Err(ApiError::Internal("cancelled".into())),
        }?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| ApiError::Internal(format!("bad response body: {e}")))?;

        if let Some(error) = body.get("error") {
            let code = error.get("code").and_then(Value::as_i64).unwrap_or(0);
            let message = error.get("message").and_then(Value::as_str).unwrap_or_default();
            return Err(ApiError::from_code(code, message));
        }
        Ok(body.get("result").cloned().unwrap_or(Value::Null))
    }

    fn record_outcome(&self, url: &str, outcome: &Result<Value, ApiError>) {
        let mut backends = self.backends.lock().expect("backends lock poisoned");
        let Some(backend) = backends.iter_mut().find(|b| b.base_url() == url) else {
            return;
        };
        backend.total += 1;
        backend.state = if outcome.is_ok() {
            BackendState::Connected
        } else {
            backend.errors += 1;
            BackendState::Error
        };
    }

    // -- xmlrpclib-style sugar --------------------------------------------

    pub async fn command(&self, device_name: &str, command: &str, mode: Option<&str>) -> Result<Value, ApiError> {
        self.call(
            "command",
            json!({"device_name": device_name, "command": command, "mode": mode}),
        )
        .await
    }

    pub async fn devices_matching(&self, pattern: &str) -> Result<Value, ApiError> {
        self.call("devices_matching", json!({"pattern": pattern})).await
    }

    pub async fn devices_info(&self, device_name: &str) -> Result<Value, ApiError> {
        self.call("devices_info", json!({"device_name": device_name})).await
    }

    pub async fn download_file(&self, device_name: &str, path: &str) -> Result<Value, ApiError> {
        self.call("download_file", json!({"device_name": device_name, "path": path}))
            .await
    }

    async fn call(&self, method: &str, arguments: Value) -> Result<Value, ApiError> {
        let request = self.exec_request(Request::new(method, arguments)).await;
        match (request.result, request.error) {
            (Some(value), _) => Ok(value),
            (None, Some(message)) => Err(ApiError::Internal(message)),
            (None, None) => Err(ApiError::Internal("request never completed".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::RoundRobin;

    #[tokio::test]
    async fn no_backends_fails_fast() {
        let conn = Connection::new(vec![], Box::new(RoundRobin::new(0)));
        let request = conn.exec_request(Request::new("command", json!({}))).await;
        assert!(request.completed);
        assert!(request.error.is_some());
    }
}
