//! JSON-RPC 2.0 surface over HTTP: one route, one envelope, a stable
//! integer error-code table.
//!
//! Kept thin per the ambient Non-goals around HTTP framing: `axum` supplies
//! routing and the HTTP plumbing; this module only shapes the JSON-RPC
//! envelope and maps [`ApiError`] onto the wire code table. Both dispatch
//! modes the original agent offered are preserved as [`DispatchMode`]:
//! asynchronous (spawn onto a bounded worker pool, keep the listener
//! responsive) and synchronous (call the controller inline, for hosting
//! behind something that already manages its own worker processes).

use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::controller::Controller;
use crate::error::ApiError;

pub const RPC_PATH: &str = "/JSONRPC2";

/// How an incoming request is handed to the [`Controller`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// Spawn the request onto a bounded `tokio::task` pool via a semaphore
    /// permit; the listener task returns immediately and the HTTP response
    /// is written when the spawned task completes.
    Asynchronous { max_in_flight: usize },
    /// Run the controller call inline on the request-handling task. Useful
    /// behind a host that already manages concurrency (e.g. a WSGI-style
    /// process pool in the original agent's deployment).
    Synchronous,
}

impl Default for DispatchMode {
    fn default() -> Self {
        DispatchMode::Asynchronous { max_in_flight: 64 }
    }
}

#[derive(Clone)]
pub struct RpcState {
    pub controller: Arc<Controller>,
    pub dispatch: DispatchMode,
    permits: Arc<tokio::sync::Semaphore>,
}

impl RpcState {
    pub fn new(controller: Arc<Controller>, dispatch: DispatchMode) -> Self {
        let max_in_flight = match dispatch {
            DispatchMode::Asynchronous { max_in_flight } => max_in_flight,
            DispatchMode::Synchronous => 1,
        };
        Self {
            controller,
            dispatch,
            permits: Arc::new(tokio::sync::Semaphore::new(max_in_flight)),
        }
    }
}

pub fn router(state: RpcState) -> Router {
    Router::new().route(RPC_PATH, post(handle)).with_state(state)
}

#[derive(Debug, Deserialize)]
struct RpcRequest {
    #[allow(dead_code)]
    jsonrpc: Option<String>,
    method: String,
    #[serde(default)]
    params: Value,
    id: Value,
}

#[derive(Debug, Serialize)]
struct RpcResponse {
    jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<RpcErrorBody>,
    id: Value,
}

#[derive(Debug, Serialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

async fn handle(State(state): State<RpcState>, Json(request): Json<RpcRequest>) -> Json<RpcResponse> {
    let id = request.id.clone();
    let result = match state.dispatch {
        DispatchMode::Synchronous => dispatch_request(&state.controller, request).await,
        DispatchMode::Asynchronous { .. } => {
            let permit = state
                .permits
                .clone()
                .acquire_owned()
                .await
                .expect("permit semaphore is never closed");
            let controller = state.controller.clone();
            let task = tokio::spawn(async move {
                let _permit = permit;
                dispatch_request(&controller, request).await
            });
            match task.await {
                Ok(result) => result,
                Err(_) => Err(ApiError::Internal("worker task panicked".into())),
            }
        }
    };
    Json(to_response(id, result))
}

/// Every method takes `{device_name, ...method-specific args}`; `params`
/// minus `device_name` is forwarded to `Controller::request` verbatim.
async fn dispatch_request(controller: &Controller, request: RpcRequest) -> Result<Value, ApiError> {
    match request.method.as_str() {
        "devices_matching" => {
            let pattern = request
                .params
                .get("pattern")
                .and_then(Value::as_str)
                .ok_or_else(|| ApiError::InvalidRequest("devices_matching: missing 'pattern'".into()))?;
            let regex = regex::Regex::new(pattern)
                .map_err(|e| ApiError::InvalidRequest(format!("devices_matching: bad pattern: {e}")))?;
            let names = controller.devices_matching(&regex).await;
            Ok(Value::Array(names.into_iter().map(Value::String).collect()))
        }
        "devices_info" => {
            let device_name = request
                .params
                .get("device_name")
                .and_then(Value::as_str)
                .ok_or_else(|| ApiError::InvalidRequest("devices_info: missing 'device_name'".into()))?;
            controller.device_info(device_name).await
        }
        method => {
            let device_name = request
                .params
                .get("device_name")
                .and_then(Value::as_str)
                .ok_or_else(|| ApiError::NoSuchDevice(String::new()))?;
            let mut args = request.params.clone();
            if let Value::Object(map) = &mut args {
                map.remove("device_name");
            }
            controller.request(device_name, method, args).await
        }
    }
}

fn to_response(id: Value, result: Result<Value, ApiError>) -> RpcResponse {
    match result {
        Ok(value) => RpcResponse {
            jsonrpc: "2.0",
            result: Some(value),
            error: None,
            id,
        },
        Err(err) => RpcResponse {
            jsonrpc: "2.0",
            result: None,
            error: Some(RpcErrorBody {
                code: err.code(),
                message: err.to_string(),
            }),
            id,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_dispatch_mode_is_asynchronous() {
        assert!(matches!(DispatchMode::default(), DispatchMode::Asynchronous { .. }));
    }

    #[test]
    fn error_response_carries_the_stable_code() {
        let response = to_response(Value::from(1), Err(ApiError::NoSuchDevice("sw1".into())));
        assert_eq!(response.error.unwrap().code, 15);
    }

    #[test]
    fn ok_response_carries_the_result() {
        let response = to_response(Value::from(1), Ok(Value::String("abc".into())));
        assert_eq!(response.result, Some(Value::String("abc".into())));
    }
}
