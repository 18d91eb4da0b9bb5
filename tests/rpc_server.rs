//! End-to-end JSON-RPC surface test: a real `axum::serve` listener wired to
//! a `Controller`, driven by a real `reqwest` client over loopback TCP.
//! Exercises the wire envelope and the stable error-code table without any
//! device I/O, by only calling methods that fail before a connect is ever
//! attempted (`devices_matching`, and `command` against an unknown device).

use std::collections::HashMap;

use notch::controller::Controller;
use notch::credentials::Credentials;
use notch::registry::{DeviceInfo, Provider, Registry};
use notch::rpc::{self, DispatchMode, RpcState};
use serde_json::{json, Value};

struct StaticProvider(HashMap<String, DeviceInfo>);

impl Provider for StaticProvider {
    fn device_info(&self, name: &str) -> Option<DeviceInfo> {
        self.0.get(name).cloned()
    }

    fn devices_matching(&self, pattern: &regex::Regex) -> Vec<DeviceInfo> {
        self.0.values().filter(|d| pattern.is_match(&d.name)).cloned().collect()
    }
}

async fn spawn_agent(dispatch: DispatchMode) -> String {
    let mut devices = HashMap::new();
    devices.insert(
        "sw1".to_string(),
        DeviceInfo {
            name: "sw1".into(),
            addresses: vec!["10.0.0.1".into()],
            vendor: "cisco".into(),
            connect_method: None,
            extra: HashMap::new(),
        },
    );
    let registry = Registry::new(vec![Box::new(StaticProvider(devices))]);
    let controller = Controller::new(registry, Credentials::new(vec![]));
    let state = RpcState::new(controller, dispatch);
    let app = rpc::router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}{}", rpc::RPC_PATH)
}

async fn call(url: &str, method: &str, params: Value) -> Value {
    reqwest::Client::new()
        .post(url)
        .json(&json!({"jsonrpc": "2.0", "method": method, "params": params, "id": 1}))
        .send()
        .await
        .unwrap()
        .json::<Value>()
        .await
        .unwrap()
}

#[tokio::test]
async fn unknown_device_reports_the_stable_error_code() {
    let url = spawn_agent(DispatchMode::Synchronous).await;
    let response = call(&url, "command", json!({"device_name": "ghost", "command": "show version"})).await;
    assert_eq!(response["error"]["code"], 15);
}

#[tokio::test]
async fn devices_matching_returns_registered_names() {
    let url = spawn_agent(DispatchMode::Synchronous).await;
    let response = call(&url, "devices_matching", json!({"pattern": "sw.*"})).await;
    assert_eq!(response["result"], json!(["sw1"]));
}

#[tokio::test]
async fn asynchronous_dispatch_mode_answers_the_same_way() {
    let url = spawn_agent(DispatchMode::Asynchronous { max_in_flight: 4 }).await;
    let response = call(&url, "devices_matching", json!({"pattern": "sw1"})).await;
    assert_eq!(response["result"], json!(["sw1"]));
}

#[tokio::test]
async fn devices_info_without_device_name_is_invalid_request() {
    let url = spawn_agent(DispatchMode::Synchronous).await;
    let response = call(&url, "devices_info", json!({})).await;
    assert_eq!(response["error"]["code"], 5);
}

#[tokio::test]
async fn devices_info_returns_the_registered_entry() {
    let url = spawn_agent(DispatchMode::Synchronous).await;
    let response = call(&url, "devices_info", json!({"device_name": "sw1"})).await;
    assert_eq!(response["result"]["vendor"], "cisco");
}
