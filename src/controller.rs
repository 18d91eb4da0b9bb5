//! Routes RPC-shaped requests to a session, creating/evicting sessions from
//! a bounded LRU and sweeping idle ones on a timer.
//!
//! Grounded on the teacher's connection-manager pattern (`session/manager.rs`
//! owning a pooled cache keyed by connection identity) generalized to the
//! spec's `SessionKey`/`Session` shape: the populate callback resolves a
//! [`DeviceInfo`] from the [`Registry`], builds the vendor [`Device`], and
//! wraps it in a `Session`; the expire callback disconnects it.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::cache::LruCache;
use crate::credentials::Credentials;
use crate::device::Device;
use crate::error::ApiError;
use crate::registry::Registry;
use crate::session::{Session, SessionKey};

const DEFAULT_MAX_ACTIVE_SESSIONS: usize = 256;
const DEFAULT_MAX_IDLE_TIME: Duration = Duration::from_secs(900);

/// Owns the session cache and the credential store; the single point every
/// RPC method call passes through.
pub struct Controller {
    sessions: Mutex<LruCache<SessionKey, Arc<Session>>>,
    registry: Mutex<Registry>,
    credentials: Credentials,
    max_idle_time: Duration,
}

impl Controller {
    pub fn new(registry: Registry, credentials: Credentials) -> Arc<Controller> {
        Self::with_capacity(registry, credentials, DEFAULT_MAX_ACTIVE_SESSIONS, DEFAULT_MAX_IDLE_TIME)
    }

    pub fn with_capacity(
        registry: Registry,
        credentials: Credentials,
        max_active_sessions: usize,
        max_idle_time: Duration,
    ) -> Arc<Controller> {
        Arc::new(Controller {
            sessions: Mutex::new(LruCache::new(max_active_sessions)),
            registry: Mutex::new(registry),
            credentials,
            max_idle_time,
        })
    }

    /// Resolves `device_name` via the registry and credential store,
    /// fetching the cached session or creating one, then forwards `method`.
    pub async fn request(&self, device_name: &str, method: &str, args: Value) -> Result<Value, ApiError> {
        if device_name.is_empty() {
            return Err(ApiError::NoSuchDevice(device_name.to_string()));
        }
        let key = SessionKey::new(device_name);
        let session = self.session_for(&key).await?;

        let credential = self
            .credentials
            .get_credential(Some(device_name))
            .cloned()
            .ok_or_else(|| ApiError::NoMatchingCredential(device_name.to_string()))?;
        session.set_credential(credential).await;

        session.request(method, args).await
    }

    async fn session_for(&self, key: &SessionKey) -> Result<Arc<Session>, ApiError> {
        let mut sessions = self.sessions.lock().await;
        if let Some(existing) = sessions.get(key) {
            return Ok(existing.clone());
        }

        let device_name = key.device_name.clone();
        let info = {
            let mut registry = self.registry.lock().await;
            registry.device_info(&device_name)
        };
        let Some(info) = info else {
            return Err(ApiError::NoSuchDevice(device_name));
        };

        let device =
            Device::with_connect_method(info.name.clone(), info.addresses.clone(), &info.vendor, 22, info.connect_method)?;
        let session = Arc::new(Session::new(key.clone(), device, None));

        if let Some((_, evicted)) = sessions.insert(key.clone(), session.clone()) {
            drop(sessions);
            evicted.disconnect().await;
        }

        Ok(session)
    }

    /// Looks up device names (across every registered provider) whose name
    /// matches `pattern`.
    pub async fn devices_matching(&self, pattern: &regex::Regex) -> Vec<String> {
        let registry = self.registry.lock().await;
        registry.devices_matching(pattern).into_iter().map(|d| d.name).collect()
    }

    /// Resolves a single device's registry entry without creating a session.
    pub async fn device_info(&self, device_name: &str) -> Result<Value, ApiError> {
        let mut registry = self.registry.lock().await;
        let info = registry
            .device_info(device_name)
            .ok_or_else(|| ApiError::NoSuchDevice(device_name.to_string()))?;
        Ok(serde_json::json!({
            "name": info.name,
            "addresses": info.addresses,
            "vendor": info.vendor,
            "connect_method": info.connect_method,
            "extra": info.extra,
        }))
    }

    /// Disconnects any session idle for longer than `max_idle_time`. Called
    /// periodically by [`Controller::spawn_idle_sweeper`]; exposed directly
    /// so tests can drive a single sweep without waiting on the timer.
    pub async fn sweep_idle(&self) {
        let idle_sessions: Vec<Arc<Session>> = {
            let sessions = self.sessions.lock().await;
            sessions.iter().map(|(_, s)| s.clone()).collect()
        };
        let now = Instant::now();
        for session in idle_sessions {
            if !session.is_connected().await || !session.is_idle().await {
                continue;
            }
            if let Some(last_request) = session.last_request().await {
                if now.duration_since(last_request) > self.max_idle_time {
                    session.disconnect().await;
                }
            }
        }
    }

    /// Disconnects every cached session. Called on shutdown.
    pub async fn disconnect_all(&self) {
        let sessions: Vec<Arc<Session>> = {
            let sessions = self.sessions.lock().await;
            sessions.iter().map(|(_, s)| s.clone()).collect()
        };
        for session in sessions {
            session.disconnect().await;
        }
    }

    /// Spawns the idle sweeper loop on the current Tokio runtime, running
    /// every `period` (defaults to `session_maint_period`, 10s) until the
    /// controller is dropped.
    pub fn spawn_idle_sweeper(self: &Arc<Self>, period: Duration) -> tokio::task::JoinHandle<()> {
        let controller = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let Some(controller) = controller.upgrade() else {
                    return;
                };
                controller.sweep_idle().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{DeviceInfo, Provider};
    use std::collections::HashMap as StdHashMap;

    struct StaticProvider(StdHashMap<String, DeviceInfo>);

    impl Provider for StaticProvider {
        fn device_info(&self, name: &str) -> Option<DeviceInfo> {
            self.0.get(name).cloned()
        }
        fn devices_matching(&self, pattern: &regex::Regex) -> Vec<DeviceInfo> {
            self.0.values().filter(|d| pattern.is_match(&d.name)).cloned().collect()
        }
    }

    fn controller() -> Arc<Controller> {
        let mut devices = StdHashMap::new();
        devices.insert(
            "sw1".to_string(),
            DeviceInfo {
                name: "sw1".into(),
                addresses: vec!["10.0.0.1".into()],
                vendor: "cisco".into(),
                connect_method: None,
                extra: StdHashMap::new(),
            },
        );
        let registry = Registry::new(vec![Box::new(StaticProvider(devices))]);
        let credentials = Credentials::new(vec![]);
        Controller::new(registry, credentials)
    }

    #[tokio::test]
    async fn unknown_device_is_not_found() {
        let controller = controller();
        let err = controller.request("ghost", "command", Value::Null).await.unwrap_err();
        assert!(matches!(err, ApiError::NoSuchDevice(_)));
    }

    #[tokio::test]
    async fn known_device_without_credential_fails_to_match() {
        let controller = controller();
        let err = controller
            .request("sw1", "command", serde_json::json!({"command": "show version"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NoMatchingCredential(_)));
    }

    #[tokio::test]
    async fn empty_device_name_is_rejected() {
        let controller = controller();
        let err = controller.request("", "command", Value::Null).await.unwrap_err();
        assert!(matches!(err, ApiError::NoSuchDevice(_)));
    }
}
