//! `router.db`-style flat-file device registry.
//!
//! Each non-comment, non-blank line is `name:type:status[:extra]`. `status`
//! gates whether the device is considered reachable at all: anything other
//! than `up` is skipped unless the registry was built with
//! `ignore_down_devices`. `extra`, when present, is a comma-separated list
//! of `key=value` pairs folded into [`super::DeviceInfo::extra`].

use std::collections::HashMap;
use std::path::Path;

use crate::error::InfraError;

use super::DeviceInfo;

pub struct RouterDbProvider {
    devices: HashMap<String, DeviceInfo>,
}

impl RouterDbProvider {
    pub fn load_file(path: impl AsRef<Path>, ignore_down_devices: bool) -> Result<Self, InfraError> {
        let text = std::fs::read_to_string(path.as_ref())
            .map_err(|e| InfraError::Config(format!("reading {:?}: {e}", path.as_ref())))?;
        Ok(Self::parse(&text, ignore_down_devices))
    }

    pub fn parse(text: &str, ignore_down_devices: bool) -> Self {
        let mut devices = HashMap::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut fields = line.splitn(4, ':');
            let (Some(name), Some(vendor), Some(status)) =
                (fields.next(), fields.next(), fields.next())
            else {
                continue;
            };
            if status != "up" && !ignore_down_devices {
                continue;
            }
            let mut extra = HashMap::new();
            let mut connect_method = None;
            if let Some(rest) = fields.next() {
                for pair in rest.split(',') {
                    if let Some((k, v)) = pair.split_once('=') {
                        if k == "connect_method" {
                            connect_method =
                                serde_json::from_value(serde_json::Value::String(v.to_string())).ok();
                        }
                        extra.insert(k.to_string(), v.to_string());
                    }
                }
            }
            devices.insert(
                name.to_string(),
                DeviceInfo {
                    name: name.to_string(),
                    addresses: vec![name.to_string()],
                    vendor: vendor.to_string(),
                    connect_method,
                    extra,
                },
            );
        }
        Self { devices }
    }
}

impl super::Provider for RouterDbProvider {
    fn device_info(&self, name: &str) -> Option<DeviceInfo> {
        self.devices.get(name).cloned()
    }

    fn devices_matching(&self, pattern: &regex::Regex) -> Vec<DeviceInfo> {
        self.devices
            .values()
            .filter(|d| pattern.is_match(&d.name))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Provider;

    fn sample() -> &'static str {
        "# comment\nrouter1:cisco:up\nrouter2:cisco:down\nrouter3:huawei:up:connect_method=telnet\n"
    }

    #[test]
    fn skips_down_devices_by_default() {
        let provider = RouterDbProvider::parse(sample(), false);
        assert!(provider.device_info("router1").is_some());
        assert!(provider.device_info("router2").is_none());
    }

    #[test]
    fn ignore_down_devices_keeps_them() {
        let provider = RouterDbProvider::parse(sample(), true);
        assert!(provider.device_info("router2").is_some());
    }

    #[test]
    fn parses_extra_fields() {
        let provider = RouterDbProvider::parse(sample(), false);
        let info = provider.device_info("router3").unwrap();
        assert_eq!(info.extra.get("connect_method").map(String::as_str), Some("telnet"));
    }

    #[test]
    fn connect_method_is_also_parsed_into_its_typed_field() {
        let provider = RouterDbProvider::parse(sample(), false);
        let info = provider.device_info("router3").unwrap();
        assert_eq!(info.connect_method, Some(crate::transport::ConnectMethod::Telnet));
    }
}
