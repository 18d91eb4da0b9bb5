//! DNS TXT record device registry.
//!
//! A device's canonical address doubles as the lookup key: its TXT record
//! (if any) is expected to begin with `v=notch1` followed by whitespace-
//! separated `key:value` pairs. Only a small whitelist of keys are honored
//! (`device_type`, `connect_method`); anything else is preserved verbatim
//! in [`super::DeviceInfo::extra`] for drivers that care about it, but
//! never affects the vendor/connect-method decision.

use hickory_resolver::TokioAsyncResolver;
use regex::Regex;

use super::{DeviceInfo, Provider};

const RECORD_PREFIX: &str = "v=notch1";

pub struct DnsTxtProvider {
    resolver: TokioAsyncResolver,
}

impl DnsTxtProvider {
    pub fn new() -> Result<Self, crate::error::InfraError> {
        let resolver = TokioAsyncResolver::tokio_from_system_conf()
            .map_err(|e| crate::error::InfraError::Config(format!("resolver init: {e}")))?;
        Ok(Self { resolver })
    }

    pub async fn lookup(&self, name: &str) -> Option<DeviceInfo> {
        let response = self.resolver.txt_lookup(name).await.ok()?;
        for record in response.iter() {
            let text = record
                .txt_data()
                .iter()
                .map(|b| String::from_utf8_lossy(b).into_owned())
                .collect::<String>();
            if let Some(info) = parse_record(name, &text) {
                return Some(info);
            }
        }
        None
    }
}

/// Adapts [`DnsTxtProvider`]'s on-demand async `lookup` to the synchronous
/// [`Provider`] trait the [`super::Registry`] queries, by blocking the
/// calling worker thread on the lookup. DNS TXT has no enumeration
/// primitive, so `devices_matching` always answers empty; a name has to be
/// asked for directly before its TXT record is ever consulted.
pub struct BlockingDnsTxtProvider {
    inner: DnsTxtProvider,
}

impl BlockingDnsTxtProvider {
    pub fn new(inner: DnsTxtProvider) -> Self {
        Self { inner }
    }
}

impl Provider for BlockingDnsTxtProvider {
    fn device_info(&self, name: &str) -> Option<DeviceInfo> {
        tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(self.inner.lookup(name)))
    }

    fn devices_matching(&self, _pattern: &Regex) -> Vec<DeviceInfo> {
        Vec::new()
    }
}

fn parse_record(name: &str, text: &str) -> Option<DeviceInfo> {
    let rest = text.strip_prefix(RECORD_PREFIX)?;

    let mut vendor = None;
    let mut connect_method = None;
    let mut extra = std::collections::HashMap::new();

    for pair in rest.split_whitespace() {
        let Some((k, v)) = pair.split_once(':') else {
            continue;
        };
        match k {
            "device_type" => vendor = Some(v.to_string()),
            "connect_method" => {
                connect_method = serde_json::from_value(serde_json::Value::String(v.to_string())).ok()
            }
            _ => {
                extra.insert(k.to_string(), v.to_string());
            }
        }
    }

    Some(DeviceInfo {
        name: name.to_string(),
        addresses: vec![name.to_string()],
        vendor: vendor?,
        connect_method,
        extra,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_well_formed_record() {
        let info = parse_record("fw1.example.net", "v=notch1 device_type:cisco connect_method:telnet").unwrap();
        assert_eq!(info.vendor, "cisco");
        assert_eq!(info.connect_method, Some(crate::transport::ConnectMethod::Telnet));
    }

    #[test]
    fn rejects_records_without_the_prefix() {
        assert!(parse_record("fw1.example.net", "device_type:cisco").is_none());
    }

    #[test]
    fn unknown_keys_land_in_extra() {
        let info = parse_record("fw1.example.net", "v=notch1 device_type:cisco site:lab1").unwrap();
        assert_eq!(info.extra.get("site").map(String::as_str), Some("lab1"));
    }
}
