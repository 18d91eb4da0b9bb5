//! Device directory: resolves a device name to its addresses and vendor.
//!
//! Two backends are supported, matching the original agent's pluggable
//! `DeviceConfig` sources: a flat `router.db`-style file and DNS TXT
//! records. Both implement [`Provider`]; [`Registry`] queries its
//! configured providers in priority order and memoizes hits in an
//! [`crate::cache::LruCache`] so a hot device name doesn't re-read the file
//! or re-resolve DNS on every request.

pub mod dns_txt;
pub mod routerdb;

use std::collections::HashMap;

use regex::Regex;

use crate::cache::{LruCache, Populate};
use crate::transport::ConnectMethod;

/// Everything the agent needs to know to dial a device.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceInfo {
    pub name: String,
    pub addresses: Vec<String>,
    pub vendor: String,
    pub connect_method: Option<ConnectMethod>,
    pub extra: HashMap<String, String>,
}

/// A source of device directory information.
pub trait Provider: Send + Sync {
    fn device_info(&self, name: &str) -> Option<DeviceInfo>;
    fn devices_matching(&self, pattern: &Regex) -> Vec<DeviceInfo>;
}

/// Queries a priority-ordered list of providers, memoizing lookups.
pub struct Registry {
    providers: Vec<Box<dyn Provider>>,
    cache: LruCache<String, DeviceInfo>,
}

impl Registry {
    pub fn new(providers: Vec<Box<dyn Provider>>) -> Self {
        Self {
            providers,
            cache: LruCache::new(1024),
        }
    }

    /// Resolves `name` against each provider in order, first hit wins.
    pub fn device_info(&mut self, name: &str) -> Option<DeviceInfo> {
        let key = name.to_string();
        let providers = &self.providers;
        self.cache
            .get_or_populate(&key, || {
                for provider in providers {
                    if let Some(info) = provider.device_info(name) {
                        return Populate::Value(info);
                    }
                }
                Populate::Skip
            })
            .cloned()
    }

    /// Devices across every provider whose name matches `pattern`,
    /// deduplicated by name (first provider to report a name wins, same
    /// priority rule as `device_info`).
    pub fn devices_matching(&self, pattern: &Regex) -> Vec<DeviceInfo> {
        let mut seen = HashMap::new();
        for provider in &self.providers {
            for info in provider.devices_matching(pattern) {
                seen.entry(info.name.clone()).or_insert(info);
            }
        }
        seen.into_values().collect()
    }
}
