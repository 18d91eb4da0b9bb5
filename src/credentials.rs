//! Credentials store: an ordered, regex-matched list of login records.
//!
//! Grounded on the original agent's `credential.py`: the first credential
//! whose anchored, case-insensitive regex matches the hostname wins. A
//! YAML document is a list of records; `username` is mandatory, everything
//! else is optional.

use std::path::Path;

use regex::RegexBuilder;
use serde::{Deserialize, Serialize};

use crate::error::InfraError;
use crate::transport::ConnectMethod;

/// An SSH private key, inline or by path. Only one of the two is ever set;
/// `data` wins if both are present.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SshPrivateKey {
    pub data: Option<String>,
    pub path: Option<String>,
}

/// Raw YAML shape for one credential entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawCredential {
    regexp: Option<String>,
    username: Option<String>,
    password: Option<String>,
    enable_password: Option<String>,
    ssh_private_key: Option<SshPrivateKey>,
    #[serde(default)]
    auto_enable: bool,
    connect_method: Option<ConnectMethod>,
}

/// Wraps a compiled regex so `Credential` can derive structural equality;
/// `regex::Regex` itself has no `PartialEq` impl, so equality here compares
/// the source pattern.
#[derive(Debug, Clone)]
pub struct AnchoredRegex(pub regex::Regex);

impl PartialEq for AnchoredRegex {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_str() == other.0.as_str()
    }
}

impl std::ops::Deref for AnchoredRegex {
    type Target = regex::Regex;
    fn deref(&self) -> &regex::Regex {
        &self.0
    }
}

/// An immutable login record, matched against a hostname via `regexp`.
#[derive(Debug, Clone, PartialEq)]
pub struct Credential {
    /// Anchored, case-insensitive compiled form of the configured regexp.
    pub regexp: AnchoredRegex,
    pub username: String,
    pub password: Option<String>,
    pub enable_password: Option<String>,
    pub ssh_private_key: Option<SshPrivateKey>,
    pub auto_enable: bool,
    pub connect_method: Option<ConnectMethod>,
}

fn anchor(pattern: &str) -> String {
    let mut p = pattern.to_string();
    if !p.starts_with('^') {
        p = format!("^{p}");
    }
    if !p.ends_with('$') {
        p = format!("{p}$");
    }
    p
}

impl Credential {
    fn from_raw(raw: RawCredential) -> Result<Credential, InfraError> {
        let username = raw
            .username
            .ok_or_else(|| InfraError::Credential("missing required field: username".into()))?;
        let pattern = anchor(raw.regexp.as_deref().unwrap_or(".*"));
        let regexp = RegexBuilder::new(&pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| InfraError::Credential(format!("invalid regexp {pattern:?}: {e}")))?;
        Ok(Credential {
            regexp: AnchoredRegex(regexp),
            username,
            password: raw.password,
            enable_password: raw.enable_password,
            ssh_private_key: raw.ssh_private_key,
            auto_enable: raw.auto_enable,
            connect_method: raw.connect_method,
        })
    }
}

/// An ordered list of credentials, loaded from a YAML file.
pub struct Credentials {
    entries: Vec<Credential>,
}

impl Credentials {
    pub fn new(entries: Vec<Credential>) -> Self {
        Self { entries }
    }

    /// Load from a `.yaml`/`.yml` file; any other extension is rejected.
    pub fn load_file(path: impl AsRef<Path>) -> Result<Credentials, InfraError> {
        let path = path.as_ref();
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => {}
            other => {
                return Err(InfraError::UnknownFileFormat(format!(
                    "{path:?} (extension {other:?})"
                )));
            }
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| InfraError::Credential(format!("reading {path:?}: {e}")))?;
        Self::load_str(&text)
    }

    pub fn load_str(text: &str) -> Result<Credentials, InfraError> {
        let raws: Vec<RawCredential> = serde_yaml::from_str(text)
            .map_err(|e| InfraError::Credential(format!("parsing yaml: {e}")))?;
        let entries = raws
            .into_iter()
            .map(Credential::from_raw)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Credentials { entries })
    }

    /// First credential whose anchored regex matches `hostname`. Empty or
    /// absent hostnames always fail, matching the Python original.
    pub fn get_credential(&self, hostname: Option<&str>) -> Option<&Credential> {
        let hostname = hostname?;
        if hostname.is_empty() {
            return None;
        }
        self.entries.iter().find(|c| c.regexp.is_match(hostname))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yaml() -> &'static str {
        r#"
- regexp: "xr.*"
  username: fred
  password: secret
- regexp: ".*"
  username: default_user
"#
    }

    #[test]
    fn first_match_wins_in_order() {
        let creds = Credentials::load_str(yaml()).unwrap();
        let c = creds.get_credential(Some("xr1.foo")).unwrap();
        assert_eq!(c.username, "fred");
    }

    #[test]
    fn falls_through_to_catch_all() {
        let creds = Credentials::load_str(yaml()).unwrap();
        let c = creds.get_credential(Some("sw1.bar")).unwrap();
        assert_eq!(c.username, "default_user");
    }

    #[test]
    fn empty_hostname_never_matches() {
        let creds = Credentials::load_str(yaml()).unwrap();
        assert!(creds.get_credential(Some("")).is_none());
        assert!(creds.get_credential(None).is_none());
    }

    #[test]
    fn missing_username_is_an_error() {
        let err = Credentials::load_str("- regexp: \".*\"\n").unwrap_err();
        assert!(matches!(err, InfraError::Credential(_)));
    }

    #[test]
    fn match_is_case_insensitive() {
        let creds = Credentials::load_str(yaml()).unwrap();
        assert!(creds.get_credential(Some("XR1.FOO")).is_some());
    }
}
