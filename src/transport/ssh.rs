//! SSHv2 interactive shell transport, the default for most vendors.
//!
//! Opens a PTY-backed shell channel over `async-ssh2-tokio`/`russh` and
//! drives its `ChannelMsg` event stream directly: writes go through
//! `channel.data()`, reads come from `channel.wait()`. No extra task is
//! spawned; the transport is only ever touched from behind the session's
//! exclusive lock, same as every other transport flavor.

use std::borrow::Cow;
use std::time::Duration;

use async_ssh2_tokio::Config;
use async_ssh2_tokio::client::{AuthMethod, Client, ServerCheckMethod};
use regex::Regex;
use russh::{Channel, ChannelMsg, Preferred, client::Msg};

use crate::credentials::Credential;
use crate::error::ConnectError;
use crate::transport::algorithms;

use super::{CommandOutcome, CommandSettings, ExpectEvent};

/// SSH algorithm policy. `Secure` is the default; `Balanced` and
/// `LegacyCompatible` widen the negotiated set for older fleets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityLevel {
    Secure,
    Balanced,
    LegacyCompatible,
}

impl SecurityLevel {
    fn preferred(self) -> Preferred {
        match self {
            SecurityLevel::Secure => Preferred {
                kex: Cow::Borrowed(algorithms::SECURE_KEX_ORDER),
                key: Cow::Borrowed(algorithms::SECURE_KEY_TYPES),
                cipher: Cow::Borrowed(algorithms::SECURE_CIPHERS),
                mac: Cow::Borrowed(algorithms::SECURE_MAC_ALGORITHMS),
                compression: Cow::Borrowed(algorithms::DEFAULT_COMPRESSION_ALGORITHMS),
            },
            SecurityLevel::Balanced => Preferred {
                kex: Cow::Borrowed(algorithms::BALANCED_KEX_ORDER),
                key: Cow::Borrowed(algorithms::BALANCED_KEY_TYPES),
                cipher: Cow::Borrowed(algorithms::BALANCED_CIPHERS),
                mac: Cow::Borrowed(algorithms::BALANCED_MAC_ALGORITHMS),
                compression: Cow::Borrowed(algorithms::DEFAULT_COMPRESSION_ALGORITHMS),
            },
            SecurityLevel::LegacyCompatible => Preferred {
                kex: Cow::Borrowed(algorithms::LEGACY_KEX_ORDER),
                key: Cow::Borrowed(algorithms::LEGACY_KEY_TYPES),
                cipher: Cow::Borrowed(algorithms::LEGACY_CIPHERS),
                mac: Cow::Borrowed(algorithms::LEGACY_MAC_ALGORITHMS),
                compression: Cow::Borrowed(algorithms::DEFAULT_COMPRESSION_ALGORITHMS),
            },
        }
    }
}

pub struct SshTransport {
    client: Option<Client>,
    channel: Option<Channel<Msg>>,
}

impl SshTransport {
    pub fn new() -> Self {
        Self {
            client: None,
            channel: None,
        }
    }

    pub async fn connect(
        &mut self,
        address: &str,
        port: u16,
        credential: &Credential,
        security: SecurityLevel,
        timeout: Duration,
    ) -> Result<(), ConnectError> {
        let auth = if let Some(key) = &credential.ssh_private_key {
            AuthMethod::with_key(key, None)
        } else {
            AuthMethod::with_password(credential.password.as_deref().unwrap_or_default())
        };

        let config = Config {
            inactivity_timeout: Some(timeout),
            preferred: security.preferred(),
            ..Default::default()
        };

        let client = tokio::time::timeout(
            timeout,
            Client::connect(
                (address, port),
                &credential.username,
                auth,
                ServerCheckMethod::NoCheck,
                config,
            ),
        )
        .await
        .map_err(|_| ConnectError::InitTimeout(format!("ssh connect {address}:{port}")))?
        .map_err(ConnectError::Ssh2Error)?;

        let mut channel = client
            .get_channel()
            .await
            .map_err(ConnectError::Ssh2Error)?;
        channel
            .request_pty(false, "xterm", 200, 50, 0, 0, &[])
            .await
            .map_err(ConnectError::RusshError)?;
        channel
            .request_shell(false)
            .await
            .map_err(ConnectError::RusshError)?;

        self.client = Some(client);
        self.channel = Some(channel);
        Ok(())
    }

    async fn send(&mut self, text: &str) -> Result<(), ConnectError> {
        let channel = self.channel.as_mut().ok_or(ConnectError::ConnectClosedError)?;
        channel
            .data(text.as_bytes())
            .await
            .map_err(ConnectError::RusshError)
    }

    pub async fn write(&mut self, bytes: &[u8]) -> Result<(), ConnectError> {
        let text = String::from_utf8_lossy(bytes).into_owned();
        self.send(&text).await
    }

    pub async fn expect(
        &mut self,
        patterns: &[&Regex],
        timeout: Duration,
    ) -> Result<ExpectEvent, ConnectError> {
        let channel = self.channel.as_mut().ok_or(ConnectError::ConnectClosedError)?;
        let mut buffer = String::new();
        loop {
            let msg = tokio::time::timeout(timeout, channel.wait())
                .await
                .map_err(|_| ConnectError::ExecTimeout("ssh expect".into()))?;
            match msg {
                Some(ChannelMsg::Data { data }) => {
                    buffer.push_str(&String::from_utf8_lossy(&data));
                    for (index, pattern) in patterns.iter().enumerate() {
                        if let Some(m) = pattern.find(&buffer) {
                            return Ok(ExpectEvent::Matched {
                                index,
                                before: buffer[..m.start()].to_string(),
                                matched: buffer[m.start()..m.end()].to_string(),
                                after: buffer[m.end()..].to_string(),
                            });
                        }
                    }
                }
                Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => {
                    return Ok(ExpectEvent::Eof { before: buffer });
                }
                _ => {}
            }
        }
    }

    pub async fn command(
        &mut self,
        cmd: &str,
        settings: &CommandSettings<'_>,
        timeout: Duration,
    ) -> Result<CommandOutcome, ConnectError> {
        self.send(settings.trailer).await?;
        match self.expect(&[settings.prompt], timeout).await? {
            ExpectEvent::Matched { .. } => {}
            ExpectEvent::Eof { .. } => return Err(ConnectError::Eof),
            ExpectEvent::Timeout { .. } => {
                return Err(ConnectError::ExecTimeout("flush before command".into()));
            }
        }

        let full_cmd = format!("{cmd}{}", settings.trailer);
        self.send(&full_cmd).await?;

        let mut output = String::new();
        loop {
            let patterns: Vec<&Regex> = match settings.pager {
                Some((pager_re, _)) => vec![settings.prompt, pager_re],
                None => vec![settings.prompt],
            };
            match self.expect(&patterns, timeout).await? {
                ExpectEvent::Eof { before } => {
                    output.push_str(&before);
                    return Err(ConnectError::Eof);
                }
                ExpectEvent::Timeout { .. } => {
                    return Err(ConnectError::ExecTimeout(cmd.to_string()));
                }
                ExpectEvent::Matched { index, before, .. } => {
                    output.push_str(&before);
                    if index == 0 {
                        break;
                    }
                    if let Some((_, response)) = settings.pager {
                        self.send(response).await?;
                    }
                }
            }
        }

        if settings.strip_echo {
            if let Some(pos) = output.find('\n') {
                output = output[pos + 1..].to_string();
            }
        }
        let output = if settings.ansi_strip {
            super::sanitize::strip_ansi(&super::sanitize::dos_to_unix(&output))
        } else {
            super::sanitize::dos_to_unix(&output)
        };
        Ok(CommandOutcome { output })
    }

    pub async fn disconnect(&mut self) {
        if let Some(channel) = self.channel.take() {
            let _ = channel.close().await;
        }
        self.client = None;
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_some()
    }
}

impl Default for SshTransport {
    fn default() -> Self {
        Self::new()
    }
}
