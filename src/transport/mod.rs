//! Turns a raw SSH shell, Telnet stream, or `ssh` subprocess into a
//! regex-expect dialogue with short/long timeouts.
//!
//! Three concrete flavors exist, selected by [`ConnectMethod`]: an
//! interactive SSHv2 shell channel (the common case, most vendors), raw
//! Telnet over TCP with inline option negotiation, and a spawned `ssh`
//! subprocess for legacy devices that refuse library SSH. All three answer
//! the same `connect`/`write`/`expect`/`command`/`disconnect` contract.

pub mod algorithms;
pub mod cli_ssh;
pub mod sanitize;
pub mod ssh;
pub mod telnet;

use std::time::Duration;

use regex::Regex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::ConnectError;

/// Selects which concrete transport a device dials with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectMethod {
    Sshv2,
    Telnet,
    Sshv1Cli,
}

/// Outcome of a single `expect()` call.
#[derive(Debug, Clone)]
pub enum ExpectEvent {
    /// One of the supplied patterns matched.
    Matched {
        index: usize,
        before: String,
        matched: String,
        after: String,
    },
    /// The peer closed the stream before any pattern matched.
    Eof { before: String },
    /// No pattern matched within the timeout.
    Timeout { before: String },
}

/// Settings for a single `command()` dialogue.
pub struct CommandSettings<'a> {
    pub prompt: &'a Regex,
    /// Line terminator sent after the command (and during the initial flush).
    pub trailer: &'a str,
    /// Pager prompt plus the response to send when it is seen (e.g. a space).
    pub pager: Option<(&'a Regex, &'a str)>,
    pub ansi_strip: bool,
    /// Whether to drop the first line of output (the echoed command).
    pub strip_echo: bool,
}

/// Result of a completed `command()` dialogue.
#[derive(Debug, Clone)]
pub struct CommandOutcome {
    pub output: String,
}

/// Read from `stream` until one of `patterns` matches, EOF is hit, or
/// `timeout` elapses. Shared by the Telnet and command-line-SSH transports,
/// which are both plain byte streams; the SSHv2 shell channel has its own
/// event-based loop mirroring the channel-message protocol directly (see
/// [`ssh::SshTransport`]).
pub(crate) async fn expect_generic<S>(
    stream: &mut S,
    patterns: &[&Regex],
    timeout: Duration,
) -> Result<ExpectEvent, ConnectError>
where
    S: AsyncRead + Unpin,
{
    let mut buffer = String::new();
    let mut chunk = [0u8; 4096];

    loop {
        let read = tokio::time::timeout(timeout, stream.read(&mut chunk)).await;
        let n = match read {
            Ok(Ok(0)) => return Ok(ExpectEvent::Eof { before: buffer }),
            Ok(Ok(n)) => n,
            Ok(Err(e)) => return Err(ConnectError::Io(e)),
            Err(_) => return Ok(ExpectEvent::Timeout { before: buffer }),
        };
        buffer.push_str(&String::from_utf8_lossy(&chunk[..n]));

        for (index, pattern) in patterns.iter().enumerate() {
            if let Some(m) = pattern.find(&buffer) {
                let before = buffer[..m.start()].to_string();
                let matched = buffer[m.start()..m.end()].to_string();
                let after = buffer[m.end()..].to_string();
                return Ok(ExpectEvent::Matched {
                    index,
                    before,
                    matched,
                    after,
                });
            }
        }
    }
}

/// Shared `command()` dialogue for byte-stream transports: flush, send the
/// command, loop answering pager prompts, and return everything seen before
/// the final prompt.
pub(crate) async fn command_generic<S>(
    stream: &mut S,
    cmd: &str,
    settings: &CommandSettings<'_>,
    timeout: Duration,
) -> Result<CommandOutcome, ConnectError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream
        .write_all(settings.trailer.as_bytes())
        .await
        .map_err(ConnectError::Io)?;
    match expect_generic(stream, &[settings.prompt], timeout).await? {
        ExpectEvent::Matched { .. } => {}
        ExpectEvent::Eof { .. } => return Err(ConnectError::Eof),
        ExpectEvent::Timeout { .. } => {
            return Err(ConnectError::ExecTimeout("flush before command".into()));
        }
    }

    let full_cmd = format!("{cmd}{}", settings.trailer);
    stream
        .write_all(full_cmd.as_bytes())
        .await
        .map_err(ConnectError::Io)?;

    let mut output = String::new();
    loop {
        let patterns: Vec<&Regex> = match settings.pager {
            Some((pager_re, _)) => vec![settings.prompt, pager_re],
            None => vec![settings.prompt],
        };
        match expect_generic(stream, &patterns, timeout).await? {
            ExpectEvent::Eof { before } => {
                output.push_str(&before);
                return Err(ConnectError::Eof);
            }
            ExpectEvent::Timeout { .. } => {
                return Err(ConnectError::ExecTimeout(cmd.to_string()));
            }
            ExpectEvent::Matched {
                index, before, ..
            } => {
                output.push_str(&before);
                if index == 0 {
                    break;
                }
                // pager prompt: answer and keep reading
                if let Some((_, response)) = settings.pager {
                    stream
                        .write_all(response.as_bytes())
                        .await
                        .map_err(ConnectError::Io)?;
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
        sanitize::strip_ansi(&sanitize::dos_to_unix(&output))
    } else {
        sanitize::dos_to_unix(&output)
    };

    Ok(CommandOutcome { output })
}

/// The concrete transport in use for one device connection. Owns exactly
/// one of the three flavors; dispatch is a flat match, not a trait object,
/// since only one flavor is ever live per device.
pub enum TransportKind {
    Ssh(ssh::SshTransport),
    Telnet(telnet::TelnetTransport),
    CliSsh(cli_ssh::CliSshTransport),
}

impl TransportKind {
    pub fn new(method: ConnectMethod) -> Self {
        match method {
            ConnectMethod::Sshv2 => TransportKind::Ssh(ssh::SshTransport::new()),
            ConnectMethod::Telnet => TransportKind::Telnet(telnet::TelnetTransport::new()),
            ConnectMethod::Sshv1Cli => TransportKind::CliSsh(cli_ssh::CliSshTransport::new()),
        }
    }

    pub async fn connect(
        &mut self,
        address: &str,
        port: u16,
        credential: &crate::credentials::Credential,
        timeout: Duration,
    ) -> Result<(), ConnectError> {
        match self {
            TransportKind::Ssh(t) => {
                t.connect(address, port, credential, ssh::SecurityLevel::Secure, timeout)
                    .await
            }
            TransportKind::Telnet(t) => {
                telnet::TelnetTransport::check_credential(credential)?;
                t.connect(address, port, timeout).await
            }
            TransportKind::CliSsh(t) => {
                t.connect(&credential.username, address, port, timeout).await
            }
        }
    }

    pub async fn write(&mut self, bytes: &[u8]) -> Result<(), ConnectError> {
        match self {
            TransportKind::Ssh(t) => t.write(bytes).await,
            TransportKind::Telnet(t) => t.write(bytes).await,
            TransportKind::CliSsh(t) => t.write(bytes).await,
        }
    }

    pub async fn expect(
        &mut self,
        patterns: &[&Regex],
        timeout: Duration,
    ) -> Result<ExpectEvent, ConnectError> {
        match self {
            TransportKind::Ssh(t) => t.expect(patterns, timeout).await,
            TransportKind::Telnet(t) => t.expect(patterns, timeout).await,
            TransportKind::CliSsh(t) => t.expect(patterns, timeout).await,
        }
    }

    pub async fn command(
        &mut self,
        cmd: &str,
        settings: &CommandSettings<'_>,
        timeout: Duration,
    ) -> Result<CommandOutcome, ConnectError> {
        match self {
            TransportKind::Ssh(t) => t.command(cmd, settings, timeout).await,
            TransportKind::Telnet(t) => t.command(cmd, settings, timeout).await,
            TransportKind::CliSsh(t) => t.command(cmd, settings, timeout).await,
        }
    }

    pub async fn disconnect(&mut self) {
        match self {
            TransportKind::Ssh(t) => t.disconnect().await,
            TransportKind::Telnet(t) => t.disconnect().await,
            TransportKind::CliSsh(t) => t.disconnect().await,
        }
    }

    pub fn is_connected(&self) -> bool {
        match self {
            TransportKind::Ssh(t) => t.is_connected(),
            TransportKind::Telnet(t) => t.is_connected(),
            TransportKind::CliSsh(t) => t.is_connected(),
        }
    }
}
