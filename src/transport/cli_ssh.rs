//! Command-line SSH transport: spawns and drives an `ssh` subprocess.
//!
//! Some legacy FTOS-class devices reject every key-exchange/cipher
//! combination a library client offers but happily negotiate with the
//! system `ssh` binary's broader, OS-patched algorithm set. This transport
//! exists for exactly that escape hatch; it is otherwise identical in
//! contract to the Telnet transport, since both are just byte streams once
//! the subprocess is up.

use std::process::Stdio;
use std::time::Duration;

use regex::Regex;
use tokio::io::{AsyncWriteExt, ReadHalf, split};
use tokio::process::{Child, Command};

use crate::error::ConnectError;

use super::{CommandOutcome, CommandSettings, ExpectEvent};

pub struct CliSshTransport {
    child: Option<Child>,
    reader: Option<ReadHalf<tokio::process::ChildStdout>>,
}

impl CliSshTransport {
    pub fn new() -> Self {
        Self {
            child: None,
            reader: None,
        }
    }

    pub async fn connect(
        &mut self,
        username: &str,
        address: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<(), ConnectError> {
        let mut child = Command::new("ssh")
            .arg("-tt")
            .arg("-p")
            .arg(port.to_string())
            .arg("-o")
            .arg("StrictHostKeyChecking=no")
            .arg(format!("{username}@{address}"))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(ConnectError::Io)?;

        let stdout = child.stdout.take().ok_or(ConnectError::ConnectClosedError)?;
        let (reader, _writer) = split(stdout);
        self.reader = Some(reader);
        self.child = Some(child);
        let _ = timeout;
        Ok(())
    }

    pub async fn write(&mut self, bytes: &[u8]) -> Result<(), ConnectError> {
        if let Some(stdin) = self.child.as_mut().and_then(|c| c.stdin.as_mut()) {
            stdin.write_all(bytes).await.map_err(ConnectError::Io)
        } else {
            Err(ConnectError::ConnectClosedError)
        }
    }

    pub async fn expect(
        &mut self,
        patterns: &[&Regex],
        timeout: Duration,
    ) -> Result<ExpectEvent, ConnectError> {
        let reader = self.reader.as_mut().ok_or(ConnectError::ConnectClosedError)?;
        super::expect_generic(reader, patterns, timeout).await
    }

    pub async fn command(
        &mut self,
        cmd: &str,
        settings: &CommandSettings<'_>,
        timeout: Duration,
    ) -> Result<CommandOutcome, ConnectError> {
        // stdin and the read half of stdout live behind separate handles
        // (the subprocess's stdin isn't part of the split stdout pipe), so
        // the shared byte-stream helper can't be reused verbatim here: the
        // write and read sides are driven through different fields.
        self.write(settings.trailer.as_bytes()).await?;
        let reader = self.reader.as_mut().ok_or(ConnectError::ConnectClosedError)?;
        match super::expect_generic(reader, &[settings.prompt], timeout).await? {
            ExpectEvent::Matched { .. } => {}
            ExpectEvent::Eof { .. } => return Err(ConnectError::Eof),
            ExpectEvent::Timeout { .. } => {
                return Err(ConnectError::ExecTimeout("flush before command".into()));
            }
        }

        let full_cmd = format!("{cmd}{}", settings.trailer);
        self.write(full_cmd.as_bytes()).await?;

        let mut output = String::new();
        loop {
            let patterns: Vec<&Regex> = match settings.pager {
                Some((pager_re, _)) => vec![settings.prompt, pager_re],
                None => vec![settings.prompt],
            };
            let reader = self.reader.as_mut().ok_or(ConnectError::ConnectClosedError)?;
            match super::expect_generic(reader, &patterns, timeout).await? {
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
                        self.write(response.as_bytes()).await?;
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
        if let Some(mut child) = self.child.take() {
            let _ = child.start_kill();
        }
        self.reader = None;
    }

    pub fn is_connected(&self) -> bool {
        self.child.is_some()
    }
}

impl Default for CliSshTransport {
    fn default() -> Self {
        Self::new()
    }
}
