//! Raw-TCP Telnet transport with inline RFC 854 option negotiation.
//!
//! No telnet crate is pulled in; option negotiation is the only protocol
//! detail beyond a plain byte stream, so it is handled inline by refusing
//! every option the peer proposes (`WILL x` -> `DONT x`, `DO x` -> `WONT x`),
//! which is sufficient for a dumb line-mode terminal session.

use std::time::Duration;

use regex::Regex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::credentials::Credential;
use crate::error::ConnectError;

use super::{CommandOutcome, CommandSettings, ExpectEvent};

const IAC: u8 = 255;
const WILL: u8 = 251;
const WONT: u8 = 252;
const DO: u8 = 253;
const DONT: u8 = 254;
const SB: u8 = 250;
const SE: u8 = 240;

pub struct TelnetTransport {
    stream: Option<TcpStream>,
    /// Non-IAC bytes seen while draining option negotiation; prepended to
    /// the next `expect()` so the initial login banner is not lost.
    pending: Vec<u8>,
}

impl TelnetTransport {
    pub fn new() -> Self {
        Self {
            stream: None,
            pending: Vec::new(),
        }
    }

    pub async fn connect(
        &mut self,
        address: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<(), ConnectError> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect((address, port)))
            .await
            .map_err(|_| ConnectError::InitTimeout(format!("telnet connect {address}:{port}")))?
            .map_err(ConnectError::Io)?;
        self.stream = Some(stream);
        self.negotiate_options(timeout).await?;
        Ok(())
    }

    /// Drain and answer the peer's initial option negotiation. Every WILL/DO
    /// is refused (DONT/WONT) since this transport only needs a raw
    /// character stream, not line editing or terminal type negotiation.
    async fn negotiate_options(&mut self, timeout: Duration) -> Result<(), ConnectError> {
        let mut buf = [0u8; 1];
        loop {
            let stream = self.stream.as_mut().expect("connected");
            let read = tokio::time::timeout(Duration::from_millis(200), stream.read(&mut buf)).await;
            let n = match read {
                Ok(Ok(n)) => n,
                Ok(Err(e)) => return Err(ConnectError::Io(e)),
                Err(_) => break, // no more negotiation traffic pending
            };
            if n == 0 {
                return Err(ConnectError::Eof);
            }
            if buf[0] != IAC {
                self.pending.push(buf[0]);
                continue;
            }
            let stream = self.stream.as_mut().expect("connected");
            let mut cmd = [0u8; 1];
            tokio::time::timeout(timeout, stream.read_exact(&mut cmd))
                .await
                .map_err(|_| ConnectError::InitTimeout("telnet IAC command".into()))?
                .map_err(ConnectError::Io)?;
            match cmd[0] {
                WILL | DO => {
                    let mut opt = [0u8; 1];
                    stream.read_exact(&mut opt).await.map_err(ConnectError::Io)?;
                    let reply = if cmd[0] == WILL { DONT } else { WONT };
                    stream
                        .write_all(&[IAC, reply, opt[0]])
                        .await
                        .map_err(ConnectError::Io)?;
                }
                WONT | DONT => {
                    let mut opt = [0u8; 1];
                    stream.read_exact(&mut opt).await.map_err(ConnectError::Io)?;
                }
                SB => {
                    // consume sub-negotiation until IAC SE
                    loop {
                        let mut b = [0u8; 1];
                        stream.read_exact(&mut b).await.map_err(ConnectError::Io)?;
                        if b[0] == IAC {
                            let mut b2 = [0u8; 1];
                            stream.read_exact(&mut b2).await.map_err(ConnectError::Io)?;
                            if b2[0] == SE {
                                break;
                            }
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    pub async fn write(&mut self, bytes: &[u8]) -> Result<(), ConnectError> {
        self.stream
            .as_mut()
            .ok_or(ConnectError::ConnectClosedError)?
            .write_all(bytes)
            .await
            .map_err(ConnectError::Io)
    }

    pub async fn expect(
        &mut self,
        patterns: &[&Regex],
        timeout: Duration,
    ) -> Result<ExpectEvent, ConnectError> {
        let seed = std::mem::take(&mut self.pending);
        let seed = String::from_utf8_lossy(&seed).into_owned();
        let stream = self.stream.as_mut().ok_or(ConnectError::ConnectClosedError)?;
        let event = super::expect_generic(stream, patterns, timeout).await?;
        Ok(match event {
            ExpectEvent::Matched {
                index,
                before,
                matched,
                after,
            } => ExpectEvent::Matched {
                index,
                before: format!("{seed}{before}"),
                matched,
                after,
            },
            ExpectEvent::Eof { before } => ExpectEvent::Eof {
                before: format!("{seed}{before}"),
            },
            ExpectEvent::Timeout { before } => ExpectEvent::Timeout {
                before: format!("{seed}{before}"),
            },
        })
    }

    pub async fn command(
        &mut self,
        cmd: &str,
        settings: &CommandSettings<'_>,
        timeout: Duration,
    ) -> Result<CommandOutcome, ConnectError> {
        let stream = self.stream.as_mut().ok_or(ConnectError::ConnectClosedError)?;
        super::command_generic(stream, cmd, settings, timeout).await
    }

    pub async fn disconnect(&mut self) {
        self.stream = None;
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Telnet has no library-level authentication: the login/password
    /// exchange happens as ordinary command text driven by the device
    /// handler, so this only validates a credential was supplied.
    pub fn check_credential(credential: &Credential) -> Result<(), ConnectError> {
        if credential.username.is_empty() {
            return Err(ConnectError::Other("telnet requires a username".into()));
        }
        Ok(())
    }
}

impl Default for TelnetTransport {
    fn default() -> Self {
        Self::new()
    }
}
