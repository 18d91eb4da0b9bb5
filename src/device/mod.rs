//! Per-device connection: dials an address list, drives the login/enable
//! dialogue, and executes commands against the resulting shell through the
//! shared [`handler::DeviceHandler`] state machine.

pub mod drivers;
pub mod handler;

use std::time::Duration;

use regex::Regex;

use crate::credentials::Credential;
use crate::error::{ApiError, ConnectError};
use crate::transport::{CommandSettings, ConnectMethod, TransportKind};

use drivers::DriverSpec;
use handler::DeviceHandler;

/// One managed connection to a network device.
pub struct Device {
    pub name: String,
    pub addresses: Vec<String>,
    pub vendor: String,
    pub port: u16,
    /// Registry-level override for which transport to dial, below the
    /// per-request `Credential::connect_method` override and above the
    /// driver's own default.
    pub connect_method: Option<ConnectMethod>,
    spec: DriverSpec,
    save_prompts: Vec<(Regex, &'static str)>,
    transport: Option<TransportKind>,
    handler: Option<DeviceHandler>,
    /// Last prompt text seen, tracked alongside the handler's classified
    /// state the same way the session layer tracks it separately from the
    /// FSM: the handler only knows the *named* state, not the literal text.
    prompt: String,
}

impl Device {
    pub fn new(name: String, addresses: Vec<String>, vendor: &str, port: u16) -> Result<Device, ApiError> {
        Self::with_connect_method(name, addresses, vendor, port, None)
    }

    pub fn with_connect_method(
        name: String,
        addresses: Vec<String>,
        vendor: &str,
        port: u16,
        connect_method: Option<ConnectMethod>,
    ) -> Result<Device, ApiError> {
        let spec = drivers::lookup(vendor).ok_or_else(|| ApiError::NoSuchVendor(vendor.to_string()))?;
        let save_prompts = spec
            .save_prompts
            .iter()
            .map(|(pattern, reply)| {
                Regex::new(pattern)
                    .map(|re| (re, *reply))
                    .map_err(|e| ApiError::Internal(format!("bad save prompt {pattern:?}: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Device {
            name,
            addresses,
            vendor: vendor.to_string(),
            port,
            connect_method,
            spec,
            save_prompts,
            transport: None,
            handler: None,
            prompt: String::new(),
        })
    }

    pub fn is_connected(&self) -> bool {
        self.transport.as_ref().is_some_and(TransportKind::is_connected)
    }

    /// Dials every configured address in order; the first that completes
    /// login wins. An empty address list is reported without any I/O.
    pub async fn connect(&mut self, credential: &Credential) -> Result<(), ApiError> {
        if self.addresses.is_empty() {
            return Err(ApiError::NoAddresses);
        }
        let mut last_err: Option<ApiError> = None;
        for address in self.addresses.clone() {
            match self.connect_one(&address, credential).await {
                Ok(()) => return Ok(()),
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or(ApiError::NoAddresses))
    }

    async fn connect_one(&mut self, address: &str, credential: &Credential) -> Result<(), ApiError> {
        let method = credential
            .connect_method
            .or(self.connect_method)
            .unwrap_or(self.spec.default_connect_method);
        if !self.spec.connect_methods.contains(&method) {
            return Err(ApiError::InvalidMode(format!(
                "{method:?} not supported by the {} driver",
                self.vendor
            )));
        }
        let mut transport = TransportKind::new(method);
        transport
            .connect(address, self.port, credential, self.spec.timeouts.connect)
            .await
            .map_err(|e| ApiError::Connect(e.to_string()))?;

        let mut handler =
            (self.spec.build_handler)().map_err(|e| ApiError::Internal(e.to_string()))?;

        // Menu-driven login (Nortel/Bay's Ctrl-Y dialogue) only applies over
        // Telnet; other connect methods authenticate at the transport layer
        // and fall through to the generic login dialogue, matching the
        // original agent's per-connect-method guard.
        let menu = (method == ConnectMethod::Telnet)
            .then(|| self.spec.menu_login.clone())
            .flatten();
        match menu {
            Some(menu) => {
                self.menu_login(&mut transport, &mut handler, credential, &menu)
                    .await
                    .map_err(classify_login_error)?;
            }
            None => {
                self.login(&mut transport, &mut handler, credential)
                    .await
                    .map_err(classify_login_error)?;
            }
        }

        if let Some(cmd) = self.spec.disable_pager_command {
            let _ = self
                .run_raw(&mut transport, &mut handler, cmd, self.spec.timeouts.resp_short)
                .await;
        }

        self.transport = Some(transport);
        self.handler = Some(handler);
        Ok(())
    }

    /// Authenticate, then escalate to enable mode when the vendor supports
    /// it and the credential carries an enable password.
    async fn login(
        &mut self,
        transport: &mut TransportKind,
        handler: &mut DeviceHandler,
        credential: &Credential,
    ) -> Result<(), ConnectError> {
        let needs_credentials = match self.spec.login_prompt.clone() {
            Some(login_prompt) => {
                let greeting = vec![&login_prompt, &self.spec.password_prompt, &self.spec.prompt];
                match transport.expect(&greeting, self.spec.timeouts.connect).await? {
                    crate::transport::ExpectEvent::Matched { index: 0, .. } => {
                        transport
                            .write(format!("{}\n", credential.username).as_bytes())
                            .await?;
                        match transport.expect(&[&self.spec.password_prompt], self.spec.timeouts.resp_short).await? {
                            crate::transport::ExpectEvent::Matched { .. } => {}
                            crate::transport::ExpectEvent::Eof { .. } => return Err(ConnectError::Eof),
                            crate::transport::ExpectEvent::Timeout { .. } => {
                                return Err(ConnectError::InitTimeout("password prompt".into()));
                            }
                        }
                        self.send_password(transport, credential).await?;
                        true
                    }
                    crate::transport::ExpectEvent::Matched { index: 1, .. } => {
                        self.send_password(transport, credential).await?;
                        true
                    }
                    crate::transport::ExpectEvent::Matched { index: 2, matched, .. } => {
                        // already at a command prompt; no credentials required
                        handler.read(matched.trim_end());
                        self.prompt = matched;
                        false
                    }
                    crate::transport::ExpectEvent::Matched { .. } => unreachable!("only three patterns supplied"),
                    crate::transport::ExpectEvent::Eof { .. } => return Err(ConnectError::Eof),
                    crate::transport::ExpectEvent::Timeout { .. } => {
                        return Err(ConnectError::InitTimeout("login banner".into()));
                    }
                }
            }
            // No separate username prompt: the shell re-prompts for a
            // password directly (e.g. TiMOS).
            None => {
                let greeting = vec![&self.spec.password_prompt, &self.spec.prompt];
                match transport.expect(&greeting, self.spec.timeouts.connect).await? {
                    crate::transport::ExpectEvent::Matched { index: 0, .. } => {
                        self.send_password(transport, credential).await?;
                        true
                    }
                    crate::transport::ExpectEvent::Matched { index: 1, matched, .. } => {
                        handler.read(matched.trim_end());
                        self.prompt = matched;
                        false
                    }
                    crate::transport::ExpectEvent::Matched { .. } => unreachable!("only two patterns supplied"),
                    crate::transport::ExpectEvent::Eof { .. } => return Err(ConnectError::Eof),
                    crate::transport::ExpectEvent::Timeout { .. } => {
                        return Err(ConnectError::InitTimeout("login banner".into()));
                    }
                }
            }
        };

        if needs_credentials {
            let after_login = self.await_prompt(transport, handler, self.spec.timeouts.connect).await?;
            self.prompt = after_login;
        }

        if credential.auto_enable {
            if let (Some(enable_prompt), Some(enable_password)) =
                (&self.spec.enable_password_prompt, &credential.enable_password)
            {
                if !self.spec.enable_command.is_empty() {
                    transport
                        .write(format!("{}\n", self.spec.enable_command).as_bytes())
                        .await?;
                    let mut patterns = vec![enable_prompt, &self.spec.prompt];
                    if let Some(bad) = &self.spec.bad_secrets {
                        patterns.push(bad);
                    }
                    match transport.expect(&patterns, self.spec.timeouts.resp_short).await? {
                        crate::transport::ExpectEvent::Matched { index: 0, .. } => {
                            transport.write(format!("{enable_password}\n").as_bytes()).await?;
                            let prompt = self
                                .await_prompt(transport, handler, self.spec.timeouts.resp_short)
                                .await?;
                            self.prompt = prompt;
                        }
                        crate::transport::ExpectEvent::Matched { index: 1, .. } => {
                            // already elevated, nothing further to send
                        }
                        crate::transport::ExpectEvent::Matched { .. } => {
                            return Err(ConnectError::EnableRejected);
                        }
                        crate::transport::ExpectEvent::Eof { .. } => return Err(ConnectError::Eof),
                        crate::transport::ExpectEvent::Timeout { .. } => {
                            return Err(ConnectError::ExecTimeout("enable".into()));
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Menu-driven login for vendors gated behind a control character and a
    /// menu pick rather than a username/password dialogue: wait for the
    /// pre-login banner, send the control byte, authenticate at the
    /// resulting password prompt, then pick the CLI menu option.
    async fn menu_login(
        &mut self,
        transport: &mut TransportKind,
        handler: &mut DeviceHandler,
        credential: &Credential,
        menu: &drivers::MenuLogin,
    ) -> Result<(), ConnectError> {
        match transport.expect(&[&menu.pre_login_prompt], self.spec.timeouts.connect).await? {
            crate::transport::ExpectEvent::Matched { .. } => {}
            crate::transport::ExpectEvent::Eof { .. } => return Err(ConnectError::Eof),
            crate::transport::ExpectEvent::Timeout { .. } => {
                return Err(ConnectError::InitTimeout("pre-login banner".into()));
            }
        }
        transport.write(&[menu.ctrl_byte]).await?;

        match transport.expect(&[&menu.password_prompt], self.spec.timeouts.resp_short).await? {
            crate::transport::ExpectEvent::Matched { .. } => {}
            crate::transport::ExpectEvent::Eof { .. } => return Err(ConnectError::Eof),
            crate::transport::ExpectEvent::Timeout { .. } => {
                return Err(ConnectError::InitTimeout("menu password prompt".into()));
            }
        }
        self.send_password(transport, credential).await?;

        match transport
            .expect(&[&menu.menu_option, &menu.bad_password], self.spec.timeouts.resp_short)
            .await?
        {
            crate::transport::ExpectEvent::Matched { index: 0, .. } => {}
            crate::transport::ExpectEvent::Matched { .. } => return Err(ConnectError::AuthenticationRejected),
            crate::transport::ExpectEvent::Eof { .. } => return Err(ConnectError::Eof),
            crate::transport::ExpectEvent::Timeout { .. } => {
                return Err(ConnectError::InitTimeout("menu option".into()));
            }
        }
        transport.write(menu.select_key.as_bytes()).await?;

        let prompt = self.await_prompt(transport, handler, self.spec.timeouts.connect).await?;
        self.prompt = prompt;
        Ok(())
    }

    async fn send_password(
        &self,
        transport: &mut TransportKind,
        credential: &Credential,
    ) -> Result<(), ConnectError> {
        let password = credential.password.as_deref().unwrap_or_default();
        transport.write(format!("{password}\n").as_bytes()).await
    }

    /// Waits for the device prompt, checking bad-secrets rejection along the
    /// way, and syncs the handler's classified state from the matched text.
    async fn await_prompt(
        &self,
        transport: &mut TransportKind,
        handler: &mut DeviceHandler,
        wait: Duration,
    ) -> Result<String, ConnectError> {
        let mut patterns = vec![&self.spec.prompt];
        if let Some(bad) = &self.spec.bad_secrets {
            patterns.push(bad);
        }
        match transport.expect(&patterns, wait).await? {
            crate::transport::ExpectEvent::Matched { index: 0, matched, .. } => {
                handler.read(matched.trim_end());
                Ok(matched)
            }
            crate::transport::ExpectEvent::Matched { .. } => {
                Err(ConnectError::AuthenticationRejected)
            }
            crate::transport::ExpectEvent::Eof { .. } => Err(ConnectError::Eof),
            crate::transport::ExpectEvent::Timeout { .. } => {
                Err(ConnectError::InitTimeout("device prompt".into()))
            }
        }
    }

    /// Runs a command from whatever state the handler is currently in,
    /// without any mode transition. Used for one-off housekeeping commands
    /// (e.g. disabling the pager) issued right after login.
    async fn run_raw(
        &self,
        transport: &mut TransportKind,
        handler: &mut DeviceHandler,
        cmd: &str,
        wait: Duration,
    ) -> Result<String, ConnectError> {
        let settings = CommandSettings {
            prompt: &self.spec.prompt,
            trailer: "\n",
            pager: self.spec.pager.as_ref().map(|(re, resp)| (re, *resp)),
            ansi_strip: self.spec.ansi_strip,
            strip_echo: true,
        };
        let outcome = transport.command(cmd, &settings, wait).await?;
        if let Some(last_line) = outcome.output.lines().last() {
            handler.read(last_line);
        }
        Ok(outcome.output)
    }

    /// Transitions to `mode` (default `"Enable"`) and executes `cmd` there,
    /// auto-answering any save/commit confirmation dialogue the vendor
    /// raises along the way.
    pub async fn command(&mut self, cmd: &str, mode: Option<&str>, wait: Duration) -> Result<String, ApiError> {
        if !self.is_connected() {
            return Err(ApiError::Disconnect("device is not connected".into()));
        }
        let transport = self.transport.as_mut().expect("checked connected");
        let handler = self.handler.as_mut().expect("checked connected");
        let target = mode.unwrap_or("Enable");

        let hops = handler.trans_state_write(target, None).map_err(ApiError::from)?;
        for (hop_cmd, to_state) in &hops {
            run_hop(transport, &self.spec, hop_cmd, self.spec.timeouts.resp_short)
                .await
                .map_err(ApiError::from)?;
            handler.set_state(to_state, None);
        }

        let output = run_with_save(transport, &self.spec, &self.save_prompts, cmd, wait)
            .await
            .map_err(ApiError::from)?;
        Ok(output)
    }

    pub async fn disconnect(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.disconnect().await;
        }
        self.handler = None;
    }
}

/// Classifies a login-phase failure into the user-visible tier. Rejections
/// specific to a bad username/password or a bad enable secret get their own
/// codes so the caller can tell "wrong credentials" apart from "device
/// unreachable"; everything else during login (timeouts, EOF, handshake
/// trouble) is still a connect-phase failure.
fn classify_login_error(err: ConnectError) -> ApiError {
    match err {
        ConnectError::AuthenticationRejected => ApiError::Authentication(err.to_string()),
        ConnectError::EnableRejected => ApiError::Enable(err.to_string()),
        other => ApiError::Connect(other.to_string()),
    }
}

async fn run_hop(
    transport: &mut TransportKind,
    spec: &DriverSpec,
    cmd: &str,
    wait: Duration,
) -> Result<(), ConnectError> {
    let settings = CommandSettings {
        prompt: &spec.prompt,
        trailer: "\n",
        pager: spec.pager.as_ref().map(|(re, resp)| (re, *resp)),
        ansi_strip: spec.ansi_strip,
        strip_echo: true,
    };
    transport.command(cmd, &settings, wait).await.map(|_| ())
}

/// Runs one command, looping on the prompt/pager/save patterns exactly like
/// [`crate::transport::command_generic`] but with an extra branch for
/// vendor save-confirmation dialogues, which is something a generic
/// byte-stream transport has no vendor knowledge of.
async fn run_with_save(
    transport: &mut TransportKind,
    spec: &DriverSpec,
    save_prompts: &[(Regex, &'static str)],
    cmd: &str,
    wait: Duration,
) -> Result<String, ConnectError> {
    if save_prompts.is_empty() {
        let settings = CommandSettings {
            prompt: &spec.prompt,
            trailer: "\n",
            pager: spec.pager.as_ref().map(|(re, resp)| (re, *resp)),
            ansi_strip: spec.ansi_strip,
            strip_echo: true,
        };
        return transport.command(cmd, &settings, wait).await.map(|o| o.output);
    }

    transport.write(b"\n").await?;
    match transport.expect(&[&spec.prompt], wait).await? {
        crate::transport::ExpectEvent::Matched { .. } => {}
        crate::transport::ExpectEvent::Eof { .. } => return Err(ConnectError::Eof),
        crate::transport::ExpectEvent::Timeout { .. } => {
            return Err(ConnectError::ExecTimeout("flush before command".into()));
        }
    }

    transport.write(format!("{cmd}\n").as_bytes()).await?;

    let mut output = String::new();
    loop {
        let mut patterns = vec![&spec.prompt];
        if let Some((pager_re, _)) = &spec.pager {
            patterns.push(pager_re);
        }
        for (re, _) in save_prompts {
            patterns.push(re);
        }
        match transport.expect(&patterns, wait).await? {
            crate::transport::ExpectEvent::Eof { before } => {
                output.push_str(&before);
                return Err(ConnectError::Eof);
            }
            crate::transport::ExpectEvent::Timeout { .. } => {
                return Err(ConnectError::ExecTimeout(cmd.to_string()));
            }
            crate::transport::ExpectEvent::Matched { index, before, .. } => {
                output.push_str(&before);
                if index == 0 {
                    break;
                }
                if spec.pager.is_some() && index == 1 {
                    let (_, response) = spec.pager.as_ref().unwrap();
                    transport.write(response.as_bytes()).await?;
                    continue;
                }
                let save_index = index - if spec.pager.is_some() { 2 } else { 1 };
                let (_, response) = &save_prompts[save_index];
                transport.write(format!("{response}\n").as_bytes()).await?;
            }
        }
    }

    if let Some(pos) = output.find('\n') {
        output = output[pos + 1..].to_string();
    }
    Ok(if spec.ansi_strip {
        crate::transport::sanitize::strip_ansi(&crate::transport::sanitize::dos_to_unix(&output))
    } else {
        crate::transport::sanitize::dos_to_unix(&output)
    })
}

pub use drivers::{lookup as lookup_vendor, DriverSpec as VendorSpec};
