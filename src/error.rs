//! Error taxonomy for the agent, its drivers, and its RPC surface.
//!
//! Two tiers, per the JSON-RPC error code table: [`ApiError`] is user-visible
//! and carries the flags the controller/session layer inspect to decide
//! whether to reconnect or retry. [`InfraError`] covers fatal startup-time
//! failures (config, credentials) that never cross the RPC boundary as a
//! coded response.

use thiserror::Error;

/// User-visible error returned from a device/session/controller operation.
///
/// Each variant maps to a stable JSON-RPC error code (see [`ApiError::code`])
/// and carries the three flags the session layer consults: whether a
/// `ConnectError` should dampen immediate reconnect attempts, whether the
/// error should force a disconnect, and whether the session should retry the
/// operation once after reconnecting.
#[derive(Error, Debug, Clone)]
pub enum ApiError {
    #[error("could not connect to device: {0}")]
    Connect(String),

    #[error("disconnect failed: {0}")]
    Disconnect(String),

    #[error("device not initialised")]
    InvalidDevice,

    #[error("mode unsupported: {0}")]
    InvalidMode(String),

    #[error("method not in api: {0}")]
    InvalidRequest(String),

    #[error("device has no address")]
    NoAddresses,

    #[error("unknown vendor: {0}")]
    NoSuchVendor(String),

    #[error("session not creatable: {0}")]
    NoSessionCreated(String),

    #[error("login/enable failed: {0}")]
    Authentication(String),

    /// `retry` carries the EOFError-style "try once more" signal forward: a
    /// transport EOF seen mid-command is still a `CommandError` on the wire
    /// (code 10), not a distinct `Eof` code, but the session layer still
    /// needs to know it's worth one reconnect-and-retry.
    #[error("command failed: {message}")]
    Command { message: String, retry: bool },

    #[error("peer closed")]
    Eof,

    #[error("no credential for host: {0}")]
    NoMatchingCredential(String),

    #[error("file download failed: {0}")]
    Download(String),

    #[error("file upload failed: {0}")]
    Upload(String),

    #[error("unknown device: {0}")]
    NoSuchDevice(String),

    #[error("enable failed: {0}")]
    Enable(String),

    /// Internal catch-all, not part of the stable table. Controller wraps
    /// unexpected errors here, with context, before surfacing over RPC.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// The stable JSON-RPC integer code for this error, per the external
    /// interface table. `Internal` has no stable code and maps to 0.
    pub fn code(&self) -> i64 {
        match self {
            ApiError::Connect(_) => 1,
            ApiError::Disconnect(_) => 2,
            ApiError::InvalidDevice => 3,
            ApiError::InvalidMode(_) => 4,
            ApiError::InvalidRequest(_) => 5,
            ApiError::NoAddresses => 6,
            ApiError::NoSuchVendor(_) => 7,
            ApiError::NoSessionCreated(_) => 8,
            ApiError::Authentication(_) => 9,
            ApiError::Command { .. } => 10,
            ApiError::Eof => 11,
            ApiError::NoMatchingCredential(_) => 12,
            ApiError::Download(_) => 13,
            ApiError::Upload(_) => 14,
            ApiError::NoSuchDevice(_) => 15,
            ApiError::Enable(_) => 16,
            ApiError::Internal(_) => 0,
        }
    }

    /// Recover the variant from a wire code, for the client's error-table
    /// reversal (unknown codes become `Internal`).
    pub fn from_code(code: i64, message: impl Into<String>) -> ApiError {
        let message = message.into();
        match code {
            1 => ApiError::Connect(message),
            2 => ApiError::Disconnect(message),
            3 => ApiError::InvalidDevice,
            4 => ApiError::InvalidMode(message),
            5 => ApiError::InvalidRequest(message),
            6 => ApiError::NoAddresses,
            7 => ApiError::NoSuchVendor(message),
            8 => ApiError::NoSessionCreated(message),
            9 => ApiError::Authentication(message),
            10 => ApiError::Command { message, retry: false },
            11 => ApiError::Eof,
            12 => ApiError::NoMatchingCredential(message),
            13 => ApiError::Download(message),
            14 => ApiError::Upload(message),
            15 => ApiError::NoSuchDevice(message),
            16 => ApiError::Enable(message),
            _ => ApiError::Internal(message),
        }
    }

    /// Suppress immediate reconnect churn. Only `ConnectError` sets this by
    /// default.
    pub fn dampen_reconnect(&self) -> bool {
        matches!(self, ApiError::Connect(_))
    }

    /// Force the session to disconnect after this error. `CommandError` sets
    /// this by default.
    pub fn disconnect_on_error(&self) -> bool {
        matches!(self, ApiError::Command { .. })
    }

    /// The session should attempt one reconnect-and-retry cycle.
    /// `EOFError` sets this by default; a `CommandError` raised from a
    /// mid-command transport EOF sets it explicitly too (see
    /// `From<ConnectError> for ApiError` below).
    pub fn retry(&self) -> bool {
        matches!(self, ApiError::Eof | ApiError::Command { retry: true, .. })
    }
}

/// Lower-level state-machine/transport failures raised before they are
/// classified into an [`ApiError`] by the device driver layer.
#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("unreachable state {0}")]
    UnreachableState(String),

    #[error("target state does not exist")]
    TargetStateNotExistError,

    #[error("{0} no exit command")]
    NoExitCommandError(String),

    #[error("channel disconnected while waiting for prompt")]
    ChannelDisconnectError,

    #[error("connection closed")]
    ConnectClosedError,

    #[error("exec command timeout: {0}")]
    ExecTimeout(String),

    #[error("connection initialization timeout: {0}")]
    InitTimeout(String),

    #[error("invalid device handler config: {0}")]
    InvalidDeviceHandlerConfig(String),

    #[error("peer closed connection")]
    Eof,

    #[error("authentication rejected")]
    AuthenticationRejected,

    #[error("enable rejected")]
    EnableRejected,

    #[error("async ssh2 error: {0}")]
    Ssh2Error(#[from] async_ssh2_tokio::Error),

    #[error("russh error: {0}")]
    RusshError(#[from] russh::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl From<ConnectError> for ApiError {
    /// Classify a transport/state-machine failure into the user-visible
    /// tier. This conversion is for failures raised *after* a session is
    /// already connected (mid-command). A peer closing the channel
    /// mid-command is still a `CommandError` on the wire (code 10, matching
    /// the original agent, which never raises its own `EOFError` for this
    /// case) but carries `retry = true` so the session retries once after
    /// reconnecting; every other failure is a plain non-retrying
    /// `CommandError`. Connect-phase failures (dial, login, enable) are
    /// classified directly by `Device::connect_one`, which knows which phase
    /// failed and does not go through this impl.
    fn from(err: ConnectError) -> Self {
        match err {
            e @ (ConnectError::Eof | ConnectError::ChannelDisconnectError) => {
                ApiError::Command { message: e.to_string(), retry: true }
            }
            ConnectError::ExecTimeout(msg) | ConnectError::InitTimeout(msg) => {
                ApiError::Command { message: msg, retry: false }
            }
            other => ApiError::Command { message: other.to_string(), retry: false },
        }
    }
}

/// Fatal, startup-time infrastructure errors. These are surfaced to the
/// operator directly, never mapped to an RPC error code.
#[derive(Error, Debug)]
pub enum InfraError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("credential error: {0}")]
    Credential(String),

    #[error("unknown file format: {0}")]
    UnknownFileFormat(String),
}
