//! # notch — network-device access proxy
//!
//! `notch` multiplexes RPC-driven access to network devices (routers,
//! switches, firewalls) over SSH, Telnet, and legacy command-line SSH,
//! presenting a JSON-RPC surface that hides per-vendor login/enable/pager
//! dialects behind one `command(device, text, mode?)` call.
//!
//! ## Layout
//!
//! - [`transport`] — the regex-expect byte-stream contract (SSHv2 shell,
//!   Telnet, command-line SSH).
//! - [`device`] — per-vendor login/enable/command dialect on top of
//!   [`device::handler::DeviceHandler`]'s state machine.
//! - [`credentials`] — the YAML-backed, regex-matched login store.
//! - [`cache`] — the generic, callback-populated/expired LRU cache backing
//!   both the registry and the session cache.
//! - [`registry`] — `router.db` and DNS TXT device directories.
//! - [`session`] — one device's connection lifecycle and serialized
//!   request path.
//! - [`controller`] — routes requests to sessions, owns the session cache,
//!   sweeps idle sessions.
//! - [`rpc`] — the JSON-RPC 2.0 HTTP surface.
//! - [`client`] — the load-balancing client transport.
//! - [`config`] — agent-level YAML configuration.
//! - [`error`] — the two-tier `ApiError`/`InfraError` taxonomy.

pub mod cache;
pub mod client;
pub mod config;
pub mod controller;
pub mod credentials;
pub mod device;
pub mod error;
pub mod registry;
pub mod rpc;
pub mod session;
pub mod transport;
