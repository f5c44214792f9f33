//! # glint-link
//!
//! Connection layer for Glint BLE devices, on top of the wire protocol in
//! `glint-proto`.
//!
//! The platform BLE transport is injected as a [`session::DeviceSession`];
//! everything above it lives here:
//!
//! - [`link`] – the per-device connection state machine
//!   (disconnected → connecting → identifying → ready), message dispatch
//!   and the request/response wait plumbing, generic over the device
//!   kind's codec.
//! - [`die`], [`charger`], [`mpc`] – the adapters, each owning its cached
//!   device info with change-notifying setters and the identification
//!   handshake for both the legacy and the chunked wire shapes.
//! - [`bulk`] – the chunked, fully-acknowledged upload protocol for large
//!   payloads such as animation data sets.
//! - [`backoff`] – the exponential-backoff retry combinator applied around
//!   `connect`.
//! - [`registry`] – the explicit device-id → link registry.
//! - [`config`] – timeouts and retry policy, loadable from TOML.
//!
//! Each link runs one dispatch task; all operations are async and bounded
//! by timeouts, except the open-ended notification streams.

pub mod backoff;
pub mod bulk;
pub mod charger;
pub mod config;
pub mod die;
pub mod error;
pub mod link;
pub mod mpc;
pub mod registry;
pub mod session;

pub use backoff::with_backoff;
pub use charger::{Charger, ChargerInfo, ChargerProperty};
pub use config::{BackoffConfig, LinkConfig};
pub use die::{Die, DieInfo, DieProperty, DieScanData};
pub use error::{ConnectError, MessageError, SessionError, TransferError};
pub use link::{ConnectionStatus, LinkCore};
pub use mpc::{Mpc, MpcInfo, MpcProperty};
pub use registry::{LinkHandle, LinkRegistry};
pub use session::{DeviceSession, DisconnectReason, SessionEvent};
