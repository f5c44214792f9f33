//! Abstraction over the physical BLE link.
//!
//! The platform transport (scanning, GATT connect/write/subscribe) lives
//! outside this crate; a [`DeviceSession`] implementation adapts it to the
//! connection layer. A session is exclusively owned by one device link —
//! two links must never share one.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::SessionError;

/// Why the transport-level connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The application asked for the disconnection.
    Requested,
    /// The peripheral went away (out of range, powered down).
    LinkLoss,
}

/// Events delivered by a session after [`DeviceSession::subscribe`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A value received on the notify characteristic.
    Notification(Vec<u8>),
    /// The transport-level connection ended; no further events follow.
    Disconnected { reason: DisconnectReason },
}

/// One session with one BLE peripheral.
///
/// All methods are cancel-safe from the caller's perspective: the connection
/// layer bounds them with its own timeouts.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeviceSession: Send + Sync + 'static {
    /// Identifier assigned to the peripheral by the platform BLE stack.
    fn system_id(&self) -> &str;

    /// Name the peripheral advertised over the air, when known.
    fn advertised_name(&self) -> Option<String>;

    /// Establishes the transport-level connection.
    async fn connect(&self) -> Result<(), SessionError>;

    /// Tears the connection down. Safe to call in any state.
    async fn disconnect(&self) -> Result<(), SessionError>;

    /// Subscribes to the notify characteristic. Events arrive on the
    /// returned channel until the session disconnects.
    async fn subscribe(&self) -> Result<mpsc::Receiver<SessionEvent>, SessionError>;

    /// Writes a value to the write characteristic.
    async fn write_value(&self, data: &[u8], without_ack: bool) -> Result<(), SessionError>;
}
