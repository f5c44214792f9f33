//! Error types of the connection layer.
//!
//! Failures keep their kind through propagation so callers can distinguish
//! retryable conditions (timeouts, lost links) from fatal ones (identity
//! mismatch, device out of memory) without string matching.

use std::time::Duration;

use thiserror::Error;

use crate::link::ConnectionStatus;

/// Errors surfaced by a [`crate::session::DeviceSession`] implementation.
#[derive(Debug, Error)]
pub enum SessionError {
    /// An operation was attempted while the session is not connected.
    #[error("session is not connected")]
    NotConnected,

    /// The underlying transport failed (platform BLE stack error).
    #[error("transport error: {0}")]
    Transport(String),
}

/// Which side of the link is too old for a message to be sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompatSide {
    /// The library requires a newer firmware API than the device runs.
    Library,
    /// The firmware requires a newer library API than this one.
    Firmware,
}

/// Errors from sending a message or waiting for one.
#[derive(Debug, Error)]
pub enum MessageError {
    /// No message of the expected type arrived in time.
    #[error("timed out after {}ms waiting for {kind}", timeout.as_millis())]
    Timeout { kind: String, timeout: Duration },

    /// The link dropped while waiting for a message.
    #[error("disconnected while waiting for {kind}")]
    Disconnected { kind: String },

    /// The message was refused by the version compatibility gate.
    #[error(
        "message {kind} cannot be sent: library API {lib_version:#06x} vs \
         firmware API {fw_version:#06x} ({side:?} side too old)"
    )]
    Incompatible {
        kind: String,
        side: CompatSide,
        lib_version: u16,
        fw_version: u16,
    },

    /// A device name must have at least one character.
    #[error("device name cannot be empty")]
    EmptyName,

    /// The write on the session failed.
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Errors from the connection sequence.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// The transport-level connection did not come up in time.
    #[error("connection timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// The status changed mid-sequence, e.g. a concurrent disconnect.
    #[error("connection cancelled (link is {status:?})")]
    Cancelled { status: ConnectionStatus },

    /// The device reported a different identifier than expected.
    #[error("device identity mismatch: expected {expected:#010x}, got {got:#010x}")]
    IdentityMismatch { expected: u32, got: u32 },

    /// The identification exchange failed.
    #[error("identification failed: {0}")]
    Identification(#[from] MessageError),

    /// The session failed while connecting or subscribing.
    #[error("session error while connecting: {0}")]
    Session(#[from] SessionError),

    /// Any other connection failure.
    #[error("connection failed: {0}")]
    Other(String),
}

/// Errors from a bulk data transfer.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The device does not have enough storage for the payload. Fatal, not
    /// retried.
    #[error("device has not enough storage for {size} bytes")]
    OutOfMemory { size: usize },

    /// The device acknowledged every chunk but never confirmed having
    /// validated and applied the data. Distinct from a chunk-level timeout:
    /// on-device validation can take longer than one round-trip.
    #[error("timed out after {}ms waiting for the transfer confirmation", timeout.as_millis())]
    CompletionTimeout { timeout: Duration },

    /// Only one transfer may run on a link at a time.
    #[error("a data transfer is already in progress")]
    InProgress,

    /// The payload to transfer is empty.
    #[error("transfer data is empty")]
    EmptyData,

    /// The device answered the setup request with an unknown result code.
    #[error("unexpected transfer setup result {code}")]
    UnexpectedAck { code: u8 },

    /// A message exchange within the transfer failed (chunk ack timeout,
    /// disconnection, compatibility gate).
    #[error(transparent)]
    Message(#[from] MessageError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_the_kind_waited_for() {
        let err = MessageError::Timeout {
            kind: "BulkSetupAck".to_string(),
            timeout: Duration::from_millis(5000),
        };
        let text = err.to_string();
        assert!(text.contains("5000ms"));
        assert!(text.contains("BulkSetupAck"));
    }

    #[test]
    fn test_transfer_error_wraps_message_error() {
        let err: TransferError = MessageError::Disconnected {
            kind: "BulkDataAck".to_string(),
        }
        .into();
        assert!(matches!(err, TransferError::Message(_)));
    }

    #[test]
    fn test_identity_mismatch_formats_hex_ids() {
        let err = ConnectError::IdentityMismatch {
            expected: 0x0102_0304,
            got: 0x0A0B_0C0D,
        };
        let text = err.to_string();
        assert!(text.contains("0x01020304"));
        assert!(text.contains("0x0a0b0c0d"));
    }
}
