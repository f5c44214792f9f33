//! Protocol constants shared with the device firmware.

use std::time::Duration;

/// Largest payload the firmware accepts in a single message. Bulk transfers
/// split their data into chunks of at most this size.
pub const MAX_MESSAGE_SIZE: usize = 100;

/// Face mask selecting every face of a die.
pub const FACE_MASK_ALL: u32 = 0xFFFF_FFFF;

/// Maximum byte length of a device name, not counting the NUL terminator.
pub const MAX_NAME_BYTE_SIZE: usize = 31;

/// Default timeout when waiting for a message acknowledgment.
pub const ACK_MESSAGE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default timeout for a write request on the session.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// API version implemented by this library.
pub const API_VERSION: u16 = 0x0100;

/// Oldest firmware API version this library can talk to.
pub const COMPAT_API_VERSION: u16 = 0x0100;

/// Version reported for firmware old enough to predate version negotiation
/// (it identifies itself with the legacy fixed-size layout).
pub const LEGACY_API_VERSION: u16 = 0x0100;
