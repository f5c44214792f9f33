//! Codec interface implemented once per device kind.

use std::fmt;
use std::hash::Hash;

use crate::schema::DecodeError;

/// Encodes and decodes the message registry of one device kind.
///
/// The connection layer is generic over this trait: dice, chargers and
/// controllers each provide their own registry but share the same link state
/// machine, request/response plumbing and bulk transfer protocol.
pub trait ProtocolCodec: Send + Sync + 'static {
    /// Sum type over every message of the registry.
    type Msg: Clone + fmt::Debug + PartialEq + Send + Sync + 'static;
    /// Message type tag.
    type Kind: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static;

    /// Serializes a message; the first byte of the result is the type tag.
    fn encode(msg: &Self::Msg) -> Vec<u8>;

    /// Decodes a buffer received from the device.
    fn decode(bytes: &[u8]) -> Result<Self::Msg, DecodeError>;

    /// The type tag kind of a message.
    fn kind_of(msg: &Self::Msg) -> Self::Kind;
}
