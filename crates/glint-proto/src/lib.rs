//! # glint-proto
//!
//! Wire protocol for Glint BLE devices: dice, charging cases and
//! multi-purpose controllers.
//!
//! Every message is a type tag byte followed by a payload described by a
//! static byte-layout table (see [`schema`]). Each device kind has its own
//! message registry with firmware-defined numbering ([`die`], [`charger`],
//! [`mpc`]) behind the common [`codec::ProtocolCodec`] interface, which the
//! connection layer (`glint-link`) is generic over.
//!
//! Identification responses come in two shapes, distinguished purely by
//! payload length: a legacy fixed-width struct from old firmware, and the
//! current sequence of self-sized chunks ([`chunk`], [`ident`]) that lets
//! either end of the link evolve its schema without breaking the other.
//!
//! This crate does no I/O and knows nothing about connections.

pub mod charger;
pub mod chunk;
pub mod codec;
pub mod constants;
pub mod die;
pub mod hash;
pub mod ident;
pub mod mpc;
pub mod schema;
pub mod values;

pub use codec::ProtocolCodec;
pub use hash::content_hash;
pub use ident::ApiVersions;
pub use schema::DecodeError;
