//! Byte-layout schema engine for Glint device messages.
//!
//! Every message the firmware understands is described by a static field
//! table (its *layout*) and serialized by one generic engine. The wire
//! format per message is:
//!
//! ```text
//! [type tag: 1 byte][field 0][field 1]...[field N]
//! ```
//!
//! Fields are little-endian integers of 1, 2 or 4 bytes (unsigned or two's
//! complement signed), fixed-width zero-padded byte blocks, fixed-width
//! null-padded strings, or a terminator-delimited string read to a NUL byte
//! or the end of the buffer. A field may declare trailing padding bytes.
//!
//! Decoding is tolerant of short buffers: older firmware may send fewer
//! trailing fields than the current schema declares, in which case the
//! remaining fields keep their default values and a warning is logged. The
//! one hard requirement is that the leading type-tag byte matches the tag of
//! the message being decoded.

use thiserror::Error;
use tracing::warn;

/// Errors raised while decoding a message buffer.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// The buffer is empty; even a bare message carries its type tag.
    #[error("cannot decode an empty buffer")]
    Empty,

    /// The leading byte is not a known message type for this device kind.
    #[error("unknown message type 0x{0:02x}")]
    UnknownKind(u8),

    /// The leading byte does not match the tag registered for the decoded
    /// message type.
    #[error("message type mismatch: buffer starts with 0x{got:02x} but expected 0x{expected:02x}")]
    TypeMismatch { expected: u8, got: u8 },
}

// ── Field descriptors ─────────────────────────────────────────────────────────

/// Numeric wire representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumFormat {
    Unsigned,
    /// Two's complement.
    Signed,
}

/// How a field's value maps to bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Little-endian integer of the given byte width (1, 2 or 4).
    Num { width: u8, format: NumFormat },
    /// Fixed-size block of raw bytes, zero-padded up to `width`.
    Bytes { width: u16 },
    /// Fixed-width UTF-8 string, null-padded up to `width`.
    Str { width: u16 },
    /// Variable-length UTF-8 string, read until a NUL byte or the end of
    /// the buffer. May only appear as the last field of a layout.
    TermStr,
}

/// One entry of a message layout. The name is only used in diagnostics.
#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub name: &'static str,
    pub kind: FieldKind,
    /// Zero bytes inserted after the field on the wire.
    pub padding: u8,
}

impl Field {
    pub const fn u8(name: &'static str) -> Self {
        Self::num(name, 1, NumFormat::Unsigned)
    }

    pub const fn u16(name: &'static str) -> Self {
        Self::num(name, 2, NumFormat::Unsigned)
    }

    pub const fn u32(name: &'static str) -> Self {
        Self::num(name, 4, NumFormat::Unsigned)
    }

    pub const fn i8(name: &'static str) -> Self {
        Self::num(name, 1, NumFormat::Signed)
    }

    pub const fn i16(name: &'static str) -> Self {
        Self::num(name, 2, NumFormat::Signed)
    }

    pub const fn i32(name: &'static str) -> Self {
        Self::num(name, 4, NumFormat::Signed)
    }

    /// Booleans travel as a single unsigned byte.
    pub const fn bool(name: &'static str) -> Self {
        Self::u8(name)
    }

    pub const fn bytes(name: &'static str, width: u16) -> Self {
        Self {
            name,
            kind: FieldKind::Bytes { width },
            padding: 0,
        }
    }

    pub const fn string(name: &'static str, width: u16) -> Self {
        Self {
            name,
            kind: FieldKind::Str { width },
            padding: 0,
        }
    }

    pub const fn term_string(name: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::TermStr,
            padding: 0,
        }
    }

    /// Adds trailing padding bytes after the field.
    pub const fn padded(mut self, padding: u8) -> Self {
        self.padding = padding;
        self
    }

    const fn num(name: &'static str, width: u8, format: NumFormat) -> Self {
        Self {
            name,
            kind: FieldKind::Num { width, format },
            padding: 0,
        }
    }

    /// Fixed wire width of this field including padding. Terminator-delimited
    /// strings contribute nothing to the fixed size.
    pub const fn fixed_width(&self) -> usize {
        let data = match self.kind {
            FieldKind::Num { width, .. } => width as usize,
            FieldKind::Bytes { width } | FieldKind::Str { width } => width as usize,
            FieldKind::TermStr => 0,
        };
        data + self.padding as usize
    }
}

/// Sum of the fixed widths of all fields in a layout.
pub const fn fixed_size(fields: &[Field]) -> usize {
    let mut total = 0;
    let mut i = 0;
    while i < fields.len() {
        total += fields[i].fixed_width();
        i += 1;
    }
    total
}

// ── Wire traits ───────────────────────────────────────────────────────────────

/// A record whose fields serialize according to a static layout table.
///
/// `write_fields` and `read_fields` must visit the fields in the exact order
/// they are declared in [`Wire::LAYOUT`]; the writer and reader pair each
/// call with the next layout entry.
pub trait Wire: Default {
    const LAYOUT: &'static [Field];

    fn write_fields(&self, w: &mut FieldWriter<'_>);
    fn read_fields(&mut self, r: &mut FieldReader<'_>);
}

/// A top-level message, identified on the wire by its leading type tag.
pub trait Message: Wire {
    const TAG: u8;

    /// Minimum serialized size: the tag byte plus all fixed-width fields.
    const WIRE_SIZE: usize = 1 + fixed_size(Self::LAYOUT);
}

// ── Serialization ─────────────────────────────────────────────────────────────

/// Serializes a message: type tag followed by every field at its declared
/// width, format and padding.
pub fn serialize<T: Message>(msg: &T) -> Vec<u8> {
    let mut buf = Vec::with_capacity(T::WIRE_SIZE);
    buf.push(T::TAG);
    let mut w = FieldWriter::new(&mut buf, T::LAYOUT);
    msg.write_fields(&mut w);
    debug_assert!(
        w.exhausted(),
        "layout for {} has unwritten fields",
        std::any::type_name::<T>()
    );
    buf
}

/// Deserializes a message of a known type.
///
/// The leading byte must equal [`Message::TAG`]; a mismatch is a hard error.
/// A buffer shorter than the layout leaves the unread fields at their default
/// values (older firmware compatibility) and only logs a warning, as do
/// unread trailing bytes.
pub fn deserialize<T: Message>(bytes: &[u8]) -> Result<T, DecodeError> {
    let Some(&tag) = bytes.first() else {
        return Err(DecodeError::Empty);
    };
    if tag != T::TAG {
        return Err(DecodeError::TypeMismatch {
            expected: T::TAG,
            got: tag,
        });
    }
    let mut msg = T::default();
    let mut r = FieldReader::new(&bytes[1..], T::LAYOUT);
    msg.read_fields(&mut r);
    if let Some(field) = r.truncated_at() {
        warn!(
            message = std::any::type_name::<T>(),
            field,
            got = bytes.len(),
            expected = T::WIRE_SIZE,
            "buffer too short, trailing fields left at defaults"
        );
    } else if r.remaining() > 0 {
        warn!(
            message = std::any::type_name::<T>(),
            unread = r.remaining(),
            "trailing bytes were not read"
        );
    }
    Ok(msg)
}

// ── Field writer ──────────────────────────────────────────────────────────────

/// Writes field values into a buffer, pairing each call with the next entry
/// of the layout table.
pub struct FieldWriter<'a> {
    buf: &'a mut Vec<u8>,
    fields: &'static [Field],
    index: usize,
}

impl<'a> FieldWriter<'a> {
    pub fn new(buf: &'a mut Vec<u8>, fields: &'static [Field]) -> Self {
        Self {
            buf,
            fields,
            index: 0,
        }
    }

    pub fn exhausted(&self) -> bool {
        self.index == self.fields.len()
    }

    fn next_field(&mut self) -> Field {
        debug_assert!(
            self.index < self.fields.len(),
            "more field writes than layout entries"
        );
        let field = self.fields[self.index.min(self.fields.len() - 1)];
        self.index += 1;
        field
    }

    fn pad(&mut self, padding: u8) {
        for _ in 0..padding {
            self.buf.push(0);
        }
    }

    /// Writes a numeric field. The value is truncated to the declared width;
    /// two's complement representation covers the signed formats.
    pub fn put<V: Into<i64>>(&mut self, value: V) {
        let field = self.next_field();
        let FieldKind::Num { width, .. } = field.kind else {
            debug_assert!(false, "field {} is not numeric", field.name);
            return;
        };
        let raw = (value.into() as u64).to_le_bytes();
        self.buf.extend_from_slice(&raw[..width as usize]);
        self.pad(field.padding);
    }

    pub fn put_bool(&mut self, value: bool) {
        self.put(u8::from(value));
    }

    /// Writes a fixed-size byte block, zero-padded up to the declared width.
    pub fn put_bytes(&mut self, data: &[u8]) {
        let field = self.next_field();
        let FieldKind::Bytes { width } = field.kind else {
            debug_assert!(false, "field {} is not a byte block", field.name);
            return;
        };
        let take = data.len().min(width as usize);
        self.buf.extend_from_slice(&data[..take]);
        for _ in take..width as usize {
            self.buf.push(0);
        }
        self.pad(field.padding);
    }

    /// Writes a string field: null-padded to the declared width for fixed
    /// strings, UTF-8 bytes plus a NUL terminator for variable ones.
    pub fn put_str(&mut self, value: &str) {
        let field = self.next_field();
        match field.kind {
            FieldKind::Str { width } => {
                let bytes = value.as_bytes();
                let take = bytes.len().min(width as usize);
                self.buf.extend_from_slice(&bytes[..take]);
                for _ in take..width as usize {
                    self.buf.push(0);
                }
            }
            FieldKind::TermStr => {
                self.buf.extend_from_slice(value.as_bytes());
                self.buf.push(0);
            }
            _ => debug_assert!(false, "field {} is not a string", field.name),
        }
        self.pad(field.padding);
    }
}

// ── Field reader ──────────────────────────────────────────────────────────────

/// Reads field values from a buffer, pairing each call with the next entry
/// of the layout table.
///
/// Once the buffer runs short the reader stops consuming: every further read
/// returns the type's default and the truncation point is recorded for the
/// caller to report.
pub struct FieldReader<'a> {
    data: &'a [u8],
    pos: usize,
    fields: &'static [Field],
    index: usize,
    truncated_at: Option<&'static str>,
}

impl<'a> FieldReader<'a> {
    pub fn new(data: &'a [u8], fields: &'static [Field]) -> Self {
        Self {
            data,
            pos: 0,
            fields,
            index: 0,
            truncated_at: None,
        }
    }

    /// Name of the first field that could not be read, if any.
    pub fn truncated_at(&self) -> Option<&'static str> {
        self.truncated_at
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn next_field(&mut self) -> Field {
        debug_assert!(
            self.index < self.fields.len(),
            "more field reads than layout entries"
        );
        let field = self.fields[self.index.min(self.fields.len() - 1)];
        self.index += 1;
        field
    }

    fn skip_padding(&mut self, padding: u8) {
        self.pos = (self.pos + padding as usize).min(self.data.len());
    }

    /// Reads a numeric field, sign-extending signed formats.
    pub fn num(&mut self) -> i64 {
        let field = self.next_field();
        let FieldKind::Num { width, format } = field.kind else {
            debug_assert!(false, "field {} is not numeric", field.name);
            return 0;
        };
        let width = width as usize;
        if self.truncated_at.is_some() || self.remaining() < width {
            self.truncated_at.get_or_insert(field.name);
            return 0;
        }
        let mut raw = [0u8; 8];
        raw[..width].copy_from_slice(&self.data[self.pos..self.pos + width]);
        self.pos += width;
        self.skip_padding(field.padding);
        let value = u64::from_le_bytes(raw);
        match format {
            NumFormat::Unsigned => value as i64,
            NumFormat::Signed => {
                // Sign-extend from the declared width.
                let shift = 64 - 8 * width as u32;
                ((value << shift) as i64) >> shift
            }
        }
    }

    pub fn u8(&mut self) -> u8 {
        self.num() as u8
    }

    pub fn u16(&mut self) -> u16 {
        self.num() as u16
    }

    pub fn u32(&mut self) -> u32 {
        self.num() as u32
    }

    pub fn i8(&mut self) -> i8 {
        self.num() as i8
    }

    pub fn i16(&mut self) -> i16 {
        self.num() as i16
    }

    pub fn i32(&mut self) -> i32 {
        self.num() as i32
    }

    pub fn bool(&mut self) -> bool {
        self.num() != 0
    }

    /// Reads a fixed-size byte block; a short buffer yields the bytes that
    /// are present.
    pub fn bytes(&mut self) -> Vec<u8> {
        let field = self.next_field();
        let FieldKind::Bytes { width } = field.kind else {
            debug_assert!(false, "field {} is not a byte block", field.name);
            return Vec::new();
        };
        if self.truncated_at.is_some() {
            return Vec::new();
        }
        let take = self.remaining().min(width as usize);
        if take < width as usize {
            self.truncated_at.get_or_insert(field.name);
        }
        let out = self.data[self.pos..self.pos + take].to_vec();
        self.pos += take;
        self.skip_padding(field.padding);
        out
    }

    /// Reads a string field. Fixed-width strings are trimmed of their null
    /// padding; terminator-delimited strings read to a NUL byte or the end
    /// of the buffer.
    pub fn string(&mut self) -> String {
        let field = self.next_field();
        if self.truncated_at.is_some() {
            return String::new();
        }
        let raw = match field.kind {
            FieldKind::Str { width } => {
                let take = self.remaining().min(width as usize);
                if take < width as usize {
                    self.truncated_at.get_or_insert(field.name);
                }
                let slice = &self.data[self.pos..self.pos + take];
                self.pos += take;
                let end = slice.iter().position(|&b| b == 0).unwrap_or(slice.len());
                &slice[..end]
            }
            FieldKind::TermStr => {
                let slice = &self.data[self.pos..];
                let end = slice.iter().position(|&b| b == 0).unwrap_or(slice.len());
                // Consume the terminator too when present.
                self.pos += (end + 1).min(slice.len());
                &slice[..end]
            }
            _ => {
                debug_assert!(false, "field {} is not a string", field.name);
                return String::new();
            }
        };
        let value = String::from_utf8_lossy(raw).into_owned();
        self.skip_padding(field.padding);
        value
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
