//! Self-describing chunks for composite identification messages.
//!
//! The identification response is a type tag followed by a sequence of
//! chunks. Each chunk leads with a 1-byte declared size (the size byte
//! included) so a decoder built against an older or newer schema can still
//! walk the sequence: it reads at most the bytes it knows about and then
//! advances by the *declared* size, keeping later chunks aligned.

use tracing::warn;

use crate::schema::{fixed_size, Field, FieldReader, FieldWriter, Wire};

/// A chunk of a composite identification message.
///
/// The first layout entry must be the 1-byte declared chunk size. Chunks
/// holding a variable-length tail (such as a device name) set
/// [`Chunk::EXPECTED_SIZE`] to 0, meaning "whatever the sender declared".
pub trait Chunk: Wire {
    const EXPECTED_SIZE: usize = fixed_size(Self::LAYOUT);
}

/// Walks the chunk sequence of a composite message payload.
pub struct ChunkReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ChunkReader<'a> {
    /// `payload` starts at the first chunk (the message type tag already
    /// consumed).
    pub fn new(payload: &'a [u8]) -> Self {
        Self { data: payload, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Decodes the next chunk.
    ///
    /// A size mismatch between the declared and expected chunk size is
    /// reported as a warning, never an error: older firmware sends shorter
    /// chunks (the unread trailing fields keep their defaults) and newer
    /// firmware may send longer ones (the extra bytes are skipped). The
    /// cursor always advances by the declared size.
    pub fn read_chunk<T: Chunk>(&mut self, what: &'static str) -> T {
        if self.remaining() == 0 {
            warn!(chunk = what, "chunk missing from identification payload");
            return T::default();
        }
        let declared = self.data[self.pos] as usize;
        if T::EXPECTED_SIZE > 0 && declared != T::EXPECTED_SIZE {
            warn!(
                chunk = what,
                declared,
                expected = T::EXPECTED_SIZE,
                "chunk size mismatch"
            );
        }
        let take = if T::EXPECTED_SIZE == 0 {
            declared
        } else {
            declared.min(T::EXPECTED_SIZE)
        };
        let end = (self.pos + take).min(self.data.len());
        if end - self.pos < take {
            warn!(chunk = what, "chunk extends past the end of the payload");
        }
        let mut chunk = T::default();
        let mut r = FieldReader::new(&self.data[self.pos..end], T::LAYOUT);
        chunk.read_fields(&mut r);
        // Advance by the declared size so the next chunk stays aligned even
        // when this one was longer than our schema.
        self.pos = (self.pos + declared.max(1)).min(self.data.len());
        chunk
    }
}

/// Appends a chunk to a composite message buffer.
pub fn write_chunk<T: Chunk>(buf: &mut Vec<u8>, chunk: &T) {
    let mut w = FieldWriter::new(buf, T::LAYOUT);
    chunk.write_fields(&mut w);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct FixedChunk {
        chunk_size: u8,
        a: u16,
        b: u32,
    }

    impl Default for FixedChunk {
        fn default() -> Self {
            Self {
                chunk_size: Self::EXPECTED_SIZE as u8,
                a: 0,
                b: 0,
            }
        }
    }

    impl Wire for FixedChunk {
        const LAYOUT: &'static [Field] = &[
            Field::u8("chunk_size"),
            Field::u16("a"),
            Field::u32("b"),
        ];

        fn write_fields(&self, w: &mut FieldWriter<'_>) {
            w.put(self.chunk_size);
            w.put(self.a);
            w.put(self.b);
        }

        fn read_fields(&mut self, r: &mut FieldReader<'_>) {
            self.chunk_size = r.u8();
            self.a = r.u16();
            self.b = r.u32();
        }
    }

    impl Chunk for FixedChunk {}

    #[derive(Debug, Clone, Default, PartialEq)]
    struct NameChunk {
        chunk_size: u8,
        name: String,
    }

    impl Wire for NameChunk {
        const LAYOUT: &'static [Field] =
            &[Field::u8("chunk_size"), Field::term_string("name")];

        fn write_fields(&self, w: &mut FieldWriter<'_>) {
            w.put(self.chunk_size);
            w.put_str(&self.name);
        }

        fn read_fields(&mut self, r: &mut FieldReader<'_>) {
            self.chunk_size = r.u8();
            self.name = r.string();
        }
    }

    impl Chunk for NameChunk {
        // Size depends on the name; trust the sender's declaration.
        const EXPECTED_SIZE: usize = 0;
    }

    #[test]
    fn test_chunk_round_trip() {
        let chunk = FixedChunk {
            chunk_size: FixedChunk::EXPECTED_SIZE as u8,
            a: 0x0102,
            b: 0x0304_0506,
        };
        let mut buf = Vec::new();
        write_chunk(&mut buf, &chunk);
        assert_eq!(buf.len(), FixedChunk::EXPECTED_SIZE);

        let mut reader = ChunkReader::new(&buf);
        let decoded: FixedChunk = reader.read_chunk("fixed");
        assert_eq!(decoded, chunk);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_short_chunk_from_older_firmware_leaves_defaults() {
        // A 3-byte chunk: declared size 3, carrying only field `a`.
        let buf = [3u8, 0x34, 0x12, /* next chunk */ 1];
        let mut reader = ChunkReader::new(&buf);
        let decoded: FixedChunk = reader.read_chunk("fixed");
        assert_eq!(decoded.a, 0x1234);
        assert_eq!(decoded.b, 0, "field missing from the chunk stays default");
        // Cursor advanced by the declared size, not the schema size.
        assert_eq!(reader.remaining(), 1);
    }

    #[test]
    fn test_longer_chunk_from_newer_firmware_keeps_alignment() {
        let mut buf = Vec::new();
        let chunk = FixedChunk {
            a: 7,
            b: 9,
            ..FixedChunk::default()
        };
        write_chunk(&mut buf, &chunk);
        // Pretend the firmware appended two new trailing bytes.
        let declared = (FixedChunk::EXPECTED_SIZE + 2) as u8;
        buf[0] = declared;
        buf.extend_from_slice(&[0xEE, 0xFF]);
        // And a name chunk after it.
        write_chunk(
            &mut buf,
            &NameChunk {
                chunk_size: 4,
                name: "ab".to_string(),
            },
        );

        let mut reader = ChunkReader::new(&buf);
        let fixed: FixedChunk = reader.read_chunk("fixed");
        assert_eq!(fixed.a, 7);
        assert_eq!(fixed.b, 9);
        let name: NameChunk = reader.read_chunk("name");
        assert_eq!(name.name, "ab");
    }

    #[test]
    fn test_name_chunk_uses_declared_size() {
        let mut buf = Vec::new();
        write_chunk(
            &mut buf,
            &NameChunk {
                chunk_size: 7, // size byte + 5 name bytes + terminator
                name: "gauss".to_string(),
            },
        );
        let mut reader = ChunkReader::new(&buf);
        let decoded: NameChunk = reader.read_chunk("name");
        assert_eq!(decoded.name, "gauss");
    }

    #[test]
    fn test_missing_chunk_yields_default() {
        let mut reader = ChunkReader::new(&[]);
        let decoded: FixedChunk = reader.read_chunk("fixed");
        assert_eq!(decoded, FixedChunk::default());
    }
}
