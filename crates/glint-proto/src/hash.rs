//! 32-bit content hash used by the data transfer protocol.
//!
//! The firmware identifies an uploaded data set by this hash: the transfer
//! setup message advertises it and the device compares it against the data
//! it already holds to short-circuit redundant uploads. The function must
//! therefore match the firmware's implementation exactly (a DJB2 xor
//! variant), not a general-purpose digest.

/// Computes the content hash of a payload.
pub fn content_hash(data: &[u8]) -> u32 {
    let mut hash: u32 = 5381;
    for &byte in data {
        hash = hash.wrapping_mul(33) ^ u32::from(byte);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_deterministic() {
        let data = b"glint animation data";
        assert_eq!(content_hash(data), content_hash(data));
    }

    #[test]
    fn test_hash_differs_for_different_payloads() {
        assert_ne!(content_hash(b"aaaa"), content_hash(b"aaab"));
    }

    #[test]
    fn test_hash_of_empty_payload_is_seed() {
        assert_eq!(content_hash(&[]), 5381);
    }
}
