//! Key to hash-slot mapping.
//!
//! Keys are routed with the Redis Cluster algorithm:
//! `slot = crc16(hash_tag_or_key) % 16384`
//!
//! CRC16 here is the XMODEM variant (polynomial 0x1021, initial value 0, no
//! reflection), so routing agrees with what the nodes themselves compute.
//!
//! # Hash Tags
//!
//! If a key contains `{`, and a `}` follows it with at least one byte in
//! between, only the bytes between the first `{` and the first `}` after it
//! are hashed. `{user1000}.following` and `{user1000}.followers` therefore
//! share a slot.

/// Number of hash slots.
pub const SLOT_COUNT: u16 = 16384;

/// CRC16/XMODEM lookup table.
const CRC16_TABLE: [u16; 256] = build_crc16_table();

const fn build_crc16_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u16) << 8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// CRC16/XMODEM checksum.
pub fn crc16(data: &[u8]) -> u16 {
    data.iter().fold(0u16, |crc, &b| {
        (crc << 8) ^ CRC16_TABLE[(((crc >> 8) as u8) ^ b) as usize]
    })
}

/// Return the part of the key that is hashed.
pub fn hash_tag(key: &[u8]) -> &[u8] {
    let Some(open) = key.iter().position(|&b| b == b'{') else {
        return key;
    };
    match key[open + 1..].iter().position(|&b| b == b'}') {
        Some(len) if len > 0 => &key[open + 1..open + 1 + len],
        _ => key,
    }
}

/// Compute the hash slot for a key.
pub fn slot(key: &[u8]) -> u16 {
    crc16(hash_tag(key)) % SLOT_COUNT
}

/// Compute the single slot shared by all keys.
///
/// Returns `Ok(None)` for an empty key list and `Err(keys)` with every key
/// when they span more than one slot.
pub fn common_slot<'a>(keys: &[&'a [u8]]) -> Result<Option<u16>, Vec<&'a [u8]>> {
    let mut iter = keys.iter();
    let Some(first) = iter.next() else {
        return Ok(None);
    };
    let expected = slot(first);
    if iter.any(|k| slot(k) != expected) {
        return Err(keys.to_vec());
    }
    Ok(Some(expected))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc16_check_value() {
        assert_eq!(crc16(b"123456789"), 0x31C3);
        assert_eq!(crc16(b""), 0);
    }

    #[test]
    fn test_reference_slots() {
        assert_eq!(slot(b"123456789"), 12739);
        assert_eq!(slot(b"key1"), 9189);
        assert_eq!(slot(b"key2"), 4998);
        assert_eq!(slot(b"foo"), 12182);
        assert_eq!(slot(b"hello"), 866);
    }

    #[test]
    fn test_hash_tag_extraction() {
        assert_eq!(hash_tag(b"{user1000}.following"), b"user1000");
        assert_eq!(hash_tag(b"foo{}{bar}"), b"foo{}{bar}");
        assert_eq!(hash_tag(b"foo{{bar}}zap"), b"{bar");
        assert_eq!(hash_tag(b"foo{bar}{zap}"), b"bar");
        assert_eq!(hash_tag(b"a{b"), b"a{b");
        assert_eq!(hash_tag(b"plain"), b"plain");
    }

    #[test]
    fn test_same_tag_same_slot() {
        for suffix in ["following", "followers", "", "x{y}"] {
            let key = format!("{{user1000}}.{}", suffix);
            assert_eq!(slot(key.as_bytes()), slot(b"user1000"));
        }
        assert_eq!(slot(b"{user1000}.following"), 3443);
    }

    #[test]
    fn test_slot_is_deterministic_and_in_range() {
        for i in 0..2000 {
            let key = format!("key-{}", i);
            let s = slot(key.as_bytes());
            assert_eq!(s, slot(key.as_bytes()));
            assert!(s < SLOT_COUNT);
        }
    }

    #[test]
    fn test_common_slot() {
        assert_eq!(common_slot(&[]), Ok(None));
        assert_eq!(
            common_slot(&[b"{tag}a".as_slice(), b"{tag}b"]),
            Ok(Some(slot(b"tag")))
        );
        let err = common_slot(&[b"key1".as_slice(), b"key2"]).unwrap_err();
        assert_eq!(err.len(), 2);
    }
}
