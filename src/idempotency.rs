//! Idempotency key generation.
//!
//! A key is the concatenation of a nanosecond timestamp, a per-process
//! fingerprint, and a monotonically increasing counter, packed into a
//! base-32 alphabet with no padding. The counter guarantees two concurrent
//! calls in one process never collide; the timestamp and fingerprint make
//! cross-process collisions negligible.

use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

// Crockford-style alphabet: lowercase, no padding, URL- and header-safe.
const ALPHABET: &[u8; 32] = b"0123456789abcdefghjkmnpqrstvwxyz";

static SEQUENCE: AtomicU64 = AtomicU64::new(0);
static FINGERPRINT: OnceLock<u32> = OnceLock::new();

/// Produces a fresh, practically-unique, URL-safe token.
pub(crate) fn generate() -> String {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos() as u64)
        .unwrap_or(0);
    let fingerprint = *FINGERPRINT.get_or_init(|| rand::random::<u32>() ^ process::id());
    let sequence = SEQUENCE.fetch_add(1, Ordering::Relaxed);

    let mut bytes = [0u8; 20];
    bytes[..8].copy_from_slice(&timestamp.to_be_bytes());
    bytes[8..12].copy_from_slice(&fingerprint.to_be_bytes());
    bytes[12..].copy_from_slice(&sequence.to_be_bytes());
    encode_base32(&bytes)
}

fn encode_base32(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 8 / 5 + 1);
    let mut buffer: u64 = 0;
    let mut bits: u32 = 0;
    for &byte in bytes {
        buffer = (buffer << 8) | u64::from(byte);
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(ALPHABET[((buffer >> bits) & 0x1f) as usize] as char);
        }
    }
    if bits > 0 {
        out.push(ALPHABET[((buffer << (5 - bits)) & 0x1f) as usize] as char);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn keys_in_a_tight_loop_are_pairwise_distinct() {
        let keys: HashSet<String> = (0..10_000).map(|_| generate()).collect();
        assert_eq!(keys.len(), 10_000);
    }

    #[test]
    fn keys_use_only_the_base32_alphabet() {
        let key = generate();
        assert_eq!(key.len(), 32);
        assert!(key.bytes().all(|byte| ALPHABET.contains(&byte)), "{key}");
    }

    #[test]
    fn encoding_packs_five_bits_per_character() {
        assert_eq!(encode_base32(&[0]), "00");
        assert_eq!(encode_base32(&[0xff]), "zw");
        assert_eq!(encode_base32(&[0xff, 0xff, 0xff, 0xff, 0xff]), "zzzzzzzz");
    }
}
