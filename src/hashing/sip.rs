//! SipHash-2-4 with a process-global random key.
//!
//! The key is drawn from the OS RNG the first time any hash is computed,
//! so hash values are stable within a process but differ between runs.
//! The streaming interface ([`SipHash`]) is used where the total input
//! size is known up front and the input arrives as 64-bit words (text
//! grapheme sequences). [`Sip24Hasher`] adapts the same core to
//! `std::hash::Hasher` for arbitrary keys.

use std::hash::Hasher;
use std::sync::OnceLock;

static HASH_KEY: OnceLock<[u64; 2]> = OnceLock::new();

/// The process-global 128-bit SipHash key, randomized on first use.
pub fn hash_key() -> [u64; 2] {
    *HASH_KEY.get_or_init(|| {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        [rng.gen(), rng.gen()]
    })
}

#[inline(always)]
fn rotl(x: u64, b: u32) -> u64 {
    x.rotate_left(b)
}

/// Streaming SipHash-2-4 state.
///
/// `init` takes the total input size in bytes; the size participates in
/// the final block, so it must be known before hashing starts.
#[derive(Clone, Copy)]
pub struct SipHash {
    v0: u64,
    v1: u64,
    v2: u64,
    v3: u64,
    b: u64,
}

impl SipHash {
    pub fn init(total_size: usize) -> SipHash {
        SipHash::with_key(hash_key(), total_size)
    }

    pub fn with_key(key: [u64; 2], total_size: usize) -> SipHash {
        let [k0, k1] = key;
        SipHash {
            v0: k0 ^ 0x736f6d6570736575,
            v1: k1 ^ 0x646f72616e646f6d,
            v2: k0 ^ 0x6c7967656e657261,
            v3: k1 ^ 0x7465646279746573,
            b: (total_size as u64) << 56,
        }
    }

    #[inline(always)]
    fn round(&mut self) {
        self.v0 = self.v0.wrapping_add(self.v1);
        self.v2 = self.v2.wrapping_add(self.v3);
        self.v1 = rotl(self.v1, 13) ^ self.v0;
        self.v3 = rotl(self.v3, 16) ^ self.v2;
        self.v0 = rotl(self.v0, 32);
        self.v2 = self.v2.wrapping_add(self.v1);
        self.v0 = self.v0.wrapping_add(self.v3);
        self.v1 = rotl(self.v1, 17) ^ self.v2;
        self.v3 = rotl(self.v3, 21) ^ self.v0;
        self.v2 = rotl(self.v2, 32);
    }

    /// Mix in one full 64-bit little-endian word.
    pub fn add_u64(&mut self, word: u64) {
        self.v3 ^= word;
        self.round();
        self.round();
        self.v0 ^= word;
    }

    /// Finish, mixing the final partial word (zero-padded) together with
    /// the length byte set at init time.
    pub fn finish_part(mut self, tail: u64) -> u64 {
        self.b |= tail;
        self.v3 ^= self.b;
        self.round();
        self.round();
        self.v0 ^= self.b;
        self.v2 ^= 0xff;
        for _ in 0..4 {
            self.round();
        }
        (self.v0 ^ self.v1) ^ (self.v2 ^ self.v3)
    }
}

/// One-shot SipHash-2-4 over a byte slice, using the process key.
pub fn siphash24(bytes: &[u8]) -> u64 {
    siphash24_keyed(hash_key(), bytes)
}

pub fn siphash24_keyed(key: [u64; 2], bytes: &[u8]) -> u64 {
    let mut sh = SipHash::with_key(key, bytes.len());
    let mut chunks = bytes.chunks_exact(8);
    for chunk in &mut chunks {
        let mut word = [0u8; 8];
        word.copy_from_slice(chunk);
        sh.add_u64(u64::from_le_bytes(word));
    }
    let mut tail = [0u8; 8];
    let rest = chunks.remainder();
    tail[..rest.len()].copy_from_slice(rest);
    sh.finish_part(u64::from_le_bytes(tail))
}

/// `std::hash::Hasher` adapter over the same SipHash-2-4 core, for
/// hashing arbitrary `Hash` keys in [`crate::hashing::Table`].
///
/// Unlike [`SipHash`], the total size is not known up front, so words are
/// buffered and the length byte is folded in at `finish` time (the result
/// is identical for the same byte stream).
pub struct Sip24Hasher {
    key: [u64; 2],
    words: Vec<u64>,
    tail: [u8; 8],
    tail_len: usize,
    total: usize,
}

impl Default for Sip24Hasher {
    fn default() -> Sip24Hasher {
        Sip24Hasher {
            key: hash_key(),
            words: Vec::new(),
            tail: [0; 8],
            tail_len: 0,
            total: 0,
        }
    }
}

impl Hasher for Sip24Hasher {
    fn write(&mut self, bytes: &[u8]) {
        self.total += bytes.len();
        let mut rest = bytes;
        // Top up the partial word first:
        if self.tail_len > 0 {
            let take = rest.len().min(8 - self.tail_len);
            self.tail[self.tail_len..self.tail_len + take].copy_from_slice(&rest[..take]);
            self.tail_len += take;
            rest = &rest[take..];
            if self.tail_len == 8 {
                self.words.push(u64::from_le_bytes(self.tail));
                self.tail = [0; 8];
                self.tail_len = 0;
            }
        }
        let mut chunks = rest.chunks_exact(8);
        for chunk in &mut chunks {
            let mut word = [0u8; 8];
            word.copy_from_slice(chunk);
            self.words.push(u64::from_le_bytes(word));
        }
        let remainder = chunks.remainder();
        self.tail[..remainder.len()].copy_from_slice(remainder);
        self.tail_len = remainder.len();
    }

    fn finish(&self) -> u64 {
        let mut sh = SipHash::with_key(self.key, self.total);
        for word in &self.words {
            sh.add_u64(*word);
        }
        sh.finish_part(u64::from_le_bytes(self.tail))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Reference vectors from the SipHash paper, key = 00 01 02 .. 0f,
    // message = 00 01 02 .. (len-1).
    const TEST_KEY: [u64; 2] = [0x0706050403020100, 0x0f0e0d0c0b0a0908];

    fn test_message(len: usize) -> Vec<u8> {
        (0..len as u8).collect()
    }

    #[test]
    fn reference_vectors() {
        assert_eq!(siphash24_keyed(TEST_KEY, &test_message(0)), 0x726fdb47dd0e0e31);
        assert_eq!(siphash24_keyed(TEST_KEY, &test_message(1)), 0x74f839c593dc67fd);
        assert_eq!(siphash24_keyed(TEST_KEY, &test_message(8)), 0x93f5f5799a932462);
    }

    #[test]
    fn streaming_matches_oneshot() {
        let msg = test_message(16);
        let mut sh = SipHash::with_key(TEST_KEY, 16);
        sh.add_u64(u64::from_le_bytes(msg[0..8].try_into().unwrap()));
        sh.add_u64(u64::from_le_bytes(msg[8..16].try_into().unwrap()));
        assert_eq!(sh.finish_part(0), siphash24_keyed(TEST_KEY, &msg));
    }

    #[test]
    fn hasher_matches_oneshot() {
        for len in [0, 1, 7, 8, 9, 15, 16, 33] {
            let msg = test_message(len);
            let mut hasher = Sip24Hasher {
                key: TEST_KEY,
                ..Sip24Hasher::default()
            };
            // Write in awkward chunk sizes to exercise the buffering:
            for chunk in msg.chunks(3) {
                hasher.write(chunk);
            }
            assert_eq!(hasher.finish(), siphash24_keyed(TEST_KEY, &msg), "len {len}");
        }
    }

    #[test]
    fn process_key_is_stable() {
        assert_eq!(siphash24(b"stable"), siphash24(b"stable"));
        assert_ne!(siphash24(b"a"), siphash24(b"b"));
    }
}
