//! Payload fingerprints
//!
//! Two Murmur3 (x86, 32-bit) passes with different seeds, packed into one
//! `u64`. The suppression journal keys on the fingerprint instead of keeping
//! whole payloads around. Zero is never produced.

const SEED_LO: u32 = 0x9e37_79b9;
const SEED_HI: u32 = 0x85eb_ca6b;

const C1: u32 = 0xcc9e_2d51;
const C2: u32 = 0x1b87_3593;

#[inline]
fn scramble(k: u32) -> u32 {
    k.wrapping_mul(C1).rotate_left(15).wrapping_mul(C2)
}

#[inline]
fn avalanche(mut h: u32) -> u32 {
    h ^= h >> 16;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2_ae35);
    h ^ (h >> 16)
}

/// Murmur3 x86 32-bit.
pub fn murmur3_32(data: &[u8], seed: u32) -> u32 {
    let mut blocks = data.chunks_exact(4);
    let mut h = blocks.by_ref().fold(seed, |h, block| {
        let k = u32::from_le_bytes([block[0], block[1], block[2], block[3]]);
        (h ^ scramble(k)).rotate_left(13).wrapping_mul(5).wrapping_add(0xe654_6b64)
    });

    let tail = blocks.remainder();
    if !tail.is_empty() {
        let k = tail.iter().rev().fold(0u32, |k, &byte| (k << 8) | u32::from(byte));
        h ^= scramble(k);
    }

    avalanche(h ^ data.len() as u32)
}

/// Fingerprint of a script payload.
pub fn fingerprint(content: &str) -> u64 {
    let bytes = content.as_bytes();
    let lo = murmur3_32(bytes, SEED_LO);
    let hi = murmur3_32(bytes, SEED_HI);
    match (u64::from(hi) << 32) | u64::from(lo) {
        0 => 1,
        packed => packed,
    }
}
