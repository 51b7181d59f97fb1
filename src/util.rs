//! Internal utilities.

use siphasher::sip128::{Hasher128, SipHasher13};
use std::any::Any;
use std::hash::{Hash, Hasher};

/// A value paired with a precomputed 128-bit hash of itself.
///
/// Cloning and comparing a [`Prehashed`] only touches the cached hash, which
/// is what makes it cheap to use as e.g. a dedup key for pixel buffers that
/// are themselves expensive to compare byte-by-byte.
pub struct Prehashed<T: ?Sized> {
    hash: u128,
    value: T,
}

impl<T: Hash + 'static> Prehashed<T> {
    #[inline]
    pub fn new(value: T) -> Self {
        let hash = value.sip_hash();
        Self { hash, value }
    }

    pub fn hash128(&self) -> u128 {
        self.hash
    }
}

impl<T: Hash + ?Sized + 'static> Eq for Prehashed<T> {}

impl<T: Hash + ?Sized + 'static> PartialEq for Prehashed<T> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}

impl<T: ?Sized> std::ops::Deref for Prehashed<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.value
    }
}

impl<T: Hash + Clone + 'static> Clone for Prehashed<T> {
    fn clone(&self) -> Self {
        Self {
            hash: self.hash,
            value: self.value.clone(),
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Prehashed<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        self.value.fmt(f)
    }
}

impl<T: Hash + ?Sized + 'static> Hash for Prehashed<T> {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u128(self.hash);
    }
}

/// Computes a 128-bit SipHash of any hashable, `'static` value.
///
/// Used throughout the profile/transform/lookup caches to turn a fingerprint
/// string (or a tuple of fingerprint parts) into a fixed-size cache key.
pub trait SipHashable {
    fn sip_hash(&self) -> u128;
}

impl<T> SipHashable for T
where
    T: Hash + ?Sized + 'static,
{
    fn sip_hash(&self) -> u128 {
        let mut state = SipHasher13::new();
        self.type_id().hash(&mut state);
        self.hash(&mut state);
        state.finish128().as_u128()
    }
}

/// Swaps the byte order of every 16-bit sample in `buf` in place.
///
/// `buf.len()` must be even; trailing odd bytes are left untouched (callers
/// always size 16-bit sample buffers to an even length).
pub fn byte_swap_16(buf: &mut [u8]) {
    let mut i = 0;
    while i + 1 < buf.len() {
        buf.swap(i, i + 1);
        i += 2;
    }
}

/// zlib-deflates `data`.
///
/// Used both for compressing converted image XObject streams back down
/// (`spec.md` §4.7) and, via [`inflate`], for decompressing incoming
/// `FlateDecode` streams before conversion.
pub fn deflate(data: &[u8]) -> Vec<u8> {
    const COMPRESSION_LEVEL: u8 = 6;
    miniz_oxide::deflate::compress_to_vec_zlib(data, COMPRESSION_LEVEL)
}

/// zlib-inflates `data`.
pub fn inflate(data: &[u8]) -> crate::error::Result<Vec<u8>> {
    miniz_oxide::inflate::decompress_to_vec_zlib(data)
        .map_err(|e| crate::error::Error::BadInput(format!("failed to inflate stream: {e:?}")))
}

/// Formats a float the way the content-stream rewriter formats operands:
/// six decimal places, trailing zeros and a dangling decimal point
/// stripped, and anything below `1e-4` in magnitude collapsed to `"0"`
/// (`spec.md` §4.8).
pub fn format_operand(value: f32) -> String {
    if value.abs() < 1e-4 {
        return "0".to_string();
    }

    let mut s = format!("{value:.6}");
    if s.contains('.') {
        while s.ends_with('0') {
            s.pop();
        }
        if s.ends_with('.') {
            s.pop();
        }
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_swap_round_trip() {
        let mut buf = vec![1u8, 2, 3, 4, 5, 6];
        let original = buf.clone();
        byte_swap_16(&mut buf);
        byte_swap_16(&mut buf);
        assert_eq!(buf, original);
    }

    #[test]
    fn byte_swap_swaps_pairs() {
        let mut buf = vec![0x01, 0x02, 0x03, 0x04];
        byte_swap_16(&mut buf);
        assert_eq!(buf, vec![0x02, 0x01, 0x04, 0x03]);
    }

    #[test]
    fn format_operand_strips_trailing_zeros() {
        assert_eq!(format_operand(0.5), "0.5");
        assert_eq!(format_operand(1.0), "1");
        assert_eq!(format_operand(0.0), "0");
        assert_eq!(format_operand(0.00005), "0");
        assert_eq!(format_operand(0.996_078), "0.996078");
    }

    #[test]
    fn deflate_inflate_round_trip() {
        let data = b"the quick brown fox jumps over the lazy dog".repeat(16);
        let compressed = deflate(&data);
        let decompressed = inflate(&compressed).unwrap();
        assert_eq!(decompressed, data);
    }

    #[test]
    fn prehashed_equality_follows_hash() {
        let a = Prehashed::new(vec![1u8, 2, 3]);
        let b = Prehashed::new(vec![1u8, 2, 3]);
        let c = Prehashed::new(vec![1u8, 2, 4]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
