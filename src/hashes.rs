use blake2::Blake2b512;
use sha1::{Digest, Sha1};
use std::fmt;

pub const SHA1_BYTE_LENGTH: usize = 20;
pub const BLAKE2B_BYTE_LENGTH: usize = 64;

/// A finished SHA-1 digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sha1Digest(pub [u8; SHA1_BYTE_LENGTH]);

/// A finished BLAKE2b-512 digest (unkeyed, 64-byte output, matching
/// what `b2sum` prints).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Blake2Digest(pub [u8; BLAKE2B_BYTE_LENGTH]);

impl fmt::Display for Sha1Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Display for Blake2Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// SHA-1 of a complete buffer.
pub fn sha1_digest(data: &[u8]) -> Sha1Digest {
    let mut out = [0u8; SHA1_BYTE_LENGTH];
    out.copy_from_slice(Sha1::digest(data).as_slice());
    Sha1Digest(out)
}

/// BLAKE2b-512 of a complete buffer.
pub fn blake2_digest(data: &[u8]) -> Blake2Digest {
    let mut out = [0u8; BLAKE2B_BYTE_LENGTH];
    out.copy_from_slice(Blake2b512::digest(data).as_slice());
    Blake2Digest(out)
}

/// Where (and how much of) the SHA-1 digest was found inside the
/// BLAKE2b digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MatchResult {
    /// Start of the match within the BLAKE2b digest.
    pub offset: usize,
    /// How many leading bytes of the SHA-1 digest matched contiguously.
    pub len: usize,
}

/// Finds the longest prefix of `needle` that occurs contiguously inside
/// `hay`. Ties go to the first occurrence; no match at all yields
/// `{ offset: 0, len: 0 }`.
pub fn longest_match(needle: &[u8], hay: &[u8]) -> MatchResult {
    let mut best = MatchResult::default();
    if needle.is_empty() {
        return best;
    }
    for start in 0..hay.len() {
        if hay[start] != needle[0] {
            continue;
        }
        let mut len = 1;
        while start + len < hay.len() && len < needle.len() && needle[len] == hay[start + len] {
            len += 1;
        }
        if len > best.len {
            best = MatchResult { offset: start, len };
        }
    }
    best
}
