//! Fixed-width perceptual fingerprint hashes.
//!
//! Hashes travel as lowercase hex strings (64 characters for a 256-bit
//! blockhash). Every hash entering the matcher is decoded and checked
//! against the width of its namespace first.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A decoded fingerprint of a known bit width.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FingerprintHash {
    bytes: Vec<u8>,
}

impl FingerprintHash {
    /// Decode `hex_str` and require exactly `bits` bits.
    ///
    /// Surrounding whitespace is ignored and hex digits may be either case.
    pub fn parse(hex_str: &str, bits: u32) -> Result<Self> {
        if bits == 0 || bits % 8 != 0 {
            return Err(Error::Config(format!(
                "hash width must be a positive multiple of 8 bits, got {}",
                bits
            )));
        }
        let trimmed = hex_str.trim();
        let expected = (bits / 4) as usize;
        if trimmed.len() != expected {
            return Err(Error::InvalidInput(format!(
                "hash must be {} hex characters, got {}",
                expected,
                trimmed.len()
            )));
        }
        Self::from_hex(trimmed)
    }

    /// Decode a hex string of any non-empty even length.
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let trimmed = hex_str.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidInput("hash is empty".to_string()));
        }
        let bytes = hex::decode(trimmed)?;
        Ok(Self { bytes })
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Width of the hash in bits.
    pub fn bits(&self) -> u32 {
        (self.bytes.len() * 8) as u32
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Canonical lowercase hex encoding.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }

    /// Hamming distance to `other`, or `None` when the widths differ.
    pub fn distance(&self, other: &FingerprintHash) -> Option<u32> {
        hamming_distance(&self.bytes, &other.bytes)
    }
}

impl fmt::Display for FingerprintHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl TryFrom<String> for FingerprintHash {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::from_hex(&value)
    }
}

impl From<FingerprintHash> for String {
    fn from(value: FingerprintHash) -> Self {
        value.to_hex()
    }
}

/// Number of differing bits between two equal-length byte strings.
///
/// Returns `None` when the inputs have different lengths.
pub fn hamming_distance(a: &[u8], b: &[u8]) -> Option<u32> {
    if a.len() != b.len() {
        return None;
    }
    Some(a.iter().zip(b).map(|(x, y)| (x ^ y).count_ones()).sum())
}
