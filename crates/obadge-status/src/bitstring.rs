//! # Bitstring
//!
//! The raw revocation bitstring and its wire encoding.
//!
//! - Bit `i` lives in byte `i / 8` at mask `1 << (7 - i % 8)` (most
//!   significant bit first).
//! - The list is at least [`BLOCK_BITS`] long (16 KiB) and grows in whole
//!   blocks, never shrinking.
//! - Wire form: gzip, then base64url without padding.

use std::io::{Read, Write};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::StatusError;

/// Minimum list length and growth increment, in bits (16 KiB).
pub const BLOCK_BITS: u64 = 131_072;

/// Refuse to inflate encoded lists beyond this many bytes (64 MiB).
const MAX_DECODED_BYTES: u64 = 64 * 1024 * 1024;

/// Round a bit count up to a whole number of blocks, at least one.
pub fn capacity_for(bits: u64) -> u64 {
    bits.max(1).div_ceil(BLOCK_BITS).max(1) * BLOCK_BITS
}

/// A revocation bitstring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitstring {
    bytes: Vec<u8>,
}

impl Bitstring {
    /// An all-zero list with room for at least `bits` bits.
    pub fn with_capacity_bits(bits: u64) -> Self {
        let bytes = capacity_for(bits) / 8;
        Self {
            bytes: vec![0u8; usize::try_from(bytes).unwrap_or(usize::MAX)],
        }
    }

    /// Length in bits.
    pub fn len_bits(&self) -> u64 {
        self.bytes.len() as u64 * 8
    }

    /// The raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn locate(&self, index: u64) -> Result<(usize, u8), StatusError> {
        let byte = usize::try_from(index / 8).ok().filter(|b| *b < self.bytes.len());
        match byte {
            Some(b) => Ok((b, 1u8 << (7 - (index % 8) as u8))),
            None => Err(StatusError::IndexOutOfRange {
                index,
                len_bits: self.len_bits(),
            }),
        }
    }

    /// Read bit `index`.
    pub fn get(&self, index: u64) -> Result<bool, StatusError> {
        let (byte, mask) = self.locate(index)?;
        Ok(self.bytes[byte] & mask != 0)
    }

    /// Write bit `index`.
    pub fn set(&mut self, index: u64, value: bool) -> Result<(), StatusError> {
        let (byte, mask) = self.locate(index)?;
        if value {
            self.bytes[byte] |= mask;
        } else {
            self.bytes[byte] &= !mask;
        }
        Ok(())
    }

    /// Grow (in whole blocks) until `index` is addressable.
    pub fn ensure_index(&mut self, index: u64) {
        if index >= self.len_bits() {
            let bytes = capacity_for(index + 1) / 8;
            self.bytes.resize(usize::try_from(bytes).unwrap_or(usize::MAX), 0);
        }
    }

    /// Number of set bits.
    pub fn count_ones(&self) -> u64 {
        self.bytes.iter().map(|b| u64::from(b.count_ones())).sum()
    }

    /// gzip then base64url (unpadded).
    pub fn encode(&self) -> Result<String, StatusError> {
        let mut gz = GzEncoder::new(Vec::new(), Compression::default());
        gz.write_all(&self.bytes)?;
        Ok(URL_SAFE_NO_PAD.encode(gz.finish()?))
    }

    /// Inverse of [`Bitstring::encode`]. Padded input is accepted.
    pub fn decode(encoded: &str) -> Result<Self, StatusError> {
        let compressed = URL_SAFE_NO_PAD
            .decode(encoded.trim().trim_end_matches('='))
            .map_err(|e| StatusError::Decoding(format!("base64url: {e}")))?;
        let mut bytes = Vec::new();
        GzDecoder::new(compressed.as_slice())
            .take(MAX_DECODED_BYTES + 1)
            .read_to_end(&mut bytes)
            .map_err(|e| StatusError::Decoding(format!("gzip: {e}")))?;
        if bytes.len() as u64 > MAX_DECODED_BYTES {
            return Err(StatusError::Decoding("decoded list exceeds 64 MiB".into()));
        }
        if bytes.is_empty() {
            return Err(StatusError::Decoding("decoded list is empty".into()));
        }
        Ok(Self { bytes })
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn encode_decode_preserves_bits(indices in prop::collection::btree_set(0u64..BLOCK_BITS * 2, 0..40)) {
            let mut b = Bitstring::with_capacity_bits(0);
            for &i in &indices {
                b.ensure_index(i);
                b.set(i, true).unwrap();
            }
            let back = Bitstring::decode(&b.encode().unwrap()).unwrap();
            prop_assert_eq!(back.count_ones(), indices.len() as u64);
            for &i in &indices {
                prop_assert!(back.get(i).unwrap());
            }
        }

        #[test]
        fn setting_one_bit_touches_only_that_bit(index in 0u64..BLOCK_BITS, other in 0u64..BLOCK_BITS) {
            let mut b = Bitstring::with_capacity_bits(0);
            b.set(index, true).unwrap();
            prop_assert_eq!(b.get(other).unwrap(), other == index);
        }
    }
}
