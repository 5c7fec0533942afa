// Copyright 2026 U.S. Federal Government (in countries where recognized)
// SPDX-License-Identifier: Apache-2.0

//! AES-SIV (RFC 5297) and the block primitives it is assembled from.
//!
//! [`block`] holds the stateless building blocks (AES-CMAC, doubling in
//! GF(2^128), XOR, `pad`, AES-CTR with the SIV counter mask) and [`siv`]
//! composes them into the S2V construction and the deterministic AEAD.

/// AES-CMAC, GF(2^128) doubling, XOR, padding and AES-CTR.
pub mod block;

/// The S2V construction and the AES-SIV AEAD.
pub mod siv;

pub use siv::AesSivKey;

use crate::error::CryptoError;

/// AEAD algorithms negotiated during NTS-KE (IANA "AEAD Algorithms" registry).
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[repr(u16)]
pub enum AeadAlgorithm {
    /// AEAD_AES_SIV_CMAC_256 (RFC 5297), 32-byte key.
    AesSivCmac256 = 15,
    /// AEAD_AES_SIV_CMAC_512 (RFC 5297), 64-byte key.
    AesSivCmac512 = 17,
}

impl AeadAlgorithm {
    /// Algorithms this implementation supports, most preferred first.
    pub const SUPPORTED: [AeadAlgorithm; 2] =
        [AeadAlgorithm::AesSivCmac256, AeadAlgorithm::AesSivCmac512];

    /// Look up an algorithm by its IANA identifier.
    pub fn from_id(id: u16) -> Option<Self> {
        match id {
            15 => Some(AeadAlgorithm::AesSivCmac256),
            17 => Some(AeadAlgorithm::AesSivCmac512),
            _ => None,
        }
    }

    /// The IANA identifier.
    pub fn id(self) -> u16 {
        self as u16
    }

    /// Length in bytes of a key for this algorithm.
    pub fn key_len(self) -> usize {
        match self {
            AeadAlgorithm::AesSivCmac256 => 32,
            AeadAlgorithm::AesSivCmac512 => 64,
        }
    }

    /// Build an [`AesSivKey`] for this algorithm, checking the key length.
    pub fn key(self, key: &[u8]) -> Result<AesSivKey, CryptoError> {
        if key.len() != self.key_len() {
            return Err(CryptoError::KeySize { len: key.len() });
        }
        AesSivKey::new(key)
    }
}

impl TryFrom<u16> for AeadAlgorithm {
    type Error = u16;

    fn try_from(id: u16) -> Result<Self, Self::Error> {
        AeadAlgorithm::from_id(id).ok_or(id)
    }
}
