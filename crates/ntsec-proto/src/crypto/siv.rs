// Copyright 2026 U.S. Federal Government (in countries where recognized)
// SPDX-License-Identifier: Apache-2.0

//! Synthetic Initialization Vector AEAD (RFC 5297).
//!
//! The ciphertext layout is `V || C` where `V` is the 16-byte synthetic IV
//! produced by S2V and `C` is the AES-CTR encryption of the plaintext under
//! `K2` starting from `V`. The string vector passed to S2V is the associated
//! data in order, then the nonce (when non-empty), then the plaintext.

use std::fmt;

use subtle::ConstantTimeEq;
use zeroize::{Zeroize, Zeroizing};

use super::AeadAlgorithm;
use super::block::{BLOCK_SIZE, Block, aes_ctr, cmac, dbl, pad, xor_block};
use crate::error::CryptoError;

/// Maximum number of strings S2V accepts (RFC 5297 §7).
pub const MAX_S2V_COMPONENTS: usize = 127;

/// An AES-SIV key, split into the S2V half (`K1`) and the CTR half (`K2`).
///
/// The key bytes are wiped when the value is dropped.
#[derive(Clone)]
pub struct AesSivKey {
    key: Zeroizing<Vec<u8>>,
}

impl AesSivKey {
    /// Construct a key from 32 bytes (AES-SIV-CMAC-256) or 64 bytes
    /// (AES-SIV-CMAC-512).
    pub fn new(key: &[u8]) -> Result<Self, CryptoError> {
        match key.len() {
            32 | 64 => Ok(AesSivKey {
                key: Zeroizing::new(key.to_vec()),
            }),
            len => Err(CryptoError::KeySize { len }),
        }
    }

    /// The negotiated-algorithm identity of this key.
    pub fn algorithm(&self) -> AeadAlgorithm {
        if self.key.len() == 64 {
            AeadAlgorithm::AesSivCmac512
        } else {
            AeadAlgorithm::AesSivCmac256
        }
    }

    /// Raw key bytes, for export into cookies.
    pub fn as_bytes(&self) -> &[u8] {
        &self.key
    }

    fn k1(&self) -> &[u8] {
        &self.key[..self.key.len() / 2]
    }

    fn k2(&self) -> &[u8] {
        &self.key[self.key.len() / 2..]
    }

    /// Compute the synthetic IV for the given strings under this key's `K1`.
    pub fn s2v(&self, strings: &[&[u8]]) -> Result<Block, CryptoError> {
        s2v(self.k1(), strings)
    }

    /// Encrypt `plaintext`, returning `SIV || ciphertext`.
    pub fn encrypt(
        &self,
        associated_data: &[&[u8]],
        nonce: &[u8],
        plaintext: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        let strings = components(associated_data, nonce, plaintext);
        let siv = s2v(self.k1(), &strings)?;
        let ciphertext = aes_ctr(plaintext, &siv, self.k2())?;

        let mut out = Vec::with_capacity(BLOCK_SIZE + ciphertext.len());
        out.extend_from_slice(&siv);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    /// Verify and decrypt `SIV || ciphertext`.
    ///
    /// The candidate plaintext is wiped and never returned when the
    /// recomputed SIV does not match.
    pub fn decrypt(
        &self,
        associated_data: &[&[u8]],
        nonce: &[u8],
        siv_and_ciphertext: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        if siv_and_ciphertext.len() < BLOCK_SIZE {
            return Err(CryptoError::InvalidInput {
                reason: "ciphertext shorter than the synthetic IV",
            });
        }
        let (siv, ciphertext) = siv_and_ciphertext.split_at(BLOCK_SIZE);
        let mut plaintext = aes_ctr(ciphertext, siv, self.k2())?;

        let strings = components(associated_data, nonce, &plaintext);
        let expected = match s2v(self.k1(), &strings) {
            Ok(expected) => expected,
            Err(e) => {
                plaintext.zeroize();
                return Err(e);
            }
        };

        if bool::from(expected.ct_eq(siv)) {
            Ok(plaintext)
        } else {
            plaintext.zeroize();
            Err(CryptoError::AuthenticationFailed)
        }
    }
}

impl fmt::Debug for AesSivKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AesSivKey")
            .field("algorithm", &self.algorithm())
            .field("key", &"<redacted>")
            .finish()
    }
}

/// The S2V input strings: associated data, then the nonce if non-empty,
/// then the plaintext.
///
/// The plaintext is always the final string, even when empty, as RFC 5297
/// §2.6 and §2.7 require. An empty plaintext therefore never reaches the
/// `CMAC(K1, 0x01)` case of [`s2v`]; only a direct call with no strings does.
fn components<'a>(
    associated_data: &[&'a [u8]],
    nonce: &'a [u8],
    plaintext: &'a [u8],
) -> Vec<&'a [u8]> {
    let mut strings = Vec::with_capacity(associated_data.len() + 2);
    strings.extend_from_slice(associated_data);
    if !nonce.is_empty() {
        strings.push(nonce);
    }
    strings.push(plaintext);
    strings
}

/// S2V (RFC 5297 §2.4) over `strings` with the CMAC key `k1`.
///
/// An empty vector yields `CMAC(K1, 0x01)`. Otherwise the accumulator starts
/// at `CMAC(K1, 0^128)` and every string but the last is folded in with
/// `dbl(D) xor CMAC(K1, S_i)`. The last string is either xored into its own
/// trailing block (when at least one block long) or padded and xored with
/// `dbl(D)`.
pub fn s2v(k1: &[u8], strings: &[&[u8]]) -> Result<Block, CryptoError> {
    if strings.len() > MAX_S2V_COMPONENTS {
        return Err(CryptoError::TooManyComponents {
            count: strings.len(),
        });
    }

    let Some((last, init)) = strings.split_last() else {
        return cmac(k1, &[0x01]);
    };

    let mut d = cmac(k1, &[0u8; BLOCK_SIZE])?;
    for s in init {
        d = xor_block(&dbl(&d), &cmac(k1, s)?);
    }

    if last.len() >= BLOCK_SIZE {
        // xorend: only the final block of the last string is mixed with D.
        let mut t = Zeroizing::new(last.to_vec());
        let tail = t.len() - BLOCK_SIZE;
        for (b, x) in t[tail..].iter_mut().zip(d.iter()) {
            *b ^= x;
        }
        cmac(k1, &t)
    } else {
        let t = xor_block(&dbl(&d), &pad(last)?);
        cmac(k1, &t)
    }
}
