// Copyright 2026 U.S. Federal Government (in countries where recognized)
// SPDX-License-Identifier: Apache-2.0

//! Stateless block operations used by S2V and SIV.
//!
//! AES itself, CMAC (RFC 4493) and the CTR keystream come from the RustCrypto
//! `aes`, `cmac` and `ctr` crates. Everything that RFC 5297 defines on top of
//! them (`dbl`, `xor`, `pad` and the counter mask) lives here. Every size
//! precondition is checked and reported as a [`CryptoError`].

use aes::{Aes128, Aes256};
use cmac::{Cmac, Mac};
use ctr::cipher::{KeyIvInit, StreamCipher};

use crate::error::CryptoError;

/// AES block size in bytes.
pub const BLOCK_SIZE: usize = 16;

/// One AES block.
pub type Block = [u8; BLOCK_SIZE];

/// The GF(2^128) reduction constant `R_128` from RFC 5297 §2.3.
const RB: u128 = 0x87;

/// AES-CMAC (RFC 4493) of `msg` under a 128-bit or 256-bit AES key.
pub fn cmac(key: &[u8], msg: &[u8]) -> Result<Block, CryptoError> {
    match key.len() {
        16 => {
            let mut mac = <Cmac<Aes128> as Mac>::new_from_slice(key)
                .map_err(|_| CryptoError::KeySize { len: key.len() })?;
            mac.update(msg);
            Ok(mac.finalize().into_bytes().into())
        }
        32 => {
            let mut mac = <Cmac<Aes256> as Mac>::new_from_slice(key)
                .map_err(|_| CryptoError::KeySize { len: key.len() })?;
            mac.update(msg);
            Ok(mac.finalize().into_bytes().into())
        }
        len => Err(CryptoError::KeySize { len }),
    }
}

/// Multiplication by `x` in GF(2^128) as defined by RFC 5297 §2.3.
///
/// The input must be exactly one block.
pub fn double_block(block: &[u8]) -> Result<Block, CryptoError> {
    let block: &Block = block
        .try_into()
        .map_err(|_| CryptoError::BlockSize { len: block.len() })?;
    Ok(dbl(block))
}

/// Infallible doubling for callers that already hold a full block.
pub(crate) fn dbl(block: &Block) -> Block {
    let v = u128::from_be_bytes(*block);
    // Branch-free: the mask is all ones when the top bit is set.
    let carry = 0u128.wrapping_sub(v >> 127);
    ((v << 1) ^ (carry & RB)).to_be_bytes()
}

/// Byte-wise XOR of two equal-length strings.
pub fn xor(a: &[u8], b: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if a.len() != b.len() {
        return Err(CryptoError::LengthMismatch {
            left: a.len(),
            right: b.len(),
        });
    }
    Ok(a.iter().zip(b).map(|(x, y)| x ^ y).collect())
}

pub(crate) fn xor_block(a: &Block, b: &Block) -> Block {
    let mut out = [0u8; BLOCK_SIZE];
    for (o, (x, y)) in out.iter_mut().zip(a.iter().zip(b)) {
        *o = x ^ y;
    }
    out
}

/// RFC 5297 `pad()`: append `0x80` and zero-fill to one block.
///
/// Only defined for inputs strictly shorter than a block.
pub fn pad(data: &[u8]) -> Result<Block, CryptoError> {
    if data.len() >= BLOCK_SIZE {
        return Err(CryptoError::BlockSize { len: data.len() });
    }
    let mut out = [0u8; BLOCK_SIZE];
    out[..data.len()].copy_from_slice(data);
    out[data.len()] = 0x80;
    Ok(out)
}

/// Clear the top bit of the last two 32-bit words of the counter block
/// (RFC 5297 §2.5, `Q = V & 1^64 0 1^31 0 1^31`).
pub(crate) fn mask_ctr_iv(iv: &Block) -> Block {
    let mut q = *iv;
    q[8] &= 0x7f;
    q[12] &= 0x7f;
    q
}

/// AES-CTR over `data` starting from the masked `iv`.
///
/// Encryption and decryption are the same operation. The key is the SIV
/// `K2` half and must be 16 or 32 bytes; the IV must be one block.
pub fn aes_ctr(data: &[u8], iv: &[u8], key: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let iv: &Block = iv
        .try_into()
        .map_err(|_| CryptoError::BlockSize { len: iv.len() })?;
    let counter = mask_ctr_iv(iv);
    let mut out = data.to_vec();
    match key.len() {
        16 => ctr::Ctr128BE::<Aes128>::new_from_slices(key, &counter)
            .map_err(|_| CryptoError::KeySize { len: key.len() })?
            .apply_keystream(&mut out),
        32 => ctr::Ctr128BE::<Aes256>::new_from_slices(key, &counter)
            .map_err(|_| CryptoError::KeySize { len: key.len() })?
            .apply_keystream(&mut out),
        len => return Err(CryptoError::KeySize { len }),
    }
    Ok(out)
}
