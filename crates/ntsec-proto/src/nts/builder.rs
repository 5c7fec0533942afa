// Copyright 2026 U.S. Federal Government (in countries where recognized)
// SPDX-License-Identifier: Apache-2.0

//! Construction of NTS-protected NTP packets.

use super::NONCE_LEN;
use super::field::{Authenticator, NtsField};
use super::packet::AadLayout;
use crate::crypto::AesSivKey;
use crate::error::NtsError;
use crate::extension::ExtensionField;
use crate::protocol::{HEADER_LEN, Header};

/// A source of nonces and identifiers.
///
/// Passed explicitly so concurrent sessions never share generator state and
/// tests can substitute a deterministic sequence.
pub trait EntropySource {
    /// Fill `dest` with fresh bytes.
    fn fill_bytes(&mut self, dest: &mut [u8]);
}

/// Operating-system randomness through `rand`'s thread-local generator.
#[derive(Clone, Copy, Debug, Default)]
pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn fill_bytes(&mut self, dest: &mut [u8]) {
        rand::fill(dest);
    }
}

/// A deterministic byte sequence: big-endian 64-bit counter values starting at a seed.
///
/// Only suitable for tests and reproducible fixtures.
#[derive(Clone, Debug)]
pub struct CountingEntropy {
    next: u64,
}

impl CountingEntropy {
    /// Start counting at `seed`.
    pub fn new(seed: u64) -> Self {
        CountingEntropy { next: seed }
    }
}

impl EntropySource for CountingEntropy {
    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(8) {
            let bytes = self.next.to_be_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
            self.next = self.next.wrapping_add(1);
        }
    }
}

/// Builder for NTP packets with NTS extension fields.
///
/// Clear fields are written in the order they were added. Fields added with
/// [`PacketBuilder::encrypted`] are only emitted inside an authenticator by
/// [`PacketBuilder::build_sealed`]; [`PacketBuilder::build`] refuses them.
#[derive(Clone, Debug)]
pub struct PacketBuilder {
    header: Header,
    fields: Vec<NtsField>,
    encrypted: Vec<NtsField>,
    aad_layout: AadLayout,
    nonce_len: usize,
}

impl PacketBuilder {
    /// Start a packet with the given header.
    pub fn new(header: Header) -> Self {
        PacketBuilder {
            header,
            fields: Vec::new(),
            encrypted: Vec::new(),
            aad_layout: AadLayout::default(),
            nonce_len: NONCE_LEN,
        }
    }

    /// Append a Unique Identifier field.
    pub fn unique_identifier(self, uid: impl Into<Vec<u8>>) -> Self {
        self.field(NtsField::UniqueIdentifier(uid.into()))
    }

    /// Append a cookie field.
    pub fn cookie(self, cookie: impl Into<Vec<u8>>) -> Self {
        self.field(NtsField::Cookie(cookie.into()))
    }

    /// Append a cookie placeholder whose body is `len` zero bytes.
    pub fn cookie_placeholder(self, len: usize) -> Self {
        self.field(NtsField::CookiePlaceholder { len })
    }

    /// Append an arbitrary extension field in the clear.
    pub fn extension(self, field: ExtensionField) -> Self {
        self.field(NtsField::Unknown(field))
    }

    /// Append a typed field in the clear.
    pub fn field(mut self, field: NtsField) -> Self {
        self.fields.push(field);
        self
    }

    /// Append a field to be carried inside the authenticator.
    pub fn encrypted(mut self, field: NtsField) -> Self {
        self.encrypted.push(field);
        self
    }

    /// Select the associated data layout used when sealing.
    pub fn aad_layout(mut self, layout: AadLayout) -> Self {
        self.aad_layout = layout;
        self
    }

    /// Override the authenticator nonce length (16 bytes by default).
    pub fn nonce_len(mut self, len: usize) -> Self {
        self.nonce_len = len;
        self
    }

    fn encode_clear(&self) -> Result<(Vec<u8>, Vec<usize>), NtsError> {
        let mut out = self.header.encode().to_vec();
        let mut bounds = vec![HEADER_LEN];
        for field in &self.fields {
            field.encode_into(&mut out)?;
            bounds.push(out.len());
        }
        Ok((out, bounds))
    }

    /// Encode an unauthenticated packet.
    pub fn build(self) -> Result<Vec<u8>, NtsError> {
        if !self.encrypted.is_empty() {
            return Err(NtsError::MissingKey);
        }
        Ok(self.encode_clear()?.0)
    }

    /// Encode the packet and append an authenticator that covers every clear
    /// field and carries the encrypted ones.
    pub fn build_sealed(
        self,
        key: &AesSivKey,
        entropy: &mut dyn EntropySource,
    ) -> Result<Vec<u8>, NtsError> {
        let (mut out, bounds) = self.encode_clear()?;

        let mut plaintext = Vec::new();
        for field in &self.encrypted {
            field.encode_into(&mut plaintext)?;
        }

        let mut nonce = vec![0u8; self.nonce_len];
        entropy.fill_bytes(&mut nonce);

        let spans: Vec<&[u8]> = std::iter::once(0)
            .chain(bounds.iter().copied())
            .zip(bounds.iter().copied())
            .map(|(start, end)| &out[start..end])
            .collect();
        let aad = self.aad_layout.strings(&out, &spans);
        let ciphertext = key.encrypt(&aad, &nonce, &plaintext)?;

        NtsField::Authenticator(Authenticator { nonce, ciphertext }).encode_into(&mut out)?;
        Ok(out)
    }
}
