// Copyright 2026 U.S. Federal Government (in countries where recognized)
// SPDX-License-Identifier: Apache-2.0

//! NTS session keys from the TLS 1.3 exporter (RFC 8915 §4.3, RFC 8446 §7.5).
//!
//! Each key is `TLS-Exporter("EXPORTER-network-time-security", context, L)`
//! where `L` is the AEAD key length and the context is the next protocol ID,
//! the AEAD algorithm ID and a direction byte (0 = client to server,
//! 1 = server to client).

use zeroize::Zeroizing;

use super::{EXPORTER_LABEL, KeError};
use crate::crypto::{AeadAlgorithm, AesSivKey};

/// The narrow view of a completed TLS session that key derivation needs.
pub trait KeyingMaterialExporter {
    /// Fill `out` with keying material for `label` and `context`.
    fn export_keying_material(
        &self,
        out: &mut [u8],
        label: &[u8],
        context: &[u8],
    ) -> Result<(), KeError>;
}

#[cfg(feature = "tls")]
impl KeyingMaterialExporter for rustls::ServerConnection {
    fn export_keying_material(
        &self,
        out: &mut [u8],
        label: &[u8],
        context: &[u8],
    ) -> Result<(), KeError> {
        (**self)
            .export_keying_material(out, label, Some(context))
            .map(|_| ())
            .map_err(|e| KeError::Export(e.to_string()))
    }
}

#[cfg(feature = "tls")]
impl KeyingMaterialExporter for rustls::ClientConnection {
    fn export_keying_material(
        &self,
        out: &mut [u8],
        label: &[u8],
        context: &[u8],
    ) -> Result<(), KeError> {
        (**self)
            .export_keying_material(out, label, Some(context))
            .map(|_| ())
            .map_err(|e| KeError::Export(e.to_string()))
    }
}

/// Which way a session key protects traffic.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[repr(u8)]
pub enum Direction {
    /// Requests from client to server.
    ClientToServer = 0,
    /// Responses from server to client.
    ServerToClient = 1,
}

/// The five-byte exporter context for a protocol, algorithm and direction.
pub fn exporter_context(protocol: u16, algorithm: AeadAlgorithm, direction: Direction) -> [u8; 5] {
    let [p_hi, p_lo] = protocol.to_be_bytes();
    let [a_hi, a_lo] = algorithm.id().to_be_bytes();
    [p_hi, p_lo, a_hi, a_lo, direction as u8]
}

/// The pair of keys derived for one NTS-KE session.
#[derive(Clone, Debug)]
pub struct SessionKeys {
    /// The negotiated algorithm.
    pub algorithm: AeadAlgorithm,
    /// Client-to-server key.
    pub c2s: AesSivKey,
    /// Server-to-client key.
    pub s2c: AesSivKey,
}

fn export_one(
    exporter: &(impl KeyingMaterialExporter + ?Sized),
    protocol: u16,
    algorithm: AeadAlgorithm,
    direction: Direction,
) -> Result<AesSivKey, KeError> {
    let mut material = Zeroizing::new(vec![0u8; algorithm.key_len()]);
    let context = exporter_context(protocol, algorithm, direction);
    exporter.export_keying_material(&mut material, EXPORTER_LABEL, &context)?;
    Ok(algorithm.key(&material)?)
}

/// Derive both session keys. Call once, right after the handshake completes.
pub fn export_session_keys(
    exporter: &(impl KeyingMaterialExporter + ?Sized),
    protocol: u16,
    algorithm: AeadAlgorithm,
) -> Result<SessionKeys, KeError> {
    Ok(SessionKeys {
        algorithm,
        c2s: export_one(exporter, protocol, algorithm, Direction::ClientToServer)?,
        s2c: export_one(exporter, protocol, algorithm, Direction::ServerToClient)?,
    })
}
