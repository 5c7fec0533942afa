// Copyright 2026 U.S. Federal Government (in countries where recognized)
// SPDX-License-Identifier: Apache-2.0

// TLS configuration for the NTS-KE server: ring provider, TLS 1.3 only,
// ALPN `ntske/1` (RFC 8915 §4).

use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};

use ntsec_proto::ke::ALPN_NTSKE;

use crate::error::{ConfigError, NtpServerError};

fn tls_error(e: rustls::Error) -> NtpServerError {
    ConfigError::InvalidTlsCredentials {
        detail: e.to_string(),
    }
    .into()
}

/// Build a TLS server configuration for NTS-KE.
pub(crate) fn nts_server_config(
    cert_chain: Vec<CertificateDer<'static>>,
    private_key: PrivateKeyDer<'static>,
) -> Result<rustls::ServerConfig, NtpServerError> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut config = rustls::ServerConfig::builder_with_provider(provider)
        .with_protocol_versions(&[&rustls::version::TLS13])
        .map_err(tls_error)?
        .with_no_client_auth()
        .with_single_cert(cert_chain, private_key)
        .map_err(tls_error)?;
    config.alpn_protocols = vec![ALPN_NTSKE.to_vec()];
    Ok(config)
}
