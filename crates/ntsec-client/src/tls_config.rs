// Copyright 2026 U.S. Federal Government (in countries where recognized)
// SPDX-License-Identifier: Apache-2.0

// TLS configuration for NTS key establishment: ring provider, TLS 1.3 only,
// ALPN `ntske/1` (RFC 8915 §4).

use std::sync::Arc;

use ntsec_proto::ke::ALPN_NTSKE;

use crate::error::{ConfigError, NtsClientError};

/// The WebPKI root certificates.
pub(crate) fn webpki_root_store() -> rustls::RootCertStore {
    rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned())
}

/// Build a TLS client configuration for NTS-KE trusting `roots`.
pub(crate) fn nts_client_config(
    roots: rustls::RootCertStore,
) -> Result<rustls::ClientConfig, NtsClientError> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut config = rustls::ClientConfig::builder_with_provider(provider)
        .with_protocol_versions(&[&rustls::version::TLS13])
        .map_err(|e| ConfigError::InvalidTlsConfig {
            detail: e.to_string(),
        })?
        .with_root_certificates(roots)
        .with_no_client_auth();
    config.alpn_protocols = vec![ALPN_NTSKE.to_vec()];
    Ok(config)
}
