// Copyright 2026 U.S. Federal Government (in countries where recognized)
// SPDX-License-Identifier: Apache-2.0

//! Session key export through a real rustls handshake.

#![cfg(feature = "tls")]

use std::sync::Arc;

use ntsec_proto::crypto::AeadAlgorithm;
use ntsec_proto::ke::{ALPN_NTSKE, PROTOCOL_NTPV4, SessionKeys, export_session_keys};
use rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer, ServerName};
use rustls::{ClientConfig, ClientConnection, RootCertStore, ServerConfig, ServerConnection};

fn provider() -> Arc<rustls::crypto::CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

fn connection_pair() -> (ClientConnection, ServerConnection) {
    let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    let cert_der = cert.cert.der().clone();
    let key_der = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(cert.key_pair.serialize_der()));

    let mut server_config = ServerConfig::builder_with_provider(provider())
        .with_protocol_versions(&[&rustls::version::TLS13])
        .unwrap()
        .with_no_client_auth()
        .with_single_cert(vec![cert_der.clone()], key_der)
        .unwrap();
    server_config.alpn_protocols = vec![ALPN_NTSKE.to_vec()];

    let mut roots = RootCertStore::empty();
    roots.add(cert_der).unwrap();
    let mut client_config = ClientConfig::builder_with_provider(provider())
        .with_protocol_versions(&[&rustls::version::TLS13])
        .unwrap()
        .with_root_certificates(roots)
        .with_no_client_auth();
    client_config.alpn_protocols = vec![ALPN_NTSKE.to_vec()];

    let client = ClientConnection::new(
        Arc::new(client_config),
        ServerName::try_from("localhost").unwrap(),
    )
    .unwrap();
    let server = ServerConnection::new(Arc::new(server_config)).unwrap();
    (client, server)
}

/// Shuttle TLS records between the two sides until both finish the handshake.
fn handshake(client: &mut ClientConnection, server: &mut ServerConnection) {
    for _ in 0..16 {
        let mut wire = Vec::new();
        while client.wants_write() {
            client.write_tls(&mut wire).unwrap();
        }
        let mut rd = &wire[..];
        while !rd.is_empty() {
            server.read_tls(&mut rd).unwrap();
            server.process_new_packets().unwrap();
        }

        let mut wire = Vec::new();
        while server.wants_write() {
            server.write_tls(&mut wire).unwrap();
        }
        let mut rd = &wire[..];
        while !rd.is_empty() {
            client.read_tls(&mut rd).unwrap();
            client.process_new_packets().unwrap();
        }

        if !client.is_handshaking() && !server.is_handshaking() {
            return;
        }
    }
    panic!("TLS handshake did not complete");
}

fn assert_same_keys(a: &SessionKeys, b: &SessionKeys) {
    assert_eq!(a.algorithm, b.algorithm);
    assert_eq!(a.c2s.as_bytes(), b.c2s.as_bytes());
    assert_eq!(a.s2c.as_bytes(), b.s2c.as_bytes());
}

#[test]
fn both_sides_derive_identical_keys() {
    let (mut client, mut server) = connection_pair();
    handshake(&mut client, &mut server);
    assert_eq!(client.alpn_protocol(), Some(ALPN_NTSKE));

    for algorithm in AeadAlgorithm::SUPPORTED {
        let client_keys = export_session_keys(&client, PROTOCOL_NTPV4, algorithm).unwrap();
        let server_keys = export_session_keys(&server, PROTOCOL_NTPV4, algorithm).unwrap();
        assert_same_keys(&client_keys, &server_keys);

        assert_eq!(client_keys.c2s.as_bytes().len(), algorithm.key_len());
        assert_ne!(client_keys.c2s.as_bytes(), client_keys.s2c.as_bytes());
    }
}

#[test]
fn keys_differ_per_algorithm() {
    let (mut client, mut server) = connection_pair();
    handshake(&mut client, &mut server);

    let k256 = export_session_keys(&client, PROTOCOL_NTPV4, AeadAlgorithm::AesSivCmac256).unwrap();
    let k512 = export_session_keys(&client, PROTOCOL_NTPV4, AeadAlgorithm::AesSivCmac512).unwrap();
    assert_ne!(k256.c2s.as_bytes(), &k512.c2s.as_bytes()[..32]);
}

#[test]
fn export_before_handshake_fails() {
    let (client, _server) = connection_pair();
    assert!(export_session_keys(&client, PROTOCOL_NTPV4, AeadAlgorithm::AesSivCmac256).is_err());
}
