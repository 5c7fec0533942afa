// Copyright 2026 U.S. Federal Government (in countries where recognized)
// SPDX-License-Identifier: Apache-2.0

//! UDP round trips against a running NTP/NTS server.

mod common;

use std::sync::{Arc, RwLock};
use std::time::Duration;

use ntsec_proto::crypto::AeadAlgorithm;
use ntsec_proto::ke::SessionKeys;
use ntsec_proto::NtsError;
use ntsec_proto::nts::{
    AadLayout, DecodeOptions, OsEntropy, build_client_request, parse_response,
    validate_server_response,
};
use ntsec_proto::protocol::{Header, KissCode, Mode, NtpTimestamp, Stratum};
use ntsec_server::cookie::{DEFAULT_GRACE_PERIOD, MasterKeyStore};
use ntsec_server::rate_limit::RateLimitConfig;
use ntsec_server::server::NtpServer;

use common::{send_receive_raw, spawn_test_server};

const TIMEOUT: Duration = Duration::from_secs(2);

fn key_store() -> Arc<RwLock<MasterKeyStore>> {
    Arc::new(RwLock::new(MasterKeyStore::new(DEFAULT_GRACE_PERIOD)))
}

fn session(store: &RwLock<MasterKeyStore>) -> (SessionKeys, Vec<u8>) {
    let alg = AeadAlgorithm::AesSivCmac512;
    let keys = SessionKeys {
        algorithm: alg,
        c2s: alg.key(&[0x3c; 64]).unwrap(),
        s2c: alg.key(&[0xc3; 64]).unwrap(),
    };
    let cookie = store
        .read()
        .unwrap()
        .encrypt_cookie(&keys, &mut OsEntropy)
        .unwrap();
    (keys, cookie)
}

#[tokio::test]
async fn test_plain_ntp_round_trip() {
    let server = spawn_test_server(NtpServer::builder().stratum(Stratum(3))).await;
    let t1 = NtpTimestamp::now();
    let request = Header::client_request(t1).encode();

    let buf = send_receive_raw(server.addr, &request, TIMEOUT)
        .await
        .expect("no response");
    let response = Header::decode(&buf).unwrap();
    assert_eq!(response.mode, Mode::Server);
    assert_eq!(response.stratum, Stratum(3));
    assert_eq!(response.origin_timestamp, t1);
}

#[tokio::test]
async fn test_nts_round_trip() {
    let store = key_store();
    let server = spawn_test_server(NtpServer::builder().nts(store.clone())).await;
    let (keys, cookie) = session(&store);

    let request =
        build_client_request(&keys.c2s, &cookie, 1, AadLayout::PerField, &mut OsEntropy).unwrap();
    let buf = send_receive_raw(server.addr, &request.bytes, TIMEOUT)
        .await
        .expect("no response");
    let response = validate_server_response(&buf, &keys.s2c, &request, AadLayout::PerField).unwrap();
    assert_eq!(response.cookies.len(), 2);
    for fresh in &response.cookies {
        assert_eq!(fresh.len(), cookie.len());
    }
}

#[tokio::test]
async fn test_cookie_from_rotated_out_key_gets_nts_nak() {
    let store = Arc::new(RwLock::new(MasterKeyStore::new(Duration::ZERO)));
    let server = spawn_test_server(NtpServer::builder().nts(store.clone())).await;
    let (keys, cookie) = session(&store);
    store.write().unwrap().rotate();

    let request =
        build_client_request(&keys.c2s, &cookie, 0, AadLayout::PerField, &mut OsEntropy).unwrap();
    let buf = send_receive_raw(server.addr, &request.bytes, TIMEOUT)
        .await
        .expect("no response");
    let opts = DecodeOptions::with_key(&keys.s2c).expect_unique_id(&request.unique_id);
    assert_eq!(
        parse_response(&buf, &opts).unwrap_err(),
        NtsError::KissOfDeath(KissCode::Ntsn)
    );
}

#[tokio::test]
async fn test_require_nts_drops_plain_requests() {
    let store = key_store();
    let server = spawn_test_server(NtpServer::builder().nts(store).require_nts(true)).await;
    let request = Header::client_request(NtpTimestamp::now()).encode();
    assert!(
        send_receive_raw(server.addr, &request, Duration::from_millis(300))
            .await
            .is_none()
    );
}

#[tokio::test]
async fn test_rate_limit_kod() {
    let server = spawn_test_server(NtpServer::builder().rate_limit(RateLimitConfig {
        max_requests_per_window: 100,
        window_duration: Duration::from_secs(60),
        min_interval: Duration::from_secs(30),
    }))
    .await;
    let request = Header::client_request(NtpTimestamp::now()).encode();

    let first = send_receive_raw(server.addr, &request, TIMEOUT).await.unwrap();
    assert_eq!(Header::decode(&first).unwrap().kiss_code(), None);
    let second = send_receive_raw(server.addr, &request, TIMEOUT).await.unwrap();
    assert_eq!(
        Header::decode(&second).unwrap().kiss_code(),
        Some(KissCode::Rate)
    );
}

#[tokio::test]
async fn test_config_handle_applies_to_next_request() {
    let store = key_store();
    let server = NtpServer::builder()
        .listen("127.0.0.1:0")
        .nts(store)
        .build()
        .await
        .unwrap();
    let handle = server.config_handle();
    let addr = server.local_addr().unwrap();
    let (tx, rx) = tokio::sync::watch::channel(false);
    let task = tokio::spawn(server.run_until(rx));

    let request = Header::client_request(NtpTimestamp::now()).encode();
    assert!(send_receive_raw(addr, &request, TIMEOUT).await.is_some());

    handle.update(|c| c.require_nts = true);
    assert!(
        send_receive_raw(addr, &request, Duration::from_millis(300))
            .await
            .is_none()
    );

    tx.send(true).unwrap();
    tokio::time::timeout(TIMEOUT, task)
        .await
        .expect("server did not stop")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_malformed_datagrams_are_ignored() {
    let server = spawn_test_server(NtpServer::builder()).await;
    assert!(
        send_receive_raw(server.addr, &[0u8; 12], Duration::from_millis(300))
            .await
            .is_none()
    );
    // Still serving afterwards.
    let request = Header::client_request(NtpTimestamp::now()).encode();
    assert!(send_receive_raw(server.addr, &request, TIMEOUT).await.is_some());
}
