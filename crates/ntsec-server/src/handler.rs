// Copyright 2026 U.S. Federal Government (in countries where recognized)
// SPDX-License-Identifier: Apache-2.0

//! The request processing pipeline shared by every datagram task.

use std::net::IpAddr;
use std::sync::{Mutex, PoisonError, RwLock};
use std::time::Instant;

use tracing::{debug, trace, warn};

use ntsec_proto::nts::{EntropySource, Protection, peek_packet};
use ntsec_proto::protocol::{HEADER_LEN, Header, KissCode, Mode, NtpTimestamp, Version};

use crate::config::ServerConfig;
use crate::cookie::MasterKeyStore;
use crate::error::{NtsError, ProtocolError};
use crate::rate_limit::{ClientTable, RateLimitResult};
use crate::response::{build_server_header, kod_response, nts_response};
use crate::state::ServerSystemState;

/// The complete result of handling a client request.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum HandleResult {
    /// Send this response to the client.
    Response(Vec<u8>),
    /// Drop the packet silently.
    Drop,
}

/// Everything a request is processed against.
pub(crate) struct RequestContext<'a> {
    pub(crate) state: &'a ServerSystemState,
    pub(crate) config: &'a ServerConfig,
    pub(crate) clients: &'a Mutex<ClientTable>,
    pub(crate) key_store: Option<&'a RwLock<MasterKeyStore>>,
}

/// Validate an incoming client request (RFC 5905 Section 8).
///
/// - At least 48 bytes
/// - Mode is Client
/// - Version is 3 or 4
/// - Transmit timestamp is non-zero
pub(crate) fn validate_client_request(recv_buf: &[u8]) -> Result<Header, ProtocolError> {
    if recv_buf.len() < HEADER_LEN {
        return Err(ProtocolError::RequestTooShort {
            received: recv_buf.len(),
        });
    }
    let request = Header::decode(recv_buf).map_err(|_| ProtocolError::RequestTooShort {
        received: recv_buf.len(),
    })?;

    if request.mode != Mode::Client {
        return Err(ProtocolError::UnexpectedMode {
            mode: request.mode as u8,
        });
    }
    if request.version != Version::V3 && request.version != Version::V4 {
        return Err(ProtocolError::UnsupportedVersion {
            version: request.version.value(),
        });
    }
    match request.transmit_timestamp {
        Some(ts) if ts != NtpTimestamp::ZERO => Ok(request),
        _ => Err(ProtocolError::ZeroTransmitTimestamp),
    }
}

fn kod(request: &Header, code: KissCode, unique_id: Option<&[u8]>) -> HandleResult {
    match kod_response(request, code, unique_id) {
        Ok(buf) => HandleResult::Response(buf),
        Err(e) => {
            debug!(error = %e, code = %code, "failed to encode kiss-o'-death");
            HandleResult::Drop
        }
    }
}

/// Handle a single incoming NTP request (pure logic, no I/O).
///
/// NTS requests are recognised by their cookie. The cookie is opened before
/// anything is verified, since it is what yields the verification key; a
/// cookie no master key can open is answered with an NTS NAK.
pub(crate) fn handle_request(
    recv_buf: &[u8],
    src_ip: IpAddr,
    ctx: &RequestContext<'_>,
    entropy: &mut dyn EntropySource,
) -> HandleResult {
    // 1. Validate the header.
    let request = match validate_client_request(recv_buf) {
        Ok(req) => req,
        Err(e) => {
            debug!(%src_ip, error = %e, "dropping invalid request");
            return HandleResult::Drop;
        }
    };

    // 2. Locate NTS fields without verifying them.
    let peeked = if recv_buf.len() > HEADER_LEN {
        match peek_packet(recv_buf) {
            Ok(packet) => Some(packet),
            Err(e) => {
                debug!(%src_ip, error = %e, "dropping request with malformed extension fields");
                return HandleResult::Drop;
            }
        }
    } else {
        None
    };
    let unique_id = peeked.as_ref().and_then(|p| p.unique_identifier());
    let cookie = peeked
        .as_ref()
        .and_then(|p| p.cookies(Protection::Unauthenticated).next());

    // 3. Rate limiting.
    if let Some(limit) = &ctx.config.rate_limit {
        let result = ctx
            .clients
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .check(src_ip, Instant::now(), limit);
        if result == RateLimitResult::RateExceeded {
            debug!(%src_ip, "rate limit exceeded");
            return kod(&request, KissCode::Rate, unique_id);
        }
    }

    // 4. Record T2.
    let t2 = NtpTimestamp::now();

    // 5. Plain NTP.
    let Some(cookie) = cookie else {
        if ctx.config.require_nts {
            debug!(%src_ip, error = %ProtocolError::NtsRequired, "dropping request");
            return HandleResult::Drop;
        }
        let response = build_server_header(&request, ctx.state, t2);
        return HandleResult::Response(response.encode().to_vec());
    };

    // 6. NTS.
    let Some(key_store) = ctx.key_store else {
        debug!(%src_ip, "NTS request but no master keys configured");
        return HandleResult::Drop;
    };
    let key_store = match key_store.read() {
        Ok(store) => store,
        Err(_) => {
            warn!(error = %NtsError::KeyStorePoisoned, "dropping NTS request");
            return HandleResult::Drop;
        }
    };
    let Some(keys) = key_store.decrypt_cookie(cookie) else {
        if unique_id.is_none() {
            debug!(%src_ip, "undecryptable cookie without unique identifier");
            return HandleResult::Drop;
        }
        debug!(%src_ip, error = %NtsError::CookieDecryptionFailed, "sending NTS NAK");
        return kod(&request, KissCode::Ntsn, unique_id);
    };

    match nts_response(
        recv_buf,
        &request,
        &keys,
        &key_store,
        ctx.state,
        ctx.config.aad_layout,
        t2,
        entropy,
    ) {
        Ok(buf) => {
            trace!(%src_ip, len = buf.len(), "NTS response built");
            HandleResult::Response(buf)
        }
        Err(e) => {
            debug!(%src_ip, error = %e, "dropping NTS request");
            HandleResult::Drop
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ntsec_proto::crypto::AeadAlgorithm;
    use ntsec_proto::ke::SessionKeys;
    use ntsec_proto::nts::{
        AadLayout, DecodeOptions, OsEntropy, build_client_request, parse_response,
        validate_server_response,
    };
    use ntsec_proto::NtsError as PacketError;
    use ntsec_proto::protocol::Stratum;

    use crate::cookie::DEFAULT_GRACE_PERIOD;
    use crate::rate_limit::RateLimitConfig;

    struct Fixture {
        state: ServerSystemState,
        config: ServerConfig,
        clients: Mutex<ClientTable>,
        store: RwLock<MasterKeyStore>,
    }

    impl Fixture {
        fn new(config: ServerConfig) -> Self {
            Fixture {
                state: ServerSystemState::default(),
                config,
                clients: Mutex::new(ClientTable::new(16)),
                store: RwLock::new(MasterKeyStore::new(DEFAULT_GRACE_PERIOD)),
            }
        }

        fn handle(&self, buf: &[u8]) -> HandleResult {
            let ctx = RequestContext {
                state: &self.state,
                config: &self.config,
                clients: &self.clients,
                key_store: Some(&self.store),
            };
            handle_request(buf, "192.0.2.7".parse().unwrap(), &ctx, &mut OsEntropy)
        }

        fn session(&self) -> (SessionKeys, Vec<u8>) {
            let alg = AeadAlgorithm::AesSivCmac256;
            let keys = SessionKeys {
                algorithm: alg,
                c2s: alg.key(&[0x5a; 32]).unwrap(),
                s2c: alg.key(&[0xa5; 32]).unwrap(),
            };
            let cookie = self
                .store
                .read()
                .unwrap()
                .encrypt_cookie(&keys, &mut OsEntropy)
                .unwrap();
            (keys, cookie)
        }
    }

    fn response_bytes(result: HandleResult) -> Vec<u8> {
        match result {
            HandleResult::Response(buf) => buf,
            HandleResult::Drop => panic!("request was dropped"),
        }
    }

    #[test]
    fn test_validate_rejects_bad_requests() {
        assert_eq!(
            validate_client_request(&[0u8; 20]).unwrap_err(),
            ProtocolError::RequestTooShort { received: 20 }
        );

        let mut header = Header::client_request(NtpTimestamp::new(1, 0));
        header.mode = Mode::Server;
        assert_eq!(
            validate_client_request(&header.encode()).unwrap_err(),
            ProtocolError::UnexpectedMode { mode: 4 }
        );

        let mut header = Header::client_request(NtpTimestamp::new(1, 0));
        header.version = Version::from_bits(2);
        assert_eq!(
            validate_client_request(&header.encode()).unwrap_err(),
            ProtocolError::UnsupportedVersion { version: 2 }
        );

        let header = Header::client_request(NtpTimestamp::ZERO);
        assert_eq!(
            validate_client_request(&header.encode()).unwrap_err(),
            ProtocolError::ZeroTransmitTimestamp
        );
    }

    #[test]
    fn test_plain_request() {
        let fixture = Fixture::new(ServerConfig::default());
        let t1 = NtpTimestamp::new(3_900_000_000, 99);
        let buf = response_bytes(fixture.handle(&Header::client_request(t1).encode()));
        assert_eq!(buf.len(), HEADER_LEN);
        let response = Header::decode(&buf).unwrap();
        assert_eq!(response.mode, Mode::Server);
        assert_eq!(response.stratum, Stratum::PRIMARY);
        assert_eq!(response.origin_timestamp, t1);
        assert_ne!(response.transmit_timestamp, Some(NtpTimestamp::ZERO));
    }

    #[test]
    fn test_plain_request_dropped_when_nts_required() {
        let fixture = Fixture::new(ServerConfig {
            require_nts: true,
            ..ServerConfig::default()
        });
        let request = Header::client_request(NtpTimestamp::new(3_900_000_000, 1));
        assert_eq!(fixture.handle(&request.encode()), HandleResult::Drop);
    }

    #[test]
    fn test_nts_request_gets_cookies() {
        let fixture = Fixture::new(ServerConfig::default());
        let (keys, cookie) = fixture.session();
        let request =
            build_client_request(&keys.c2s, &cookie, 2, AadLayout::PerField, &mut OsEntropy)
                .unwrap();

        let buf = response_bytes(fixture.handle(&request.bytes));
        let response =
            validate_server_response(&buf, &keys.s2c, &request, AadLayout::PerField).unwrap();
        assert_eq!(response.cookies.len(), 3);
        assert_eq!(response.header.origin_timestamp, request.transmit);

        let store = fixture.store.read().unwrap();
        for fresh in &response.cookies {
            assert_ne!(fresh, &cookie);
            let opened = store.decrypt_cookie(fresh).unwrap();
            assert_eq!(opened.c2s.as_bytes(), keys.c2s.as_bytes());
        }
    }

    #[test]
    fn test_contiguous_layout() {
        let fixture = Fixture::new(ServerConfig {
            aad_layout: AadLayout::Contiguous,
            ..ServerConfig::default()
        });
        let (keys, cookie) = fixture.session();
        let request =
            build_client_request(&keys.c2s, &cookie, 0, AadLayout::Contiguous, &mut OsEntropy)
                .unwrap();
        let buf = response_bytes(fixture.handle(&request.bytes));
        let response =
            validate_server_response(&buf, &keys.s2c, &request, AadLayout::Contiguous).unwrap();
        assert_eq!(response.cookies.len(), 1);

        // A per-field request does not verify under a contiguous server.
        let request =
            build_client_request(&keys.c2s, &cookie, 0, AadLayout::PerField, &mut OsEntropy)
                .unwrap();
        assert_eq!(fixture.handle(&request.bytes), HandleResult::Drop);
    }

    #[test]
    fn test_undecryptable_cookie_gets_nts_nak() {
        let fixture = Fixture::new(ServerConfig::default());
        let (keys, mut cookie) = fixture.session();
        cookie[30] ^= 0xff;
        let request =
            build_client_request(&keys.c2s, &cookie, 0, AadLayout::PerField, &mut OsEntropy)
                .unwrap();

        let buf = response_bytes(fixture.handle(&request.bytes));
        let opts = DecodeOptions::with_key(&keys.s2c).expect_unique_id(&request.unique_id);
        assert_eq!(
            parse_response(&buf, &opts).unwrap_err(),
            PacketError::KissOfDeath(KissCode::Ntsn)
        );
    }

    #[test]
    fn test_request_sealed_with_wrong_key_is_dropped() {
        let fixture = Fixture::new(ServerConfig::default());
        let (_, cookie) = fixture.session();
        let wrong = AeadAlgorithm::AesSivCmac256.key(&[0x01; 32]).unwrap();
        let request =
            build_client_request(&wrong, &cookie, 0, AadLayout::PerField, &mut OsEntropy).unwrap();
        assert_eq!(fixture.handle(&request.bytes), HandleResult::Drop);
    }

    #[test]
    fn test_tampered_request_is_dropped() {
        let fixture = Fixture::new(ServerConfig::default());
        let (keys, cookie) = fixture.session();
        let request =
            build_client_request(&keys.c2s, &cookie, 0, AadLayout::PerField, &mut OsEntropy)
                .unwrap();
        let mut bytes = request.bytes.clone();
        bytes[47] ^= 0x01;
        assert_eq!(fixture.handle(&bytes), HandleResult::Drop);
    }

    #[test]
    fn test_malformed_extension_is_dropped() {
        let fixture = Fixture::new(ServerConfig::default());
        let (keys, cookie) = fixture.session();
        let request =
            build_client_request(&keys.c2s, &cookie, 0, AadLayout::PerField, &mut OsEntropy)
                .unwrap();
        // A trailing field whose declared length is shorter than its own header.
        let mut bytes = request.bytes.clone();
        bytes.extend_from_slice(&[0x01, 0x04, 0x00, 0x02]);
        assert_eq!(fixture.handle(&bytes), HandleResult::Drop);
    }

    #[test]
    fn test_malformed_extension_on_plain_request_is_dropped() {
        let fixture = Fixture::new(ServerConfig::default());
        let mut bytes = Header::client_request(NtpTimestamp::new(1, 0))
            .encode()
            .to_vec();
        bytes.extend_from_slice(&[0x02, 0x04, 0x00, 0x00]);
        assert_eq!(fixture.handle(&bytes), HandleResult::Drop);
    }

    #[test]
    fn test_rate_limit_sends_rate_kod() {
        let fixture = Fixture::new(ServerConfig {
            rate_limit: Some(RateLimitConfig::default()),
            ..ServerConfig::default()
        });
        let request = Header::client_request(NtpTimestamp::new(3_900_000_000, 1)).encode();
        let first = response_bytes(fixture.handle(&request));
        assert_eq!(Header::decode(&first).unwrap().kiss_code(), None);

        let second = response_bytes(fixture.handle(&request));
        assert_eq!(
            Header::decode(&second).unwrap().kiss_code(),
            Some(KissCode::Rate)
        );
    }

    #[test]
    fn test_cookie_count_is_capped() {
        let fixture = Fixture::new(ServerConfig::default());
        let (keys, cookie) = fixture.session();
        let request =
            build_client_request(&keys.c2s, &cookie, 20, AadLayout::PerField, &mut OsEntropy)
                .unwrap();
        let buf = response_bytes(fixture.handle(&request.bytes));
        let response =
            validate_server_response(&buf, &keys.s2c, &request, AadLayout::PerField).unwrap();
        assert_eq!(
            response.cookies.len(),
            crate::response::MAX_COOKIES_PER_RESPONSE
        );
    }

    #[test]
    fn test_nts_request_without_key_store_is_dropped() {
        let fixture = Fixture::new(ServerConfig::default());
        let (keys, cookie) = fixture.session();
        let request =
            build_client_request(&keys.c2s, &cookie, 0, AadLayout::PerField, &mut OsEntropy)
                .unwrap();
        let ctx = RequestContext {
            state: &fixture.state,
            config: &fixture.config,
            clients: &fixture.clients,
            key_store: None,
        };
        assert_eq!(
            handle_request(&request.bytes, "192.0.2.7".parse().unwrap(), &ctx, &mut OsEntropy),
            HandleResult::Drop
        );
    }
}
