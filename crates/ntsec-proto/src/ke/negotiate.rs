// Copyright 2026 U.S. Federal Government (in countries where recognized)
// SPDX-License-Identifier: Apache-2.0

//! Both halves of the NTS-KE negotiation.

use tracing::{debug, warn};

use super::record::{KeRecord, encode_records};
use super::{
    AEAD_ALGORITHM, END_OF_MESSAGE, ERROR, ERROR_BAD_REQUEST, ERROR_UNRECOGNIZED_CRITICAL,
    KeError, NEW_COOKIE, NEXT_PROTOCOL, PORT, PROTOCOL_NTPV4, SERVER, WARNING,
};
use crate::crypto::AeadAlgorithm;

/// Encode a client request offering NTPv4 and `algorithms` in preference order.
pub fn client_request(algorithms: &[AeadAlgorithm]) -> Result<Vec<u8>, KeError> {
    encode_records(&[
        KeRecord::next_protocol(&[PROTOCOL_NTPV4]),
        KeRecord::aead_algorithms(algorithms),
        KeRecord::end_of_message(),
    ])
}

/// Parameters the server agreed to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ServerNegotiation {
    /// The next protocol (always NTPv4 here).
    pub protocol: u16,
    /// The AEAD algorithm for cookies and session keys.
    pub algorithm: AeadAlgorithm,
}

/// Outcome of processing a client request on the server.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ServerDecision {
    /// Proceed with key export and cookie issue.
    Accept(ServerNegotiation),
    /// Answer with an Error record carrying `code`.
    Reject {
        /// The NTS-KE error code.
        code: u16,
    },
}

/// Evaluate a client request on the server side.
///
/// Unknown critical records are answered with error 0. A missing or
/// unusable Next Protocol record, or no AEAD algorithm in common with
/// `supported`, is answered with error 1. The client's AEAD preference
/// order is honoured.
pub fn process_client_request(
    records: &[KeRecord],
    supported: &[AeadAlgorithm],
) -> ServerDecision {
    let mut protocols: Option<Vec<u16>> = None;
    let mut algorithms: Vec<u16> = Vec::new();

    for record in records {
        match record.record_type {
            END_OF_MESSAGE => break,
            NEXT_PROTOCOL => match record.u16_list() {
                Ok(list) => protocols = Some(list),
                Err(_) => return ServerDecision::Reject { code: ERROR_BAD_REQUEST },
            },
            AEAD_ALGORITHM => match record.u16_list() {
                Ok(list) => algorithms.extend(list),
                Err(_) => return ServerDecision::Reject { code: ERROR_BAD_REQUEST },
            },
            other if record.critical => {
                debug!(record_type = other, "unrecognized critical NTS-KE record");
                return ServerDecision::Reject {
                    code: ERROR_UNRECOGNIZED_CRITICAL,
                };
            }
            other => debug!(record_type = other, "ignoring NTS-KE record"),
        }
    }

    let Some(protocols) = protocols else {
        debug!("NTS-KE request without next protocol");
        return ServerDecision::Reject { code: ERROR_BAD_REQUEST };
    };
    if !protocols.contains(&PROTOCOL_NTPV4) {
        debug!(?protocols, "NTS-KE request without NTPv4");
        return ServerDecision::Reject { code: ERROR_BAD_REQUEST };
    }

    let chosen = algorithms
        .iter()
        .filter_map(|&id| AeadAlgorithm::from_id(id))
        .find(|alg| supported.contains(alg));
    match chosen {
        Some(algorithm) => ServerDecision::Accept(ServerNegotiation {
            protocol: PROTOCOL_NTPV4,
            algorithm,
        }),
        None => {
            debug!(?algorithms, "no AEAD algorithm in common");
            ServerDecision::Reject { code: ERROR_BAD_REQUEST }
        }
    }
}

/// Encode an error response.
pub fn error_response(code: u16) -> Result<Vec<u8>, KeError> {
    encode_records(&[KeRecord::error(code), KeRecord::end_of_message()])
}

/// Encode a successful server response.
pub fn server_response(
    negotiation: &ServerNegotiation,
    cookies: &[Vec<u8>],
    server: Option<&str>,
    port: Option<u16>,
) -> Result<Vec<u8>, KeError> {
    let mut records = vec![
        KeRecord::next_protocol(&[negotiation.protocol]),
        KeRecord::aead_algorithms(&[negotiation.algorithm]),
    ];
    if let Some(server) = server {
        records.push(KeRecord::server(server));
    }
    if let Some(port) = port {
        records.push(KeRecord::port(port));
    }
    records.extend(cookies.iter().map(|c| KeRecord::new_cookie(c.as_slice())));
    records.push(KeRecord::end_of_message());
    encode_records(&records)
}

/// What a client learned from a successful NTS-KE exchange.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct KeOutcome {
    /// The negotiated next protocol.
    pub protocol: u16,
    /// The negotiated AEAD algorithm.
    pub algorithm: AeadAlgorithm,
    /// Cookies for NTP requests, each to be used once.
    pub cookies: Vec<Vec<u8>>,
    /// NTP server to use instead of the NTS-KE host, if the server named one.
    pub server: Option<String>,
    /// NTP port to use instead of 123, if the server named one.
    pub port: Option<u16>,
}

/// Evaluate the server's response on the client side.
pub fn process_server_response(records: &[KeRecord]) -> Result<KeOutcome, KeError> {
    let mut protocol = None;
    let mut algorithm = None;
    let mut cookies = Vec::new();
    let mut server = None;
    let mut port = None;

    for record in records {
        match record.record_type {
            END_OF_MESSAGE => break,
            ERROR => {
                let code = record.single_u16()?;
                warn!(code, "NTS-KE server returned error");
                return Err(KeError::ServerError { code });
            }
            WARNING => {
                let code = record.single_u16()?;
                warn!(code, "NTS-KE server returned warning");
            }
            NEXT_PROTOCOL => {
                let list = record.u16_list()?;
                if list.as_slice() != [PROTOCOL_NTPV4] {
                    return Err(KeError::NoCommonProtocol);
                }
                protocol = Some(PROTOCOL_NTPV4);
            }
            AEAD_ALGORITHM => {
                let id = record.single_u16()?;
                let alg = AeadAlgorithm::from_id(id)
                    .ok_or(KeError::UnsupportedAead { algorithm: id })?;
                algorithm = Some(alg);
            }
            NEW_COOKIE => cookies.push(record.body.clone()),
            SERVER => {
                let host = String::from_utf8(record.body.clone()).map_err(|_| {
                    KeError::InvalidRecord {
                        record_type: SERVER,
                        reason: "server name is not UTF-8",
                    }
                })?;
                server = Some(host);
            }
            PORT => port = Some(record.single_u16()?),
            other if record.critical => {
                return Err(KeError::UnrecognizedCritical { record_type: other });
            }
            other => debug!(record_type = other, "ignoring NTS-KE record"),
        }
    }

    let protocol = protocol.ok_or(KeError::MissingRecord {
        record: "next protocol",
    })?;
    let algorithm = algorithm.ok_or(KeError::MissingRecord {
        record: "AEAD algorithm",
    })?;
    if cookies.is_empty() {
        return Err(KeError::MissingRecord {
            record: "new cookie",
        });
    }

    debug!(
        algorithm = algorithm.id(),
        cookies = cookies.len(),
        server = server.as_deref(),
        port,
        "NTS-KE negotiation complete"
    );

    Ok(KeOutcome {
        protocol,
        algorithm,
        cookies,
        server,
        port,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ke::record::decode_message;

    const ALL: [AeadAlgorithm; 2] = AeadAlgorithm::SUPPORTED;

    #[test]
    fn test_server_accepts_client_request() {
        let bytes = client_request(&[AeadAlgorithm::AesSivCmac512, AeadAlgorithm::AesSivCmac256])
            .unwrap();
        let records = decode_message(&bytes).unwrap();
        assert_eq!(
            process_client_request(&records, &ALL),
            ServerDecision::Accept(ServerNegotiation {
                protocol: 0,
                algorithm: AeadAlgorithm::AesSivCmac512,
            })
        );
        // Client preference wins only among algorithms the server supports.
        assert_eq!(
            process_client_request(&records, &[AeadAlgorithm::AesSivCmac256]),
            ServerDecision::Accept(ServerNegotiation {
                protocol: 0,
                algorithm: AeadAlgorithm::AesSivCmac256,
            })
        );
    }

    #[test]
    fn test_server_rejects_unknown_critical() {
        let records = vec![
            KeRecord::next_protocol(&[0]),
            KeRecord::new(true, 0x4000, vec![1]),
            KeRecord::end_of_message(),
        ];
        assert_eq!(
            process_client_request(&records, &ALL),
            ServerDecision::Reject { code: 0 }
        );
    }

    #[test]
    fn test_server_ignores_unknown_non_critical() {
        let records = vec![
            KeRecord::next_protocol(&[0]),
            KeRecord::new(false, 0x4000, vec![1]),
            KeRecord::aead_algorithms(&[AeadAlgorithm::AesSivCmac256]),
            KeRecord::end_of_message(),
        ];
        assert!(matches!(
            process_client_request(&records, &ALL),
            ServerDecision::Accept(_)
        ));
    }

    #[test]
    fn test_server_rejects_bad_requests() {
        let no_protocol = vec![
            KeRecord::aead_algorithms(&[AeadAlgorithm::AesSivCmac256]),
            KeRecord::end_of_message(),
        ];
        let wrong_protocol = vec![
            KeRecord::next_protocol(&[0x8001]),
            KeRecord::aead_algorithms(&[AeadAlgorithm::AesSivCmac256]),
            KeRecord::end_of_message(),
        ];
        let unknown_aead = vec![
            KeRecord::next_protocol(&[0]),
            KeRecord::new(true, AEAD_ALGORITHM, vec![0, 30]),
            KeRecord::end_of_message(),
        ];
        for records in [no_protocol, wrong_protocol, unknown_aead] {
            assert_eq!(
                process_client_request(&records, &ALL),
                ServerDecision::Reject { code: 1 }
            );
        }
    }

    #[test]
    fn test_client_processes_server_response() {
        let negotiation = ServerNegotiation {
            protocol: 0,
            algorithm: AeadAlgorithm::AesSivCmac256,
        };
        let cookies = vec![vec![1; 8], vec![2; 8]];
        let bytes =
            server_response(&negotiation, &cookies, Some("time.example"), Some(1123)).unwrap();
        let outcome = process_server_response(&decode_message(&bytes).unwrap()).unwrap();
        assert_eq!(outcome.algorithm, AeadAlgorithm::AesSivCmac256);
        assert_eq!(outcome.cookies, cookies);
        assert_eq!(outcome.server.as_deref(), Some("time.example"));
        assert_eq!(outcome.port, Some(1123));
    }

    #[test]
    fn test_client_surfaces_server_error() {
        let bytes = error_response(1).unwrap();
        assert_eq!(
            process_server_response(&decode_message(&bytes).unwrap()).unwrap_err(),
            KeError::ServerError { code: 1 }
        );
    }

    #[test]
    fn test_client_requires_cookies() {
        let records = vec![
            KeRecord::next_protocol(&[0]),
            KeRecord::aead_algorithms(&[AeadAlgorithm::AesSivCmac256]),
            KeRecord::end_of_message(),
        ];
        assert_eq!(
            process_server_response(&records).unwrap_err(),
            KeError::MissingRecord {
                record: "new cookie"
            }
        );
    }

    #[test]
    fn test_client_rejects_unknown_critical_and_bad_aead() {
        let records = vec![KeRecord::new(true, 0x1234, Vec::new())];
        assert_eq!(
            process_server_response(&records).unwrap_err(),
            KeError::UnrecognizedCritical {
                record_type: 0x1234
            }
        );
        let records = vec![KeRecord::new(true, AEAD_ALGORITHM, vec![0, 16])];
        assert_eq!(
            process_server_response(&records).unwrap_err(),
            KeError::UnsupportedAead { algorithm: 16 }
        );
    }
}
