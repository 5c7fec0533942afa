// Copyright 2026 U.S. Federal Government (in countries where recognized)
// SPDX-License-Identifier: Apache-2.0

//! Client side of an NTS-protected time exchange (RFC 8915 §5.7).

use tracing::debug;

use super::builder::{EntropySource, PacketBuilder};
use super::packet::{AadLayout, DecodeOptions, Protection, parse_response};
use super::UNIQUE_ID_LEN;
use crate::crypto::AesSivKey;
use crate::error::{NtsError, ParseError};
use crate::protocol::{Header, Mode, NtpTimestamp};

/// An encoded client request and the values needed to validate its response.
#[derive(Clone, Debug)]
pub struct ClientRequest {
    /// The Unique Identifier sent with the request.
    pub unique_id: Vec<u8>,
    /// The transmit timestamp written into the header (T1).
    pub transmit: NtpTimestamp,
    /// The wire bytes.
    pub bytes: Vec<u8>,
}

/// Build an NTS client request.
///
/// The request carries a fresh Unique Identifier, `cookie`, and
/// `placeholders` cookie placeholders of the same length, all covered by an
/// authenticator sealed with the client-to-server key.
pub fn build_client_request(
    c2s: &AesSivKey,
    cookie: &[u8],
    placeholders: usize,
    aad_layout: AadLayout,
    entropy: &mut dyn EntropySource,
) -> Result<ClientRequest, NtsError> {
    let mut unique_id = vec![0u8; UNIQUE_ID_LEN];
    entropy.fill_bytes(&mut unique_id);
    let transmit = NtpTimestamp::now();

    let mut builder = PacketBuilder::new(Header::client_request(transmit))
        .unique_identifier(unique_id.clone())
        .cookie(cookie)
        .aad_layout(aad_layout);
    for _ in 0..placeholders {
        builder = builder.cookie_placeholder(cookie.len());
    }
    let bytes = builder.build_sealed(c2s, entropy)?;

    Ok(ClientRequest {
        unique_id,
        transmit,
        bytes,
    })
}

/// A validated server response.
#[derive(Clone, Debug)]
pub struct ServerResponse {
    /// The response header.
    pub header: Header,
    /// Fresh cookies found under the authenticator.
    pub cookies: Vec<Vec<u8>>,
}

/// Validate a server response to `request`.
///
/// Checks, in order: Kiss-o'-Death (after matching the Unique Identifier),
/// the Unique Identifier, the authenticator under the server-to-client key,
/// the mode, and that the origin timestamp echoes the request's transmit
/// timestamp. Cookies are harvested only from fields the authenticator covers.
pub fn validate_server_response(
    buf: &[u8],
    s2c: &AesSivKey,
    request: &ClientRequest,
    aad_layout: AadLayout,
) -> Result<ServerResponse, NtsError> {
    let opts = DecodeOptions::with_key(s2c)
        .expect_unique_id(&request.unique_id)
        .aad_layout(aad_layout);
    let packet = parse_response(buf, &opts)?;

    if packet.unique_identifier().is_none() {
        return Err(NtsError::MissingField {
            field: "unique identifier",
        });
    }
    if !packet.is_authenticated() {
        return Err(NtsError::MissingField {
            field: "authenticator",
        });
    }
    if packet.header.mode != Mode::Server {
        return Err(ParseError::InvalidField {
            field: "mode",
            value: packet.header.mode as u32,
        }
        .into());
    }
    if packet.header.origin_timestamp != request.transmit {
        debug!(
            origin = %packet.header.origin_timestamp,
            expected = %request.transmit,
            "origin timestamp does not echo request"
        );
        return Err(ParseError::InvalidField {
            field: "origin timestamp",
            value: packet.header.origin_timestamp.seconds(),
        }
        .into());
    }

    let cookies: Vec<Vec<u8>> = packet
        .cookies(Protection::Authenticated)
        .map(<[u8]>::to_vec)
        .collect();
    debug!(cookies = cookies.len(), "validated NTS response");

    Ok(ServerResponse {
        header: packet.header,
        cookies,
    })
}
