// Copyright 2026 U.S. Federal Government (in countries where recognized)
// SPDX-License-Identifier: Apache-2.0

//! Response construction: plain server replies, Kiss-o'-Death packets and
//! NTS-protected replies carrying fresh cookies.

use ntsec_proto::ke::SessionKeys;
use ntsec_proto::nts::{
    AadLayout, DecodeOptions, EntropySource, NtpPacket, NtsField, PacketBuilder, Protection,
    parse_packet,
};
use ntsec_proto::protocol::{
    Header, KissCode, LeapIndicator, Mode, NtpTimestamp, ReferenceId, ShortFormat, Stratum,
};

use crate::cookie::{MasterKeyStore, cookie_len};
use crate::error::{NtpServerError, NtsError};
use crate::state::ServerSystemState;

/// Most cookies returned in one response: the consumed one plus seven placeholders.
pub const MAX_COOKIES_PER_RESPONSE: usize = 8;

/// Build a server-mode header answering `request`.
///
/// The transmit timestamp is left unset so it is stamped when the header is
/// encoded, as late as possible.
pub(crate) fn build_server_header(
    request: &Header,
    state: &ServerSystemState,
    t2: NtpTimestamp,
) -> Header {
    Header {
        leap_indicator: state.leap_indicator,
        version: request.version,
        mode: Mode::Server,
        stratum: state.stratum,
        poll: request.poll,
        precision: state.precision,
        root_delay: state.root_delay,
        root_dispersion: state.root_dispersion,
        reference_id: state.reference_id,
        reference_timestamp: state.reference_timestamp,
        origin_timestamp: request.transmit_timestamp.unwrap_or(NtpTimestamp::ZERO),
        receive_timestamp: t2,
        transmit_timestamp: None,
    }
}

/// Build a Kiss-o'-Death header (RFC 5905 Section 7.4).
pub(crate) fn build_kod_header(request: &Header, code: KissCode) -> Header {
    Header {
        leap_indicator: LeapIndicator::Unknown,
        version: request.version,
        mode: Mode::Server,
        stratum: Stratum::UNSPECIFIED,
        poll: request.poll,
        precision: 0,
        root_delay: ShortFormat::default(),
        root_dispersion: ShortFormat::default(),
        reference_id: ReferenceId::from(code),
        reference_timestamp: NtpTimestamp::ZERO,
        origin_timestamp: request.transmit_timestamp.unwrap_or(NtpTimestamp::ZERO),
        receive_timestamp: NtpTimestamp::ZERO,
        transmit_timestamp: Some(NtpTimestamp::ZERO),
    }
}

/// Encode a Kiss-o'-Death, echoing the request's Unique Identifier if it had one.
///
/// No authenticator is attached: an NTS NAK is sent precisely because the
/// server could not recover the session keys.
pub(crate) fn kod_response(
    request: &Header,
    code: KissCode,
    unique_id: Option<&[u8]>,
) -> Result<Vec<u8>, NtpServerError> {
    let header = build_kod_header(request, code);
    match unique_id {
        Some(uid) => Ok(PacketBuilder::new(header).unique_identifier(uid).build()?),
        None => Ok(header.encode().to_vec()),
    }
}

fn authenticated_placeholders(packet: &NtpPacket, min_len: usize) -> usize {
    packet
        .extensions
        .iter()
        .filter(|ext| ext.protection >= Protection::Authenticated)
        .filter(|ext| matches!(ext.field, NtsField::CookiePlaceholder { len } if len >= min_len))
        .count()
}

/// Verify an NTS request under the cookie's keys and build the sealed reply.
///
/// The reply echoes the Unique Identifier and carries one fresh cookie for
/// the consumed one plus one per authenticated placeholder at least as long
/// as a cookie, all encrypted under the authenticator.
#[allow(clippy::too_many_arguments)]
pub(crate) fn nts_response(
    recv_buf: &[u8],
    request: &Header,
    keys: &SessionKeys,
    key_store: &MasterKeyStore,
    state: &ServerSystemState,
    aad_layout: AadLayout,
    t2: NtpTimestamp,
    entropy: &mut dyn EntropySource,
) -> Result<Vec<u8>, NtpServerError> {
    let opts = DecodeOptions::with_key(&keys.c2s).aad_layout(aad_layout);
    let packet = parse_packet(recv_buf, &opts)?;
    if !packet.is_authenticated() {
        return Err(NtsError::MissingExtension {
            field: "NTS authenticator",
        }
        .into());
    }

    let unique_id = packet
        .extensions
        .iter()
        .filter(|ext| ext.protection >= Protection::Authenticated)
        .find_map(|ext| match &ext.field {
            NtsField::UniqueIdentifier(uid) => Some(uid.as_slice()),
            _ => None,
        })
        .ok_or(NtsError::MissingExtension {
            field: "unique identifier",
        })?;

    let wanted = (1 + authenticated_placeholders(&packet, cookie_len(keys.algorithm)))
        .min(MAX_COOKIES_PER_RESPONSE);

    let mut builder = PacketBuilder::new(build_server_header(request, state, t2))
        .unique_identifier(unique_id)
        .aad_layout(aad_layout);
    for _ in 0..wanted {
        let cookie = key_store
            .encrypt_cookie(keys, entropy)
            .map_err(ntsec_proto::NtsError::from)?;
        builder = builder.encrypted(NtsField::Cookie(cookie));
    }
    Ok(builder.build_sealed(&keys.s2c, entropy)?)
}
