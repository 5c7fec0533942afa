// Copyright 2026 U.S. Federal Government (in countries where recognized)
// SPDX-License-Identifier: Apache-2.0

use std::fmt;

/// **NTP Short Format** - Used in delay and dispersion header fields where the full resolution
/// and range of the other formats are not justified. It includes a 16-bit unsigned seconds field
/// and a 16-bit fraction field.
///
/// ### Layout
///
/// ```ignore
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |          Seconds              |           Fraction            |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct ShortFormat {
    /// Whole seconds.
    pub seconds: u16,
    /// Fraction of a second in units of 2^-16 s.
    pub fraction: u16,
}

impl ShortFormat {
    /// Build from the raw 32-bit wire value.
    pub const fn from_bits(bits: u32) -> Self {
        ShortFormat {
            seconds: (bits >> 16) as u16,
            fraction: bits as u16,
        }
    }

    /// The raw 32-bit wire value.
    pub const fn to_bits(self) -> u32 {
        ((self.seconds as u32) << 16) | self.fraction as u32
    }

    /// Value in seconds.
    pub fn as_secs_f64(self) -> f64 {
        self.to_bits() as f64 / 65536.0
    }

    /// Nearest representable value to `secs`, saturating at the format's range.
    pub fn from_secs_f64(secs: f64) -> Self {
        let bits = (secs * 65536.0).round().clamp(0.0, u32::MAX as f64);
        ShortFormat::from_bits(bits as u32)
    }
}

/// A 64-bit NTP timestamp: seconds since 1900-01-01T00:00:00Z in the upper
/// 32 bits and a binary fraction of a second in the lower 32 bits.
///
/// The value round-trips losslessly through [`NtpTimestamp::to_bits`].
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct NtpTimestamp(u64);

impl NtpTimestamp {
    /// The NTP epoch itself (all zero bits).
    pub const ZERO: Self = NtpTimestamp(0);

    /// Build from seconds and a 2^-32 fraction.
    pub const fn new(seconds: u32, fraction: u32) -> Self {
        NtpTimestamp(((seconds as u64) << 32) | fraction as u64)
    }

    /// Build from the raw 64-bit wire value.
    pub const fn from_bits(bits: u64) -> Self {
        NtpTimestamp(bits)
    }

    /// The raw 64-bit wire value.
    pub const fn to_bits(self) -> u64 {
        self.0
    }

    /// Whole seconds since the start of the era.
    pub const fn seconds(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Fraction of a second in units of 2^-32 s.
    pub const fn fraction(self) -> u32 {
        self.0 as u32
    }

    /// Signed difference `self - earlier` in seconds, assuming both lie within
    /// half an era of each other.
    pub fn diff_secs(self, earlier: NtpTimestamp) -> f64 {
        (self.0.wrapping_sub(earlier.0) as i64) as f64 / 4_294_967_296.0
    }
}

impl fmt::Display for NtpTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:08x}", self.seconds(), self.fraction())
    }
}

/// Warning of an impending leap second to be inserted or deleted in the last minute of the
/// current month.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
#[repr(u8)]
pub enum LeapIndicator {
    /// No warning.
    #[default]
    NoWarning = 0,
    /// Last minute of the day has 61 seconds.
    AddOne = 1,
    /// Last minute of the day has 59 seconds.
    SubOne = 2,
    /// Unknown (clock unsynchronized).
    Unknown = 3,
}

impl LeapIndicator {
    /// Decode from the low two bits of `bits`.
    pub const fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0 => LeapIndicator::NoWarning,
            1 => LeapIndicator::AddOne,
            2 => LeapIndicator::SubOne,
            _ => LeapIndicator::Unknown,
        }
    }
}

/// The 3-bit NTP version number. Every value 0-7 is representable so that
/// arbitrary headers survive a decode/encode cycle.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Version(u8);

impl Version {
    /// NTPv3 (RFC 1305).
    pub const V3: Self = Version(3);
    /// NTPv4 (RFC 5905). NTS is defined only for this version.
    pub const V4: Self = Version(4);

    /// Build from the low three bits of `bits`.
    pub const fn from_bits(bits: u8) -> Self {
        Version(bits & 0b111)
    }

    /// The numeric version.
    pub const fn value(self) -> u8 {
        self.0
    }
}

/// A 3-bit integer representing the association mode.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
#[repr(u8)]
pub enum Mode {
    /// Reserved.
    #[default]
    Reserved = 0,
    /// Symmetric active.
    SymmetricActive = 1,
    /// Symmetric passive.
    SymmetricPassive = 2,
    /// Client.
    Client = 3,
    /// Server.
    Server = 4,
    /// Broadcast.
    Broadcast = 5,
    /// NTP control message.
    Control = 6,
    /// Reserved for private use.
    Private = 7,
}

impl Mode {
    /// Decode from the low three bits of `bits`.
    pub const fn from_bits(bits: u8) -> Self {
        match bits & 0b111 {
            0 => Mode::Reserved,
            1 => Mode::SymmetricActive,
            2 => Mode::SymmetricPassive,
            3 => Mode::Client,
            4 => Mode::Server,
            5 => Mode::Broadcast,
            6 => Mode::Control,
            _ => Mode::Private,
        }
    }
}

/// An 8-bit integer representing the stratum.
///
/// ```ignore
/// +--------+-----------------------------------------------------+
/// | Value  | Meaning                                             |
/// +--------+-----------------------------------------------------+
/// | 0      | unspecified or invalid (Kiss-o'-Death)              |
/// | 1      | primary server (e.g., equipped with a GPS receiver) |
/// | 2-15   | secondary server (via NTP)                          |
/// | 16     | unsynchronized                                      |
/// | 17-255 | reserved                                            |
/// +--------+-----------------------------------------------------+
/// ```
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Stratum(pub u8);

impl Stratum {
    /// Unspecified or invalid; a response with this stratum is a Kiss-o'-Death.
    pub const UNSPECIFIED: Self = Stratum(0);
    /// The primary server (e.g. equipped with a GPS receiver).
    pub const PRIMARY: Self = Stratum(1);
    /// The minimum value specifying a secondary server.
    pub const SECONDARY_MIN: Self = Stratum(2);
    /// The maximum value specifying a secondary server.
    pub const SECONDARY_MAX: Self = Stratum(15);
    /// Unsynchronized.
    pub const UNSYNCHRONIZED: Self = Stratum(16);

    /// Whether this stratum marks a Kiss-o'-Death response.
    pub const fn is_kiss_of_death(self) -> bool {
        self.0 == 0
    }
}

/// The 32-bit reference identifier.
///
/// Its meaning depends on the stratum: an ASCII source name for primary
/// servers, an address or hash for secondaries, and a [`KissCode`] when the
/// stratum is zero. The raw bytes are always preserved.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct ReferenceId(pub [u8; 4]);

impl ReferenceId {
    /// Build from a four-character ASCII code such as `*b"GPS\0"`.
    pub const fn from_ascii(code: [u8; 4]) -> Self {
        ReferenceId(code)
    }

    /// The identifier as a big-endian integer.
    pub const fn to_u32(self) -> u32 {
        u32::from_be_bytes(self.0)
    }

    /// Interpret as a Kiss-o'-Death code.
    pub fn kiss_code(self) -> KissCode {
        KissCode::from_bytes(self.0)
    }
}

impl From<KissCode> for ReferenceId {
    fn from(code: KissCode) -> Self {
        ReferenceId(code.to_bytes())
    }
}

/// What a client may do after receiving a given Kiss-o'-Death code.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum RetryPolicy {
    /// Stop querying this server.
    Never,
    /// The same request may be repeated after increasing the poll interval.
    AfterBackoff,
    /// Cookies are stale; run NTS-KE again before sending anything else.
    AfterKeyExchange,
}

/// Kiss-o'-Death codes (RFC 5905 §7.4, RFC 8915 §5.7).
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum KissCode {
    /// The association belongs to a unicast server.
    Acst,
    /// Server authentication failed.
    Auth,
    /// Autokey sequence failed.
    Auto,
    /// The association belongs to a broadcast server.
    Bcst,
    /// Cryptographic authentication or identification failed.
    Cryp,
    /// Access denied by remote server.
    Deny,
    /// Lost peer in symmetric mode.
    Drop,
    /// Access denied due to local policy.
    Rstr,
    /// The association has not yet synchronized for the first time.
    Init,
    /// The association belongs to a dynamically discovered server.
    Mcst,
    /// No key found.
    Nkey,
    /// NTS negative acknowledgment: the server could not decrypt the cookie.
    Ntsn,
    /// Rate exceeded.
    Rate,
    /// Somebody is tinkering with the association from a remote host.
    Rmot,
    /// A step change in system time has occurred.
    Step,
    /// A code not in the registry; the raw bytes are kept.
    Other([u8; 4]),
}

impl KissCode {
    /// Decode from the four reference identifier bytes.
    pub fn from_bytes(code: [u8; 4]) -> Self {
        match &code {
            b"ACST" => KissCode::Acst,
            b"AUTH" => KissCode::Auth,
            b"AUTO" => KissCode::Auto,
            b"BCST" => KissCode::Bcst,
            b"CRYP" => KissCode::Cryp,
            b"DENY" => KissCode::Deny,
            b"DROP" => KissCode::Drop,
            b"RSTR" => KissCode::Rstr,
            b"INIT" => KissCode::Init,
            b"MCST" => KissCode::Mcst,
            b"NKEY" => KissCode::Nkey,
            b"NTSN" => KissCode::Ntsn,
            b"RATE" => KissCode::Rate,
            b"RMOT" => KissCode::Rmot,
            b"STEP" => KissCode::Step,
            _ => KissCode::Other(code),
        }
    }

    /// The four ASCII bytes carried in the reference identifier.
    pub fn to_bytes(self) -> [u8; 4] {
        match self {
            KissCode::Acst => *b"ACST",
            KissCode::Auth => *b"AUTH",
            KissCode::Auto => *b"AUTO",
            KissCode::Bcst => *b"BCST",
            KissCode::Cryp => *b"CRYP",
            KissCode::Deny => *b"DENY",
            KissCode::Drop => *b"DROP",
            KissCode::Rstr => *b"RSTR",
            KissCode::Init => *b"INIT",
            KissCode::Mcst => *b"MCST",
            KissCode::Nkey => *b"NKEY",
            KissCode::Ntsn => *b"NTSN",
            KissCode::Rate => *b"RATE",
            KissCode::Rmot => *b"RMOT",
            KissCode::Step => *b"STEP",
            KissCode::Other(code) => code,
        }
    }

    /// Human-readable rejection reason.
    pub fn reason(self) -> &'static str {
        match self {
            KissCode::Acst => "association belongs to a unicast server",
            KissCode::Auth => "server authentication failed",
            KissCode::Auto => "autokey sequence failed",
            KissCode::Bcst => "association belongs to a broadcast server",
            KissCode::Cryp => "cryptographic authentication or identification failed",
            KissCode::Deny => "access denied by remote server",
            KissCode::Drop => "lost peer in symmetric mode",
            KissCode::Rstr => "access denied due to local policy",
            KissCode::Init => "association not yet synchronized",
            KissCode::Mcst => "association belongs to a dynamically discovered server",
            KissCode::Nkey => "no key found",
            KissCode::Ntsn => "NTS cookie could not be decrypted",
            KissCode::Rate => "rate exceeded",
            KissCode::Rmot => "remote alteration of association",
            KissCode::Step => "step change in system time",
            KissCode::Other(_) => "unrecognized kiss code",
        }
    }

    /// The retry policy a well-behaved client follows for this code.
    pub fn retry_policy(self) -> RetryPolicy {
        match self {
            KissCode::Rate => RetryPolicy::AfterBackoff,
            KissCode::Ntsn => RetryPolicy::AfterKeyExchange,
            _ => RetryPolicy::Never,
        }
    }
}

impl fmt::Display for KissCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.to_bytes() {
            let c = if b.is_ascii_graphic() { b as char } else { '?' };
            write!(f, "{c}")?;
        }
        Ok(())
    }
}

/// The fixed 48-byte NTP header (RFC 5905 §7.3).
///
/// ```ignore
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |LI | VN  |Mode |    Stratum     |     Poll      |  Precision   |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                         Root Delay                            |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                         Root Dispersion                       |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                          Reference ID                         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// +                     Reference Timestamp (64)                  +
/// +                      Origin Timestamp (64)                    +
/// +                      Receive Timestamp (64)                   +
/// +                      Transmit Timestamp (64)                  +
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct Header {
    /// Leap second warning.
    pub leap_indicator: LeapIndicator,
    /// Protocol version.
    pub version: Version,
    /// Association mode.
    pub mode: Mode,
    /// Stratum; zero marks a Kiss-o'-Death.
    pub stratum: Stratum,
    /// Maximum interval between successive messages, log2 seconds.
    pub poll: i8,
    /// Precision of the system clock, log2 seconds.
    pub precision: i8,
    /// Total round-trip delay to the reference clock.
    pub root_delay: ShortFormat,
    /// Total dispersion to the reference clock.
    pub root_dispersion: ShortFormat,
    /// Reference identifier, or the kiss code when stratum is zero.
    pub reference_id: ReferenceId,
    /// Time the system clock was last set or corrected.
    pub reference_timestamp: NtpTimestamp,
    /// Client transmit time echoed by the server.
    pub origin_timestamp: NtpTimestamp,
    /// Time the request arrived at the server.
    pub receive_timestamp: NtpTimestamp,
    /// Time the packet departed. `None` is replaced with the current time
    /// when the header is encoded; decoding always yields `Some`.
    pub transmit_timestamp: Option<NtpTimestamp>,
}

impl Header {
    /// A client-mode NTPv4 request header with the given transmit time.
    pub fn client_request(transmit: NtpTimestamp) -> Self {
        Header {
            leap_indicator: LeapIndicator::Unknown,
            version: Version::V4,
            mode: Mode::Client,
            transmit_timestamp: Some(transmit),
            ..Header::default()
        }
    }

    /// The kiss code carried by this header, if it is a Kiss-o'-Death.
    pub fn kiss_code(&self) -> Option<KissCode> {
        self.stratum
            .is_kiss_of_death()
            .then(|| self.reference_id.kiss_code())
    }
}
