// Copyright 2026 U.S. Federal Government (in countries where recognized)
// SPDX-License-Identifier: Apache-2.0

//! Types and constants of the fixed NTP header.
//!
//! Provides [`FromBytes`] and [`ToBytes`] implementations that read and write
//! the header and its fields in network byte order.
//!
//! Documentation is largely derived from IETF RFC 5905.

/// NTP port number.
pub const PORT: u16 = 123;

/// Size of the fixed header in bytes.
pub const HEADER_LEN: usize = 48;

/// Maximum stratum number.
pub const MAXSTRAT: u8 = 16;

mod traits;
mod types;
mod wire;

pub use self::traits::*;
pub use self::types::*;
