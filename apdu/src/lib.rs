// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Wire definitions for the Java Card runtime APDU layer
//!
//! This crate provides the byte-level vocabulary shared by the runtime and its
//! transports: ISO 7816-4 header offsets, command APDU case parsing, CLA byte
//! decoding, status words, protocol bytes and the APDU session state enumeration.
//!
//! Everything here is pure and allocation free so it can be used from
//! constrained targets as well as from host-side tooling.
//!
//! ## Command layout
//!
//! ```text
//!  0       1       2       3       4       5 (short) / 7 (extended)
//! +-------+-------+-------+-------+-------+---------------------------
//! |  CLA  |  INS  |  P1   |  P2   |  Lc   |  CDATA...
//! +-------+-------+-------+-------+-------+---------------------------
//! ```
//!
//! Extended length commands carry a three byte Lc field (`00 Lc1 Lc2`) at
//! offset 4 so command data starts at [OFFSET_EXT_CDATA].

#![no_std]

pub use ledger_proto::ApduError;

pub mod class;
pub mod command;
pub mod protocol;
pub mod state;
pub mod status;

pub use class::Cla;
pub use command::{Case, Command, Header};
pub use protocol::{Media, Protocol, ProtocolType};
pub use state::State;
pub use status::StatusWord;

/// APDU header offset: CLA
pub const OFFSET_CLA: usize = 0;
/// APDU header offset: INS
pub const OFFSET_INS: usize = 1;
/// APDU header offset: P1
pub const OFFSET_P1: usize = 2;
/// APDU header offset: P2
pub const OFFSET_P2: usize = 3;
/// APDU header offset: Lc (or P3 for T=0 TPDUs)
pub const OFFSET_LC: usize = 4;
/// APDU offset of command data in short form commands
pub const OFFSET_CDATA: usize = 5;
/// APDU offset of command data in extended length commands
pub const OFFSET_EXT_CDATA: usize = 7;

/// ISO 7816 interindustry class with no channel, chaining or secure messaging
pub const CLA_ISO7816: u8 = 0x00;

/// SELECT instruction
pub const INS_SELECT: u8 = 0xA4;

/// EXTERNAL AUTHENTICATE instruction
pub const INS_EXTERNAL_AUTHENTICATE: u8 = 0x82;

/// GET RESPONSE instruction, issued by T=0 readers after `61xx`
pub const INS_GET_RESPONSE: u8 = 0xC0;

/// Largest value representable by a Java Card `short`, used to saturate
/// lengths and capacities reported to applets
pub const MAX_SHORT: usize = 32767;
