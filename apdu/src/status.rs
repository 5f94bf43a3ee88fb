// Copyright (c) 2022-2023 The MobileCoin Foundation

//! ISO 7816-4 status words
//!
//! Values are wire visible and must match the Java Card `ISO7816` interface
//! exactly.

use encdec::{DecodeOwned, Encode};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use strum::{Display, EnumIter, EnumString, EnumVariantNames};

use crate::ApduError;

/// Status words returned in the response trailer (SW1 SW2)
#[derive(
    Copy,
    Clone,
    PartialEq,
    Eq,
    Debug,
    EnumString,
    Display,
    EnumVariantNames,
    EnumIter,
    TryFromPrimitive,
    IntoPrimitive,
)]
#[repr(u16)]
pub enum StatusWord {
    /// Normal processing
    NoError = 0x9000,

    /// Response bytes still available, SW2 encodes the count (T=0)
    BytesRemaining00 = 0x6100,

    /// State of non-volatile memory unchanged
    WarningStateUnchanged = 0x6200,

    /// Wrong length
    WrongLength = 0x6700,

    /// Logical channel not supported
    LogicalChannelNotSupported = 0x6881,

    /// Secure messaging not supported
    SecureMessagingNotSupported = 0x6882,

    /// Last command of the chain expected
    LastCommandExpected = 0x6883,

    /// Command chaining not supported
    CommandChainingNotSupported = 0x6884,

    /// Security status not satisfied
    SecurityStatusNotSatisfied = 0x6982,

    /// File invalid
    FileInvalid = 0x6983,

    /// Data invalid
    DataInvalid = 0x6984,

    /// Conditions of use not satisfied
    ConditionsNotSatisfied = 0x6985,

    /// Command not allowed (no current EF)
    CommandNotAllowed = 0x6986,

    /// Applet selection failed
    AppletSelectFailed = 0x6999,

    /// Wrong data
    WrongData = 0x6A80,

    /// Function not supported
    FuncNotSupported = 0x6A81,

    /// File not found
    FileNotFound = 0x6A82,

    /// Record not found
    RecordNotFound = 0x6A83,

    /// Not enough memory space in the file
    FileFull = 0x6A84,

    /// Incorrect parameters P1-P2
    IncorrectP1P2 = 0x6A86,

    /// Wrong parameters P1-P2
    WrongP1P2 = 0x6B00,

    /// Wrong Le field, SW2 encodes the exact length (T=0)
    CorrectLength00 = 0x6C00,

    /// Instruction code not supported or invalid
    InsNotSupported = 0x6D00,

    /// Class not supported
    ClaNotSupported = 0x6E00,

    /// No precise diagnosis
    Unknown = 0x6F00,
}

impl StatusWord {
    /// Build the `61xx` status reporting `n` further response bytes
    /// (`n` of 256 encodes as `00`)
    pub const fn bytes_remaining(n: usize) -> u16 {
        StatusWord::BytesRemaining00 as u16 | (n & 0xFF) as u16
    }

    /// Build the `6Cxx` status requesting a reissue with Le = `n`
    /// (`n` of 256 encodes as `00`)
    pub const fn correct_length(n: usize) -> u16 {
        StatusWord::CorrectLength00 as u16 | (n & 0xFF) as u16
    }

    /// Check whether a raw status word indicates successful processing
    pub const fn is_success(sw: u16) -> bool {
        sw == StatusWord::NoError as u16 || sw & 0xFF00 == StatusWord::BytesRemaining00 as u16
    }
}

impl From<StatusWord> for [u8; 2] {
    fn from(sw: StatusWord) -> Self {
        (sw as u16).to_be_bytes()
    }
}

impl Encode for StatusWord {
    type Error = ApduError;

    fn encode_len(&self) -> Result<usize, ApduError> {
        Ok(2)
    }

    fn encode(&self, buff: &mut [u8]) -> Result<usize, ApduError> {
        if buff.len() < 2 {
            return Err(ApduError::InvalidLength);
        }

        buff[..2].copy_from_slice(&(*self as u16).to_be_bytes());
        Ok(2)
    }
}

impl DecodeOwned for StatusWord {
    type Output = Self;

    type Error = ApduError;

    fn decode_owned(buff: &[u8]) -> Result<(Self::Output, usize), ApduError> {
        if buff.len() < 2 {
            return Err(ApduError::InvalidLength);
        }

        let sw = u16::from_be_bytes([buff[0], buff[1]]);

        match Self::try_from(sw) {
            Ok(v) => Ok((v, 2)),
            Err(_) => Err(ApduError::InvalidEncoding),
        }
    }
}
