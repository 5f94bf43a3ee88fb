// Copyright (c) 2022-2023 The MobileCoin Foundation

use jcre_apdu::StatusWord;

/// `APDUException` reason: illegal use of the APDU state machine
pub const APDU_ILLEGAL_USE: u16 = 1;
/// `APDUException` reason: buffer bounds exceeded
pub const APDU_BUFFER_BOUNDS: u16 = 2;
/// `APDUException` reason: length not permitted
pub const APDU_BAD_LENGTH: u16 = 3;
/// `APDUException` reason: unrecoverable I/O error
pub const APDU_IO_ERROR: u16 = 4;
/// `APDUException` reason: T=0 reader did not issue GET RESPONSE
pub const APDU_NO_T0_GETRESPONSE: u16 = 0xAA;
/// `APDUException` reason: T=1 reader aborted the exchange
pub const APDU_T1_IFD_ABORT: u16 = 0xAB;
/// `APDUException` reason: T=0 reader did not reissue with corrected Le
pub const APDU_NO_T0_REISSUE: u16 = 0xAC;

/// `TransactionException` reason: transaction already in progress
pub const TRANSACTION_IN_PROGRESS: u16 = 1;
/// `TransactionException` reason: no transaction in progress
pub const TRANSACTION_NOT_IN_PROGRESS: u16 = 2;
/// `TransactionException` reason: commit buffer full
pub const TRANSACTION_BUFFER_FULL: u16 = 3;
/// `TransactionException` reason: internal failure
pub const TRANSACTION_INTERNAL_FAILURE: u16 = 4;

/// Runtime errors
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "thiserror", derive(thiserror::Error))]
#[repr(u8)]
pub enum Error {
    /// APDU method called outside of its valid state
    #[cfg_attr(feature = "thiserror", error("illegal use of APDU session"))]
    IllegalUse = 0x00,

    /// Not enough APDU buffer space
    #[cfg_attr(feature = "thiserror", error("APDU buffer bounds exceeded"))]
    BufferBounds = 0x01,

    /// Length outside protocol limits
    #[cfg_attr(feature = "thiserror", error("bad length"))]
    BadLength = 0x02,

    /// Unrecoverable transport error
    #[cfg_attr(feature = "thiserror", error("I/O error"))]
    IoError = 0x03,

    /// T=0 reader did not send GET RESPONSE following `61xx`
    #[cfg_attr(feature = "thiserror", error("no T=0 GET RESPONSE"))]
    NoT0GetResponse = 0x04,

    /// T=1 reader aborted the exchange
    #[cfg_attr(feature = "thiserror", error("T=1 IFD abort"))]
    T1IfdAbort = 0x05,

    /// T=0 reader did not reissue the command following `6Cxx`
    #[cfg_attr(feature = "thiserror", error("no T=0 reissue"))]
    NoT0Reissue = 0x06,

    /// Transaction already open
    #[cfg_attr(feature = "thiserror", error("transaction already in progress"))]
    TransactionAlreadyInProgress = 0x10,

    /// No transaction open
    #[cfg_attr(feature = "thiserror", error("transaction not in progress"))]
    TransactionNotInProgress = 0x11,

    /// Commit buffer capacity exceeded
    #[cfg_attr(feature = "thiserror", error("commit capacity exceeded"))]
    CommitCapacityExceeded = 0x12,

    /// Journal record corrupted
    #[cfg_attr(feature = "thiserror", error("transaction internal failure"))]
    TransactionInternalFailure = 0x13,

    /// Persistent store lost power part way through an update
    #[cfg_attr(feature = "thiserror", error("power lost"))]
    PowerLoss = 0x20,

    /// Array or store index out of range
    #[cfg_attr(feature = "thiserror", error("index out of bounds"))]
    OutOfBounds = 0x21,

    /// Parameter outside the permitted domain
    #[cfg_attr(feature = "thiserror", error("illegal value"))]
    IllegalValue = 0x22,

    /// Applet requested a specific status word (`ISOException`)
    #[cfg_attr(feature = "thiserror", error("ISO status {0:04x}"))]
    Iso(u16) = 0x30,
}

impl Error {
    /// Java Card exception reason code, `None` for errors that are not
    /// `APDUException` or `TransactionException`
    pub const fn reason(&self) -> Option<u16> {
        let r = match self {
            Error::IllegalUse => APDU_ILLEGAL_USE,
            Error::BufferBounds => APDU_BUFFER_BOUNDS,
            Error::BadLength => APDU_BAD_LENGTH,
            Error::IoError => APDU_IO_ERROR,
            Error::NoT0GetResponse => APDU_NO_T0_GETRESPONSE,
            Error::T1IfdAbort => APDU_T1_IFD_ABORT,
            Error::NoT0Reissue => APDU_NO_T0_REISSUE,
            Error::TransactionAlreadyInProgress => TRANSACTION_IN_PROGRESS,
            Error::TransactionNotInProgress => TRANSACTION_NOT_IN_PROGRESS,
            Error::CommitCapacityExceeded => TRANSACTION_BUFFER_FULL,
            Error::TransactionInternalFailure => TRANSACTION_INTERNAL_FAILURE,
            _ => return None,
        };

        Some(r)
    }

    /// Status word returned when this error escapes an applet
    pub const fn status(&self) -> u16 {
        match self {
            Error::Iso(sw) => *sw,
            _ => StatusWord::Unknown as u16,
        }
    }
}

impl From<StatusWord> for Error {
    fn from(sw: StatusWord) -> Self {
        Error::Iso(sw.into())
    }
}

impl From<ledger_proto::ApduError> for Error {
    fn from(_: ledger_proto::ApduError) -> Self {
        Error::BadLength
    }
}
