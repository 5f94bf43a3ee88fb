// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Transport seam between the [`ApduSession`][crate::ApduSession] and the reader
//!
//! Implementations own TPDU framing for the negotiated protocol, the session
//! drives them through the half duplex exchange for a single command.

use jcre_apdu::Protocol;
use strum::{Display, EnumIter};

use crate::Error;

#[cfg(feature = "alloc")]
mod sim;
#[cfg(feature = "alloc")]
pub use sim::{Event, Faults, SimTransport};

/// Outgoing block size reported for T=0 (256 data bytes plus SW1 SW2)
pub const T0_OUT_BLOCK_SIZE: usize = 258;

/// Default T=1 information field size
pub const T1_DEFAULT_IFS: usize = 254;

/// Largest T=1 information field size (ISO 7816-3)
pub const T1_MAX_IFS: usize = 254;

/// Transport faults
#[derive(Copy, Clone, PartialEq, Eq, Debug, Display, EnumIter)]
pub enum TransportError {
    /// T=1 reader aborted the chain
    IfdAbort,
    /// T=0 reader did not follow `61xx` with GET RESPONSE
    NoGetResponse,
    /// T=0 reader did not reissue the command following `6Cxx`
    NoReissue,
    /// Any other unrecoverable link failure
    Io,
}

/// Negotiated link parameters
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Link {
    pub protocol: Protocol,
    /// Card information field size (incoming block size, T=1)
    pub ifsc: usize,
    /// Device information field size (outgoing block size, T=1)
    pub ifsd: usize,
    /// T=1 node address byte
    pub nad: u8,
}

impl Link {
    /// Contact T=0 link
    pub const fn t0() -> Self {
        Self {
            protocol: Protocol::T0,
            ifsc: 1,
            ifsd: T0_OUT_BLOCK_SIZE,
            nad: 0,
        }
    }

    /// Contact T=1 link with the provided information field sizes
    pub const fn t1(ifsc: usize, ifsd: usize) -> Self {
        Self {
            protocol: Protocol::T1,
            ifsc,
            ifsd,
            nad: 0,
        }
    }

    /// Check the T=1 information field sizes lie within `1..=254`
    pub fn validate(&self) -> Result<(), Error> {
        if self.protocol.is_t0() {
            return Ok(());
        }

        let ifs = 1..=T1_MAX_IFS;
        if !ifs.contains(&self.ifsc) || !ifs.contains(&self.ifsd) {
            return Err(Error::IllegalValue);
        }

        Ok(())
    }

    /// Incoming block size, 1 for byte oriented T=0
    pub fn in_block_size(&self) -> usize {
        if self.protocol.is_t0() {
            1
        } else {
            self.ifsc
        }
    }

    /// Outgoing block size, including room for the status word
    pub fn out_block_size(&self) -> usize {
        if self.protocol.is_t0() {
            T0_OUT_BLOCK_SIZE
        } else {
            self.ifsd
        }
    }
}

impl Default for Link {
    fn default() -> Self {
        Self::t1(T1_DEFAULT_IFS, T1_DEFAULT_IFS)
    }
}

/// [`Transport`] trait provides the reader side of a command exchange
pub trait Transport {
    /// Link parameters for the current card session
    fn link(&self) -> Link;

    /// Complete command APDU as issued by the reader
    fn command(&self) -> &[u8];

    /// Receive the next chunk of command data into `buff`, returning the
    /// number of bytes received (0 when none remain)
    fn receive(&mut self, buff: &mut [u8]) -> Result<usize, TransportError>;

    /// Transmit a block of response data
    fn transmit(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// T=0 only: send `61xx` advertising `available` bytes and await GET
    /// RESPONSE, returning the reader's Le (0 encodes 256)
    fn get_response(&mut self, available: usize) -> Result<u8, TransportError>;

    /// T=0 only: send `6Cxx` and await the command reissued with Le = `len`
    fn reissue(&mut self, len: usize) -> Result<(), TransportError>;

    /// Request more processing time (T=0 NULL procedure byte, T=1 S(WTX))
    fn wait_extension(&mut self) -> Result<(), TransportError>;

    /// Send the final status word
    fn status(&mut self, sw: u16) -> Result<(), TransportError>;
}

impl<T: Transport> Transport for &mut T {
    fn link(&self) -> Link {
        T::link(self)
    }

    fn command(&self) -> &[u8] {
        T::command(self)
    }

    fn receive(&mut self, buff: &mut [u8]) -> Result<usize, TransportError> {
        T::receive(self, buff)
    }

    fn transmit(&mut self, data: &[u8]) -> Result<(), TransportError> {
        T::transmit(self, data)
    }

    fn get_response(&mut self, available: usize) -> Result<u8, TransportError> {
        T::get_response(self, available)
    }

    fn reissue(&mut self, len: usize) -> Result<(), TransportError> {
        T::reissue(self, len)
    }

    fn wait_extension(&mut self) -> Result<(), TransportError> {
        T::wait_extension(self)
    }

    fn status(&mut self, sw: u16) -> Result<(), TransportError> {
        T::status(self, sw)
    }
}
