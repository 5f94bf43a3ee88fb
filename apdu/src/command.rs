// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Command APDU parsing
//!
//! Commands are classified into the seven ISO 7816-4 cases from the body that
//! follows the four byte header:
//!
//! ```text
//! case 1   | CLA INS P1 P2 |
//! case 2S  | CLA INS P1 P2 | Le |
//! case 3S  | CLA INS P1 P2 | Lc | data |
//! case 4S  | CLA INS P1 P2 | Lc | data | Le |
//! case 2E  | CLA INS P1 P2 | 00 Le1 Le2 |
//! case 3E  | CLA INS P1 P2 | 00 Lc1 Lc2 | data |
//! case 4E  | CLA INS P1 P2 | 00 Lc1 Lc2 | data | Le1 Le2 |
//! ```

use core::ops::Range;

use byteorder::{BigEndian, ByteOrder};
use encdec::{DecodeOwned, Encode};
use strum::{Display, EnumIter};

use crate::{ApduError, Cla, OFFSET_CDATA, OFFSET_EXT_CDATA};

/// Length of the fixed CLA INS P1 P2 header
pub const HEADER_LEN: usize = 4;

/// Four byte command header
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub struct Header {
    pub cla: u8,
    pub ins: u8,
    pub p1: u8,
    pub p2: u8,
}

impl Header {
    pub const fn new(cla: u8, ins: u8, p1: u8, p2: u8) -> Self {
        Self { cla, ins, p1, p2 }
    }

    /// Fetch the decoded class byte
    pub const fn class(&self) -> Cla {
        Cla(self.cla)
    }
}

impl Encode for Header {
    type Error = ApduError;

    fn encode_len(&self) -> Result<usize, ApduError> {
        Ok(HEADER_LEN)
    }

    fn encode(&self, buff: &mut [u8]) -> Result<usize, ApduError> {
        if buff.len() < HEADER_LEN {
            return Err(ApduError::InvalidLength);
        }

        buff[..HEADER_LEN].copy_from_slice(&[self.cla, self.ins, self.p1, self.p2]);

        Ok(HEADER_LEN)
    }
}

impl DecodeOwned for Header {
    type Output = Self;

    type Error = ApduError;

    fn decode_owned(buff: &[u8]) -> Result<(Self::Output, usize), ApduError> {
        if buff.len() < HEADER_LEN {
            return Err(ApduError::InvalidLength);
        }

        Ok((Self::new(buff[0], buff[1], buff[2], buff[3]), HEADER_LEN))
    }
}

/// ISO 7816-4 command case
#[derive(Copy, Clone, PartialEq, Eq, Debug, Display, EnumIter)]
pub enum Case {
    /// No data, no response
    Case1,
    /// No data, short Le
    Case2S,
    /// Short Lc and data, no response
    Case3S,
    /// Short Lc, data and Le
    Case4S,
    /// No data, extended Le
    Case2E,
    /// Extended Lc and data, no response
    Case3E,
    /// Extended Lc, data and Le
    Case4E,
}

impl Case {
    /// Check for extended length fields
    pub const fn is_extended(&self) -> bool {
        matches!(self, Case::Case2E | Case::Case3E | Case::Case4E)
    }
}

/// Parsed command APDU descriptor
///
/// This borrows nothing from the frame, offsets into the frame are carried
/// so transports may deliver the data incrementally.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Command {
    pub header: Header,
    pub case: Case,
    /// Command data length (Lc), 0 where absent
    pub lc: usize,
    /// Decoded expected response length (Ne), `None` where Le is absent
    pub ne: Option<usize>,
    /// Position of command data within the frame
    pub data: Range<usize>,
}

impl Command {
    /// Parse a complete command APDU frame
    pub fn parse(frame: &[u8]) -> Result<Self, ApduError> {
        let (header, _) = Header::decode_owned(frame)?;
        let body = &frame[HEADER_LEN..];

        let (case, lc, ne, data_start) = match body.len() {
            0 => (Case::Case1, 0, None, HEADER_LEN),
            1 => (Case::Case2S, 0, Some(short_ne(body[0])), HEADER_LEN + 1),

            // Short Lc
            n if body[0] != 0 => {
                let lc = body[0] as usize;
                match n - 1 {
                    m if m == lc => (Case::Case3S, lc, None, OFFSET_CDATA),
                    m if m == lc + 1 => (Case::Case4S, lc, Some(short_ne(body[n - 1])), OFFSET_CDATA),
                    _ => return Err(ApduError::InvalidLength),
                }
            }

            // Extended Le only
            3 => (
                Case::Case2E,
                0,
                Some(extended_ne(&body[1..3])),
                HEADER_LEN + 3,
            ),

            // Extended Lc
            n if n > 3 => {
                let lc = BigEndian::read_u16(&body[1..3]) as usize;
                if lc == 0 {
                    return Err(ApduError::InvalidEncoding);
                }

                match n - 3 {
                    m if m == lc => (Case::Case3E, lc, None, OFFSET_EXT_CDATA),
                    m if m == lc + 2 => (
                        Case::Case4E,
                        lc,
                        Some(extended_ne(&body[n - 2..])),
                        OFFSET_EXT_CDATA,
                    ),
                    _ => return Err(ApduError::InvalidLength),
                }
            }

            _ => return Err(ApduError::InvalidLength),
        };

        Ok(Self {
            header,
            case,
            lc,
            ne,
            data: data_start..data_start + lc,
        })
    }

    /// Length of the header as presented in the APDU buffer
    /// (CLA INS P1 P2 plus a one or three byte length field)
    pub const fn header_len(&self) -> usize {
        if self.case.is_extended() {
            OFFSET_EXT_CDATA
        } else {
            OFFSET_CDATA
        }
    }

    /// Check for extended length fields
    pub const fn is_extended(&self) -> bool {
        self.case.is_extended()
    }

    /// Write the header and length field(s) as presented in the APDU
    /// buffer, returning the header length
    ///
    /// Case 1 commands are presented with a zero P3 byte.
    pub fn write_header(&self, frame: &[u8], buff: &mut [u8]) -> Result<usize, ApduError> {
        let n = self.header_len();
        if buff.len() < n {
            return Err(ApduError::InvalidLength);
        }

        self.header.encode(buff)?;

        let available = frame.len().min(n);
        buff[HEADER_LEN..available].copy_from_slice(&frame[HEADER_LEN..available]);
        buff[available..n].fill(0);

        Ok(n)
    }
}

/// Decode a short Le byte (`00` encodes 256)
fn short_ne(le: u8) -> usize {
    match le {
        0 => 256,
        v => v as usize,
    }
}

/// Decode an extended Le field (`0000` encodes 65536)
fn extended_ne(le: &[u8]) -> usize {
    match BigEndian::read_u16(le) {
        0 => 65536,
        v => v as usize,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn case_1() {
        let c = Command::parse(&[0x00, 0xA4, 0x04, 0x00]).unwrap();
        assert_eq!(c.case, Case::Case1);
        assert_eq!(c.lc, 0);
        assert_eq!(c.ne, None);
        assert_eq!(c.header_len(), 5);

        let mut buff = [0xAAu8; 8];
        let n = c.write_header(&[0x00, 0xA4, 0x04, 0x00], &mut buff).unwrap();
        assert_eq!(&buff[..n], &[0x00, 0xA4, 0x04, 0x00, 0x00]);
    }

    #[test]
    fn short_cases() {
        let c = Command::parse(&[0x00, 0xB0, 0x00, 0x00, 0x00]).unwrap();
        assert_eq!(c.case, Case::Case2S);
        assert_eq!(c.ne, Some(256));

        let c = Command::parse(&[0x80, 0x10, 0x00, 0x00, 0x02, 0xAB, 0xCD]).unwrap();
        assert_eq!(c.case, Case::Case3S);
        assert_eq!(c.lc, 2);
        assert_eq!(c.data, 5..7);

        let c = Command::parse(&[0x80, 0x10, 0x00, 0x00, 0x02, 0xAB, 0xCD, 0x10]).unwrap();
        assert_eq!(c.case, Case::Case4S);
        assert_eq!(c.ne, Some(0x10));
    }

    #[test]
    fn extended_cases() {
        let c = Command::parse(&[0x00, 0xB0, 0x00, 0x00, 0x00, 0x01, 0x2C]).unwrap();
        assert_eq!(c.case, Case::Case2E);
        assert_eq!(c.ne, Some(300));
        assert_eq!(c.header_len(), 7);

        let mut frame = [0u8; 7 + 300 + 2];
        frame[..7].copy_from_slice(&[0x00, 0xD6, 0x00, 0x00, 0x00, 0x01, 0x2C]);
        let c = Command::parse(&frame).unwrap();
        assert_eq!(c.case, Case::Case4E);
        assert_eq!(c.lc, 300);
        assert_eq!(c.ne, Some(65536));
        assert_eq!(c.data, 7..307);

        let c = Command::parse(&frame[..307]).unwrap();
        assert_eq!(c.case, Case::Case3E);
    }

    #[test]
    fn malformed_lengths() {
        // Header too short
        assert!(Command::parse(&[0x00, 0xA4, 0x04]).is_err());

        // Lc does not match the body
        assert!(Command::parse(&[0x00, 0x10, 0x00, 0x00, 0x04, 0x01]).is_err());

        // Extended Lc of zero
        assert!(Command::parse(&[0x00, 0x10, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01]).is_err());

        // Dangling extended marker
        assert!(Command::parse(&[0x00, 0x10, 0x00, 0x00, 0x00, 0x01]).is_err());
    }
}
