// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Transport protocol byte
//!
//! The low nibble carries the protocol type, the high nibble the media the
//! command arrived on, matching `APDU.getProtocol()`.

use num_enum::{IntoPrimitive, TryFromPrimitive};
use strum::{Display, EnumIter, EnumString, EnumVariantNames};

use crate::ApduError;

/// Protocol type mask
pub const PROTOCOL_TYPE_MASK: u8 = 0x0F;

/// Protocol media mask
pub const PROTOCOL_MEDIA_MASK: u8 = 0xF0;

/// ISO 7816-3 protocol type
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
#[repr(u8)]
#[strum(serialize_all = "lowercase")]
pub enum ProtocolType {
    /// Byte oriented, GET RESPONSE chaining
    T0 = 0x00,
    /// Block oriented
    T1 = 0x01,
}

/// Transport media
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
#[repr(u8)]
#[strum(serialize_all = "kebab-case")]
pub enum Media {
    Default = 0x00,
    ContactlessTypeA = 0x80,
    ContactlessTypeB = 0x90,
    Usb = 0xA0,
    HciApduGate = 0xC0,
}

/// Protocol in use for the current command
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Protocol {
    pub kind: ProtocolType,
    pub media: Media,
}

impl Protocol {
    /// Contact T=0
    pub const T0: Protocol = Protocol::new(ProtocolType::T0, Media::Default);

    /// Contact T=1
    pub const T1: Protocol = Protocol::new(ProtocolType::T1, Media::Default);

    pub const fn new(kind: ProtocolType, media: Media) -> Self {
        Self { kind, media }
    }

    /// Encode as the `getProtocol()` byte
    pub fn to_byte(&self) -> u8 {
        u8::from(self.media) | u8::from(self.kind)
    }

    /// Decode from a `getProtocol()` byte
    pub fn from_byte(b: u8) -> Result<Self, ApduError> {
        let kind =
            ProtocolType::try_from(b & PROTOCOL_TYPE_MASK).map_err(|_| ApduError::InvalidEncoding)?;
        let media =
            Media::try_from(b & PROTOCOL_MEDIA_MASK).map_err(|_| ApduError::InvalidEncoding)?;

        Ok(Self { kind, media })
    }

    /// Check for byte oriented T=0 framing
    pub fn is_t0(&self) -> bool {
        self.kind == ProtocolType::T0
    }
}
