// Copyright (c) 2022-2023 The MobileCoin Foundation

//! CLA byte decoding
//!
//! ```text
//!  b8   b7   b6   b5   b4   b3   b2   b1
//! +----+----+----+----+----+----+----+----+
//! | P  | T  |  (type 4: SM SM) | ch ch   |   b7 = 0, channels 0..=3
//! | P  | T  | SM | CC | ch ch ch ch      |   b7 = 1, channels 4..=19
//! +----+----+----+----+----+----+----+----+
//! ```
//!
//! `P` (b8) marks proprietary classes, which are decoded with the same bit
//! layout as the interindustry ones. `CC` (b5) is the command chaining flag
//! for both layouts. Classes `0xFF` and `001x xxxx` are invalid and every
//! predicate reports them conservatively.

bitflags::bitflags! {
    /// Bit fields of the CLA byte
    pub struct ClaBits: u8 {
        /// b8, set for proprietary classes
        const PROPRIETARY = 1 << 7;
        /// b7, selects the "further interindustry" layout
        const FURTHER = 1 << 6;
        /// b6, secure messaging indication in the further layout
        const FURTHER_SM = 1 << 5;
        /// b5, command chaining (not the last command of a chain)
        const CHAINING = 1 << 4;
        /// b4-b3, secure messaging indication in the first layout
        const FIRST_SM = 0b0000_1100;
    }
}

/// First interindustry channel mask (b2-b1)
const FIRST_CHANNEL_MASK: u8 = 0b0000_0011;

/// Further interindustry channel mask (b4-b1)
const FURTHER_CHANNEL_MASK: u8 = 0b0000_1111;

/// Channel offset for the further interindustry layout
const FURTHER_CHANNEL_BASE: u8 = 4;

/// CLA byte wrapper providing the Java Card decoding helpers
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Cla(pub u8);

impl Cla {
    /// Check whether the class byte is valid, `0xFF` and the reserved
    /// `001x xxxx` range are not
    pub const fn is_valid(&self) -> bool {
        !(self.0 == 0xFF || self.0 & 0b1110_0000 == 0b0010_0000)
    }

    /// Check whether b8 indicates an ISO interindustry class
    pub const fn is_iso_interindustry(&self) -> bool {
        self.0 & ClaBits::PROPRIETARY.bits() == 0
    }

    /// Check whether the command chaining bit is set
    pub const fn is_command_chaining(&self) -> bool {
        self.is_valid() && self.0 & ClaBits::CHAINING.bits() != 0
    }

    /// Check whether the class indicates secure messaging
    pub const fn is_secure_messaging(&self) -> bool {
        if !self.is_valid() {
            return false;
        }

        if self.is_further() {
            self.0 & ClaBits::FURTHER_SM.bits() != 0
        } else {
            self.0 & ClaBits::FIRST_SM.bits() != 0
        }
    }

    /// Decode the logical channel number (0..=19), invalid classes report 0
    pub const fn channel(&self) -> u8 {
        if !self.is_valid() {
            return 0;
        }

        if self.is_further() {
            FURTHER_CHANNEL_BASE + (self.0 & FURTHER_CHANNEL_MASK)
        } else {
            self.0 & FIRST_CHANNEL_MASK
        }
    }

    const fn is_further(&self) -> bool {
        self.0 & ClaBits::FURTHER.bits() != 0
    }
}

impl From<u8> for Cla {
    fn from(v: u8) -> Self {
        Self(v)
    }
}
