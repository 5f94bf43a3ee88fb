// Copyright (c) 2022-2023 The MobileCoin Foundation

//! APDU session state enumeration
//!

use encdec::{DecodeOwned, Encode};
use ledger_proto::ApduError;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use strum::{Display, EnumIter, EnumString, EnumVariantNames};

/// APDU session state, values match `APDU.getCurrentState()`
///
/// Successful exchanges move forward through the non-negative states,
/// transport faults jump to one of the negative (terminal) states.
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
#[repr(i8)]
pub enum State {
    Initial = 0,
    PartialIncoming = 1,
    FullIncoming = 2,
    Outgoing = 3,
    OutgoingLengthKnown = 4,
    PartialOutgoing = 5,
    FullOutgoing = 6,
    ErrorNoT0GetResponse = -1,
    ErrorT1IfdAbort = -2,
    ErrorIo = -3,
    ErrorNoT0Reissue = -4,
}

impl State {
    /// Check whether this is a terminal error state
    pub const fn is_error(&self) -> bool {
        (*self as i8) < 0
    }

    /// Check whether an outgoing method has been called
    pub const fn is_outgoing(&self) -> bool {
        (*self as i8) >= State::Outgoing as i8
    }

    /// Check whether a transition to `next` keeps the state machine monotonic
    pub const fn can_advance_to(&self, next: State) -> bool {
        if self.is_error() {
            return false;
        }

        next.is_error() || (next as i8) >= (*self as i8)
    }
}

impl Encode for State {
    type Error = ApduError;

    fn encode_len(&self) -> Result<usize, ApduError> {
        Ok(1)
    }

    fn encode(&self, buff: &mut [u8]) -> Result<usize, ApduError> {
        if buff.is_empty() {
            return Err(ApduError::InvalidLength);
        }

        buff[0] = *self as i8 as u8;
        Ok(1)
    }
}

impl DecodeOwned for State {
    type Output = Self;

    type Error = ApduError;

    fn decode_owned(buff: &[u8]) -> Result<(Self::Output, usize), ApduError> {
        if buff.is_empty() {
            return Err(ApduError::InvalidLength);
        }

        match Self::try_from(buff[0] as i8) {
            Ok(v) => Ok((v, 1)),
            Err(_) => Err(ApduError::InvalidEncoding),
        }
    }
}

#[cfg(test)]
mod test {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn error_states_are_terminal() {
        for s in State::iter().filter(State::is_error) {
            for n in State::iter() {
                assert!(!s.can_advance_to(n), "{s} -> {n}");
            }
        }
    }

    #[test]
    fn forward_only() {
        assert!(State::Initial.can_advance_to(State::FullIncoming));
        assert!(State::PartialIncoming.can_advance_to(State::Outgoing));
        assert!(State::Outgoing.can_advance_to(State::ErrorIo));
        assert!(!State::FullOutgoing.can_advance_to(State::Outgoing));
        assert!(!State::OutgoingLengthKnown.can_advance_to(State::FullIncoming));
    }

    #[test]
    fn state_bytes() {
        let mut b = [0u8; 1];
        State::ErrorNoT0Reissue.encode(&mut b).unwrap();
        assert_eq!(b[0], 0xFC);

        let (s, _) = State::decode_owned(&[0x04]).unwrap();
        assert_eq!(s, State::OutgoingLengthKnown);

        assert!(State::decode_owned(&[0x07]).is_err());
    }
}
