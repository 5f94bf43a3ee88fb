// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Outgoing response stream
//!
//! Splits response data into transport blocks. Under T=0 the card may only
//! send as many bytes as the reader last requested, so a `61xx` / GET
//! RESPONSE exchange opens each further window, and a case 2 command whose
//! Le exceeds the response is reissued via `6Cxx` before any data is sent.

use jcre_apdu::{Case, Command};

use crate::transport::{Link, Transport, TransportError};

/// Largest T=0 response window
const T0_WINDOW: usize = 256;

#[derive(Clone, PartialEq, Debug)]
pub(crate) struct Outgoing {
    /// Declared response length
    declared: usize,
    /// Bytes transmitted so far
    sent: usize,
    /// Bytes the T=0 reader will currently accept
    window: usize,
    primed: bool,
}

impl Outgoing {
    pub const fn new(declared: usize) -> Self {
        Self {
            declared,
            sent: 0,
            window: 0,
            primed: false,
        }
    }

    pub fn sent(&self) -> usize {
        self.sent
    }

    pub fn remaining(&self) -> usize {
        self.declared - self.sent
    }

    /// Transmit `data`, which the caller has checked fits the declared length
    pub fn emit<T: Transport>(
        &mut self,
        transport: &mut T,
        link: &Link,
        command: &Command,
        mut data: &[u8],
    ) -> Result<(), TransportError> {
        let t0 = link.protocol.is_t0();

        if t0 && !self.primed && !data.is_empty() {
            self.prime(transport, command)?;
        }

        while !data.is_empty() {
            let n = if t0 {
                if self.window == 0 {
                    let remaining = self.remaining();
                    let le = transport.get_response(remaining.min(T0_WINDOW))?;
                    self.window = decode_le(le).min(remaining);
                }
                data.len().min(self.window)
            } else {
                data.len().min(link.out_block_size())
            };

            transport.transmit(&data[..n])?;

            data = &data[n..];
            self.sent += n;
            if t0 {
                self.window -= n;
            }
        }

        Ok(())
    }

    /// Open the first T=0 window from the command Le
    fn prime<T: Transport>(
        &mut self,
        transport: &mut T,
        command: &Command,
    ) -> Result<(), TransportError> {
        self.primed = true;

        // Only a short case 2 command carries Le in the T=0 TPDU
        let le = match (command.case, command.ne) {
            (Case::Case2S, Some(le)) => le,
            _ => return Ok(()),
        };

        if self.declared < le {
            transport.reissue(self.declared)?;
            self.window = self.declared;
        } else {
            self.window = le;
        }

        Ok(())
    }
}

/// Decode a GET RESPONSE Le byte (`00` encodes 256)
fn decode_le(le: u8) -> usize {
    match le {
        0 => T0_WINDOW,
        v => v as usize,
    }
}
