// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Simulated reader for tests and host tooling
//!
//! [`SimTransport`] delivers a single command APDU, records everything the
//! card emits as [`Event`]s and can be configured to misbehave via [`Faults`].

use alloc::vec::Vec;
use core::ops::Range;

use jcre_apdu::{Command, StatusWord};

use super::{Link, Transport, TransportError};

bitflags::bitflags! {
    /// Reader faults to inject
    pub struct Faults: u8 {
        /// Abort (T=1) while command data is being received
        const RX_ABORT = 1 << 0;
        /// Abort (T=1) while response data is being transmitted
        const TX_ABORT = 1 << 1;
        /// Do not answer `61xx` with GET RESPONSE (T=0)
        const NO_GET_RESPONSE = 1 << 2;
        /// Do not reissue the command after `6Cxx` (T=0)
        const NO_REISSUE = 1 << 3;
        /// Fail every exchange
        const IO = 1 << 4;
    }
}

/// Exchanges observed by the simulated reader
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Event {
    /// Response data block
    Data(Vec<u8>),
    /// `61xx` answered with GET RESPONSE carrying `le`
    GetResponse { sw: u16, le: u8 },
    /// `6Cxx` answered with a reissued command
    Reissue { sw: u16 },
    /// Waiting time extension
    WaitExtension,
    /// Final status word
    Status(u16),
}

/// Scripted reader holding one command APDU
#[derive(Clone, Debug)]
pub struct SimTransport {
    link: Link,
    frame: Vec<u8>,
    data: Range<usize>,
    faults: Faults,
    le: Option<u8>,
    events: Vec<Event>,
}

impl SimTransport {
    /// Create a simulated reader issuing `frame` over `link`
    pub fn new(link: Link, frame: &[u8]) -> Self {
        let mut s = Self {
            link,
            frame: Vec::new(),
            data: 0..0,
            faults: Faults::empty(),
            le: None,
            events: Vec::new(),
        };
        s.load(frame);
        s
    }

    /// Inject reader faults
    pub fn with_faults(mut self, faults: Faults) -> Self {
        self.faults = faults;
        self
    }

    /// Answer `61xx` with a GET RESPONSE carrying `le` rather than the
    /// advertised length
    pub fn with_get_response_le(mut self, le: u8) -> Self {
        self.le = Some(le);
        self
    }

    /// Load the next command, clearing recorded events
    pub fn load(&mut self, frame: &[u8]) {
        self.frame.clear();
        self.frame.extend_from_slice(frame);
        self.events.clear();

        // Malformed frames carry no deliverable data, the session rejects them
        self.data = match Command::parse(frame) {
            Ok(c) => c.data,
            Err(_) => 0..0,
        };
    }

    /// Replace injected faults
    pub fn set_faults(&mut self, faults: Faults) {
        self.faults = faults;
    }

    /// Events recorded for the current command
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Response data received by the reader
    pub fn response(&self) -> Vec<u8> {
        let mut r = Vec::new();
        for e in &self.events {
            if let Event::Data(d) = e {
                r.extend_from_slice(d);
            }
        }
        r
    }

    /// Response data blocks as transmitted
    pub fn blocks(&self) -> Vec<&[u8]> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Data(d) => Some(d.as_slice()),
                _ => None,
            })
            .collect()
    }

    /// Final status word, `None` where none was sent
    pub fn status_word(&self) -> Option<u16> {
        self.events.iter().rev().find_map(|e| match e {
            Event::Status(sw) => Some(*sw),
            _ => None,
        })
    }

    fn abort_error(&self) -> TransportError {
        if self.link.protocol.is_t0() {
            TransportError::Io
        } else {
            TransportError::IfdAbort
        }
    }
}

impl Transport for SimTransport {
    fn link(&self) -> Link {
        self.link
    }

    fn command(&self) -> &[u8] {
        &self.frame
    }

    fn receive(&mut self, buff: &mut [u8]) -> Result<usize, TransportError> {
        if self.faults.contains(Faults::IO) {
            return Err(TransportError::Io);
        }
        if self.faults.contains(Faults::RX_ABORT) {
            return Err(self.abort_error());
        }

        // T=0 delivers everything acknowledged, T=1 one block at a time
        let mut n = buff.len().min(self.data.len());
        if !self.link.protocol.is_t0() {
            n = n.min(self.link.ifsc);
        }

        buff[..n].copy_from_slice(&self.frame[self.data.start..][..n]);
        self.data.start += n;

        Ok(n)
    }

    fn transmit(&mut self, data: &[u8]) -> Result<(), TransportError> {
        if self.faults.contains(Faults::IO) {
            return Err(TransportError::Io);
        }
        if self.faults.contains(Faults::TX_ABORT) {
            return Err(self.abort_error());
        }

        self.events.push(Event::Data(data.to_vec()));

        Ok(())
    }

    fn get_response(&mut self, available: usize) -> Result<u8, TransportError> {
        if self.faults.contains(Faults::IO) {
            return Err(TransportError::Io);
        }
        if self.faults.contains(Faults::NO_GET_RESPONSE) {
            return Err(TransportError::NoGetResponse);
        }

        let le = self.le.unwrap_or((available & 0xFF) as u8);
        self.events.push(Event::GetResponse {
            sw: StatusWord::bytes_remaining(available),
            le,
        });

        Ok(le)
    }

    fn reissue(&mut self, len: usize) -> Result<(), TransportError> {
        if self.faults.contains(Faults::IO) {
            return Err(TransportError::Io);
        }
        if self.faults.contains(Faults::NO_REISSUE) {
            return Err(TransportError::NoReissue);
        }

        self.events.push(Event::Reissue {
            sw: StatusWord::correct_length(len),
        });

        Ok(())
    }

    fn wait_extension(&mut self) -> Result<(), TransportError> {
        if self.faults.contains(Faults::IO) {
            return Err(TransportError::Io);
        }

        self.events.push(Event::WaitExtension);

        Ok(())
    }

    fn status(&mut self, sw: u16) -> Result<(), TransportError> {
        if self.faults.contains(Faults::IO) {
            return Err(TransportError::Io);
        }

        self.events.push(Event::Status(sw));

        Ok(())
    }
}
