// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Demonstration applet
//!
//! Provides a small instruction set over persistent memory for exercising
//! the runtime from scripts.

use log::debug;
use strum::{Display, EnumIter, EnumString};

use jcre_core::{
    apdu::{StatusWord, CLA_ISO7816},
    util, Applet, ApduSession, Error, MemStore, Memory, Transport,
};

/// Proprietary class used by the demo instructions
pub const CLA_DEMO: u8 = 0x80;

/// Demo applet instructions
#[derive(Copy, Clone, PartialEq, Eq, Debug, Display, EnumString, EnumIter)]
#[strum(serialize_all = "kebab-case")]
#[repr(u8)]
pub enum Instruction {
    /// Respond with the command data
    Echo = 0x01,
    /// Atomically write command data at offset P1P2
    Write = 0x10,
    /// Atomically fill memory at offset P1P2, data is `value count`
    Fill = 0x11,
    /// Read Le bytes from offset P1P2
    Read = 0x20,
    /// Compare command data with memory at offset P1P2, one byte result
    Compare = 0x30,
    /// Report unused and maximum commit capacity
    Capacity = 0x40,
}

impl Instruction {
    pub fn from_ins(ins: u8) -> Option<Self> {
        use strum::IntoEnumIterator;

        Self::iter().find(|i| *i as u8 == ins)
    }
}

/// Demonstration [`Applet`] over a [`MemStore`]
#[derive(Clone, PartialEq, Debug, Default)]
pub struct DemoApplet {
    /// Accept extended length commands
    pub extended: bool,
}

impl DemoApplet {
    pub fn new(extended: bool) -> Self {
        Self { extended }
    }

    /// Receive all command data into the buffer, returning its length
    fn receive_all<T: Transport>(apdu: &mut ApduSession<'_, T>) -> Result<usize, Error> {
        let off = apdu.offset_cdata();
        let mut n = apdu.set_incoming_and_receive()?;

        while n < apdu.incoming_length() {
            match apdu.receive_bytes(off + n) {
                Ok(0) => break,
                Ok(v) => n += v,
                // Command data larger than the buffer
                Err(Error::BufferBounds) => return Err(StatusWord::WrongLength.into()),
                Err(e) => return Err(e),
            }
        }

        Ok(n)
    }

    fn dispatch<T: Transport>(
        ins: Instruction,
        addr: usize,
        apdu: &mut ApduSession<'_, T>,
        mem: &mut Memory<MemStore>,
    ) -> Result<(), Error> {
        match ins {
            Instruction::Echo => {
                let n = Self::receive_all(apdu)?;
                let off = apdu.offset_cdata();

                apdu.set_outgoing()?;
                apdu.set_outgoing_length(n)?;
                apdu.send_bytes(off, n)
            }
            Instruction::Write => {
                let n = Self::receive_all(apdu)?;
                let off = apdu.offset_cdata();

                util::array_copy(mem, apdu.buffer(), off, addr, n).map(|_| ())
            }
            Instruction::Fill => {
                if Self::receive_all(apdu)? != 2 {
                    return Err(StatusWord::WrongLength.into());
                }
                let off = apdu.offset_cdata();
                let (v, n) = (apdu.buffer()[off], apdu.buffer()[off + 1]);

                util::array_fill(mem, addr, n as usize, v).map(|_| ())
            }
            Instruction::Read => {
                let ne = apdu.set_outgoing()?;
                let len = ne.min(apdu.buffer().len());

                util::array_copy_to_transient(mem, addr, apdu.buffer_mut(), 0, len)?;

                apdu.set_outgoing_length(len)?;
                apdu.send_bytes(0, len)
            }
            Instruction::Compare => {
                let n = Self::receive_all(apdu)?;
                let off = apdu.offset_cdata();

                let mut stored = vec![0u8; n];
                util::array_copy_to_transient(mem, addr, &mut stored, 0, n)?;
                let c = util::array_compare(apdu.buffer(), off, &stored, 0, n)?;

                apdu.buffer_mut()[0] = c as u8;
                apdu.set_outgoing_and_send(0, 1)
            }
            Instruction::Capacity => {
                let unused = mem.unused_commit_capacity() as i16;
                let max = mem.max_commit_capacity() as i16;

                let b = apdu.buffer_mut();
                let n = util::set_short_transient(b, 0, unused)?;
                util::set_short_transient(b, n, max)?;

                apdu.set_outgoing_and_send(0, 4)
            }
        }
    }
}

impl Applet<MemStore> for DemoApplet {
    fn extended_length(&self) -> bool {
        self.extended
    }

    fn process<T: Transport>(
        &mut self,
        apdu: &mut ApduSession<'_, T>,
        mem: &mut Memory<MemStore>,
    ) -> Result<(), Error> {
        let h = apdu.header();

        if !apdu.is_valid_cla() || (h.cla != CLA_DEMO && h.cla != CLA_ISO7816) {
            return Err(StatusWord::ClaNotSupported.into());
        }

        let ins = match Instruction::from_ins(h.ins) {
            Some(v) => v,
            None => return Err(StatusWord::InsNotSupported.into()),
        };

        let addr = util::make_short(h.p1, h.p2) as u16 as usize;

        debug!("{} at {:#06x}", ins, addr);

        // Out of range addresses are reported against P1P2
        match Self::dispatch(ins, addr, apdu, mem) {
            Err(Error::OutOfBounds) => Err(StatusWord::WrongP1P2.into()),
            Err(Error::CommitCapacityExceeded) => Err(StatusWord::FileFull.into()),
            r => r,
        }
    }
}
