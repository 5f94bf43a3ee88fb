// Copyright (c) 2022-2023 The MobileCoin Foundation

//! APDU session state machine
//!
//! An [`ApduSession`] handles exactly one command / response exchange. It
//! mutably borrows the APDU buffer and the [`Transport`] for its lifetime, so
//! only one session can be active at a time and no reference into the buffer
//! can outlive the command that produced it.
//!
//! The session moves forward through the [`State`] total order as the
//! applet receives command data and sends its response:
//!
//! ```text
//! Initial -> PartialIncoming -> FullIncoming -> Outgoing
//!         -> OutgoingLengthKnown -> PartialOutgoing -> FullOutgoing
//! ```
//!
//! Transport faults move the session to one of the terminal error states,
//! after which every I/O method fails with [`Error::IoError`] and no status
//! word can reach the reader.

use jcre_apdu::{Case, Cla, Command, Header, State, MAX_SHORT};
use static_assertions::const_assert;
use zeroize::Zeroize;

use crate::{
    transport::{Link, Transport, TransportError},
    Error,
};

mod outgoing;
use outgoing::Outgoing;

/// Minimum APDU buffer size (a short header plus 128 data bytes)
pub const MIN_BUFFER_SIZE: usize = 133;

const_assert!(MIN_BUFFER_SIZE >= jcre_apdu::OFFSET_CDATA + 128);

/// Largest response without extended length support
pub const MAX_SHORT_RESPONSE: usize = 256;

bitflags::bitflags! {
    /// Session options fixed by the applet's calls
    pub struct SessionFlags: u8 {
        /// Applet declared extended length support
        const EXTENDED = 1 << 0;
        /// Response chaining disabled by `set_outgoing_no_chaining`
        const NO_CHAINING = 1 << 1;
        /// Response sent via `set_outgoing_and_send`
        const ONE_SHOT = 1 << 2;
    }
}

/// Single command APDU exchange over a [`Transport`]
pub struct ApduSession<'t, T: Transport> {
    transport: &'t mut T,
    buffer: &'t mut [u8],

    link: Link,
    command: Command,
    header_len: usize,

    state: State,
    flags: SessionFlags,

    received: usize,
    outgoing: Outgoing,
}

impl<'t, T: Transport> ApduSession<'t, T> {
    /// Open a session for the command currently held by `transport`
    ///
    /// The buffer is zeroed and loaded with the command header. Extended
    /// length commands are rejected with [`Error::BadLength`] unless
    /// `extended` is set, and T=1 links outside the permitted information
    /// field sizes with [`Error::IllegalValue`].
    pub fn open(transport: &'t mut T, buffer: &'t mut [u8], extended: bool) -> Result<Self, Error> {
        if buffer.len() < MIN_BUFFER_SIZE {
            return Err(Error::BufferBounds);
        }

        let link = transport.link();
        if let Err(e) = link.validate() {
            #[cfg(feature = "log")]
            log::warn!("invalid link {:?}", link);

            return Err(e);
        }

        buffer.zeroize();

        let frame = transport.command();
        let command = Command::parse(frame)?;

        if command.is_extended() && !extended {
            #[cfg(feature = "log")]
            log::warn!("extended length command without applet support");

            return Err(Error::BadLength);
        }

        let header_len = command.write_header(frame, buffer)?;

        let mut flags = SessionFlags::empty();
        flags.set(SessionFlags::EXTENDED, extended);

        #[cfg(feature = "log")]
        log::debug!(
            "open {:02x?} {} lc: {} ne: {:?}",
            command.header,
            command.case,
            command.lc,
            command.ne
        );

        Ok(Self {
            link,
            transport,
            buffer,
            command,
            header_len,
            state: State::Initial,
            flags,
            received: 0,
            outgoing: Outgoing::new(0),
        })
    }

    /// Current session state
    pub fn state(&self) -> State {
        self.state
    }

    /// Session flags
    pub fn flags(&self) -> SessionFlags {
        self.flags
    }

    /// APDU buffer
    pub fn buffer(&self) -> &[u8] {
        &*self.buffer
    }

    /// APDU buffer, mutable for response construction
    pub fn buffer_mut(&mut self) -> &mut [u8] {
        &mut *self.buffer
    }

    /// Parsed command descriptor
    pub fn command(&self) -> &Command {
        &self.command
    }

    /// Command header
    pub fn header(&self) -> Header {
        self.command.header
    }

    /// Command data length (Lc)
    pub fn incoming_length(&self) -> usize {
        self.command.lc
    }

    /// Offset of command data in the APDU buffer (5 or 7)
    pub fn offset_cdata(&self) -> usize {
        self.header_len
    }

    /// Command data bytes received so far
    pub fn bytes_received(&self) -> usize {
        self.received
    }

    /// Response bytes sent so far
    pub fn bytes_sent(&self) -> usize {
        self.outgoing.sent()
    }

    /// Node address byte (T=1)
    pub fn nad(&self) -> u8 {
        self.link.nad
    }

    /// Protocol byte (type and media nibbles)
    pub fn protocol(&self) -> u8 {
        self.link.protocol.to_byte()
    }

    /// Incoming block size (T=0: 1, T=1: IFSC)
    pub fn in_block_size(&self) -> usize {
        self.link.in_block_size()
    }

    /// Outgoing block size including the status word (T=0: 258, T=1: IFSD)
    pub fn out_block_size(&self) -> usize {
        self.link.out_block_size()
    }

    /// Check the CLA byte for command chaining
    pub fn is_command_chaining_cla(&self) -> bool {
        self.cla().is_command_chaining()
    }

    /// Check the CLA byte for secure messaging
    pub fn is_secure_messaging_cla(&self) -> bool {
        self.cla().is_secure_messaging()
    }

    /// Check the CLA byte for the ISO interindustry class
    pub fn is_iso_interindustry_cla(&self) -> bool {
        self.cla().is_iso_interindustry()
    }

    /// Check the CLA byte is valid
    pub fn is_valid_cla(&self) -> bool {
        self.cla().is_valid()
    }

    /// Logical channel encoded in the CLA byte
    pub fn cla_channel(&self) -> u8 {
        self.cla().channel()
    }

    /// Receive as much command data as fits in the buffer following the
    /// header, returning the number of bytes received
    pub fn set_incoming_and_receive(&mut self) -> Result<usize, Error> {
        self.check_usable()?;

        if self.state != State::Initial {
            return Err(Error::IllegalUse);
        }

        let n = self.receive_into(self.header_len)?;

        Ok(n)
    }

    /// Receive further command data at `offset`, returning the number of
    /// bytes received (0 once command data is exhausted)
    pub fn receive_bytes(&mut self, offset: usize) -> Result<usize, Error> {
        self.check_usable()?;

        match self.state {
            State::PartialIncoming => (),
            State::FullIncoming => return Ok(0),
            _ => return Err(Error::IllegalUse),
        }

        // Room for a full incoming block, however little data remains
        match self.buffer.len().checked_sub(offset) {
            Some(room) if room >= self.in_block_size() => (),
            _ => return Err(Error::BufferBounds),
        }

        self.receive_into(offset)
    }

    /// Enter the outgoing phase, returning the expected response length Ne
    pub fn set_outgoing(&mut self) -> Result<usize, Error> {
        self.check_usable()?;

        if self.state.is_outgoing() {
            return Err(Error::IllegalUse);
        }

        self.transition(State::Outgoing);

        Ok(self.expected_length())
    }

    /// Enter the outgoing phase without response chaining, returning the
    /// expected response length Ne
    pub fn set_outgoing_no_chaining(&mut self) -> Result<usize, Error> {
        let ne = self.set_outgoing()?;

        self.flags.insert(SessionFlags::NO_CHAINING);

        Ok(ne)
    }

    /// Declare the response length
    ///
    /// The state is left unchanged when `len` is rejected.
    pub fn set_outgoing_length(&mut self, len: usize) -> Result<(), Error> {
        self.check_usable()?;

        if self.state != State::Outgoing {
            return Err(Error::IllegalUse);
        }

        if len > MAX_SHORT {
            return Err(Error::BadLength);
        }
        if !self.flags.contains(SessionFlags::EXTENDED) && len > MAX_SHORT_RESPONSE {
            return Err(Error::BadLength);
        }
        if self.flags.contains(SessionFlags::NO_CHAINING)
            && len > self.out_block_size().saturating_sub(2)
        {
            return Err(Error::BadLength);
        }

        self.outgoing = Outgoing::new(len);
        self.transition(State::OutgoingLengthKnown);

        Ok(())
    }

    /// Send `len` bytes of the APDU buffer starting at `offset`
    pub fn send_bytes(&mut self, offset: usize, len: usize) -> Result<(), Error> {
        self.check_sendable(len)?;

        match offset.checked_add(len) {
            Some(end) if end <= self.buffer.len() => (),
            _ => return Err(Error::BufferBounds),
        }

        let r = self.outgoing.emit(
            &mut *self.transport,
            &self.link,
            &self.command,
            &self.buffer[offset..][..len],
        );

        self.sent(r)
    }

    /// Send `len` bytes of `src` starting at `offset`
    pub fn send_bytes_long(&mut self, src: &[u8], offset: usize, len: usize) -> Result<(), Error> {
        self.check_sendable(len)?;

        match offset.checked_add(len) {
            Some(end) if end <= src.len() => (),
            _ => return Err(Error::OutOfBounds),
        }

        let r = self.outgoing.emit(
            &mut *self.transport,
            &self.link,
            &self.command,
            &src[offset..][..len],
        );

        self.sent(r)
    }

    /// Send `len` bytes of the APDU buffer at `offset` as the complete
    /// response, no further send is permitted
    pub fn set_outgoing_and_send(&mut self, offset: usize, len: usize) -> Result<(), Error> {
        match offset.checked_add(len) {
            Some(end) if end <= self.buffer.len() => (),
            _ => return Err(Error::BufferBounds),
        }

        self.set_outgoing()?;
        self.set_outgoing_length(len)?;
        self.send_bytes(offset, len)?;

        self.flags.insert(SessionFlags::ONE_SHOT);

        Ok(())
    }

    /// Request additional processing time from the reader
    pub fn wait_extension(&mut self) -> Result<(), Error> {
        self.check_usable()?;

        if self.flags.contains(SessionFlags::NO_CHAINING) {
            return Err(Error::IllegalUse);
        }

        if let Err(e) = self.transport.wait_extension() {
            return Err(self.fail(e));
        }

        Ok(())
    }

    /// Send the final status word, consuming the session
    pub(crate) fn finish(self, sw: u16) -> Result<(), Error> {
        if self.state.is_error() {
            return Err(Error::IoError);
        }

        self.transport.status(sw).map_err(|_| Error::IoError)
    }

    fn cla(&self) -> Cla {
        self.command.header.class()
    }

    /// Expected response length reported to the applet
    fn expected_length(&self) -> usize {
        let ne = match (self.link.protocol.is_t0(), self.command.case) {
            // T=0 readers only convey Le for case 2 commands
            (true, Case::Case2S | Case::Case2E) => self.command.ne.unwrap_or(MAX_SHORT_RESPONSE),
            (true, _) => MAX_SHORT_RESPONSE,
            (false, _) => self.command.ne.unwrap_or(0),
        };

        ne.min(MAX_SHORT)
    }

    /// Receive as much remaining command data as fits at `offset`
    fn receive_into(&mut self, offset: usize) -> Result<usize, Error> {
        let room = self.buffer.len().saturating_sub(offset);
        let want = room.min(self.command.lc - self.received);

        let mut n = 0;
        while n < want {
            let r = match self.transport.receive(&mut self.buffer[offset + n..][..want - n]) {
                Ok(0) => Err(TransportError::Io),
                Ok(r) => Ok(r),
                Err(e) => Err(e),
            };

            match r {
                Ok(r) => n += r,
                Err(e) => return Err(self.fail(e)),
            }
        }

        self.received += n;

        let next = if self.received < self.command.lc {
            State::PartialIncoming
        } else {
            State::FullIncoming
        };
        self.transition(next);

        Ok(n)
    }

    fn check_usable(&self) -> Result<(), Error> {
        if self.state.is_error() {
            return Err(Error::IoError);
        }
        Ok(())
    }

    fn check_sendable(&self, len: usize) -> Result<(), Error> {
        self.check_usable()?;

        match self.state {
            State::OutgoingLengthKnown | State::PartialOutgoing => (),
            _ => return Err(Error::IllegalUse),
        }

        if self.flags.contains(SessionFlags::ONE_SHOT) || len > self.outgoing.remaining() {
            return Err(Error::IllegalUse);
        }

        Ok(())
    }

    /// Resolve the outcome of an emit
    fn sent(&mut self, r: Result<(), TransportError>) -> Result<(), Error> {
        if let Err(e) = r {
            return Err(self.fail(e));
        }

        let next = if self.outgoing.remaining() == 0 {
            State::FullOutgoing
        } else {
            State::PartialOutgoing
        };
        self.transition(next);

        Ok(())
    }

    /// Move to the terminal state for a transport fault
    fn fail(&mut self, e: TransportError) -> Error {
        let (state, err) = match e {
            TransportError::IfdAbort => (State::ErrorT1IfdAbort, Error::T1IfdAbort),
            TransportError::NoGetResponse => (State::ErrorNoT0GetResponse, Error::NoT0GetResponse),
            TransportError::NoReissue => (State::ErrorNoT0Reissue, Error::NoT0Reissue),
            TransportError::Io => (State::ErrorIo, Error::IoError),
        };

        #[cfg(feature = "log")]
        log::warn!("transport fault: {} in state {}", e, self.state);

        self.transition(state);

        err
    }

    fn transition(&mut self, next: State) {
        debug_assert!(
            self.state.can_advance_to(next),
            "{} -> {}",
            self.state,
            next
        );

        #[cfg(feature = "log")]
        log::trace!("state {} -> {}", self.state, next);

        self.state = next;
    }
}

impl<'t, T: Transport> core::fmt::Debug for ApduSession<'t, T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ApduSession")
            .field("state", &self.state)
            .field("flags", &self.flags)
            .field("command", &self.command)
            .field("received", &self.received)
            .field("outgoing", &self.outgoing)
            .finish()
    }
}
