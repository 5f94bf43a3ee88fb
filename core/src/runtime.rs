// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Command processing loop
//!
//! The [`Runtime`] owns the APDU buffer and the persistent [`Memory`]
//! context, and dispatches each command to an [`Applet`]. After the applet
//! returns any transaction it left open is aborted and the status word is
//! sent, unless the session ended in a terminal transport error in which
//! case the reader receives nothing.

use alloc::{vec, vec::Vec};

use jcre_apdu::{State, StatusWord};

use crate::{
    session::{ApduSession, MIN_BUFFER_SIZE},
    transport::Transport,
    journal::Recovery,
    Error, Memory, Store,
};

/// Default APDU buffer size (extended header, 255 data bytes, Le)
pub const DEFAULT_BUFFER_SIZE: usize = 261;

/// Default commit buffer capacity in bytes
pub const DEFAULT_COMMIT_CAPACITY: usize = 512;

/// Runtime configuration
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct RuntimeConfig {
    /// APDU buffer size in bytes
    pub buffer_size: usize,
    /// Transaction journal capacity in bytes
    pub commit_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            commit_capacity: DEFAULT_COMMIT_CAPACITY,
        }
    }
}

impl RuntimeConfig {
    /// Check configuration values are usable
    pub fn validate(&self) -> Result<(), Error> {
        if self.buffer_size < MIN_BUFFER_SIZE {
            return Err(Error::IllegalValue);
        }
        Ok(())
    }
}

/// Outcome of processing a single command
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Completion {
    /// Status word sent to the reader
    Status(u16),
    /// Session ended in a terminal transport error, nothing was sent
    Silent(State),
}

/// [`Applet`] trait implemented by card applications
pub trait Applet<S: Store> {
    /// Whether the applet accepts extended length commands
    fn extended_length(&self) -> bool {
        false
    }

    /// Process a single command
    ///
    /// Returning `Err(Error::Iso(sw))` responds with `sw`, any other error
    /// responds with `6F00`.
    fn process<T: Transport>(
        &mut self,
        apdu: &mut ApduSession<'_, T>,
        mem: &mut Memory<S>,
    ) -> Result<(), Error>;
}

impl<S: Store, A: Applet<S>> Applet<S> for &mut A {
    fn extended_length(&self) -> bool {
        A::extended_length(self)
    }

    fn process<T: Transport>(
        &mut self,
        apdu: &mut ApduSession<'_, T>,
        mem: &mut Memory<S>,
    ) -> Result<(), Error> {
        A::process(self, apdu, mem)
    }
}

/// Runtime instance, one per card
pub struct Runtime<S: Store> {
    memory: Memory<S>,
    buffer: Vec<u8>,
}

impl<S: Store> Runtime<S> {
    /// Create a runtime over `store`
    pub fn new(store: S, config: RuntimeConfig) -> Result<Self, Error> {
        config.validate()?;

        Ok(Self {
            memory: Memory::new(store, config.commit_capacity),
            buffer: vec![0u8; config.buffer_size],
        })
    }

    /// Fetch the persistent memory context
    pub fn memory(&self) -> &Memory<S> {
        &self.memory
    }

    /// Fetch the persistent memory context mutably
    pub fn memory_mut(&mut self) -> &mut Memory<S> {
        &mut self.memory
    }

    /// APDU buffer size
    pub fn buffer_size(&self) -> usize {
        self.buffer.len()
    }

    /// Process the command held by `transport` with `applet`
    pub fn process<T: Transport, A: Applet<S>>(
        &mut self,
        transport: &mut T,
        applet: &mut A,
    ) -> Completion {
        let mut apdu = match ApduSession::open(transport, &mut self.buffer, applet.extended_length())
        {
            Ok(v) => v,
            Err(e) => {
                #[cfg(feature = "log")]
                log::warn!("rejected command: {:?}", e);

                let sw = match e {
                    Error::BadLength => StatusWord::WrongLength as u16,
                    _ => e.status(),
                };
                return match transport.status(sw) {
                    Ok(_) => Completion::Status(sw),
                    Err(_) => Completion::Silent(State::ErrorIo),
                };
            }
        };

        let r = applet.process(&mut apdu, &mut self.memory);

        if self.memory.in_transaction() {
            #[cfg(feature = "log")]
            log::warn!("aborting transaction left open by applet");

            if let Err(_e) = self.memory.abort_transaction() {
                #[cfg(feature = "log")]
                log::error!("transaction abort failed: {:?}", _e);
            }
        }

        let state = apdu.state();
        if state.is_error() {
            #[cfg(feature = "log")]
            log::warn!("session ended in {}, no status sent", state);

            return Completion::Silent(state);
        }

        let sw = match r {
            // Declared response not fully sent
            Ok(_) if matches!(state, State::OutgoingLengthKnown | State::PartialOutgoing) => {
                StatusWord::Unknown as u16
            }
            Ok(_) => StatusWord::NoError as u16,
            Err(e) => {
                #[cfg(feature = "log")]
                log::debug!("applet error: {:?}", e);

                e.status()
            }
        };

        match apdu.finish(sw) {
            Ok(_) => Completion::Status(sw),
            Err(_) => Completion::Silent(State::ErrorIo),
        }
    }

    /// Recover persistent memory following a reset
    pub fn recover(&mut self) -> Result<Recovery, Error> {
        self.memory.recover()
    }
}
