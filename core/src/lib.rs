// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Java Card runtime core
//!
//! This provides the APDU transport state machine and the persistent memory
//! transaction journal of a Java Card runtime environment, independent of
//! any particular card or reader hardware.
//!
//! Commands are delivered by a [`Transport`] and handled one at a time by an
//! [`ApduSession`], see [apdu][crate::apdu] for header layouts, status words
//! and state encodings. Persistent memory is accessed through a [`Memory`]
//! context pairing a [`Store`] with its [`TransactionJournal`].
//!
//! ## Operations
//!
//! ### Processing a command
//!
//! The [`Runtime`] opens an [`ApduSession`] for each command and passes it
//! to an [`Applet`] along with the [`Memory`] context. A typical applet:
//!
//! 1. Calls [`ApduSession::set_incoming_and_receive`] to fetch command data
//!    following the header, then [`ApduSession::receive_bytes`] while the
//!    session remains in [`State::PartialIncoming`][apdu::State::PartialIncoming]
//! 2. Updates persistent state within a transaction
//!     1. [`Memory::begin_transaction`] to open the transaction
//!     2. [`Memory::write`] or the atomic [`util`] helpers, which join the
//!        open transaction
//!     3. [`Memory::commit_transaction`] to apply every write at once, or
//!        [`Memory::abort_transaction`] to discard them
//! 3. Responds via [`ApduSession::set_outgoing`],
//!    [`ApduSession::set_outgoing_length`] and [`ApduSession::send_bytes`],
//!    or [`ApduSession::set_outgoing_and_send`] for a single block
//! 4. Returns `Err(Error::Iso(sw))` to respond with a specific status word
//!
//! Transactions left open when the applet returns are aborted. Transport
//! faults end the session in a terminal error state and the reader receives
//! no status word ([`Completion::Silent`]).
//!
//! ### Recovering from power loss
//!
//! Commits interrupted by a power loss leave the journal sealed with the
//! replaced bytes of every pending write. [`Runtime::recover`] (or
//! [`Memory::recover`]) rolls the store back to its pre-transaction
//! contents before the next command is processed.
//!
//! ## Testing
//!
//! [`MemStore`] and [`SimTransport`] provide a RAM backed store with power
//! loss injection and a scripted reader with fault injection.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "alloc")]
extern crate alloc;

pub use jcre_apdu::{self as apdu};

mod error;
pub use error::*;

mod store;
#[cfg(feature = "alloc")]
pub use store::MemStore;
pub use store::Store;

pub mod transport;
#[cfg(feature = "alloc")]
pub use transport::SimTransport;
pub use transport::{Link, Transport, TransportError};

pub mod session;
pub use session::{ApduSession, SessionFlags};

#[cfg(feature = "alloc")]
pub mod journal;
#[cfg(feature = "alloc")]
pub use journal::{Recovery, TransactionJournal};

#[cfg(feature = "alloc")]
mod memory;
#[cfg(feature = "alloc")]
pub use memory::Memory;

#[cfg(feature = "alloc")]
pub mod util;

#[cfg(feature = "alloc")]
mod runtime;
#[cfg(feature = "alloc")]
pub use runtime::{
    Applet, Completion, Runtime, RuntimeConfig, DEFAULT_BUFFER_SIZE, DEFAULT_COMMIT_CAPACITY,
};
