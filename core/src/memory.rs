// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Persistent memory context
//!
//! [`Memory`] pairs a [`Store`] with its [`TransactionJournal`] and is passed
//! explicitly to every operation needing atomicity. Objects created by applet
//! code inside a transaction that is later aborted must be treated as
//! unreferenced by that code, the journal only restores store contents.

use crate::{
    journal::{Phase, Recovery, TransactionJournal},
    Error, Store,
};

/// Persistent store with its transaction journal
pub struct Memory<S: Store> {
    store: S,
    journal: TransactionJournal,
}

impl<S: Store> Memory<S> {
    /// Create a memory context with a commit buffer of `commit_capacity` bytes
    pub const fn new(store: S, commit_capacity: usize) -> Self {
        Self {
            store,
            journal: TransactionJournal::new(commit_capacity),
        }
    }

    /// Open a transaction
    pub fn begin_transaction(&mut self) -> Result<(), Error> {
        self.journal.begin()?;

        #[cfg(feature = "log")]
        log::debug!("transaction begin");

        Ok(())
    }

    /// Commit the open transaction
    pub fn commit_transaction(&mut self) -> Result<(), Error> {
        #[cfg(feature = "log")]
        let n = self.journal.pending();

        self.journal.commit(&mut self.store)?;

        #[cfg(feature = "log")]
        log::debug!("transaction commit ({} writes)", n);

        Ok(())
    }

    /// Abort the open transaction, discarding pending writes
    pub fn abort_transaction(&mut self) -> Result<(), Error> {
        #[cfg(feature = "log")]
        let n = self.journal.pending();

        self.journal.abort()?;

        #[cfg(feature = "log")]
        log::debug!("transaction abort ({} writes discarded)", n);

        Ok(())
    }

    /// Transaction nesting depth (0 or 1)
    pub fn transaction_depth(&self) -> u8 {
        self.journal.depth()
    }

    /// Check whether a transaction is open
    pub fn in_transaction(&self) -> bool {
        self.journal.in_progress()
    }

    /// Remaining commit capacity in bytes, saturated at 32767
    pub fn unused_commit_capacity(&self) -> usize {
        self.journal.unused_capacity()
    }

    /// Total commit capacity in bytes, saturated at 32767
    pub fn max_commit_capacity(&self) -> usize {
        self.journal.max_capacity()
    }

    /// Read persistent contents, observing writes pending in an open transaction
    pub fn read(&self, addr: usize, buff: &mut [u8]) -> Result<(), Error> {
        self.journal.read(&self.store, addr, buff)
    }

    /// Record a write in the open transaction
    pub fn write(&mut self, addr: usize, data: &[u8]) -> Result<(), Error> {
        self.journal.record_write(&self.store, addr, data)
    }

    /// Write directly to the store, bypassing the journal
    pub fn write_non_atomic(&mut self, addr: usize, data: &[u8]) -> Result<(), Error> {
        self.store.write(addr, data)
    }

    /// Run `f` within a transaction, opening and committing one only where
    /// the caller has none in progress
    ///
    /// An auto-opened transaction is aborted if `f` fails, a caller owned
    /// transaction is left open for the caller to resolve.
    pub fn atomically<R>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<R, Error>,
    ) -> Result<R, Error> {
        if self.in_transaction() {
            return f(self);
        }

        self.begin_transaction()?;

        match f(self) {
            Ok(r) => {
                self.commit_transaction()?;
                Ok(r)
            }
            Err(e) => {
                self.abort_transaction()?;
                Err(e)
            }
        }
    }

    /// Recover following a power loss or reset, discarding or rolling back
    /// any incomplete transaction
    pub fn recover(&mut self) -> Result<Recovery, Error> {
        if self.journal.phase() == Phase::Idle {
            return Ok(Recovery::Clean);
        }

        let r = self.journal.recover(&mut self.store);

        #[cfg(feature = "log")]
        log::warn!("journal recovery: {:?}", r);

        r
    }

    /// Fetch the journal
    pub fn journal(&self) -> &TransactionJournal {
        &self.journal
    }

    /// Fetch the underlying store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Fetch the underlying store mutably (fault injection, inspection)
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }
}
