// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Transaction journal (commit buffer)
//!
//! Writes recorded while a transaction is open are held in the journal and
//! only reach the [`Store`] on commit. Each entry keeps the bytes it replaces
//! so a commit interrupted by power loss can be rolled back by [`recover`],
//! restoring the pre-transaction contents exactly.
//!
//! [`recover`]: TransactionJournal::recover

use alloc::{vec, vec::Vec};

use crc::{Crc, CRC_32_ISCSI};
use jcre_apdu::MAX_SHORT;
use strum::{Display, EnumIter};

use crate::{Error, Store};

/// CRC-32C used to seal commit records
const SEAL: Crc<u32> = Crc::<u32>::new(&CRC_32_ISCSI);

/// Journal phase
#[derive(Copy, Clone, PartialEq, Eq, Debug, Display)]
pub enum Phase {
    /// No transaction open
    Idle,
    /// Transaction open, recording writes
    Open,
    /// Commit in progress, sealed with a checksum of the pending writes
    Committing(u32),
}

/// Outcome of [`TransactionJournal::recover`]
#[derive(Copy, Clone, PartialEq, Eq, Debug, Display, EnumIter)]
pub enum Recovery {
    /// Nothing to recover
    Clean,
    /// An open transaction was discarded
    Discarded,
    /// A partially applied commit was rolled back
    RolledBack,
}

/// Journal entry, the target location with replaced and replacement bytes
#[derive(Clone, PartialEq, Debug)]
struct Entry {
    addr: usize,
    old: Vec<u8>,
    new: Vec<u8>,
}

/// Bounded single-level transaction journal
#[derive(Clone, PartialEq, Debug)]
pub struct TransactionJournal {
    capacity: usize,
    used: usize,
    phase: Phase,
    pending: Vec<Entry>,
}

impl TransactionJournal {
    /// Create a journal holding up to `capacity` bytes of pending writes
    pub const fn new(capacity: usize) -> Self {
        Self {
            capacity,
            used: 0,
            phase: Phase::Idle,
            pending: Vec::new(),
        }
    }

    /// Current journal phase
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Transaction nesting depth (0 or 1)
    pub fn depth(&self) -> u8 {
        match self.phase {
            Phase::Idle => 0,
            _ => 1,
        }
    }

    /// Check whether a transaction is open
    pub fn in_progress(&self) -> bool {
        self.phase == Phase::Open
    }

    /// Number of pending writes
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Open a transaction
    pub fn begin(&mut self) -> Result<(), Error> {
        match self.phase {
            Phase::Idle => (),
            Phase::Open => return Err(Error::TransactionAlreadyInProgress),
            Phase::Committing(_) => return Err(Error::TransactionInternalFailure),
        }

        self.pending.clear();
        self.used = 0;
        self.phase = Phase::Open;

        Ok(())
    }

    /// Record a write of `data` at `addr` in the open transaction
    ///
    /// When the write would exceed the journal capacity nothing is recorded
    /// and the transaction is left open for the caller to abort.
    pub fn record_write<S: Store>(
        &mut self,
        store: &S,
        addr: usize,
        data: &[u8],
    ) -> Result<(), Error> {
        if self.phase != Phase::Open {
            return Err(Error::TransactionNotInProgress);
        }

        store.check_range(addr, data.len())?;

        if self.used + data.len() > self.capacity {
            return Err(Error::CommitCapacityExceeded);
        }

        // Store contents are untouched until commit, so these are
        // the pre-transaction bytes
        let mut old = vec![0u8; data.len()];
        store.read(addr, &mut old)?;

        self.pending.push(Entry {
            addr,
            old,
            new: data.to_vec(),
        });
        self.used += data.len();

        Ok(())
    }

    /// Apply all pending writes to the store and close the transaction
    ///
    /// On [`Error::PowerLoss`] the journal remains in [`Phase::Committing`]
    /// until [`recover`][Self::recover] rolls the partial commit back.
    pub fn commit<S: Store>(&mut self, store: &mut S) -> Result<(), Error> {
        match self.phase {
            Phase::Open => (),
            Phase::Idle => return Err(Error::TransactionNotInProgress),
            Phase::Committing(_) => return Err(Error::TransactionInternalFailure),
        }

        self.phase = Phase::Committing(self.seal());

        for e in &self.pending {
            store.write(e.addr, &e.new)?;
        }

        self.reset();

        Ok(())
    }

    /// Discard pending writes and close the transaction
    pub fn abort(&mut self) -> Result<(), Error> {
        match self.phase {
            Phase::Open => (),
            Phase::Idle => return Err(Error::TransactionNotInProgress),
            Phase::Committing(_) => return Err(Error::TransactionInternalFailure),
        }

        self.reset();

        Ok(())
    }

    /// Recover following a power loss or reset
    ///
    /// Open transactions are discarded, partially applied commits are rolled
    /// back in reverse order using the recorded pre-transaction bytes.
    pub fn recover<S: Store>(&mut self, store: &mut S) -> Result<Recovery, Error> {
        let seal = match self.phase {
            Phase::Idle => return Ok(Recovery::Clean),
            Phase::Open => {
                self.reset();
                return Ok(Recovery::Discarded);
            }
            Phase::Committing(seal) => seal,
        };

        if seal != self.seal() {
            #[cfg(feature = "log")]
            log::error!("commit record seal mismatch, discarding journal");

            self.reset();
            return Err(Error::TransactionInternalFailure);
        }

        for e in self.pending.iter().rev() {
            store.write(e.addr, &e.old)?;
        }

        self.reset();

        Ok(Recovery::RolledBack)
    }

    /// Read from the store with pending writes applied
    pub fn read<S: Store>(&self, store: &S, addr: usize, buff: &mut [u8]) -> Result<(), Error> {
        store.read(addr, buff)?;

        let end = addr + buff.len();

        for e in &self.pending {
            let e_end = e.addr + e.new.len();

            let start = addr.max(e.addr);
            let stop = end.min(e_end);
            if start >= stop {
                continue;
            }

            buff[start - addr..stop - addr].copy_from_slice(&e.new[start - e.addr..stop - e.addr]);
        }

        Ok(())
    }

    /// Total journal capacity in bytes
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes of pending writes
    pub fn used(&self) -> usize {
        self.used
    }

    /// Remaining capacity, saturated at 32767
    pub fn unused_capacity(&self) -> usize {
        (self.capacity - self.used).min(MAX_SHORT)
    }

    /// Total capacity, saturated at 32767
    pub fn max_capacity(&self) -> usize {
        self.capacity.min(MAX_SHORT)
    }

    fn reset(&mut self) {
        self.pending.clear();
        self.used = 0;
        self.phase = Phase::Idle;
    }

    fn seal(&self) -> u32 {
        let mut d = SEAL.digest();

        for e in &self.pending {
            d.update(&(e.addr as u64).to_le_bytes());
            d.update(&(e.new.len() as u64).to_le_bytes());
            d.update(&e.old);
            d.update(&e.new);
        }

        d.finalize()
    }
}

#[cfg(test)]
mod test {
    use crate::MemStore;

    use super::*;

    #[test]
    fn nesting() {
        let mut j = TransactionJournal::new(64);

        assert_eq!(j.commit(&mut MemStore::new(4)), Err(Error::TransactionNotInProgress));
        assert_eq!(j.abort(), Err(Error::TransactionNotInProgress));

        j.begin().unwrap();
        assert_eq!(j.depth(), 1);
        assert_eq!(j.begin(), Err(Error::TransactionAlreadyInProgress));

        j.abort().unwrap();
        assert_eq!(j.depth(), 0);
    }

    #[test]
    fn writes_outside_transaction() {
        let s = MemStore::new(8);
        let mut j = TransactionJournal::new(64);

        assert_eq!(
            j.record_write(&s, 0, &[1]),
            Err(Error::TransactionNotInProgress)
        );
    }

    #[test]
    fn commit_applies_in_order() {
        let mut s = MemStore::new(8);
        let mut j = TransactionJournal::new(64);

        j.begin().unwrap();
        j.record_write(&s, 0, &[1, 2, 3, 4]).unwrap();
        j.record_write(&s, 2, &[9, 9]).unwrap();

        // Nothing applied until commit
        assert_eq!(s.as_bytes(), &[0u8; 8]);

        let mut b = [0u8; 6];
        j.read(&s, 0, &mut b).unwrap();
        assert_eq!(b, [1, 2, 9, 9, 0, 0]);

        j.commit(&mut s).unwrap();
        assert_eq!(s.as_bytes(), &[1, 2, 9, 9, 0, 0, 0, 0]);
        assert_eq!(j.depth(), 0);
        assert_eq!(j.pending(), 0);
    }

    #[test]
    fn capacity_exceeded_leaves_transaction_open() {
        let mut s = MemStore::new(32);
        let mut j = TransactionJournal::new(8);

        j.begin().unwrap();
        j.record_write(&s, 0, &[1; 6]).unwrap();
        assert_eq!(j.unused_capacity(), 2);

        assert_eq!(
            j.record_write(&s, 8, &[2; 3]),
            Err(Error::CommitCapacityExceeded)
        );
        assert!(j.in_progress());
        assert_eq!(j.pending(), 1);

        j.abort().unwrap();
        assert_eq!(j.commit(&mut s), Err(Error::TransactionNotInProgress));
        assert_eq!(s.as_bytes(), &[0u8; 32]);
    }

    #[test]
    fn reported_capacity_saturates() {
        let j = TransactionJournal::new(100_000);
        assert_eq!(j.max_capacity(), 32767);
        assert_eq!(j.unused_capacity(), 32767);
        assert_eq!(j.capacity(), 100_000);
    }

    #[test]
    fn torn_commit_rolls_back() {
        let mut s = MemStore::new(8);
        s.write(0, &[7; 8]).unwrap();

        let mut j = TransactionJournal::new(64);
        j.begin().unwrap();
        j.record_write(&s, 0, &[1, 1, 1]).unwrap();
        j.record_write(&s, 4, &[2, 2, 2]).unwrap();

        // Lose power part way through the second entry
        s.arm_tear(4);
        assert_eq!(j.commit(&mut s), Err(Error::PowerLoss));
        assert_eq!(s.as_bytes(), &[1, 1, 1, 7, 2, 7, 7, 7]);
        assert_eq!(j.phase(), Phase::Committing(j.seal()));

        s.power_on();
        assert_eq!(j.recover(&mut s), Ok(Recovery::RolledBack));
        assert_eq!(s.as_bytes(), &[7; 8]);
        assert_eq!(j.phase(), Phase::Idle);
    }

    #[test]
    fn corrupted_commit_record_is_not_replayed() {
        let mut s = MemStore::new(8);
        let mut j = TransactionJournal::new(64);

        j.begin().unwrap();
        j.record_write(&s, 0, &[1, 1]).unwrap();
        s.arm_tear(1);
        assert_eq!(j.commit(&mut s), Err(Error::PowerLoss));

        j.pending[0].old[0] = 0xEE;

        s.power_on();
        assert_eq!(j.recover(&mut s), Err(Error::TransactionInternalFailure));
        assert_eq!(j.phase(), Phase::Idle);
    }

    #[test]
    fn recovery_discards_open_transaction() {
        let mut s = MemStore::new(4);
        let mut j = TransactionJournal::new(64);

        assert_eq!(j.recover(&mut s), Ok(Recovery::Clean));

        j.begin().unwrap();
        j.record_write(&s, 0, &[5]).unwrap();
        assert_eq!(j.recover(&mut s), Ok(Recovery::Discarded));
        assert_eq!(s.as_bytes(), &[0; 4]);
    }
}
