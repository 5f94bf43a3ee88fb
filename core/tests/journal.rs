//! Transaction journal atomicity, capacity and nesting over a tearing store

use rand::{rngs::StdRng, Rng, SeedableRng};

use jcre_core::{util, Error, MemStore, Memory, Recovery, Store};

mod helpers;
use helpers::*;

const STORE_SIZE: usize = 256;

/// Random write set, (address, data) pairs fitting the store
fn write_set(rng: &mut StdRng, n: usize) -> Vec<(usize, Vec<u8>)> {
    (0..n)
        .map(|_| {
            let len = rng.gen_range(1..=16);
            let addr = rng.gen_range(0..=STORE_SIZE - len);
            let data = (0..len).map(|_| rng.gen()).collect();
            (addr, data)
        })
        .collect()
}

fn seeded_memory(rng: &mut StdRng, capacity: usize) -> Memory<MemStore> {
    let mut s = MemStore::new(STORE_SIZE);
    let init: Vec<u8> = (0..STORE_SIZE).map(|_| rng.gen()).collect();
    s.write(0, &init).unwrap();

    Memory::new(s, capacity)
}

#[test]
fn crash_before_commit_leaves_store_unchanged() {
    init_log();

    let mut rng = StdRng::seed_from_u64(0x5eed_0001);

    for _ in 0..64 {
        let mut mem = seeded_memory(&mut rng, 4096);
        let before = snapshot(&mem);

        mem.begin_transaction().unwrap();
        let n = rng.gen_range(1..16);
        let writes = write_set(&mut rng, n);
        for (addr, data) in &writes {
            mem.write(*addr, data).unwrap();
        }

        // Reset with the transaction open
        assert_eq!(mem.recover(), Ok(Recovery::Discarded));
        assert_eq!(snapshot(&mem), before);
        assert_eq!(mem.transaction_depth(), 0);
    }
}

#[test]
fn torn_commit_recovers_pre_transaction_state() {
    init_log();

    let mut rng = StdRng::seed_from_u64(0x5eed_0002);

    for _ in 0..64 {
        let mut mem = seeded_memory(&mut rng, 4096);
        let before = snapshot(&mem);

        mem.begin_transaction().unwrap();
        let n = rng.gen_range(1..16);
        let writes = write_set(&mut rng, n);
        let total: usize = writes.iter().map(|(_, d)| d.len()).sum();
        for (addr, data) in &writes {
            mem.write(*addr, data).unwrap();
        }

        // Lose power somewhere within the commit
        mem.store_mut().arm_tear(rng.gen_range(0..total));
        assert_eq!(mem.commit_transaction(), Err(Error::PowerLoss));

        mem.store_mut().power_on();
        assert_eq!(mem.recover(), Ok(Recovery::RolledBack));
        assert_eq!(snapshot(&mem), before);
    }
}

#[test]
fn completed_commit_applies_every_write() {
    let mut rng = StdRng::seed_from_u64(0x5eed_0003);

    for _ in 0..64 {
        let mut mem = seeded_memory(&mut rng, 4096);
        let mut expected = snapshot(&mem);

        mem.begin_transaction().unwrap();
        let n = rng.gen_range(1..16);
        for (addr, data) in write_set(&mut rng, n) {
            mem.write(addr, &data).unwrap();
            expected[addr..][..data.len()].copy_from_slice(&data);
        }
        mem.commit_transaction().unwrap();

        assert_eq!(snapshot(&mem), expected);
        assert_eq!(mem.recover(), Ok(Recovery::Clean));
    }
}

#[test]
fn capacity_bound_leaves_store_unchanged() {
    init_log();

    let mut rng = StdRng::seed_from_u64(0x5eed_0004);

    for _ in 0..64 {
        let capacity = rng.gen_range(16..64);
        let mut mem = seeded_memory(&mut rng, capacity);
        let before = snapshot(&mem);

        mem.begin_transaction().unwrap();

        let mut used = 0;
        let mut exceeded = false;
        for (addr, data) in write_set(&mut rng, 64) {
            let r = mem.write(addr, &data);
            if used + data.len() > capacity {
                assert_eq!(r, Err(Error::CommitCapacityExceeded));
                exceeded = true;
                break;
            }
            r.unwrap();
            used += data.len();
            assert_eq!(mem.unused_commit_capacity(), capacity - used);
        }
        assert!(exceeded);

        // Still open for the caller to abort
        assert!(mem.in_transaction());
        mem.abort_transaction().unwrap();
        assert_eq!(snapshot(&mem), before);
    }
}

#[test]
fn nesting_is_rejected() {
    let mut mem = Memory::new(MemStore::new(8), 16);

    assert_eq!(mem.commit_transaction(), Err(Error::TransactionNotInProgress));
    assert_eq!(mem.abort_transaction(), Err(Error::TransactionNotInProgress));
    assert_eq!(mem.write(0, &[1]), Err(Error::TransactionNotInProgress));

    mem.begin_transaction().unwrap();
    assert_eq!(mem.begin_transaction(), Err(Error::TransactionAlreadyInProgress));
    assert_eq!(mem.transaction_depth(), 1);

    mem.commit_transaction().unwrap();
    assert_eq!(mem.commit_transaction(), Err(Error::TransactionNotInProgress));
    assert_eq!(mem.transaction_depth(), 0);
}

#[test]
fn reason_codes() {
    assert_eq!(Error::TransactionAlreadyInProgress.reason(), Some(1));
    assert_eq!(Error::TransactionNotInProgress.reason(), Some(2));
    assert_eq!(Error::CommitCapacityExceeded.reason(), Some(3));
    assert_eq!(Error::TransactionInternalFailure.reason(), Some(4));
    assert_eq!(Error::PowerLoss.reason(), None);
}

#[test]
fn non_atomic_copy_may_tear() {
    init_log();

    let mut mem = Memory::new(MemStore::new(16), 64);

    mem.store_mut().arm_tear(3);
    assert_eq!(
        util::array_copy_non_atomic(&mut mem, &[9; 8], 0, 0, 8),
        Err(Error::PowerLoss)
    );

    // Partially updated, nothing to recover
    mem.store_mut().power_on();
    assert_eq!(&snapshot(&mem)[..8], &[9, 9, 9, 0, 0, 0, 0, 0]);
    assert_eq!(mem.recover(), Ok(Recovery::Clean));
}

#[test]
fn atomic_copy_survives_tear() {
    init_log();

    let mut mem = Memory::new(MemStore::new(16), 64);

    mem.store_mut().arm_tear(3);
    assert_eq!(
        util::array_copy(&mut mem, &[9; 8], 0, 0, 8),
        Err(Error::PowerLoss)
    );

    mem.store_mut().power_on();
    assert_eq!(mem.recover(), Ok(Recovery::RolledBack));
    assert_eq!(snapshot(&mem), vec![0u8; 16]);
}
