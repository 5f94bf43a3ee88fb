// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Array helpers over persistent and transient memory
//!
//! Atomic helpers route their writes through the [`Memory`] journal, opening
//! and committing a transaction of their own only when the caller has none
//! in progress. `_non_atomic` variants write straight to the store and may
//! leave the destination partially updated if interrupted.
//!
//! Persistent destinations are addressed by store offset, transient arrays
//! are plain slices. Helpers return the offset following the last byte
//! written, as `Util` does.

use alloc::vec;

use byteorder::{BigEndian, ByteOrder};

use crate::{Error, Memory, Store};

/// Check `off..off + len` lies within a slice of `size` bytes
fn check_slice(size: usize, off: usize, len: usize) -> Result<(), Error> {
    match off.checked_add(len) {
        Some(end) if end <= size => Ok(()),
        _ => Err(Error::OutOfBounds),
    }
}

/// Atomically copy `len` bytes from `src[src_off..]` to persistent memory at `dest_off`
pub fn array_copy<S: Store>(
    mem: &mut Memory<S>,
    src: &[u8],
    src_off: usize,
    dest_off: usize,
    len: usize,
) -> Result<usize, Error> {
    check_slice(src.len(), src_off, len)?;
    mem.store().check_range(dest_off, len)?;

    mem.atomically(|m| m.write(dest_off, &src[src_off..][..len]))?;

    Ok(dest_off + len)
}

/// Copy `len` bytes from `src[src_off..]` to persistent memory at `dest_off`,
/// bypassing the journal
pub fn array_copy_non_atomic<S: Store>(
    mem: &mut Memory<S>,
    src: &[u8],
    src_off: usize,
    dest_off: usize,
    len: usize,
) -> Result<usize, Error> {
    check_slice(src.len(), src_off, len)?;
    mem.store().check_range(dest_off, len)?;

    mem.write_non_atomic(dest_off, &src[src_off..][..len])?;

    Ok(dest_off + len)
}

/// Copy `len` bytes of persistent memory at `src_off` into a transient array
pub fn array_copy_to_transient<S: Store>(
    mem: &Memory<S>,
    src_off: usize,
    dest: &mut [u8],
    dest_off: usize,
    len: usize,
) -> Result<usize, Error> {
    check_slice(dest.len(), dest_off, len)?;

    mem.read(src_off, &mut dest[dest_off..][..len])?;

    Ok(dest_off + len)
}

/// Atomically fill `len` bytes of persistent memory at `off` with `value`
pub fn array_fill<S: Store>(
    mem: &mut Memory<S>,
    off: usize,
    len: usize,
    value: u8,
) -> Result<usize, Error> {
    mem.store().check_range(off, len)?;

    let fill = vec![value; len];
    mem.atomically(|m| m.write(off, &fill))?;

    Ok(off + len)
}

/// Fill `len` bytes of persistent memory at `off` with `value`, bypassing the journal
pub fn array_fill_non_atomic<S: Store>(
    mem: &mut Memory<S>,
    off: usize,
    len: usize,
    value: u8,
) -> Result<usize, Error> {
    mem.store().check_range(off, len)?;

    mem.write_non_atomic(off, &vec![value; len])?;

    Ok(off + len)
}

/// Atomically write a big-endian short to persistent memory at `off`
pub fn set_short<S: Store>(mem: &mut Memory<S>, off: usize, value: i16) -> Result<usize, Error> {
    mem.store().check_range(off, 2)?;

    let mut b = [0u8; 2];
    BigEndian::write_i16(&mut b, value);

    mem.atomically(|m| m.write(off, &b))?;

    Ok(off + 2)
}

/// Write a big-endian short to persistent memory at `off`, bypassing the journal
pub fn set_short_non_atomic<S: Store>(
    mem: &mut Memory<S>,
    off: usize,
    value: i16,
) -> Result<usize, Error> {
    let mut b = [0u8; 2];
    BigEndian::write_i16(&mut b, value);

    mem.write_non_atomic(off, &b)?;

    Ok(off + 2)
}

/// Read a big-endian short from persistent memory at `off`
pub fn get_short_persistent<S: Store>(mem: &Memory<S>, off: usize) -> Result<i16, Error> {
    let mut b = [0u8; 2];
    mem.read(off, &mut b)?;

    Ok(BigEndian::read_i16(&b))
}

/// Write a big-endian short into a transient array
pub fn set_short_transient(buff: &mut [u8], off: usize, value: i16) -> Result<usize, Error> {
    check_slice(buff.len(), off, 2)?;

    BigEndian::write_i16(&mut buff[off..], value);

    Ok(off + 2)
}

/// Read a big-endian short from a transient array
pub fn get_short(buff: &[u8], off: usize) -> Result<i16, Error> {
    check_slice(buff.len(), off, 2)?;

    Ok(BigEndian::read_i16(&buff[off..]))
}

/// Concatenate two bytes into a short
pub const fn make_short(b1: u8, b2: u8) -> i16 {
    i16::from_be_bytes([b1, b2])
}

/// Compare `len` bytes of `src[src_off..]` and `dest[dest_off..]` as
/// unsigned values
///
/// Returns `0` when identical, `-1` when the first differing `src` byte is
/// smaller and `1` when it is larger.
pub fn array_compare(
    src: &[u8],
    src_off: usize,
    dest: &[u8],
    dest_off: usize,
    len: usize,
) -> Result<i8, Error> {
    check_slice(src.len(), src_off, len)?;
    check_slice(dest.len(), dest_off, len)?;

    let a = &src[src_off..][..len];
    let b = &dest[dest_off..][..len];

    let r = match a.cmp(b) {
        core::cmp::Ordering::Less => -1,
        core::cmp::Ordering::Equal => 0,
        core::cmp::Ordering::Greater => 1,
    };

    Ok(r)
}

#[cfg(test)]
mod test {
    use crate::MemStore;

    use super::*;

    #[test]
    fn compare_three_way() {
        let a = [1u8, 2, 3, 0x80];
        let b = [1u8, 2, 4, 0x00];

        assert_eq!(array_compare(&a, 0, &b, 0, 2), Ok(0));
        assert_eq!(array_compare(&a, 0, &b, 0, 3), Ok(-1));
        assert_eq!(array_compare(&b, 0, &a, 0, 3), Ok(1));

        // Bytes compare unsigned
        assert_eq!(array_compare(&a, 3, &b, 3, 1), Ok(1));

        assert_eq!(array_compare(&a, 2, &b, 0, 3), Err(Error::OutOfBounds));
    }

    #[test]
    fn shorts() {
        let mut b = [0u8; 4];
        assert_eq!(set_short_transient(&mut b, 1, -2), Ok(3));
        assert_eq!(b, [0x00, 0xFF, 0xFE, 0x00]);
        assert_eq!(get_short(&b, 1), Ok(-2));
        assert_eq!(get_short(&b, 3), Err(Error::OutOfBounds));
        assert_eq!(make_short(0x12, 0x34), 0x1234);
    }

    #[test]
    fn auto_transaction() {
        let mut mem = Memory::new(MemStore::new(16), 64);

        assert_eq!(array_copy(&mut mem, &[1, 2, 3], 1, 4, 2), Ok(6));
        assert_eq!(&mem.store().as_bytes()[4..6], &[2, 3]);
        assert_eq!(mem.transaction_depth(), 0);

        assert_eq!(set_short(&mut mem, 8, 0x0102), Ok(10));
        assert_eq!(get_short_persistent(&mem, 8), Ok(0x0102));

        assert_eq!(array_fill(&mut mem, 12, 4, 0xAA), Ok(16));
        assert_eq!(&mem.store().as_bytes()[12..], &[0xAA; 4]);

        assert_eq!(array_fill(&mut mem, 14, 4, 0xAA), Err(Error::OutOfBounds));
    }

    #[test]
    fn auto_transaction_aborts_on_capacity() {
        let mut mem = Memory::new(MemStore::new(16), 4);

        assert_eq!(
            array_copy(&mut mem, &[1; 8], 0, 0, 8),
            Err(Error::CommitCapacityExceeded)
        );
        assert_eq!(mem.transaction_depth(), 0);
        assert_eq!(mem.store().as_bytes(), &[0; 16]);

        // Non-atomic writes are not bounded by the journal
        assert_eq!(array_copy_non_atomic(&mut mem, &[1; 8], 0, 0, 8), Ok(8));
        assert_eq!(&mem.store().as_bytes()[..8], &[1; 8]);
    }

    #[test]
    fn transient_copy_observes_pending_writes() {
        let mut mem = Memory::new(MemStore::new(8), 16);

        mem.begin_transaction().unwrap();
        array_copy(&mut mem, &[5, 6], 0, 2, 2).unwrap();

        let mut t = [0u8; 4];
        assert_eq!(array_copy_to_transient(&mem, 1, &mut t, 0, 4), Ok(4));
        assert_eq!(t, [0, 5, 6, 0]);

        mem.abort_transaction().unwrap();
        array_copy_to_transient(&mem, 1, &mut t, 0, 4).unwrap();
        assert_eq!(t, [0; 4]);
    }
}
