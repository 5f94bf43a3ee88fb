// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Persistent memory seam
//!
//! [`Store`] implementations provide byte addressed persistent memory. The
//! [`MemStore`] implementation keeps contents in RAM and can be armed to lose
//! power part way through a write, to exercise tear recovery.

#[cfg(feature = "alloc")]
use alloc::{vec, vec::Vec};

use crate::Error;

/// [`Store`] trait provides persistent memory for [`Memory`][crate::Memory] contexts
pub trait Store {
    /// Size of the store in bytes
    fn capacity(&self) -> usize;

    /// Read `buff.len()` bytes starting at `addr`
    fn read(&self, addr: usize, buff: &mut [u8]) -> Result<(), Error>;

    /// Write `data` starting at `addr`
    ///
    /// Writes are not atomic, a power loss may leave a prefix of `data`
    /// written and is reported as [`Error::PowerLoss`].
    fn write(&mut self, addr: usize, data: &[u8]) -> Result<(), Error>;

    /// Check an access of `len` bytes at `addr` fits the store
    fn check_range(&self, addr: usize, len: usize) -> Result<(), Error> {
        match addr.checked_add(len) {
            Some(end) if end <= self.capacity() => Ok(()),
            _ => Err(Error::OutOfBounds),
        }
    }
}

impl<T: Store> Store for &mut T {
    fn capacity(&self) -> usize {
        T::capacity(self)
    }

    fn read(&self, addr: usize, buff: &mut [u8]) -> Result<(), Error> {
        T::read(self, addr, buff)
    }

    fn write(&mut self, addr: usize, data: &[u8]) -> Result<(), Error> {
        T::write(self, addr, data)
    }
}

/// RAM backed [`Store`] with power loss injection
#[cfg(feature = "alloc")]
#[derive(Clone, PartialEq, Debug)]
pub struct MemStore {
    data: Vec<u8>,
    powered: bool,
    tear_after: Option<usize>,
}

#[cfg(feature = "alloc")]
impl MemStore {
    /// Create a zero filled store of `size` bytes
    pub fn new(size: usize) -> Self {
        Self {
            data: vec![0u8; size],
            powered: true,
            tear_after: None,
        }
    }

    /// Arm a power loss after `n` further bytes have been written
    pub fn arm_tear(&mut self, n: usize) {
        self.tear_after = Some(n);
    }

    /// Restore power following a tear
    pub fn power_on(&mut self) {
        self.powered = true;
        self.tear_after = None;
    }

    /// Check whether the store is currently powered
    pub fn is_powered(&self) -> bool {
        self.powered
    }

    /// Raw view of the store contents
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

#[cfg(feature = "alloc")]
impl Store for MemStore {
    fn capacity(&self) -> usize {
        self.data.len()
    }

    fn read(&self, addr: usize, buff: &mut [u8]) -> Result<(), Error> {
        self.check_range(addr, buff.len())?;

        buff.copy_from_slice(&self.data[addr..][..buff.len()]);

        Ok(())
    }

    fn write(&mut self, addr: usize, data: &[u8]) -> Result<(), Error> {
        if !self.powered {
            return Err(Error::PowerLoss);
        }

        self.check_range(addr, data.len())?;

        let dest = &mut self.data[addr..][..data.len()];

        match self.tear_after {
            Some(n) if n < data.len() => {
                // Power drops with only a prefix written
                dest[..n].copy_from_slice(&data[..n]);
                self.tear_after = None;
                self.powered = false;

                #[cfg(feature = "log")]
                log::warn!("store tear at {:#06x} after {} of {} bytes", addr, n, data.len());

                Err(Error::PowerLoss)
            }
            Some(n) => {
                dest.copy_from_slice(data);
                self.tear_after = Some(n - data.len());
                Ok(())
            }
            None => {
                dest.copy_from_slice(data);
                Ok(())
            }
        }
    }
}
