use crate::types::encoding::{decode_uint, write_uint};
use crate::virtual_machine::errors::VMError;
use std::ops::Range;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Flat byte memory shared by every thread of a machine.
///
/// Layout: `[Text][Data][Bss][zero padding ... stack]`. Address 0 is the
/// first Text byte and the stack grows down from [`len`](Self::len).
///
/// Every access is bounds checked and takes the lock for the duration of one
/// copy, so a single read or write is never torn.
#[derive(Debug)]
pub struct Memory {
    bytes: RwLock<Vec<u8>>,
}

impl Memory {
    /// Wraps `body` and zero-pads it to `size` bytes.
    ///
    /// Fails with [`VMError::ImageTooLarge`] if `body` is already larger.
    pub fn new(mut body: Vec<u8>, size: usize) -> Result<Self, VMError> {
        if body.len() > size {
            return Err(VMError::ImageTooLarge {
                size: body.len(),
                memory_size: size,
            });
        }
        body.resize(size, 0);
        Ok(Self {
            bytes: RwLock::new(body),
        })
    }

    fn read_lock(&self) -> RwLockReadGuard<'_, Vec<u8>> {
        self.bytes.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_lock(&self) -> RwLockWriteGuard<'_, Vec<u8>> {
        self.bytes.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn len(&self) -> usize {
        self.read_lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if `[address, address + len)` lies inside memory.
    pub fn contains(&self, address: u64, len: u64) -> bool {
        address
            .checked_add(len)
            .is_some_and(|end| end <= self.len() as u64)
    }

    fn range(address: u64, len: usize, size: usize) -> Result<Range<usize>, VMError> {
        let out_of_bounds = || VMError::MemoryOutOfBounds {
            address,
            len: len as u64,
            size,
        };
        let start = usize::try_from(address).map_err(|_| out_of_bounds())?;
        let end = start.checked_add(len).ok_or_else(out_of_bounds)?;
        if end > size {
            return Err(out_of_bounds());
        }
        Ok(start..end)
    }

    /// Copies `dest.len()` bytes starting at `address` into `dest`.
    pub fn read_into(&self, address: u64, dest: &mut [u8]) -> Result<(), VMError> {
        let bytes = self.read_lock();
        let range = Self::range(address, dest.len(), bytes.len())?;
        dest.copy_from_slice(&bytes[range]);
        Ok(())
    }

    /// Returns a copy of `len` bytes starting at `address`.
    pub fn read(&self, address: u64, len: usize) -> Result<Vec<u8>, VMError> {
        let bytes = self.read_lock();
        let range = Self::range(address, len, bytes.len())?;
        Ok(bytes[range].to_vec())
    }

    /// Reads a `width`-byte big-endian unsigned integer.
    pub fn read_uint(&self, address: u64, width: usize) -> Result<u64, VMError> {
        let mut buf = [0u8; 8];
        let width = width.min(8);
        self.read_into(address, &mut buf[..width])?;
        Ok(decode_uint(&buf[..width]))
    }

    /// Copies `data` to `address`.
    pub fn write(&self, address: u64, data: &[u8]) -> Result<(), VMError> {
        let mut bytes = self.write_lock();
        let size = bytes.len();
        let range = Self::range(address, data.len(), size)?;
        bytes[range].copy_from_slice(data);
        Ok(())
    }

    /// Writes the low `width` bytes of `value`, most significant first.
    pub fn write_uint(&self, address: u64, value: u64, width: usize) -> Result<(), VMError> {
        let mut buf = [0u8; 8];
        let width = width.min(8);
        write_uint(value, &mut buf[..width]);
        self.write(address, &buf[..width])
    }

    /// Copies `[start, end)` clamped to memory, for dumps.
    pub fn snapshot(&self, start: u64, end: u64) -> Vec<u8> {
        let bytes = self.read_lock();
        let end = (end.min(bytes.len() as u64)) as usize;
        let start = (start as usize).min(end);
        bytes[start..end].to_vec()
    }
}
