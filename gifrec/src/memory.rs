// memory.rs
//
// Copyright (c) 2026  Douglas Lau
//
//! Allocation hooks for encoder buffers
use crate::error::{Error, Result};
use std::mem::size_of;

/// Memory allocator for encoder buffers
///
/// Every buffer an encoder creates is requested through this interface
/// first, with sizes in bytes.  Returning an error refuses the request,
/// which tears down the encoder.
///
/// The default [Heap] allocator accepts every request; [Budget] caps the
/// total number of bytes outstanding.
///
/// [Budget]: struct.Budget.html
/// [Heap]: struct.Heap.html
pub trait Allocator {
    /// Request a new block of `size` bytes.
    fn allocate(&mut self, size: usize) -> Result<()>;

    /// Request resizing a block from `old_size` to `new_size` bytes.
    fn reallocate(&mut self, old_size: usize, new_size: usize) -> Result<()>;

    /// Release a block of `size` bytes.
    fn free(&mut self, size: usize);
}

/// Global heap allocator
#[derive(Clone, Copy, Debug, Default)]
pub struct Heap;

/// Allocator with a fixed limit on outstanding bytes
#[derive(Clone, Copy, Debug)]
pub struct Budget {
    /// Maximum outstanding bytes
    limit: usize,
    /// Bytes currently outstanding
    used: usize,
    /// Highest value of `used` seen
    peak: usize,
}

impl Allocator for Heap {
    fn allocate(&mut self, _size: usize) -> Result<()> {
        Ok(())
    }

    fn reallocate(
        &mut self,
        _old_size: usize,
        _new_size: usize,
    ) -> Result<()> {
        Ok(())
    }

    fn free(&mut self, _size: usize) {}
}

impl Budget {
    /// Create a budget allocator with a byte limit.
    pub fn new(limit: usize) -> Self {
        Budget {
            limit,
            used: 0,
            peak: 0,
        }
    }

    /// Create a budget allocator with no limit, for measuring.
    pub fn unlimited() -> Self {
        Self::new(usize::MAX)
    }

    /// Get the number of bytes currently outstanding.
    pub fn used(&self) -> usize {
        self.used
    }

    /// Get the highest number of bytes outstanding at once.
    pub fn peak(&self) -> usize {
        self.peak
    }

    /// Grow the outstanding total, if it fits within the limit.
    fn grow(&mut self, size: usize) -> Result<()> {
        match self.used.checked_add(size) {
            Some(used) if used <= self.limit => {
                self.used = used;
                self.peak = self.peak.max(used);
                Ok(())
            }
            _ => Err(Error::OutOfMemory),
        }
    }
}

impl Allocator for Budget {
    fn allocate(&mut self, size: usize) -> Result<()> {
        self.grow(size)
    }

    fn reallocate(&mut self, old_size: usize, new_size: usize) -> Result<()> {
        if new_size > old_size {
            self.grow(new_size - old_size)
        } else {
            self.free(old_size - new_size);
            Ok(())
        }
    }

    fn free(&mut self, size: usize) {
        debug_assert!(size <= self.used);
        self.used = self.used.saturating_sub(size);
    }
}

impl<A: Allocator + ?Sized> Allocator for &mut A {
    fn allocate(&mut self, size: usize) -> Result<()> {
        (**self).allocate(size)
    }

    fn reallocate(&mut self, old_size: usize, new_size: usize) -> Result<()> {
        (**self).reallocate(old_size, new_size)
    }

    fn free(&mut self, size: usize) {
        (**self).free(size)
    }
}

/// Get the size in bytes of `len` values
fn byte_size<T>(len: usize) -> Result<usize> {
    len.checked_mul(size_of::<T>()).ok_or(Error::OutOfMemory)
}

/// Allocate an empty vec with room for `capacity` values
pub(crate) fn with_capacity<T, A: Allocator>(
    alloc: &mut A,
    capacity: usize,
) -> Result<Vec<T>> {
    let size = byte_size::<T>(capacity)?;
    alloc.allocate(size)?;
    let mut buf = Vec::new();
    if buf.try_reserve_exact(capacity).is_err() {
        alloc.free(size);
        return Err(Error::OutOfMemory);
    }
    let actual = byte_size::<T>(buf.capacity())?;
    if actual != size {
        if let Err(err) = alloc.reallocate(size, actual) {
            alloc.free(size);
            return Err(err);
        }
    }
    Ok(buf)
}

/// Allocate a vec of `len` copies of `value`
pub(crate) fn filled<T: Copy, A: Allocator>(
    alloc: &mut A,
    len: usize,
    value: T,
) -> Result<Vec<T>> {
    let mut buf = with_capacity(alloc, len)?;
    buf.resize(len, value);
    Ok(buf)
}

/// Shrink a vec's capacity to fit its contents
pub(crate) fn shrink<T, A: Allocator>(
    alloc: &mut A,
    buf: &mut Vec<T>,
) -> Result<()> {
    let old_size = byte_size::<T>(buf.capacity())?;
    buf.shrink_to_fit();
    let new_size = byte_size::<T>(buf.capacity())?;
    alloc.reallocate(old_size, new_size)
}

/// Make room to push one more value onto a vec
pub(crate) fn reserve<T, A: Allocator>(
    alloc: &mut A,
    buf: &mut Vec<T>,
) -> Result<()> {
    if buf.len() < buf.capacity() {
        return Ok(());
    }
    let additional = buf.capacity().max(4);
    let old_size = byte_size::<T>(buf.capacity())?;
    let size = byte_size::<T>(buf.capacity() + additional)?;
    alloc.reallocate(old_size, size)?;
    if buf.try_reserve_exact(additional).is_err() {
        alloc.reallocate(size, old_size)?;
        return Err(Error::OutOfMemory);
    }
    let actual = byte_size::<T>(buf.capacity())?;
    if actual != size {
        alloc.reallocate(size, actual)?;
    }
    Ok(())
}

/// Release a vec allocated by one of the functions above
pub(crate) fn release<T, A: Allocator>(alloc: &mut A, buf: Vec<T>) {
    alloc.free(buf.capacity() * size_of::<T>());
}
