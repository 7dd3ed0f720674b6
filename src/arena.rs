// SPDX-License-Identifier: MIT
//! Reference-counted byte arena backing one or more containers.

use std::fmt;
use std::sync::Arc;

use parking_lot::{MappedRwLockReadGuard, MappedRwLockWriteGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{Error, Result};

/// A resizable, reference-counted byte buffer with bounds-checked access.
///
/// Cloning an arena shares the underlying region, which is how several
/// containers alias the same bytes. An empty arena owns no region at all:
/// `len() == 0` exactly when no region is attached.
#[derive(Clone, Default)]
pub struct ByteArena {
    region: Option<Arc<RwLock<Vec<u8>>>>,
}

impl ByteArena {
    pub fn new() -> Self {
        Self { region: None }
    }

    /// Wraps an existing byte vector. An empty vector yields an empty arena.
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        if bytes.is_empty() {
            Self::new()
        } else {
            Self {
                region: Some(Arc::new(RwLock::new(bytes))),
            }
        }
    }

    /// Sizes the arena to `bytes`, zero-filling any fresh tail.
    ///
    /// Fails with [`Error::AlreadyAllocated`] when a region exists and
    /// `resize` is false. `bytes == 0` deallocates. Resizing attaches a new
    /// region and copies the overlapping prefix; existing aliases keep the
    /// old region.
    pub fn allocate(&mut self, bytes: usize, resize: bool) -> Result<()> {
        if !self.is_empty() && !resize {
            return Err(Error::AlreadyAllocated);
        }
        if bytes == 0 {
            self.deallocate();
            return Ok(());
        }

        let mut fresh = Vec::new();
        fresh
            .try_reserve_exact(bytes)
            .map_err(|_| Error::AllocationFailed { bytes })?;
        fresh.resize(bytes, 0);

        if let Some(old) = self.region.take() {
            let old = old.read();
            let keep = old.len().min(bytes);
            fresh[..keep].copy_from_slice(&old[..keep]);
        }

        self.region = Some(Arc::new(RwLock::new(fresh)));
        Ok(())
    }

    /// Releases this handle's region. Idempotent; aliases keep theirs.
    pub fn deallocate(&mut self) {
        self.region = None;
    }

    pub fn len(&self) -> usize {
        self.region.as_ref().map_or(0, |region| region.read().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when both handles share one region.
    pub fn aliases(&self, other: &ByteArena) -> bool {
        match (&self.region, &other.region) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub fn byte(&self, index: usize) -> Result<u8> {
        Ok(self.slice(index, 1)?[0])
    }

    pub fn set_byte(&self, index: usize, value: u8) -> Result<()> {
        self.slice_mut(index, 1)?[0] = value;
        Ok(())
    }

    /// Read view of `len` bytes starting at `start`. Holds the region's read
    /// lock for the lifetime of the guard.
    pub fn slice(&self, start: usize, len: usize) -> Result<MappedRwLockReadGuard<'_, [u8]>> {
        let region = self.region.as_ref().ok_or(Error::IndexOutOfRange { index: start, len: 0 })?;
        let guard = region.read();
        let total = guard.len();
        let end = start
            .checked_add(len)
            .filter(|&end| end <= total)
            .ok_or(Error::IndexOutOfRange { index: start.saturating_add(len), len: total })?;
        Ok(RwLockReadGuard::map(guard, |bytes| &bytes[start..end]))
    }

    /// Write view of `len` bytes starting at `start`.
    pub fn slice_mut(&self, start: usize, len: usize) -> Result<MappedRwLockWriteGuard<'_, [u8]>> {
        let region = self.region.as_ref().ok_or(Error::IndexOutOfRange { index: start, len: 0 })?;
        let guard = region.write();
        let total = guard.len();
        let end = start
            .checked_add(len)
            .filter(|&end| end <= total)
            .ok_or(Error::IndexOutOfRange { index: start.saturating_add(len), len: total })?;
        Ok(RwLockWriteGuard::map(guard, |bytes| &mut bytes[start..end]))
    }

    pub fn read_at(&self, offset: usize, dst: &mut [u8]) -> Result<()> {
        let src = self.slice(offset, dst.len())?;
        dst.copy_from_slice(&src);
        Ok(())
    }

    pub fn write_at(&self, offset: usize, src: &[u8]) -> Result<()> {
        let mut dst = self.slice_mut(offset, src.len())?;
        dst.copy_from_slice(src);
        Ok(())
    }

    /// Copies `len` bytes from `src` into this arena.
    ///
    /// When both handles share one region the copy runs under a single write
    /// lock, so a view can be packed into its own backing arena without
    /// deadlocking.
    pub fn copy_from(&self, dst_offset: usize, src: &ByteArena, src_offset: usize, len: usize) -> Result<()> {
        if len == 0 {
            return Ok(());
        }
        if self.aliases(src) {
            let region = self
                .region
                .as_ref()
                .ok_or(Error::IndexOutOfRange { index: dst_offset, len: 0 })?;
            let mut guard = region.write();
            let total = guard.len();
            let src_end = src_offset
                .checked_add(len)
                .filter(|&end| end <= total)
                .ok_or(Error::IndexOutOfRange { index: src_offset.saturating_add(len), len: total })?;
            dst_offset
                .checked_add(len)
                .filter(|&end| end <= total)
                .ok_or(Error::IndexOutOfRange { index: dst_offset.saturating_add(len), len: total })?;
            guard.copy_within(src_offset..src_end, dst_offset);
            Ok(())
        } else {
            let from = src.slice(src_offset, len)?;
            let mut to = self.slice_mut(dst_offset, len)?;
            to.copy_from_slice(&from);
            Ok(())
        }
    }
}

impl fmt::Debug for ByteArena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteArena")
            .field("len", &self.len())
            .field("attached", &self.region.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_arena_is_empty() {
        let arena = ByteArena::new();
        assert_eq!(arena.len(), 0);
        assert!(arena.is_empty());
    }

    #[test]
    fn test_allocate_and_deallocate() {
        let mut arena = ByteArena::new();
        arena.allocate(100, false).unwrap();
        assert_eq!(arena.len(), 100);

        arena.deallocate();
        assert_eq!(arena.len(), 0);

        // Deallocate is idempotent.
        arena.deallocate();
        assert_eq!(arena.len(), 0);
    }

    #[test]
    fn test_allocate_zero_releases_region() {
        let mut arena = ByteArena::new();
        arena.allocate(10, false).unwrap();
        arena.allocate(0, true).unwrap();
        assert!(arena.is_empty());
    }

    #[test]
    fn test_reallocate_without_resize_fails() {
        let mut arena = ByteArena::new();
        arena.allocate(10, false).unwrap();
        assert!(matches!(arena.allocate(20, false), Err(Error::AlreadyAllocated)));
    }

    #[test]
    fn test_resize_preserves_prefix() {
        let mut arena = ByteArena::new();
        arena.allocate(4, false).unwrap();
        arena.write_at(0, &[1, 2, 3, 4]).unwrap();

        arena.allocate(8, true).unwrap();
        let mut prefix = [0u8; 4];
        arena.read_at(0, &mut prefix).unwrap();
        assert_eq!(prefix, [1, 2, 3, 4]);
        assert_eq!(arena.byte(7).unwrap(), 0);

        arena.allocate(2, true).unwrap();
        assert_eq!(arena.len(), 2);
        assert_eq!(arena.byte(1).unwrap(), 2);
    }

    #[test]
    fn test_indexed_access_is_bounds_checked() {
        let mut arena = ByteArena::new();
        arena.allocate(4, false).unwrap();
        arena.set_byte(3, 9).unwrap();
        assert_eq!(arena.byte(3).unwrap(), 9);
        assert!(matches!(arena.byte(4), Err(Error::IndexOutOfRange { .. })));
        assert!(matches!(arena.write_at(2, &[0; 3]), Err(Error::IndexOutOfRange { .. })));
    }

    #[test]
    fn test_clone_aliases_same_region() {
        let mut arena = ByteArena::new();
        arena.allocate(4, false).unwrap();
        let view = arena.clone();
        assert!(arena.aliases(&view));

        view.set_byte(2, 42).unwrap();
        assert_eq!(arena.byte(2).unwrap(), 42);
    }

    #[test]
    fn test_resize_detaches_from_aliases() {
        let mut arena = ByteArena::new();
        arena.allocate(4, false).unwrap();
        let view = arena.clone();

        arena.allocate(8, true).unwrap();
        assert!(!arena.aliases(&view));
        assert_eq!(view.len(), 4);
    }

    #[test]
    fn test_copy_from_between_arenas() {
        let mut src = ByteArena::new();
        src.allocate(4, false).unwrap();
        src.write_at(0, &[5, 6, 7, 8]).unwrap();

        let mut dst = ByteArena::new();
        dst.allocate(8, false).unwrap();
        dst.copy_from(2, &src, 0, 4).unwrap();

        let mut copied = [0u8; 4];
        dst.read_at(2, &mut copied).unwrap();
        assert_eq!(copied, [5, 6, 7, 8]);
    }

    #[test]
    fn test_copy_from_same_region_does_not_deadlock() {
        let mut arena = ByteArena::new();
        arena.allocate(8, false).unwrap();
        arena.write_at(0, &[1, 2, 3, 4, 0, 0, 0, 0]).unwrap();

        let alias = arena.clone();
        arena.copy_from(4, &alias, 0, 4).unwrap();

        let mut tail = [0u8; 4];
        arena.read_at(4, &mut tail).unwrap();
        assert_eq!(tail, [1, 2, 3, 4]);
    }
}
