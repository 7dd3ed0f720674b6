// SPDX-License-Identifier: MIT
//! Composite container: a fixed directory of offsets plus packed children.

use std::path::Path;

use tracing::{debug, warn};

use crate::container::Container;
use crate::error::{Error, Result};
use crate::format::{
    ContainerKind, DirectoryHeader, DIRECTORY_HEADER_SIZE, DIRECTORY_SLOT_SIZE,
    PAYLOAD_OFFSET_FIELD, tags,
};

/// Default number of directory slots reserved by
/// [`CompositeContainer::allocate`].
pub const DEFAULT_DIRECTORY_CAPACITY: u16 = 256;

/// A container whose arena additionally holds, right after the header, a
/// fixed array of child offsets, followed by the appended children packed
/// back-to-back.
///
/// Append-only: children are never removed, capacity never grows after
/// allocation. The intended pattern is single-writer build-then-publish:
/// allocate, `add` repeatedly, then hand the finished value out for
/// read-side `get`/`save`.
#[derive(Debug, Clone, Default)]
pub struct CompositeContainer {
    inner: Container,
}

impl CompositeContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Borrow as a plain container: same arena, same header position.
    pub fn as_container(&self) -> &Container {
        &self.inner
    }

    /// Allocates with the default directory capacity.
    pub fn allocate(&mut self, payload_bytes: usize, block_size: usize) -> Result<usize> {
        self.allocate_with_capacity(payload_bytes, DEFAULT_DIRECTORY_CAPACITY, block_size)
    }

    /// Reserves room for `capacity_entries` children plus `payload_bytes` of
    /// packed child data, rounded up to `block_size`. Returns the packing
    /// capacity left after header and directory.
    pub fn allocate_with_capacity(
        &mut self,
        payload_bytes: usize,
        capacity_entries: u16,
        block_size: usize,
    ) -> Result<usize> {
        let header_size = DirectoryHeader::header_size(capacity_entries);
        // used_bytes starts at header_size and is 16-bit on disk.
        if header_size > usize::from(u16::MAX) {
            return Err(Error::InvalidFormat(format!(
                "a directory of {capacity_entries} entries does not fit 16-bit bookkeeping"
            )));
        }

        let capacity = self
            .inner
            .allocate_with_header(payload_bytes, block_size, header_size)?;

        let mut base = self
            .inner
            .header()
            .ok_or_else(|| Error::InvalidFormat("header missing after allocation".to_string()))?;
        base.type_tag = tags::COMPOSITE;
        let dir = DirectoryHeader {
            base,
            capacity_entries,
            entry_count: 0,
            used_bytes: header_size as u16,
        };
        self.write_dir_header(&dir)?;

        debug!(
            id = dir.base.id,
            capacity_entries,
            total = dir.base.total_size,
            "allocated composite container"
        );
        Ok(capacity)
    }

    fn dir_header(&self) -> Result<DirectoryHeader> {
        let mut raw = [0u8; DIRECTORY_HEADER_SIZE];
        self.inner
            .arena()
            .read_at(self.inner.base(), &mut raw)
            .map_err(|_| Error::InvalidFormat("composite is not allocated".to_string()))?;
        let dir = DirectoryHeader::from_bytes(&raw)?;
        dir.validate()?;
        Ok(dir)
    }

    fn write_dir_header(&self, dir: &DirectoryHeader) -> Result<()> {
        self.inner.arena().write_at(self.inner.base(), &dir.to_bytes())
    }

    fn slot_position(&self, index: usize) -> usize {
        self.inner.base() + DIRECTORY_HEADER_SIZE + index * DIRECTORY_SLOT_SIZE
    }

    fn read_slot(&self, index: usize) -> Result<u16> {
        let mut raw = [0u8; 2];
        self.inner.arena().read_at(self.slot_position(index), &mut raw)?;
        Ok(u16::from_le_bytes(raw))
    }

    fn write_slot(&self, index: usize, offset: u16) -> Result<()> {
        self.inner
            .arena()
            .write_at(self.slot_position(index), &offset.to_le_bytes())
    }

    pub fn capacity_entries(&self) -> u16 {
        self.dir_header().map_or(0, |dir| dir.capacity_entries)
    }

    pub fn entry_count(&self) -> u16 {
        self.dir_header().map_or(0, |dir| dir.entry_count)
    }

    /// Bytes of the arena consumed by header, directory and children so far.
    pub fn used_bytes(&self) -> u16 {
        self.dir_header().map_or(0, |dir| dir.used_bytes)
    }

    /// Appends a serialized copy of `child` and records its offset in the
    /// next directory slot.
    ///
    /// The copy's `payload_offset` field is rewritten at relocation time:
    /// the field means "payload starts here, counted from the start of the
    /// arena holding this header", and that arena changes the instant the
    /// bytes move. Skipping the rewrite would make every later read of the
    /// copy mis-locate its payload.
    pub fn add(&mut self, child: &Container) -> Result<()> {
        let mut dir = self.dir_header()?;

        if dir.entry_count >= dir.capacity_entries {
            warn!(capacity = dir.capacity_entries, "directory full, child rejected");
            return Err(Error::DirectoryFull {
                capacity: dir.capacity_entries,
            });
        }

        let child_header = child
            .header()
            .ok_or_else(|| Error::InvalidFormat("child container is not allocated".to_string()))?;
        child_header.validate()?;
        let child_size = usize::try_from(child_header.total_size)
            .map_err(|_| Error::InvalidFormat("child size overflow".to_string()))?;

        let used = usize::from(dir.used_bytes);
        let available = dir.base.total_size.saturating_sub(used as u64);
        if available < child_size as u64 {
            warn!(needed = child_size, available, "composite out of space");
            return Err(Error::OutOfSpace {
                needed: child_size as u64,
                available,
            });
        }
        // Offsets and used_bytes are 16-bit on disk.
        let new_used = used + child_size;
        if new_used > usize::from(u16::MAX) {
            let addressable = u64::from(u16::MAX) - used as u64;
            warn!(
                needed = child_size,
                available = addressable,
                "child escapes 16-bit directory addressing"
            );
            return Err(Error::OutOfSpace {
                needed: child_size as u64,
                available: addressable,
            });
        }

        let dst = self.inner.base() + used;
        self.inner
            .arena()
            .copy_from(dst, child.arena(), child.base(), child_size)?;

        // Payload position relative to the child's own header.
        let relative = child_header
            .payload_offset
            .checked_sub(child.base() as u64)
            .ok_or_else(|| Error::InvalidFormat("child payload offset precedes its header".to_string()))?;
        let rewritten = dst as u64 + relative;
        self.inner
            .arena()
            .write_at(dst + PAYLOAD_OFFSET_FIELD, &rewritten.to_le_bytes())?;

        self.write_slot(usize::from(dir.entry_count), used as u16)?;
        dir.entry_count += 1;
        dir.used_bytes = new_used as u16;
        self.write_dir_header(&dir)?;

        debug!(
            child_id = child_header.id,
            offset = used,
            bytes = child_size,
            entries = dir.entry_count,
            "added child container"
        );
        Ok(())
    }

    /// Zero-copy view of the `index`-th child. The view shares this
    /// composite's arena; mutating through it mutates the composite's bytes.
    pub fn get(&self, index: usize) -> Result<Container> {
        let dir = self.dir_header()?;
        let len = usize::from(dir.entry_count);
        if index >= len {
            warn!(index, len, "child index out of range");
            return Err(Error::IndexOutOfRange { index, len });
        }

        let offset = usize::from(self.read_slot(index)?);
        let view = Container::view(self.inner.arena().clone(), self.inner.base() + offset);
        let header = view.header().ok_or_else(|| {
            Error::InvalidFormat(format!("directory slot {index} points outside the arena"))
        })?;
        header.validate()?;
        Ok(view)
    }

    /// Reinterprets a loaded container as a composite after checking its
    /// type tag and directory bookkeeping.
    pub fn from_container(container: Container) -> Result<Self> {
        let composite = Self { inner: container };
        let dir = composite.dir_header()?;
        if dir.base.kind() != ContainerKind::Composite {
            return Err(Error::InvalidFormat(format!(
                "type tag {} is not a composite container",
                dir.base.type_tag
            )));
        }
        if DirectoryHeader::header_size(dir.capacity_entries) as u64 != dir.base.header_size {
            return Err(Error::InvalidFormat(
                "directory capacity disagrees with header size".to_string(),
            ));
        }
        Ok(composite)
    }

    /// Reads a composite back from a file produced by [`CompositeContainer::save`].
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_container(Container::load(path)?)
    }

    /// Writes the whole arena, children and padding included.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.inner.save(path)
    }

    pub fn id(&self) -> u64 {
        self.inner.id()
    }

    pub fn set_id(&self, id: u64) -> Result<()> {
        self.inner.set_id(id)
    }

    pub fn size(&self) -> u64 {
        self.inner.size()
    }

    /// Diagnostic JSON including the directory bookkeeping.
    pub fn to_json(&self, brackets: bool) -> String {
        self.dir_header()
            .map_or_else(|_| String::new(), |dir| dir.to_json(brackets))
    }
}
