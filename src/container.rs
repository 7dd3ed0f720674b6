// SPDX-License-Identifier: MIT
//! Self-describing, block-aligned binary container.

use std::path::Path;

use parking_lot::{MappedRwLockReadGuard, MappedRwLockWriteGuard};
use tracing::{debug, warn};

use crate::arena::ByteArena;
use crate::error::{Error, Result};
use crate::format::{tags, ContainerHeader, ContainerKind, BASE_HEADER_SIZE, ID_FIELD, TYPE_FIELD};
use crate::persist;

/// One self-describing blob: a header at a fixed position in a shared arena,
/// followed by its payload, padded out to a block boundary.
///
/// A standalone container owns its arena with the header at byte 0. Views
/// handed out by a composite share the parent's arena with the header
/// repositioned, so mutations through a view are visible to the parent. A
/// view must therefore never be treated as independent storage; it lives as
/// long as the shared region does.
#[derive(Debug, Clone, Default)]
pub struct Container {
    arena: ByteArena,
    /// Offset of this container's header within the arena.
    base: usize,
}

impl Container {
    pub fn new() -> Self {
        Self::default()
    }

    /// View of `arena` with the header at `base`. Used by composite lookup.
    pub(crate) fn view(arena: ByteArena, base: usize) -> Self {
        Self { arena, base }
    }

    pub(crate) fn arena(&self) -> &ByteArena {
        &self.arena
    }

    pub(crate) fn base(&self) -> usize {
        self.base
    }

    /// Sizes the arena for `payload_bytes` of payload plus the base header,
    /// rounded up to a multiple of `block_size`, and writes a fresh header.
    /// Returns the usable payload capacity.
    pub fn allocate(&mut self, payload_bytes: usize, block_size: usize) -> Result<usize> {
        self.allocate_with_header(payload_bytes, block_size, BASE_HEADER_SIZE)
    }

    /// As [`Container::allocate`], reserving `header_size` bytes for an
    /// extended header written by the caller.
    pub(crate) fn allocate_with_header(
        &mut self,
        payload_bytes: usize,
        block_size: usize,
        header_size: usize,
    ) -> Result<usize> {
        if block_size == 0 {
            return Err(Error::InvalidBlockSize);
        }
        let need = payload_bytes
            .checked_add(header_size)
            .ok_or(Error::AllocationFailed { bytes: usize::MAX })?;
        let total = need
            .div_ceil(block_size)
            .checked_mul(block_size)
            .ok_or(Error::AllocationFailed { bytes: usize::MAX })?;

        self.arena.allocate(total, false)?;
        self.base = 0;

        let mut header = ContainerHeader::new(tags::BASE);
        header.total_size = total as u64;
        header.header_size = header_size as u64;
        header.payload_offset = header_size as u64;
        self.arena.write_at(0, &header.to_bytes())?;

        debug!(id = header.id, total, block_size, "allocated container");
        Ok(total - header_size)
    }

    /// Parsed copy of the header, or `None` while unallocated.
    pub fn header(&self) -> Option<ContainerHeader> {
        let mut raw = [0u8; BASE_HEADER_SIZE];
        self.arena.read_at(self.base, &mut raw).ok()?;
        ContainerHeader::from_bytes(&raw).ok()
    }

    fn require_header(&self) -> Result<ContainerHeader> {
        self.header()
            .ok_or_else(|| Error::InvalidFormat("container is not allocated".to_string()))
    }

    pub fn id(&self) -> u64 {
        self.header().map_or(0, |header| header.id)
    }

    /// Stamps a caller-chosen id over the generated one.
    pub fn set_id(&self, id: u64) -> Result<()> {
        self.require_header()?;
        self.arena.write_at(self.base + ID_FIELD, &id.to_le_bytes())
    }

    pub(crate) fn set_type_tag(&self, tag: u64) -> Result<()> {
        self.require_header()?;
        self.arena.write_at(self.base + TYPE_FIELD, &tag.to_le_bytes())
    }

    /// Total container size in bytes; 0 while unallocated.
    pub fn size(&self) -> u64 {
        self.header().map_or(0, |header| header.total_size)
    }

    pub fn kind(&self) -> ContainerKind {
        ContainerKind::from_tag(self.header().map_or(tags::UNKNOWN, |header| header.type_tag))
    }

    /// Payload byte range within the arena, checked against the header's own
    /// bookkeeping before any access goes through.
    fn payload_range(&self) -> Result<(usize, usize)> {
        let header = self.require_header()?;
        let start = usize::try_from(header.payload_offset)
            .map_err(|_| Error::InvalidFormat("payload offset overflow".to_string()))?;
        let total = usize::try_from(header.total_size)
            .map_err(|_| Error::InvalidFormat("container size overflow".to_string()))?;
        let header_size = usize::try_from(header.header_size)
            .map_err(|_| Error::InvalidFormat("header size overflow".to_string()))?;

        let region_end = self
            .base
            .checked_add(total)
            .ok_or_else(|| Error::InvalidFormat("container region overflow".to_string()))?;
        let header_end = self
            .base
            .checked_add(header_size)
            .ok_or_else(|| Error::InvalidFormat("container region overflow".to_string()))?;

        if start < header_end || start > region_end || region_end > self.arena.len() {
            return Err(Error::InvalidFormat(format!(
                "payload range {start}..{region_end} escapes an arena of {} bytes",
                self.arena.len()
            )));
        }
        Ok((start, region_end))
    }

    /// Usable payload bytes, padding included; 0 while unallocated.
    pub fn payload_len(&self) -> usize {
        self.payload_range().map_or(0, |(start, end)| end - start)
    }

    /// Read view of the payload bytes. Zero-copy; holds the arena's read
    /// lock for the guard's lifetime.
    pub fn payload(&self) -> Result<MappedRwLockReadGuard<'_, [u8]>> {
        let (start, end) = self.payload_range()?;
        self.arena.slice(start, end - start)
    }

    /// Write view of the payload bytes.
    pub fn payload_mut(&self) -> Result<MappedRwLockWriteGuard<'_, [u8]>> {
        let (start, end) = self.payload_range()?;
        self.arena.slice_mut(start, end - start)
    }

    /// Copies `bytes` to the start of the payload region.
    pub fn write_payload(&self, bytes: &[u8]) -> Result<()> {
        let (start, end) = self.payload_range()?;
        let available = end - start;
        if bytes.len() > available {
            warn!(needed = bytes.len(), available, "payload write rejected");
            return Err(Error::OutOfSpace {
                needed: bytes.len() as u64,
                available: available as u64,
            });
        }
        self.arena.write_at(start, bytes)
    }

    /// Writes this container's entire region, alignment padding included,
    /// creating or truncating `path`.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let header = self.require_header()?;
        let total = usize::try_from(header.total_size)
            .map_err(|_| Error::InvalidFormat("container size overflow".to_string()))?;
        let bytes = self.arena.slice(self.base, total)?;
        persist::write_file(path.as_ref(), &bytes)?;
        debug!(
            id = header.id,
            bytes = total,
            path = %path.as_ref().display(),
            "saved container"
        );
        Ok(())
    }

    /// Reads a container back from a file produced by [`Container::save`].
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = persist::read_file(path.as_ref())?;
        let container = Self::from_bytes(bytes)?;
        debug!(
            id = container.id(),
            bytes = container.arena.len(),
            path = %path.as_ref().display(),
            "loaded container"
        );
        Ok(container)
    }

    /// Adopts an in-memory serialized container, validating the header.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let header = ContainerHeader::from_bytes(&bytes)?;
        header.validate()?;
        if header.total_size > bytes.len() as u64 {
            return Err(Error::InvalidFormat(format!(
                "header claims {} bytes but the region holds {}",
                header.total_size,
                bytes.len()
            )));
        }
        Ok(Self {
            arena: ByteArena::from_vec(bytes),
            base: 0,
        })
    }

    /// Diagnostic JSON for the header; empty while unallocated.
    pub fn to_json(&self, brackets: bool) -> String {
        self.header()
            .map_or_else(String::new, |header| header.to_json(brackets))
    }
}
