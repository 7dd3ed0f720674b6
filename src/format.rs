// SPDX-License-Identifier: MIT
//! On-disk layout of container headers.
//!
//! Headers live in-band at byte 0 of the arena region they describe, so they
//! are always read and written through explicit little-endian
//! (de)serialization into a byte slice, never as a struct overlay.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use serde::Serialize;

use crate::error::{Error, Result};

/// Magic bytes opening every container header: "BPC\x01\x00\x00".
pub const CONTAINER_MAGIC: &[u8; 6] = &[66, 80, 67, 1, 0, 0];

/// Serialized size of a [`ContainerHeader`].
pub const BASE_HEADER_SIZE: usize = 46;

/// Serialized size of the fixed part of a [`DirectoryHeader`]. The directory
/// slots follow immediately after.
pub const DIRECTORY_HEADER_SIZE: usize = BASE_HEADER_SIZE + 6;

/// Bytes per directory slot: one little-endian u16 offset.
pub const DIRECTORY_SLOT_SIZE: usize = 2;

/// Byte offset of the `id` field inside a serialized header.
pub(crate) const ID_FIELD: usize = 6;
/// Byte offset of the `type_tag` field inside a serialized header.
pub(crate) const TYPE_FIELD: usize = 14;
/// Byte offset of the `payload_offset` field inside a serialized header.
pub(crate) const PAYLOAD_OFFSET_FIELD: usize = 38;

/// Single-byte blocks: no alignment padding.
pub const BLOCK_SIZE_BYTE: usize = 1;
/// 4 MiB blocks, matching a large storage write unit.
pub const BLOCK_SIZE_4MB: usize = 4_194_304;

/// Raw type-tag values carried in the header.
pub mod tags {
    pub const UNKNOWN: u64 = 0;
    pub const BASE: u64 = 1;
    pub const COMPOSITE: u64 = 2;
    pub const IMAGE: u64 = 3;
}

/// Interpreted form of a header's type tag.
///
/// The engine copies payload bytes of tags it does not know without ever
/// interpreting them; dispatch is "read the tag, pick the header struct to
/// overlay", not virtual dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Base,
    Composite,
    Image,
    /// Any tag the engine does not interpret; payload bytes stay opaque.
    Unknown(u64),
}

impl ContainerKind {
    pub fn from_tag(tag: u64) -> Self {
        match tag {
            tags::BASE => ContainerKind::Base,
            tags::COMPOSITE => ContainerKind::Composite,
            tags::IMAGE => ContainerKind::Image,
            other => ContainerKind::Unknown(other),
        }
    }

    pub fn tag(&self) -> u64 {
        match *self {
            ContainerKind::Base => tags::BASE,
            ContainerKind::Composite => tags::COMPOSITE,
            ContainerKind::Image => tags::IMAGE,
            ContainerKind::Unknown(other) => other,
        }
    }
}

/// Returns a fresh container id: wall-clock time in 10 ns ticks, forced
/// strictly increasing within the process so ids double as unique keys.
pub fn next_container_id() -> u64 {
    static LAST: AtomicU64 = AtomicU64::new(0);

    let now = Utc::now();
    let ticks = now.timestamp().max(0) as u64 * 100_000_000
        + u64::from(now.timestamp_subsec_nanos()) / 10;

    let mut prev = LAST.load(Ordering::Relaxed);
    loop {
        let next = if ticks > prev { ticks } else { prev + 1 };
        match LAST.compare_exchange_weak(prev, next, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return next,
            Err(observed) => prev = observed,
        }
    }
}

/// Fixed-layout metadata describing one packed blob.
///
/// Layout (little-endian):
/// `[magic:6][id:u64][type:u64][total_size:u64][header_size:u64][payload_offset:u64]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerHeader {
    pub magic: [u8; 6],
    pub id: u64,
    pub type_tag: u64,
    /// Bytes in the whole container region, block-aligned.
    pub total_size: u64,
    /// Bytes consumed by this header.
    pub header_size: u64,
    /// Absolute byte offset, within whatever arena currently holds this
    /// header, at which the payload begins.
    pub payload_offset: u64,
}

impl ContainerHeader {
    /// Fresh header with a generated id. Sizes are filled in by the
    /// allocator.
    pub fn new(type_tag: u64) -> Self {
        Self {
            magic: *CONTAINER_MAGIC,
            id: next_container_id(),
            type_tag,
            total_size: 0,
            header_size: BASE_HEADER_SIZE as u64,
            payload_offset: BASE_HEADER_SIZE as u64,
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < BASE_HEADER_SIZE {
            return Err(Error::InvalidFormat(format!(
                "header needs {BASE_HEADER_SIZE} bytes, got {}",
                bytes.len()
            )));
        }
        let mut magic = [0u8; 6];
        magic.copy_from_slice(&bytes[0..6]);
        Ok(Self {
            magic,
            id: read_u64(bytes, ID_FIELD),
            type_tag: read_u64(bytes, TYPE_FIELD),
            total_size: read_u64(bytes, 22),
            header_size: read_u64(bytes, 30),
            payload_offset: read_u64(bytes, PAYLOAD_OFFSET_FIELD),
        })
    }

    pub fn to_bytes(&self) -> [u8; BASE_HEADER_SIZE] {
        let mut bytes = [0u8; BASE_HEADER_SIZE];
        bytes[0..6].copy_from_slice(&self.magic);
        bytes[6..14].copy_from_slice(&self.id.to_le_bytes());
        bytes[14..22].copy_from_slice(&self.type_tag.to_le_bytes());
        bytes[22..30].copy_from_slice(&self.total_size.to_le_bytes());
        bytes[30..38].copy_from_slice(&self.header_size.to_le_bytes());
        bytes[38..46].copy_from_slice(&self.payload_offset.to_le_bytes());
        bytes
    }

    /// Checks the magic bytes.
    pub fn validate(&self) -> Result<()> {
        if self.magic != *CONTAINER_MAGIC {
            return Err(Error::InvalidFormat("bad magic bytes".to_string()));
        }
        Ok(())
    }

    pub fn kind(&self) -> ContainerKind {
        ContainerKind::from_tag(self.type_tag)
    }

    /// Diagnostic JSON rendering; not part of the binary format.
    /// `brackets = false` drops the outer braces so the fragment can be
    /// embedded in a larger object.
    pub fn to_json(&self, brackets: bool) -> String {
        render_json(
            &HeaderInfo {
                id: self.id,
                type_tag: self.type_tag,
                size: self.total_size,
                offset: self.payload_offset,
            },
            brackets,
        )
    }
}

/// Header of a composite container: the base header plus directory
/// bookkeeping. `capacity_entries` u16 slots follow the fixed part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectoryHeader {
    pub base: ContainerHeader,
    /// Number of directory slots reserved at allocate time.
    pub capacity_entries: u16,
    pub entry_count: u16,
    /// Bytes of the arena consumed by header, directory and children.
    pub used_bytes: u16,
}

impl DirectoryHeader {
    /// Header region size for a directory of `capacity` slots.
    pub fn header_size(capacity: u16) -> usize {
        DIRECTORY_HEADER_SIZE + usize::from(capacity) * DIRECTORY_SLOT_SIZE
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < DIRECTORY_HEADER_SIZE {
            return Err(Error::InvalidFormat(format!(
                "directory header needs {DIRECTORY_HEADER_SIZE} bytes, got {}",
                bytes.len()
            )));
        }
        Ok(Self {
            base: ContainerHeader::from_bytes(bytes)?,
            capacity_entries: read_u16(bytes, 46),
            entry_count: read_u16(bytes, 48),
            used_bytes: read_u16(bytes, 50),
        })
    }

    pub fn to_bytes(&self) -> [u8; DIRECTORY_HEADER_SIZE] {
        let mut bytes = [0u8; DIRECTORY_HEADER_SIZE];
        bytes[..BASE_HEADER_SIZE].copy_from_slice(&self.base.to_bytes());
        bytes[46..48].copy_from_slice(&self.capacity_entries.to_le_bytes());
        bytes[48..50].copy_from_slice(&self.entry_count.to_le_bytes());
        bytes[50..52].copy_from_slice(&self.used_bytes.to_le_bytes());
        bytes
    }

    pub fn validate(&self) -> Result<()> {
        self.base.validate()?;
        if self.entry_count > self.capacity_entries {
            return Err(Error::InvalidFormat(format!(
                "entry count {} exceeds directory capacity {}",
                self.entry_count, self.capacity_entries
            )));
        }
        if u64::from(self.used_bytes) > self.base.total_size {
            return Err(Error::InvalidFormat(format!(
                "used bytes {} exceed total size {}",
                self.used_bytes, self.base.total_size
            )));
        }
        Ok(())
    }

    pub fn to_json(&self, brackets: bool) -> String {
        render_json(
            &DirectoryInfo {
                id: self.base.id,
                type_tag: self.base.type_tag,
                size: self.base.total_size,
                offset: self.base.payload_offset,
                object_data: ObjectData {
                    container_count: self.entry_count,
                    table_size: self.capacity_entries,
                    used_bytes: self.used_bytes,
                },
            },
            brackets,
        )
    }
}

fn read_u64(bytes: &[u8], at: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[at..at + 8]);
    u64::from_le_bytes(raw)
}

fn read_u16(bytes: &[u8], at: usize) -> u16 {
    let mut raw = [0u8; 2];
    raw.copy_from_slice(&bytes[at..at + 2]);
    u16::from_le_bytes(raw)
}

#[derive(Serialize)]
struct HeaderInfo {
    id: u64,
    #[serde(rename = "type")]
    type_tag: u64,
    size: u64,
    offset: u64,
}

#[derive(Serialize)]
struct DirectoryInfo {
    id: u64,
    #[serde(rename = "type")]
    type_tag: u64,
    size: u64,
    offset: u64,
    #[serde(rename = "objectData")]
    object_data: ObjectData,
}

#[derive(Serialize)]
struct ObjectData {
    #[serde(rename = "containerCount")]
    container_count: u16,
    #[serde(rename = "tableSize")]
    table_size: u16,
    #[serde(rename = "usedBytes")]
    used_bytes: u16,
}

/// Struct-derived serialization keeps the key order stable.
pub(crate) fn render_json<T: Serialize>(value: &T, brackets: bool) -> String {
    let rendered = serde_json::to_string(value).unwrap_or_default();
    if brackets {
        rendered
    } else {
        rendered
            .trim_start_matches('{')
            .trim_end_matches('}')
            .to_string()
    }
}
