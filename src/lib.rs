// SPDX-License-Identifier: MIT
//! # blockpack
//!
//! A hierarchical binary container storage engine. A container is one
//! contiguous, self-describing blob: a fixed-layout header at the start of a
//! shared byte arena, followed by payload, padded out to a block-size
//! multiple so the whole region can be persisted in a single write. A
//! composite container packs whole serialized containers into its own arena
//! behind a fixed table of offsets, giving O(1) random access to any child
//! without parsing.
//!
//! ## Format Specification
//!
//! ```text
//! Container (little-endian):
//! - Magic: "BPC\x01\x00\x00"            (6 bytes)
//! - Id: unique, timestamp-derived       (u64)
//! - Type tag: 0 unknown, 1 base,
//!   2 composite, 3 image               (u64)
//! - Total size: whole region,
//!   block-aligned                      (u64)
//! - Header size                        (u64)
//! - Payload offset: absolute within
//!   the arena holding this header      (u64)
//!
//! Composite container, after the base fields:
//! - Capacity entries                   (u16)
//! - Entry count                        (u16)
//! - Used bytes                         (u16)
//! - Directory: capacity x u16 offsets, one per appended child
//! - Children: complete serialized containers, packed back-to-back
//! - Zero padding out to the next block boundary
//! ```
//!
//! Headers are embedded in-band, so a `payload_offset` is only meaningful
//! relative to the arena that currently holds the header. Appending a
//! container to a composite relocates its bytes and rewrites that field in
//! the copy; the field in the original stays untouched.
//!
//! Capacity is fixed at allocation time for both payload bytes and
//! directory entries. `add` past either limit fails instead of
//! reallocating, which keeps appends O(1) and the on-disk layout size
//! stable from the moment the container is created.
//!
//! ## Usage
//!
//! ```rust
//! use blockpack::{CompositeContainer, Container, BLOCK_SIZE_BYTE};
//!
//! let mut child = Container::new();
//! child.allocate(4, BLOCK_SIZE_BYTE).unwrap();
//! child.write_payload(b"abcd").unwrap();
//!
//! let mut composite = CompositeContainer::new();
//! composite.allocate_with_capacity(1024, 8, BLOCK_SIZE_BYTE).unwrap();
//! composite.add(&child).unwrap();
//!
//! // Zero-copy view into the composite's arena.
//! let view = composite.get(0).unwrap();
//! assert_eq!(&view.payload().unwrap()[..], b"abcd");
//! ```
//!
//! Containers are not internally synchronized beyond the arena lock; the
//! intended pattern is single-writer build-then-publish. Views returned by
//! `get` share the composite's reference-counted arena and never outlive
//! their backing region.

pub mod arena;
pub mod composite;
pub mod container;
pub mod error;
pub mod format;
pub mod image;
pub mod persist;

pub use arena::ByteArena;
pub use composite::{CompositeContainer, DEFAULT_DIRECTORY_CAPACITY};
pub use container::Container;
pub use error::{Error, Result};
pub use format::{
    next_container_id, ContainerHeader, ContainerKind, DirectoryHeader, BASE_HEADER_SIZE,
    BLOCK_SIZE_4MB, BLOCK_SIZE_BYTE, CONTAINER_MAGIC, DIRECTORY_HEADER_SIZE,
};
pub use image::{ImageContainer, PixelMode, IMAGE_HEADER_SIZE};
