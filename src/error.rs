// SPDX-License-Identifier: MIT
//! Error taxonomy for arena and container operations.

use thiserror::Error;

/// Errors produced by the storage engine.
///
/// Full directories, insufficient space and out-of-range indices are
/// ordinary outcomes a caller is expected to handle; nothing here is used
/// for control flow inside the engine itself.
#[derive(Debug, Error)]
pub enum Error {
    /// The backing allocation could not be obtained. Fatal, never retried.
    #[error("allocation of {bytes} bytes failed")]
    AllocationFailed { bytes: usize },

    /// Re-allocation was attempted without resize permission.
    #[error("buffer is already allocated; pass resize to replace it")]
    AlreadyAllocated,

    #[error("block size must be non-zero")]
    InvalidBlockSize,

    /// The directory has no free slot left.
    #[error("directory is full ({capacity} entries)")]
    DirectoryFull { capacity: u16 },

    /// The arena has fewer free bytes than the item needs.
    #[error("out of space: need {needed} bytes, {available} available")]
    OutOfSpace { needed: u64, available: u64 },

    #[error("index {index} out of range (len {len})")]
    IndexOutOfRange { index: usize, len: usize },

    /// A byte region did not parse as a container.
    #[error("invalid container format: {0}")]
    InvalidFormat(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
