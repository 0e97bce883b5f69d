//! # reftable-config
//!
//! Tuning knobs for the table writer and the stack manager.
//!
//! This crate does not read any configuration file or environment variable —
//! embedding applications decide how `WriteOptions`/`StackOptions` values are
//! produced. Both derive `serde::{Serialize, Deserialize}` so a host
//! application can load them from whatever format it already uses.

use serde::{Deserialize, Serialize};

/// Options governing how a single table is written.
///
/// Mirrors the consumed writer contract: block-level padding and indexing
/// behavior that the table writer honors when laying out a `.ref` file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteOptions {
    /// Do not pad out blocks to `block_size`.
    pub unpadded: bool,

    /// The block size in bytes. Should be less than 2^24.
    pub block_size: u32,

    /// Do not generate an object-id -> ref secondary index.
    pub skip_index_objects: bool,

    /// How often to write complete keys (restart points) in each block.
    pub restart_interval: usize,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            unpadded: false,
            block_size: 4096,
            skip_index_objects: false,
            restart_interval: 16,
        }
    }
}

/// Options governing the stack manager as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StackOptions {
    /// Options applied to every table the stack writes.
    pub write_options: WriteOptions,
}
