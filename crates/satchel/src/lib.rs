//! # satchel
//!
//! An embedded packed-file store: many logically-named byte streams inside
//! two on-disk artifacts, a transactional key/value index (LMDB via `heed`)
//! and a flat data file partitioned into fixed-size blocks.
//!
//! The store exposes a file-system-like interface (write, read, delete,
//! rename, copy, list, search, iterate, tag) over a flat key namespace that
//! is interpreted as a `/`-delimited path hierarchy. Directories are
//! derived from path prefixes; they have no row of their own.
//!
//! ## On-disk layout
//!
//! ```text
//! <path>.index                # LMDB file, single database "trunk"
//! <path>.<16-hex-tag>.data    # block file, 128 KiB per block
//! ```
//!
//! Entry keys in `trunk` are the raw name bytes. Keys whose first byte is
//! `*` are reserved for store bookkeeping: global and per-top-level-dir
//! aggregates, the free-block bitmap, the recorded data-file length, the
//! random data-file tag, and the optional size quota.
//!
//! Payloads smaller than [`SMALL_DATA_MAX`] are inlined into the metadata
//! record; everything else is striped over 128 KiB blocks whose indices are
//! handed out by a bitmap allocator that reuses freed blocks before
//! extending the file. The index commit is the linearization point: the
//! data file is written first, and on any failure it is truncated back to
//! its pre-write length while LMDB rolls the index back.
//!
//! ```no_run
//! use std::io::Read;
//!
//! let store = satchel::Package::open("bundle")?;
//! store.write_all("/assets/logo.png", b"\x89PNG...")?;
//! let mut body = String::new();
//! store.read("/assets/logo.png")?.read_to_string(&mut body)?;
//! # Ok::<(), satchel::Error>(())
//! ```

mod blockfile;
mod freemap;
mod list;
mod meta;
mod package;
mod path;
mod reader;

pub use meta::{Blocks, BlocksIter, Meta};
pub use package::{DirInfo, Node, Package, Stat};
pub use path::check_name;
pub use reader::EntryReader;

use thiserror::Error as ThisError;

/// Size of one data-file block. Block `i` lives at offset `i * BLOCK_SIZE`.
pub const BLOCK_SIZE: usize = 128 * 1024;

/// Payloads strictly smaller than this are inlined into the metadata
/// record instead of occupying a block.
pub const SMALL_DATA_MAX: usize = 2 * 1024;

/// Errors returned by the store.
#[derive(Debug, ThisError)]
pub enum Error {
    #[error("entry not found: {0}")]
    NotFound(String),

    #[error("invalid name: {0:?}")]
    InvalidName(String),

    #[error("{0} is a directory")]
    IsDirectory(String),

    #[error("name collision: {0}")]
    Collision(String),

    #[error("corrupted store: {0}")]
    Corruption(String),

    #[error("store max size reached: {0}")]
    MaxSize(u64),

    #[error("append requires a block-aligned, non-inlined entry: {0}")]
    NotAppendable(String),

    /// Sentinel returned from an iteration callback to stop early.
    /// Never surfaced to the caller of `iterate`/`iterate_meta`.
    #[error("iteration aborted")]
    Abort,

    /// Distinguished token produced by the write fault-injection hook.
    #[error("testable")]
    Testable,

    #[error("index error: {0}")]
    Index(#[from] heed::Error),

    #[error("metadata encoding: {0}")]
    Codec(#[from] bincode::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
