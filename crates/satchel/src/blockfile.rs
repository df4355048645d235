//! The flat block data file.
//!
//! One append-capable file, addressed in 128 KiB block units through
//! positional I/O so readers on independent handles never race the
//! writer's cursor. Short blocks are zero-padded only when they extend the
//! file, keeping the file length a whole number of blocks after every
//! committed mutation.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use rand::Rng;

use crate::{Error, Result, BLOCK_SIZE};

pub struct BlockFile {
    file: File,
    path: PathBuf,
    /// Write fault hook: when non-zero, each block write fails with
    /// probability 1/rate after putting a truncated prefix on disk.
    fault_rate: AtomicU32,
}

impl BlockFile {
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
            fault_rate: AtomicU32::new(0),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    /// Open an independent read-only handle for an entry reader.
    pub fn read_handle(&self) -> Result<File> {
        Ok(File::open(&self.path)?)
    }

    /// Write `buf` into block `index`. With `pad_if_short`, a buffer
    /// shorter than a full block is followed by zero padding so the block
    /// region is fully materialized; padding is requested only for blocks
    /// that extend the file, never for reused free blocks.
    pub fn write_block(&self, index: u32, buf: &[u8], pad_if_short: bool) -> Result<()> {
        debug_assert!(!buf.is_empty() && buf.len() <= BLOCK_SIZE);
        let offset = u64::from(index) * BLOCK_SIZE as u64;

        let rate = self.fault_rate.load(Ordering::Relaxed);
        if rate > 0 && rand::thread_rng().gen_range(0..rate) == 0 {
            let cut = rand::thread_rng().gen_range(0..buf.len().max(1));
            let _ = self.file.write_all_at(&buf[..cut], offset);
            tracing::debug!(index, size = buf.len(), written = cut, "injected short block write");
            return Err(Error::Testable);
        }

        self.file.write_all_at(buf, offset)?;
        if pad_if_short && buf.len() < BLOCK_SIZE {
            let padding = vec![0u8; BLOCK_SIZE - buf.len()];
            self.file.write_all_at(&padding, offset + buf.len() as u64)?;
        }
        Ok(())
    }

    pub fn truncate(&self, len: u64) -> Result<()> {
        self.file.set_len(len)?;
        Ok(())
    }

    pub fn set_fault_rate(&self, one_in: u32) {
        self.fault_rate.store(one_in, Ordering::Relaxed);
    }
}
