//! Seekable reader over one entry.
//!
//! Maps a logical offset `L` to block `positions[L / BLOCK_SIZE]`, byte
//! `L % BLOCK_SIZE`; the tail of the last block is clamped to the entry
//! size. Inlined entries are served from the metadata copy without
//! touching the data file. Each reader owns its own read-only handle, so
//! readers never contend with the writer or with each other.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::os::unix::fs::FileExt;

use crate::BLOCK_SIZE;

pub struct EntryReader {
    size: u64,
    pos: u64,
    src: Source,
}

enum Source {
    Inline(Vec<u8>),
    Blocks { file: File, offsets: Vec<u64> },
}

impl EntryReader {
    pub(crate) fn inline(data: Vec<u8>) -> Self {
        Self {
            size: data.len() as u64,
            pos: 0,
            src: Source::Inline(data),
        }
    }

    pub(crate) fn blocks(file: File, offsets: Vec<u64>, size: u64) -> Self {
        Self {
            size,
            pos: 0,
            src: Source::Blocks { file, offsets },
        }
    }

    /// Total entry length in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }
}

impl Read for EntryReader {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if self.pos >= self.size || out.is_empty() {
            return Ok(0);
        }
        match &mut self.src {
            Source::Inline(data) => {
                let start = self.pos as usize;
                let n = out.len().min(data.len() - start);
                out[..n].copy_from_slice(&data[start..start + n]);
                self.pos += n as u64;
                Ok(n)
            }
            Source::Blocks { file, offsets } => {
                let block = BLOCK_SIZE as u64;
                let idx = (self.pos / block) as usize;
                if idx >= offsets.len() {
                    return Ok(0);
                }
                let in_block = self.pos % block;
                // The last block only holds the remainder of the entry.
                let block_len = if idx == offsets.len() - 1 {
                    (self.size - idx as u64 * block).min(block)
                } else {
                    block
                };
                let want = out.len().min((block_len - in_block) as usize);
                let n = file.read_at(&mut out[..want], offsets[idx] + in_block)?;
                self.pos += n as u64;
                Ok(n)
            }
        }
    }
}

impl Seek for EntryReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let next: i128 = match pos {
            SeekFrom::Start(offset) => offset as i128,
            SeekFrom::Current(delta) => self.pos as i128 + delta as i128,
            SeekFrom::End(delta) => self.size as i128 + delta as i128,
        };
        if next < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of entry",
            ));
        }
        self.pos = next as u64;
        Ok(self.pos)
    }
}
