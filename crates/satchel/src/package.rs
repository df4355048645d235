//! The package facade: one LMDB write transaction per mutation, data-file
//! writes sequenced inside it, commit as the linearization point.
//!
//! The data file is not transactional, so the two failure windows are
//! repaired explicitly: a failed mutation truncates the file back to its
//! pre-write length, and a crash between a data write and the index commit
//! leaves orphan tail bytes that no metadata references, reclaimed by
//! [`Package::compact`] on the next open.

use std::collections::BTreeMap;
use std::io::Read;
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use crc32fast::Hasher;
use heed::types::Bytes;
use heed::{Database, Env, EnvFlags, EnvOpenOptions, RoTxn, RwTxn};
use tracing::{debug, instrument, warn};

use crate::blockfile::BlockFile;
use crate::freemap::FreeMap;
use crate::meta::Meta;
use crate::path;
use crate::reader::EntryReader;
use crate::{Error, Result, BLOCK_SIZE, SMALL_DATA_MAX};

const TRUNK_DB: &str = "trunk";

/// Reserved bookkeeping keys. Any key starting with this byte is invisible
/// to the entry namespace.
pub(crate) const RESERVED: u8 = b'*';

const KEY_FREE: &[u8] = b"*:free";
const KEY_DATA_LEN: &[u8] = b"*:data";
const KEY_DATA_FILE: &[u8] = b"*:datafile";
const KEY_TOTAL_SIZE: &[u8] = b"*:size";
const KEY_TOTAL_COUNT: &[u8] = b"*:count";
const KEY_MAX_SIZE: &[u8] = b"*:maxsize";

/// LMDB map size. The index only holds metadata records and inlined small
/// payloads, so this is generous.
const DEFAULT_MAP_SIZE: usize = 1024 * 1024 * 1024;

/// A listing result: either a real entry or a synthetic directory derived
/// from a shared name prefix.
#[derive(Debug, Clone)]
pub enum Node {
    File(Meta),
    Dir(DirInfo),
}

impl Node {
    pub fn name(&self) -> &str {
        match self {
            Node::File(meta) => &meta.name,
            Node::Dir(dir) => &dir.name,
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, Node::Dir(_))
    }

    pub fn meta(&self) -> Option<&Meta> {
        match self {
            Node::File(meta) => Some(meta),
            Node::Dir(_) => None,
        }
    }

    pub fn dir(&self) -> Option<&DirInfo> {
        match self {
            Node::File(_) => None,
            Node::Dir(dir) => Some(dir),
        }
    }
}

/// A synthetic directory. `size`/`count` are populated only when the
/// directory was resolved through the per-top-level aggregates.
#[derive(Debug, Clone)]
pub struct DirInfo {
    /// Trailing-`/` directory name.
    pub name: String,
    pub size: u64,
    pub count: u64,
}

/// Store-wide statistics.
#[derive(Debug, Clone)]
pub struct Stat {
    /// Sum of live entry sizes.
    pub size: u64,
    /// Combined on-disk footprint of the index and data files.
    pub disk_size: u64,
    /// Number of live entries.
    pub files: u64,
    /// Bitmap capacity in block slots, an upper bound on allocated indices.
    pub alloc_blocks: u64,
    pub data_file: PathBuf,
    pub index_file: PathBuf,
}

/// An open packed-file store.
///
/// Mutations are serialized by an internal mutex (which also owns the
/// reusable block-sized write buffer) plus the single-writer LMDB
/// transaction underneath; reads run on independent snapshots and file
/// handles and never block behind a writer.
pub struct Package {
    pub(crate) env: Env,
    pub(crate) trunk: Database<Bytes, Bytes>,
    pub(crate) data: BlockFile,
    index_path: PathBuf,
    writer: Mutex<Vec<u8>>,
}

impl Package {
    /// Open or create the store at `path` (`path.index` plus
    /// `path.<hex-tag>.data`). A trailing `.index` on `path` is ignored.
    ///
    /// The random tag recorded in the index names the data file, so a
    /// stale data file from a previous incarnation of the index can never
    /// be picked up by mistake. Opening fails with [`Error::Corruption`]
    /// when the data file is shorter than the recorded minimum length, and
    /// finishes by compacting trailing free blocks.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Package> {
        let raw = path.as_ref().as_os_str().to_string_lossy().into_owned();
        let base = raw.strip_suffix(".index").unwrap_or(&raw).to_string();
        let index_path = PathBuf::from(format!("{}.index", base));

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(DEFAULT_MAP_SIZE)
                .max_dbs(1)
                .flags(EnvFlags::NO_SUB_DIR)
                .open(&index_path)?
        };

        let mut wtxn = env.write_txn()?;
        let trunk: Database<Bytes, Bytes> = env.create_database(&mut wtxn, Some(TRUNK_DB))?;
        let min_len = trunk.get(&wtxn, KEY_DATA_LEN)?.map(be_u64).unwrap_or(0);
        let tag: [u8; 8] = match trunk.get(&wtxn, KEY_DATA_FILE)? {
            Some(raw) => <[u8; 8]>::try_from(raw).unwrap_or_else(|_| rand::random()),
            None => rand::random(),
        };
        trunk.put(&mut wtxn, KEY_DATA_FILE, &tag)?;
        wtxn.commit()?;

        let hex: String = tag.iter().map(|b| format!("{:02x}", b)).collect();
        let data = BlockFile::open(&PathBuf::from(format!("{}.{}.data", base, hex)))?;
        let eof = data.len()?;
        if eof < min_len {
            return Err(Error::Corruption(format!(
                "data file is {} bytes, recorded minimum is {}",
                eof, min_len
            )));
        }

        let pkg = Package {
            env,
            trunk,
            data,
            index_path,
            writer: Mutex::new(vec![0u8; BLOCK_SIZE]),
        };
        pkg.compact()?;
        debug!(index = %pkg.index_path.display(), "opened package");
        Ok(pkg)
    }

    /// Flush the index durably and consume the handle.
    pub fn close(self) -> Result<()> {
        self.env.force_sync()?;
        Ok(())
    }

    /// Store the full contents of `value` under `name`, replacing any
    /// previous entry with that name. The previous entry's blocks are
    /// released only after the new payload is fully on disk, so an aborted
    /// overwrite keeps the old image intact.
    pub fn write<R: Read>(&self, name: &str, value: R) -> Result<()> {
        self.write_tagged(name, value, BTreeMap::new())
    }

    /// [`write`](Package::write) with an attached tag map.
    #[instrument(skip(self, value, tags), level = "debug")]
    pub fn write_tagged<R: Read>(
        &self,
        name: &str,
        value: R,
        tags: BTreeMap<String, String>,
    ) -> Result<()> {
        if !path::check_name(name) {
            return Err(Error::InvalidName(name.to_string()));
        }
        let mut value = value;
        let mut buf = self.writer.lock().unwrap();
        let mut wtxn = self.env.write_txn()?;
        let before_eof = self.data.len()?;
        match self.write_locked(&mut wtxn, buf.as_mut_slice(), name, &mut value, tags, before_eof)
        {
            Ok(()) => {
                wtxn.commit()?;
                Ok(())
            }
            Err(err) => {
                drop(wtxn);
                self.rollback_data(before_eof);
                Err(err)
            }
        }
    }

    /// Byte-slice shorthand for [`write`](Package::write).
    pub fn write_all(&self, name: &str, value: &[u8]) -> Result<()> {
        self.write(name, value)
    }

    /// Extend an existing entry with the contents of `value`.
    ///
    /// Only entries whose size is an exact multiple of the block size and
    /// whose payload is not inlined can be appended to; anything else has
    /// a partially filled tail that cannot be continued in place. The
    /// stored checksum doubles as the resumable CRC state.
    #[instrument(skip(self, value), level = "debug")]
    pub fn append<R: Read>(&self, name: &str, value: R) -> Result<()> {
        if !path::check_name(name) {
            return Err(Error::NotFound(name.to_string()));
        }
        let mut value = value;
        let mut buf = self.writer.lock().unwrap();
        let mut wtxn = self.env.write_txn()?;
        let before_eof = self.data.len()?;
        match self.append_locked(&mut wtxn, buf.as_mut_slice(), name, &mut value, before_eof) {
            Ok(()) => {
                wtxn.commit()?;
                Ok(())
            }
            Err(err) => {
                drop(wtxn);
                self.rollback_data(before_eof);
                Err(err)
            }
        }
    }

    /// Open a seekable reader over the entry's current payload. The reader
    /// holds its own file handle and a snapshot of the block list, so it
    /// stays coherent while later mutations run.
    pub fn read(&self, name: &str) -> Result<EntryReader> {
        if !path::check_name(name) {
            return Err(Error::NotFound(name.to_string()));
        }
        let rtxn = self.env.read_txn()?;
        let meta = self.lookup(&rtxn, name)?;
        drop(rtxn);
        self.reader_for(&meta)
    }

    /// Read the whole entry into memory.
    pub fn read_all(&self, name: &str) -> Result<Vec<u8>> {
        let mut reader = self.read(name)?;
        let mut out = Vec::with_capacity(reader.size() as usize);
        reader.read_to_end(&mut out)?;
        Ok(out)
    }

    /// Metadata for an entry, or a synthetic node for a first-level
    /// directory answered from the per-top-level aggregates.
    pub fn info(&self, name: &str) -> Result<Node> {
        let trimmed = if name.len() > 1 {
            name.strip_suffix('/').unwrap_or(name)
        } else {
            name
        };
        if !path::check_name(trimmed) {
            return Err(Error::NotFound(name.to_string()));
        }
        let rtxn = self.env.read_txn()?;
        if let Some(raw) = self.trunk.get(&rtxn, trimmed.as_bytes())? {
            return Ok(Node::File(Meta::decode(raw)?));
        }
        if !trimmed[1..].contains('/') {
            let seg = path::first_segment(trimmed);
            let count = self.get_u64(&rtxn, format!("*:count{}", seg).as_bytes())?;
            if count > 0 {
                let size = self.get_u64(&rtxn, format!("*:size{}", seg).as_bytes())?;
                return Ok(Node::Dir(DirInfo {
                    name: format!("{}/", trimmed),
                    size,
                    count,
                }));
            }
        }
        Err(self.missing_err(&rtxn, trimmed))
    }

    /// Remove an entry, returning its blocks to the free map. The data
    /// file is not shrunk here; trailing free blocks are reclaimed by
    /// [`compact`](Package::compact).
    #[instrument(skip(self), level = "debug")]
    pub fn delete(&self, name: &str) -> Result<()> {
        if !path::check_name(name) {
            return Err(Error::NotFound(name.to_string()));
        }
        let mut wtxn = self.env.write_txn()?;
        let meta = self.lookup(&wtxn, name)?;
        let mut freemap = self.load_freemap(&wtxn)?;
        for index in meta.positions.iter() {
            freemap.free(index);
        }
        self.trunk.put(&mut wtxn, KEY_FREE, freemap.as_bytes())?;
        self.bump_counters(&mut wtxn, name, -(meta.size as i64), -1)?;
        self.trunk.delete(&mut wtxn, name.as_bytes())?;
        wtxn.commit()?;
        Ok(())
    }

    /// Move an entry to a new name without touching its blocks. The new
    /// name must be absent and must not collide with an ancestor or
    /// descendant entry.
    #[instrument(skip(self), level = "debug")]
    pub fn rename(&self, old: &str, new: &str) -> Result<()> {
        if !path::check_name(new) {
            return Err(Error::InvalidName(new.to_string()));
        }
        if !path::check_name(old) {
            return Err(Error::NotFound(old.to_string()));
        }
        let mut wtxn = self.env.write_txn()?;
        let mut meta = self.lookup(&wtxn, old)?;
        if self.trunk.get(&wtxn, new.as_bytes())?.is_some() {
            return Err(Error::Collision(format!("{} already occupied", new)));
        }
        self.check_collision(&wtxn, new)?;
        if path::first_segment(old) != path::first_segment(new) {
            self.bump_segment(&mut wtxn, old, -(meta.size as i64), -1)?;
            self.bump_segment(&mut wtxn, new, meta.size as i64, 1)?;
        }
        meta.name = new.to_string();
        self.trunk.delete(&mut wtxn, old.as_bytes())?;
        self.trunk.put(&mut wtxn, new.as_bytes(), &meta.encode()?)?;
        wtxn.commit()?;
        Ok(())
    }

    /// Duplicate an entry's payload under a new name. Always allocates new
    /// blocks; entries never share a block.
    pub fn copy(&self, from: &str, to: &str) -> Result<()> {
        let reader = self.read(from)?;
        self.write(to, reader)
    }

    /// Transactionally mutate an entry's tag map.
    pub fn update_tags<F>(&self, name: &str, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut BTreeMap<String, String>) -> Result<()>,
    {
        if !path::check_name(name) {
            return Err(Error::NotFound(name.to_string()));
        }
        let mut wtxn = self.env.write_txn()?;
        let mut meta = self.lookup(&wtxn, name)?;
        mutate(&mut meta.tags)?;
        self.trunk.put(&mut wtxn, name.as_bytes(), &meta.encode()?)?;
        wtxn.commit()?;
        Ok(())
    }

    /// Truncate trailing free blocks off the data file and record the new
    /// length so a later open can detect a shrunken (corrupted) data file.
    /// Live blocks are never relocated.
    #[instrument(skip(self), level = "debug")]
    pub fn compact(&self) -> Result<()> {
        let _writer = self.writer.lock().unwrap();
        let mut wtxn = self.env.write_txn()?;
        let freemap = self.load_freemap(&wtxn)?;
        let len = match freemap.highest_allocated() {
            Some(highest) => (u64::from(highest) + 1) * BLOCK_SIZE as u64,
            None => 0,
        };
        self.trunk.put(&mut wtxn, KEY_DATA_LEN, &len.to_be_bytes())?;
        wtxn.commit()?;
        self.data.truncate(len)?;
        debug!(len, "compacted data file");
        Ok(())
    }

    /// Store-wide statistics.
    pub fn stat(&self) -> Result<Stat> {
        let rtxn = self.env.read_txn()?;
        let size = self.get_u64(&rtxn, KEY_TOTAL_SIZE)?;
        let files = self.get_u64(&rtxn, KEY_TOTAL_COUNT)?;
        let bitmap_len = self.trunk.get(&rtxn, KEY_FREE)?.map_or(0, <[u8]>::len);
        drop(rtxn);
        Ok(Stat {
            size,
            disk_size: self.data.len()? + std::fs::metadata(&self.index_path)?.len(),
            files,
            alloc_blocks: bitmap_len as u64 * 8,
            data_file: self.data.path().to_path_buf(),
            index_file: self.index_path.clone(),
        })
    }

    /// Set a soft quota on the sum of live entry sizes. Zero disables the
    /// quota. A write is rejected while the current total already exceeds
    /// the quota.
    pub fn set_max_size(&self, bytes: u64) -> Result<()> {
        let mut wtxn = self.env.write_txn()?;
        self.trunk.put(&mut wtxn, KEY_MAX_SIZE, &bytes.to_be_bytes())?;
        wtxn.commit()?;
        Ok(())
    }

    /// Make every block write fail with probability `1/one_in`, leaving a
    /// truncated prefix on disk and returning [`Error::Testable`]. Zero
    /// disables injection. Exercises the rollback path.
    pub fn set_write_fault(&self, one_in: u32) {
        self.data.set_fault_rate(one_in);
    }

    // ------------------------------------------------------------------
    // Write machinery
    // ------------------------------------------------------------------

    fn write_locked(
        &self,
        wtxn: &mut RwTxn,
        buf: &mut [u8],
        name: &str,
        value: &mut dyn Read,
        tags: BTreeMap<String, String>,
        before_eof: u64,
    ) -> Result<()> {
        let key = name.as_bytes();
        let now = unix_now();
        let mut meta = Meta {
            name: name.to_string(),
            create_time: now,
            mod_time: now,
            tags,
            ..Meta::default()
        };

        let old = match self.trunk.get(wtxn, key)? {
            Some(raw) => Some(Meta::decode(raw)?),
            None => None,
        };
        let old_positions = match old {
            Some(old) => {
                meta.create_time = old.create_time;
                self.bump_counters(wtxn, name, -(old.size as i64), -1)?;
                // The old blocks stay marked allocated until the new
                // payload is fully written, then get freed below. A
                // rollback discards both sides at once.
                Some(old.positions)
            }
            None => {
                self.check_collision(wtxn, name)?;
                None
            }
        };

        let max = self.get_u64(wtxn, KEY_MAX_SIZE)?;
        if max > 0 && self.get_u64(wtxn, KEY_TOTAL_SIZE)? > max {
            return Err(Error::MaxSize(max));
        }

        let mut freemap = self.load_freemap(wtxn)?;
        let mut small: Vec<u8> = Vec::new();
        let mut crc = Hasher::new();
        {
            let mut cursor = freemap.cursor((before_eof / BLOCK_SIZE as u64) as u32);
            loop {
                let n = read_full(value, buf)?;
                if n == 0 {
                    break;
                }
                meta.size += n as u64;
                crc.update(&buf[..n]);
                if small.len() < SMALL_DATA_MAX {
                    small.extend_from_slice(&buf[..n]);
                }
                let (index, fresh) = cursor.next();
                self.data.write_block(index, &buf[..n], fresh)?;
                meta.positions.push(index);
                if n < buf.len() {
                    break;
                }
            }
        }

        if meta.size < SMALL_DATA_MAX as u64 {
            // Inline: give the freshly written blocks straight back.
            for index in meta.positions.iter() {
                freemap.free(index);
            }
            meta.positions.clear();
            meta.small_data = small;
        }
        if let Some(positions) = old_positions {
            for index in positions.iter() {
                freemap.free(index);
            }
        }
        meta.crc32 = crc.finalize();

        self.trunk.put(wtxn, KEY_FREE, freemap.as_bytes())?;
        self.bump_counters(wtxn, name, meta.size as i64, 1)?;
        self.trunk.put(wtxn, key, &meta.encode()?)?;
        Ok(())
    }

    fn append_locked(
        &self,
        wtxn: &mut RwTxn,
        buf: &mut [u8],
        name: &str,
        value: &mut dyn Read,
        before_eof: u64,
    ) -> Result<()> {
        let key = name.as_bytes();
        let mut meta = match self.trunk.get(wtxn, key)? {
            Some(raw) => Meta::decode(raw)?,
            None => return Err(self.missing_err(wtxn, name)),
        };
        if !meta.small_data.is_empty() || meta.size % BLOCK_SIZE as u64 != 0 {
            return Err(Error::NotAppendable(name.to_string()));
        }
        let start_size = meta.size;
        meta.mod_time = unix_now();

        let mut freemap = self.load_freemap(wtxn)?;
        let mut small: Vec<u8> = Vec::new();
        let mut crc = Hasher::new_with_initial(meta.crc32);
        {
            let mut cursor = freemap.cursor((before_eof / BLOCK_SIZE as u64) as u32);
            loop {
                let n = read_full(value, buf)?;
                if n == 0 {
                    break;
                }
                meta.size += n as u64;
                crc.update(&buf[..n]);
                if start_size == 0 && small.len() < SMALL_DATA_MAX {
                    small.extend_from_slice(&buf[..n]);
                }
                let (index, fresh) = cursor.next();
                self.data.write_block(index, &buf[..n], fresh)?;
                meta.positions.push(index);
                if n < buf.len() {
                    break;
                }
            }
        }

        // Only an entry that was empty before the append can land under
        // the inline threshold here.
        if meta.size < SMALL_DATA_MAX as u64 {
            for index in meta.positions.iter() {
                freemap.free(index);
            }
            meta.positions.clear();
            meta.small_data = small;
        }
        meta.crc32 = crc.finalize();

        self.trunk.put(wtxn, KEY_FREE, freemap.as_bytes())?;
        self.bump_counters(wtxn, name, (meta.size - start_size) as i64, 0)?;
        self.trunk.put(wtxn, key, &meta.encode()?)?;
        Ok(())
    }

    fn rollback_data(&self, before_eof: u64) {
        if let Err(err) = self.data.truncate(before_eof) {
            warn!(%err, before_eof, "rollback truncate failed; compaction will reclaim");
        }
    }

    // ------------------------------------------------------------------
    // Shared helpers
    // ------------------------------------------------------------------

    pub(crate) fn lookup(&self, txn: &RoTxn, name: &str) -> Result<Meta> {
        match self.trunk.get(txn, name.as_bytes())? {
            Some(raw) => Meta::decode(raw),
            None => Err(self.missing_err(txn, name)),
        }
    }

    /// Error for a name with no entry row: a directory when live
    /// descendants exist, otherwise plain not-found.
    pub(crate) fn missing_err(&self, txn: &RoTxn, name: &str) -> Error {
        match self.has_descendant(txn, name) {
            Ok(true) => Error::IsDirectory(name.to_string()),
            Ok(false) => Error::NotFound(name.to_string()),
            Err(err) => err,
        }
    }

    fn has_descendant(&self, txn: &RoTxn, name: &str) -> Result<bool> {
        let mut probe = name.as_bytes().to_vec();
        probe.push(b'/');
        let mut iter = self
            .trunk
            .range(txn, &(Bound::Included(probe.as_slice()), Bound::Unbounded))?;
        match iter.next() {
            Some(item) => {
                let (key, _) = item?;
                Ok(key.starts_with(&probe))
            }
            None => Ok(false),
        }
    }

    /// Enforce the prefix-collision rule: a name may not coexist with a
    /// live descendant entry nor with a live ancestor entry.
    fn check_collision(&self, txn: &RoTxn, name: &str) -> Result<()> {
        if self.has_descendant(txn, name)? {
            return Err(Error::Collision(format!(
                "{} has descendant entries",
                name
            )));
        }
        let bytes = name.as_bytes();
        for i in 1..bytes.len() {
            if bytes[i] == b'/' && self.trunk.get(txn, &bytes[..i])?.is_some() {
                return Err(Error::Collision(format!(
                    "{} conflicts with existing entry {}",
                    name,
                    &name[..i]
                )));
            }
        }
        Ok(())
    }

    pub(crate) fn reader_for(&self, meta: &Meta) -> Result<EntryReader> {
        if meta.small_data.len() as u64 == meta.size && meta.size < SMALL_DATA_MAX as u64 {
            return Ok(EntryReader::inline(meta.small_data.clone()));
        }
        let file = self.data.read_handle()?;
        let offsets = meta
            .positions
            .iter()
            .map(|index| u64::from(index) * BLOCK_SIZE as u64)
            .collect();
        Ok(EntryReader::blocks(file, offsets, meta.size))
    }

    fn load_freemap(&self, txn: &RoTxn) -> Result<FreeMap> {
        let bits = self
            .trunk
            .get(txn, KEY_FREE)?
            .map(<[u8]>::to_vec)
            .unwrap_or_default();
        Ok(FreeMap::from_bytes(bits))
    }

    pub(crate) fn get_u64(&self, txn: &RoTxn, key: &[u8]) -> Result<u64> {
        Ok(self.trunk.get(txn, key)?.map(be_u64).unwrap_or(0))
    }

    fn bump(&self, wtxn: &mut RwTxn, key: &[u8], delta: i64) -> Result<()> {
        if delta == 0 {
            return Ok(());
        }
        let next = self.get_u64(wtxn, key)? as i64 + delta;
        self.trunk.put(wtxn, key, &(next as u64).to_be_bytes())?;
        Ok(())
    }

    /// Adjust the global and per-top-level-directory aggregates together.
    fn bump_counters(&self, wtxn: &mut RwTxn, name: &str, dsize: i64, dcount: i64) -> Result<()> {
        self.bump(wtxn, KEY_TOTAL_SIZE, dsize)?;
        self.bump(wtxn, KEY_TOTAL_COUNT, dcount)?;
        self.bump_segment(wtxn, name, dsize, dcount)
    }

    fn bump_segment(&self, wtxn: &mut RwTxn, name: &str, dsize: i64, dcount: i64) -> Result<()> {
        let seg = path::first_segment(name);
        self.bump(wtxn, format!("*:size{}", seg).as_bytes(), dsize)?;
        self.bump(wtxn, format!("*:count{}", seg).as_bytes(), dcount)
    }
}

fn be_u64(raw: &[u8]) -> u64 {
    match <[u8; 8]>::try_from(raw) {
        Ok(bytes) => u64::from_be_bytes(bytes),
        Err(_) => 0,
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Fill `buf` from `reader`, tolerating short reads, stopping at end of
/// input. Block boundaries must line up with full buffers, so a reader
/// that trickles bytes may not be forwarded chunk by chunk.
fn read_full(reader: &mut dyn Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}
