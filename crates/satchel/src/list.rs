//! Listing, search, and prefix iteration over the entry namespace.
//!
//! Directories are an iteration artifact: whenever a key under the listing
//! prefix has a further `/` in its suffix, a synthetic directory node is
//! emitted once and the cursor seeks past the whole subtree. `0xFF` never
//! occurs in UTF-8, so `prefix + segment + "/" + 0xFF` lands on the first
//! key after the subtree.

use std::collections::HashSet;
use std::ops::Bound;

use crate::package::{DirInfo, Node, RESERVED};
use crate::path;
use crate::reader::EntryReader;
use crate::{Error, Meta, Package, Result};

impl Package {
    /// List the immediate children of `path`: real entries plus one
    /// synthetic directory per child subtree, in key order.
    pub fn list(&self, path: &str) -> Result<Vec<Node>> {
        let prefix = path::dir_prefix(path);
        let rtxn = self.env.read_txn()?;
        let mut nodes = Vec::new();

        let mut start = prefix.clone().into_bytes();
        'scan: loop {
            let mut iter = self
                .trunk
                .range(&rtxn, &(Bound::Included(start.as_slice()), Bound::Unbounded))?;
            loop {
                let Some(item) = iter.next() else { break 'scan };
                let (key, value) = item?;
                if key.first() == Some(&RESERVED) {
                    continue;
                }
                if !key.starts_with(prefix.as_bytes()) {
                    break 'scan;
                }
                let suffix = &key[prefix.len()..];
                match suffix.iter().position(|&b| b == b'/') {
                    Some(slash) => {
                        let segment = std::str::from_utf8(&suffix[..slash + 1])
                            .map_err(|_| Error::Corruption("non-UTF-8 entry key".into()))?;
                        let dir = format!("{}{}", prefix, segment);
                        start = dir.clone().into_bytes();
                        start.push(0xFF);
                        nodes.push(Node::Dir(DirInfo {
                            name: dir,
                            size: 0,
                            count: 0,
                        }));
                        continue 'scan;
                    }
                    None => nodes.push(Node::File(Meta::decode(value)?)),
                }
            }
        }
        Ok(nodes)
    }

    /// Scan every key under `root` for `needle`, yielding at most `max`
    /// results. A match in the basename yields the entry itself; a match
    /// in a parent segment yields the deepest ancestor directory whose
    /// name still contains `needle`, deduplicated.
    pub fn search(&self, root: &str, needle: &str, max: usize) -> Result<Vec<Node>> {
        let prefix = path::dir_prefix(root);
        let rtxn = self.env.read_txn()?;
        let mut nodes = Vec::new();
        let mut seen_dirs: HashSet<String> = HashSet::new();

        for item in self.trunk.range(
            &rtxn,
            &(Bound::Included(prefix.as_bytes()), Bound::Unbounded),
        )? {
            let (key, value) = item?;
            if key.first() == Some(&RESERVED) {
                continue;
            }
            if !key.starts_with(prefix.as_bytes()) || nodes.len() >= max {
                break;
            }
            let name = std::str::from_utf8(key)
                .map_err(|_| Error::Corruption("non-UTF-8 entry key".into()))?;
            if !name.contains(needle) {
                continue;
            }
            let (dir, base) = path::split_dir_base(name);
            if base.contains(needle) {
                nodes.push(Node::File(Meta::decode(value)?));
            } else if let Some(hit) = dir.find(needle) {
                // Cut right after the segment the needle landed in.
                let end = match dir[hit..].find('/') {
                    Some(slash) => hit + slash,
                    None => dir.len(),
                };
                let ancestor = dir[..end].trim_end_matches('/');
                if seen_dirs.insert(ancestor.to_string()) {
                    nodes.push(Node::Dir(DirInfo {
                        name: format!("{}/", ancestor),
                        size: 0,
                        count: 0,
                    }));
                }
            }
        }
        Ok(nodes)
    }

    /// Visit every entry under `root` in key order, opening a reader for
    /// each. Returning [`Error::Abort`] from the callback stops the walk
    /// without surfacing an error.
    pub fn iterate<F>(&self, root: &str, mut visit: F) -> Result<()>
    where
        F: FnMut(Meta, &mut EntryReader) -> Result<()>,
    {
        self.for_each_impl(root, &mut |meta| {
            let mut reader = self.reader_for(&meta)?;
            visit(meta, &mut reader)
        })
    }

    /// Metadata-only variant of [`iterate`](Package::iterate).
    pub fn iterate_meta<F>(&self, root: &str, mut visit: F) -> Result<()>
    where
        F: FnMut(Meta) -> Result<()>,
    {
        self.for_each_impl(root, &mut visit)
    }

    fn for_each_impl(&self, root: &str, visit: &mut dyn FnMut(Meta) -> Result<()>) -> Result<()> {
        let prefix = path::dir_prefix(root);
        let rtxn = self.env.read_txn()?;
        for item in self.trunk.range(
            &rtxn,
            &(Bound::Included(prefix.as_bytes()), Bound::Unbounded),
        )? {
            let (key, value) = item?;
            if key.first() == Some(&RESERVED) {
                continue;
            }
            if !key.starts_with(prefix.as_bytes()) {
                break;
            }
            match visit(Meta::decode(value)?) {
                Ok(()) => {}
                Err(Error::Abort) => return Ok(()),
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }
}
