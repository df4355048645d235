//! Crash-safety tests: a randomized workload runs with the short-write
//! fault hook enabled and is checked against an in-memory oracle. Every
//! mutation that reported success must be fully visible; every mutation
//! that failed must have left no trace.

use std::collections::{HashMap, HashSet};

use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use tempfile::TempDir;

use satchel::{Error, Package, BLOCK_SIZE};

fn random_payload(rng: &mut StdRng, max: usize) -> Vec<u8> {
    let len = rng.gen_range(0..max);
    let mut data = vec![0u8; len];
    rng.fill_bytes(&mut data);
    data
}

/// Check every surviving entry against the oracle, and the aggregate
/// counters and block bookkeeping against the surviving set.
fn verify(store: &Package, oracle: &HashMap<String, Vec<u8>>) {
    for (name, expect) in oracle {
        let got = store.read_all(name).unwrap();
        assert_eq!(&got, expect, "payload mismatch for {}", name);

        let info = store.info(name).unwrap();
        let meta = info.meta().unwrap();
        assert_eq!(meta.size, expect.len() as u64, "size mismatch for {}", name);
        assert_eq!(
            meta.crc32,
            crc32fast::hash(expect),
            "checksum mismatch for {}",
            name
        );
    }

    let stat = store.stat().unwrap();
    assert_eq!(stat.files, oracle.len() as u64);
    assert_eq!(
        stat.size,
        oracle.values().map(|v| v.len() as u64).sum::<u64>()
    );

    // No two live entries may share a block.
    let mut seen_blocks = HashSet::new();
    store
        .iterate_meta("/", |meta| {
            for index in meta.positions.iter() {
                assert!(
                    seen_blocks.insert(index),
                    "block {} referenced twice (last by {})",
                    index,
                    meta.name
                );
            }
            Ok(())
        })
        .unwrap();
}

#[test]
fn test_workload_with_injected_write_faults() {
    let temp = TempDir::new().unwrap();
    let base = temp.path().join("store");
    let store = Package::open(&base).unwrap();
    store.set_write_fault(5);

    let mut rng = StdRng::seed_from_u64(0xC0FFEE);
    let mut oracle: HashMap<String, Vec<u8>> = HashMap::new();

    for round in 0..2 {
        for i in 0..20 {
            let name = format!("/zzz{}", i);
            // Half small single-block payloads, half multi-block.
            let data = if rng.gen_bool(0.5) {
                random_payload(&mut rng, 32 * 1024)
            } else {
                random_payload(&mut rng, 2 * 1024 * 1024)
            };
            match store.write(&name, data.as_slice()) {
                Ok(()) => {
                    oracle.insert(name, data);
                }
                Err(Error::Testable) => {
                    // The pre-image (or absence) must be retained; the
                    // oracle keeps whatever was last acknowledged.
                }
                Err(err) => panic!("unexpected write error: {}", err),
            }
        }

        // Interleave copies and deletes over the acknowledged set.
        let names: Vec<String> = oracle.keys().cloned().collect();
        for name in names {
            match rng.gen_range(0..3) {
                0 => {
                    store.delete(&name).unwrap();
                    oracle.remove(&name);
                }
                1 => {
                    let copy_name = format!("{}copy{}", name, round);
                    match store.copy(&name, &copy_name) {
                        Ok(()) => {
                            let payload = oracle[&name].clone();
                            oracle.insert(copy_name, payload);
                        }
                        Err(Error::Testable) => {}
                        Err(err) => panic!("unexpected copy error: {}", err),
                    }
                }
                _ => {}
            }
        }

        verify(&store, &oracle);
    }

    // Quiesce: no more faults, reclaim the tail, verify once more.
    store.set_write_fault(0);
    store.compact().unwrap();
    verify(&store, &oracle);

    // Orphan bytes from failed writes must never survive a reopen.
    store.close().unwrap();
    let store = Package::open(&base).unwrap();
    verify(&store, &oracle);

    let stat = store.stat().unwrap();
    let data_len = std::fs::metadata(&stat.data_file).unwrap().len();
    assert_eq!(data_len % BLOCK_SIZE as u64, 0);
}

#[test]
fn test_failed_overwrite_keeps_previous_payload() {
    let temp = TempDir::new().unwrap();
    let store = Package::open(temp.path().join("store")).unwrap();

    let original = {
        let mut rng = StdRng::seed_from_u64(7);
        let mut data = vec![0u8; 600 * 1024];
        rng.fill_bytes(&mut data);
        data
    };
    store.write_all("/victim", &original).unwrap();

    // Every block write fails: the overwrite can never succeed.
    store.set_write_fault(1);
    let mut rng = StdRng::seed_from_u64(8);
    let mut replacement = vec![0u8; 300 * 1024];
    rng.fill_bytes(&mut replacement);
    assert!(matches!(
        store.write_all("/victim", &replacement),
        Err(Error::Testable)
    ));
    store.set_write_fault(0);

    let meta = store.info("/victim").unwrap().meta().unwrap().clone();
    assert_eq!(meta.size, original.len() as u64);
    assert_eq!(meta.crc32, crc32fast::hash(&original));
    assert_eq!(store.read_all("/victim").unwrap(), original);

    // The aborted attempt left no extra allocated blocks behind.
    store.compact().unwrap();
    let stat = store.stat().unwrap();
    let data_len = std::fs::metadata(&stat.data_file).unwrap().len();
    assert_eq!(data_len, 5 * BLOCK_SIZE as u64);
}

#[test]
fn test_shrunken_data_file_is_detected_on_open() {
    let temp = TempDir::new().unwrap();
    let base = temp.path().join("store");

    let data_file = {
        let store = Package::open(&base).unwrap();
        let mut rng = StdRng::seed_from_u64(9);
        let mut data = vec![0u8; 1024 * 1024];
        rng.fill_bytes(&mut data);
        store.write_all("/blob", &data).unwrap();
        store.compact().unwrap();
        let path = store.stat().unwrap().data_file;
        store.close().unwrap();
        path
    };

    // Lose most of the data file behind the store's back.
    let file = std::fs::OpenOptions::new()
        .write(true)
        .open(&data_file)
        .unwrap();
    file.set_len(100 * 1024).unwrap();
    drop(file);

    assert!(matches!(
        Package::open(&base),
        Err(Error::Corruption(_))
    ));
}

#[test]
fn test_zero_write_is_immune_to_faults() {
    let temp = TempDir::new().unwrap();
    let store = Package::open(temp.path().join("store")).unwrap();
    store.set_write_fault(1);

    // An empty payload touches no blocks, so it always commits.
    store.write_all("/zero", &[]).unwrap();
    assert_eq!(store.read_all("/zero").unwrap(), Vec::<u8>::new());
}
