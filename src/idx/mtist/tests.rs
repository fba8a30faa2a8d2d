/*
 * Created on Tue Mar 12 2024
 *
 * This file is a part of Skytable
 * Skytable (formerly known as TerrabaseDB or Skybase) is a free and open-source
 * NoSQL database written by Sayan Nandan ("the Author") with the
 * vision to provide flexibility in data modelling without compromising
 * on performance, queryability or scalability.
 *
 * Copyright (c) 2024, Sayan Nandan <ohsayan@outlook.com>
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 *
*/

use {
    super::imp::IndexMTIst,
    crate::idx::MTOrdIndex,
    rand::{rngs::SmallRng, seq::SliceRandom, SeedableRng},
    std::{
        sync::{Arc, RwLock},
        thread::{self, JoinHandle},
    },
};

type IstU64 = IndexMTIst<u64, u64>;

fn init_log() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn ist(threads: usize) -> IstU64 {
    init_log();
    let idx = IstU64::new(threads);
    for tid in 0..threads {
        idx.mt_init_thread(tid);
    }
    idx
}

// empty
#[test]
fn drop_empty() {
    let idx = ist(1);
    drop(idx);
}

#[test]
fn get_empty() {
    let idx = ist(1);
    assert_eq!(idx.mt_get(0, 5), None);
    assert!(!idx.mt_contains(0, 5));
    assert!(idx.validate());
}

#[test]
fn delete_empty() {
    let idx = ist(1);
    assert_eq!(idx.mt_delete_return(0, 5), None);
}

// single slot semantics
#[test]
fn insert_preserves_existing() {
    let idx = ist(1);
    assert_eq!(idx.mt_insert_return(0, 10, 100), None);
    assert_eq!(idx.mt_get(0, 10), Some(100));
    // the second insert must not overwrite
    assert_eq!(idx.mt_insert_return(0, 10, 200), Some(100));
    assert_eq!(idx.mt_get(0, 10), Some(100));
    assert_eq!(idx.mt_len(), 1);
}

#[test]
fn upsert_replaces() {
    let idx = ist(1);
    assert_eq!(idx.mt_upsert_return(0, 10, 100), None);
    assert_eq!(idx.mt_upsert_return(0, 10, 200), Some(100));
    assert_eq!(idx.mt_get(0, 10), Some(200));
    assert_eq!(idx.mt_len(), 1);
}

#[test]
fn mixed_insert_remove() {
    let idx = ist(1);
    idx.mt_upsert_return(0, 3, 30);
    idx.mt_upsert_return(0, 7, 70);
    idx.mt_upsert_return(0, 5, 50);
    assert_eq!(idx.mt_delete_return(0, 7), Some(70));
    assert_eq!(idx.mt_get(0, 7), None);
    assert_eq!(idx.mt_get(0, 5), Some(50));
    assert_eq!(idx.mt_get(0, 3), Some(30));
    assert!(idx.validate());
}

#[test]
fn second_remove_is_noop() {
    let idx = ist(1);
    idx.mt_upsert_return(0, 42, 420);
    assert_eq!(idx.mt_delete_return(0, 42), Some(420));
    assert_eq!(idx.mt_delete_return(0, 42), None);
    assert_eq!(idx.mt_get(0, 42), None);
}

#[test]
fn rebind_after_remove() {
    let idx = ist(1);
    idx.mt_upsert_return(0, 42, 1);
    idx.mt_delete_return(0, 42);
    assert_eq!(idx.mt_upsert_return(0, 42, 2), None);
    assert_eq!(idx.mt_get(0, 42), Some(2));
}

// tree growth
#[test]
fn churn_leaves_empty_tree() {
    const N: u64 = 4_096;
    let idx = ist(1);
    let mut keys: Vec<u64> = (1..=N).collect();
    let mut rng = SmallRng::seed_from_u64(0xC0FFEE);
    keys.shuffle(&mut rng);
    for (i, &k) in keys.iter().enumerate() {
        assert_eq!(idx.mt_upsert_return(0, k, k * 2), None);
        if i % 512 == 0 {
            assert!(idx.validate());
        }
    }
    assert_eq!(idx.mt_len(), N as usize);
    assert!(idx.validate());
    for &k in keys.iter() {
        assert_eq!(idx.mt_get(0, k), Some(k * 2));
    }
    keys.shuffle(&mut rng);
    for (i, &k) in keys.iter().enumerate() {
        assert_eq!(idx.mt_delete_return(0, k), Some(k * 2));
        if i % 512 == 0 {
            assert!(idx.validate());
        }
    }
    assert!(idx.is_empty());
    assert!(idx.validate());
    for &k in keys.iter() {
        assert_eq!(idx.mt_get(0, k), None);
    }
}

#[test]
fn ascending_fill_rebuilds() {
    const N: u64 = 4_096;
    let idx = ist(1);
    for k in 1..=N {
        idx.mt_upsert_return(0, k, k);
    }
    assert!(idx.validate());
    for k in 1..=N {
        assert_eq!(idx.mt_get(0, k), Some(k));
    }
    if cfg!(debug_assertions) {
        // an update load far past a quarter of any subtree's size must have
        // forced at least one restructure
        assert!(idx.m.rrebuilds() > 0);
    }
}

#[test]
fn extreme_key_distribution() {
    let idx = ist(1);
    // a dense cluster at the bottom and a handful of near-max outliers skews
    // every interpolation estimate to one of the two edges
    for k in 1..=512u64 {
        idx.mt_upsert_return(0, k, k);
    }
    for k in 0..64u64 {
        idx.mt_upsert_return(0, u64::MAX - 1 - k, k);
    }
    assert!(idx.validate());
    for k in 1..=512u64 {
        assert_eq!(idx.mt_get(0, k), Some(k));
    }
    for k in 0..64u64 {
        assert_eq!(idx.mt_get(0, u64::MAX - 1 - k), Some(k));
    }
    assert_eq!(idx.mt_get(0, 513), None);
    assert_eq!(idx.mt_get(0, u64::MAX - 100), None);
}

// concurrency
const SPAM_TENANTS: usize = 4;
const SPAM_KEYS: u64 = 8_192;

#[test]
fn multispam_disjoint_insert() {
    let idx = Arc::new(ist(SPAM_TENANTS));
    let token = Arc::new(RwLock::new(()));
    let hold = token.write();
    let threads: Vec<JoinHandle<_>> = (0..SPAM_TENANTS)
        .map(|tid| {
            let this_idx = idx.clone();
            let this_token = token.clone();
            thread::Builder::new()
                .name(tid.to_string())
                .spawn(move || {
                    let _token = this_token.read();
                    // strided keys: every tenant owns a disjoint residue class
                    for i in 0..SPAM_KEYS {
                        let k = 1 + tid as u64 + i * SPAM_TENANTS as u64;
                        assert_eq!(this_idx.mt_upsert_return(tid, k, k * 2), None);
                    }
                })
                .unwrap()
        })
        .collect();
    // rush everyone to insert; superb intercore traffic
    drop(hold);
    threads
        .into_iter()
        .for_each(|handle| handle.join().unwrap());
    assert_eq!(idx.mt_len(), SPAM_TENANTS * SPAM_KEYS as usize);
    for tid in 0..SPAM_TENANTS {
        for i in 0..SPAM_KEYS {
            let k = 1 + tid as u64 + i * SPAM_TENANTS as u64;
            assert_eq!(idx.mt_get(0, k), Some(k * 2));
        }
    }
    assert!(idx.validate());
}

#[test]
fn multispam_insert_vs_remove() {
    let idx = Arc::new(ist(2));
    let token = Arc::new(RwLock::new(()));
    let hold = token.write();
    let writer = {
        let (this_idx, this_token) = (idx.clone(), token.clone());
        thread::Builder::new()
            .name("writer".into())
            .spawn(move || {
                let _token = this_token.read();
                for k in 1..=SPAM_KEYS {
                    this_idx.mt_upsert_return(0, k, k * 2);
                }
            })
            .unwrap()
    };
    let eraser = {
        let (this_idx, this_token) = (idx.clone(), token.clone());
        thread::Builder::new()
            .name("eraser".into())
            .spawn(move || {
                let _token = this_token.read();
                for k in 1..=SPAM_KEYS {
                    if let Some(prev) = this_idx.mt_delete_return(1, k) {
                        assert_eq!(prev, k * 2);
                    }
                }
            })
            .unwrap()
    };
    drop(hold);
    writer.join().unwrap();
    eraser.join().unwrap();
    // every key either kept its insert or was erased; nothing else is legal
    let mut live = 0;
    for k in 1..=SPAM_KEYS {
        match idx.mt_get(0, k) {
            Some(v) => {
                assert_eq!(v, k * 2);
                live += 1;
            }
            None => {}
        }
    }
    assert_eq!(idx.mt_len(), live);
    assert!(idx.validate());
}

#[test]
fn multispam_same_keys_upsert() {
    // all tenants hammer the same keyspace with different values; after the
    // dust settles every key must hold one of the written values
    const KEYS: u64 = 1_024;
    let idx = Arc::new(ist(SPAM_TENANTS));
    let token = Arc::new(RwLock::new(()));
    let hold = token.write();
    let threads: Vec<JoinHandle<_>> = (0..SPAM_TENANTS)
        .map(|tid| {
            let (this_idx, this_token) = (idx.clone(), token.clone());
            thread::Builder::new()
                .name(tid.to_string())
                .spawn(move || {
                    let _token = this_token.read();
                    for k in 1..=KEYS {
                        this_idx.mt_upsert_return(tid, k, k * 10 + tid as u64);
                    }
                })
                .unwrap()
        })
        .collect();
    drop(hold);
    threads
        .into_iter()
        .for_each(|handle| handle.join().unwrap());
    assert_eq!(idx.mt_len(), KEYS as usize);
    for k in 1..=KEYS {
        let v = idx.mt_get(0, k).unwrap();
        assert!((v - k * 10) < SPAM_TENANTS as u64);
    }
    assert!(idx.validate());
}
