/*
 * Created on Tue Mar 05 2024
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

pub mod imp;
pub mod meta;
mod rebuild;
mod word;
#[cfg(test)]
mod tests;

#[cfg(debug_assertions)]
use crate::sync::atm::ORD_ACQ;
use {
    self::{
        meta::{Config, DefConfig},
        rebuild::RebuildOperation,
        word::{
            is_dcss, is_empty_val, is_kvpair, is_node, is_rebuildop, is_val, kvpair_to_word,
            node_to_word, to_kvpair, to_node, to_rebuildop, val_to_word, word_to_val, CasWord,
            EMPTY_VAL, NULL_WORD,
        },
    },
    super::{MapKey, MapValue},
    crate::{
        mem::CachePadded,
        sync::{
            atm::{cpin, ensure_flag_align, Guard, ORD_RLX},
            counter::MultiCounter,
            dcss::{DcssProvider, DcssResult},
        },
    },
    core::{cell::UnsafeCell, marker::PhantomData, sync::atomic::AtomicUsize},
    rand::{rngs::SmallRng, Rng, SeedableRng},
};

/*
    concurrent interpolation search tree
    ---
    An ordered index kept at doubly-logarithmic depth for a fixed set of worker threads,
    after the design of Brown, Prokopec and Alistarh[1]. Internal nodes carry `degree - 1`
    sorted keys and `degree` tagged child words (see word.rs); descent picks the child slot
    by interpolating the key against the cached min/max, which lands within a constant of
    the right slot for smooth key distributions.

    Every mutation is a DCSS on (node.dirty == 0, child slot), so a slot can only change
    while its node is not frozen by a rebuild. Once a subtree absorbs updates equal to a
    quarter of its size it is rebuilt into a perfectly balanced replacement; the rebuild is
    announced in the parent slot and any thread that runs into the announcement helps finish
    it (see rebuild.rs). Readers never block and never retry except through helping.

    ---
    References:
    [1]: Trevor Brown, Aleksandar Prokopec, and Dan Alistarh. 2020. Non-blocking
    interpolation search trees with doubly-logarithmic running time. PPoPP '20.
    https://doi.org/10.1145/3332466.3374542
    -- Sayan (@ohsayan)
*/

assertions! {
    ensure_flag_align::<Node<u64>>(word::TOTAL_BITS),
    ensure_flag_align::<KVPair<u64, u64>>(word::TOTAL_BITS),
}

#[cfg(debug_assertions)]
struct ISTMetricsData {
    rebuilds: AtomicUsize,
    restarts: AtomicUsize,
}

pub struct ISTRuntimeLog {
    #[cfg(debug_assertions)]
    data: ISTMetricsData,
    #[cfg(not(debug_assertions))]
    data: (),
}

impl ISTRuntimeLog {
    #[cfg(debug_assertions)]
    const ZERO: AtomicUsize = AtomicUsize::new(0);
    #[cfg(not(debug_assertions))]
    const NEW: Self = Self { data: () };
    #[cfg(debug_assertions)]
    const NEW: Self = Self {
        data: ISTMetricsData {
            rebuilds: Self::ZERO,
            restarts: Self::ZERO,
        },
    };
    const fn new() -> Self {
        Self::NEW
    }
    dbgfn! {
        fn hrebuild(self: &Self) {
            self.data.rebuilds.fetch_add(1, ORD_ACQ);
        } else {
            ()
        }
        fn hrestart(self: &Self) {
            self.data.restarts.fetch_add(1, ORD_ACQ);
        } else {
            ()
        }
        #[cfg(test)]
        fn rrebuilds(self: &Self) -> usize {
            self.data.rebuilds.load(ORD_RLX)
        } else {
            0
        }
    }
}

impl Drop for ISTRuntimeLog {
    fn drop(&mut self) {
        let _ = self.data;
    }
}

#[repr(align(8))]
#[derive(Debug, Clone, Copy)]
pub(super) struct KVPair<K, V> {
    k: K,
    v: V,
}

/// An internal node: `degree - 1` sorted keys, `degree` tagged child words.
/// Keys and the cached min/max never change once the node is reachable from
/// the tree; the interior mutability below only serves construction
pub(super) struct Node<K> {
    degree: usize,
    min_key: UnsafeCell<K>,
    max_key: UnsafeCell<K>,
    /// subtree size when this node was installed; frozen afterwards
    init_size: AtomicUsize,
    /// approximate updates applied beneath this node since init_size
    change_sum: AtomicUsize,
    /// supercedes change_sum when present (top of the tree only)
    external_change_counter: Option<MultiCounter>,
    /// rebuild freeze state; see word.rs for the packing
    dirty: AtomicUsize,
    /// work partitioning cursor for collaborative mark-and-count
    next_mark_and_count: AtomicUsize,
    /// child index claim cursor for collaborative subtree construction
    build_cursor: AtomicUsize,
    keys: Box<[UnsafeCell<K>]>,
    ptrs: Box<[AtomicUsize]>,
}

unsafe impl<K: MapKey> Send for Node<K> {}
unsafe impl<K: MapKey> Sync for Node<K> {}

impl<K: MapKey> Node<K> {
    fn new(degree: usize) -> Box<Self> {
        debug_assert!(degree >= 1);
        Box::new(Self {
            degree,
            min_key: UnsafeCell::new(K::INF),
            max_key: UnsafeCell::new(K::INF),
            init_size: AtomicUsize::new(0),
            change_sum: AtomicUsize::new(0),
            external_change_counter: None,
            dirty: AtomicUsize::new(0),
            next_mark_and_count: AtomicUsize::new(0),
            build_cursor: AtomicUsize::new(0),
            keys: (1..degree).map(|_| UnsafeCell::new(K::RESERVED)).collect(),
            ptrs: (0..degree).map(|_| AtomicUsize::new(NULL_WORD)).collect(),
        })
    }
    fn new_multicounter(degree: usize, threads: usize) -> Box<Self> {
        let mut node = Self::new(degree);
        node.external_change_counter = Some(MultiCounter::new(threads));
        node
    }
    /// Build a single level node over sorted pairs: slot 0 is the empty
    /// value, slot i+1 holds the value of key i inline
    fn new_leaf<V: MapValue>(pairs: &[KVPair<K, V>]) -> Box<Self> {
        let node = Self::new(pairs.len() + 1);
        node.init_size.store(pairs.len(), ORD_RLX);
        node.ptrs[0].store(EMPTY_VAL, ORD_RLX);
        for (i, pair) in pairs.iter().enumerate() {
            debug_assert!(i == 0 || pairs[i - 1].k < pair.k);
            unsafe {
                // UNSAFE(@ohsayan): not yet published
                node.set_key(i, pair.k);
            }
            node.ptrs[i + 1].store(val_to_word(pair.v.into_payload()), ORD_RLX);
        }
        unsafe {
            // UNSAFE(@ohsayan): ditto
            node.set_min_key(node.key(0));
            node.set_max_key(node.key(node.degree - 2));
        }
        node
    }
    #[inline(always)]
    fn key(&self, ix: usize) -> K {
        debug_assert!(ix < self.degree - 1);
        unsafe {
            // UNSAFE(@ohsayan): published nodes have frozen keys; during
            // construction racing builders store identical values
            *self.keys[ix].get()
        }
    }
    /// ## Safety
    /// Caller must either be pre-publication or guarantee every racing
    /// writer stores the same value
    #[inline(always)]
    unsafe fn set_key(&self, ix: usize, key: K) {
        *self.keys[ix].get() = key;
    }
    #[inline(always)]
    fn min_key(&self) -> K {
        unsafe {
            // UNSAFE(@ohsayan): same argument as key()
            *self.min_key.get()
        }
    }
    #[inline(always)]
    fn max_key(&self) -> K {
        unsafe {
            // UNSAFE(@ohsayan): same argument as key()
            *self.max_key.get()
        }
    }
    /// ## Safety
    /// Same contract as [`Node::set_key`]
    #[inline(always)]
    unsafe fn set_min_key(&self, key: K) {
        *self.min_key.get() = key;
    }
    /// ## Safety
    /// Same contract as [`Node::set_key`]
    #[inline(always)]
    unsafe fn set_max_key(&self, key: K) {
        *self.max_key.get() = key;
    }
    #[inline(always)]
    fn ptr(&self, ix: usize) -> &AtomicUsize {
        &self.ptrs[ix]
    }
    fn incr_change_sum(&self, rng: &mut impl Rng) {
        match self.external_change_counter.as_ref() {
            Some(counter) => {
                counter.inc(rng);
            }
            None => {
                self.change_sum.fetch_add(1, ORD_RLX);
            }
        }
    }
    fn read_change_sum(&self, rng: &mut impl Rng) -> usize {
        match self.external_change_counter.as_ref() {
            Some(counter) => counter.read_fast(rng),
            None => self.change_sum.load(ORD_RLX),
        }
    }
}

/// per-thread PRNG slot. only the owning tid may touch it
struct ThreadRng {
    rng: UnsafeCell<SmallRng>,
}

unsafe impl Sync for ThreadRng {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UpdateMode {
    InsertIfAbsent,
    InsertReplace,
    Erase,
}

/// candidate allocations of one slot update attempt; discarded on CAS failure
enum Candidate<K, V> {
    Inline,
    Pair(*mut KVPair<K, V>),
    Leaf(*mut Node<K>),
}

impl<K, V> Candidate<K, V> {
    /// ## Safety
    /// Only call when the candidate was never published
    unsafe fn discard(self) {
        match self {
            Self::Inline => {}
            Self::Pair(pair) => drop(Box::from_raw(pair)),
            // leaves hold values inline, so this cannot leak children
            Self::Leaf(leaf) => drop(Box::from_raw(leaf)),
        }
    }
}

enum SlotOutcome<V> {
    /// the update was applied
    Done { previous: Option<V>, affects: bool },
    /// nothing to write; return immediately
    Return(Option<V>),
    RetrySlot,
    Restart,
}

pub struct Tree<K: MapKey, V: MapValue, C: Config = DefConfig> {
    root: Box<Node<K>>,
    prov: DcssProvider,
    rngs: Box<[CachePadded<ThreadRng>]>,
    l: AtomicUsize,
    m: ISTRuntimeLog,
    _m: PhantomData<(V, C)>,
}

impl<K: MapKey, V: MapValue, C: Config> Tree<K, V, C> {
    /// New tree for `threads` workers with dense tids in `[0, threads)`
    pub fn new(threads: usize) -> Self {
        let root = Node::new(1);
        root.ptrs[0].store(EMPTY_VAL, ORD_RLX);
        Self {
            root,
            prov: DcssProvider::new(threads),
            rngs: (0..threads)
                .map(|tid| {
                    CachePadded::new(ThreadRng {
                        rng: UnsafeCell::new(SmallRng::seed_from_u64(tid as u64)),
                    })
                })
                .collect(),
            l: AtomicUsize::new(0),
            m: ISTRuntimeLog::new(),
            _m: PhantomData,
        }
    }
    pub fn threads(&self) -> usize {
        self.prov.threads()
    }
    pub fn init_thread(&self, tid: usize) {
        debug_assert!(tid < self.threads());
        unsafe {
            // UNSAFE(@ohsayan): called by the owning thread before its first op
            *self.rngs[tid].rng.get() = SmallRng::from_entropy();
        }
    }
    pub fn deinit_thread(&self, tid: usize) {
        // per-thread state is pooled; reusing the tid for another logical
        // thread requires external quiescence
        debug_assert!(tid < self.threads());
    }
    /// Approximate binding count; exact only in quiescence
    pub fn len(&self) -> usize {
        self.l.load(ORD_RLX)
    }
    #[cfg(test)]
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// ## Safety
    /// `tid` must belong to the calling thread
    #[allow(clippy::mut_from_ref)]
    unsafe fn rng(&self, tid: usize) -> &mut SmallRng {
        &mut *self.rngs[tid].rng.get()
    }
}

// read path
impl<K: MapKey, V: MapValue, C: Config> Tree<K, V, C> {
    pub fn contains(&self, tid: usize, key: K) -> bool {
        self.get(tid, key).is_some()
    }
    pub fn get(&self, tid: usize, key: K) -> Option<V> {
        debug_assert!(tid < self.threads());
        let g = cpin();
        self.lookup(key, &g)
    }
    fn lookup(&self, key: K, _g: &Guard) -> Option<V> {
        let mut parent: &Node<K> = &self.root;
        let mut ix = 0;
        let mut word = self.prov.read(parent.ptr(0));
        loop {
            if is_kvpair(word) {
                let pair = unsafe {
                    // UNSAFE(@ohsayan): tag checked, epoch pinned
                    &*to_kvpair::<KVPair<K, V>>(word)
                };
                return (pair.k == key).then(|| pair.v);
            } else if is_rebuildop(word) {
                // the logical content under this slot is whatever the frozen
                // subtree holds; read straight through the descriptor
                let op = unsafe {
                    // UNSAFE(@ohsayan): tag checked, epoch pinned
                    &*to_rebuildop::<RebuildOperation<K>>(word)
                };
                word = node_to_word(op.rebuild_root());
            } else if is_node(word) {
                debug_assert!(word != NULL_WORD);
                parent = unsafe {
                    // UNSAFE(@ohsayan): tag checked, epoch pinned
                    &*to_node::<Node<K>>(word)
                };
                ix = self.interpolation_search(key, parent);
                word = self.prov.read(parent.ptr(ix));
            } else {
                debug_assert!(is_val(word));
                // leftmost slot never holds a non-empty inline value
                debug_assert!(is_empty_val(word) || ix > 0);
                if is_empty_val(word) {
                    return None;
                }
                return (parent.key(ix - 1) == key).then(|| V::from_payload(word_to_val(word)));
            }
        }
    }
    /// Child slot for `key`: the first index `i` with `key < node.key(i)`,
    /// estimated by interpolation and fixed up with a short linear scan
    fn interpolation_search(&self, key: K, node: &Node<K>) -> usize {
        let degree = node.degree;
        if degree == 1 {
            return 0;
        }
        let num_keys = degree - 1;
        let min_key = node.min_key();
        let max_key = node.max_key();
        if key < min_key {
            return 0;
        }
        if key >= max_key {
            return num_keys;
        }
        let ix = key.interpolate(min_key, max_key, num_keys);
        debug_assert!(ix < num_keys);
        let ix_key = node.key(ix);
        if key < ix_key {
            for i in (0..ix).rev() {
                if key >= node.key(i) {
                    return i + 1;
                }
            }
            // key >= min_key == key(0)
            unreachable!("interpolation left scan fell through")
        } else if key > ix_key {
            for i in ix + 1..num_keys {
                if key < node.key(i) {
                    return i;
                }
            }
            // key < max_key == key(num_keys - 1)
            unreachable!("interpolation right scan fell through")
        } else {
            ix + 1
        }
    }
}

// write path
impl<K: MapKey, V: MapValue, C: Config> Tree<K, V, C> {
    /// Insert or replace. Returns the previously bound value, if any
    pub fn upsert_return(&self, tid: usize, key: K, val: V) -> Option<V> {
        let g = cpin();
        self.do_update(tid, key, val, UpdateMode::InsertReplace, &g)
    }
    /// Insert only if absent. Returns the already bound value, if any
    pub fn insert_return(&self, tid: usize, key: K, val: V) -> Option<V> {
        let g = cpin();
        self.do_update(tid, key, val, UpdateMode::InsertIfAbsent, &g)
    }
    /// Remove the binding for `key` and return it, if any
    pub fn delete_return(&self, tid: usize, key: K) -> Option<V> {
        let g = cpin();
        // the value argument is dead for erases
        self.do_update(tid, key, V::from_payload(0), UpdateMode::Erase, &g)
    }
    /// Collect all bindings with `lo <= key <= hi` into `out`.
    ///
    /// Not wired up yet: a scan that is linearizable against concurrent
    /// rebuilds needs a snapshot mechanism the tree does not grow today, so
    /// this reports zero matches and leaves `out` untouched
    pub fn range(&self, tid: usize, lo: K, hi: K, _out: &mut Vec<(K, V)>) -> usize {
        debug_assert!(tid < self.threads());
        debug_assert!(lo <= hi);
        0
    }
    fn do_update(&self, tid: usize, key: K, val: V, mode: UpdateMode, g: &Guard) -> Option<V> {
        debug_assert!(tid < self.threads());
        debug_assert!(key != K::RESERVED && key < K::INF);
        // values must leave the top tag bits free and stay clear of the
        // reserved empty payload
        debug_assert!(val.into_payload() <= usize::MAX >> word::TOTAL_BITS);
        debug_assert!(!is_empty_val(val_to_word(val.into_payload())));
        let mut path: Vec<&Node<K>> = Vec::with_capacity(16);
        'restart: loop {
            path.clear();
            let mut node: &Node<K> = &self.root;
            'descend: loop {
                let ix = self.interpolation_search(key, node);
                'slot: loop {
                    let word = self.prov.read(node.ptr(ix));
                    if is_kvpair(word) || is_val(word) {
                        match self.slot_update(tid, key, val, mode, word, node, ix, g) {
                            SlotOutcome::Done { previous, affects } => {
                                self.rebuild_if_necessary(tid, &path, affects, g);
                                return previous;
                            }
                            SlotOutcome::Return(previous) => return previous,
                            SlotOutcome::RetrySlot => continue 'slot,
                            SlotOutcome::Restart => {
                                // this subtree is frozen for a rebuild
                                self.m.hrestart();
                                continue 'restart;
                            }
                        }
                    } else if is_rebuildop(word) {
                        let op = unsafe {
                            // UNSAFE(@ohsayan): tag checked, epoch pinned
                            &*to_rebuildop::<RebuildOperation<K>>(word)
                        };
                        self.help_rebuild(tid, op, g);
                        continue 'restart;
                    } else {
                        debug_assert!(is_node(word) && word != NULL_WORD);
                        let child = unsafe {
                            // UNSAFE(@ohsayan): tag checked, epoch pinned
                            &*to_node::<Node<K>>(word)
                        };
                        path.push(child);
                        node = child;
                        continue 'descend;
                    }
                }
            }
        }
    }
    /// One DCSS attempt against a terminal slot currently holding `word`
    #[allow(clippy::too_many_arguments)]
    fn slot_update(
        &self,
        tid: usize,
        key: K,
        val: V,
        mode: UpdateMode,
        word: CasWord,
        node: &Node<K>,
        ix: usize,
        g: &Guard,
    ) -> SlotOutcome<V> {
        debug_assert!(is_empty_val(word) || !is_val(word) || ix > 0);
        // resolve what the slot currently binds. an empty inline value still
        // has a positional key when it is not the leftmost slot
        let (found_key, found_val, old_pair): (Option<K>, Option<V>, Option<*mut KVPair<K, V>>) =
            if is_val(word) {
                if is_empty_val(word) {
                    ((ix > 0).then(|| node.key(ix - 1)), None, None)
                } else {
                    (
                        Some(node.key(ix - 1)),
                        Some(V::from_payload(word_to_val(word))),
                        None,
                    )
                }
            } else {
                let pair_ptr = to_kvpair::<KVPair<K, V>>(word);
                let pair = unsafe {
                    // UNSAFE(@ohsayan): tag checked, epoch pinned
                    &*pair_ptr
                };
                (Some(pair.k), Some(pair.v), Some(pair_ptr))
            };
        let mut affects = true;
        let mut candidate = Candidate::Inline;
        let (new_word, previous): (CasWord, Option<V>) = match (found_key, found_val) {
            (Some(found_key), Some(found_val)) if found_key == key => match mode {
                UpdateMode::InsertReplace => {
                    // value only mutation; the key multiset is unchanged
                    affects = false;
                    (val_to_word(val.into_payload()), Some(found_val))
                }
                UpdateMode::InsertIfAbsent => return SlotOutcome::Return(Some(found_val)),
                UpdateMode::Erase => (EMPTY_VAL, Some(found_val)),
            },
            (Some(found_key), None) if found_key == key => match mode {
                UpdateMode::InsertReplace | UpdateMode::InsertIfAbsent => {
                    (val_to_word(val.into_payload()), None)
                }
                UpdateMode::Erase => return SlotOutcome::Return(None),
            },
            (_, None) => match mode {
                UpdateMode::Erase => return SlotOutcome::Return(None),
                _ => {
                    // first binding under this slot: a bare kvpair cell
                    let pair = Box::into_raw(Box::new(KVPair { k: key, v: val }));
                    candidate = Candidate::Pair(pair);
                    (kvpair_to_word(pair), None)
                }
            },
            (Some(found_key), Some(found_val)) => match mode {
                UpdateMode::Erase => return SlotOutcome::Return(None),
                _ => {
                    // two bindings now share the slot; grow it into a leaf
                    let (lo, hi) = if key < found_key {
                        (
                            KVPair { k: key, v: val },
                            KVPair {
                                k: found_key,
                                v: found_val,
                            },
                        )
                    } else {
                        (
                            KVPair {
                                k: found_key,
                                v: found_val,
                            },
                            KVPair { k: key, v: val },
                        )
                    };
                    let leaf = Box::into_raw(Node::new_leaf(&[lo, hi]));
                    candidate = Candidate::Leaf(leaf);
                    (node_to_word(leaf), None)
                }
            },
            (None, Some(_)) => unreachable!("binding without a key"),
        };
        match self
            .prov
            .dcss(tid, &node.dirty, 0, node.ptr(ix), word, new_word)
        {
            DcssResult::Success => {
                if let Some(pair) = old_pair {
                    unsafe {
                        // UNSAFE(@ohsayan): detached by the dcss; free once
                        // every reader that could have seen it has left
                        g.defer_unchecked(move || drop(Box::from_raw(pair)));
                    }
                }
                match mode {
                    UpdateMode::Erase => {
                        self.l.fetch_sub(1, ORD_RLX);
                    }
                    _ if previous.is_none() => {
                        self.l.fetch_add(1, ORD_RLX);
                    }
                    _ => {}
                }
                SlotOutcome::Done { previous, affects }
            }
            DcssResult::FailedAddr2(_) => {
                unsafe {
                    // UNSAFE(@ohsayan): never published
                    candidate.discard();
                }
                SlotOutcome::RetrySlot
            }
            DcssResult::FailedAddr1(_) => {
                unsafe {
                    // UNSAFE(@ohsayan): never published
                    candidate.discard();
                }
                SlotOutcome::Restart
            }
        }
    }
    fn rebuild_if_necessary(&self, tid: usize, path: &[&Node<K>], affects: bool, g: &Guard) {
        if !affects {
            return;
        }
        let mut target = None;
        {
            let rng = unsafe {
                // UNSAFE(@ohsayan): tid belongs to this thread
                self.rng(tid)
            };
            for node in path {
                node.incr_change_sum(rng);
            }
            for (depth, node) in path.iter().enumerate() {
                if node.read_change_sum(rng) as f64
                    >= C::REBUILD_FRACTION * node.init_size.load(ORD_RLX) as f64
                {
                    target = Some((depth, *node));
                    break;
                }
            }
        }
        if let Some((depth, node)) = target {
            if depth == 0 {
                self.rebuild(tid, node, &self.root, 0, 0, g);
            } else {
                let parent = path[depth - 1];
                debug_assert!(parent.degree > 1 && node.degree > 1);
                let index = self.interpolation_search(node.key(0), parent);
                self.rebuild(tid, node, parent, index, depth, g);
            }
        }
    }
}

// validation
#[derive(Debug)]
struct ValidateReport {
    violations: usize,
    nodes: usize,
    keys: usize,
    kvpairs: usize,
    values: usize,
    empty_values: usize,
    shortest_path: usize,
    longest_path: usize,
}

impl ValidateReport {
    fn new() -> Self {
        Self {
            violations: 0,
            nodes: 0,
            keys: 0,
            kvpairs: 0,
            values: 0,
            empty_values: 0,
            shortest_path: usize::MAX,
            longest_path: 0,
        }
    }
    fn terminal(&mut self, level: usize) {
        self.shortest_path = self.shortest_path.min(level);
        self.longest_path = self.longest_path.max(level);
    }
}

impl<K: MapKey, V: MapValue, C: Config> Tree<K, V, C> {
    /// Single-threaded structural check: sorted keys, key range containment,
    /// tag sanity and the leftmost-slot rule. Callers must guarantee
    /// quiescence
    pub fn validate(&self) -> bool {
        let mut report = ValidateReport::new();
        let word = self.prov.read(self.root.ptr(0));
        self.validate_rec(word, K::RESERVED, K::INF, 0, &mut report);
        log::debug!(
            "validate: nodes={} keys={} kvpairs={} values={}/{} paths={}..={}",
            report.nodes,
            report.keys,
            report.kvpairs,
            report.values,
            report.empty_values,
            report.shortest_path,
            report.longest_path
        );
        if report.violations != 0 {
            log::warn!("validate: {} structural violations", report.violations);
        }
        report.violations == 0
    }
    fn validate_rec(&self, word: CasWord, min: K, max: K, level: usize, r: &mut ValidateReport) {
        if word == NULL_WORD || is_dcss(word) {
            // a quiescent tree has no dangling slots and no parked descriptors
            r.violations += 1;
            return;
        }
        if is_node(word) {
            let node = unsafe {
                // UNSAFE(@ohsayan): tag checked, quiescent
                &*to_node::<Node<K>>(word)
            };
            r.nodes += 1;
            r.keys += node.degree - 1;
            if node.degree > 1 {
                for i in 1..node.degree - 1 {
                    if node.key(i) <= node.key(i - 1) {
                        r.violations += 1;
                    }
                }
                if node.key(0) < min || node.key(node.degree - 2) >= max {
                    r.violations += 1;
                }
                if node.min_key() != node.key(0) || node.max_key() != node.key(node.degree - 2) {
                    r.violations += 1;
                }
            }
            for i in 0..node.degree {
                let child = self.prov.read(node.ptr(i));
                if i == 0 && is_val(child) && !is_empty_val(child) {
                    // leftmost slot must not bind a key it has no room for
                    r.violations += 1;
                }
                self.validate_rec(
                    child,
                    if i == 0 { min } else { node.key(i - 1) },
                    if i == node.degree - 1 {
                        max
                    } else {
                        node.key(i)
                    },
                    level + 1,
                    r,
                );
            }
        } else if is_kvpair(word) {
            let pair = unsafe {
                // UNSAFE(@ohsayan): tag checked, quiescent
                &*to_kvpair::<KVPair<K, V>>(word)
            };
            if pair.k < min || pair.k >= max {
                r.violations += 1;
            }
            r.kvpairs += 1;
            r.terminal(level);
        } else if is_rebuildop(word) {
            let op = unsafe {
                // UNSAFE(@ohsayan): tag checked, quiescent
                &*to_rebuildop::<RebuildOperation<K>>(word)
            };
            self.validate_rec(node_to_word(op.rebuild_root()), min, max, level, r);
        } else {
            debug_assert!(is_val(word));
            if is_empty_val(word) {
                r.empty_values += 1;
            } else {
                r.values += 1;
            }
            r.terminal(level);
        }
    }
}

impl<K: MapKey, V: MapValue, C: Config> Drop for Tree<K, V, C> {
    fn drop(&mut self) {
        let word = self.prov.read(self.root.ptr(0));
        unsafe {
            // UNSAFE(@ohsayan): sole live owner; nothing else can reach the
            // tree anymore. anything retired earlier sits in the epoch queue
            // and is freed independently of the tree itself
            rebuild::drop_subtree::<K, V>(word);
        }
        cpin().flush();
    }
}
