/*
 * Created on Thu Mar 07 2024
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

/*
    collaborative subtree rebuilds
    ---
    A rebuild swaps the subtree under one parent slot for a freshly built, perfectly
    balanced copy of its content. The whole procedure is lock-free and cooperative; any
    thread that observes the announcement descriptor pitches in, and every phase is either
    idempotent or decided by a single CAS:

    1. announce: DCSS the descriptor into the parent slot (guarded on parent.dirty == 0)
    2. freeze + count: mark-and-count walks the subtree setting STARTED on the way down and
       publishing per-node key counts through FINISHED. a node with STARTED set rejects
       every update (their DCSS is guarded on dirty == 0), so the content below the
       announcement can no longer change
    3. build: the replacement is built bottom up from the frozen content. the root of the
       replacement is decided by a CAS on op.new_root; child subtrees are claimed via a
       fetch-add cursor and installed with per-slot CASes. losers free their duplicates
    4. commit: DCSS the replacement over the descriptor (again guarded on parent.dirty),
       then retire the old subtree -- collaboratively for very large fanouts

    A rebuild observed while its own parent is frozen by a higher rebuild is "subsumed": it
    can never commit, its replacement is orphaned and whoever loses the commit DCSS that
    way claims the orphan for reclamation through op.new_root.
*/

use {
    super::{
        word::{
            dirty_finished_to_sum, is_dcss, is_dirty_finished, is_dirty_marked_for_free,
            is_dirty_started, is_empty_val, is_kvpair, is_node, is_rebuildop, is_val,
            kvpair_to_word, node_to_word, rebuildop_to_word, to_kvpair, to_node, to_rebuildop,
            word_to_val, CasWord, DirtyFlag, EMPTY_VAL, NULL_WORD,
        },
        meta::Config, KVPair, Node, Tree,
    },
    crate::{
        idx::{MapKey, MapValue},
        sync::{
            atm::{ensure_flag_align, Guard, ORD_RLX, ORD_SEQ},
            dcss::DcssResult,
        },
    },
    core::sync::atomic::{AtomicBool, AtomicUsize},
    rand::Rng,
};

assertions! {
    ensure_flag_align::<RebuildOperation<u64>>(super::word::TOTAL_BITS),
}

/// The shared state of one announced rebuild. Referenced from the parent slot
/// by a tagged word until the commit detaches it
pub(super) struct RebuildOperation<K> {
    rebuild_root: *mut Node<K>,
    parent: *mut Node<K>,
    index: usize,
    depth: usize,
    /// replacement root word: NULL until the construction consensus, then the
    /// built word, and EMPTY_VAL once an orphaned replacement was reclaimed
    new_root: AtomicUsize,
    success: AtomicBool,
}

unsafe impl<K: MapKey> Send for RebuildOperation<K> {}
unsafe impl<K: MapKey> Sync for RebuildOperation<K> {}

impl<K: MapKey> RebuildOperation<K> {
    fn new(rebuild_root: &Node<K>, parent: &Node<K>, index: usize, depth: usize) -> Self {
        Self {
            rebuild_root: rebuild_root as *const Node<K> as *mut Node<K>,
            parent: parent as *const Node<K> as *mut Node<K>,
            index,
            depth,
            new_root: AtomicUsize::new(NULL_WORD),
            success: AtomicBool::new(false),
        }
    }
    #[inline(always)]
    pub(super) fn rebuild_root(&self) -> *mut Node<K> {
        self.rebuild_root
    }
}

/// Buffers an in-order pair run and turns it into a perfectly fanned subtree
struct IdealBuilder<'t, K: MapKey, V: MapValue, C: Config> {
    tree: &'t Tree<K, V, C>,
    pairs: Vec<KVPair<K, V>>,
    expected: usize,
    depth: usize,
}

impl<'t, K: MapKey, V: MapValue, C: Config> IdealBuilder<'t, K, V, C> {
    fn new(tree: &'t Tree<K, V, C>, expected: usize, depth: usize) -> Self {
        Self {
            tree,
            pairs: Vec::with_capacity(expected),
            expected,
            depth,
        }
    }
    fn add(&mut self, k: K, v: V) {
        debug_assert!(self.pairs.len() < self.expected);
        self.pairs.push(KVPair { k, v });
    }
    fn min_key(&self) -> K {
        self.pairs[0].k
    }
    /// Materialize the buffered run. Returns `None` (freeing anything built
    /// along the way) once `constructing` shows that another helper already
    /// installed this subtree
    fn build_word(&self, constructing: &AtomicUsize) -> Option<CasWord> {
        if constructing.load(ORD_SEQ) != NULL_WORD {
            return None;
        }
        debug_assert_eq!(self.pairs.len(), self.expected);
        let word = match self.pairs.len() {
            0 => EMPTY_VAL,
            1 => kvpair_to_word(Box::into_raw(Box::new(self.pairs[0]))),
            _ => node_to_word(self.build_node(&self.pairs, self.depth, constructing)?),
        };
        if constructing.load(ORD_SEQ) != NULL_WORD {
            unsafe {
                // UNSAFE(@ohsayan): ours alone, never published
                drop_subtree::<K, V>(word);
            }
            return None;
        }
        Some(word)
    }
    fn build_node(
        &self,
        pset: &[KVPair<K, V>],
        depth: usize,
        constructing: &AtomicUsize,
    ) -> Option<*mut Node<K>> {
        if constructing.load(ORD_SEQ) != NULL_WORD {
            return None;
        }
        if pset.len() <= C::MAX_ACCEPTABLE_LEAF_SIZE {
            return Some(Box::into_raw(Node::new_leaf(pset)));
        }
        let num_children = (pset.len() as f64).sqrt().ceil() as usize;
        let child_size = pset.len() / num_children;
        let remainder = pset.len() % num_children;
        let node = if depth <= C::MULTICOUNTER_DEPTH {
            Node::new_multicounter(num_children, self.tree.threads())
        } else {
            Node::new(num_children)
        };
        node.init_size.store(pset.len(), ORD_RLX);
        let node = Box::into_raw(node);
        let node_ref = unsafe {
            // UNSAFE(@ohsayan): fresh allocation
            &*node
        };
        let mut offset = 0;
        for i in 0..num_children {
            let size = child_size + (i < remainder) as usize;
            let child_set = &pset[offset..offset + size];
            match self.build_node(child_set, 1 + depth, constructing) {
                Some(child) => {
                    node_ref.ptrs[i].store(node_to_word(child), ORD_RLX);
                    if i > 0 {
                        unsafe {
                            // UNSAFE(@ohsayan): not yet published
                            node_ref.set_key(i - 1, child_set[0].k);
                        }
                    }
                }
                None => {
                    unsafe {
                        // UNSAFE(@ohsayan): partial candidate, never published
                        drop_subtree::<K, V>(node_to_word(node));
                    }
                    return None;
                }
            }
            offset += size;
        }
        unsafe {
            // UNSAFE(@ohsayan): not yet published
            node_ref.set_min_key(node_ref.key(0));
            node_ref.set_max_key(node_ref.key(node_ref.degree - 2));
        }
        Some(node)
    }
}

impl<K: MapKey, V: MapValue, C: Config> Tree<K, V, C> {
    /// Try to announce a rebuild of `rebuild_root` (child `index` of
    /// `parent`). Losing the announcement means some conflicting operation
    /// got there first; the attempt is simply dropped
    pub(super) fn rebuild(
        &self,
        tid: usize,
        rebuild_root: &Node<K>,
        parent: &Node<K>,
        index: usize,
        depth: usize,
        g: &Guard,
    ) {
        let op = Box::into_raw(Box::new(RebuildOperation::new(
            rebuild_root,
            parent,
            index,
            depth,
        )));
        let old_word = node_to_word(rebuild_root as *const Node<K>);
        let op_word = rebuildop_to_word(op);
        match self
            .prov
            .dcss(tid, &parent.dirty, 0, parent.ptr(index), old_word, op_word)
        {
            DcssResult::Success => {
                self.m.hrebuild();
                log::trace!(
                    "rebuild: announced subtree of init size {} at depth {}",
                    rebuild_root.init_size.load(ORD_RLX),
                    depth
                );
                self.help_rebuild(
                    tid,
                    unsafe {
                        // UNSAFE(@ohsayan): just published under our guard
                        &*op
                    },
                    g,
                );
            }
            _ => {
                // parent frozen or the slot moved; we are the only one who
                // ever saw this descriptor
                drop(unsafe {
                    // UNSAFE(@ohsayan): never published
                    Box::from_raw(op)
                });
            }
        }
    }
    /// Drive an announced rebuild to completion, sharing the work with every
    /// other thread that ran into the announcement
    pub(super) fn help_rebuild(&self, tid: usize, op: &RebuildOperation<K>, g: &Guard) {
        let key_count = self.mark_and_count(node_to_word(op.rebuild_root), g);
        let op_word = rebuildop_to_word(op as *const RebuildOperation<K>);
        let new_word = match self.create_ideal_concurrent(tid, op, key_count, g) {
            Some(word) => word,
            // someone else finished the helping entirely
            None => return,
        };
        let parent = unsafe {
            // UNSAFE(@ohsayan): parents outlive their announced rebuilds
            &*op.parent
        };
        let result = self
            .prov
            .dcss(tid, &parent.dirty, 0, parent.ptr(op.index), op_word, new_word);
        match result {
            DcssResult::Success => {
                debug_assert!(!op.success.load(ORD_SEQ));
                op.success.store(true, ORD_SEQ);
                log::trace!("rebuild: committed replacement of {} keys", key_count);
                let op_ptr = op as *const RebuildOperation<K> as *mut RebuildOperation<K>;
                unsafe {
                    // UNSAFE(@ohsayan): detached by the commit; helpers may
                    // still be reading it until they quiesce
                    g.defer_unchecked(move || drop(Box::from_raw(op_ptr)));
                }
            }
            DcssResult::FailedAddr1(_) => {
                // subsumed by a rebuild higher up: this op can never commit
                // and its replacement is orphaned. claim the orphan; `op`
                // itself is retired with the higher rebuild's old subtree
                log::debug!("rebuild: subsumed at depth {}", op.depth);
                // the replacement can be a node or a lone kvpair cell; inline
                // values carry nothing to reclaim
                if !is_val(new_word)
                    && new_word != NULL_WORD
                    && op
                        .new_root
                        .compare_exchange(new_word, EMPTY_VAL, ORD_SEQ, ORD_SEQ)
                        .is_ok()
                {
                    self.retire_subtree(new_word, g);
                }
            }
            // another helper committed first
            DcssResult::FailedAddr2(_) => {}
        }
        if op.success.load(ORD_SEQ) {
            let rebuild_root = unsafe {
                // UNSAFE(@ohsayan): still epoch protected
                &*op.rebuild_root
            };
            if rebuild_root.degree < C::COLLAB_FREE_MIN_DEGREE {
                if result.successful() {
                    self.retire_subtree(node_to_word(op.rebuild_root), g);
                }
            } else {
                self.help_free_subtree(rebuild_root, g);
            }
        }
    }
    /// Freeze the subtree under `word` against updates and return its live
    /// key count. Safe to call any number of times from any thread; the
    /// result is published in each node's dirty word
    fn mark_and_count(&self, word: CasWord, g: &Guard) -> usize {
        if is_kvpair(word) {
            return 1;
        }
        if is_val(word) {
            return (!is_empty_val(word)) as usize;
        }
        if is_rebuildop(word) {
            // the node pointing here is already marked, so this inner rebuild
            // can never restructure anything: count straight through it
            let op = unsafe {
                // UNSAFE(@ohsayan): tag checked, epoch pinned
                &*to_rebuildop::<RebuildOperation<K>>(word)
            };
            return self.mark_and_count(node_to_word(op.rebuild_root), g);
        }
        debug_assert!(is_node(word) && word != NULL_WORD);
        let node = unsafe {
            // UNSAFE(@ohsayan): tag checked, epoch pinned
            &*to_node::<Node<K>>(word)
        };
        let dirty = node.dirty.load(ORD_SEQ);
        if is_dirty_finished(dirty) {
            return dirty_finished_to_sum(dirty);
        }
        if !is_dirty_started(dirty) {
            let _ = node
                .dirty
                .compare_exchange(0, DirtyFlag::STARTED.d(), ORD_SEQ, ORD_SEQ);
        }
        // soft-partition the children among helpers before the full scan; a
        // helper can stall after claiming, so everyone still scans everything
        // afterwards (FINISHED short-circuits make that cheap)
        if node.degree > C::MAX_ACCEPTABLE_LEAF_SIZE {
            loop {
                let ix = node.next_mark_and_count.fetch_add(1, ORD_SEQ);
                if ix >= node.degree {
                    break;
                }
                self.mark_and_count(self.prov.read(node.ptr(ix)), g);
                let dirty = node.dirty.load(ORD_SEQ);
                if is_dirty_finished(dirty) {
                    return dirty_finished_to_sum(dirty);
                }
            }
        }
        let mut key_count = 0;
        for i in 0..node.degree {
            key_count += self.mark_and_count(self.prov.read(node.ptr(i)), g);
            let dirty = node.dirty.load(ORD_SEQ);
            if is_dirty_finished(dirty) {
                return dirty_finished_to_sum(dirty);
            }
        }
        let _ = node.dirty.compare_exchange(
            DirtyFlag::STARTED.d(),
            super::word::sum_to_dirty_finished(key_count),
            ORD_SEQ,
            ORD_SEQ,
        );
        key_count
    }
    /// Build (or help build) the replacement for `op`. Returns the
    /// replacement word, or `None` when the helping is already over
    fn create_ideal_concurrent(
        &self,
        tid: usize,
        op: &RebuildOperation<K>,
        key_count: usize,
        g: &Guard,
    ) -> Option<CasWord> {
        if key_count == 0 {
            return Some(EMPTY_VAL);
        }
        let num_children = (key_count as f64).sqrt().ceil() as usize;
        let child_size = key_count / num_children;
        let remainder = key_count % num_children;
        let mut word;
        let new_root = op.new_root.load(ORD_SEQ);
        if new_root == EMPTY_VAL {
            // the orphaned replacement was reclaimed; nothing left to help
            return None;
        } else if new_root != NULL_WORD {
            word = new_root;
        } else {
            if key_count <= C::MAX_ACCEPTABLE_LEAF_SIZE {
                // small enough for one helper to build in one go
                let mut builder = IdealBuilder::new(self, key_count, op.depth);
                let unconstructed = AtomicUsize::new(NULL_WORD);
                self.add_kvpairs(node_to_word(op.rebuild_root), &mut builder, g);
                match builder.build_word(&unconstructed) {
                    Some(built) => word = built,
                    None => unreachable!("nobody else can install a detached slot"),
                }
            } else {
                let node = if op.depth <= C::MULTICOUNTER_DEPTH {
                    Node::<K>::new_multicounter(num_children, self.threads())
                } else {
                    Node::new(num_children)
                };
                // children start as null words, claimed and filled below
                word = node_to_word(Box::into_raw(node));
            }
            // construction consensus
            match op
                .new_root
                .compare_exchange(NULL_WORD, word, ORD_SEQ, ORD_SEQ)
            {
                Ok(_) => {}
                Err(_) => {
                    unsafe {
                        // UNSAFE(@ohsayan): lost the consensus; ours was
                        // never visible to anyone
                        drop_subtree::<K, V>(word);
                    }
                    word = op.new_root.load(ORD_SEQ);
                    debug_assert!(word != NULL_WORD);
                    if word == EMPTY_VAL {
                        // reclaimed right after we lost; helping is over
                        debug_assert!(is_dirty_started(
                            unsafe {
                                // UNSAFE(@ohsayan): parents outlive rebuilds
                                &*op.parent
                            }
                            .dirty
                            .load(ORD_SEQ)
                        ));
                        return None;
                    }
                }
            }
        }
        if is_kvpair(word) || key_count <= C::MAX_ACCEPTABLE_LEAF_SIZE {
            return Some(word);
        }
        debug_assert!(is_node(word));
        let node = unsafe {
            // UNSAFE(@ohsayan): tag checked; anchored via op.new_root
            &*to_node::<Node<K>>(word)
        };
        debug_assert_eq!(node.degree, num_children);
        // claim one child index at a time while unclaimed ones remain
        loop {
            let ix = node.build_cursor.fetch_add(1, ORD_SEQ);
            if ix >= node.degree {
                break;
            }
            self.subtree_build_and_replace(op, node, ix, child_size, remainder, g);
        }
        // a claimant may stall, so sweep for unbuilt children; start at a
        // random offset to scatter the helpers
        let offset = {
            let rng = unsafe {
                // UNSAFE(@ohsayan): tid belongs to this thread
                self.rng(tid)
            };
            rng.gen_range(0..num_children)
        };
        for i in 0..num_children {
            let ix = (i + offset) % num_children;
            if self.prov.read(node.ptr(ix)) == NULL_WORD {
                self.subtree_build_and_replace(op, node, ix, child_size, remainder, g);
            }
        }
        node.init_size.store(key_count, ORD_SEQ);
        unsafe {
            // UNSAFE(@ohsayan): racing helpers store identical values
            node.set_min_key(node.key(0));
            node.set_max_key(node.key(node.degree - 2));
        }
        debug_assert!(node.min_key() != K::INF);
        debug_assert!(node.max_key() != K::INF);
        debug_assert!(node.min_key() <= node.max_key());
        Some(word)
    }
    /// Build the `ix`-th child of the replacement root and race to install it
    fn subtree_build_and_replace(
        &self,
        op: &RebuildOperation<K>,
        parent: &Node<K>,
        ix: usize,
        child_size: usize,
        remainder: usize,
        g: &Guard,
    ) {
        let skip = ix * child_size + ix.min(remainder);
        let size = child_size + (ix < remainder) as usize;
        let mut builder = IdealBuilder::new(self, size, 1 + op.depth);
        let constructing = parent.ptr(ix);
        let (mut skip, mut add) = (skip, size);
        self.add_kvpairs_subset(
            unsafe {
                // UNSAFE(@ohsayan): epoch pinned
                &*op.rebuild_root
            },
            &mut skip,
            &mut add,
            &mut builder,
            constructing,
            g,
        );
        if self.prov.read(constructing) != NULL_WORD {
            return;
        }
        let word = match builder.build_word(constructing) {
            Some(word) => word,
            None => return,
        };
        if ix > 0 {
            unsafe {
                // UNSAFE(@ohsayan): racing helpers compute the same key
                parent.set_key(ix - 1, builder.min_key());
            }
        }
        if constructing
            .compare_exchange(NULL_WORD, word, ORD_SEQ, ORD_SEQ)
            .is_err()
        {
            unsafe {
                // UNSAFE(@ohsayan): lost the install race; never published
                drop_subtree::<K, V>(word);
            }
        }
    }
    /// In-order collection of every live pair below `word` (frozen subtree)
    fn add_kvpairs(&self, word: CasWord, builder: &mut IdealBuilder<K, V, C>, g: &Guard) {
        if is_kvpair(word) {
            let pair = unsafe {
                // UNSAFE(@ohsayan): tag checked, epoch pinned
                &*to_kvpair::<KVPair<K, V>>(word)
            };
            builder.add(pair.k, pair.v);
            return;
        }
        if is_rebuildop(word) {
            let op = unsafe {
                // UNSAFE(@ohsayan): tag checked, epoch pinned
                &*to_rebuildop::<RebuildOperation<K>>(word)
            };
            self.add_kvpairs(node_to_word(op.rebuild_root), builder, g);
            return;
        }
        debug_assert!(is_node(word));
        let node = unsafe {
            // UNSAFE(@ohsayan): tag checked, epoch pinned
            &*to_node::<Node<K>>(word)
        };
        debug_assert!(is_dirty_finished(node.dirty.load(ORD_SEQ)));
        for i in 0..node.degree {
            let child = self.prov.read(node.ptr(i));
            if is_val(child) {
                if is_empty_val(child) {
                    continue;
                }
                debug_assert!(i > 0);
                // the key read need not be atomic with the value read: keys
                // of a node never change
                builder.add(node.key(i - 1), V::from_payload(word_to_val(child)));
            } else {
                self.add_kvpairs(child, builder, g);
            }
        }
    }
    /// In-order walk over the frozen subtree that skips the first `skip`
    /// live pairs and feeds the next `add` into the builder. Bails as soon
    /// as `constructing` shows the target subtree was already installed
    fn add_kvpairs_subset(
        &self,
        node: &Node<K>,
        skip: &mut usize,
        add: &mut usize,
        builder: &mut IdealBuilder<K, V, C>,
        constructing: &AtomicUsize,
        g: &Guard,
    ) {
        for i in 0..node.degree {
            if constructing.load(ORD_SEQ) != NULL_WORD {
                return;
            }
            debug_assert!(*add > 0);
            let child = self.prov.read(node.ptr(i));
            if is_val(child) {
                if is_empty_val(child) {
                    continue;
                }
                if *skip > 0 {
                    *skip -= 1;
                } else {
                    debug_assert!(i > 0);
                    builder.add(node.key(i - 1), V::from_payload(word_to_val(child)));
                    *add -= 1;
                    if *add == 0 {
                        return;
                    }
                }
            } else if is_kvpair(child) {
                if *skip > 0 {
                    *skip -= 1;
                } else {
                    let pair = unsafe {
                        // UNSAFE(@ohsayan): tag checked, epoch pinned
                        &*to_kvpair::<KVPair<K, V>>(child)
                    };
                    builder.add(pair.k, pair.v);
                    *add -= 1;
                    if *add == 0 {
                        return;
                    }
                }
            } else {
                let child_node = if is_rebuildop(child) {
                    unsafe {
                        // UNSAFE(@ohsayan): tag checked, epoch pinned; the
                        // inner rebuild root is frozen like everything here
                        &*(*to_rebuildop::<RebuildOperation<K>>(child)).rebuild_root
                    }
                } else {
                    debug_assert!(is_node(child) && child != NULL_WORD);
                    unsafe {
                        // UNSAFE(@ohsayan): tag checked, epoch pinned
                        &*to_node::<Node<K>>(child)
                    }
                };
                let dirty = child_node.dirty.load(ORD_SEQ);
                debug_assert!(is_dirty_finished(dirty));
                let child_count = dirty_finished_to_sum(dirty);
                if *skip < child_count {
                    self.add_kvpairs_subset(child_node, skip, add, builder, constructing, g);
                    if *add == 0 {
                        return;
                    }
                } else {
                    *skip -= child_count;
                }
            }
        }
    }
    /// Retire a detached subtree: freed once every thread that could have
    /// observed it has quiesced
    fn retire_subtree(&self, word: CasWord, g: &Guard) {
        unsafe {
            // UNSAFE(@ohsayan): `word` is detached from the tree; the defer
            // makes the free wait out every straggling reader
            g.defer_unchecked(move || drop_subtree::<K, V>(word));
        }
    }
    /// Collaborative retire of a very large replaced subtree: each helper
    /// claims child subtrees via the MARKED_FOR_FREE bit and retires what it
    /// claimed, then one of them claims the root node itself
    fn help_free_subtree(&self, node: &Node<K>, g: &Guard) {
        for i in 0..node.degree {
            let child = self.prov.read(node.ptr(i));
            if !is_node(child) || child == NULL_WORD {
                continue;
            }
            let child_node = unsafe {
                // UNSAFE(@ohsayan): tag checked, epoch pinned
                &*to_node::<Node<K>>(child)
            };
            loop {
                let dirty = child_node.dirty.load(ORD_SEQ);
                if is_dirty_marked_for_free(dirty) {
                    break;
                }
                if child_node
                    .dirty
                    .compare_exchange(
                        dirty,
                        dirty | DirtyFlag::MARKED_FOR_FREE.d(),
                        ORD_SEQ,
                        ORD_SEQ,
                    )
                    .is_ok()
                {
                    self.retire_subtree(child, g);
                    break;
                }
            }
        }
        // node pointers are all claimed above; whoever claims the node also
        // takes the oddballs (kvpairs, rebuildops) and the node allocation
        loop {
            let dirty = node.dirty.load(ORD_SEQ);
            if is_dirty_marked_for_free(dirty) {
                break;
            }
            if node
                .dirty
                .compare_exchange(
                    dirty,
                    dirty | DirtyFlag::MARKED_FOR_FREE.d(),
                    ORD_SEQ,
                    ORD_SEQ,
                )
                .is_ok()
            {
                for i in 0..node.degree {
                    let child = self.prov.read(node.ptr(i));
                    if is_kvpair(child) || is_rebuildop(child) {
                        self.retire_subtree(child, g);
                    }
                }
                let node_ptr = node as *const Node<K> as *mut Node<K>;
                unsafe {
                    // UNSAFE(@ohsayan): shallow drop; the children were
                    // claimed and retired separately above
                    g.defer_unchecked(move || drop(Box::from_raw(node_ptr)));
                }
                break;
            }
        }
    }
}

/// Recursively free everything below (and including) `word`.
///
/// ## Safety
/// No thread may be able to reach `word` anymore: either it was never
/// published, or every thread that could have seen it has quiesced
pub(super) unsafe fn drop_subtree<K: MapKey, V: MapValue>(word: CasWord) {
    debug_assert!(!is_dcss(word));
    if is_kvpair(word) {
        drop(Box::from_raw(to_kvpair::<KVPair<K, V>>(word)));
    } else if is_rebuildop(word) {
        // an op that still sits in a slot at reclamation time never
        // committed, so its frozen subtree and any unclaimed replacement are
        // both unreachable from the live tree
        let op = Box::from_raw(to_rebuildop::<RebuildOperation<K>>(word));
        debug_assert!(!op.success.load(ORD_RLX));
        drop_subtree::<K, V>(node_to_word(op.rebuild_root));
        let new_root = op.new_root.load(ORD_RLX);
        if !is_val(new_root)
            && new_root != NULL_WORD
            && op
                .new_root
                .compare_exchange(new_root, EMPTY_VAL, ORD_SEQ, ORD_SEQ)
                .is_ok()
        {
            drop_subtree::<K, V>(new_root);
        }
    } else if is_node(word) && word != NULL_WORD {
        let node = Box::from_raw(to_node::<Node<K>>(word));
        for ptr in node.ptrs.iter() {
            drop_subtree::<K, V>(ptr.load(ORD_RLX));
        }
        drop(node);
    }
    // inline values and null slots carry nothing to free
}
