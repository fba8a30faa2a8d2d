/*
 * Created on Mon Mar 04 2024
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
    tagged word encoding
    ---
    A child slot of a node is a single casword. Bit 0 is owned by the DCSS layer; bits 1..3
    discriminate what the payload is:

        00_  -> pointer to a Node (the all zeros word doubles as the null node, which is
                only ever visible inside a replacement subtree under construction)
        01_  -> pointer to a KVPair cell
        10_  -> pointer to a RebuildOperation descriptor
        11_  -> inline value, payload in word >> 3; the all ones payload is the
                distinguished empty value (absent key)

    This is a tagged union instead of a trait object on purpose: a traversal step reads one
    word and a variant change is a single word CAS.

    The same module packs the node `dirty` word: two low state bits (STARTED, FINISHED), a
    third bit claimed by reclamation (MARKED_FOR_FREE), and the counted key sum in the
    upper bits once FINISHED.
*/

pub(super) use crate::sync::dcss::{is_dcss, CasWord};

pub(super) const TYPE_BITS: usize = 2;
pub(super) const DCSS_BITS: usize = 1;
pub(super) const TOTAL_BITS: usize = TYPE_BITS + DCSS_BITS;
pub(super) const TYPE_MASK: CasWord = 0x6;
pub(super) const TOTAL_MASK: CasWord = 0x7;

const NODE_MASK: CasWord = 0x0;
const KVPAIR_MASK: CasWord = 0x2;
const REBUILDOP_MASK: CasWord = 0x4;
const VAL_MASK: CasWord = 0x6;

/// the null node word; never visible to traversals outside of rebuilds
pub(super) const NULL_WORD: CasWord = 0;
/// inline value word for "no binding here"
pub(super) const EMPTY_VAL: CasWord = !TOTAL_MASK | VAL_MASK;

#[inline(always)]
pub(super) const fn is_node(word: CasWord) -> bool {
    word & TYPE_MASK == NODE_MASK
}

#[inline(always)]
pub(super) const fn is_kvpair(word: CasWord) -> bool {
    word & TYPE_MASK == KVPAIR_MASK
}

#[inline(always)]
pub(super) const fn is_rebuildop(word: CasWord) -> bool {
    word & TYPE_MASK == REBUILDOP_MASK
}

#[inline(always)]
pub(super) const fn is_val(word: CasWord) -> bool {
    word & TYPE_MASK == VAL_MASK
}

#[inline(always)]
pub(super) const fn is_empty_val(word: CasWord) -> bool {
    word == EMPTY_VAL
}

#[inline(always)]
pub(super) fn to_node<T>(word: CasWord) -> *mut T {
    debug_assert!(is_node(word) && !is_dcss(word));
    word as *mut T
}

#[inline(always)]
pub(super) fn node_to_word<T>(node: *const T) -> CasWord {
    let word = node as CasWord;
    debug_assert!(word & TOTAL_MASK == 0);
    word
}

#[inline(always)]
pub(super) fn to_kvpair<T>(word: CasWord) -> *mut T {
    debug_assert!(is_kvpair(word) && !is_dcss(word));
    (word & !TOTAL_MASK) as *mut T
}

#[inline(always)]
pub(super) fn kvpair_to_word<T>(pair: *const T) -> CasWord {
    let word = pair as CasWord;
    debug_assert!(word & TOTAL_MASK == 0);
    word | KVPAIR_MASK
}

#[inline(always)]
pub(super) fn to_rebuildop<T>(word: CasWord) -> *mut T {
    debug_assert!(is_rebuildop(word) && !is_dcss(word));
    (word & !TOTAL_MASK) as *mut T
}

#[inline(always)]
pub(super) fn rebuildop_to_word<T>(op: *const T) -> CasWord {
    let word = op as CasWord;
    debug_assert!(word & TOTAL_MASK == 0);
    word | REBUILDOP_MASK
}

#[inline(always)]
pub(super) const fn val_to_word(payload: usize) -> CasWord {
    (payload << TOTAL_BITS) | VAL_MASK
}

#[inline(always)]
pub(super) const fn word_to_val(word: CasWord) -> usize {
    word >> TOTAL_BITS
}

// node `dirty` word
flags! {
    pub(super) struct DirtyFlag: usize {
        STARTED = 0b001,
        FINISHED = 0b010,
        MARKED_FOR_FREE = 0b100,
    }
}

#[inline(always)]
pub(super) const fn is_dirty_started(dirty: usize) -> bool {
    dirty & DirtyFlag::STARTED.d() != 0
}

#[inline(always)]
pub(super) const fn is_dirty_finished(dirty: usize) -> bool {
    dirty & DirtyFlag::FINISHED.d() != 0
}

#[inline(always)]
pub(super) const fn is_dirty_marked_for_free(dirty: usize) -> bool {
    dirty & DirtyFlag::MARKED_FOR_FREE.d() != 0
}

// finished implies started
#[inline(always)]
pub(super) const fn sum_to_dirty_finished(sum: usize) -> usize {
    (sum << TOTAL_BITS) | DirtyFlag::FINISHED.d() | DirtyFlag::STARTED.d()
}

#[inline(always)]
pub(super) const fn dirty_finished_to_sum(dirty: usize) -> usize {
    dirty >> TOTAL_BITS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn val_roundtrip() {
        let w = val_to_word(0xCAFE);
        assert!(is_val(w) && !is_node(w) && !is_kvpair(w) && !is_rebuildop(w) && !is_dcss(w));
        assert_eq!(word_to_val(w), 0xCAFE);
        assert!(!is_empty_val(w));
    }

    #[test]
    fn empty_val_is_val() {
        assert!(is_val(EMPTY_VAL));
        assert!(is_empty_val(EMPTY_VAL));
        assert!(!is_dcss(EMPTY_VAL));
    }

    #[test]
    fn ptr_roundtrip() {
        #[repr(align(8))]
        struct Probe(#[allow(dead_code)] u64);
        let b = Box::into_raw(Box::new(Probe(7)));
        let w = kvpair_to_word(b);
        assert!(is_kvpair(w) && !is_node(w) && !is_val(w) && !is_rebuildop(w) && !is_dcss(w));
        assert_eq!(to_kvpair::<Probe>(w), b);
        let w = rebuildop_to_word(b);
        assert!(is_rebuildop(w) && !is_node(w) && !is_val(w) && !is_kvpair(w) && !is_dcss(w));
        assert_eq!(to_rebuildop::<Probe>(w), b);
        let w = node_to_word(b);
        assert!(is_node(w) && !is_val(w) && !is_kvpair(w) && !is_rebuildop(w) && !is_dcss(w));
        assert_eq!(to_node::<Probe>(w), b);
        drop(unsafe { Box::from_raw(b) });
    }

    #[test]
    fn dirty_sum_roundtrip() {
        let d = sum_to_dirty_finished(1_000_000);
        assert!(is_dirty_started(d) && is_dirty_finished(d) && !is_dirty_marked_for_free(d));
        assert_eq!(dirty_finished_to_sum(d), 1_000_000);
    }
}
