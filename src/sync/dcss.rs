/*
 * Created on Thu Feb 29 2024
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
    double-compare-single-swap (DCSS)
    ---
    A descriptor based reduction of a 2-location conditional update to single-word CAS: the
    operation atomically writes `new2` to `addr2` iff `*addr1 == old1` and `*addr2 == old2`
    hold at the linearization point. The protocol is the one from the work of Harris et al.
    on multi-word CAS, with the descriptor reuse scheme of Arbel-Raviv and Brown (per-thread
    descriptor slots + sequence validation instead of allocation per operation).

    A descriptor is published by CASing a *tagged* word (tagptr) into `addr2`. The tagptr
    packs (sequence, tid, tag bit); bit 0 distinguishes a tagptr from application words, so
    application words MUST keep bit 0 clear. Any reader that encounters a tagptr helps the
    operation finish (decide against `addr1`, then detach the tagptr) and retries its own
    read. Sequence numbers make descriptor reuse safe: a helper that snapshots a stale
    descriptor detects the sequence mismatch and walks away without acting.

    All atomics here are seqcst. This primitive is the hot seam of the tree on top of it and
    the orderings are intentionally not relaxed: the decide step reads `addr1` *between* the
    publish and detach CASes on `addr2`, and that read must be totally ordered with both.
*/

use {
    super::atm::{ORD_RLX, ORD_SEQ},
    crate::mem::CachePadded,
    core::sync::atomic::{AtomicPtr, AtomicUsize},
};

/// A single word CAS target: 3 low bits of tag space, the rest payload
pub type CasWord = usize;

/// bit 0 of a casword marks a published DCSS descriptor
pub const DCSS_TAGBIT: CasWord = 0b1;

const STATE_UNDECIDED: usize = 0;
const STATE_SUCCEEDED: usize = 4;
const STATE_FAILED: usize = 8;
const STATE_MASK: usize = 0xf;
const MUTABLES_SEQ_SHIFT: u32 = 4;
const TAGPTR_TID_SHIFT: u32 = 1;
const TAGPTR_TID_BITS: u32 = 15;
const TAGPTR_SEQ_SHIFT: u32 = TAGPTR_TID_SHIFT + TAGPTR_TID_BITS;

#[inline(always)]
pub const fn is_dcss(word: CasWord) -> bool {
    word & DCSS_TAGBIT == DCSS_TAGBIT
}

#[inline(always)]
const fn mut_seq(mutables: usize) -> usize {
    mutables >> MUTABLES_SEQ_SHIFT
}

#[inline(always)]
const fn mut_state(mutables: usize) -> usize {
    mutables & STATE_MASK
}

#[inline(always)]
const fn mut_new(seq: usize, state: usize) -> usize {
    (seq << MUTABLES_SEQ_SHIFT) | state
}

#[inline(always)]
const fn tagptr_new(tid: usize, seq: usize) -> usize {
    (seq << TAGPTR_SEQ_SHIFT) | (tid << TAGPTR_TID_SHIFT) | DCSS_TAGBIT
}

#[inline(always)]
const fn tagptr_tid(tagptr: usize) -> usize {
    (tagptr >> TAGPTR_TID_SHIFT) & ((1 << TAGPTR_TID_BITS) - 1)
}

#[inline(always)]
const fn tagptr_seq(tagptr: usize) -> usize {
    tagptr >> TAGPTR_SEQ_SHIFT
}

/// Outcome of a [`DcssProvider::dcss`] call. The failure variants carry the
/// value observed at the offending address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DcssResult {
    /// `new2` was written to `addr2`
    Success,
    /// `*addr1 != old1` at the decision point
    FailedAddr1(CasWord),
    /// `*addr2 != old2` when publishing
    FailedAddr2(CasWord),
}

impl DcssResult {
    #[inline(always)]
    pub fn successful(&self) -> bool {
        matches!(self, Self::Success)
    }
}

enum HelpOutcome {
    Decided(DcssResult),
    /// the descriptor was reused before we could act; only reachable when
    /// helping another thread, whose operation has then already finished
    Stale,
}

pub struct DcssDescriptor {
    /// packs `seq << 4 | state`. the sequence is bumped once when the slot is
    /// opened for reuse (making it even) and once more when the descriptor is
    /// fully initialized (odd); only odd sequences are ever published
    mutables: AtomicUsize,
    addr1: AtomicPtr<AtomicUsize>,
    old1: AtomicUsize,
    addr2: AtomicPtr<AtomicUsize>,
    old2: AtomicUsize,
    new2: AtomicUsize,
}

impl DcssDescriptor {
    fn new() -> Self {
        Self {
            // rest state: odd sequence, undecided
            mutables: AtomicUsize::new(mut_new(1, STATE_UNDECIDED)),
            addr1: AtomicPtr::new(core::ptr::null_mut()),
            old1: AtomicUsize::new(0),
            addr2: AtomicPtr::new(core::ptr::null_mut()),
            old2: AtomicUsize::new(0),
            new2: AtomicUsize::new(0),
        }
    }
}

/// field snapshot of a (possibly foreign) descriptor
struct Snapshot {
    addr1: *const AtomicUsize,
    old1: CasWord,
    addr2: *const AtomicUsize,
    old2: CasWord,
    new2: CasWord,
}

/// The process wide DCSS descriptor pool, one cache padded slot per thread id.
/// Constructed once with a fixed thread count; thread ids index the pool and
/// MUST NOT be shared by concurrently live threads
pub struct DcssProvider {
    descriptors: Box<[CachePadded<DcssDescriptor>]>,
}

impl DcssProvider {
    pub fn new(threads: usize) -> Self {
        assert!(threads != 0 && threads < 1 << TAGPTR_TID_BITS);
        Self {
            descriptors: (0..threads)
                .map(|_| CachePadded::new(DcssDescriptor::new()))
                .collect(),
        }
    }
    pub fn threads(&self) -> usize {
        self.descriptors.len()
    }
    /// Read a casword that may carry a published descriptor, helping any
    /// in-flight DCSS until a plain application word is observed
    #[inline]
    pub fn read(&self, addr: &AtomicUsize) -> CasWord {
        loop {
            let word = addr.load(ORD_SEQ);
            if is_dcss(word) {
                self.help_other(word);
            } else {
                return word;
            }
        }
    }
    /// Atomically write `new2` to `addr2` iff `*addr1 == old1 && *addr2 == old2`.
    ///
    /// `old2`/`new2` must be plain application words (bit 0 clear). `addr1` is
    /// only ever compared, never written
    pub fn dcss(
        &self,
        tid: usize,
        addr1: &AtomicUsize,
        old1: CasWord,
        addr2: &AtomicUsize,
        old2: CasWord,
        new2: CasWord,
    ) -> DcssResult {
        debug_assert!(tid < self.descriptors.len());
        debug_assert!(!is_dcss(old2) && !is_dcss(new2));
        let desc = &*self.descriptors[tid];
        // open the slot for reuse: even sequence invalidates stale snapshots
        let seq = mut_seq(desc.mutables.load(ORD_RLX));
        debug_assert_eq!(seq & 1, 1);
        desc.mutables.store(mut_new(seq + 1, STATE_UNDECIDED), ORD_SEQ);
        desc.addr1
            .store(addr1 as *const AtomicUsize as *mut _, ORD_RLX);
        desc.old1.store(old1, ORD_RLX);
        desc.addr2
            .store(addr2 as *const AtomicUsize as *mut _, ORD_RLX);
        desc.old2.store(old2, ORD_RLX);
        desc.new2.store(new2, ORD_RLX);
        // publish: odd sequence, fields now frozen until the next open
        let seq = seq + 2;
        desc.mutables.store(mut_new(seq, STATE_UNDECIDED), ORD_SEQ);
        let tagptr = tagptr_new(tid, seq);
        loop {
            match addr2.compare_exchange(old2, tagptr, ORD_SEQ, ORD_SEQ) {
                Ok(_) => break,
                Err(observed) if is_dcss(observed) => {
                    // another descriptor holds the slot; help it out and retry
                    self.help_other(observed);
                }
                Err(observed) => return DcssResult::FailedAddr2(observed),
            }
        }
        let snapshot = Snapshot {
            addr1,
            old1,
            addr2,
            old2,
            new2,
        };
        match self.help(tagptr, &snapshot) {
            HelpOutcome::Decided(result) => result,
            HelpOutcome::Stale => unreachable!("own descriptor cannot be reused mid-operation"),
        }
    }
    /// Decide and detach a published descriptor. `snapshot` must be a validated
    /// snapshot of the descriptor `tagptr` refers to
    fn help(&self, tagptr: usize, snapshot: &Snapshot) -> HelpOutcome {
        // phase 2: decide against addr1
        let val1 = unsafe {
            // UNSAFE(@ohsayan): target words outlive any thread that can still
            // hold this tagptr (epoch protected by all callers)
            &*snapshot.addr1
        }
        .load(ORD_SEQ);
        let state = if val1 == snapshot.old1 {
            STATE_SUCCEEDED
        } else {
            STATE_FAILED
        };
        let desc = &*self.descriptors[tagptr_tid(tagptr)];
        let seq = tagptr_seq(tagptr);
        let decided = match desc.mutables.compare_exchange(
            mut_new(seq, STATE_UNDECIDED),
            mut_new(seq, state),
            ORD_SEQ,
            ORD_SEQ,
        ) {
            Ok(_) => state,
            Err(current) => {
                if mut_seq(current) != seq {
                    // reused; the operation this tagptr came from is long done
                    return HelpOutcome::Stale;
                }
                mut_state(current)
            }
        };
        // phase 3: detach the tagptr; idempotent, any helper may do this
        let addr2 = unsafe {
            // UNSAFE(@ohsayan): same lifetime argument as addr1 above
            &*snapshot.addr2
        };
        if decided == STATE_SUCCEEDED {
            let _ = addr2.compare_exchange(tagptr, snapshot.new2, ORD_SEQ, ORD_SEQ);
            HelpOutcome::Decided(DcssResult::Success)
        } else {
            let _ = addr2.compare_exchange(tagptr, snapshot.old2, ORD_SEQ, ORD_SEQ);
            HelpOutcome::Decided(DcssResult::FailedAddr1(val1))
        }
    }
    /// Help a foreign operation whose tagptr we ran into
    fn help_other(&self, tagptr: usize) {
        debug_assert!(is_dcss(tagptr));
        debug_assert_eq!(tagptr_seq(tagptr) & 1, 1);
        if let Some(snapshot) = self.snapshot(tagptr) {
            let _ = self.help(tagptr, &snapshot);
        }
    }
    /// Seqlock style field snapshot: valid iff the descriptor sequence matches
    /// the tagptr both before and after the field reads
    fn snapshot(&self, tagptr: usize) -> Option<Snapshot> {
        let desc = &*self.descriptors[tagptr_tid(tagptr)];
        let seq = tagptr_seq(tagptr);
        if mut_seq(desc.mutables.load(ORD_SEQ)) != seq {
            return None;
        }
        let snapshot = Snapshot {
            addr1: desc.addr1.load(ORD_SEQ),
            old1: desc.old1.load(ORD_SEQ),
            addr2: desc.addr2.load(ORD_SEQ),
            old2: desc.old2.load(ORD_SEQ),
            new2: desc.new2.load(ORD_SEQ),
        };
        (mut_seq(desc.mutables.load(ORD_SEQ)) == seq).then_some(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use {
        super::{DcssProvider, DcssResult},
        core::sync::atomic::{AtomicUsize, Ordering},
        std::{
            sync::{Arc, RwLock},
            thread,
        },
    };

    #[test]
    fn dcss_success() {
        let prov = DcssProvider::new(1);
        let gate = AtomicUsize::new(0);
        let slot = AtomicUsize::new(10 << 1);
        assert_eq!(
            prov.dcss(0, &gate, 0, &slot, 10 << 1, 20 << 1),
            DcssResult::Success
        );
        assert_eq!(prov.read(&slot), 20 << 1);
    }

    #[test]
    fn dcss_failed_addr1() {
        let prov = DcssProvider::new(1);
        let gate = AtomicUsize::new(1 << 1);
        let slot = AtomicUsize::new(10 << 1);
        assert_eq!(
            prov.dcss(0, &gate, 0, &slot, 10 << 1, 20 << 1),
            DcssResult::FailedAddr1(1 << 1)
        );
        // the slot is restored
        assert_eq!(prov.read(&slot), 10 << 1);
    }

    #[test]
    fn dcss_failed_addr2() {
        let prov = DcssProvider::new(1);
        let gate = AtomicUsize::new(0);
        let slot = AtomicUsize::new(30 << 1);
        assert_eq!(
            prov.dcss(0, &gate, 0, &slot, 10 << 1, 20 << 1),
            DcssResult::FailedAddr2(30 << 1)
        );
        assert_eq!(prov.read(&slot), 30 << 1);
    }

    #[test]
    fn dcss_slot_reuse() {
        let prov = DcssProvider::new(1);
        let gate = AtomicUsize::new(0);
        let slot = AtomicUsize::new(0);
        for i in 0..1_000usize {
            assert_eq!(
                prov.dcss(0, &gate, 0, &slot, i << 1, (i + 1) << 1),
                DcssResult::Success
            );
        }
        assert_eq!(prov.read(&slot), 1_000 << 1);
    }

    const SPAM_THREADS: usize = 8;
    const SPAM_INCRS: usize = 4_096;

    #[test]
    fn multispam_conditional_incr() {
        // every thread funnels conditional increments through one contended
        // word, so helpers constantly run into each other's descriptors
        let prov = Arc::new(DcssProvider::new(SPAM_THREADS));
        let gate = Arc::new(AtomicUsize::new(0));
        let slot = Arc::new(AtomicUsize::new(0));
        let token = Arc::new(RwLock::new(()));
        let hold = token.write();
        let threads: Vec<_> = (0..SPAM_THREADS)
            .map(|tid| {
                let (prov, gate, slot, token) =
                    (prov.clone(), gate.clone(), slot.clone(), token.clone());
                thread::Builder::new()
                    .name(tid.to_string())
                    .spawn(move || {
                        let _token = token.read();
                        let mut done = 0;
                        while done != SPAM_INCRS {
                            let current = prov.read(&slot);
                            match prov.dcss(tid, &gate, 0, &slot, current, current + (1 << 1)) {
                                DcssResult::Success => done += 1,
                                DcssResult::FailedAddr2(_) => {}
                                DcssResult::FailedAddr1(_) => unreachable!("gate never flips"),
                            }
                        }
                    })
                    .unwrap()
            })
            .collect();
        drop(hold);
        threads.into_iter().for_each(|t| t.join().unwrap());
        assert_eq!(
            slot.load(Ordering::SeqCst) >> 1,
            SPAM_THREADS * SPAM_INCRS
        );
    }
}
