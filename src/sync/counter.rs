/*
 * Created on Sat Mar 02 2024
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
    super::atm::ORD_RLX,
    crate::mem::CachePadded,
    core::sync::atomic::AtomicUsize,
    rand::Rng,
};

/// A sharded counter that diffuses write contention over one counter word per
/// thread (at least two), at the cost of exactness on the read side.
///
/// `inc` uses the power-of-two-choices rule: sample two distinct shards and
/// bump the smaller one, which keeps the shards balanced enough for
/// [`MultiCounter::read_fast`] (one shard scaled by the shard count) to be an
/// unbiased estimate of the true sum
pub struct MultiCounter {
    counters: Box<[CachePadded<AtomicUsize>]>,
}

impl MultiCounter {
    pub fn new(threads: usize) -> Self {
        Self {
            counters: (0..threads.max(2))
                .map(|_| CachePadded::new(AtomicUsize::new(0)))
                .collect(),
        }
    }
    pub fn inc(&self, rng: &mut impl Rng) -> usize {
        self.inc_by(rng, 1)
    }
    pub fn inc_by(&self, rng: &mut impl Rng, amt: usize) -> usize {
        let n = self.counters.len();
        let i = rng.gen_range(0..n);
        let j = loop {
            let j = rng.gen_range(0..n);
            if i != j {
                break j;
            }
        };
        let vi = self.counters[i].load(ORD_RLX);
        let vj = self.counters[j].load(ORD_RLX);
        self.counters[if vi < vj { i } else { j }].fetch_add(amt, ORD_RLX) + amt
    }
    /// One shard scaled by the shard count. Cheap and unbiased, not exact
    pub fn read_fast(&self, rng: &mut impl Rng) -> usize {
        let n = self.counters.len();
        n * self.counters[rng.gen_range(0..n)].load(ORD_RLX)
    }
    /// Sum over all shards. Exact only in quiescence
    pub fn read_accurate(&self) -> usize {
        self.counters.iter().map(|c| c.load(ORD_RLX)).sum()
    }
}

#[cfg(test)]
mod tests {
    use {
        super::MultiCounter,
        rand::{rngs::SmallRng, SeedableRng},
        std::{
            sync::{Arc, RwLock},
            thread,
        },
    };

    #[test]
    fn accurate_sum() {
        let mc = MultiCounter::new(4);
        let mut rng = SmallRng::seed_from_u64(0xF0);
        for _ in 0..10_000 {
            mc.inc(&mut rng);
        }
        assert_eq!(mc.read_accurate(), 10_000);
    }

    #[test]
    fn multispam_sum() {
        const TENANTS: usize = 8;
        const INCRS: usize = 8_192;
        let mc = Arc::new(MultiCounter::new(TENANTS));
        let token = Arc::new(RwLock::new(()));
        let hold = token.write();
        let threads: Vec<_> = (0..TENANTS)
            .map(|tid| {
                let (mc, token) = (mc.clone(), token.clone());
                thread::Builder::new()
                    .name(tid.to_string())
                    .spawn(move || {
                        let _token = token.read();
                        let mut rng = SmallRng::seed_from_u64(tid as u64);
                        for _ in 0..INCRS {
                            mc.inc(&mut rng);
                        }
                    })
                    .unwrap()
            })
            .collect();
        drop(hold);
        threads.into_iter().for_each(|t| t.join().unwrap());
        assert_eq!(mc.read_accurate(), TENANTS * INCRS);
    }
}
