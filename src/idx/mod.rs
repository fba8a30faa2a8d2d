/*
 * Created on Sun Mar 03 2024
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

#![deny(unreachable_patterns)]

pub mod mtist;

use core::fmt;

/// Any type implementing this trait can be used as a key inside an ordered,
/// interpolated index. Keys are kept inline in nodes, hence [`Copy`].
///
/// The index additionally relies on two sentinels: [`MapKey::INF`] compares
/// strictly greater than every storable key, and [`MapKey::RESERVED`] is the
/// fill value of fresh key slots and can never be stored
pub trait MapKey: Copy + Ord + Send + Sync + fmt::Debug + 'static {
    /// Compares strictly greater than every storable key
    const INF: Self;
    /// Reserved key; never inserted
    const RESERVED: Self;
    /// Estimate the bucket of `self` within `[min, max)` split into `buckets`
    /// equal intervals. Must return a value in `[0, buckets)` whenever
    /// `min <= self < max`
    fn interpolate(self, min: Self, max: Self, buckets: usize) -> usize;
}

/// Any type implementing this trait can be stored as a value inside an
/// interpolated index. Values ride inline in tagged words, so a payload
/// leaves the top three bits of the machine word unused (caller contract;
/// debug asserted at the update entry points)
pub trait MapValue: Copy + Eq + Send + Sync + fmt::Debug + 'static {
    fn into_payload(self) -> usize;
    fn from_payload(payload: usize) -> Self;
}

macro_rules! impl_map_key {
    ($($ty:ty),*) => {
        $(impl MapKey for $ty {
            const INF: Self = <$ty>::MAX;
            const RESERVED: Self = 0;
            #[inline(always)]
            fn interpolate(self, min: Self, max: Self, buckets: usize) -> usize {
                debug_assert!(min <= self && self < max);
                ((buckets as u128 * (self - min) as u128) / (max - min) as u128) as usize
            }
        })*
    };
}

impl_map_key!(u16, u32, u64, usize);

macro_rules! impl_map_value {
    ($($ty:ty),*) => {
        $(impl MapValue for $ty {
            #[inline(always)]
            fn into_payload(self) -> usize {
                self as usize
            }
            #[inline(always)]
            fn from_payload(payload: usize) -> Self {
                payload as $ty
            }
        })*
    };
}

impl_map_value!(u8, u16, u32, u64, usize);

/// An ordered MT index operated by a fixed set of worker threads. Thread ids
/// are dense in `[0, threads)`, handed out by the caller, and index per-thread
/// state; a tid must not be shared by two concurrently live threads
pub trait MTOrdIndex<K: MapKey, V: MapValue> {
    /// Call once per worker before its first operation
    fn mt_init_thread(&self, tid: usize);
    /// Call once per worker after its last operation. Reusing the tid for
    /// another logical thread afterwards requires external quiescence
    fn mt_deinit_thread(&self, tid: usize);
    /// Returns true if the key is bound
    fn mt_contains(&self, tid: usize, key: K) -> bool;
    /// Returns the value bound to the key, if any
    fn mt_get(&self, tid: usize, key: K) -> Option<V>;
    /// Insert or replace; returns the previously bound value, if any
    fn mt_upsert_return(&self, tid: usize, key: K, val: V) -> Option<V>;
    /// Insert only if absent; returns the already bound value, if any (in
    /// which case nothing was written)
    fn mt_insert_return(&self, tid: usize, key: K, val: V) -> Option<V>;
    /// Remove the binding and return it, if it exists
    fn mt_delete_return(&self, tid: usize, key: K) -> Option<V>;
    /// Collect all bindings with `lo <= key <= hi` into `out`, returning the
    /// count
    fn mt_range(&self, tid: usize, lo: K, hi: K, out: &mut Vec<(K, V)>) -> usize;
    /// Approximate number of bindings; exact only in quiescence
    fn mt_len(&self) -> usize;
}
