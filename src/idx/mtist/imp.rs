/*
 * Created on Sun Mar 10 2024
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
    super::{
        meta::{Config, DefConfig},
        Tree,
    },
    crate::idx::{MTOrdIndex, MapKey, MapValue},
};

pub type IndexMTIst<K, V> = Tree<K, V, DefConfig>;

impl<K: MapKey, V: MapValue, C: Config> MTOrdIndex<K, V> for Tree<K, V, C> {
    fn mt_init_thread(&self, tid: usize) {
        self.init_thread(tid)
    }

    fn mt_deinit_thread(&self, tid: usize) {
        self.deinit_thread(tid)
    }

    fn mt_contains(&self, tid: usize, key: K) -> bool {
        self.contains(tid, key)
    }

    fn mt_get(&self, tid: usize, key: K) -> Option<V> {
        self.get(tid, key)
    }

    fn mt_upsert_return(&self, tid: usize, key: K, val: V) -> Option<V> {
        self.upsert_return(tid, key, val)
    }

    fn mt_insert_return(&self, tid: usize, key: K, val: V) -> Option<V> {
        self.insert_return(tid, key, val)
    }

    fn mt_delete_return(&self, tid: usize, key: K) -> Option<V> {
        self.delete_return(tid, key)
    }

    fn mt_range(&self, tid: usize, lo: K, hi: K, out: &mut Vec<(K, V)>) -> usize {
        self.range(tid, lo, hi, out)
    }

    fn mt_len(&self) -> usize {
        self.len()
    }
}
