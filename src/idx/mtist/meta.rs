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

/// Compile time tuning knobs for the tree. The defaults are the ones the
/// structure was designed around; deviate only with a benchmark in hand
pub trait Config: Sized + 'static {
    /// Subtrees of at most this many pairs are materialized as a single flat
    /// leaf node during rebuilds; also the cutoff below which mark-and-count
    /// scans instead of soft-partitioning
    const MAX_ACCEPTABLE_LEAF_SIZE: usize = 48;
    /// A subtree is rebuilt after a number of updates equal to this fraction
    /// of its size at the time it was last rebuilt
    const REBUILD_FRACTION: f64 = 0.25;
    /// Nodes at this depth or above track updates with a sharded counter
    /// instead of a single fetch-add word
    const MULTICOUNTER_DEPTH: usize = 1;
    /// Replaced subtrees with at least this fanout are retired
    /// collaboratively
    const COLLAB_FREE_MIN_DEGREE: usize = 256;
}

pub struct DefConfig;
impl Config for DefConfig {}
