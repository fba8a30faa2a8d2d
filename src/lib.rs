/*
 * Created on Mon Feb 26 2024
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

//! # skyist
//!
//! A non-blocking interpolation search tree: an ordered map for a fixed set
//! of worker threads with lock-free progress, doubly-logarithmic expected
//! depth under smooth key distributions, and collaborative self-balancing.
//!
//! The index surface lives in [`idx`] (see [`idx::MTOrdIndex`] and the
//! default instantiation [`IndexMTIst`]); the reusable concurrency
//! primitives it is built from live in [`sync`].
//!
//! ```
//! use skyist::{IndexMTIst, MTOrdIndex};
//!
//! let idx: IndexMTIst<u64, u64> = IndexMTIst::new(1);
//! idx.mt_init_thread(0);
//! assert_eq!(idx.mt_insert_return(0, 10, 100), None);
//! assert_eq!(idx.mt_get(0, 10), Some(100));
//! assert_eq!(idx.mt_delete_return(0, 10), Some(100));
//! idx.mt_deinit_thread(0);
//! ```

#[macro_use]
mod macros;
pub mod idx;
mod mem;
pub mod sync;

pub use idx::{
    mtist::{
        imp::IndexMTIst,
        meta::{Config, DefConfig},
        Tree,
    },
    MTOrdIndex, MapKey, MapValue,
};

/*

    A word on tests:

    "Nature is not equal. That's the whole problem." - Freeman Dyson

    Most assertions you can make about a concurrent structure are only honest in a
    quiescent state; the multi-threaded cases below each module therefore join all
    workers before asserting anything global, and everything in between is exercised
    for survival rather than for exact shape.
*/
