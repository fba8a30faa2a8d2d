/*
 * Created on Wed Feb 28 2024
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

use core::{mem, sync::atomic::Ordering};
// re-export here because we have some future plans ;) (@ohsayan)
pub use crossbeam_epoch::{pin as cpin, unprotected as upin, Guard};

pub const ORD_RLX: Ordering = Ordering::Relaxed;
pub const ORD_ACQ: Ordering = Ordering::Acquire;
pub const ORD_REL: Ordering = Ordering::Release;
pub const ORD_ACR: Ordering = Ordering::AcqRel;
pub const ORD_SEQ: Ordering = Ordering::SeqCst;

/// Returns true if a pointer to `T` has at least `fsize` free low bits
/// for flag encoding
pub(crate) const fn ensure_flag_align<T>(fsize: usize) -> bool {
    mem::align_of::<T>().trailing_zeros() as usize >= fsize
}
