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

macro_rules! assertions {
    ($($assert:expr),*$(,)?) => {$(const _:()=::core::assert!($assert);)*}
}

macro_rules! flags {
    ($(#[$attr:meta])* $vis:vis struct $group:ident: $ty:ty { $($flag:ident = $expr:expr),* $(,)?}) => (
        $(#[$attr])* $vis struct $group {r#const: $ty}
        impl $group {
            $(pub const $flag: Self = Self { r#const: $expr };)*
            #[inline(always)] pub const fn d(&self) -> $ty { self.r#const }
            #[inline(always)] pub const fn name(&self) -> &'static str {
                match self.r#const {$(capture if capture == $expr => ::core::stringify!($flag),)* _ => ::core::unreachable!()}
            }
        }
        impl ::core::fmt::Debug for $group {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                ::core::write!(f, "{}::{}", ::core::stringify!($group), Self::name(self))
            }
        }
    );
}

macro_rules! dbgfn {
    ($($(#[$attr:meta])* fn $fn:ident($self:ident: &Self $(, $arg:ident: $argty:ty)*) $(-> $ret:ty)? $dbg:block else $rls:block)*) => {
        $(
            #[cfg(debug_assertions)]
            $(#[$attr])*
            fn $fn(&$self $(, $arg: $argty)*) $(-> $ret)? $dbg
            #[cfg(not(debug_assertions))]
            $(#[$attr])*
            fn $fn(&$self $(, $arg: $argty)*) $(-> $ret)? $rls
        )*
    };
}
