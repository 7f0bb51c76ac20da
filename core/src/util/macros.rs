/*
 * Created on Tue Jun 18 2024
 *
 * This file is a part of Janus
 * Janus is a free and open-source distributed transaction coordinator
 * written by Sayan Nandan ("the Author") with the vision to provide
 * applications with dependable two-phase commit without compromising
 * on durability, recoverability or performance.
 *
 * Copyright (c) 2024, Sayan Nandan <nandansayan@outlook.com>
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

macro_rules! local {
    ($($(#[$attr:meta])* static $name:ident: $ty:ty = $expr:expr;)*) => {
        ::std::thread_local! {
            $($(#[$attr])* static $name: ::std::cell::RefCell<$ty> = ::std::cell::RefCell::new($expr);)*
        }
    }
}

macro_rules! local_mut {
    ($lcl:ident, $call:expr) => {{
        #[inline(always)]
        fn _f<T, U>(v: &::std::cell::RefCell<T>, f: impl FnOnce(&mut T) -> U) -> U {
            f(&mut v.borrow_mut())
        }
        $lcl.with(|v| _f(v, $call))
    }};
}

macro_rules! local_ref {
    ($lcl:ident, $call:expr) => {{
        #[inline(always)]
        fn _f<T, U>(v: &::std::cell::RefCell<T>, f: impl FnOnce(&T) -> U) -> U {
            f(&v.borrow())
        }
        $lcl.with(|v| _f(v, $call))
    }};
}

macro_rules! sizeof {
    ($ty:ty) => {
        ::core::mem::size_of::<$ty>()
    };
    ($ty:ty, $by:literal) => {
        ::core::mem::size_of::<$ty>() * $by
    };
}

macro_rules! okay {
    ($($expr:expr),* $(,)?) => {
        $(($expr) &)* true
    }
}

macro_rules! direct_from {
    ($for:ty => {$($other:ty as $me:ident),*$(,)?}) => {
        $(impl ::core::convert::From<$other> for $for {
            fn from(v: $other) -> Self { Self::$me(v.into()) }
        })*
    }
}

#[cfg(test)]
macro_rules! multi_assert_eq {
    ($($lhs:expr),* => $rhs:expr) => {
        $(assert_eq!($lhs, $rhs);)*
    };
}
