/*
 * Created on Mon Jun 17 2024
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

//! # Janus core
//!
//! The durable heart of the Janus distributed transaction coordinator: the transaction status
//! journal (append-only, force-flushed, CRC protected, optionally multiplexed across two
//! independent fragment pairs) and the presumed-abort recovery engine that reconciles journal
//! state with the in-doubt branches reported by resource managers.
//!
//! The coordinator front-end (transaction lifecycle, resource pooling, scheduling) lives in the
//! `janusd` crates and drives everything here through [`services::Services`].

#[macro_use]
pub mod util;
pub mod config;
pub mod error;
pub mod journal;
pub mod recovery;
pub mod resource;
pub mod services;
pub mod storage;
pub mod sync;
pub mod txn;

pub use error::{Error, ErrorKind, RuntimeResult};

/// A generic IO result
pub type IoResult<T> = Result<T, std::io::Error>;
