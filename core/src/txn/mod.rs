/*
 * Created on Fri Jun 21 2024
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

pub mod uid;
pub mod xid;

use core::fmt;

#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
#[repr(i32)]
/// The status of a distributed transaction as tracked by the coordinator. The journal accepts any
/// of these, but only [`TxStatus::Committing`] and [`TxStatus::Committed`] are load bearing for
/// recovery: everything else is bookkeeping.
pub enum TxStatus {
    Active = 0,
    Preparing = 1,
    Prepared = 2,
    Committing = 3,
    Committed = 4,
    RollingBack = 5,
    Rolledback = 6,
    Unknown = 7,
    NoTransaction = 8,
}

impl TxStatus {
    const MAX_DSCR: i32 = Self::NoTransaction.value_i32();
    pub const fn value_i32(self) -> i32 {
        self as i32
    }
    pub const fn try_from_raw(v: i32) -> Option<Self> {
        if v < 0 || v > Self::MAX_DSCR {
            return None;
        }
        Some(unsafe {
            // UNSAFE(@ohsayan): dscr check above, and the enum is a plain i32 repr
            core::mem::transmute::<i32, TxStatus>(v)
        })
    }
    /// Statuses that must always reach the journal, even with status filtering enabled
    pub const fn is_load_bearing(self) -> bool {
        matches!(self, Self::Committing | Self::Committed)
    }
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Preparing => "PREPARING",
            Self::Prepared => "PREPARED",
            Self::Committing => "COMMITTING",
            Self::Committed => "COMMITTED",
            Self::RollingBack => "ROLLING_BACK",
            Self::Rolledback => "ROLLEDBACK",
            Self::Unknown => "UNKNOWN",
            Self::NoTransaction => "NO_TRANSACTION",
        }
    }
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
