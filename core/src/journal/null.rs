/*
 * Created on Mon Jul 01 2024
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

use {
    super::{Journal, JournalRecords, RecordIter},
    crate::{
        error::RuntimeResult,
        txn::{uid::Uid, TxStatus},
    },
};

/// A journal that accepts and discards everything. Nothing is ever dangling, so recovery after a
/// crash presumes abort for every in-doubt branch. Unsafe for anything but throwaway
/// environments.
pub struct NullJournal {
    _priv: (),
}

impl NullJournal {
    pub fn new() -> Self {
        log::warn!("journal is `null`: transaction state is NOT durable");
        Self { _priv: () }
    }
}

impl Journal for NullJournal {
    fn open(&self) -> RuntimeResult<()> {
        Ok(())
    }
    fn close(&self) -> RuntimeResult<()> {
        Ok(())
    }
    fn shutdown(&self) -> RuntimeResult<()> {
        Ok(())
    }
    fn log(&self, _: TxStatus, _: &Uid, _: &[&str]) -> RuntimeResult<()> {
        Ok(())
    }
    fn force(&self) -> RuntimeResult<()> {
        Ok(())
    }
    fn collect_all_records(&self) -> RuntimeResult<JournalRecords> {
        Ok(JournalRecords::default())
    }
    fn read_records(&self, _include_invalid: bool) -> RuntimeResult<RecordIter> {
        Ok(Box::new(core::iter::empty()))
    }
}
