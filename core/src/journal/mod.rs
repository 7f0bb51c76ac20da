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

//! # The transaction journal
//!
//! The durable record of two-phase commit progress. The coordinator logs every status transition
//! here; on restart the recovery engine replays the journal to decide the fate of in-doubt
//! branches. `COMMITTING` without a matching `COMMITTED` is the load bearing state: it is the
//! only situation in which recovery is allowed to commit (presumed abort for everything else).

pub mod disk;
pub mod multiplexed;
pub mod null;
#[cfg(test)]
mod tests;

use {
    crate::{
        config::{Configuration, JournalKind},
        error::RuntimeResult,
        storage::record::TxRecord,
        sync::Lazy,
        txn::{uid::Uid, TxStatus},
    },
    parking_lot::RwLock,
    std::collections::{HashMap, HashSet},
};

/// A lazy, finite, non restartable sequence of journal records
pub type RecordIter = Box<dyn Iterator<Item = RuntimeResult<TxRecord>> + Send>;

/// The full journal state as seen by one scan
#[derive(Debug, Default)]
pub struct JournalRecords {
    /// `COMMITTING` records not yet followed by a matching `COMMITTED`
    pub dangling: HashMap<Uid, TxRecord>,
    /// `COMMITTED` records
    pub committed: HashMap<Uid, TxRecord>,
    /// scan indices of records that failed structural or CRC validation
    pub corrupted: HashSet<u64>,
}

impl JournalRecords {
    /// Fold one record into the dangling/committed buckets. Duplicate statuses are idempotent; a
    /// `COMMITTED` without a prior `COMMITTING` still lands in `committed`.
    pub fn apply(&mut self, record: TxRecord) {
        match record.status() {
            TxStatus::Committing => {
                self.dangling.insert(record.gtrid().clone(), record);
            }
            TxStatus::Committed => {
                self.dangling.remove(record.gtrid());
                self.committed.insert(record.gtrid().clone(), record);
            }
            _ => {}
        }
    }
}

/// The journal contract as consumed by the transaction manager. Implementations are free to be
/// called from arbitrary application threads; all synchronization is internal.
pub trait Journal: Send + Sync {
    /// Acquire file handles and load the write cursor
    fn open(&self) -> RuntimeResult<()>;
    /// Persist the cursor and release handles
    fn close(&self) -> RuntimeResult<()>;
    /// Release background resources; idempotent
    fn shutdown(&self) -> RuntimeResult<()>;
    /// Append one status record
    fn log(&self, status: TxStatus, gtrid: &Uid, unique_names: &[&str]) -> RuntimeResult<()>;
    /// Durability fence: everything previously logged is on stable storage when this returns
    fn force(&self) -> RuntimeResult<()>;
    /// The `COMMITTING` records with no matching `COMMITTED`
    fn collect_dangling_records(&self) -> RuntimeResult<HashMap<Uid, TxRecord>> {
        self.collect_all_records().map(|records| records.dangling)
    }
    /// Scan the journal into [`JournalRecords`]
    fn collect_all_records(&self) -> RuntimeResult<JournalRecords>;
    /// Iterate raw records; with `include_invalid`, structurally sound records with CRC
    /// mismatches are yielded too
    fn read_records(&self, include_invalid: bool) -> RuntimeResult<RecordIter>;
}

/*
    journal factory
*/

/// Constructor for a custom journal implementation selected via `journal: <name>`
pub type JournalFactory = fn(&Configuration) -> RuntimeResult<Box<dyn Journal>>;

static CUSTOM_JOURNALS: Lazy<
    RwLock<HashMap<Box<str>, JournalFactory>>,
    fn() -> RwLock<HashMap<Box<str>, JournalFactory>>,
> = Lazy::new(|| RwLock::new(HashMap::new()));

/// Register a custom journal implementation under the given name (process-wide)
pub fn register_custom_journal(name: &str, factory: JournalFactory) {
    CUSTOM_JOURNALS.write().insert(name.into(), factory);
}

/// Instantiate the configured journal implementation. The journal is returned unopened.
pub fn create_journal(config: &Configuration) -> RuntimeResult<Box<dyn Journal>> {
    match &config.journal {
        JournalKind::Disk => Ok(Box::new(disk::DiskJournal::new(config.disk.clone()))),
        JournalKind::Null => Ok(Box::new(null::NullJournal::new())),
        JournalKind::Multiplexed => Ok(Box::new(multiplexed::MultiplexedJournal::new(
            config.primary_disk.clone(),
            config.secondary_disk.clone(),
            config.fail_on_record_corruption,
        ))),
        JournalKind::Custom(name) => match CUSTOM_JOURNALS.read().get(&**name) {
            Some(factory) => factory(config),
            None => Err(crate::error::Error::with_kind(crate::error::ErrorKind::Other(
                format!("unknown custom journal `{name}`"),
            ))),
        },
    }
}
