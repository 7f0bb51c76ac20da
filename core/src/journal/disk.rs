/*
 * Created on Tue Jul 02 2024
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
        config::DiskConfiguration,
        error::{RuntimeResult, StorageError},
        storage::{
            header::TxLogHeader,
            logfile::{FragmentView, OwnedFragmentScanner, ScannedRecord, TxLogFile},
            record::TxRecord,
        },
        txn::{uid::Uid, TxStatus},
    },
    parking_lot::Mutex,
};

/// The single disk journal: two fragment files cycled through to bound log size. One write latch
/// serializes all mutations; reads run against cursor-bounded snapshots of the fragments.
pub struct DiskJournal {
    cfg: DiskConfiguration,
    state: Mutex<Option<OpenState>>,
}

struct OpenState {
    parts: [TxLogFile; 2],
    active: usize,
}

impl OpenState {
    fn active(&mut self) -> &mut TxLogFile {
        &mut self.parts[self.active]
    }
    /// Fragment snapshots, oldest first, so that a `COMMITTED` always scans after the
    /// `COMMITTING` it resolves
    fn views(&self) -> RuntimeResult<Vec<FragmentView>> {
        let mut views = vec![
            FragmentView::load(self.parts[0].path())?,
            FragmentView::load(self.parts[1].path())?,
        ];
        views.sort_by_key(|v| v.creation_time_ms());
        Ok(views)
    }
}

impl DiskJournal {
    pub fn new(cfg: DiskConfiguration) -> Self {
        Self {
            cfg,
            state: Mutex::new(None),
        }
    }
    fn scan(
        views: Vec<FragmentView>,
        skip_corrupted_logs: bool,
    ) -> RuntimeResult<JournalRecords> {
        let mut records = JournalRecords::default();
        let mut index: u64 = 0;
        for view in views {
            let mut scanner = view.scan();
            while let Some(scanned) = scanner.next_record() {
                match scanned {
                    ScannedRecord::Ok { record, crc_ok: true } => records.apply(record),
                    ScannedRecord::Ok { crc_ok: false, .. } | ScannedRecord::Skippable => {
                        if !skip_corrupted_logs {
                            return Err(StorageError::RecordDecodeCorrupted.into());
                        }
                        records.corrupted.insert(index);
                    }
                    ScannedRecord::Unskippable => {
                        return Err(StorageError::RecordDecodeIllegalLength.into())
                    }
                }
                index += 1;
            }
        }
        Ok(records)
    }
    /// Swap writes over to the passive fragment. The fragment being vacated may hold dangling
    /// transactions whose `COMMITTED` is yet to come, so they are first re-logged into the
    /// freshly reset fragment; if they cannot fit, the swap is deferred and the caller keeps
    /// appending to the (now over-threshold) active fragment.
    fn try_swap(&self, state: &mut OpenState, incoming_len: u64) -> RuntimeResult<()> {
        // tolerant scan: rotation bookkeeping must not die on a corrupt record
        let dangling = Self::scan(state.views()?, true)?.dangling;
        let mut migratable: Vec<&TxRecord> = dangling.values().collect();
        let migration_bytes: u64 = migratable
            .iter()
            .map(|rec| rec.encoded_len() as u64)
            .sum();
        if TxLogHeader::SIZE as u64 + migration_bytes + incoming_len
            > self.cfg.max_log_size_bytes()
        {
            log::warn!(
                "journal swap deferred: {} dangling transaction(s) do not fit a fresh fragment",
                migratable.len()
            );
            return Ok(());
        }
        // records keep their original payload (and checksum) across the copy; replay order is
        // fixed by sorting on the embedded sequence
        migratable.sort_by_key(|rec| (rec.time_ms(), rec.sequence()));
        let passive = 1 - state.active;
        let fresh = &mut state.parts[passive];
        fresh.reset()?;
        for rec in migratable {
            fresh.append(&rec.encode())?;
        }
        fresh.force()?;
        state.active = passive;
        log::debug!(
            "journal swapped to fragment `{}` ({} dangling record(s) migrated)",
            state.parts[state.active].path(),
            dangling.len()
        );
        Ok(())
    }
}

impl Journal for DiskJournal {
    fn open(&self) -> RuntimeResult<()> {
        let mut state = self.state.lock();
        if state.is_some() {
            return Err(StorageError::JournalAlreadyOpen.into());
        }
        if !self.cfg.forced_write_enabled {
            log::warn!(
                "forced writes are disabled: a crash may lose committed transaction state"
            );
        }
        let parts = [
            TxLogFile::open_or_create(&self.cfg.log_part1_filename, self.cfg.forced_write_enabled)?,
            TxLogFile::open_or_create(&self.cfg.log_part2_filename, self.cfg.forced_write_enabled)?,
        ];
        // the most recently reset fragment is the write target
        let active = if parts[1].creation_time_ms() > parts[0].creation_time_ms() {
            1
        } else {
            0
        };
        *state = Some(OpenState { parts, active });
        Ok(())
    }
    fn close(&self) -> RuntimeResult<()> {
        let mut state = self.state.lock();
        match state.take() {
            Some(OpenState { parts, .. }) => {
                let [part1, part2] = parts;
                part1.close()?;
                part2.close()?;
                Ok(())
            }
            None => Err(StorageError::JournalNotOpen.into()),
        }
    }
    fn shutdown(&self) -> RuntimeResult<()> {
        match self.close() {
            Ok(()) => Ok(()),
            // already closed is fine: shutdown is idempotent
            Err(e)
                if matches!(
                    e.kind(),
                    crate::error::ErrorKind::Storage(StorageError::JournalNotOpen)
                ) =>
            {
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
    fn log(&self, status: TxStatus, gtrid: &Uid, unique_names: &[&str]) -> RuntimeResult<()> {
        let mut guard = self.state.lock();
        let state = match guard.as_mut() {
            Some(state) => state,
            None => return Err(StorageError::JournalNotOpen.into()),
        };
        // arguments are validated even for records the filter is about to drop
        let record = TxRecord::create(status, gtrid.clone(), unique_names)?;
        if self.cfg.filter_log_status && !status.is_load_bearing() {
            return Ok(());
        }
        let bytes = record.encode();
        let over_threshold = state.active().cursor() + bytes.len() as u64
            > self.cfg.max_log_size_bytes()
            && state.active().cursor() > TxLogHeader::SIZE as u64;
        if over_threshold {
            self.try_swap(state, bytes.len() as u64)?;
        }
        state.active().append(&bytes)?;
        if self.cfg.forced_write_enabled && !self.cfg.force_batching_enabled {
            state.active().force()?;
        }
        Ok(())
    }
    fn force(&self) -> RuntimeResult<()> {
        let mut guard = self.state.lock();
        match guard.as_mut() {
            Some(state) => {
                state.parts[0].force()?;
                state.parts[1].force()
            }
            None => Err(StorageError::JournalNotOpen.into()),
        }
    }
    fn collect_all_records(&self) -> RuntimeResult<JournalRecords> {
        let mut guard = self.state.lock();
        match guard.as_mut() {
            Some(state) => Self::scan(state.views()?, self.cfg.skip_corrupted_logs),
            None => Err(StorageError::JournalNotOpen.into()),
        }
    }
    fn read_records(&self, include_invalid: bool) -> RuntimeResult<RecordIter> {
        let mut guard = self.state.lock();
        let views = match guard.as_mut() {
            Some(state) => state.views()?,
            None => return Err(StorageError::JournalNotOpen.into()),
        };
        Ok(Box::new(DiskRecordIter {
            fragments: views.into_iter().map(FragmentView::into_scan).collect(),
            include_invalid,
            skip_corrupted_logs: self.cfg.skip_corrupted_logs,
            done: false,
        }))
    }
}

/// Lazily walks the fragment snapshots taken by [`DiskJournal::read_records`]. Finite and not
/// restartable; decoding happens as the caller advances.
struct DiskRecordIter {
    fragments: std::collections::VecDeque<OwnedFragmentScanner>,
    include_invalid: bool,
    skip_corrupted_logs: bool,
    done: bool,
}

impl Iterator for DiskRecordIter {
    type Item = RuntimeResult<TxRecord>;
    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            let scanner = self.fragments.front_mut()?;
            let scanned = match scanner.next_record() {
                Some(scanned) => scanned,
                None => {
                    self.fragments.pop_front();
                    continue;
                }
            };
            match scanned {
                ScannedRecord::Ok { record, crc_ok } => {
                    if crc_ok || self.include_invalid {
                        return Some(Ok(record));
                    }
                    if !self.skip_corrupted_logs {
                        self.done = true;
                        return Some(Err(StorageError::RecordDecodeCorrupted.into()));
                    }
                }
                ScannedRecord::Skippable => {
                    if !self.skip_corrupted_logs {
                        self.done = true;
                        return Some(Err(StorageError::RecordDecodeCorrupted.into()));
                    }
                }
                ScannedRecord::Unskippable => {
                    self.done = true;
                    return Some(Err(StorageError::RecordDecodeIllegalLength.into()));
                }
            }
        }
        None
    }
}
