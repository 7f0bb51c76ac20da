/*
 * Created on Wed Jun 26 2024
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
    super::{
        fs::{File, FileExt, FileRead, FileSystem, FileWrite, FileWriteExt},
        header::TxLogHeader,
        record::{DecodedRecord, TxRecord},
    },
    crate::{
        error::{ErrorContext, RuntimeResult, StorageError, Subsystem},
        util::os,
    },
};

/// One fragment of a disk journal: a fixed header followed by records up to the persisted write
/// cursor. The writer keeps the file handle; readers go through [`FragmentView`] snapshots.
#[derive(Debug)]
pub struct TxLogFile {
    path: Box<str>,
    file: File,
    header: TxLogHeader,
    forced_write_enabled: bool,
}

impl TxLogFile {
    /// Create a fresh fragment: header written, cursor at header end
    pub fn create(path: &str, forced_write_enabled: bool) -> RuntimeResult<Self> {
        let mut file = File::create(path).set_ctx(Subsystem::Journal, path.to_owned())?;
        let header = TxLogHeader::new(os::get_epoch_time_ms());
        file.fwrite_all(&header.encode())
            .set_ctx(Subsystem::Journal, path.to_owned())?;
        if forced_write_enabled {
            file.fsync_all().set_ctx(Subsystem::Journal, path.to_owned())?;
        }
        Ok(Self {
            path: path.into(),
            file,
            header,
            forced_write_enabled,
        })
    }
    /// Open an existing fragment, validating the header and loading the persisted cursor
    pub fn open(path: &str, forced_write_enabled: bool) -> RuntimeResult<Self> {
        let mut file = File::open(path).set_ctx(Subsystem::Journal, path.to_owned())?;
        file.f_seek_start(0).set_ctx(Subsystem::Journal, path.to_owned())?;
        let block = file
            .fread_exact_block::<{ TxLogHeader::SIZE }>()
            .set_ctx(Subsystem::Journal, path.to_owned())?;
        let header = TxLogHeader::decode(block).set_ctx(Subsystem::Journal, path.to_owned())?;
        let len = file.f_len().set_ctx(Subsystem::Journal, path.to_owned())?;
        if header.cursor() > len {
            return Err(StorageError::HeaderDecodeIllegalCursor.into());
        }
        Ok(Self {
            path: path.into(),
            file,
            header,
            forced_write_enabled,
        })
    }
    pub fn open_or_create(path: &str, forced_write_enabled: bool) -> RuntimeResult<Self> {
        if FileSystem::exists(path).set_ctx(Subsystem::Journal, path.to_owned())? {
            Self::open(path, forced_write_enabled)
        } else {
            Self::create(path, forced_write_enabled)
        }
    }
    pub fn path(&self) -> &str {
        &self.path
    }
    pub fn cursor(&self) -> u64 {
        self.header.cursor()
    }
    pub fn creation_time_ms(&self) -> i64 {
        self.header.creation_time_ms()
    }
    /// Append a serialized record at the cursor and persist the new cursor. Both the record bytes
    /// and the cursor cell ride the same subsequent fsync, so they are atomic from the point of
    /// view of crash recovery.
    pub fn append(&mut self, record: &[u8]) -> RuntimeResult<()> {
        let at = self.header.cursor();
        self.file
            .f_seek_start(at)
            .set_ctx(Subsystem::Journal, self.path.to_string())?;
        self.file
            .fwrite_all(record)
            .set_ctx(Subsystem::Journal, self.path.to_string())?;
        let new_cursor = at + record.len() as u64;
        self.file
            .f_seek_start(TxLogHeader::CURRENT_POSITION_HEADER)
            .set_ctx(Subsystem::Journal, self.path.to_string())?;
        self.file
            .fwrite_all(&new_cursor.to_be_bytes())
            .set_ctx(Subsystem::Journal, self.path.to_string())?;
        self.header.set_cursor(new_cursor);
        Ok(())
    }
    /// Durability fence; a no-op when forced writes are disabled
    pub fn force(&mut self) -> RuntimeResult<()> {
        if self.forced_write_enabled {
            self.file
                .fsync_all()
                .set_ctx(Subsystem::Journal, self.path.to_string())?;
        }
        Ok(())
    }
    /// Reset this fragment for reuse: truncate to the header, write a fresh header (new creation
    /// time so the fragment ordering on reopen is correct) and rewind the cursor.
    pub fn reset(&mut self) -> RuntimeResult<()> {
        self.file
            .f_truncate(TxLogHeader::SIZE as u64)
            .set_ctx(Subsystem::Journal, self.path.to_string())?;
        let header = TxLogHeader::new(os::get_epoch_time_ms());
        self.file
            .f_seek_start(0)
            .set_ctx(Subsystem::Journal, self.path.to_string())?;
        self.file
            .fwrite_all(&header.encode())
            .set_ctx(Subsystem::Journal, self.path.to_string())?;
        self.header = header;
        self.force()
    }
    /// Snapshot the fragment contents for scanning
    pub fn view(&self) -> RuntimeResult<FragmentView> {
        FragmentView::load(&self.path)
    }
    /// Persist the cursor and release the handle
    pub fn close(mut self) -> RuntimeResult<()> {
        self.force()
    }
}

/// An in-memory snapshot of one fragment, bounded by its persisted write cursor
#[derive(Debug)]
pub struct FragmentView {
    data: Vec<u8>,
    limit: usize,
    creation_time_ms: i64,
}

impl FragmentView {
    pub fn load(path: &str) -> RuntimeResult<Self> {
        let data = FileSystem::read(path).set_ctx(Subsystem::Journal, path.to_owned())?;
        if data.len() < TxLogHeader::SIZE {
            return Err(StorageError::HeaderDecodeCorrupted.into());
        }
        let mut block = [0u8; TxLogHeader::SIZE];
        block.copy_from_slice(&data[..TxLogHeader::SIZE]);
        let header = TxLogHeader::decode(block).set_ctx(Subsystem::Journal, path.to_owned())?;
        if header.cursor() > data.len() as u64 {
            return Err(StorageError::HeaderDecodeIllegalCursor.into());
        }
        Ok(Self {
            limit: header.cursor() as usize,
            creation_time_ms: header.creation_time_ms(),
            data,
        })
    }
    pub fn creation_time_ms(&self) -> i64 {
        self.creation_time_ms
    }
    /// Scan records from the start of the fragment
    pub fn scan(&self) -> FragmentScanner<'_> {
        FragmentScanner {
            data: &self.data,
            pos: TxLogHeader::SIZE,
            limit: self.limit,
        }
    }
    /// Like [`Self::scan`], but the scanner owns the snapshot (for iterators that outlive the
    /// journal lock)
    pub fn into_scan(self) -> OwnedFragmentScanner {
        OwnedFragmentScanner {
            pos: TxLogHeader::SIZE,
            limit: self.limit,
            data: self.data,
        }
    }
}

/// The outcome of decoding the record at one scan position
pub enum ScannedRecord {
    /// a structurally sound record (CRC validity reported separately)
    Ok { record: TxRecord, crc_ok: bool },
    /// a corrupt record that was skipped using its (still trusted) record length
    Skippable,
    /// a corrupt record whose record length cannot be trusted; the scan stopped here
    Unskippable,
}

/// Iterates the records of one fragment snapshot. Finite, not restartable.
pub struct FragmentScanner<'a> {
    data: &'a [u8],
    pos: usize,
    limit: usize,
}

impl<'a> FragmentScanner<'a> {
    pub fn is_exhausted(&self) -> bool {
        self.pos >= self.limit
    }
    /// Decode the next record, advancing past it (or past the claimed record length on a
    /// skippable corruption). Returns `None` at the end of the fragment.
    pub fn next_record(&mut self) -> Option<ScannedRecord> {
        if self.is_exhausted() {
            return None;
        }
        match TxRecord::decode(self.data, self.pos, self.limit) {
            Ok(DecodedRecord {
                record,
                crc_ok,
                next,
            }) => {
                self.pos = next;
                Some(ScannedRecord::Ok { record, crc_ok })
            }
            Err(StorageError::RecordDecodeIllegalLength) => {
                self.pos = self.limit;
                Some(ScannedRecord::Unskippable)
            }
            Err(_) => {
                self.pos = TxRecord::skip_target(self.data, self.pos).min(self.limit);
                Some(ScannedRecord::Skippable)
            }
        }
    }
}

/// An owning [`FragmentScanner`]
pub struct OwnedFragmentScanner {
    data: Vec<u8>,
    pos: usize,
    limit: usize,
}

impl OwnedFragmentScanner {
    pub fn next_record(&mut self) -> Option<ScannedRecord> {
        let mut scanner = FragmentScanner {
            data: &self.data,
            pos: self.pos,
            limit: self.limit,
        };
        let scanned = scanner.next_record();
        self.pos = scanner.pos;
        scanned
    }
}

#[cfg(test)]
mod tests {
    use {
        super::{FragmentView, ScannedRecord, TxLogFile},
        crate::{
            storage::{header::TxLogHeader, record::TxRecord},
            txn::{uid::UidGenerator, TxStatus},
        },
    };

    fn write_records(path: &str, n: usize) -> Vec<TxRecord> {
        let gen = UidGenerator::new("node-a");
        let mut log = TxLogFile::create(path, true).unwrap();
        let records: Vec<TxRecord> = (0..n)
            .map(|_| TxRecord::create(TxStatus::Committing, gen.generate(), &["r1"]).unwrap())
            .collect();
        for rec in &records {
            log.append(&rec.encode()).unwrap();
        }
        log.force().unwrap();
        log.close().unwrap();
        records
    }

    #[test]
    fn cursor_survives_reopen() {
        let records = write_records("logfile_cursor_reopen.db", 3);
        let total: usize = records.iter().map(|r| r.encoded_len()).sum();
        let log = TxLogFile::open("logfile_cursor_reopen.db", true).unwrap();
        assert_eq!(log.cursor(), (TxLogHeader::SIZE + total) as u64);
    }

    #[test]
    fn scan_yields_written_records() {
        let records = write_records("logfile_scan.db", 4);
        let view = FragmentView::load("logfile_scan.db").unwrap();
        let mut scanner = view.scan();
        let mut seen = vec![];
        while let Some(scanned) = scanner.next_record() {
            match scanned {
                ScannedRecord::Ok { record, crc_ok } => {
                    assert!(crc_ok);
                    seen.push(record);
                }
                _ => panic!("unexpected corruption"),
            }
        }
        assert_eq!(seen, records);
    }

    #[test]
    fn append_after_reopen_continues_at_cursor() {
        let mut records = write_records("logfile_append_reopen.db", 2);
        let gen = UidGenerator::new("node-a");
        let mut log = TxLogFile::open("logfile_append_reopen.db", true).unwrap();
        let extra = TxRecord::create(TxStatus::Committed, gen.generate(), &["r1"]).unwrap();
        log.append(&extra.encode()).unwrap();
        log.close().unwrap();
        records.push(extra);
        let view = FragmentView::load("logfile_append_reopen.db").unwrap();
        let mut scanner = view.scan();
        let mut seen = vec![];
        while let Some(ScannedRecord::Ok { record, .. }) = scanner.next_record() {
            seen.push(record);
        }
        assert_eq!(seen, records);
    }

    #[test]
    fn reset_rewinds_for_reuse() {
        write_records("logfile_reset.db", 2);
        let mut log = TxLogFile::open("logfile_reset.db", true).unwrap();
        log.reset().unwrap();
        assert_eq!(log.cursor(), TxLogHeader::SIZE as u64);
        let view = log.view().unwrap();
        assert!(view.scan().is_exhausted());
    }
}
