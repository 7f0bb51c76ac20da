/*
 * Created on Mon Jul 22 2024
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
    super::{disk::DiskJournal, Journal},
    crate::{
        config::DiskConfiguration,
        storage::{
            fs::{File, FileExt, FileSystem, FileWrite},
            header::TxLogHeader,
            logfile::{FragmentView, ScannedRecord},
        },
        txn::uid::UidGenerator,
    },
};

/// A fragment pair for one test; tags keep the (process global) virtual file system disjoint
/// between tests
pub(super) fn disk_config(tag: &str) -> DiskConfiguration {
    DiskConfiguration::default_with_parts(&format!("{tag}-1.tlog"), &format!("{tag}-2.tlog"))
}

pub(super) fn open_disk(cfg: DiskConfiguration) -> DiskJournal {
    let journal = DiskJournal::new(cfg);
    journal.open().unwrap();
    journal
}

pub(super) fn gtrid_source() -> UidGenerator {
    UidGenerator::new("node-test")
}

/// Flip one byte of a (virtual) file in place
pub(super) fn flip_byte(path: &str, at: u64) {
    let byte = FileSystem::read(path).unwrap()[at as usize];
    overwrite_bytes(path, at, &[byte ^ 0xFF]);
}

pub(super) fn overwrite_bytes(path: &str, at: u64, bytes: &[u8]) {
    let mut f = File::open(path).unwrap();
    f.f_seek_start(at).unwrap();
    f.fwrite_all(bytes).unwrap();
}

/// The fragment of the pair currently holding records (the write target of a fresh journal)
pub(super) fn active_fragment(cfg: &DiskConfiguration) -> String {
    for path in [&cfg.log_part1_filename, &cfg.log_part2_filename] {
        let data = FileSystem::read(path).unwrap();
        let mut cursor = [0u8; 8];
        cursor.copy_from_slice(
            &data[TxLogHeader::CURRENT_POSITION_HEADER as usize
                ..TxLogHeader::CURRENT_POSITION_HEADER as usize + 8],
        );
        if u64::from_be_bytes(cursor) > TxLogHeader::SIZE as u64 {
            return path.to_string();
        }
    }
    panic!("no fragment holds records yet");
}

/// Byte offsets (from the start of the fragment) of every record in it
pub(super) fn record_offsets(path: &str) -> Vec<u64> {
    let view = FragmentView::load(path).unwrap();
    let mut scanner = view.scan();
    let mut offsets = vec![];
    let mut at = TxLogHeader::SIZE as u64;
    while let Some(scanned) = scanner.next_record() {
        match scanned {
            ScannedRecord::Ok { record, .. } => {
                offsets.push(at);
                at += record.encoded_len() as u64;
            }
            _ => panic!("corrupt record while indexing offsets"),
        }
    }
    offsets
}
