/*
 * Created on Tue Jun 25 2024
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
    super::checksum::SCrc32,
    crate::{
        error::StorageError,
        txn::{uid::Uid, TxStatus},
        util::os,
    },
    chrono::DateTime,
    core::{fmt, ops::Range},
    std::sync::atomic::{AtomicI32, Ordering},
};

/*
    A transaction status record (big-endian)
    ---
    +-----------+------------------+------------------+---------+--------------+----------+
    | 4B status | 4B record length | 4B header length | 8B time | 4B sequence  | 4B crc32 |
    +-----------+------------------+------------------+---------+--------------+----------+
    | 1B gtrid size | gtrid | 4B name count | (2B len + US-ASCII bytes)* | 4B end marker  |
    +---------------+-------+---------------+----------------------------+----------------+

    `record_length` counts every byte after its own field through the end marker. The CRC-32
    covers `header_length` through the last name byte and excludes the crc32 field itself, so an
    in-place status rewrite keeps a record valid while everything behind the fixed header is
    tamper-evident.
*/

#[derive(Debug, Clone, PartialEq)]
pub struct TxRecord {
    status: TxStatus,
    time_ms: i64,
    sequence: i32,
    crc32: u32,
    gtrid: Uid,
    unique_names: Vec<Box<str>>,
}

/// Outcome of decoding one record from a fragment buffer
#[derive(Debug)]
pub(super) struct DecodedRecord {
    pub record: TxRecord,
    pub crc_ok: bool,
    /// offset of the byte right after the end marker
    pub next: usize,
}

static RECORD_SEQUENCE: AtomicI32 = AtomicI32::new(1);

impl TxRecord {
    pub const OFFSET_STATUS: Range<usize> = 0..4;
    pub const OFFSET_RECORD_LENGTH: Range<usize> = 4..8;
    pub const OFFSET_HEADER_LENGTH: Range<usize> = 8..12;
    pub const OFFSET_TIME: Range<usize> = 12..20;
    pub const OFFSET_SEQUENCE: Range<usize> = 20..24;
    pub const OFFSET_CRC32: Range<usize> = 24..28;
    pub const OFFSET_GTRID_SIZE: usize = 28;
    /// Value of the `header_length` field: the fixed part through `gtrid_size`
    pub const FIXED_HEADER_LENGTH: i32 = (Self::OFFSET_GTRID_SIZE + 1) as i32;
    pub const END_MARKER: i32 = 0x4A4E5321;
    /// Smallest legal `record_length`: fixed tail + 1 gtrid byte + name count + end marker
    const MIN_RECORD_LENGTH: i32 = Self::FIXED_HEADER_LENGTH - Self::OFFSET_HEADER_LENGTH.start as i32
        + 1
        + sizeof!(i32) as i32
        + sizeof!(i32) as i32;
    const MAX_NAME_SIZE: usize = i16::MAX as usize;

    /// Build a record stamped with the current wall-clock time and the next process-global
    /// sequence number
    pub fn create(
        status: TxStatus,
        gtrid: Uid,
        unique_names: &[&str],
    ) -> Result<Self, StorageError> {
        Self::create_at(status, gtrid, unique_names, os::get_epoch_time_ms())
    }
    /// Build a record with an explicit timestamp (recovery re-logs and tests)
    pub fn create_at(
        status: TxStatus,
        gtrid: Uid,
        unique_names: &[&str],
        time_ms: i64,
    ) -> Result<Self, StorageError> {
        if time_ms <= 0 {
            return Err(StorageError::InvalidLogArgument);
        }
        let mut names: Vec<Box<str>> = Vec::with_capacity(unique_names.len());
        for name in unique_names {
            if name.is_empty() || name.len() > Self::MAX_NAME_SIZE || !name.is_ascii() {
                return Err(StorageError::InvalidLogArgument);
            }
            if !names.iter().any(|n| &**n == *name) {
                names.push((*name).into());
            }
        }
        let mut me = Self {
            status,
            time_ms,
            sequence: Self::next_sequence(),
            crc32: 0,
            gtrid,
            unique_names: names,
        };
        me.crc32 = me.compute_crc32();
        Ok(me)
    }
    fn next_sequence() -> i32 {
        let seq = RECORD_SEQUENCE.fetch_add(1, Ordering::SeqCst);
        if seq == i32::MAX {
            RECORD_SEQUENCE.store(1, Ordering::SeqCst);
        }
        seq
    }
    pub fn status(&self) -> TxStatus {
        self.status
    }
    pub fn time_ms(&self) -> i64 {
        self.time_ms
    }
    pub fn sequence(&self) -> i32 {
        self.sequence
    }
    pub fn crc32(&self) -> u32 {
        self.crc32
    }
    pub fn gtrid(&self) -> &Uid {
        &self.gtrid
    }
    pub fn unique_names(&self) -> &[Box<str>] {
        &self.unique_names
    }
    pub fn has_unique_name(&self, name: &str) -> bool {
        self.unique_names.iter().any(|n| &**n == name)
    }
    /// A copy of this record restricted to the given resource names (multiplexed merge)
    pub fn with_unique_names(&self, names: Vec<Box<str>>) -> Self {
        let mut me = self.clone();
        me.unique_names = names;
        me.crc32 = me.compute_crc32();
        me
    }
    /*
        codec
    */

    fn record_length(&self) -> i32 {
        let names: usize = self
            .unique_names
            .iter()
            .map(|n| sizeof!(i16) + n.len())
            .sum();
        (Self::FIXED_HEADER_LENGTH as usize - Self::OFFSET_HEADER_LENGTH.start
            + self.gtrid.len()
            + sizeof!(i32)
            + names
            + sizeof!(i32)) as i32
    }
    /// Total on-disk footprint of this record
    pub fn encoded_len(&self) -> usize {
        Self::OFFSET_HEADER_LENGTH.start + self.record_length() as usize
    }
    fn compute_crc32(&self) -> u32 {
        let mut crc = SCrc32::new();
        crc.update(&Self::FIXED_HEADER_LENGTH.to_be_bytes());
        crc.update(&self.time_ms.to_be_bytes());
        crc.update(&self.sequence.to_be_bytes());
        crc.update(&[self.gtrid.len() as u8]);
        crc.update(self.gtrid.as_bytes());
        crc.update(&(self.unique_names.len() as i32).to_be_bytes());
        for name in &self.unique_names {
            crc.update(&(name.len() as i16).to_be_bytes());
            crc.update(name.as_bytes());
        }
        crc.finish()
    }
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        buf.extend_from_slice(&self.status.value_i32().to_be_bytes());
        buf.extend_from_slice(&self.record_length().to_be_bytes());
        buf.extend_from_slice(&Self::FIXED_HEADER_LENGTH.to_be_bytes());
        buf.extend_from_slice(&self.time_ms.to_be_bytes());
        buf.extend_from_slice(&self.sequence.to_be_bytes());
        buf.extend_from_slice(&self.crc32.to_be_bytes());
        buf.push(self.gtrid.len() as u8);
        buf.extend_from_slice(self.gtrid.as_bytes());
        buf.extend_from_slice(&(self.unique_names.len() as i32).to_be_bytes());
        for name in &self.unique_names {
            buf.extend_from_slice(&(name.len() as i16).to_be_bytes());
            buf.extend_from_slice(name.as_bytes());
        }
        buf.extend_from_slice(&Self::END_MARKER.to_be_bytes());
        debug_assert_eq!(buf.len(), self.encoded_len());
        buf
    }
    /// Decode the record starting at `at`, bounded by `limit` (the fragment's persisted write
    /// cursor).
    ///
    /// - A `record_length` that walks outside `at + 8 ..= limit` (or a fixed part cut short by
    ///   `limit`) fails with [`StorageError::RecordDecodeIllegalLength`]: the skip target cannot
    ///   be trusted, so the scan must stop.
    /// - Every other violation fails with [`StorageError::RecordDecodeCorrupted`]; the caller may
    ///   advance to `at + 8 + record_length` and keep scanning.
    /// - CRC validation is reported in [`DecodedRecord::crc_ok`] rather than enforced here, so
    ///   `read_records(include_invalid)` can surface structurally sound but mismatching records.
    pub(super) fn decode(buf: &[u8], at: usize, limit: usize) -> Result<DecodedRecord, StorageError> {
        let i32_at = |pos: usize| -> i32 {
            let mut b = [0u8; sizeof!(i32)];
            b.copy_from_slice(&buf[pos..pos + sizeof!(i32)]);
            i32::from_be_bytes(b)
        };
        if limit - at < Self::OFFSET_HEADER_LENGTH.start {
            return Err(StorageError::RecordDecodeIllegalLength);
        }
        let status_raw = i32_at(at + Self::OFFSET_STATUS.start);
        let record_length = i32_at(at + Self::OFFSET_RECORD_LENGTH.start);
        if record_length < Self::MIN_RECORD_LENGTH
            || (record_length as usize) > limit - at - Self::OFFSET_HEADER_LENGTH.start
        {
            return Err(StorageError::RecordDecodeIllegalLength);
        }
        let total = Self::OFFSET_HEADER_LENGTH.start + record_length as usize;
        let next = at + total;
        // structural checks; every failure from here on is skippable
        let status = match TxStatus::try_from_raw(status_raw) {
            Some(status) => status,
            None => return Err(StorageError::RecordDecodeCorrupted),
        };
        let header_length = i32_at(at + Self::OFFSET_HEADER_LENGTH.start);
        let mut time = [0u8; sizeof!(i64)];
        time.copy_from_slice(&buf[at + Self::OFFSET_TIME.start..at + Self::OFFSET_TIME.end]);
        let time_ms = i64::from_be_bytes(time);
        let sequence = i32_at(at + Self::OFFSET_SEQUENCE.start);
        let fixed_fields_ok = okay! {
            header_length == Self::FIXED_HEADER_LENGTH,
            time_ms > 0,
            sequence > 0,
        };
        if !fixed_fields_ok {
            return Err(StorageError::RecordDecodeCorrupted);
        }
        let mut crc32 = [0u8; sizeof!(u32)];
        crc32.copy_from_slice(&buf[at + Self::OFFSET_CRC32.start..at + Self::OFFSET_CRC32.end]);
        let crc32 = u32::from_be_bytes(crc32);
        let gtrid_size = buf[at + Self::OFFSET_GTRID_SIZE] as i8;
        if gtrid_size < 1 || gtrid_size as usize > Uid::MAX_SIZE {
            return Err(StorageError::RecordDecodeCorrupted);
        }
        let gtrid_size = gtrid_size as usize;
        let mut pos = at + Self::OFFSET_GTRID_SIZE + 1;
        // the end marker bounds all variable length parts
        let end_marker_at = next - sizeof!(i32);
        if pos + gtrid_size + sizeof!(i32) > end_marker_at {
            return Err(StorageError::RecordDecodeCorrupted);
        }
        let gtrid = match Uid::from_bytes(&buf[pos..pos + gtrid_size]) {
            Some(gtrid) => gtrid,
            None => return Err(StorageError::RecordDecodeCorrupted),
        };
        pos += gtrid_size;
        let names_count = i32_at(pos);
        pos += sizeof!(i32);
        if names_count < 0 {
            return Err(StorageError::RecordDecodeCorrupted);
        }
        let mut unique_names = Vec::with_capacity(names_count as usize);
        for _ in 0..names_count {
            if pos + sizeof!(i16) > end_marker_at {
                return Err(StorageError::RecordDecodeCorrupted);
            }
            let mut len = [0u8; sizeof!(i16)];
            len.copy_from_slice(&buf[pos..pos + sizeof!(i16)]);
            let len = i16::from_be_bytes(len);
            pos += sizeof!(i16);
            if len < 0 || pos + len as usize > end_marker_at {
                return Err(StorageError::RecordDecodeCorrupted);
            }
            let name = match core::str::from_utf8(&buf[pos..pos + len as usize]) {
                Ok(name) if name.is_ascii() => name,
                _ => return Err(StorageError::RecordDecodeCorrupted),
            };
            unique_names.push(name.into());
            pos += len as usize;
        }
        if pos != end_marker_at || i32_at(end_marker_at) != Self::END_MARKER {
            return Err(StorageError::RecordDecodeCorrupted);
        }
        let record = Self {
            status,
            time_ms,
            sequence,
            crc32,
            gtrid,
            unique_names,
        };
        let crc_ok = record.compute_crc32() == crc32;
        Ok(DecodedRecord {
            record,
            crc_ok,
            next,
        })
    }
    /// The skip target for a structurally corrupt record: trusts nothing but `record_length`
    pub(super) fn skip_target(buf: &[u8], at: usize) -> usize {
        let mut b = [0u8; sizeof!(i32)];
        b.copy_from_slice(&buf[at + Self::OFFSET_RECORD_LENGTH.start..at + Self::OFFSET_RECORD_LENGTH.end]);
        at + Self::OFFSET_HEADER_LENGTH.start + i32::from_be_bytes(b) as usize
    }
}

impl fmt::Display for TxRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let time = DateTime::from_timestamp_millis(self.time_ms)
            .map(|dt| dt.to_rfc3339())
            .unwrap_or_else(|| self.time_ms.to_string());
        write!(
            f,
            "{} gtrid={} seq={} at {} names={:?}",
            self.status, self.gtrid, self.sequence, time, self.unique_names
        )
    }
}
