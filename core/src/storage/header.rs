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

use {crate::error::StorageError, core::ops::Range};

/*
    Fragment file header (big-endian)
    ---
    +----------+------------+--------------------+---------+---------------+
    | 8B magic | 4B version | 8B creation time   | 4B pad  | 8B cursor     |
    +----------+------------+--------------------+---------+---------------+
    The cursor cell at CURRENT_POSITION_HEADER is the only mutable part of the header: it is
    rewritten on every append and made durable by the same fsync that covers the record bytes.
*/

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TxLogHeader {
    creation_time_ms: i64,
    cursor: u64,
}

impl TxLogHeader {
    pub const MAGIC: [u8; 8] = *b"JANUSTXL";
    pub const FORMAT_VERSION: u32 = 1;
    const SEG_MAGIC: Range<usize> = 0..8;
    const SEG_VERSION: Range<usize> = 8..12;
    const SEG_CREATION_TIME: Range<usize> = 12..20;
    const SEG_PADDING: Range<usize> = 20..24;
    const SEG_CURSOR: Range<usize> = 24..32;
    /// Offset of the write cursor cell
    pub const CURRENT_POSITION_HEADER: u64 = Self::SEG_CURSOR.start as u64;
    pub const SIZE: usize = Self::SEG_CURSOR.end;
    pub fn new(creation_time_ms: i64) -> Self {
        Self {
            creation_time_ms,
            cursor: Self::SIZE as u64,
        }
    }
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut block = [0u8; Self::SIZE];
        block[Self::SEG_MAGIC].copy_from_slice(&Self::MAGIC);
        block[Self::SEG_VERSION].copy_from_slice(&Self::FORMAT_VERSION.to_be_bytes());
        block[Self::SEG_CREATION_TIME].copy_from_slice(&self.creation_time_ms.to_be_bytes());
        block[Self::SEG_CURSOR].copy_from_slice(&self.cursor.to_be_bytes());
        block
    }
    /// Decode and validate a header block. The cursor is bounds checked against the file length
    /// by the caller (the header itself cannot know it).
    pub fn decode(block: [u8; Self::SIZE]) -> Result<Self, StorageError> {
        let mut version = [0u8; sizeof!(u32)];
        version.copy_from_slice(&block[Self::SEG_VERSION]);
        let mut creation_time = [0u8; sizeof!(i64)];
        creation_time.copy_from_slice(&block[Self::SEG_CREATION_TIME]);
        let mut cursor = [0u8; sizeof!(u64)];
        cursor.copy_from_slice(&block[Self::SEG_CURSOR]);
        if block[Self::SEG_MAGIC] != Self::MAGIC {
            return Err(StorageError::HeaderDecodeCorrupted);
        }
        if u32::from_be_bytes(version) != Self::FORMAT_VERSION {
            return Err(StorageError::HeaderDecodeVersionMismatch);
        }
        let cursor = u64::from_be_bytes(cursor);
        if cursor < Self::SIZE as u64 {
            return Err(StorageError::HeaderDecodeIllegalCursor);
        }
        Ok(Self {
            creation_time_ms: i64::from_be_bytes(creation_time),
            cursor,
        })
    }
    pub fn creation_time_ms(&self) -> i64 {
        self.creation_time_ms
    }
    pub fn cursor(&self) -> u64 {
        self.cursor
    }
    pub fn set_cursor(&mut self, cursor: u64) {
        self.cursor = cursor;
    }
}

#[cfg(test)]
mod tests {
    use {super::TxLogHeader, crate::error::StorageError};

    #[test]
    fn encode_decode() {
        let mut hdr = TxLogHeader::new(1718000000000);
        hdr.set_cursor(4096);
        let decoded = TxLogHeader::decode(hdr.encode()).unwrap();
        assert_eq!(decoded, hdr);
        assert_eq!(decoded.creation_time_ms(), 1718000000000);
        assert_eq!(decoded.cursor(), 4096);
    }

    #[test]
    fn rejects_bad_magic_and_version() {
        let hdr = TxLogHeader::new(1);
        let mut bad_magic = hdr.encode();
        bad_magic[0] ^= 0xFF;
        assert_eq!(
            TxLogHeader::decode(bad_magic),
            Err(StorageError::HeaderDecodeCorrupted)
        );
        let mut bad_version = hdr.encode();
        bad_version[11] = 0xEE;
        assert_eq!(
            TxLogHeader::decode(bad_version),
            Err(StorageError::HeaderDecodeVersionMismatch)
        );
        let mut bad_cursor = hdr.encode();
        bad_cursor[24..32].copy_from_slice(&1u64.to_be_bytes());
        assert_eq!(
            TxLogHeader::decode(bad_cursor),
            Err(StorageError::HeaderDecodeIllegalCursor)
        );
    }
}
