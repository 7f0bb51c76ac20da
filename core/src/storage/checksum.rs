/*
 * Created on Mon Jun 24 2024
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

//! # Checksum utils
//!
//! This module contains utils for handling checksums
//!

use {
    crc::{Crc, Digest, CRC_32_ISO_HDLC},
    std::fmt,
};

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

#[derive(Clone)]
/// Streaming CRC-32 over the checksummed range of a journal record
pub struct SCrc32 {
    digest: Digest<'static, u32>,
}

impl Default for SCrc32 {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SCrc32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SCrc32")
            .field("digest", &self.digest.clone().finalize())
            .finish()
    }
}

impl SCrc32 {
    pub const fn new() -> Self {
        Self {
            digest: CRC32.digest(),
        }
    }
    pub fn update(&mut self, b: &[u8]) {
        self.digest.update(b)
    }
    pub fn finish(self) -> u32 {
        self.digest.finalize()
    }
}
