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

use {
    super::uid::Uid,
    crate::util,
    core::fmt,
};

/// The XA format identifier stamped on every branch created by this coordinator. Recovery uses it
/// to tell our branches apart from those of other transaction managers sharing a resource.
pub const FORMAT_ID: i32 = 0x4A414E53; // "JANS"

/// A transaction branch identifier as handed to a resource manager
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Xid {
    format_id: i32,
    gtrid: Uid,
    bqual: Box<[u8]>,
}

impl Xid {
    /// A new branch id for this coordinator: the bqual is the resource-scoped branch Uid
    pub fn new(gtrid: Uid, bqual: Uid) -> Self {
        Self {
            format_id: FORMAT_ID,
            gtrid,
            bqual: bqual.as_bytes().into(),
        }
    }
    /// Rebuild a branch id as reported back by a resource manager during an in-doubt scan
    pub fn from_raw(format_id: i32, gtrid: Uid, bqual: &[u8]) -> Self {
        Self {
            format_id,
            gtrid,
            bqual: bqual.into(),
        }
    }
    pub fn format_id(&self) -> i32 {
        self.format_id
    }
    pub fn gtrid(&self) -> &Uid {
        &self.gtrid
    }
    pub fn bqual(&self) -> &[u8] {
        &self.bqual
    }
    /// True if this branch was created by this coordinator
    pub fn matches_format(&self) -> bool {
        self.format_id == FORMAT_ID
    }
}

impl fmt::Display for Xid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:08X}:{}:{}",
            self.format_id,
            self.gtrid,
            util::encode_hex(&self.bqual)
        )
    }
}

#[cfg(test)]
mod tests {
    use {
        super::{Xid, FORMAT_ID},
        crate::txn::uid::UidGenerator,
    };

    #[test]
    fn format_filtering() {
        let gen = UidGenerator::new("n1");
        let ours = Xid::new(gen.generate(), gen.generate());
        assert!(ours.matches_format());
        let foreign = Xid::from_raw(0x1234, gen.generate(), b"other-tm");
        assert!(!foreign.matches_format());
        assert_eq!(ours.format_id(), FORMAT_ID);
    }
}
