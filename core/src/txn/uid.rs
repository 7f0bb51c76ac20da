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
    crate::util::{self, os},
    core::{cmp::Ordering, fmt},
    std::sync::atomic::{AtomicI32, Ordering as AtomicOrdering},
};

/// A global transaction identifier: an opaque, immutable byte sequence laid out as
/// `server id (US-ASCII, <= 51B) ++ timestamp ms (8B BE) ++ sequence (4B BE)`. Total length is
/// 1..=64 bytes. Two [`Uid`]s are equal iff their byte content is equal; ordering is by timestamp,
/// then sequence.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Uid {
    b: Box<[u8]>,
}

impl Uid {
    /// Maximum encoded length
    pub const MAX_SIZE: usize = 64;
    /// Maximum server id prefix length
    pub const MAX_SERVER_ID_SIZE: usize = Self::MAX_SIZE - Self::SUFFIX_SIZE - 1;
    const SUFFIX_SIZE: usize = sizeof!(i64) + sizeof!(i32);
    pub(crate) fn from_parts(server_id: &str, timestamp_ms: i64, sequence: i32) -> Self {
        debug_assert!(!server_id.is_empty() && server_id.len() <= Self::MAX_SERVER_ID_SIZE);
        let mut b = Vec::with_capacity(server_id.len() + Self::SUFFIX_SIZE);
        b.extend_from_slice(server_id.as_bytes());
        b.extend_from_slice(&timestamp_ms.to_be_bytes());
        b.extend_from_slice(&sequence.to_be_bytes());
        Self { b: b.into() }
    }
    /// Construct from raw bytes (as carried inside a foreign Xid). Only the length bound is
    /// enforced here; the embedded fields are extracted on a best-effort basis.
    pub fn from_bytes(b: &[u8]) -> Option<Self> {
        if b.is_empty() || b.len() > Self::MAX_SIZE {
            return None;
        }
        Some(Self { b: b.into() })
    }
    pub fn as_bytes(&self) -> &[u8] {
        &self.b
    }
    pub fn len(&self) -> usize {
        self.b.len()
    }
    /// The embedded creation timestamp (wall-clock ms), if this Uid is long enough to carry one
    pub fn timestamp_ms(&self) -> Option<i64> {
        let suffix_start = self.b.len().checked_sub(Self::SUFFIX_SIZE)?;
        let mut ts = [0u8; sizeof!(i64)];
        ts.copy_from_slice(&self.b[suffix_start..suffix_start + sizeof!(i64)]);
        Some(i64::from_be_bytes(ts))
    }
    /// The embedded per-process sequence number, if present
    pub fn sequence(&self) -> Option<i32> {
        let seq_start = self.b.len().checked_sub(sizeof!(i32))?;
        if self.b.len() < Self::SUFFIX_SIZE {
            return None;
        }
        let mut seq = [0u8; sizeof!(i32)];
        seq.copy_from_slice(&self.b[seq_start..]);
        Some(i32::from_be_bytes(seq))
    }
    /// The server id prefix, if it is valid ASCII
    pub fn server_id_prefix(&self) -> Option<&[u8]> {
        let prefix_len = self.b.len().checked_sub(Self::SUFFIX_SIZE)?;
        Some(&self.b[..prefix_len])
    }
    /// True if this Uid was generated by the node with the given server id
    pub fn originates_from(&self, server_id: &str) -> bool {
        self.server_id_prefix() == Some(server_id.as_bytes())
    }
}

impl PartialOrd for Uid {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Uid {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.timestamp_ms(), self.sequence())
            .cmp(&(other.timestamp_ms(), other.sequence()))
            .then_with(|| self.b.cmp(&other.b))
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&util::encode_hex(&self.b))
    }
}

impl fmt::Debug for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Uid({self})")
    }
}

/// Generates [`Uid`]s for this node: wall-clock milliseconds plus a process-global monotonic
/// sequence, prefixed with the configured server id.
#[derive(Debug, Clone)]
pub struct UidGenerator {
    server_id: Box<str>,
}

static SEQUENCE: AtomicI32 = AtomicI32::new(1);

impl UidGenerator {
    pub fn new(server_id: &str) -> Self {
        debug_assert!(!server_id.is_empty() && server_id.len() <= Uid::MAX_SERVER_ID_SIZE);
        Self {
            server_id: server_id.into(),
        }
    }
    pub fn generate(&self) -> Uid {
        self.generate_at(os::get_epoch_time_ms())
    }
    /// Generate a Uid with an explicit timestamp. Needed by recovery tests that must control
    /// whether a gtrid looks in-flight or stale.
    pub fn generate_at(&self, timestamp_ms: i64) -> Uid {
        Uid::from_parts(&self.server_id, timestamp_ms, Self::next_sequence())
    }
    fn next_sequence() -> i32 {
        let seq = SEQUENCE.fetch_add(1, AtomicOrdering::SeqCst);
        if seq == i32::MAX {
            // wrap back to 1; uniqueness is preserved by the timestamp advancing
            SEQUENCE.store(1, AtomicOrdering::SeqCst);
        }
        seq
    }
}
