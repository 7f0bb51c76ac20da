/*
 * Created on Tue Jun 18 2024
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

use {chrono::Utc, core::fmt, std::io::Error as IoError};

/// Returns the current wall-clock time in milliseconds since the epoch
pub fn get_epoch_time_ms() -> i64 {
    Utc::now().timestamp_millis()
}

#[derive(Debug)]
/// A wrapper around [`std::io::Error`] whose equality is defined by the error kind. This lets tests
/// assert on I/O failure modes without chasing platform specific error strings.
pub struct SysIOError(IoError);

impl SysIOError {
    pub fn into_inner(self) -> IoError {
        self.0
    }
    pub fn inner(&self) -> &IoError {
        &self.0
    }
}

impl From<IoError> for SysIOError {
    fn from(e: IoError) -> Self {
        Self(e)
    }
}

impl From<std::io::ErrorKind> for SysIOError {
    fn from(e: std::io::ErrorKind) -> Self {
        Self(e.into())
    }
}

impl fmt::Display for SysIOError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
impl PartialEq for SysIOError {
    fn eq(&self, other: &Self) -> bool {
        self.0.kind() == other.0.kind()
    }
}
