/*
 * Created on Wed Jun 19 2024
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
    crate::{config::ConfigError, util::os::SysIOError},
    core::fmt,
};

pub type RuntimeResult<T> = Result<T, Error>;

#[derive(Debug)]
#[cfg_attr(test, derive(PartialEq))]
/// The origin of an error
pub enum Subsystem {
    /// the init system (configuration and service bring-up)
    Init,
    /// the journal (log files, records, multiplexing)
    Journal,
    /// the recovery engine
    Recovery,
}

impl Subsystem {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Journal => "journal",
            Self::Recovery => "recovery",
        }
    }
}

#[derive(Debug)]
#[cfg_attr(test, derive(PartialEq))]
pub enum ErrorKind {
    /// An I/O failure. The journal surfaces these to the caller and marks itself as needing reopen
    IoError(SysIOError),
    /// A storage layer violation (structure, checksum, illegal state, bad argument)
    Storage(StorageError),
    /// A recovery driver failure
    Recovery(RecoveryError),
    /// A configuration error
    Config(ConfigError),
    /// Any other error
    Other(String),
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IoError(e) => write!(f, "io error: {e}"),
            Self::Storage(e) => write!(f, "storage error: {e}"),
            Self::Recovery(e) => write!(f, "recovery error: {e}"),
            Self::Config(e) => write!(f, "{e}"),
            Self::Other(e) => write!(f, "error: {e}"),
        }
    }
}

direct_from! {
    ErrorKind => {
        std::io::Error as IoError,
        std::io::ErrorKind as IoError,
        StorageError as Storage,
        RecoveryError as Recovery,
        ConfigError as Config,
        String as Other,
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[repr(u8)]
/// Storage layer errors
pub enum StorageError {
    // file header
    /// the fragment file header could not be decoded (bad magic or mangled fields)
    HeaderDecodeCorrupted,
    /// the fragment file was written by an incompatible format version
    HeaderDecodeVersionMismatch,
    /// the on-disk write cursor points outside the fragment
    HeaderDecodeIllegalCursor,
    // record
    /// a journal record failed structural or checksum validation
    RecordDecodeCorrupted,
    /// a record length field walks off the end of the fragment; the scan cannot continue
    RecordDecodeIllegalLength,
    // runtime
    /// an operation was issued against a journal that is not open
    JournalNotOpen,
    /// `open` was called on an already open journal
    JournalAlreadyOpen,
    /// an argument violated the record constraints (status, gtrid size, name size)
    InvalidLogArgument,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::HeaderDecodeCorrupted => "header corrupted",
            Self::HeaderDecodeVersionMismatch => "header version mismatch",
            Self::HeaderDecodeIllegalCursor => "header cursor out of bounds",
            Self::RecordDecodeCorrupted => "record corrupted",
            Self::RecordDecodeIllegalLength => "record length out of bounds",
            Self::JournalNotOpen => "journal is not open",
            Self::JournalAlreadyOpen => "journal is already open",
            Self::InvalidLogArgument => "invalid log argument",
        };
        write!(f, "{msg}")
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[repr(u8)]
/// Recovery driver errors
pub enum RecoveryError {
    /// the resource failed to report its in-doubt branches
    ResourceScanFailed,
    /// a branch could not be committed during recovery
    CommitFailed,
    /// a branch could not be rolled back during recovery
    RollbackFailed,
}

impl fmt::Display for RecoveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::ResourceScanFailed => "in-doubt scan failed",
            Self::CommitFailed => "branch commit failed",
            Self::RollbackFailed => "branch rollback failed",
        };
        write!(f, "{msg}")
    }
}

#[derive(Debug)]
#[cfg_attr(test, derive(PartialEq))]
/// An error implementation carrying the failing subsystem and a diagnostic message alongside the
/// error kind. The kind alone decides control flow; origin and dmsg exist for the operator.
pub struct Error {
    kind: ErrorKind,
    origin: Option<Subsystem>,
    dmsg: Option<Box<str>>,
}

impl Error {
    fn _new(kind: ErrorKind, origin: Option<Subsystem>, dmsg: Option<Box<str>>) -> Self {
        Self { kind, origin, dmsg }
    }
    pub fn new(kind: ErrorKind, origin: Subsystem, dmsg: impl Into<Box<str>>) -> Self {
        Self::_new(kind, Some(origin), Some(dmsg.into()))
    }
    pub fn with_kind(kind: ErrorKind) -> Self {
        Self::_new(kind, None, None)
    }
    /// Returns the error kind
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }
    /// Replace the origin in self
    pub fn add_origin(self, origin: Subsystem) -> Self {
        Self::_new(self.kind, Some(origin), self.dmsg)
    }
    /// Replace the dmsg in self
    pub fn add_dmsg(self, dmsg: impl Into<Box<str>>) -> Self {
        Self::_new(self.kind, self.origin, Some(dmsg.into()))
    }
    /// True if this is an I/O failure (including wrapped interruptions)
    pub fn is_io(&self) -> bool {
        matches!(self.kind, ErrorKind::IoError(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.origin {
            Some(ref orig) => write!(f, "{} error: ", orig.as_str())?,
            None => write!(f, "runtime error: ")?,
        }
        if let Some(dmsg) = self.dmsg.as_ref() {
            write!(f, "{dmsg}; ")?;
        }
        write!(f, "{}", self.kind)
    }
}

impl std::error::Error for Error {}

impl<E: Into<ErrorKind>> From<E> for Error {
    fn from(e: E) -> Self {
        Self::_new(e.into(), None, None)
    }
}

/*
    error context
*/

pub trait ErrorContext<T> {
    /// set the origin
    fn set_origin(self, origin: Subsystem) -> RuntimeResult<T>;
    /// set the dmsg
    fn set_dmsg(self, dmsg: impl Into<Box<str>>) -> RuntimeResult<T>;
    /// set the dmsg, lazily evaluated
    fn set_dmsg_fn<F, M>(self, d: F) -> RuntimeResult<T>
    where
        F: FnOnce() -> M,
        M: Into<Box<str>>,
        Self: Sized;
    /// set the origin and dmsg
    fn set_ctx(self, origin: Subsystem, dmsg: impl Into<Box<str>>) -> RuntimeResult<T>;
}

impl<T, E: Into<Error>> ErrorContext<T> for Result<T, E> {
    fn set_origin(self, origin: Subsystem) -> RuntimeResult<T> {
        self.map_err(|e| e.into().add_origin(origin))
    }
    fn set_dmsg(self, dmsg: impl Into<Box<str>>) -> RuntimeResult<T> {
        self.map_err(|e| e.into().add_dmsg(dmsg))
    }
    fn set_dmsg_fn<F, M>(self, d: F) -> RuntimeResult<T>
    where
        F: FnOnce() -> M,
        M: Into<Box<str>>,
    {
        self.map_err(|e| e.into().add_dmsg(d()))
    }
    fn set_ctx(self, origin: Subsystem, dmsg: impl Into<Box<str>>) -> RuntimeResult<T> {
        self.map_err(|e| e.into().add_origin(origin).add_dmsg(dmsg))
    }
}
