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

/*
    virtual fs impl
    ---
    An in-memory stand-in for the on-disk fragment files. Only what the journal needs: flat
    names, positional read/write, truncate. Fsync is a no-op, so durability assertions are made
    against file *content* after reopen.
*/

use {
    crate::{sync::Lazy, IoResult},
    parking_lot::RwLock,
    std::{
        collections::{hash_map::Entry, HashMap},
        io::{Error, ErrorKind},
    },
};

pub struct VirtualFS {
    files: HashMap<Box<str>, RwLock<VFile>>,
}

#[derive(Debug)]
pub(super) struct VFile {
    read: bool,
    write: bool,
    data: Vec<u8>,
    pos: usize,
}

#[derive(Debug)]
pub struct VFileDescriptor(pub(super) Box<str>);

impl Drop for VFileDescriptor {
    fn drop(&mut self) {
        let _ = VirtualFS::instance().read().with_file_mut(&self.0, |f| {
            f.pos = 0;
            f.read = false;
            f.write = false;
            Ok(())
        });
    }
}

impl VFile {
    fn new(read: bool, write: bool, data: Vec<u8>, pos: usize) -> Self {
        Self {
            read,
            write,
            data,
            pos,
        }
    }
    pub fn truncate(&mut self, to: u64) -> IoResult<()> {
        if !self.write {
            return Err(Error::new(ErrorKind::PermissionDenied, "Write permission denied"));
        }
        if to as usize > self.data.len() {
            self.data.resize(to as usize, 0);
        } else {
            self.data.truncate(to as usize);
        }
        if self.pos > self.data.len() {
            self.pos = self.data.len();
        }
        Ok(())
    }
    pub fn length(&self) -> IoResult<u64> {
        Ok(self.data.len() as u64)
    }
    pub fn cursor(&self) -> IoResult<u64> {
        Ok(self.pos as u64)
    }
    pub fn seek_from_start(&mut self, by: u64) -> IoResult<()> {
        if by > self.data.len() as u64 {
            return Err(Error::new(ErrorKind::InvalidInput, "Can't seek beyond file's end"));
        }
        self.pos = by as usize;
        Ok(())
    }
    pub fn fread_exact(&mut self, buf: &mut [u8]) -> IoResult<()> {
        if !self.read {
            return Err(Error::new(ErrorKind::PermissionDenied, "Read permission denied"));
        }
        if self.data.len() - self.pos < buf.len() {
            return Err(Error::from(ErrorKind::UnexpectedEof));
        }
        buf.copy_from_slice(&self.data[self.pos..self.pos + buf.len()]);
        self.pos += buf.len();
        Ok(())
    }
    pub fn fwrite(&mut self, bytes: &[u8]) -> IoResult<u64> {
        if !self.write {
            return Err(Error::new(ErrorKind::PermissionDenied, "Write permission denied"));
        }
        if self.pos + bytes.len() > self.data.len() {
            self.data.resize(self.pos + bytes.len(), 0);
        }
        self.data[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
        Ok(bytes.len() as _)
    }
}

impl VirtualFS {
    fn new() -> Self {
        Self {
            files: HashMap::new(),
        }
    }
    pub fn instance() -> &'static RwLock<Self> {
        static GLOBAL_VFS: Lazy<RwLock<VirtualFS>, fn() -> RwLock<VirtualFS>> =
            Lazy::new(|| RwLock::new(VirtualFS::new()));
        &GLOBAL_VFS
    }
    pub fn get_data(&self, path: &str) -> IoResult<Vec<u8>> {
        self.with_file(path, |f| Ok(f.data.clone()))
    }
    pub fn fs_exists(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }
    pub fn fs_copy(&mut self, from: &str, to: &str) -> IoResult<()> {
        let data = self.with_file(from, |f| Ok(f.data.clone()))?;
        self.files
            .insert(to.into(), RwLock::new(VFile::new(false, false, data, 0)));
        Ok(())
    }
    pub fn fs_remove_file(&mut self, path: &str) -> IoResult<()> {
        match self.files.remove(path) {
            Some(_) => Ok(()),
            None => Err(Error::from(ErrorKind::NotFound)),
        }
    }
    pub fn fs_fcreate_rw(&mut self, fpath: &str) -> IoResult<VFileDescriptor> {
        match self.files.entry(fpath.into()) {
            Entry::Occupied(_) => Err(Error::new(ErrorKind::AlreadyExists, "the file already exists")),
            Entry::Vacant(v) => {
                v.insert(RwLock::new(VFile::new(true, true, vec![], 0)));
                Ok(VFileDescriptor(fpath.into()))
            }
        }
    }
    pub fn fs_fopen_rw(&mut self, fpath: &str) -> IoResult<VFileDescriptor> {
        self.with_file_mut(fpath, |f| {
            f.read = true;
            f.write = true;
            Ok(VFileDescriptor(fpath.into()))
        })
    }
    pub(super) fn with_file_mut<T>(
        &self,
        fpath: &str,
        f: impl FnOnce(&mut VFile) -> IoResult<T>,
    ) -> IoResult<T> {
        match self.files.get(fpath) {
            Some(file) => f(&mut file.write()),
            None => Err(Error::from(ErrorKind::NotFound)),
        }
    }
    pub(super) fn with_file<T>(
        &self,
        fpath: &str,
        f: impl FnOnce(&VFile) -> IoResult<T>,
    ) -> IoResult<T> {
        match self.files.get(fpath) {
            Some(file) => f(&file.read()),
            None => Err(Error::from(ErrorKind::NotFound)),
        }
    }
}
