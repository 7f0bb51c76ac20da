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
    file system
*/

#[cfg(test)]
use super::vfs::{VFileDescriptor, VirtualFS};
use {
    crate::IoResult,
    std::{
        fs as std_fs,
        io::{BufReader, Error, ErrorKind, Read, Seek, SeekFrom, Write},
    },
};

pub struct FileSystem {}

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum FSContext {
    Local,
    Virtual,
}

impl FileSystem {
    #[allow(unused)]
    fn context() -> FSContext {
        // tests default to the virtual file system so journal tests never touch the disk
        local! { static CTX: FSContext = FSContext::Virtual; }
        local_ref!(CTX, |ctx| *ctx)
    }
}

impl FileSystem {
    #[inline(always)]
    pub fn read(path: &str) -> IoResult<Vec<u8>> {
        #[cfg(test)]
        {
            match Self::context() {
                FSContext::Local => {}
                FSContext::Virtual => return VirtualFS::instance().read().get_data(path),
            }
        }
        std_fs::read(path)
    }
    #[inline(always)]
    pub fn copy(from: &str, to: &str) -> IoResult<()> {
        #[cfg(test)]
        {
            match Self::context() {
                FSContext::Local => {}
                FSContext::Virtual => return VirtualFS::instance().write().fs_copy(from, to),
            }
        }
        std_fs::copy(from, to).map(|_| ())
    }
    #[inline(always)]
    pub fn remove_file(path: &str) -> IoResult<()> {
        #[cfg(test)]
        {
            match Self::context() {
                FSContext::Local => {}
                FSContext::Virtual => return VirtualFS::instance().write().fs_remove_file(path),
            }
        }
        std_fs::remove_file(path)
    }
    #[inline(always)]
    pub fn exists(path: &str) -> IoResult<bool> {
        #[cfg(test)]
        {
            match Self::context() {
                FSContext::Local => {}
                FSContext::Virtual => return Ok(VirtualFS::instance().read().fs_exists(path)),
            }
        }
        Ok(std_fs::metadata(path).is_ok())
    }
}

/*
    file traits
*/

pub trait FileRead {
    fn fread_exact(&mut self, buf: &mut [u8]) -> IoResult<()>;
    fn fread_exact_block<const N: usize>(&mut self) -> IoResult<[u8; N]> {
        let mut blk = [0; N];
        self.fread_exact(&mut blk).map(|_| blk)
    }
}

pub trait FileWrite {
    fn fwrite(&mut self, buf: &[u8]) -> IoResult<u64>;
    fn fwrite_all(&mut self, buf: &[u8]) -> IoResult<()> {
        self.fwrite_all_count(buf).1
    }
    fn fwrite_all_count(&mut self, buf: &[u8]) -> (u64, IoResult<()>) {
        let len = buf.len() as u64;
        let mut written = 0;
        while written != len {
            match self.fwrite(&buf[written as usize..]) {
                Ok(0) => {
                    return (
                        written,
                        Err(Error::new(
                            ErrorKind::WriteZero,
                            format!("could only write {} of {} bytes", written, buf.len()),
                        )),
                    )
                }
                Ok(n) => written += n,
                Err(e) => return (written, Err(e)),
            }
        }
        (written, Ok(()))
    }
}

pub trait FileWriteExt {
    fn fsync_all(&mut self) -> IoResult<()>;
    fn f_truncate(&mut self, new_size: u64) -> IoResult<()>;
}

pub trait FileExt {
    fn f_len(&self) -> IoResult<u64>;
    fn f_cursor(&mut self) -> IoResult<u64>;
    fn f_seek_start(&mut self, offset: u64) -> IoResult<()>;
}

/*
    file impls
*/

impl FileWrite for File {
    fn fwrite(&mut self, buf: &[u8]) -> IoResult<u64> {
        self.f.fwrite(buf)
    }
}

impl FileRead for File {
    fn fread_exact(&mut self, buf: &mut [u8]) -> IoResult<()> {
        self.f.fread_exact(buf)
    }
}

impl FileWriteExt for File {
    fn fsync_all(&mut self) -> IoResult<()> {
        self.f.fsync_all()
    }
    fn f_truncate(&mut self, new_size: u64) -> IoResult<()> {
        self.f.f_truncate(new_size)
    }
}

impl FileExt for File {
    fn f_len(&self) -> IoResult<u64> {
        self.f.f_len()
    }
    fn f_cursor(&mut self) -> IoResult<u64> {
        self.f.f_cursor()
    }
    fn f_seek_start(&mut self, offset: u64) -> IoResult<()> {
        self.f.f_seek_start(offset)
    }
}

/*
    impls for local file
*/

trait LocalFile {
    fn _mut(&mut self) -> &mut std_fs::File;
    fn _ref(&self) -> &std_fs::File;
}

impl LocalFile for BufReader<std_fs::File> {
    fn _mut(&mut self) -> &mut std_fs::File {
        self.get_mut()
    }
    fn _ref(&self) -> &std_fs::File {
        self.get_ref()
    }
}

impl LocalFile for std_fs::File {
    fn _mut(&mut self) -> &mut std_fs::File {
        self
    }
    fn _ref(&self) -> &std_fs::File {
        self
    }
}

impl<W: Write> FileWrite for W {
    fn fwrite(&mut self, buf: &[u8]) -> IoResult<u64> {
        self.write(buf).map(|x| x as u64)
    }
}

impl<R: Read> FileRead for R {
    fn fread_exact(&mut self, buf: &mut [u8]) -> IoResult<()> {
        self.read_exact(buf)
    }
}

impl<Lf: LocalFile> FileWriteExt for Lf {
    fn fsync_all(&mut self) -> IoResult<()> {
        self._mut().sync_all()
    }
    fn f_truncate(&mut self, new_size: u64) -> IoResult<()> {
        self._mut().set_len(new_size)
    }
}

impl<Lf: LocalFile> FileExt for Lf {
    fn f_len(&self) -> IoResult<u64> {
        self._ref().metadata().map(|md| md.len())
    }
    fn f_cursor(&mut self) -> IoResult<u64> {
        self._mut().stream_position()
    }
    fn f_seek_start(&mut self, offset: u64) -> IoResult<()> {
        self._mut().seek(SeekFrom::Start(offset)).map(|_| ())
    }
}

/*
    impls for vfile
*/

#[cfg(test)]
impl FileWrite for AnyFile {
    fn fwrite(&mut self, buf: &[u8]) -> IoResult<u64> {
        match self {
            Self::Local(lf) => lf.fwrite(buf),
            Self::Virtual(vf) => VirtualFS::instance()
                .read()
                .with_file_mut(&vf.0, |f| f.fwrite(buf)),
        }
    }
}

#[cfg(test)]
impl FileRead for AnyFile {
    fn fread_exact(&mut self, buf: &mut [u8]) -> IoResult<()> {
        match self {
            Self::Local(lf) => lf.fread_exact(buf),
            Self::Virtual(vf) => VirtualFS::instance()
                .read()
                .with_file_mut(&vf.0, |f| f.fread_exact(buf)),
        }
    }
}

#[cfg(test)]
impl FileWriteExt for AnyFile {
    fn fsync_all(&mut self) -> IoResult<()> {
        match self {
            Self::Local(lf) => lf.fsync_all(),
            Self::Virtual(_) => Ok(()),
        }
    }
    fn f_truncate(&mut self, new_size: u64) -> IoResult<()> {
        match self {
            Self::Local(lf) => lf.f_truncate(new_size),
            Self::Virtual(vf) => VirtualFS::instance()
                .read()
                .with_file_mut(&vf.0, |f| f.truncate(new_size)),
        }
    }
}

#[cfg(test)]
impl FileExt for AnyFile {
    fn f_len(&self) -> IoResult<u64> {
        match self {
            Self::Local(lf) => lf.f_len(),
            Self::Virtual(vf) => VirtualFS::instance().read().with_file(&vf.0, |f| f.length()),
        }
    }
    fn f_cursor(&mut self) -> IoResult<u64> {
        match self {
            Self::Local(lf) => lf.f_cursor(),
            Self::Virtual(vf) => VirtualFS::instance().read().with_file(&vf.0, |f| f.cursor()),
        }
    }
    fn f_seek_start(&mut self, offset: u64) -> IoResult<()> {
        match self {
            Self::Local(lf) => lf.f_seek_start(offset),
            Self::Virtual(vf) => VirtualFS::instance()
                .read()
                .with_file_mut(&vf.0, |f| f.seek_from_start(offset)),
        }
    }
}

/*
    file abstraction
*/

#[cfg(test)]
#[derive(Debug)]
enum AnyFile {
    Local(std_fs::File),
    Virtual(VFileDescriptor),
}

#[derive(Debug)]
pub struct File {
    #[cfg(test)]
    f: AnyFile,
    #[cfg(not(test))]
    f: std_fs::File,
}

impl File {
    pub fn open(path: &str) -> IoResult<Self> {
        #[cfg(test)]
        {
            match FileSystem::context() {
                FSContext::Local => {}
                FSContext::Virtual => {
                    return VirtualFS::instance()
                        .write()
                        .fs_fopen_rw(path)
                        .map(|f| Self {
                            f: AnyFile::Virtual(f),
                        })
                }
            }
        }
        let file = std_fs::File::options().read(true).write(true).open(path)?;
        Ok(Self {
            #[cfg(test)]
            f: AnyFile::Local(file),
            #[cfg(not(test))]
            f: file,
        })
    }
    pub fn create(path: &str) -> IoResult<Self> {
        #[cfg(test)]
        {
            match FileSystem::context() {
                FSContext::Local => {}
                FSContext::Virtual => {
                    return VirtualFS::instance()
                        .write()
                        .fs_fcreate_rw(path)
                        .map(|f| Self {
                            f: AnyFile::Virtual(f),
                        })
                }
            }
        }
        let file = std_fs::File::options()
            .create_new(true)
            .read(true)
            .write(true)
            .open(path)?;
        Ok(Self {
            #[cfg(test)]
            f: AnyFile::Local(file),
            #[cfg(not(test))]
            f: file,
        })
    }
}
