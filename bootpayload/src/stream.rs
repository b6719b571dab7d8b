// SPDX-FileCopyrightText: 2023-2025 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

//! Byte-range readers for partitions and preloaded memory regions.
//!
//! Everything that parses or loads an image goes through [`ReadAt`] so that a
//! partition on disk, a file on the host, and an image that firmware already
//! placed in memory all look the same. Reads are positional and never depend
//! on a shared cursor.

use std::{
    fs::File,
    io::{self, Read, Seek, SeekFrom},
    sync::{Arc, Mutex},
};

/// Extensions for file-like types to query the file size. No guarantees are
/// made about the state of the underlying file position after performing any
/// operation.
pub trait FileLen {
    fn file_len(&self) -> io::Result<u64>;
}

macro_rules! file_len_blanket_impl {
    ($type:ty) => {
        impl<F: ?Sized + FileLen> FileLen for $type {
            fn file_len(&self) -> io::Result<u64> {
                (**self).file_len()
            }
        }
    };
}

file_len_blanket_impl!(&F);
file_len_blanket_impl!(Arc<F>);
file_len_blanket_impl!(Box<F>);

/// Extensions for file-like types that support reads at specific offsets. No
/// guarantees are made about the state of underlying file position after
/// performing any operation.
pub trait ReadAt: FileLen {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize>;

    fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
        let mut done = 0;

        while done < buf.len() {
            let n = self.read_at(&mut buf[done..], offset + done as u64)?;
            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!(
                        "Expected to read {} bytes at {offset}, but reached EOF after {done} bytes",
                        buf.len(),
                    ),
                ));
            }

            done += n;
        }

        Ok(())
    }
}

macro_rules! read_at_blanket_impl {
    ($type:ty) => {
        impl<R: ?Sized + ReadAt> ReadAt for $type {
            fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
                (**self).read_at(buf, offset)
            }

            fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> io::Result<()> {
                (**self).read_exact_at(buf, offset)
            }
        }
    };
}

read_at_blanket_impl!(&R);
read_at_blanket_impl!(Arc<R>);
read_at_blanket_impl!(Box<R>);

/// A reader wrapper that only allows reading a specific section of a file,
/// eg. a partition inside a full disk image.
pub struct SectionReaderAt<R> {
    inner: R,
    start: u64,
    size: u64,
}

impl<R: ReadAt> SectionReaderAt<R> {
    pub fn new(inner: R, start: u64, size: u64) -> Self {
        Self { inner, start, size }
    }
}

impl<R> FileLen for SectionReaderAt<R> {
    fn file_len(&self) -> io::Result<u64> {
        Ok(self.size)
    }
}

impl<R: ReadAt> ReadAt for SectionReaderAt<R> {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        let to_read = self.size.saturating_sub(offset).min(buf.len() as u64) as usize;
        if to_read == 0 {
            return Ok(0);
        }

        let offset = self.start.checked_add(offset).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "Section offset overflow")
        })?;

        self.inner.read_at(&mut buf[..to_read], offset)
    }
}

/// An image that is already resident in memory, eg. one that an earlier boot
/// stage loaded for us.
pub struct MemoryRegion<T>(T);

impl<T: AsRef<[u8]>> MemoryRegion<T> {
    pub fn new(data: T) -> Self {
        Self(data)
    }

    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T: AsRef<[u8]>> FileLen for MemoryRegion<T> {
    fn file_len(&self) -> io::Result<u64> {
        Ok(self.0.as_ref().len() as u64)
    }
}

impl<T: AsRef<[u8]>> ReadAt for MemoryRegion<T> {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        let data = self.0.as_ref();
        let Ok(start) = usize::try_from(offset) else {
            return Ok(0);
        };
        if start >= data.len() {
            return Ok(0);
        }

        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);

        Ok(n)
    }
}

/// Regular files support positional reads.
impl ReadAt for File {
    /// Read data from offset. The kernel's file position *will* be changed.
    #[cfg(windows)]
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        use std::os::windows::fs::FileExt;
        FileExt::seek_read(self, buf, offset)
    }

    /// Read data from offset. The kernel's file position will *not* be changed.
    #[cfg(unix)]
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        use std::os::unix::fs::FileExt;
        FileExt::read_at(self, buf, offset)
    }
}

impl FileLen for File {
    fn file_len(&self) -> io::Result<u64> {
        (&*self).seek(SeekFrom::End(0))
    }
}

/// A file wrapper that implements [`ReadAt`] on top of [`Read`] and [`Seek`]
/// via a mutex that makes operations single-threaded.
pub struct MutexFile<F>(Mutex<F>);

impl<F> MutexFile<F> {
    pub fn new(file: F) -> Self {
        Self(Mutex::new(file))
    }

    pub fn into_inner(self) -> F {
        self.0.into_inner().unwrap_or_else(|e| e.into_inner())
    }
}

impl<F: Seek> FileLen for MutexFile<F> {
    fn file_len(&self) -> io::Result<u64> {
        let mut inner = self.0.lock().unwrap_or_else(|e| e.into_inner());
        inner.seek(SeekFrom::End(0))
    }
}

impl<F: Read + Seek> ReadAt for MutexFile<F> {
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        let mut inner = self.0.lock().unwrap_or_else(|e| e.into_inner());
        let pos = inner.stream_position()?;

        inner.seek(SeekFrom::Start(offset))?;

        let result = inner.read(buf);

        inner.seek(SeekFrom::Start(pos))?;

        result
    }
}
