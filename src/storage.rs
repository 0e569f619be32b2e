/*
    Copyright (C) 2025-2026  the zxtape-deck authors

    This file is part of ZXTAPE-DECK, a Rust library emulating the
    ZX Spectrum cassette-tape deck.

    For the full copyright notice, see the lib.rs file.
*/
//! Tape storage backends.
//!
//! A [TapeStorage] provides the byte stream a tape container is read from.
//! Two real implementations are selected at load time: [FileStorage] for
//! tapes on disk and [BufferStorage] for tapes already held in memory.
//! [NullStorage] stands in wherever a backend slot must be filled but no
//! tape is present.
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use log::debug;

/// The capability interface of a single tape source.
///
/// The read cursor is owned by the backend; [TapeStorage::seek_set]
/// repositions it absolutely. Reads past the end of the tape return fewer
/// bytes than requested, they are not an error.
pub trait TapeStorage {
    /// Opens the tape source and returns its total size in bytes.
    ///
    /// Opening an already open source rewinds it.
    fn open(&mut self) -> io::Result<u64>;
    /// Closes the tape source. A closed source may be re-opened.
    fn close(&mut self);
    /// Reads up to `buf.len()` bytes at the current cursor, advancing it.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    /// Moves the read cursor to an absolute position.
    ///
    /// Seeking at or past the end of the tape fails.
    fn seek_set(&mut self, pos: u64) -> io::Result<()>;
    /// Total size in bytes as established by [TapeStorage::open].
    fn size(&self) -> u64;
}

/// A storage slot shared between the controller, which swaps backends at
/// load time, and the block decoder, which reads through it.
pub type SharedStorage = Arc<Mutex<Box<dyn TapeStorage + Send>>>;

pub fn share(backend: Box<dyn TapeStorage + Send>) -> SharedStorage {
    Arc::new(Mutex::new(backend))
}

/// A tape stored in a regular file. The size is established by seeking to
/// the end on open.
pub struct FileStorage {
    path: PathBuf,
    file: Option<File>,
    size: u64,
}

impl FileStorage {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        FileStorage { path: path.as_ref().to_path_buf(), file: None, size: 0 }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn file_mut(&mut self) -> io::Result<&mut File> {
        self.file.as_mut().ok_or_else(||
            io::Error::new(io::ErrorKind::NotConnected, "tape file is not open"))
    }
}

impl TapeStorage for FileStorage {
    fn open(&mut self) -> io::Result<u64> {
        let mut file = File::open(&self.path)?;
        let size = file.seek(SeekFrom::End(0))?;
        file.seek(SeekFrom::Start(0))?;
        debug!("opened tape file: {} ({} bytes)", self.path.display(), size);
        self.size = size;
        self.file = Some(file);
        Ok(size)
    }

    fn close(&mut self) {
        self.file = None;
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file_mut()?.read(buf)
    }

    fn seek_set(&mut self, pos: u64) -> io::Result<()> {
        if pos >= self.size {
            return Err(io::Error::new(io::ErrorKind::InvalidInput,
                                      "seek past the end of the tape"));
        }
        self.file_mut()?.seek(SeekFrom::Start(pos)).map(drop)
    }

    fn size(&self) -> u64 {
        self.size
    }
}

/// A tape held in a memory buffer. All accesses are bounds-checked copies.
pub struct BufferStorage {
    data: Vec<u8>,
    pos: u64,
}

impl BufferStorage {
    pub fn new(data: Vec<u8>) -> Self {
        BufferStorage { data, pos: 0 }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }
}

impl TapeStorage for BufferStorage {
    fn open(&mut self) -> io::Result<u64> {
        self.pos = 0;
        Ok(self.data.len() as u64)
    }

    fn close(&mut self) {
        self.pos = 0;
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let pos = self.pos.min(self.data.len() as u64) as usize;
        let count = buf.len().min(self.data.len() - pos);
        buf[..count].copy_from_slice(&self.data[pos..pos + count]);
        self.pos += count as u64;
        Ok(count)
    }

    fn seek_set(&mut self, pos: u64) -> io::Result<()> {
        if pos >= self.data.len() as u64 {
            return Err(io::Error::new(io::ErrorKind::InvalidInput,
                                      "seek past the end of the tape"));
        }
        self.pos = pos;
        Ok(())
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// A backend that holds no tape at all. Reads yield nothing and seeks fail.
#[derive(Default)]
pub struct NullStorage;

impl TapeStorage for NullStorage {
    fn open(&mut self) -> io::Result<u64> {
        Ok(0)
    }

    fn close(&mut self) {}

    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Ok(0)
    }

    fn seek_set(&mut self, _pos: u64) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::InvalidInput, "no tape present"))
    }

    fn size(&self) -> u64 {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn buffer_storage_reads_and_seeks() {
        let mut storage = BufferStorage::new(vec![1, 2, 3, 4, 5]);
        assert_eq!(5, storage.open().unwrap());
        let mut buf = [0u8; 3];
        assert_eq!(3, storage.read(&mut buf).unwrap());
        assert_eq!([1, 2, 3], buf);
        // a short read at the end is not an error
        assert_eq!(2, storage.read(&mut buf).unwrap());
        assert_eq!([4, 5], buf[..2]);
        assert_eq!(0, storage.read(&mut buf).unwrap());
        storage.seek_set(1).unwrap();
        assert_eq!(3, storage.read(&mut buf).unwrap());
        assert_eq!([2, 3, 4], buf);
        assert!(storage.seek_set(5).is_err());
        assert!(storage.seek_set(1000).is_err());
    }

    #[test]
    fn file_storage_sizes_via_seek() -> io::Result<()> {
        let path = std::env::temp_dir().join("zxtape-deck-storage-test.tap");
        {
            let mut f = File::create(&path)?;
            f.write_all(&[0x13, 0x00, 0x00, 0x03])?;
        }
        let mut storage = FileStorage::new(&path);
        assert_eq!(4, storage.open()?);
        assert_eq!(4, storage.size());
        let mut buf = [0u8; 2];
        storage.seek_set(2)?;
        assert_eq!(2, storage.read(&mut buf)?);
        assert_eq!([0x00, 0x03], buf);
        assert!(storage.seek_set(4).is_err());
        storage.close();
        assert!(storage.read(&mut buf).is_err());
        std::fs::remove_file(&path)?;
        Ok(())
    }

    #[test]
    fn null_storage_is_empty() {
        let mut storage = NullStorage;
        assert_eq!(0, storage.open().unwrap());
        let mut buf = [0u8; 8];
        assert_eq!(0, storage.read(&mut buf).unwrap());
        assert!(storage.seek_set(0).is_err());
    }
}
