use std::{
    fmt::Debug,
    io::{Read, Write},
    path::{Path, PathBuf},
};

use bytes::Bytes;
use positioned_io::ReadAt;

use crate::err::Result;

pub trait ReadablePersist: ReadAt + Send + Sync {
    /// Whole content as one slice, only when the file is mapped.
    fn addr(&self) -> Result<&[u8]>;
    fn size(&self) -> u64;
}

/// Sequential [`Read`] over a [`ReadablePersist`].
pub struct ExtReader<'a> {
    pub(super) r: &'a dyn ReadablePersist,
    pub(super) offset: u64,
    pub(super) size: u64,
}

impl<'a> ExtReader<'a> {
    pub fn new(r: &'a dyn ReadablePersist, offset: u64, size: u64) -> Self {
        Self { r, offset, size }
    }
}

impl<'a> Read for ExtReader<'a> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.offset >= self.size {
            return Ok(0);
        }
        let left = (self.size - self.offset) as usize;
        let len = buf.len().min(left);
        let n = self.r.read_at(self.offset, &mut buf[..len])?;
        self.offset += n as u64;
        Ok(n)
    }
}

/// Full content of `r`, through the mapping when there is one.
pub fn read_all(r: &dyn ReadablePersist) -> Result<Bytes> {
    if let Ok(slice) = r.addr() {
        return Ok(Bytes::copy_from_slice(slice));
    }
    let size = r.size();
    let mut buf = Vec::with_capacity(size as usize);
    ExtReader::new(r, 0, size).read_to_end(&mut buf)?;
    Ok(buf.into())
}

pub trait WriteablePersist: Write + Send {
    /// Data written so far is durable once this returns.
    fn sync(&mut self) -> Result<()>;
}

pub struct PersistFeature {
    pub mmap_supported: bool,
}

/// A storage medium addressed by paths.
///
/// `rename` must replace `dst` atomically: a reader of `dst` sees either the
/// old or the new content, and a crash leaves one of the two in place.
pub trait PersistBackend: Send + Sync + Debug {
    fn open(&self, path: &Path, enable_mmap: bool) -> Result<Box<dyn ReadablePersist>>;
    fn get_feature(&self) -> PersistFeature;
    fn create(&self, path: &Path) -> Result<Box<dyn WriteablePersist>>;
    fn remove(&self, path: &Path) -> Result<()>;
    fn make_sure_dir(&self, path: &Path) -> Result<()>;
    fn rename(&self, src: &Path, dst: &Path) -> Result<()>;
    /// Files directly under `dir`. A missing directory is empty.
    fn list(&self, dir: &Path) -> Result<Vec<PathBuf>>;
}

pub mod local;
pub mod memory;
