use std::{
    collections::HashMap,
    io,
    sync::{Arc, Mutex},
};

use bytes::{Bytes, BytesMut};

use super::*;

/// Failures injected into a [`MemoryBasedPersistBackend`].
#[derive(Debug, Default, Clone)]
pub struct FaultPlan {
    /// Writes fail once a single file has received this many bytes.
    pub fail_write_after: Option<usize>,
    pub fail_sync: bool,
    pub fail_rename: bool,
    /// Renames onto this one path fail, others go through.
    pub fail_rename_to: Option<PathBuf>,
    /// Every operation fails, as if the medium can't be reached.
    pub unavailable: bool,
}

fn injected(what: &str) -> io::Error {
    io::Error::new(io::ErrorKind::Other, format!("injected {} failure", what))
}

/// Files kept in a shared map. Clones see the same files.
#[derive(Default, Clone, Debug)]
pub struct MemoryBasedPersistBackend {
    files: Arc<Mutex<HashMap<PathBuf, Bytes>>>,
    faults: Arc<Mutex<FaultPlan>>,
}

impl MemoryBasedPersistBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_faults(&self, plan: FaultPlan) {
        *self.faults.lock().unwrap() = plan;
    }

    pub fn clear_faults(&self) {
        self.set_faults(FaultPlan::default());
    }

    /// Raw content of `path`, bypassing fault injection.
    pub fn raw(&self, path: &Path) -> Option<Bytes> {
        self.files.lock().unwrap().get(path).cloned()
    }

    /// Overwrite `path` directly, e.g. to simulate on-medium corruption.
    pub fn put_raw<B: Into<Bytes>>(&self, path: &Path, bytes: B) {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_owned(), bytes.into());
    }

    fn check_available(&self) -> io::Result<()> {
        if self.faults.lock().unwrap().unavailable {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "injected unavailable medium",
            ));
        }
        Ok(())
    }
}

pub struct ReadableMemoryBasedPersist {
    bytes: Bytes,
}

impl ReadAt for ReadableMemoryBasedPersist {
    fn read_at(&self, pos: u64, buf: &mut [u8]) -> io::Result<usize> {
        let pos = (pos as usize).min(self.bytes.len());
        let n = buf.len().min(self.bytes.len() - pos);
        buf[..n].copy_from_slice(&self.bytes[pos..pos + n]);
        Ok(n)
    }
}

impl ReadablePersist for ReadableMemoryBasedPersist {
    fn addr(&self) -> Result<&[u8]> {
        Ok(&self.bytes)
    }

    fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Content lands in the map when the handle is dropped, including a prefix
/// written before an injected failure, like a torn file after a crash.
pub struct WriteableMemoryBasedPersist {
    bytes: BytesMut,
    path: PathBuf,
    b: MemoryBasedPersistBackend,
}

impl Write for WriteableMemoryBasedPersist {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.b.check_available()?;
        let limit = self.b.faults.lock().unwrap().fail_write_after;
        if let Some(limit) = limit {
            let room = limit.saturating_sub(self.bytes.len());
            if room == 0 {
                return Err(injected("write"));
            }
            let n = buf.len().min(room);
            self.bytes.extend_from_slice(&buf[..n]);
            return Ok(n);
        }
        self.bytes.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl WriteablePersist for WriteableMemoryBasedPersist {
    fn sync(&mut self) -> Result<()> {
        self.b.check_available()?;
        if self.b.faults.lock().unwrap().fail_sync {
            return Err(injected("sync").into());
        }
        Ok(())
    }
}

impl Drop for WriteableMemoryBasedPersist {
    fn drop(&mut self) {
        let bytes = std::mem::take(&mut self.bytes).freeze();
        self.b.files.lock().unwrap().insert(self.path.clone(), bytes);
    }
}

impl PersistBackend for MemoryBasedPersistBackend {
    fn open(&self, path: &Path, _enable_mmap: bool) -> Result<Box<dyn ReadablePersist>> {
        self.check_available()?;
        let files = self.files.lock().unwrap();
        let bytes = files
            .get(path)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "file not exist"))?;

        Ok(Box::new(ReadableMemoryBasedPersist {
            bytes: bytes.clone(),
        }))
    }

    fn get_feature(&self) -> PersistFeature {
        PersistFeature {
            mmap_supported: true,
        }
    }

    fn create(&self, path: &Path) -> Result<Box<dyn WriteablePersist>> {
        self.check_available()?;
        Ok(Box::new(WriteableMemoryBasedPersist {
            bytes: BytesMut::new(),
            path: path.to_owned(),
            b: self.clone(),
        }))
    }

    fn remove(&self, path: &Path) -> Result<()> {
        self.check_available()?;
        let mut files = self.files.lock().unwrap();
        files
            .remove(path)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "file not exist"))?;
        Ok(())
    }

    fn make_sure_dir(&self, _path: &Path) -> Result<()> {
        self.check_available()?;
        Ok(())
    }

    fn rename(&self, src: &Path, dst: &Path) -> Result<()> {
        self.check_available()?;
        {
            let faults = self.faults.lock().unwrap();
            if faults.fail_rename || faults.fail_rename_to.as_deref() == Some(dst) {
                return Err(injected("rename").into());
            }
        }
        let mut files = self.files.lock().unwrap();
        let content = files
            .remove(src)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "file not exist"))?;
        files.insert(dst.to_owned(), content);

        Ok(())
    }

    fn list(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        self.check_available()?;
        let files = self.files.lock().unwrap();
        let mut list: Vec<PathBuf> = files
            .keys()
            .filter(|p| p.parent() == Some(dir))
            .cloned()
            .collect();
        list.sort();
        Ok(list)
    }
}
