use std::{
    fs::{self, File},
    io::{self, Write},
};

use crate::err::SnapshotError;

use super::*;

pub struct LocalFileBasedReadablePersist {
    f: File,
    mmap: Option<memmap2::Mmap>,
    size: u64,
}

impl ReadAt for LocalFileBasedReadablePersist {
    fn read_at(&self, pos: u64, buf: &mut [u8]) -> io::Result<usize> {
        self.f.read_at(pos, buf)
    }
}

impl ReadablePersist for LocalFileBasedReadablePersist {
    fn addr(&self) -> Result<&[u8]> {
        if let Some(m) = &self.mmap {
            return Ok(&m[..]);
        }
        Err(SnapshotError::StorageUnavailable(io::Error::new(
            io::ErrorKind::Unsupported,
            "mmap file not enabled",
        )))
    }

    fn size(&self) -> u64 {
        self.size
    }
}

pub struct LocalFileBasedWriteablePersist {
    f: File,
}

impl Write for LocalFileBasedWriteablePersist {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.f.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.f.flush()
    }
}

impl WriteablePersist for LocalFileBasedWriteablePersist {
    fn sync(&mut self) -> Result<()> {
        self.f.sync_data()?;
        Ok(())
    }
}

#[derive(Default, Debug)]
pub struct LocalFileBasedPersistBackend;

impl PersistBackend for LocalFileBasedPersistBackend {
    fn open(&self, path: &Path, enable_mmap: bool) -> Result<Box<dyn ReadablePersist>> {
        let f = File::open(path)?;
        let size = f.metadata()?.len();
        // empty files can't be mapped
        let mmap = if enable_mmap && size > 0 {
            let mmap = unsafe { memmap2::Mmap::map(&f)? };
            Some(mmap)
        } else {
            None
        };
        Ok(Box::new(LocalFileBasedReadablePersist { f, mmap, size }))
    }

    fn get_feature(&self) -> PersistFeature {
        PersistFeature {
            mmap_supported: true,
        }
    }

    fn create(&self, path: &Path) -> Result<Box<dyn WriteablePersist>> {
        let f = File::create(path)?;
        Ok(Box::new(LocalFileBasedWriteablePersist { f }))
    }

    fn remove(&self, path: &Path) -> Result<()> {
        fs::remove_file(path)?;
        Ok(())
    }

    fn make_sure_dir(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path)?;
        Ok(())
    }

    fn rename(&self, src: &Path, dst: &Path) -> Result<()> {
        fs::rename(src, dst)?;
        // persist the directory entry too
        #[cfg(unix)]
        {
            if let Some(parent) = dst.parent() {
                File::open(parent)?.sync_all()?;
            }
        }
        Ok(())
    }

    fn list(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let entries = match fs::read_dir(dir) {
            Ok(e) => e,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut files = Vec::new();
        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(files)
    }
}
