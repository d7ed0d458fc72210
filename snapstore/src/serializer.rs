use std::{
    collections::HashMap,
    io::Write,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
};

use bytes::Bytes;
use log::{debug, info, warn};

use crate::{
    backend::{fs::read_all, Backend},
    codec::{BinarySnapshotCodec, SnapshotCodec},
    err::{DecodeError, Result, SnapshotError},
    snapshot::Snapshot,
    util::fname,
    Config,
};

/// Durable named storage of snapshots, implemented once per storage medium.
///
/// Every failure is one of the five [`SnapshotError`] kinds.
pub trait SnapshotSerializer: Send + Sync {
    /// Store `snapshot` under its name, replacing the previous value only
    /// once the new one is completely written.
    ///
    /// The sequence must be strictly greater than the stored one. Saving a
    /// value equal to the stored one is a no-op, so retries are safe.
    fn save_snapshot(&self, snapshot: &Snapshot) -> Result<()>;

    /// The last snapshot saved under `name`.
    fn get_snapshot(&self, name: &str) -> Result<Snapshot>;

    fn list_snapshots(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    /// Sequences of retained superseded snapshots, ascending.
    fn history(&self, _name: &str) -> Result<Vec<u64>> {
        Ok(Vec::new())
    }

    fn get_snapshot_at(&self, name: &str, sequence: u64) -> Result<Snapshot> {
        let current = self.get_snapshot(name)?;
        if current.sequence == sequence {
            Ok(current)
        } else {
            Err(SnapshotError::NotFound(format!("{}@{}", name, sequence)))
        }
    }
}

struct Stored {
    bytes: Bytes,
    snapshot: Snapshot,
}

/// Snapshot files on a [`Backend`], replaced by write, sync and rename.
///
/// ```text
/// {path}/
/// ├── prod.snap           current snapshot of "prod"
/// ├── prod.snap.tmp       staging, only present after an interrupted save
/// └── archive/
///     └── prod.7.snap     superseded, kept while retain_history allows
/// ```
pub struct PersistSnapshotSerializer<C = BinarySnapshotCodec> {
    backend: Backend,
    root: PathBuf,
    codec: C,
    retain_history: usize,
    enable_mmap: bool,
    name_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl PersistSnapshotSerializer<BinarySnapshotCodec> {
    pub fn new(config: &Config, backend: Backend) -> Result<Self> {
        Self::with_codec(config, backend, BinarySnapshotCodec)
    }
}

impl<C: SnapshotCodec> PersistSnapshotSerializer<C> {
    pub fn with_codec(config: &Config, backend: Backend, codec: C) -> Result<Self> {
        backend.fs.make_sure_dir(&config.path)?;
        if config.retain_history > 0 {
            backend.fs.make_sure_dir(&fname::archive_dir(&config.path))?;
        }
        let enable_mmap = config.mmap_reads && backend.fs.get_feature().mmap_supported;

        Ok(Self {
            backend,
            root: config.path.clone(),
            codec,
            retain_history: config.retain_history,
            enable_mmap,
            name_locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path the current snapshot of `name` lives at.
    pub fn path_of(&self, name: &str) -> PathBuf {
        fname::snapshot_name(&self.root, name)
    }

    /// Raw stored bytes of `name`, without decoding.
    pub fn raw_snapshot(&self, name: &str) -> Result<Bytes> {
        if !fname::is_valid_name(name) {
            return Err(SnapshotError::NotFound(name.to_owned()));
        }
        self.read_file(&self.path_of(name))?
            .ok_or_else(|| SnapshotError::NotFound(name.to_owned()))
    }

    /// Lock serializing saves of `name`. Entries nobody holds are dropped,
    /// so the map only keeps names with a save in flight.
    fn name_lock(&self, name: &str) -> Arc<Mutex<()>> {
        let mut locks = self.name_locks.lock().unwrap();
        locks.retain(|_, l| Arc::strong_count(l) > 1);
        locks.entry(name.to_owned()).or_default().clone()
    }

    fn read_file(&self, path: &Path) -> Result<Option<Bytes>> {
        let r = match self.backend.fs.open(path, self.enable_mmap) {
            Ok(r) => r,
            Err(e) if e.is_io_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };
        Ok(Some(read_all(r.as_ref())?))
    }

    fn read_stored(&self, name: &str, path: &Path) -> Result<Option<Stored>> {
        let bytes = match self.read_file(path)? {
            Some(b) => b,
            None => return Ok(None),
        };
        let snapshot = match self.codec.decode(&bytes) {
            Ok(s) => s,
            Err(e) => {
                warn!("snapshot {:?} unreadable: {}", path.as_os_str(), e);
                return Err(e);
            }
        };
        if snapshot.name != name {
            warn!(
                "snapshot {:?} holds {}, expected {}",
                path.as_os_str(),
                snapshot.name,
                name
            );
            return Err(DecodeError::NameMismatch {
                expected: name.to_owned(),
                found: snapshot.name,
            }
            .into());
        }
        Ok(Some(Stored { bytes, snapshot }))
    }

    fn write_file(&self, tmp: &Path, data: &[u8]) -> Result<()> {
        let mut w = self.backend.fs.create(tmp)?;
        w.write_all(data)?;
        w.flush()?;
        w.sync()
    }

    /// Stage `data` next to `dst` and rename it over `dst`.
    fn replace_file(&self, dst: &Path, data: &[u8]) -> Result<()> {
        let tmp = fname::tmp_of(dst);
        let res = self
            .write_file(&tmp, data)
            .and_then(|_| self.backend.fs.rename(&tmp, dst));
        if res.is_err() {
            if let Err(e) = self.backend.fs.remove(&tmp) {
                if !e.is_io_not_found() {
                    warn!("leave staging file {:?}: {}", tmp.as_os_str(), e);
                }
            }
        }
        res
    }

    /// Copy the value about to be superseded into the archive.
    fn archive(&self, prev: &Stored) -> Result<PathBuf> {
        let dst = fname::archive_name(&self.root, &prev.snapshot.name, prev.snapshot.sequence);
        self.replace_file(&dst, &prev.bytes)?;
        Ok(dst)
    }

    /// Drop an archive whose value never got superseded.
    fn unarchive(&self, dst: &Path) {
        if let Err(e) = self.backend.fs.remove(dst) {
            if !e.is_io_not_found() {
                warn!("leave archive {:?}: {}", dst.as_os_str(), e);
            }
        }
    }

    fn prune_archives(&self, name: &str) -> Result<()> {
        let seqs = self.archived_sequences(name)?;
        if seqs.len() > self.retain_history {
            for seq in &seqs[..seqs.len() - self.retain_history] {
                self.backend
                    .fs
                    .remove(&fname::archive_name(&self.root, name, *seq))?;
                debug!("snapshot {} drop archive {}", name, seq);
            }
        }
        Ok(())
    }

    fn archived_sequences(&self, name: &str) -> Result<Vec<u64>> {
        let mut seqs: Vec<u64> = self
            .backend
            .fs
            .list(&fname::archive_dir(&self.root))?
            .iter()
            .filter_map(|p| fname::parse_archive_name(p))
            .filter(|(n, _)| n == name)
            .map(|(_, seq)| seq)
            .collect();
        seqs.sort_unstable();
        Ok(seqs)
    }
}

impl<C: SnapshotCodec> SnapshotSerializer for PersistSnapshotSerializer<C> {
    fn save_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        let name = &snapshot.name;
        if !fname::is_valid_name(name) {
            return Err(SnapshotError::Encoding(format!(
                "invalid snapshot name {:?}",
                name
            )));
        }
        let data = self.codec.encode(snapshot)?;
        let path = self.path_of(name);

        let lock = self.name_lock(name);
        // guards no data, a panic under it leaves nothing to repair
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let prev = self.read_stored(name, &path)?;
        let mut archived = None;
        if let Some(prev) = &prev {
            let stored = prev.snapshot.sequence;
            if stored == snapshot.sequence && prev.snapshot == *snapshot {
                debug!("snapshot {} sequence {} already stored", name, stored);
                return Ok(());
            }
            if snapshot.sequence <= stored {
                warn!(
                    "snapshot {} reject sequence {}, stored {}",
                    name, snapshot.sequence, stored
                );
                return Err(SnapshotError::InvariantViolation {
                    name: name.clone(),
                    stored,
                    attempted: snapshot.sequence,
                });
            }
            if self.retain_history > 0 {
                archived = Some(self.archive(prev)?);
            }
        }

        if let Err(e) = self.replace_file(&path, &data) {
            if let Some(dst) = &archived {
                self.unarchive(dst);
            }
            return Err(e);
        }
        if archived.is_some() {
            // the new value is durable, a stale archive is retried next save
            if let Err(e) = self.prune_archives(name) {
                warn!("snapshot {} prune archives: {}", name, e);
            }
        }
        info!(
            "snapshot {} saved, sequence {}, {} models, {} bytes",
            name,
            snapshot.sequence,
            snapshot.models.len(),
            data.len()
        );
        Ok(())
    }

    fn get_snapshot(&self, name: &str) -> Result<Snapshot> {
        if !fname::is_valid_name(name) {
            return Err(SnapshotError::NotFound(name.to_owned()));
        }
        match self.read_stored(name, &self.path_of(name))? {
            Some(stored) => Ok(stored.snapshot),
            None => Err(SnapshotError::NotFound(name.to_owned())),
        }
    }

    fn list_snapshots(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .backend
            .fs
            .list(&self.root)?
            .iter()
            .filter_map(|p| fname::parse_snapshot_name(p))
            .collect();
        names.sort();
        Ok(names)
    }

    fn history(&self, name: &str) -> Result<Vec<u64>> {
        if !fname::is_valid_name(name) {
            return Ok(Vec::new());
        }
        self.archived_sequences(name)
    }

    fn get_snapshot_at(&self, name: &str, sequence: u64) -> Result<Snapshot> {
        let current = self.get_snapshot(name)?;
        if current.sequence == sequence {
            return Ok(current);
        }
        let path = fname::archive_name(&self.root, name, sequence);
        match self.read_stored(name, &path)? {
            Some(stored) if stored.snapshot.sequence == sequence => Ok(stored.snapshot),
            Some(stored) => Err(DecodeError::NameMismatch {
                expected: format!("{}@{}", name, sequence),
                found: format!("{}@{}", name, stored.snapshot.sequence),
            }
            .into()),
            None => Err(SnapshotError::NotFound(format!("{}@{}", name, sequence))),
        }
    }
}

/// Serializer over the medium `config` selects.
pub fn open_serializer(config: &Config) -> Result<PersistSnapshotSerializer> {
    info!(
        "open {:?} snapshot store at {:?}",
        config.backend,
        config.path.as_os_str()
    );
    PersistSnapshotSerializer::new(config, config.open_backend())
}

#[cfg(test)]
mod test {
    use std::{
        panic::{self, AssertUnwindSafe},
        sync::atomic::{AtomicBool, AtomicU64, Ordering},
        thread,
    };

    use rand::Rng;

    use super::*;
    use crate::{
        backend::fs::{
            local::LocalFileBasedPersistBackend,
            memory::{FaultPlan, MemoryBasedPersistBackend},
        },
        config::test_config,
        err::ErrorKind,
        snapshot::ModelEntry,
    };

    fn memory_serializer() -> (MemoryBasedPersistBackend, PersistSnapshotSerializer) {
        let mem = MemoryBasedPersistBackend::new();
        let ser = PersistSnapshotSerializer::new(&test_config(), Backend::new(mem.clone())).unwrap();
        (mem, ser)
    }

    fn prod(seq: u64) -> Snapshot {
        Snapshot::new("prod", seq, 1_700_000_000_000 + seq)
            .with_model(ModelEntry::new("resnet", "1.0", 4).with_param("batch_size", "8"))
    }

    #[test]
    pub fn end_to_end() {
        let (_, ser) = memory_serializer();
        let s1 = Snapshot::new("prod", 1, 1_700_000_000_000)
            .with_model(ModelEntry::new("resnet", "1.0", 4));
        ser.save_snapshot(&s1).unwrap();
        assert_eq!(ser.get_snapshot("prod").unwrap(), s1);

        let s2 = s1
            .successor(2, 1_700_000_000_500)
            .with_model(ModelEntry::new("bert", "2.0", 2));
        ser.save_snapshot(&s2).unwrap();
        let got = ser.get_snapshot("prod").unwrap();
        assert_eq!(got.sequence, 2);
        assert_eq!(got.models.len(), 2);
        assert_eq!(got.models[0].model_name, "resnet");
        assert_eq!(got.models[1].model_name, "bert");
        assert_eq!(got, s2);
        assert_eq!(ser.list_snapshots().unwrap(), vec!["prod".to_owned()]);
    }

    #[test]
    pub fn unknown_name() {
        let (_, ser) = memory_serializer();
        assert_eq!(
            ser.get_snapshot("never-saved").unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            ser.get_snapshot("../etc/passwd").unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    pub fn idempotent_save() {
        let (mem, ser) = memory_serializer();
        let s = prod(1);
        ser.save_snapshot(&s).unwrap();
        let before = mem.raw(&ser.path_of("prod")).unwrap();
        ser.save_snapshot(&s).unwrap();
        assert_eq!(mem.raw(&ser.path_of("prod")).unwrap(), before);
        assert_eq!(ser.get_snapshot("prod").unwrap(), s);

        // same sequence, other content
        let other = prod(1).with_model(ModelEntry::new("bert", "1", 1));
        assert_eq!(
            ser.save_snapshot(&other).unwrap_err().kind(),
            ErrorKind::InvariantViolation
        );
    }

    #[test]
    pub fn monotonic() {
        let (_, ser) = memory_serializer();
        ser.save_snapshot(&prod(5)).unwrap();
        for seq in [0, 4] {
            let e = ser.save_snapshot(&prod(seq)).unwrap_err();
            assert_eq!(
                e,
                SnapshotError::InvariantViolation {
                    name: "prod".into(),
                    stored: 5,
                    attempted: seq
                }
            );
        }
        assert_eq!(ser.get_snapshot("prod").unwrap(), prod(5));
    }

    #[test]
    pub fn reject_unencodable() {
        let (_, ser) = memory_serializer();
        let e = ser.save_snapshot(&Snapshot::new("a/b", 1, 0)).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::Encoding);
        let dup = prod(1).with_model(ModelEntry::new("resnet", "1.0", 1));
        assert_eq!(ser.save_snapshot(&dup).unwrap_err().kind(), ErrorKind::Encoding);
        assert!(ser.list_snapshots().unwrap().is_empty());
    }

    fn fault_plans() -> Vec<FaultPlan> {
        vec![
            FaultPlan {
                fail_write_after: Some(0),
                ..Default::default()
            },
            FaultPlan {
                fail_write_after: Some(17),
                ..Default::default()
            },
            FaultPlan {
                fail_sync: true,
                ..Default::default()
            },
            FaultPlan {
                fail_rename: true,
                ..Default::default()
            },
        ]
    }

    #[test]
    pub fn atomic_under_faults() {
        for plan in fault_plans() {
            let (mem, ser) = memory_serializer();

            // nothing stored before
            mem.set_faults(plan.clone());
            let e = ser.save_snapshot(&prod(1)).unwrap_err();
            assert_eq!(e.kind(), ErrorKind::StorageUnavailable);
            mem.clear_faults();
            assert!(ser.get_snapshot("prod").unwrap_err().is_not_found());

            ser.save_snapshot(&prod(1)).unwrap();
            mem.set_faults(plan.clone());
            assert!(ser.save_snapshot(&prod(2)).is_err());
            mem.clear_faults();
            assert_eq!(ser.get_snapshot("prod").unwrap(), prod(1), "{:?}", plan);

            // the retry goes through
            ser.save_snapshot(&prod(2)).unwrap();
            assert_eq!(ser.get_snapshot("prod").unwrap(), prod(2));
        }
    }

    #[test]
    pub fn torn_staging_file_ignored() {
        let (mem, ser) = memory_serializer();
        ser.save_snapshot(&prod(1)).unwrap();
        let full = mem.raw(&ser.path_of("prod")).unwrap();
        mem.put_raw(&fname::snapshot_tmp_name(ser.root(), "prod"), full.slice(..10));

        assert_eq!(ser.get_snapshot("prod").unwrap(), prod(1));
        assert_eq!(ser.list_snapshots().unwrap(), vec!["prod".to_owned()]);
        ser.save_snapshot(&prod(2)).unwrap();
        assert_eq!(ser.get_snapshot("prod").unwrap(), prod(2));
        assert!(mem.raw(&fname::snapshot_tmp_name(ser.root(), "prod")).is_none());
    }

    #[test]
    pub fn unavailable_medium() {
        let (mem, ser) = memory_serializer();
        ser.save_snapshot(&prod(1)).unwrap();
        mem.set_faults(FaultPlan {
            unavailable: true,
            ..Default::default()
        });
        assert_eq!(
            ser.get_snapshot("prod").unwrap_err().kind(),
            ErrorKind::StorageUnavailable
        );
        assert_eq!(
            ser.save_snapshot(&prod(2)).unwrap_err().kind(),
            ErrorKind::StorageUnavailable
        );
        mem.clear_faults();
        assert_eq!(ser.get_snapshot("prod").unwrap(), prod(1));
    }

    #[test]
    pub fn corruption_surfaces() {
        let (mem, ser) = memory_serializer();
        ser.save_snapshot(&prod(1)).unwrap();
        let path = ser.path_of("prod");
        let mut bytes = mem.raw(&path).unwrap().to_vec();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x40;
        mem.put_raw(&path, bytes.clone());

        let e = ser.get_snapshot("prod").unwrap_err();
        assert_eq!(e.kind(), ErrorKind::MalformedSnapshot);
        // never overwritten behind the operator's back
        let e = ser.save_snapshot(&prod(2)).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::MalformedSnapshot);
        assert_eq!(&mem.raw(&path).unwrap()[..], &bytes[..]);

        // a valid snapshot stored under the wrong name
        let other = BinarySnapshotCodec
            .encode(&Snapshot::new("staging", 1, 0))
            .unwrap();
        mem.put_raw(&path, other);
        assert!(matches!(
            ser.get_snapshot("prod").unwrap_err(),
            SnapshotError::MalformedSnapshot(DecodeError::NameMismatch { .. })
        ));
    }

    #[test]
    pub fn retention() {
        let mut config = test_config();
        config.set_retain_history(2);
        let mem = MemoryBasedPersistBackend::new();
        let ser = PersistSnapshotSerializer::new(&config, Backend::new(mem)).unwrap();

        for seq in 1..=5 {
            ser.save_snapshot(&prod(seq)).unwrap();
        }
        assert_eq!(ser.history("prod").unwrap(), vec![3, 4]);
        assert_eq!(ser.get_snapshot("prod").unwrap(), prod(5));
        assert_eq!(ser.get_snapshot_at("prod", 4).unwrap(), prod(4));
        assert_eq!(ser.get_snapshot_at("prod", 5).unwrap(), prod(5));
        assert!(ser.get_snapshot_at("prod", 1).unwrap_err().is_not_found());

        // idempotent retry doesn't archive the value against itself
        ser.save_snapshot(&prod(5)).unwrap();
        assert_eq!(ser.history("prod").unwrap(), vec![3, 4]);
        assert_eq!(ser.list_snapshots().unwrap(), vec!["prod".to_owned()]);
    }

    #[test]
    pub fn retention_after_failed_replace() {
        let mut config = test_config();
        config.set_retain_history(2);
        let mem = MemoryBasedPersistBackend::new();
        let ser = PersistSnapshotSerializer::new(&config, Backend::new(mem.clone())).unwrap();

        for seq in 1..=3 {
            ser.save_snapshot(&prod(seq)).unwrap();
        }
        assert_eq!(ser.history("prod").unwrap(), vec![1, 2]);

        // archiving 3 goes through, moving the new value into place does not
        mem.set_faults(FaultPlan {
            fail_rename_to: Some(ser.path_of("prod")),
            ..Default::default()
        });
        assert_eq!(
            ser.save_snapshot(&prod(4)).unwrap_err().kind(),
            ErrorKind::StorageUnavailable
        );
        mem.clear_faults();
        assert_eq!(ser.get_snapshot("prod").unwrap(), prod(3));
        assert_eq!(ser.history("prod").unwrap(), vec![1, 2]);
        assert_eq!(ser.get_snapshot_at("prod", 1).unwrap(), prod(1));

        ser.save_snapshot(&prod(4)).unwrap();
        assert_eq!(ser.history("prod").unwrap(), vec![2, 3]);
        assert_eq!(ser.get_snapshot_at("prod", 3).unwrap(), prod(3));
    }

    #[test]
    pub fn idle_name_locks_dropped() {
        let (_, ser) = memory_serializer();
        for i in 0..64 {
            let name = format!("node-{}", i);
            ser.save_snapshot(&Snapshot::new(name.as_str(), 1, 0)).unwrap();
        }
        assert_eq!(ser.name_locks.lock().unwrap().len(), 1);

        let held = ser.name_lock("prod");
        ser.save_snapshot(&prod(1)).unwrap();
        ser.save_snapshot(&Snapshot::new("other", 1, 0)).unwrap();
        assert!(Arc::ptr_eq(&held, &ser.name_lock("prod")));
    }

    struct PanicOnDecode {
        armed: AtomicBool,
    }

    impl SnapshotCodec for PanicOnDecode {
        fn encode(&self, snapshot: &Snapshot) -> Result<Bytes> {
            BinarySnapshotCodec.encode(snapshot)
        }

        fn decode(&self, data: &[u8]) -> Result<Snapshot> {
            if self.armed.swap(false, Ordering::AcqRel) {
                panic!("decoder bug");
            }
            BinarySnapshotCodec.decode(data)
        }
    }

    #[test]
    pub fn panicking_codec_releases_name() {
        let codec = PanicOnDecode {
            armed: AtomicBool::new(false),
        };
        let mem = MemoryBasedPersistBackend::new();
        let ser =
            PersistSnapshotSerializer::with_codec(&test_config(), Backend::new(mem), codec).unwrap();
        ser.save_snapshot(&prod(1)).unwrap();

        // keep the lock entry alive across the panic
        let held = ser.name_lock("prod");
        ser.codec.armed.store(true, Ordering::Release);
        let res = panic::catch_unwind(AssertUnwindSafe(|| ser.save_snapshot(&prod(2))));
        assert!(res.is_err());
        assert!(held.is_poisoned());

        ser.save_snapshot(&prod(2)).unwrap();
        assert_eq!(ser.get_snapshot("prod").unwrap(), prod(2));
    }

    #[test]
    pub fn concurrent_saves() {
        let (_, ser) = memory_serializer();
        let best = AtomicU64::new(0);
        thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    let mut rng = rand::thread_rng();
                    for _ in 0..50 {
                        let seq = rng.gen_range(1..400);
                        match ser.save_snapshot(&prod(seq)) {
                            Ok(()) => {
                                best.fetch_max(seq, Ordering::AcqRel);
                            }
                            Err(e) => assert_eq!(e.kind(), ErrorKind::InvariantViolation),
                        }
                        let cur = ser.get_snapshot("prod").unwrap();
                        assert_eq!(cur, prod(cur.sequence));
                    }
                });
            }
        });
        let best = best.load(Ordering::Acquire);
        assert_eq!(ser.get_snapshot("prod").unwrap().sequence, best);
    }

    #[test]
    pub fn local_backend() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config();
        config.path = dir.path().join("snapshots");
        config.retain_history = 1;
        config.mmap_reads = true;
        let ser =
            PersistSnapshotSerializer::new(&config, Backend::new(LocalFileBasedPersistBackend))
                .unwrap();

        assert!(ser.get_snapshot("prod").unwrap_err().is_not_found());
        ser.save_snapshot(&prod(1)).unwrap();
        ser.save_snapshot(&prod(2)).unwrap();
        assert_eq!(ser.get_snapshot("prod").unwrap(), prod(2));
        assert_eq!(ser.history("prod").unwrap(), vec![1]);
        assert!(!fname::snapshot_tmp_name(&config.path, "prod").exists());

        // crash after staging, before rename
        std::fs::write(fname::snapshot_tmp_name(&config.path, "prod"), b"SNAP").unwrap();
        assert_eq!(ser.get_snapshot("prod").unwrap(), prod(2));

        // a fresh serializer over the same directory sees the same state
        let reopened = open_serializer(&Config {
            backend: crate::config::BackendKind::Local,
            ..config.clone()
        })
        .unwrap();
        assert_eq!(reopened.get_snapshot("prod").unwrap(), prod(2));
        assert_eq!(reopened.list_snapshots().unwrap(), vec!["prod".to_owned()]);
        reopened.save_snapshot(&prod(3)).unwrap();
        assert_eq!(ser.get_snapshot("prod").unwrap(), prod(3));
    }
}
