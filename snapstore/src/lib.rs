//! Durable snapshots of a model serving runtime's state.
//!
//! A [`Snapshot`] lists the loaded models with their versions, worker counts
//! and runtime parameters. A [`SnapshotSerializer`] stores it by name on some
//! medium so the runtime can be brought back after a restart. Stored values
//! are replaced atomically and only by higher sequences.

pub mod backend;
pub mod codec;
pub mod config;
pub mod err;
pub mod manager;
pub mod serializer;
pub mod snapshot;
pub mod util;

pub use config::Config;
pub use err::{ErrorKind, Result, SnapshotError};

pub use codec::{BinarySnapshotCodec, SnapshotCodec};
pub use manager::{Restored, SnapshotManager};
pub use serializer::{open_serializer, PersistSnapshotSerializer, SnapshotSerializer};
pub use snapshot::{ModelEntry, Snapshot};
