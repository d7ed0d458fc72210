use std::io;
use thiserror::Error;

/// Why a byte sequence is not a valid snapshot encoding.
#[derive(Debug, Error, Eq, PartialEq, Clone)]
pub enum DecodeError {
    #[error("truncated at offset {offset}, need {need} more bytes")]
    Truncated { offset: usize, need: usize },
    #[error("bad magic {0:#010x}")]
    BadMagic(u32),
    #[error("unsupported format version {0}")]
    UnsupportedVersion(u16),
    #[error("checksum mismatch, stored {stored:#010x} computed {computed:#010x}")]
    ChecksumMismatch { stored: u32, computed: u32 },
    #[error("invalid utf8 in field {0}")]
    InvalidUtf8(&'static str),
    #[error("invalid length {len} for field {field}")]
    InvalidLength { field: &'static str, len: u64 },
    #[error("duplicate model {model_name}:{version}")]
    DuplicateModel { model_name: String, version: String },
    #[error("stored under {expected} but named {found}")]
    NameMismatch { expected: String, found: String },
    #[error("{0} trailing bytes after snapshot body")]
    TrailingBytes(usize),
}

/// The five failure kinds of the snapshot contract, without payload.
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum ErrorKind {
    NotFound,
    MalformedSnapshot,
    StorageUnavailable,
    Encoding,
    InvariantViolation,
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot {0} not found")]
    NotFound(String),
    #[error("malformed snapshot: {0}")]
    MalformedSnapshot(#[from] DecodeError),
    #[error("storage unavailable: {0}")]
    StorageUnavailable(#[from] io::Error),
    #[error("cannot encode snapshot: {0}")]
    Encoding(String),
    #[error("snapshot {name} sequence {attempted} rejected, stored sequence {stored}")]
    InvariantViolation {
        name: String,
        stored: u64,
        attempted: u64,
    },
}

impl SnapshotError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::MalformedSnapshot(_) => ErrorKind::MalformedSnapshot,
            Self::StorageUnavailable(_) => ErrorKind::StorageUnavailable,
            Self::Encoding(_) => ErrorKind::Encoding,
            Self::InvariantViolation { .. } => ErrorKind::InvariantViolation,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Medium reported that the object does not exist.
    pub fn is_io_not_found(&self) -> bool {
        if let Self::StorageUnavailable(i) = self {
            if io::ErrorKind::NotFound == i.kind() {
                return true;
            }
        }
        false
    }
}

impl PartialEq for SnapshotError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::StorageUnavailable(l0), Self::StorageUnavailable(r0)) => l0.kind() == r0.kind(),
            (Self::MalformedSnapshot(l0), Self::MalformedSnapshot(r0)) => l0 == r0,
            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, SnapshotError>;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    pub fn kinds() {
        let e = SnapshotError::NotFound("prod".into());
        assert!(e.is_not_found());
        assert!(!e.is_io_not_found());

        let e: SnapshotError = io::Error::new(io::ErrorKind::NotFound, "gone").into();
        assert_eq!(e.kind(), ErrorKind::StorageUnavailable);
        assert!(e.is_io_not_found());

        let e: SnapshotError = DecodeError::BadMagic(1).into();
        assert_eq!(e.kind(), ErrorKind::MalformedSnapshot);
        assert_ne!(e, SnapshotError::from(DecodeError::BadMagic(2)));
    }
}
