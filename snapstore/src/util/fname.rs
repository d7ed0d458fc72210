use std::path::{Path, PathBuf};

pub const SNAPSHOT_EXT: &str = "snap";
const TMP_EXT: &str = "tmp";
const MAX_NAME_LEN: usize = 200;

/// Snapshot names double as file names: ascii alphanumerics, `-` and `_`.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

pub fn snapshot_name(root: &Path, name: &str) -> PathBuf {
    let mut base = root.join(name);
    base.set_extension(SNAPSHOT_EXT);
    base
}

pub fn snapshot_tmp_name(root: &Path, name: &str) -> PathBuf {
    tmp_of(&snapshot_name(root, name))
}

/// Where `path` is staged before being renamed into place.
pub fn tmp_of(path: &Path) -> PathBuf {
    let mut s = path.as_os_str().to_owned();
    s.push(".");
    s.push(TMP_EXT);
    s.into()
}

pub fn archive_dir(root: &Path) -> PathBuf {
    root.join("archive")
}

pub fn archive_name(root: &Path, name: &str, seq: u64) -> PathBuf {
    archive_dir(root).join(format!("{}.{}.{}", name, seq, SNAPSHOT_EXT))
}

/// `prod.snap` -> `prod`. Temporary files and anything else yield `None`.
pub fn parse_snapshot_name(path: &Path) -> Option<String> {
    let file = path.file_name()?.to_str()?;
    let name = file.strip_suffix(".snap")?;
    if is_valid_name(name) {
        Some(name.to_owned())
    } else {
        None
    }
}

/// `prod.7.snap` -> `(prod, 7)`.
pub fn parse_archive_name(path: &Path) -> Option<(String, u64)> {
    let file = path.file_name()?.to_str()?;
    let stem = file.strip_suffix(".snap")?;
    let (name, seq) = stem.rsplit_once('.')?;
    if !is_valid_name(name) {
        return None;
    }
    Some((name.to_owned(), seq.parse().ok()?))
}
