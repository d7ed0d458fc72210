use serde_derive::Deserialize;
use serde_derive::Serialize;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::backend::{
    fs::{local::LocalFileBasedPersistBackend, memory::MemoryBasedPersistBackend},
    Backend,
};

/// Storage medium snapshots are written to.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Local,
    Memory,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct Config {
    /// Directory holding `<name>.snap` files.
    pub path: PathBuf,
    pub backend: BackendKind,
    /// Superseded snapshots kept per name, the current one is not counted.
    pub retain_history: usize,
    pub mmap_reads: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            path: "snapstore_data/".into(),
            backend: BackendKind::Local,
            retain_history: 0,
            mmap_reads: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config {0}")]
    Io(#[from] io::Error),
    #[error("parse config {0}")]
    Parse(#[from] toml::de::Error),
}

impl Config {
    pub fn set_retain_history(&mut self, n: usize) {
        self.retain_history = n;
    }

    pub fn open_backend(&self) -> Backend {
        match self.backend {
            BackendKind::Local => Backend::new(LocalFileBasedPersistBackend),
            BackendKind::Memory => Backend::new(MemoryBasedPersistBackend::new()),
        }
    }
}

pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from("snapstore.toml")
}

pub fn test_config() -> Config {
    Config {
        path: "/tmp/snapstore/".into(),
        backend: BackendKind::Memory,
        ..Default::default()
    }
}

pub fn load_config_from<P: AsRef<Path>>(file: P) -> Result<Config, ConfigError> {
    let mut buf = String::new();
    File::open(file)?.read_to_string(&mut buf)?;
    parse_config(&buf)
}

pub fn parse_config(s: &str) -> Result<Config, ConfigError> {
    Ok(toml::from_str(s)?)
}
