use std::path::PathBuf;

use tracing::warn;

use crate::engine::CandidateSpan;
use crate::limits::*;
use crate::model::{ResourcePool, DEFAULT_CONTAINERS, DEFAULT_TANKS};

/// Which `RunStore` adapter to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Memory,
    File,
    Wal,
}

impl StorageKind {
    pub const SUPPORTED: [&'static str; 3] = ["memory", "file", "wal"];

    /// Unknown kinds fall back to `File`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "mem" => StorageKind::Memory,
            "file" | "json" => StorageKind::File,
            "wal" | "log" => StorageKind::Wal,
            other => {
                warn!("unknown storage kind {other:?}, falling back to file storage");
                StorageKind::File
            }
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            StorageKind::Memory => "memory",
            StorageKind::File => "file",
            StorageKind::Wal => "wal",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub storage: StorageKind,
    pub data_dir: PathBuf,
    pub tanks: u32,
    pub containers: u32,
    pub compact_threshold: u64,
    pub candidate_span: CandidateSpan,
    pub metrics_port: Option<u16>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageKind::File,
            data_dir: PathBuf::from("./data"),
            tanks: DEFAULT_TANKS,
            containers: DEFAULT_CONTAINERS,
            compact_threshold: 1000,
            candidate_span: CandidateSpan::DefaultDuration,
            metrics_port: None,
        }
    }
}

impl Config {
    /// Read `BREWCAL_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unparseable values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let storage = lookup("BREWCAL_STORAGE")
            .map(|s| StorageKind::parse(&s))
            .unwrap_or(defaults.storage);
        let data_dir = lookup("BREWCAL_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);
        let tanks = lookup("BREWCAL_TANKS")
            .and_then(|s| s.parse::<u32>().ok())
            .filter(|n| (1..=MAX_TANKS).contains(n))
            .unwrap_or(defaults.tanks);
        let containers = lookup("BREWCAL_CONTAINERS")
            .and_then(|s| s.parse::<u32>().ok())
            .filter(|n| (3..=MAX_CONTAINERS).contains(n))
            .unwrap_or(defaults.containers);
        let compact_threshold = lookup("BREWCAL_COMPACT_THRESHOLD")
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(defaults.compact_threshold);
        let candidate_span = match lookup("BREWCAL_CANDIDATE_SPAN") {
            Some(s) => CandidateSpan::parse(&s).unwrap_or_else(|| {
                warn!("unknown candidate span policy {s:?}, using default duration");
                defaults.candidate_span
            }),
            None => defaults.candidate_span,
        };
        let metrics_port = lookup("BREWCAL_METRICS_PORT").and_then(|s| s.parse::<u16>().ok());

        Self {
            storage,
            data_dir,
            tanks,
            containers,
            compact_threshold,
            candidate_span,
            metrics_port,
        }
    }

    pub fn pool(&self) -> ResourcePool {
        ResourcePool::new(self.tanks, self.containers)
    }

    pub fn json_path(&self) -> PathBuf {
        self.data_dir.join("brewcal.json")
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("brewcal.wal")
    }
}
