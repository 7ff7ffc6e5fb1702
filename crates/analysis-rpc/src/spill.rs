//! Spill location for oversized binary payloads.
//!
//! Binary payloads longer than the inlining threshold are written to a file
//! under the spill directory and replaced on the wire by a reference. The
//! receiver reads the file back and removes it.
//!
//! The spill settings are process-wide: [`init_spill_config`] sets them once
//! at startup, and [`spill_config`] falls back to [`SpillConfig::from_env`]
//! on first read. Flatteners take a [`SpillConfig`] explicitly, so tests and
//! embedders can also pass their own.

use crate::config::RpcConfig;
use crate::wire::{spilled_paths, WireNode};
use crate::{Result, RpcError};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};
use uuid::Uuid;

static SPILL_CONFIG: OnceLock<Arc<SpillConfig>> = OnceLock::new();
static SPILL_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Where and when binary payloads are spilled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpillConfig {
    /// Directory that receives spill files.
    pub dir: PathBuf,
    /// Largest payload, in bytes, that is still inlined.
    pub inline_threshold: usize,
}

impl Default for SpillConfig {
    fn default() -> Self {
        Self {
            dir: std::env::temp_dir(),
            inline_threshold: RpcConfig::DEFAULT_INLINE_THRESHOLD,
        }
    }
}

impl SpillConfig {
    pub fn new(dir: impl Into<PathBuf>, inline_threshold: usize) -> Self {
        Self {
            dir: dir.into(),
            inline_threshold,
        }
    }

    /// Read overrides from `ANALYSIS_RPC_SPILL_DIR` and `ANALYSIS_RPC_INLINE_THRESHOLD`.
    ///
    /// Unset variables keep their defaults; a threshold that is not a
    /// non-negative integer is a configuration error.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(dir) = std::env::var_os(RpcConfig::SPILL_DIR_ENV) {
            if !dir.is_empty() {
                config.dir = PathBuf::from(dir);
            }
        }

        if let Ok(raw) = std::env::var(RpcConfig::INLINE_THRESHOLD_ENV) {
            config.inline_threshold = raw.trim().parse().map_err(|_| RpcError::Config {
                message: format!(
                    "{} must be a byte count, got '{}'",
                    RpcConfig::INLINE_THRESHOLD_ENV,
                    raw
                ),
            })?;
        }

        Ok(config)
    }

    /// True if a payload of `len` bytes goes to a spill file.
    pub fn should_spill(&self, len: usize) -> bool {
        len > self.inline_threshold
    }

    /// Write `bytes` to a fresh spill file and return its path.
    pub fn spill(&self, bytes: &[u8]) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir).map_err(|e| RpcError::Io {
            message: format!("Failed to create spill directory {}", self.dir.display()),
            source: Some(e),
        })?;

        let path = self.dir.join(unique_spill_name());
        std::fs::write(&path, bytes).map_err(|e| RpcError::Io {
            message: format!("Failed to write spill file {}", path.display()),
            source: Some(e),
        })?;

        debug!("Spilled {} bytes to {}", bytes.len(), path.display());
        Ok(path)
    }

    /// Read a spilled payload back and remove its file.
    ///
    /// Only files named by the spill scheme and sitting directly in the
    /// spill directory are accepted, so a peer cannot point this at an
    /// arbitrary file.
    pub fn rehydrate(&self, path: &Path, expected_len: u64) -> Result<Vec<u8>> {
        self.check_spill_path(path)?;

        let bytes = std::fs::read(path).map_err(|e| {
            RpcError::decode(format!("cannot read spill file {}: {}", path.display(), e))
        })?;

        if let Err(e) = std::fs::remove_file(path) {
            debug!("Failed to remove spill file {}: {}", path.display(), e);
        } else {
            debug!("Removed spill file {}", path.display());
        }

        if bytes.len() as u64 != expected_len {
            return Err(RpcError::decode(format!(
                "spill file {} holds {} bytes, expected {}",
                path.display(),
                bytes.len(),
                expected_len
            )));
        }

        Ok(bytes)
    }

    /// Remove a spill file that will never be rehydrated.
    ///
    /// Paths outside the spill scheme are ignored; a file that is already
    /// gone is not an error.
    pub fn discard(&self, path: &Path) {
        if let Err(e) = self.check_spill_path(path) {
            debug!("Not discarding {}: {}", path.display(), e);
            return;
        }
        match std::fs::remove_file(path) {
            Ok(()) => debug!("Discarded spill file {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to discard spill file {}: {}", path.display(), e),
        }
    }

    /// Discard every spill file referenced from `nodes`, at any depth.
    pub fn release(&self, nodes: &[WireNode]) {
        for node in nodes {
            for path in spilled_paths(node) {
                self.discard(&path);
            }
        }
    }

    fn check_spill_path(&self, path: &Path) -> Result<()> {
        if !is_spill_file_name(path) {
            return Err(RpcError::decode(format!(
                "refusing to read non-spill file {}",
                path.display()
            )));
        }

        let outside = || {
            RpcError::decode(format!(
                "refusing spill file {} outside {}",
                path.display(),
                self.dir.display()
            ))
        };
        let parent = path
            .parent()
            .and_then(|p| p.canonicalize().ok())
            .ok_or_else(outside)?;
        let dir = self.dir.canonicalize().map_err(|_| outside())?;
        if parent != dir {
            return Err(outside());
        }
        Ok(())
    }
}

/// Set the process-wide spill configuration.
///
/// The first call wins. Repeating it with the same settings is fine;
/// asking for different settings afterwards is an error.
pub fn init_spill_config(config: SpillConfig) -> Result<Arc<SpillConfig>> {
    let current = SPILL_CONFIG.get_or_init(|| Arc::new(config.clone()));
    if **current == config {
        Ok(current.clone())
    } else {
        Err(RpcError::Config {
            message: format!(
                "spill location already set to {} (threshold {})",
                current.dir.display(),
                current.inline_threshold
            ),
        })
    }
}

/// The process-wide spill configuration, initialised from the environment on first use.
pub fn spill_config() -> Result<Arc<SpillConfig>> {
    if let Some(config) = SPILL_CONFIG.get() {
        return Ok(config.clone());
    }
    let from_env = SpillConfig::from_env()?;
    Ok(SPILL_CONFIG.get_or_init(|| Arc::new(from_env)).clone())
}

/// `spill-<pid>-<counter>-<uuid>.bin`; pid and counter alone are unique per
/// host, the uuid guards against pid reuse with a stale directory.
fn unique_spill_name() -> String {
    let counter = SPILL_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!(
        "{}{}-{}-{}.{}",
        RpcConfig::SPILL_FILE_PREFIX,
        std::process::id(),
        counter,
        Uuid::new_v4().simple(),
        RpcConfig::SPILL_FILE_EXTENSION
    )
}

fn is_spill_file_name(path: &Path) -> bool {
    let name_ok = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with(RpcConfig::SPILL_FILE_PREFIX))
        .unwrap_or(false);
    let ext_ok = path
        .extension()
        .map(|e| e == RpcConfig::SPILL_FILE_EXTENSION)
        .unwrap_or(false);
    name_ok && ext_ok
}
