//! Where the active mode survives restarts

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::debug;

use super::{Mode, PersistenceError};

pub trait ModeStore: Send + Sync {
    /// `Ok(None)` when nothing was stored yet
    fn load(&self) -> Result<Option<Mode>, PersistenceError>;

    fn save(&self, mode: Mode) -> Result<(), PersistenceError>;
}

/// Accepts `"Native"` (JSON) as well as a bare `Native`
fn parse_mode(raw: &str, location: &str) -> Result<Option<Mode>, PersistenceError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    match serde_json::from_str::<Mode>(trimmed) {
        Ok(mode) => Ok(Some(mode)),
        Err(json_error) => trimmed.parse::<Mode>().map(Some).map_err(|_| {
            PersistenceError::Corrupt {
                location: location.to_string(),
                reason: json_error.to_string(),
            }
        }),
    }
}

/// Single JSON scalar in a file, written through a temp file and a rename
#[derive(Debug, Clone)]
pub struct JsonModeStore {
    path: PathBuf,
}

impl JsonModeStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> PersistenceError {
        PersistenceError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl ModeStore for JsonModeStore {
    fn load(&self) -> Result<Option<Mode>, PersistenceError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No persisted mode at {}", self.path.display());
                return Ok(None);
            }
            Err(e) => return Err(self.io_error(e)),
        };
        parse_mode(&raw, &self.path.display().to_string())
    }

    fn save(&self, mode: Mode) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }
        let content = serde_json::to_string(&mode).map_err(|e| PersistenceError::Unavailable(e.to_string()))?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, content).map_err(|e| self.io_error(e))?;
        fs::rename(&tmp, &self.path).map_err(|e| self.io_error(e))?;
        debug!("Persisted mode {} to {}", mode, self.path.display());
        Ok(())
    }
}

/// In-process store with fault injection
#[derive(Debug, Default)]
pub struct MemoryModeStore {
    raw: Mutex<Option<String>>,
    fail_saves: AtomicBool,
    saves: AtomicU64,
}

impl MemoryModeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seeds the store with raw persisted text, valid or not
    pub fn with_raw(raw: impl Into<String>) -> Self {
        Self {
            raw: Mutex::new(Some(raw.into())),
            ..Self::default()
        }
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn saves(&self) -> u64 {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn raw(&self) -> Option<String> {
        self.raw.lock().clone()
    }
}

impl ModeStore for MemoryModeStore {
    fn load(&self) -> Result<Option<Mode>, PersistenceError> {
        match self.raw.lock().as_deref() {
            Some(raw) => parse_mode(raw, "memory"),
            None => Ok(None),
        }
    }

    fn save(&self, mode: Mode) -> Result<(), PersistenceError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(PersistenceError::Unavailable("saves disabled".to_string()));
        }
        *self.raw.lock() = Some(format!("\"{mode}\""));
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl<T: ModeStore + ?Sized> ModeStore for std::sync::Arc<T> {
    fn load(&self) -> Result<Option<Mode>, PersistenceError> {
        (**self).load()
    }

    fn save(&self, mode: Mode) -> Result<(), PersistenceError> {
        (**self).save(mode)
    }
}
