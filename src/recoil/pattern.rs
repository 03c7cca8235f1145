//! Recorded recoil patterns and where they are kept

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

const PATTERN_EXTENSION: &str = "json";

#[derive(Debug, thiserror::Error)]
pub enum PatternError {
    #[error("Invalid pattern name: {0:?}")]
    InvalidName(String),

    #[error("Pattern not found: {0}")]
    NotFound(String),

    #[error("Pattern already exists: {0}")]
    AlreadyExists(String),

    #[error("A pattern is already being recorded: {0}")]
    AlreadyRecording(String),

    #[error("No pattern is being recorded")]
    NotRecording,

    #[error("Pattern storage error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize pattern: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// One tick of raw mouse motion
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Sample {
    pub dx: f64,
    pub dy: f64,
}

impl Sample {
    pub fn new(dx: f64, dy: f64) -> Self {
        Self { dx, dy }
    }
}

impl From<(f64, f64)> for Sample {
    fn from((dx, dy): (f64, f64)) -> Self {
        Self { dx, dy }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AntiRecoilPattern {
    pub name: String,
    pub samples: Vec<Sample>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_utc: DateTime<Utc>,
}

impl AntiRecoilPattern {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            samples: Vec::new(),
            notes: String::new(),
            tags: Vec::new(),
            created_utc: Utc::now(),
        }
    }

    pub fn with_samples(name: impl Into<String>, samples: impl IntoIterator<Item = Sample>) -> Self {
        Self {
            samples: samples.into_iter().collect(),
            ..Self::new(name)
        }
    }
}

/// Pattern names double as file names, so they are restricted
pub fn validate_name(name: &str) -> Result<(), PatternError> {
    let valid = !name.trim().is_empty()
        && name.len() <= 64
        && name.trim() == name
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | ' ' | '.'))
        && !name.starts_with('.');
    if valid {
        Ok(())
    } else {
        Err(PatternError::InvalidName(name.to_string()))
    }
}

/// Storage for saved patterns. Implementations are shared between the tick
/// (which never touches them) and management calls.
pub trait PatternRepository: Send + Sync {
    /// Stores the pattern, replacing any pattern with the same name
    fn save(&self, pattern: &AntiRecoilPattern) -> Result<(), PatternError>;

    fn load(&self, name: &str) -> Result<Option<AntiRecoilPattern>, PatternError>;

    /// Names of every stored pattern, sorted
    fn list(&self) -> Result<Vec<String>, PatternError>;

    fn rename(&self, old: &str, new: &str) -> Result<(), PatternError>;

    /// Returns whether anything was deleted
    fn delete(&self, name: &str) -> Result<bool, PatternError>;
}

#[derive(Debug, Default)]
pub struct InMemoryPatternRepository {
    patterns: RwLock<BTreeMap<String, AntiRecoilPattern>>,
}

impl InMemoryPatternRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PatternRepository for InMemoryPatternRepository {
    fn save(&self, pattern: &AntiRecoilPattern) -> Result<(), PatternError> {
        validate_name(&pattern.name)?;
        self.patterns
            .write()
            .insert(pattern.name.clone(), pattern.clone());
        Ok(())
    }

    fn load(&self, name: &str) -> Result<Option<AntiRecoilPattern>, PatternError> {
        Ok(self.patterns.read().get(name).cloned())
    }

    fn list(&self) -> Result<Vec<String>, PatternError> {
        Ok(self.patterns.read().keys().cloned().collect())
    }

    fn rename(&self, old: &str, new: &str) -> Result<(), PatternError> {
        validate_name(new)?;
        let mut patterns = self.patterns.write();
        if old == new {
            return if patterns.contains_key(old) {
                Ok(())
            } else {
                Err(PatternError::NotFound(old.to_string()))
            };
        }
        if patterns.contains_key(new) {
            return Err(PatternError::AlreadyExists(new.to_string()));
        }
        let mut pattern = patterns
            .remove(old)
            .ok_or_else(|| PatternError::NotFound(old.to_string()))?;
        pattern.name = new.to_string();
        patterns.insert(new.to_string(), pattern);
        Ok(())
    }

    fn delete(&self, name: &str) -> Result<bool, PatternError> {
        Ok(self.patterns.write().remove(name).is_some())
    }
}

/// One `<name>.json` per pattern inside a directory
#[derive(Debug, Clone)]
pub struct JsonPatternRepository {
    dir: PathBuf,
}

impl JsonPatternRepository {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.{PATTERN_EXTENSION}"))
    }

    fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> PatternError + '_ {
        move |source| PatternError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn read(&self, path: &Path) -> Result<Option<AntiRecoilPattern>, PatternError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Self::io_error(path)(e)),
        };
        match serde_json::from_str(&content) {
            Ok(pattern) => Ok(Some(pattern)),
            Err(e) => {
                warn!("Skipping corrupt pattern file {}: {}", path.display(), e);
                Ok(None)
            }
        }
    }
}

impl PatternRepository for JsonPatternRepository {
    fn save(&self, pattern: &AntiRecoilPattern) -> Result<(), PatternError> {
        validate_name(&pattern.name)?;
        fs::create_dir_all(&self.dir).map_err(Self::io_error(&self.dir))?;

        let path = self.path_for(&pattern.name);
        let tmp = path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(pattern)?;
        fs::write(&tmp, content).map_err(Self::io_error(&tmp))?;
        fs::rename(&tmp, &path).map_err(Self::io_error(&path))?;

        info!(
            "Saved pattern '{}' ({} samples) to {}",
            pattern.name,
            pattern.samples.len(),
            path.display()
        );
        Ok(())
    }

    fn load(&self, name: &str) -> Result<Option<AntiRecoilPattern>, PatternError> {
        validate_name(name)?;
        self.read(&self.path_for(name))
    }

    fn list(&self) -> Result<Vec<String>, PatternError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Self::io_error(&self.dir)(e)),
        };

        let mut names = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(PATTERN_EXTENSION) {
                continue;
            }
            match self.read(&path)? {
                Some(pattern) => names.push(pattern.name),
                None => debug!("Ignoring unreadable entry {}", path.display()),
            }
        }
        names.sort();
        Ok(names)
    }

    fn rename(&self, old: &str, new: &str) -> Result<(), PatternError> {
        validate_name(new)?;
        let mut pattern = self
            .load(old)?
            .ok_or_else(|| PatternError::NotFound(old.to_string()))?;
        if old == new {
            return Ok(());
        }
        if self.path_for(new).exists() {
            return Err(PatternError::AlreadyExists(new.to_string()));
        }

        pattern.name = new.to_string();
        self.save(&pattern)?;
        let old_path = self.path_for(old);
        fs::remove_file(&old_path).map_err(Self::io_error(&old_path))?;
        info!("Renamed pattern '{}' to '{}'", old, new);
        Ok(())
    }

    fn delete(&self, name: &str) -> Result<bool, PatternError> {
        validate_name(name)?;
        let path = self.path_for(name);
        match fs::remove_file(&path) {
            Ok(()) => {
                info!("Deleted pattern '{}'", name);
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Self::io_error(&path)(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_pattern(name: &str) -> AntiRecoilPattern {
        AntiRecoilPattern::with_samples(name, [Sample::new(0.0, 10.0), Sample::new(1.0, 8.0)])
    }

    #[test]
    fn names_are_restricted() {
        assert!(validate_name("ak-47 spray").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("../escape").is_err());
        assert!(validate_name(".hidden").is_err());
        assert!(validate_name(" padded").is_err());
    }

    #[test]
    fn in_memory_rename_and_delete() {
        let repo = InMemoryPatternRepository::new();
        repo.save(&sample_pattern("a")).unwrap();
        repo.save(&sample_pattern("b")).unwrap();

        assert!(matches!(repo.rename("a", "b"), Err(PatternError::AlreadyExists(_))));
        repo.rename("a", "c").unwrap();
        assert_eq!(repo.list().unwrap(), vec!["b".to_string(), "c".to_string()]);
        assert_eq!(repo.load("c").unwrap().unwrap().name, "c");

        assert!(repo.delete("b").unwrap());
        assert!(!repo.delete("b").unwrap());
    }

    #[test]
    fn json_repository_persists_patterns() {
        let dir = tempfile::tempdir().unwrap();
        let repo = JsonPatternRepository::new(dir.path().join("patterns"));
        assert!(repo.list().unwrap().is_empty());

        let pattern = sample_pattern("spray");
        repo.save(&pattern).unwrap();
        assert_eq!(repo.load("spray").unwrap(), Some(pattern));

        repo.rename("spray", "spray v2").unwrap();
        assert_eq!(repo.list().unwrap(), vec!["spray v2".to_string()]);
        assert!(repo.load("spray").unwrap().is_none());
    }

    #[test]
    fn corrupt_pattern_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let repo = JsonPatternRepository::new(dir.path());
        repo.save(&sample_pattern("good")).unwrap();
        fs::write(dir.path().join("broken.json"), "{ not json").unwrap();

        assert_eq!(repo.list().unwrap(), vec!["good".to_string()]);
        assert!(repo.load("broken").unwrap().is_none());
    }
}
