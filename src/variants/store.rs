//! On-disk artifact store
//!
//! Every synthesized variant is persisted as one file named
//! `<prefix>_<fingerprint>_<YYYY-MM-DD-HH-MM-SS-micros>.json`. Files that do
//! not follow this convention are invisible to every operation.
//!
//! Artifacts are never rewritten in place: a write always creates a fresh
//! file (and removes older ones for the same fingerprint), so eviction can
//! order artifacts purely by modification time.

use super::error::{Result, VariantError};
use super::fingerprint::{Baseline, Fingerprint, FINGERPRINT_HEX_LEN};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use time::macros::format_description;
use time::{Duration, OffsetDateTime, PrimitiveDateTime, Time};

/// Artifact file extension
const EXTENSION: &str = ".json";

/// Attempts at finding a free timestamp before giving up on a write
const MAX_NAME_ATTEMPTS: usize = 64;

/// A valid artifact found in the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// File name
    pub name: String,
    /// Full path
    pub path: PathBuf,
    /// Fingerprint encoded in the name
    pub fingerprint: Fingerprint,
    /// Creation timestamp encoded in the name (UTC)
    pub created_at: PrimitiveDateTime,
    /// File modification time
    pub modified: SystemTime,
}

impl Artifact {
    /// Whether this artifact belongs to a baseline
    pub fn is_baseline(&self) -> bool {
        self.fingerprint.is_baseline()
    }
}

/// A directory of named, timestamped grammar source artifacts
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
    prefix: String,
}

impl ArtifactStore {
    /// Open (and create if absent) a store directory
    pub fn open(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| VariantError::storage(&dir, e))?;
        Ok(Self {
            dir,
            prefix: prefix.into(),
        })
    }

    /// Store directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File name prefix
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// File name for an artifact
    pub fn artifact_name(&self, fingerprint: &Fingerprint, created_at: PrimitiveDateTime) -> Result<String> {
        let stamp = format_timestamp(created_at)
            .map_err(|e| VariantError::storage(&self.dir, io::Error::other(e)))?;
        Ok(format!("{}_{}_{}{}", self.prefix, fingerprint, stamp, EXTENSION))
    }

    /// Decode a file name; `None` if it does not follow the naming convention
    pub fn parse_name(&self, name: &str) -> Option<(Fingerprint, PrimitiveDateTime)> {
        let rest = name
            .strip_suffix(EXTENSION)?
            .strip_prefix(self.prefix.as_str())?
            .strip_prefix('_')?;
        let hex = rest.get(..FINGERPRINT_HEX_LEN)?;
        let stamp = rest.get(FINGERPRINT_HEX_LEN..)?.strip_prefix('_')?;
        Some((Fingerprint::from_hex(hex)?, parse_timestamp(stamp)?))
    }

    /// Every valid artifact, oldest creation time first
    pub fn list(&self) -> Result<Vec<Artifact>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(VariantError::storage(&self.dir, e)),
        };

        let mut artifacts = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| VariantError::storage(&self.dir, e))?;
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let Some((fingerprint, created_at)) = self.parse_name(&name) else {
                continue;
            };
            // Removed concurrently, or not a regular file
            let Ok(meta) = entry.metadata() else {
                continue;
            };
            if !meta.is_file() {
                continue;
            }
            artifacts.push(Artifact {
                path: entry.path(),
                name,
                fingerprint,
                created_at,
                modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            });
        }
        artifacts.sort_by(|a, b| (a.created_at, &a.name).cmp(&(b.created_at, &b.name)));
        Ok(artifacts)
    }

    /// Number of valid artifacts on disk
    pub fn resident_count(&self) -> Result<usize> {
        Ok(self.list()?.len())
    }

    /// Newest artifact for a fingerprint
    pub fn find(&self, fingerprint: &Fingerprint) -> Result<Option<Artifact>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|a| &a.fingerprint == fingerprint)
            .max_by(|a, b| (a.created_at, &a.name).cmp(&(b.created_at, &b.name))))
    }

    /// Read an artifact's source text
    pub fn read(&self, artifact: &Artifact) -> Result<String> {
        fs::read_to_string(&artifact.path).map_err(|e| VariantError::storage(&artifact.path, e))
    }

    /// Source text of the newest artifact for a baseline
    pub fn read_baseline(&self, which: Baseline) -> Result<String> {
        match self.find(which.fingerprint())? {
            Some(artifact) => self.read(&artifact),
            None => Err(VariantError::MissingBaseline {
                which: which.key(),
                dir: self.dir.clone(),
            }),
        }
    }

    /// Persist a new artifact
    ///
    /// Goes through a temp file that is atomically moved into place without
    /// clobbering. Older artifacts for the same fingerprint are removed.
    pub fn write(&self, fingerprint: &Fingerprint, source: &str) -> Result<Artifact> {
        fs::create_dir_all(&self.dir).map_err(|e| VariantError::storage(&self.dir, e))?;

        let mut tmp = tempfile::Builder::new()
            .prefix(".tmp-")
            .tempfile_in(&self.dir)
            .map_err(|e| VariantError::storage(&self.dir, e))?;
        tmp.write_all(source.as_bytes())
            .and_then(|()| tmp.as_file().sync_all())
            .map_err(|e| VariantError::storage(tmp.path(), e))?;

        let mut created_at = now_micros()?;
        let mut attempts = 0;
        let (name, path) = loop {
            let name = self.artifact_name(fingerprint, created_at)?;
            let path = self.dir.join(&name);
            match tmp.persist_noclobber(&path) {
                Ok(_) => break (name, path),
                Err(err) if err.error.kind() == io::ErrorKind::AlreadyExists => {
                    attempts += 1;
                    if attempts >= MAX_NAME_ATTEMPTS {
                        return Err(VariantError::storage(path, err.error));
                    }
                    tmp = err.file;
                    created_at = created_at
                        .checked_add(Duration::microseconds(1))
                        .ok_or_else(|| {
                            VariantError::storage(&path, io::Error::other("timestamp overflow"))
                        })?;
                }
                Err(err) => return Err(VariantError::storage(path, err.error)),
            }
        };
        log_debug!("wrote artifact {}", name);

        for older in self.list()? {
            if &older.fingerprint == fingerprint && older.name != name {
                self.remove_best_effort(&older.path);
            }
        }

        let modified = fs::metadata(&path)
            .and_then(|m| m.modified())
            .unwrap_or_else(|_| SystemTime::now());
        Ok(Artifact {
            name,
            path,
            fingerprint: fingerprint.clone(),
            created_at,
            modified,
        })
    }

    /// Copy a valid artifact file into the store, keeping its name
    pub fn copy_in(&self, source: &Path) -> Result<Artifact> {
        let name = source
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .unwrap_or_default();
        let Some((fingerprint, created_at)) = self.parse_name(&name) else {
            return Err(VariantError::storage(
                source,
                io::Error::new(io::ErrorKind::InvalidInput, "not an artifact file name"),
            ));
        };

        let path = self.dir.join(&name);
        fs::copy(source, &path).map_err(|e| VariantError::storage(&path, e))?;
        let modified = fs::metadata(&path)
            .and_then(|m| m.modified())
            .map_err(|e| VariantError::storage(&path, e))?;
        Ok(Artifact {
            name,
            path,
            fingerprint,
            created_at,
            modified,
        })
    }

    /// Delete an artifact by file name; deleting a missing artifact succeeds
    pub fn delete(&self, name: &str) -> Result<()> {
        let path = self.dir.join(name);
        match fs::remove_file(&path) {
            Ok(()) => {
                log_debug!("deleted artifact {}", name);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(VariantError::storage(path, e)),
        }
    }

    /// Delete every artifact and recreate an empty store directory
    pub fn reset(&self) -> Result<()> {
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(VariantError::storage(&self.dir, e)),
        }
        fs::create_dir_all(&self.dir).map_err(|e| VariantError::storage(&self.dir, e))?;
        log_info!("reset artifact store {}", self.dir.display());
        Ok(())
    }

    fn remove_best_effort(&self, path: &Path) -> bool {
        match fs::remove_file(path) {
            Ok(()) => true,
            Err(e) if e.kind() == io::ErrorKind::NotFound => true,
            Err(e) => {
                log_warn!("failed to remove superseded artifact {}: {}", path.display(), e);
                false
            }
        }
    }
}

/// Current UTC time truncated to whole microseconds
fn now_micros() -> Result<PrimitiveDateTime> {
    let now = OffsetDateTime::now_utc();
    let time = Time::from_hms_micro(now.hour(), now.minute(), now.second(), now.microsecond())
        .map_err(|e| VariantError::storage(PathBuf::new(), io::Error::other(e)))?;
    Ok(PrimitiveDateTime::new(now.date(), time))
}

fn format_timestamp(ts: PrimitiveDateTime) -> std::result::Result<String, time::error::Format> {
    ts.format(format_description!(
        "[year]-[month]-[day]-[hour]-[minute]-[second]-[subsecond digits:6]"
    ))
}

fn parse_timestamp(stamp: &str) -> Option<PrimitiveDateTime> {
    PrimitiveDateTime::parse(
        stamp,
        format_description!("[year]-[month]-[day]-[hour]-[minute]-[second]-[subsecond digits:6]"),
    )
    .ok()
}
