//! Quarantine for corrupt bar files.
//!
//! A file that fails to decode is moved under `{root}/.corrupt/`, mirroring
//! its path relative to the store root, with a `.reason.json` sidecar holding
//! the decode error. Moving it out of its key directory removes it from every
//! later index rebuild.

use super::error::StoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, warn};

pub const QUARANTINE_DIR: &str = ".corrupt";
const REASON_SUFFIX: &str = ".reason.json";

/// A relocated, unreadable file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuarantinedFile {
    pub original_path: PathBuf,
    pub quarantine_path: PathBuf,
    pub error: String,
    pub quarantined_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Quarantine {
    store_root: PathBuf,
    quarantine_root: PathBuf,
}

impl Quarantine {
    pub fn new(store_root: impl Into<PathBuf>) -> Self {
        let store_root = store_root.into();
        let quarantine_root = store_root.join(QUARANTINE_DIR);
        Self {
            store_root,
            quarantine_root,
        }
    }

    pub fn root(&self) -> &Path {
        &self.quarantine_root
    }

    /// Move `path` aside and record why.
    ///
    /// Failing to move the file is fatal ([`StoreError::Quarantine`]). Failing
    /// to write the sidecar is only logged: the file is already out of the store.
    pub fn quarantine(&self, path: &Path, reason: &str) -> Result<QuarantinedFile, StoreError> {
        let fail = |why: String| {
            error!(path = %path.display(), %why, "quarantine failed");
            StoreError::Quarantine {
                path: path.to_path_buf(),
                reason: why,
            }
        };

        let relative = path
            .strip_prefix(&self.store_root)
            .map_err(|_| fail(format!("not under store root {}", self.store_root.display())))?;
        let dest = free_destination(&self.quarantine_root.join(relative));
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| fail(format!("create {}: {e}", parent.display())))?;
        }
        fs::rename(path, &dest).map_err(|e| fail(format!("move to {}: {e}", dest.display())))?;

        let record = QuarantinedFile {
            original_path: path.to_path_buf(),
            quarantine_path: dest.clone(),
            error: reason.to_string(),
            quarantined_at: Utc::now(),
        };
        warn!(
            from = %path.display(),
            to = %dest.display(),
            %reason,
            "quarantined corrupt bar file"
        );

        let sidecar = reason_path(&dest);
        match serde_json::to_string_pretty(&record) {
            Ok(json) => {
                if let Err(e) = fs::write(&sidecar, json) {
                    warn!(path = %sidecar.display(), error = %e, "could not write quarantine reason");
                }
            }
            Err(e) => warn!(error = %e, "could not serialize quarantine reason"),
        }

        Ok(record)
    }

    /// Every quarantined file that has a readable reason sidecar, oldest first.
    pub fn list(&self) -> Result<Vec<QuarantinedFile>, StoreError> {
        let mut out = Vec::new();
        if self.quarantine_root.is_dir() {
            collect_reasons(&self.quarantine_root, &mut out)?;
        }
        out.sort_by_key(|q| q.quarantined_at);
        Ok(out)
    }
}

fn reason_path(quarantined: &Path) -> PathBuf {
    let mut name = quarantined.as_os_str().to_os_string();
    name.push(REASON_SUFFIX);
    PathBuf::from(name)
}

/// Never overwrite earlier evidence: append `.1`, `.2`, ... when taken.
fn free_destination(dest: &Path) -> PathBuf {
    if !dest.exists() {
        return dest.to_path_buf();
    }
    (1..)
        .map(|n| {
            let mut name = dest.as_os_str().to_os_string();
            name.push(format!(".{n}"));
            PathBuf::from(name)
        })
        .find(|candidate| !candidate.exists())
        .unwrap_or_else(|| dest.to_path_buf())
}

fn collect_reasons(dir: &Path, out: &mut Vec<QuarantinedFile>) -> Result<(), StoreError> {
    let entries = fs::read_dir(dir).map_err(|e| StoreError::io(dir, e))?;
    for entry in entries {
        let path = entry.map_err(|e| StoreError::io(dir, e))?.path();
        if path.is_dir() {
            collect_reasons(&path, out)?;
            continue;
        }
        let is_reason = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(REASON_SUFFIX));
        if !is_reason {
            continue;
        }
        match fs::read_to_string(&path)
            .ok()
            .and_then(|s| serde_json::from_str::<QuarantinedFile>(&s).ok())
        {
            Some(record) => out.push(record),
            None => warn!(path = %path.display(), "unreadable quarantine reason"),
        }
    }
    Ok(())
}
