//! Persisted path → digest ledger gating incremental rebuilds.
//!
//! The ledger is only written after the index artifact it describes has been
//! saved. A crash in between leaves the ledger behind the index, so the next
//! refresh reprocesses those files instead of skipping them.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::error::{IndexError, Result};

const LEDGER_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct PersistedLedger {
    version: u32,
    updated_at: String,
    files: BTreeMap<String, String>,
}

/// Classification of the current scan against the ledger.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LedgerDiff {
    pub added: Vec<String>,
    pub modified: Vec<String>,
    /// Ledger entries with no file in the current scan.
    pub removed: Vec<String>,
    pub unchanged: Vec<String>,
}

impl LedgerDiff {
    /// Nothing added, modified or removed.
    pub fn is_clean(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }

    /// Paths whose content must be (re)chunked and embedded.
    pub fn changed_paths(&self) -> impl Iterator<Item = &str> {
        self.added
            .iter()
            .chain(self.modified.iter())
            .map(String::as_str)
    }
}

#[derive(Debug)]
pub struct HashLedger {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl HashLedger {
    /// Empty, unsaved ledger bound to `path`.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: BTreeMap::new(),
        }
    }

    /// Load the ledger at `path`.
    ///
    /// A missing file yields an empty ledger. An unparseable one is logged
    /// and also treated as empty, which forces a full reprocess.
    pub async fn load(path: &Path) -> Result<Self> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no ledger yet");
                return Ok(Self::empty(path));
            }
            Err(e) => return Err(IndexError::io(path, e)),
        };

        match serde_json::from_slice::<PersistedLedger>(&bytes) {
            Ok(persisted) if persisted.version == LEDGER_VERSION => Ok(Self {
                path: path.to_path_buf(),
                entries: persisted.files,
            }),
            Ok(persisted) => {
                warn!(
                    path = %path.display(),
                    version = persisted.version,
                    "unsupported ledger version; treating as empty"
                );
                Ok(Self::empty(path))
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "corrupt ledger; treating as empty");
                Ok(Self::empty(path))
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> &BTreeMap<String, String> {
        &self.entries
    }

    pub fn get(&self, source: &str) -> Option<&str> {
        self.entries.get(source).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Classify `current` (path → digest) against the stored digests.
    pub fn diff(&self, current: &BTreeMap<String, String>) -> LedgerDiff {
        let mut diff = LedgerDiff::default();
        for (path, digest) in current {
            match self.entries.get(path) {
                None => diff.added.push(path.clone()),
                Some(stored) if stored != digest => diff.modified.push(path.clone()),
                Some(_) => diff.unchanged.push(path.clone()),
            }
        }
        diff.removed = self
            .entries
            .keys()
            .filter(|path| !current.contains_key(*path))
            .cloned()
            .collect();
        diff
    }

    /// Replace the ledger with `digests` and flush it durably.
    ///
    /// Written to a sibling temp file, synced, then renamed into place.
    pub async fn commit(&mut self, digests: BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| IndexError::io(parent, e))?;
        }

        let persisted = PersistedLedger {
            version: LEDGER_VERSION,
            updated_at: Utc::now().to_rfc3339(),
            files: digests,
        };
        let bytes = serde_json::to_vec_pretty(&persisted)?;

        let tmp = self.path.with_extension("json.tmp");
        let mut file = tokio::fs::File::create(&tmp)
            .await
            .map_err(|e| IndexError::io(&tmp, e))?;
        file.write_all(&bytes)
            .await
            .map_err(|e| IndexError::io(&tmp, e))?;
        file.sync_all().await.map_err(|e| IndexError::io(&tmp, e))?;
        drop(file);
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| IndexError::io(&self.path, e))?;

        self.entries = persisted.files;
        debug!(path = %self.path.display(), entries = self.entries.len(), "ledger committed");
        Ok(())
    }

    /// Forget every entry and delete the persisted file. Idempotent.
    pub async fn clear(&mut self) -> Result<()> {
        self.entries.clear();
        for path in [self.path.clone(), self.path.with_extension("json.tmp")] {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(IndexError::io(path, e)),
            }
        }
        Ok(())
    }
}
