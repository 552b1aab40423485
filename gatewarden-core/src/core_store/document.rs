//! Whole-document JSON persistence
//!
//! Each concern gets one small JSON document: a flat object keyed by
//! identity-as-string. Loaded once at startup and rewritten wholesale on
//! mutation, with a write-temp-then-rename so a crash mid-write never
//! leaves a torn document behind. In-memory state stays authoritative for
//! the process lifetime; a lost flush loses at most that single update.

use crate::core_gate::types::UserId;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error on {path}: {source}")]
    Serde {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// One persisted document of per-identity records.
#[derive(Debug, Clone)]
pub struct DocumentStore<T> {
    path: PathBuf,
    _marker: std::marker::PhantomData<T>,
}

impl<T> DocumentStore<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _marker: std::marker::PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the document, or an empty map when the file does not exist.
    ///
    /// A corrupt document is logged and treated as empty rather than
    /// aborting startup; the gate keeps serving with fresh state.
    pub fn load(&self) -> HashMap<UserId, T> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return HashMap::new(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to read document, starting empty");
                return HashMap::new();
            }
        };

        let keyed: HashMap<String, T> = match serde_json::from_str(&contents) {
            Ok(keyed) => keyed,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "corrupt document, starting empty");
                return HashMap::new();
            }
        };

        keyed
            .into_iter()
            .filter_map(|(key, value)| match key.parse::<i64>() {
                Ok(id) => Some((UserId::new(id), value)),
                Err(_) => {
                    warn!(path = %self.path.display(), key, "skipping record with non-numeric key");
                    None
                }
            })
            .collect()
    }

    /// Rewrite the whole document atomically.
    pub fn save(&self, records: &HashMap<UserId, T>) -> StoreResult<()> {
        let keyed: HashMap<String, &T> = records
            .iter()
            .map(|(id, value)| (id.as_key(), value))
            .collect();
        let contents = serde_json::to_string_pretty(&keyed).map_err(|source| StoreError::Serde {
            path: self.path.clone(),
            source,
        })?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, contents).map_err(|source| StoreError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &self.path).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })?;
        metrics::counter!("store.documents.written").increment(1);
        Ok(())
    }
}
