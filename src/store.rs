use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// One embedded reference image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub embedding: Vec<f32>,
    /// Path of the original reference image, kept for later display.
    pub source: PathBuf,
}

/// Identity → reference embeddings. Built once by the database builder,
/// loaded read-only at process start, never mutated at query time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingStore {
    entries: BTreeMap<String, Vec<EmbeddingRecord>>,
}

impl EmbeddingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commit a batch of records under an identity label. Identities with
    /// zero successful embeddings are never inserted.
    pub fn insert(&mut self, identity: String, records: Vec<EmbeddingRecord>) {
        debug_assert!(!records.is_empty());
        self.entries.insert(identity, records);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[EmbeddingRecord])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn get(&self, identity: &str) -> Option<&[EmbeddingRecord]> {
        self.entries.get(identity).map(Vec::as_slice)
    }

    pub fn identities(&self) -> usize {
        self.entries.len()
    }

    pub fn records(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Dimensionality of the stored embeddings, if any exist. Constant
    /// across the store since all records come from one encoder model.
    pub fn dim(&self) -> Option<usize> {
        self.entries
            .values()
            .flatten()
            .next()
            .map(|r| r.embedding.len())
    }

    /// Serialize the whole store, replacing any previous database.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let data = postcard::to_allocvec(self)?;
        std::fs::write(path, data).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }

    /// Load a previously built store. A missing or corrupt database is a
    /// startup failure, never silently substituted with an empty store.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let data = std::fs::read(path).map_err(|e| Error::StoreLoad {
            path: path.to_path_buf(),
            source: Box::new(e),
        })?;
        postcard::from_bytes(&data).map_err(|e| Error::StoreLoad {
            path: path.to_path_buf(),
            source: Box::new(e),
        })
    }
}
