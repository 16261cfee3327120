use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::store::ArtifactStore;

/// The workspace bbappend of a modified recipe, edited as plain text.
#[derive(Debug, Clone)]
pub struct BbAppend {
    path: PathBuf,
}

impl BbAppend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self, store: &dyn ArtifactStore) -> Result<String> {
        Ok(store.read_text(&self.path)?.unwrap_or_default())
    }

    pub fn contains(&self, store: &dyn ArtifactStore, text: &str) -> Result<bool> {
        Ok(self.read(store)?.contains(text))
    }

    pub fn append(&self, store: &dyn ArtifactStore, text: &str) -> Result<()> {
        let mut content = self.read(store)?;
        content.push_str(text);
        store.write_text(&self.path, &content)
    }

    pub fn remove(&self, store: &dyn ArtifactStore, text: &str) -> Result<()> {
        let content = self.read(store)?;
        store.write_text(&self.path, &content.replace(text, ""))
    }
}
