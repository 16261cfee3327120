//! File output for generated artifacts.
//!
//! Every JSON file, script and registry the tool produces goes through an
//! [`ArtifactStore`], so the same generation code can write to disk or render
//! into memory for `--dry-run` and tests. Each call re-reads current state;
//! nothing is cached between calls.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde_json::Value;

use crate::error::{Error, Result};

pub trait ArtifactStore {
    /// `Ok(None)` when the file does not exist.
    fn read_text(&self, path: &Path) -> Result<Option<String>>;
    fn write_text(&self, path: &Path, content: &str) -> Result<()>;
    fn set_executable(&self, path: &Path) -> Result<()>;
    fn remove_dir_all(&self, path: &Path) -> Result<()>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FsStore;

impl ArtifactStore for FsStore {
    fn read_text(&self, path: &Path) -> Result<Option<String>> {
        match fs::read_to_string(path) {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::msg(format!("failed to read {}: {e}", path.display()))),
        }
    }

    fn write_text(&self, path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            ensure_dir(parent)?;
        }
        fs::write(path, content)
            .map_err(|e| Error::msg(format!("failed to write {}: {e}", path.display())))
    }

    #[cfg(unix)]
    fn set_executable(&self, path: &Path) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;
        let meta = fs::metadata(path)
            .map_err(|e| Error::msg(format!("failed to stat {}: {e}", path.display())))?;
        let mut perms = meta.permissions();
        let mode = perms.mode();
        let wanted = mode | 0o111;
        if wanted != mode {
            perms.set_mode(wanted);
            fs::set_permissions(path, perms).map_err(|e| {
                Error::msg(format!(
                    "failed to set executable bit on {}: {e}",
                    path.display()
                ))
            })?;
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn set_executable(&self, _path: &Path) -> Result<()> {
        Ok(())
    }

    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        if !path.exists() {
            return Ok(());
        }
        fs::remove_dir_all(path)
            .map_err(|e| Error::msg(format!("failed to remove dir {}: {e}", path.display())))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryFile {
    pub content: String,
    pub executable: bool,
}

/// In-memory store. Writes are kept by path; reads fall back to nothing.
#[derive(Debug, Default)]
pub struct MemoryStore {
    files: Mutex<BTreeMap<PathBuf, MemoryFile>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &Path) -> Option<MemoryFile> {
        self.files.lock().ok()?.get(path).cloned()
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.files
            .lock()
            .map(|g| g.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn json(&self, path: &Path) -> Option<Value> {
        serde_json::from_str(&self.get(path)?.content).ok()
    }
}

impl ArtifactStore for MemoryStore {
    fn read_text(&self, path: &Path) -> Result<Option<String>> {
        let g = self
            .files
            .lock()
            .map_err(|_| Error::msg("memory store poisoned"))?;
        Ok(g.get(path).map(|f| f.content.clone()))
    }

    fn write_text(&self, path: &Path, content: &str) -> Result<()> {
        let mut g = self
            .files
            .lock()
            .map_err(|_| Error::msg("memory store poisoned"))?;
        let executable = g.get(path).map(|f| f.executable).unwrap_or(false);
        g.insert(
            path.to_path_buf(),
            MemoryFile {
                content: content.to_string(),
                executable,
            },
        );
        Ok(())
    }

    fn set_executable(&self, path: &Path) -> Result<()> {
        let mut g = self
            .files
            .lock()
            .map_err(|_| Error::msg("memory store poisoned"))?;
        match g.get_mut(path) {
            Some(f) => {
                f.executable = true;
                Ok(())
            }
            None => Err(Error::msg(format!(
                "cannot chmod missing file {}",
                path.display()
            ))),
        }
    }

    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        let mut g = self
            .files
            .lock()
            .map_err(|_| Error::msg("memory store poisoned"))?;
        g.retain(|p, _| !p.starts_with(path));
        Ok(())
    }
}

pub fn ensure_dir(p: &Path) -> Result<()> {
    fs::create_dir_all(p)
        .map_err(|e| Error::msg(format!("failed to create dir {}: {e}", p.display())))
}

pub fn to_json_pretty(v: &Value) -> Result<String> {
    let mut s = serde_json::to_string_pretty(v)
        .map_err(|e| Error::msg(format!("json encode error: {e}")))?;
    s.push('\n');
    Ok(s)
}

pub fn write_json_pretty(store: &dyn ArtifactStore, p: &Path, v: &Value) -> Result<()> {
    store.write_text(p, &to_json_pretty(v)?)
}

/// Write a `#!/bin/sh` script from lines and mark it executable.
pub fn write_script(store: &dyn ArtifactStore, p: &Path, lines: &[String]) -> Result<()> {
    let mut body = lines.join("\n");
    body.push('\n');
    store.write_text(p, &body)?;
    store.set_executable(p)
}

/// Read-merge-write of a JSON object file.
///
/// Top-level keys of `update` replace the existing ones; unknown keys already
/// in the file are preserved. A file that does not parse (editors allow
/// comments in these files) is treated as empty.
pub fn update_json_file(store: &dyn ArtifactStore, path: &Path, update: Value) -> Result<()> {
    tracing::info!("updating {}", path.display());
    let mut orig = match store.read_text(path)? {
        Some(text) => match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(map)) => map,
            Ok(_) | Err(_) => {
                tracing::info!(
                    "decoding {} failed, probably because of comments in the json file",
                    path.display()
                );
                serde_json::Map::new()
            }
        },
        None => serde_json::Map::new(),
    };
    let Value::Object(update) = update else {
        return Err(Error::msg(format!(
            "json update for {} must be an object",
            path.display()
        )));
    };
    for (k, v) in update {
        orig.insert(k, v);
    }
    write_json_pretty(store, path, &Value::Object(orig))
}
