//! The devtool workspace: which recipes have an externally modified source
//! tree, and where.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};

use regex::Regex;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceRecipe {
    pub srctree: PathBuf,
    pub bbappend: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct Workspace {
    pub path: PathBuf,
    recipes: BTreeMap<String, WorkspaceRecipe>,
}

impl Workspace {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            recipes: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, pn: impl Into<String>, recipe: WorkspaceRecipe) {
        self.recipes.insert(pn.into(), recipe);
    }

    /// Read `<workspace>/appends/*.bbappend` as written by `devtool modify`.
    pub fn load(path: &Path) -> Result<Self> {
        let mut ws = Self::new(path);
        let appends = path.join("appends");
        if !appends.is_dir() {
            tracing::debug!("no appends directory in {}", path.display());
            return Ok(ws);
        }
        let externalsrc = Regex::new(r#"^EXTERNALSRC[:_]pn-(\S+)\s*\??=\s*"([^"]*)""#)
            .map_err(|e| Error::msg(format!("regex error: {e}")))?;

        let mut entries = fs::read_dir(&appends)
            .map_err(|e| Error::config(format!("failed to read {}: {e}", appends.display())))?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().and_then(|s| s.to_str()) == Some("bbappend"))
            .collect::<Vec<_>>();
        entries.sort();

        for bbappend in entries {
            let text = fs::read_to_string(&bbappend).map_err(|e| {
                Error::config(format!("failed to read {}: {e}", bbappend.display()))
            })?;
            for line in text.lines() {
                if let Some(c) = externalsrc.captures(line.trim()) {
                    ws.insert(
                        c[1].to_string(),
                        WorkspaceRecipe {
                            srctree: PathBuf::from(&c[2]),
                            bbappend: bbappend.clone(),
                        },
                    );
                }
            }
        }
        Ok(ws)
    }

    pub fn recipe_names(&self) -> impl Iterator<Item = &str> {
        self.recipes.keys().map(String::as_str)
    }

    /// Find the workspace entry for `pn`, also accepting BBCLASSEXTEND
    /// variants (`-native`, `nativesdk-`) of a workspace recipe.
    pub fn check_recipe(&self, pn: &str) -> Result<(&str, &WorkspaceRecipe)> {
        if let Some((k, v)) = self.recipes.get_key_value(pn) {
            return Ok((k.as_str(), v));
        }
        for (k, v) in &self.recipes {
            if pn == format!("{k}-native") || pn == format!("nativesdk-{k}") {
                return Ok((k.as_str(), v));
            }
        }
        Err(Error::config(format!(
            "No recipe named '{}' in your workspace",
            pn
        )))
    }

    pub fn temp_dir(&self, recipe: &str) -> PathBuf {
        self.path.join("temp").join(recipe)
    }
}

/// Source tree to open in the IDE. `S` may point into a subdirectory of the
/// unpacked sources, in which case the same subdirectory of `srctree` is used.
pub fn real_srctree(srctree: &Path, s: &Path, workdir: &Path) -> PathBuf {
    let Ok(rel) = s.strip_prefix(workdir) else {
        return srctree.to_path_buf();
    };
    let parts: Vec<Component> = rel.components().collect();
    if parts.len() < 2 {
        return srctree.to_path_buf();
    }
    let sub: PathBuf = parts[1..].iter().collect();
    srctree.join(sub)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_externalsrc_from_appends() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let appends = tmp.path().join("appends");
        fs::create_dir_all(&appends).expect("mkdir");
        fs::write(
            appends.join("cmake-example.bbappend"),
            r#"inherit externalsrc
# NOTE: We use pn- overrides here to avoid affecting multiple variants in the case where the recipe uses BBCLASSEXTEND
EXTERNALSRC:pn-cmake-example = "/ws/sources/cmake-example"
EXTERNALSRC_BUILD:pn-cmake-example = "/ws/sources/cmake-example"
"#,
        )
        .expect("write bbappend");
        fs::write(appends.join("README"), "ignored").expect("write readme");

        let ws = Workspace::load(tmp.path()).expect("load");
        let (pn, r) = ws.check_recipe("cmake-example").expect("in workspace");
        assert_eq!(pn, "cmake-example");
        assert_eq!(r.srctree, PathBuf::from("/ws/sources/cmake-example"));
        assert_eq!(r.bbappend, appends.join("cmake-example.bbappend"));

        let (pn, _) = ws.check_recipe("cmake-example-native").expect("native variant");
        assert_eq!(pn, "cmake-example");
        assert!(ws.check_recipe("zlib").is_err());
    }

    #[test]
    fn real_srctree_follows_s_subdirectory() {
        let srctree = Path::new("/ws/sources/foo");
        let workdir = Path::new("/build/tmp/work/foo/1.0");
        assert_eq!(
            real_srctree(srctree, &workdir.join("git/src"), workdir),
            PathBuf::from("/ws/sources/foo/src")
        );
        assert_eq!(
            real_srctree(srctree, &workdir.join("git"), workdir),
            PathBuf::from("/ws/sources/foo")
        );
        assert_eq!(
            real_srctree(srctree, Path::new("/elsewhere"), workdir),
            PathBuf::from("/ws/sources/foo")
        );
    }
}
