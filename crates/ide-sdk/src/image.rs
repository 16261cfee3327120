use std::path::{Path, PathBuf};

use crate::datastore::{Datastore, RecipeData};
use crate::error::{Error, Result};

/// `PACKAGE_DEBUG_SPLIT_STYLE` of the image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebugSplitStyle {
    /// `.debug`
    DotDebug,
    DebugWithSrcpkg,
    DebugFileDirectory,
    Other(String),
}

impl DebugSplitStyle {
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            ".debug" => DebugSplitStyle::DotDebug,
            "debug-with-srcpkg" => DebugSplitStyle::DebugWithSrcpkg,
            "debug-file-directory" => DebugSplitStyle::DebugFileDirectory,
            other => DebugSplitStyle::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecipeImage {
    pub name: String,
    pub bootstrap_tasks: Vec<String>,
    pub combine_dbg_image: bool,
    pub debuginfod: bool,
    pub package_debug_split_style: DebugSplitStyle,
    pub rootfs: PathBuf,
    rootfs_dbg: Option<PathBuf>,
}

impl RecipeImage {
    pub fn initialize(name: &str, ds: &mut dyn Datastore) -> Result<Self> {
        let d = ds
            .parse_recipe(name)
            .map_err(|e| Error::config(format!("Parsing image recipe {name} failed: {e}")))?;
        Self::from_data(name, &d)
    }

    pub fn from_data(name: &str, d: &RecipeData) -> Result<Self> {
        if d
            .get_var("DISTRO_FEATURES")
            .unwrap_or_default()
            .split_whitespace()
            .any(|f| f == "debuginfod")
        {
            tracing::warn!("Support for debuginfod is not implemented yet.");
        }

        let workdir = PathBuf::from(d.require_var("WORKDIR")?);
        let rootfs_dbg =
            (d.get_var("IMAGE_GEN_DEBUGFS") == Some("1")).then(|| workdir.join("rootfs-dbg"));

        Ok(Self {
            name: name.to_string(),
            bootstrap_tasks: vec![format!("{name}:do_build")],
            combine_dbg_image: d.inherits_class("image-combined-dbg"),
            debuginfod: false,
            package_debug_split_style: DebugSplitStyle::parse(
                d.get_var("PACKAGE_DEBUG_SPLIT_STYLE").unwrap_or_default(),
            ),
            rootfs: workdir.join("rootfs"),
            rootfs_dbg,
        })
    }

    /// The debug rootfs, only if it was generated and exists on disk.
    pub fn rootfs_dbg(&self) -> Option<&Path> {
        self.rootfs_dbg.as_deref().filter(|p| p.is_dir())
    }

    pub fn debug_support(&self) -> bool {
        self.debuginfod || self.rootfs_dbg().is_some()
    }

    /// Directories with shared libraries (and their debug info) in the rootfs
    /// and rootfs-dbg.
    ///
    /// The image's split style is assumed to be the global setting used by
    /// most packages.
    pub fn solib_search_path_rootfs(&self) -> Vec<PathBuf> {
        let mut rootfs_dirs: Vec<&str> = Vec::new();
        let mut rootfs_dbg_dirs: Vec<&str> = Vec::new();
        match &self.package_debug_split_style {
            DebugSplitStyle::DebugWithSrcpkg | DebugSplitStyle::DotDebug => {
                if self.combine_dbg_image {
                    rootfs_dbg_dirs = vec!["lib", "lib/.debug", "usr/lib", "usr/lib/.debug"];
                } else {
                    tracing::warn!(
                        "Adding IMAGE_CLASSES += \"image-combined-dbg\" offers better remote debugging experience."
                    );
                    rootfs_dirs = vec!["lib", "usr/lib"];
                    rootfs_dbg_dirs = vec!["lib/.debug", "usr/lib/.debug"];
                }
            }
            DebugSplitStyle::DebugFileDirectory => {
                rootfs_dbg_dirs = vec!["usr/lib/debug"];
            }
            DebugSplitStyle::Other(style) => {
                tracing::warn!(
                    "Cannot find solib search path for a rootfs built with PACKAGE_DEBUG_SPLIT_STYLE={style}."
                );
            }
        }

        let mut out: Vec<PathBuf> = rootfs_dirs.iter().map(|d| self.rootfs.join(d)).collect();
        if let Some(dbg) = self.rootfs_dbg() {
            out.extend(rootfs_dbg_dirs.iter().map(|d| dbg.join(d)));
        }
        out
    }
}
