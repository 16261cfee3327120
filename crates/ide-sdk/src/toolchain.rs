use std::path::{Path, PathBuf};

use crate::datastore::Datastore;
use crate::error::{Error, Result};

pub(crate) fn realpath(p: &str) -> PathBuf {
    let pb = PathBuf::from(p);
    pb.canonicalize().unwrap_or(pb)
}

/// A native recipe providing host tools for the target.
#[derive(Debug, Clone)]
pub struct RecipeNative {
    pub name: String,
    pub target_arch: Option<String>,
    pub bootstrap_tasks: Vec<String>,
    pub staging_bindir_native: PathBuf,
    pub target_sys: String,
}

impl RecipeNative {
    pub fn initialize(
        name: &str,
        target_arch: Option<&str>,
        ds: &mut dyn Datastore,
    ) -> Result<Self> {
        let d = ds
            .parse_recipe(name)
            .map_err(|e| Error::config(format!("Parsing {name} recipe failed: {e}")))?;
        Ok(Self {
            name: name.to_string(),
            target_arch: target_arch.map(str::to_owned),
            bootstrap_tasks: vec![format!("{name}:do_addto_recipe_sysroot")],
            staging_bindir_native: realpath(d.require_var("STAGING_BINDIR_NATIVE")?),
            target_sys: d.require_var("TARGET_SYS")?.to_string(),
        })
    }
}

/// The cross debugger built by `gdb-cross-<arch>`.
#[derive(Debug, Clone)]
pub struct GdbCross {
    pub native: RecipeNative,
    pub gdb: PathBuf,
}

impl GdbCross {
    pub fn recipe_name(target_arch: &str) -> String {
        format!("gdb-cross-{target_arch}")
    }

    pub fn initialize(target_arch: &str, ds: &mut dyn Datastore) -> Result<Self> {
        let native =
            RecipeNative::initialize(&Self::recipe_name(target_arch), Some(target_arch), ds)?;
        let gdb = native
            .staging_bindir_native
            .join(&native.target_sys)
            .join(format!("{}-gdb", native.target_sys));
        Ok(Self { native, gdb })
    }

    pub fn gdb(&self) -> &Path {
        &self.gdb
    }

    pub fn bootstrap_tasks(&self) -> &[String] {
        &self.native.bootstrap_tasks
    }
}
