//! IDE setup against the shared sysroots of the build directory, used when no
//! single recipe owns the workspace.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::Ide;
use crate::datastore::Datastore;
use crate::error::{Error, Result};
use crate::store::{self, ArtifactStore};

pub const SHARED_SYSROOT_RECIPES: [&str; 3] = ["none", "meta-ide-support", "build-sysroots"];

pub fn is_shared_sysroot_recipe(name: &str) -> bool {
    SHARED_SYSROOT_RECIPES.contains(&name)
}

#[derive(Debug, Clone)]
pub struct MetaIdeSupport {
    pub bootstrap_tasks: Vec<String>,
    pub topdir: String,
    pub datadir: String,
    pub deploy_dir_image: PathBuf,
    pub build_sys: String,
    pub real_multimach_target_sys: String,
}

impl MetaIdeSupport {
    pub fn initialize(ds: &mut dyn Datastore) -> Result<Self> {
        let d = ds
            .parse_recipe("meta-ide-support")
            .map_err(|e| Error::config(format!("Parsing meta-ide-support recipe failed: {e}")))?;
        Ok(Self {
            bootstrap_tasks: vec!["meta-ide-support:do_build".into()],
            topdir: d.var_or_empty("TOPDIR"),
            datadir: d.require_var("datadir")?.to_string(),
            deploy_dir_image: PathBuf::from(d.require_var("DEPLOY_DIR_IMAGE")?),
            build_sys: d.var_or_empty("BUILD_SYS"),
            real_multimach_target_sys: d.require_var("REAL_MULTIMACH_TARGET_SYS")?.to_string(),
        })
    }

    pub fn environment_setup_script(&self) -> PathBuf {
        self.deploy_dir_image
            .join(format!("environment-setup-{}", self.real_multimach_target_sys))
    }
}

#[derive(Debug, Clone)]
pub struct BuildSysroots {
    pub bootstrap_tasks: Vec<String>,
    pub standalone_sysroot: String,
    pub standalone_sysroot_native: String,
}

impl BuildSysroots {
    pub fn initialize(ds: &mut dyn Datastore) -> Result<Self> {
        let d = ds
            .parse_recipe("build-sysroots")
            .map_err(|e| Error::config(format!("Parsing build-sysroots recipe failed: {e}")))?;
        Ok(Self {
            bootstrap_tasks: vec!["build-sysroots:do_build".into()],
            standalone_sysroot: d.require_var("STANDALONE_SYSROOT")?.to_string(),
            standalone_sysroot_native: d.require_var("STANDALONE_SYSROOT_NATIVE")?.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferredGenerator {
    pub name: String,
}

/// One entry of the CMake Tools kits registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CmakeKit {
    pub name: String,
    pub environment_setup_script: String,
    pub toolchain_file: String,
    pub preferred_generator: PreferredGenerator,
}

/// Replace the kit with the same environment setup script, or append.
pub fn merge_kit(kits: &mut Vec<Value>, new_kit: Value) {
    let key = new_kit.get("environmentSetupScript").cloned();
    for kit in kits.iter_mut() {
        if key.is_some() && kit.get("environmentSetupScript") == key.as_ref() {
            *kit = new_kit;
            return;
        }
    }
    kits.push(new_kit);
}

/// Merge `kit` into the kits file at `path`. Returns whether the file was
/// written; an unchanged list leaves the file untouched.
pub fn update_kits_file(store: &dyn ArtifactStore, path: &Path, kit: &CmakeKit) -> Result<bool> {
    tracing::info!("updating {}", path.display());
    let old: Vec<Value> = match store.read_text(path)? {
        Some(text) => serde_json::from_str(&text).map_err(|e| {
            Error::config(format!("failed to parse {}: {e}", path.display()))
        })?,
        None => Vec::new(),
    };
    let mut kits = old.clone();
    merge_kit(&mut kits, serde_json::to_value(kit)?);
    if kits == old {
        return Ok(false);
    }
    tracing::info!("Updating: {}", path.display());
    store::write_json_pretty(store, path, &Value::Array(kits))?;
    Ok(true)
}

pub fn default_kits_path() -> Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| Error::config("no home directory"))?;
    Ok(home
        .join(".local")
        .join("share")
        .join("CMakeTools")
        .join("cmake-tools-kits.json"))
}

#[derive(Debug, Clone)]
pub struct SharedSysrootsEnv {
    pub ide_support: MetaIdeSupport,
    pub build_sysroots: BuildSysroots,
}

impl SharedSysrootsEnv {
    pub fn new(ide_support: MetaIdeSupport, build_sysroots: BuildSysroots) -> Self {
        Self {
            ide_support,
            build_sysroots,
        }
    }

    pub fn cmake_kit(&self) -> CmakeKit {
        let sys = &self.ide_support.real_multimach_target_sys;
        CmakeKit {
            name: format!("OE {sys}"),
            environment_setup_script: self
                .ide_support
                .environment_setup_script()
                .display()
                .to_string(),
            toolchain_file: format!(
                "{}{}/cmake/OEToolchainConfig.cmake",
                self.build_sysroots.standalone_sysroot_native, self.ide_support.datadir
            ),
            preferred_generator: PreferredGenerator {
                name: "Ninja".into(),
            },
        }
    }

    pub fn setup_ide(&self, ide: Ide, store: &dyn ArtifactStore, kits_path: &Path) -> Result<()> {
        match ide {
            Ide::Code => {
                update_kits_file(store, kits_path, &self.cmake_kit())?;
            }
            Ide::None => {
                tracing::info!(
                    "source {} to use the shared sysroot toolchain",
                    self.ide_support.environment_setup_script().display()
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datastore::FixtureStore;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn env() -> SharedSysrootsEnv {
        let mut ds = FixtureStore::from_toml(
            r#"
[recipes.meta-ide-support.vars]
TOPDIR = "/build"
datadir = "/usr/share"
DEPLOY_DIR_IMAGE = "/build/tmp/deploy/images/qemuarm64"
BUILD_SYS = "x86_64-linux"
REAL_MULTIMACH_TARGET_SYS = "cortexa57-poky-linux"

[recipes.build-sysroots.vars]
STANDALONE_SYSROOT = "/build/tmp/sysroots/qemuarm64"
STANDALONE_SYSROOT_NATIVE = "/build/tmp/sysroots/x86_64"
"#,
        )
        .expect("fixture");
        SharedSysrootsEnv::new(
            MetaIdeSupport::initialize(&mut ds).expect("meta-ide-support"),
            BuildSysroots::initialize(&mut ds).expect("build-sysroots"),
        )
    }

    #[test]
    fn kit_points_at_environment_and_toolchain_file() {
        let kit = serde_json::to_value(env().cmake_kit()).expect("json");
        assert_eq!(
            kit,
            json!({
                "name": "OE cortexa57-poky-linux",
                "environmentSetupScript": "/build/tmp/deploy/images/qemuarm64/environment-setup-cortexa57-poky-linux",
                "toolchainFile": "/build/tmp/sysroots/x86_64/usr/share/cmake/OEToolchainConfig.cmake",
                "preferredGenerator": {"name": "Ninja"}
            })
        );
    }

    #[test]
    fn merge_replaces_same_script_and_appends_new() {
        let mut kits = vec![
            json!({"name": "other", "environmentSetupScript": "/a"}),
            json!({"name": "old", "environmentSetupScript": "/b"}),
            json!({"name": "no-script"}),
        ];
        merge_kit(&mut kits, json!({"name": "new", "environmentSetupScript": "/b"}));
        assert_eq!(kits.len(), 3);
        assert_eq!(kits[1]["name"], "new");
        merge_kit(&mut kits, json!({"name": "c", "environmentSetupScript": "/c"}));
        assert_eq!(kits.len(), 4);
    }

    #[test]
    fn unchanged_kits_are_not_rewritten() {
        let store = MemoryStore::new();
        let path = Path::new("/home/me/.local/share/CMakeTools/cmake-tools-kits.json");
        let kit = env().cmake_kit();
        assert!(update_kits_file(&store, path, &kit).expect("first"));
        assert!(!update_kits_file(&store, path, &kit).expect("second"));
        let kits = store.json(path).expect("kits json");
        assert_eq!(kits.as_array().map(Vec::len), Some(1));
    }
}
