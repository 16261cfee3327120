//! A recipe under `devtool modify`: everything needed to build, install,
//! deploy and debug it from an IDE without going through bitbake.

pub mod bbappend;
pub mod binaries;
pub mod build_tool;
pub mod cmake;
pub mod env;
pub mod meson;
pub mod scripts;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::{Ide, Strictness};
use crate::datastore::{Datastore, RecipeData};
use crate::error::{Error, Result};
use crate::gdbserver::GdbServerRegistry;
use crate::ide::{self, IdeContext};
use crate::image::RecipeImage;
use crate::store::ArtifactStore;
use crate::toolchain::realpath;
use crate::workspace::{Workspace, real_srctree};

use bbappend::BbAppend;
use build_tool::{BuildTool, NoBuildTool};
use cmake::CmakeConfig;
use meson::MesonConfig;

/// Paths and variables of a modified recipe, resolved once at startup.
#[derive(Debug, Clone)]
pub struct RecipeInfo {
    pub name: String,
    pub bpn: String,
    pub srctree: PathBuf,
    pub real_srctree: PathBuf,
    pub bbappend: BbAppend,
    pub temp_dir: PathBuf,
    pub b: PathBuf,
    pub d: PathBuf,
    pub fakerootcmd: String,
    pub fakerootenv: String,
    pub package_arch: String,
    /// `PATH` of the recipe's build environment.
    pub path: String,
    pub recipe_sysroot: PathBuf,
    pub recipe_sysroot_native: PathBuf,
    pub staging_incdir: PathBuf,
    pub staging_bindir_toolchain: PathBuf,
    pub target_arch: String,
    pub workdir: PathBuf,
    pub bb_env_passthrough_additions: String,
    pub bbpath: String,
    pub bitbakepath: String,
    pub topdir: PathBuf,
    pub cxx: String,
    pub strip: String,
    pub libdir: String,
    pub base_libdir: String,
    pub exported_vars: BTreeMap<String, String>,
    pub dot_code_dir: PathBuf,
}

impl RecipeInfo {
    pub fn from_data(
        name: &str,
        d: &RecipeData,
        workspace: &Workspace,
    ) -> Result<Self> {
        let (_, ws_recipe) = workspace.check_recipe(name)?;
        let srctree = ws_recipe.srctree.clone();
        let workdir_raw = d.require_var("WORKDIR")?;
        let real_srctree = real_srctree(
            &srctree,
            Path::new(d.require_var("S")?),
            Path::new(workdir_raw),
        );

        Ok(Self {
            name: name.to_string(),
            bpn: d.require_var("BPN")?.to_string(),
            real_srctree,
            bbappend: BbAppend::new(&ws_recipe.bbappend),
            temp_dir: workspace.temp_dir(name),
            b: PathBuf::from(d.require_var("B")?),
            d: PathBuf::from(d.require_var("D")?),
            fakerootcmd: d.var_or_empty("FAKEROOTCMD"),
            fakerootenv: d.var_or_empty("FAKEROOTENV"),
            package_arch: d.require_var("PACKAGE_ARCH")?.to_string(),
            path: d.var_or_empty("PATH"),
            recipe_sysroot: realpath(d.require_var("RECIPE_SYSROOT")?),
            recipe_sysroot_native: realpath(d.require_var("RECIPE_SYSROOT_NATIVE")?),
            staging_incdir: realpath(&d.var_or_empty("STAGING_INCDIR")),
            staging_bindir_toolchain: PathBuf::from(d.var_or_empty("STAGING_BINDIR_TOOLCHAIN")),
            target_arch: d.require_var("TARGET_ARCH")?.to_string(),
            workdir: realpath(workdir_raw),
            bb_env_passthrough_additions: d.var_or_empty("BB_ENV_PASSTHROUGH_ADDITIONS"),
            bbpath: d.var_or_empty("BBPATH"),
            bitbakepath: d.var_or_empty("BITBAKEPATH"),
            topdir: PathBuf::from(d.var_or_empty("TOPDIR")),
            cxx: d.var_or_empty("CXX"),
            strip: d.var_or_empty("STRIP"),
            libdir: d.var_or_empty("libdir"),
            base_libdir: d.var_or_empty("base_libdir"),
            exported_vars: env::exported_variables(d),
            dot_code_dir: srctree.join(".vscode"),
            srctree,
        })
    }

    /// The C++ compiler without its flags.
    pub fn cxx_compiler(&self) -> Option<&str> {
        self.cxx.split_whitespace().next()
    }

    /// Strip for the target, preferring the toolchain's own copy.
    pub fn strip_cmd(&self) -> String {
        let Some(strip) = self.strip.split_whitespace().next() else {
            return "strip".into();
        };
        let candidate = self.staging_bindir_toolchain.join(strip);
        if candidate.is_file() {
            candidate.display().to_string()
        } else {
            strip.to_string()
        }
    }

    /// Locate `executable` on the recipe's `PATH`.
    pub fn which(&self, executable: &str) -> Result<PathBuf> {
        which::which_in(executable, Some(&self.path), &self.workdir).map_err(|_| {
            Error::missing_executable(format!(
                "Cannot find {executable}. Probably the recipe {} is not built yet.",
                self.bpn
            ))
        })
    }

    pub fn solib_search_path_sysroot(&self) -> Vec<PathBuf> {
        ["lib", "usr/lib"]
            .iter()
            .map(|p| self.recipe_sysroot.join(p))
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct RecipeModified {
    pub info: RecipeInfo,
    pub build_tool: BuildTool,
    pub bootstrap_tasks: Vec<String>,
    /// Compiles the recipe in its bitbake build folder, once the build tool
    /// integration has been generated.
    pub cmd_compile: Option<String>,
}

impl RecipeModified {
    pub fn initialize(
        name: &str,
        ds: &mut dyn Datastore,
        workspace: &Workspace,
        store: &dyn ArtifactStore,
        strictness: Strictness,
    ) -> Result<Self> {
        let d = ds
            .parse_recipe(name)
            .map_err(|e| Error::config(format!("Parsing {name} recipe failed: {e}")))?;
        let recipe = Self::from_data(name, &d, workspace, strictness)?;
        store.remove_dir_all(&recipe.info.temp_dir)?;
        Ok(recipe)
    }

    pub fn from_data(
        name: &str,
        d: &RecipeData,
        workspace: &Workspace,
        strictness: Strictness,
    ) -> Result<Self> {
        let info = RecipeInfo::from_data(name, d, workspace)?;
        let build_tool = if d.inherits_class("cmake") {
            BuildTool::Cmake(CmakeConfig::from_data(d, &info, strictness)?)
        } else if d.inherits_class("meson") {
            BuildTool::Meson(MesonConfig::from_data(d))
        } else {
            BuildTool::None(NoBuildTool)
        };
        tracing::debug!(
            "recipe {name} uses build tool {}",
            build_tool.support().name()
        );
        Ok(Self {
            info,
            build_tool,
            bootstrap_tasks: vec![format!("{name}:do_install")],
            cmd_compile: None,
        })
    }

    pub fn debug_build_config(
        &mut self,
        enable: bool,
        store: &dyn ArtifactStore,
        strictness: Strictness,
    ) -> Result<()> {
        let bbappend = self.info.bbappend.clone();
        self.build_tool
            .support_mut()
            .debug_build_config(enable, &bbappend, store, strictness)
    }

    pub fn solib_search_path(&self, image: &RecipeImage) -> Vec<PathBuf> {
        let mut out = image.solib_search_path_rootfs();
        out.extend(self.info.solib_search_path_sysroot());
        out
    }

    pub fn solib_search_path_str(&self, image: &RecipeImage) -> String {
        self.solib_search_path(image)
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(":")
    }

    /// Generate every artifact for `ctx.ide`.
    pub fn setup_ide(
        &mut self,
        ctx: &IdeContext<'_>,
        gdbservers: &mut GdbServerRegistry,
    ) -> Result<()> {
        self.cmd_compile = self
            .build_tool
            .support_mut()
            .generate(&self.info, ctx.store)?;

        match ctx.ide {
            Ide::Code => {
                ide::vscode::settings(self, ctx.store)?;
                ide::vscode::extensions(self, ctx.store)?;
                ide::vscode::c_cpp_properties(self, ctx.store)?;
                if !gdbservers.target().target.is_empty() {
                    ide::vscode::launch(self, ctx, gdbservers)?;
                    let scripts = scripts::generate(self, ctx, gdbservers)?;
                    ide::vscode::tasks(self, &scripts, gdbservers, ctx.store)?;
                }
            }
            Ide::None => {
                if self.build_tool.is_none() {
                    tracing::info!(
                        "recipe {} has no cmake or meson integration, nothing to generate",
                        self.info.name
                    );
                    return Ok(());
                }
                let written = ide::gdbinit::write_gdbinit_files(self, ctx, gdbservers)?;
                let scripts = scripts::generate(self, ctx, gdbservers)?;
                for p in &written {
                    tracing::info!("gdbinit: {}", p.display());
                }
                tracing::info!("install and deploy: {}", scripts.install_and_deploy.display());
            }
        }
        Ok(())
    }
}
