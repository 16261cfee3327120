//! `ide-sdk setup`: resolve the recipe, image and toolchain, bring the SDK
//! up to date with bitbake, then write the IDE configuration.

use std::path::PathBuf;

use crate::config::{Ide, Strictness};
use crate::datastore::Datastore;
use crate::error::Result;
use crate::exec::BuildEnv;
use crate::gdbserver::GdbServerRegistry;
use crate::ide::IdeContext;
use crate::image::RecipeImage;
use crate::recipe::RecipeModified;
use crate::shared_sysroot::{
    BuildSysroots, MetaIdeSupport, SharedSysrootsEnv, default_kits_path,
    is_shared_sysroot_recipe,
};
use crate::store::ArtifactStore;
use crate::target::{TargetDevice, TargetOptions};
use crate::toolchain::GdbCross;
use crate::workspace::Workspace;

#[derive(Debug, Clone)]
pub struct SetupOptions {
    pub recipename: String,
    pub image: String,
    pub ide: Ide,
    pub target: TargetOptions,
    pub gdbserver_port_start: u16,
    pub skip_bitbake: bool,
    pub bitbake_k: bool,
    pub debug_build_config: bool,
    pub strictness: Strictness,
    /// Where rebuild output is captured; `None` logs only.
    pub log_dir: Option<PathBuf>,
    /// Overrides the user's CMake kits file.
    pub kits_path: Option<PathBuf>,
    pub tool_exe: PathBuf,
}

/// The external collaborators of a setup run.
pub struct SetupEnv<'a> {
    pub datastore: &'a mut dyn Datastore,
    pub workspace: &'a Workspace,
    pub build_env: &'a dyn BuildEnv,
    pub store: &'a dyn ArtifactStore,
}

enum SdkEnv {
    Shared(SharedSysrootsEnv),
    Recipe {
        recipe: Box<RecipeModified>,
        gdb_cross: GdbCross,
        gdbservers: GdbServerRegistry,
    },
}

pub fn bitbake_command(keep_going: bool, tasks: &[String]) -> String {
    let mut cmd = String::from("bitbake ");
    if keep_going {
        cmd.push_str("-k ");
    }
    cmd.push_str(&tasks.join(" "));
    cmd
}

pub fn ide_setup(opts: &SetupOptions, env: SetupEnv<'_>) -> Result<()> {
    let SetupEnv {
        datastore,
        workspace,
        build_env,
        store,
    } = env;
    let mut bootstrap_tasks: Vec<String> = Vec::new();

    let image = RecipeImage::initialize(&opts.image, datastore)?;
    bootstrap_tasks.extend(image.bootstrap_tasks.iter().cloned());

    let target = TargetDevice::new(&opts.target, opts.strictness)?;

    let mut sdk_env = if is_shared_sysroot_recipe(&opts.recipename) {
        let ide_support = MetaIdeSupport::initialize(datastore)?;
        bootstrap_tasks.extend(ide_support.bootstrap_tasks.iter().cloned());
        let build_sysroots = BuildSysroots::initialize(datastore)?;
        bootstrap_tasks.extend(build_sysroots.bootstrap_tasks.iter().cloned());
        SdkEnv::Shared(SharedSysrootsEnv::new(ide_support, build_sysroots))
    } else {
        let recipe = RecipeModified::initialize(
            &opts.recipename,
            datastore,
            workspace,
            store,
            opts.strictness,
        )?;
        bootstrap_tasks.extend(recipe.bootstrap_tasks.iter().cloned());

        // plain gdb reattaches to one long-running gdbserver per binary
        let multi = opts.ide != Ide::Code;
        let gdb_cross = GdbCross::initialize(&recipe.info.target_arch, datastore)?;
        bootstrap_tasks.extend(gdb_cross.bootstrap_tasks().iter().cloned());
        SdkEnv::Recipe {
            recipe: Box::new(recipe),
            gdb_cross,
            gdbservers: GdbServerRegistry::new(target, opts.gdbserver_port_start, multi),
        }
    };

    if let SdkEnv::Recipe { recipe, .. } = &mut sdk_env {
        recipe.debug_build_config(opts.debug_build_config, store, opts.strictness)?;
    }

    if opts.skip_bitbake {
        tracing::info!("skipping bitbake, the SDK may be out of date");
    } else {
        let cmd = bitbake_command(opts.bitbake_k, &bootstrap_tasks);
        let log_file = opts.log_dir.as_ref().map(|dir| {
            dir.join(format!(
                "bitbake-{}.log",
                chrono::Local::now().format("%Y%m%d-%H%M%S")
            ))
        });
        build_env.run(&cmd, log_file.as_deref())?;
    }

    match sdk_env {
        SdkEnv::Shared(shared) => {
            let kits_path = match &opts.kits_path {
                Some(p) => p.clone(),
                None => default_kits_path()?,
            };
            shared.setup_ide(opts.ide, store, &kits_path)
        }
        SdkEnv::Recipe {
            mut recipe,
            gdb_cross,
            mut gdbservers,
        } => {
            let ctx = IdeContext {
                ide: opts.ide,
                image: &image,
                gdb_cross: &gdb_cross,
                store,
                tool_exe: &opts.tool_exe,
            };
            recipe.setup_ide(&ctx, &mut gdbservers)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitbake_command_lists_tasks_in_order() {
        let tasks = vec![
            "core-image-minimal:do_build".to_string(),
            "demo:do_install".to_string(),
        ];
        assert_eq!(
            bitbake_command(false, &tasks),
            "bitbake core-image-minimal:do_build demo:do_install"
        );
        assert_eq!(
            bitbake_command(true, &tasks),
            "bitbake -k core-image-minimal:do_build demo:do_install"
        );
    }
}
