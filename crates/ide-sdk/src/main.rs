use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use ide_sdk::Result;
use ide_sdk::config::{
    self, DEFAULT_GDBSERVER_PORT_START, DEFAULT_TARGET, Ide, Settings, Strictness,
};
use ide_sdk::datastore::{BitbakeEnvStore, Datastore, FixtureStore};
use ide_sdk::deploy::{DeployRequest, DeployRoutine, SshTarDeploy};
use ide_sdk::exec::ShellBuildEnv;
use ide_sdk::setup::{self, SetupEnv, SetupOptions};
use ide_sdk::store::{ArtifactStore, FsStore, MemoryStore};
use ide_sdk::target::TargetOptions;
use ide_sdk::workspace::{Workspace, WorkspaceRecipe};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Default log filter; RUST_LOG takes precedence
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,
    /// Settings TOML (default: <builddir>/conf/ide-sdk.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, clap::Args)]
struct TargetArgs {
    /// Disable ssh host key checking
    #[arg(short = 'c', long)]
    no_host_check: bool,
    /// Executable to use in place of ssh
    #[arg(short = 'e', long)]
    ssh_exec: Option<String>,
    /// Ssh port to use for the connection to the target
    #[arg(short = 'P', long)]
    port: Option<String>,
    /// Ssh private key for the connection to the target
    #[arg(short = 'I', long)]
    key: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Configure the IDE to work with the source code of a recipe
    Setup {
        /// Recipe in the devtool workspace, or one of none, meta-ide-support,
        /// build-sysroots for the shared sysroots
        recipename: String,
        /// The image running on the target device
        image: String,
        #[arg(short = 'i', long, value_enum)]
        ide: Option<Ide>,
        /// Live target machine running an ssh server: user@hostname
        #[arg(short = 't', long)]
        target: Option<String>,
        /// First port gdbserver listens on
        #[arg(short = 'G', long)]
        gdbserver_port_start: Option<u16>,
        #[command(flatten)]
        target_args: TargetArgs,
        /// Generate the configuration without calling bitbake to update the SDK
        #[arg(long)]
        skip_bitbake: bool,
        /// Pass -k to bitbake
        #[arg(short = 'k', long)]
        bitbake_k: bool,
        /// Use debug build flags, for example CMAKE_BUILD_TYPE=Debug
        #[arg(long)]
        debug_build_config: bool,
        /// Fail on malformed input instead of logging it
        #[arg(long)]
        strict: bool,
        /// List the generated files instead of writing them
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        builddir: Option<PathBuf>,
        /// devtool workspace (default: <builddir>/workspace)
        #[arg(long)]
        workspace: Option<PathBuf>,
        /// Read recipe variables from a TOML fixture instead of bitbake
        #[arg(long)]
        fixture: Option<PathBuf>,
    },
    /// Copy the installed files of a recipe to the target
    DeployTarget {
        /// Live target machine running an ssh server: user@hostname
        target: String,
        #[arg(long)]
        image_dir: PathBuf,
        #[arg(long)]
        workdir: PathBuf,
        #[arg(long)]
        fakeroot_cmd: Option<String>,
        /// Environment for the fakeroot command: K=V pairs
        #[arg(long, default_value = "")]
        fakeroot_env: String,
        #[arg(long)]
        strip_cmd: Option<String>,
        #[arg(long, default_value = "/usr/lib")]
        libdir: String,
        #[arg(long, default_value = "/lib")]
        base_libdir: String,
        /// Strip executables and libraries before copying
        #[arg(short = 's', long)]
        strip: bool,
        #[command(flatten)]
        target_args: TargetArgs,
    },
}

fn init_logging(args: &Args) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    match args.log_format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(&args);
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(1)
        }
    }
}

fn run(args: Args) -> Result<()> {
    match args.cmd {
        Command::Setup {
            recipename,
            image,
            ide,
            target,
            gdbserver_port_start,
            target_args,
            skip_bitbake,
            bitbake_k,
            debug_build_config,
            strict,
            dry_run,
            builddir,
            workspace,
            fixture,
        } => {
            let env_builddir = std::env::var_os("BUILDDIR").map(PathBuf::from);
            let settings = config::load_for(
                args.config.as_deref(),
                builddir.as_deref().or(env_builddir.as_deref()),
            )?;
            let builddir = builddir
                .or_else(|| settings.paths.builddir.clone())
                .or(env_builddir)
                .map(Ok)
                .unwrap_or_else(std::env::current_dir)?;
            let workspace_path = workspace
                .or_else(|| settings.paths.workspace.clone())
                .unwrap_or_else(|| builddir.join("workspace"));

            let opts = SetupOptions {
                ide: ide
                    .or(settings.setup.ide)
                    .unwrap_or_else(Ide::detect_default),
                target: TargetOptions {
                    target: target
                        .or_else(|| settings.setup.target.clone())
                        .unwrap_or_else(|| DEFAULT_TARGET.to_string()),
                    ..target_options(target_args, &settings)
                },
                gdbserver_port_start: gdbserver_port_start
                    .or(settings.setup.gdbserver_port_start)
                    .unwrap_or(DEFAULT_GDBSERVER_PORT_START),
                skip_bitbake: skip_bitbake || dry_run || settings.bitbake.skip.unwrap_or(false),
                bitbake_k: bitbake_k || settings.bitbake.keep_going.unwrap_or(false),
                debug_build_config,
                strictness: Strictness::from_flag(strict || settings.setup.strict.unwrap_or(false)),
                log_dir: (!dry_run).then(|| {
                    Workspace::new(&workspace_path)
                        .temp_dir(&recipename)
                        .join("logs")
                }),
                kits_path: None,
                tool_exe: std::env::current_exe()?,
                recipename,
                image,
            };
            cmd_setup(
                &opts,
                &builddir,
                &workspace_path,
                fixture.as_deref(),
                settings.bitbake.init_script.clone(),
                dry_run,
            )
        }
        Command::DeployTarget {
            target,
            image_dir,
            workdir,
            fakeroot_cmd,
            fakeroot_env,
            strip_cmd,
            libdir,
            base_libdir,
            strip,
            target_args,
        } => {
            let req = DeployRequest {
                image_dir,
                workdir,
                fakeroot_cmd,
                fakeroot_env,
                strip_cmd,
                libdir,
                base_libdir,
                strip,
                target: TargetOptions {
                    target,
                    ..target_options(target_args, &Settings::default())
                },
            };
            let build_env = ShellBuildEnv::new(None, req.workdir.clone());
            SshTarDeploy::new(&build_env).deploy(&req)
        }
    }
}

fn target_options(a: TargetArgs, settings: &Settings) -> TargetOptions {
    TargetOptions {
        target: String::new(),
        key: a.key.or_else(|| settings.setup.key.clone()),
        port: a.port.or_else(|| settings.setup.port.clone()),
        ssh_exec: a.ssh_exec.or_else(|| settings.setup.ssh_exec.clone()),
        no_host_check: a.no_host_check || settings.setup.no_host_check.unwrap_or(false),
    }
}

fn cmd_setup(
    opts: &SetupOptions,
    builddir: &Path,
    workspace_path: &Path,
    fixture: Option<&Path>,
    init_script: Option<PathBuf>,
    dry_run: bool,
) -> Result<()> {
    let build_env = ShellBuildEnv::new(init_script, builddir.to_path_buf());
    let mut workspace = Workspace::load(workspace_path)?;

    let mut fixture_store;
    let mut bitbake_store;
    let datastore: &mut dyn Datastore = match fixture {
        Some(p) => {
            fixture_store = FixtureStore::load(p)?;
            for (pn, entry) in &fixture_store.file.workspace {
                workspace.insert(
                    pn.clone(),
                    WorkspaceRecipe {
                        srctree: entry.srctree.clone(),
                        bbappend: entry.bbappend.clone(),
                    },
                );
            }
            &mut fixture_store
        }
        None => {
            bitbake_store = BitbakeEnvStore::new(&build_env);
            &mut bitbake_store
        }
    };

    let memory = MemoryStore::new();
    let store: &dyn ArtifactStore = if dry_run { &memory } else { &FsStore };

    setup::ide_setup(
        opts,
        SetupEnv {
            datastore,
            workspace: &workspace,
            build_env: &build_env,
            store,
        },
    )?;

    if dry_run {
        for path in memory.paths() {
            println!("{}", path.display());
        }
    }
    Ok(())
}
