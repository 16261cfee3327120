//! VSCode workspace files under `<srctree>/.vscode`.

use serde_json::{Map, Value, json};

use crate::error::Result;
use crate::gdbserver::GdbServerRegistry;
use crate::ide::IdeContext;
use crate::recipe::RecipeModified;
use crate::recipe::binaries::find_installed_binaries;
use crate::recipe::scripts::RecipeScripts;
use crate::store::{self, ArtifactStore};

const EXCLUDE_GLOBS: [&str; 5] = [
    "**/.git/**",
    "**/oe-local-files/**",
    "**/oe-logs/**",
    "**/oe-workdir/**",
    "**/source-date-epoch/**",
];

fn update(recipe: &RecipeModified, store: &dyn ArtifactStore, file: &str, v: Value) -> Result<()> {
    store::update_json_file(store, &recipe.info.dot_code_dir.join(file), v)
}

pub fn settings(recipe: &RecipeModified, store: &dyn ArtifactStore) -> Result<()> {
    let excludes: Map<String, Value> = EXCLUDE_GLOBS
        .iter()
        .map(|g| (g.to_string(), Value::Bool(true)))
        .collect();
    let mut settings = Map::new();
    settings.insert("files.watcherExclude".into(), Value::Object(excludes.clone()));
    settings.insert("files.exclude".into(), Value::Object(excludes));
    settings.insert("python.analysis.exclude".into(), json!(EXCLUDE_GLOBS));
    recipe
        .build_tool
        .support()
        .editor_settings(&recipe.info, &mut settings);
    update(recipe, store, "settings.json", Value::Object(settings))
}

pub fn extensions(recipe: &RecipeModified, store: &dyn ArtifactStore) -> Result<()> {
    let mut recommendations = vec!["EditorConfig.EditorConfig".to_string()];
    recipe
        .build_tool
        .support()
        .extension_recommendations(&mut recommendations);
    update(
        recipe,
        store,
        "extensions.json",
        json!({ "recommendations": recommendations }),
    )
}

/// Best guess of the IntelliSense mode for a cross compiler name.
pub fn intelli_sense_mode(compiler: &str) -> String {
    let linux = if compiler.contains("linux") { "linux-" } else { "" };
    let cxx = if compiler.contains("g++") {
        Some("gcc-")
    } else if compiler.contains("clang") {
        Some("clang-")
    } else {
        None
    };
    let arch = if compiler.contains("aarch64") {
        Some("arm64")
    } else if compiler.contains("arm") {
        Some("arm")
    } else if compiler.contains("x86_64") {
        Some("x64")
    } else if compiler.contains("i386") {
        Some("x86")
    } else {
        None
    };
    match (cxx, arch) {
        (Some(cxx), Some(arch)) => format!("{linux}{cxx}{arch}"),
        (cxx, arch) => {
            tracing::warn!(
                "Cannot guess intelliSenseMode for compiler {compiler} ({linux}{}{})",
                cxx.unwrap_or("unknown-"),
                arch.unwrap_or("unknown")
            );
            "${default}".into()
        }
    }
}

pub fn c_cpp_properties(recipe: &RecipeModified, store: &dyn ArtifactStore) -> Result<()> {
    let info = &recipe.info;
    let mut config = Map::new();
    config.insert("name".into(), json!(format!("Yocto {}", info.package_arch)));
    if let Some(provider) = recipe.build_tool.support().configuration_provider() {
        config.insert("configurationProvider".into(), json!(provider));
    }
    if let Some(compiler) = info.cxx_compiler() {
        config.insert("intelliSenseMode".into(), json!(intelli_sense_mode(compiler)));
        match info.which(compiler) {
            Ok(path) => {
                config.insert("compilerPath".into(), json!(path.display().to_string()));
            }
            Err(e) => tracing::warn!("{e}"),
        }
    }
    update(
        recipe,
        store,
        "c_cpp_properties.json",
        json!({ "configurations": [config], "version": 4 }),
    )
}

fn launch_cppdbg(
    recipe: &RecipeModified,
    ctx: &IdeContext<'_>,
    gdbservers: &mut GdbServerRegistry,
    binary: &str,
) -> Result<Value> {
    let info = &recipe.info;
    let entry = gdbservers
        .register(ctx.store, binary, Some(&info.temp_dir))?
        .clone();

    let mut src_file_map = Map::new();
    src_file_map.insert(
        "/usr/include".into(),
        json!(info.recipe_sysroot.join("usr/include").display().to_string()),
    );

    let mut config = json!({
        "name": entry.pretty_id,
        "type": "cppdbg",
        "request": "launch",
        "program": info.d.join(binary.trim_start_matches('/')).display().to_string(),
        "stopAtEntry": true,
        "cwd": "${workspaceFolder}",
        "environment": [],
        "externalConsole": false,
        "MIMode": "gdb",
        "preLaunchTask": entry.pretty_id,
        "miDebuggerPath": ctx.gdb_cross.gdb().display().to_string(),
        "miDebuggerServerAddress": format!("{}:{}", gdbservers.host(), entry.port),
    });

    if let Some(rootfs_dbg) = ctx.image.rootfs_dbg() {
        config["additionalSOLibSearchPath"] = json!(recipe.solib_search_path_str(ctx.image));
        src_file_map.insert(
            "/usr/src/debug".into(),
            json!(rootfs_dbg.join("usr/src/debug").display().to_string()),
        );
    } else {
        tracing::warn!(
            "Cannot setup debug symbols configuration for GDB. IMAGE_GEN_DEBUGFS is not enabled."
        );
    }
    config["sourceFileMap"] = Value::Object(src_file_map);
    config["setupCommands"] = json!([{
        "description": "sysroot",
        "text": format!("set sysroot {}", info.d.display()),
    }]);
    Ok(config)
}

/// One `cppdbg` launch configuration per installed binary.
pub fn launch(
    recipe: &RecipeModified,
    ctx: &IdeContext<'_>,
    gdbservers: &mut GdbServerRegistry,
) -> Result<()> {
    let mut configurations = Vec::new();
    for binary in find_installed_binaries(&recipe.info.d)? {
        configurations.push(launch_cppdbg(recipe, ctx, gdbservers, &binary)?);
    }
    update(
        recipe,
        ctx.store,
        "launch.json",
        json!({ "version": "0.2.0", "configurations": configurations }),
    )
}

fn gdbserver_task(label: &str, script: &str) -> Value {
    json!({
        "label": label,
        "type": "shell",
        "isBackground": true,
        "command": script,
        "problemMatcher": [{
            "pattern": [{ "regexp": ".", "file": 1, "location": 2, "message": 3 }],
            "background": {
                "activeOnStart": true,
                "beginsPattern": ".",
                "endsPattern": ".",
            },
        }],
    })
}

pub fn tasks(
    recipe: &RecipeModified,
    scripts: &RecipeScripts,
    gdbservers: &GdbServerRegistry,
    store: &dyn ArtifactStore,
) -> Result<()> {
    let bpn = &recipe.info.bpn;
    let install_label = format!("do_install {bpn}");
    let deploy_label = format!("deploy-target {bpn}");
    let mut tasks = vec![
        json!({
            "label": install_label,
            "type": "shell",
            "command": scripts.install.display().to_string(),
            "problemMatcher": [],
        }),
        json!({
            "label": deploy_label,
            "type": "shell",
            "command": scripts.deploy.display().to_string(),
            "problemMatcher": [],
        }),
        json!({
            "label": format!("install && deploy-target {bpn}"),
            "dependsOrder": "sequence",
            "dependsOn": [install_label, deploy_label],
            "problemMatcher": [],
            "group": { "kind": "build", "isDefault": true },
        }),
    ];
    tasks.extend(
        gdbservers
            .start_scripts()
            .map(|(pretty_id, script)| gdbserver_task(pretty_id, &script.display().to_string())),
    );
    update(
        recipe,
        store,
        "tasks.json",
        json!({ "version": "2.0.0", "tasks": tasks }),
    )
}
