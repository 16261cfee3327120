//! Shell scripts that replay the install and deploy steps outside bitbake.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::gdbserver::GdbServerRegistry;
use crate::ide::IdeContext;
use crate::recipe::{RecipeInfo, RecipeModified};
use crate::store::{self, ArtifactStore};
use crate::target::TargetOptions;

/// Workdir leftovers of a previous packaging run, removed before install.
const STALE_WORKDIR_ITEMS: [&str; 6] = [
    "package",
    "packages-split",
    "pkgdata",
    "sstate-install-package",
    "debugsources.list",
    "*.spec",
];

#[derive(Debug, Clone)]
pub struct RecipeScripts {
    pub install: PathBuf,
    pub deploy: PathBuf,
    pub install_and_deploy: PathBuf,
}

pub fn shell_quote(s: &str) -> String {
    if !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "/._-+=:@,".contains(c))
    {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// `K=V` pairs of a `FAKEROOTENV` value. Words without `=` are skipped.
pub fn fakeroot_env_pairs(env: &str) -> impl Iterator<Item = (&str, &str)> {
    env.split_whitespace().filter_map(|pair| pair.split_once('='))
}

fn is_shell_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(unix)]
pub(crate) fn is_executable_file(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
pub(crate) fn is_executable_file(path: &Path) -> bool {
    path.is_file()
}

/// `bb_run_do_install`: compile without pseudo, then run bitbake's own
/// `run.do_install` under pseudo so file ownership ends up as in a real build.
pub fn gen_fakeroot_install_script(
    info: &RecipeInfo,
    cmd_compile: Option<&str>,
    store: &dyn ArtifactStore,
    base_env: impl IntoIterator<Item = (String, String)>,
) -> Result<PathBuf> {
    let mut lines = vec!["#!/bin/sh".to_string()];
    if let Some(cmd) = cmd_compile {
        lines.push(format!("( cd {} && {cmd})", info.real_srctree.display()));
    }
    if !is_executable_file(Path::new(&info.fakerootcmd)) {
        return Err(Error::missing_executable(format!(
            "pseudo executable {} could not be found",
            info.fakerootcmd
        )));
    }
    let run_do_install = info.workdir.join("temp").join("run.do_install");
    if !is_executable_file(&run_do_install) {
        return Err(Error::missing_executable(format!(
            "run script does not exists: {}",
            run_do_install.display()
        )));
    }

    let mut env: BTreeMap<String, String> = base_env.into_iter().collect();
    for (k, v) in fakeroot_env_pairs(&info.fakerootenv) {
        env.insert(k.to_string(), v.to_string());
    }
    for (k, v) in &env {
        if !is_shell_name(k) {
            tracing::debug!("not exporting {k} to the install script");
            continue;
        }
        lines.push(format!("export {k}=\"{v}\""));
    }

    let rm_in_workdir = STALE_WORKDIR_ITEMS
        .iter()
        .map(|item| info.workdir.join(item).display().to_string())
        .collect::<Vec<_>>()
        .join(" ");
    lines.push(format!(
        "{} /bin/sh -c \"rm -rf {}/* {} && {}\"",
        info.fakerootcmd,
        info.d.display(),
        rm_in_workdir,
        run_do_install.display()
    ));

    let script = info.temp_dir.join("bb_run_do_install");
    store::write_script(store, &script, &lines)?;
    Ok(script)
}

/// `deploy_target_<bpn>`: calls straight into this tool's `deploy-target`
/// with every path resolved, so no datastore is needed at deploy time.
pub fn gen_deploy_target_script(
    info: &RecipeInfo,
    store: &dyn ArtifactStore,
    tool_exe: &Path,
    target: &TargetOptions,
) -> Result<PathBuf> {
    let mut args = vec![
        shell_quote(&tool_exe.display().to_string()),
        "deploy-target".to_string(),
        shell_quote(&target.target),
        "--image-dir".into(),
        shell_quote(&info.d.display().to_string()),
        "--workdir".into(),
        shell_quote(&info.workdir.display().to_string()),
        "--fakeroot-cmd".into(),
        shell_quote(&info.fakerootcmd),
        "--fakeroot-env".into(),
        shell_quote(&info.fakerootenv),
        "--strip-cmd".into(),
        shell_quote(&info.strip_cmd()),
        "--libdir".into(),
        shell_quote(&info.libdir),
        "--base-libdir".into(),
        shell_quote(&info.base_libdir),
        "--strip".into(),
    ];
    if let Some(port) = target.port.as_deref().filter(|p| !p.is_empty()) {
        args.extend(["--port".into(), shell_quote(port)]);
    }
    if let Some(key) = target.key.as_deref().filter(|k| !k.is_empty()) {
        args.extend(["--key".into(), shell_quote(key)]);
    }
    if let Some(ssh) = target.ssh_exec.as_deref().filter(|s| !s.is_empty()) {
        args.extend(["--ssh-exec".into(), shell_quote(ssh)]);
    }
    if target.no_host_check {
        args.push("--no-host-check".into());
    }
    args.push("\"$@\"".into());

    let lines = vec!["#!/bin/sh".to_string(), format!("exec {}", args.join(" "))];
    let script = info.temp_dir.join(format!("deploy_target_{}", info.bpn));
    store::write_script(store, &script, &lines)?;
    Ok(script)
}

pub fn gen_install_deploy_script(
    info: &RecipeInfo,
    store: &dyn ArtifactStore,
    install: &Path,
    deploy: &Path,
) -> Result<PathBuf> {
    let lines = vec![
        "#!/bin/sh".to_string(),
        "set -e".to_string(),
        shell_quote(&install.display().to_string()),
        shell_quote(&deploy.display().to_string()),
    ];
    let script = info
        .temp_dir
        .join(format!("install_and_deploy_{}-{}", info.bpn, info.package_arch));
    store::write_script(store, &script, &lines)?;
    Ok(script)
}

/// Install, deploy and the two chained, for the current process environment.
pub fn generate(
    recipe: &RecipeModified,
    ctx: &IdeContext<'_>,
    gdbservers: &GdbServerRegistry,
) -> Result<RecipeScripts> {
    let info = &recipe.info;
    let install = gen_fakeroot_install_script(
        info,
        recipe.cmd_compile.as_deref(),
        ctx.store,
        std::env::vars(),
    )?;
    let deploy =
        gen_deploy_target_script(info, ctx.store, ctx.tool_exe, gdbservers.target().options())?;
    let install_and_deploy = gen_install_deploy_script(info, ctx.store, &install, &deploy)?;
    Ok(RecipeScripts {
        install,
        deploy,
        install_and_deploy,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::recipe::tests::{recipe_data, workspace};
    use crate::store::MemoryStore;
    use std::fs;

    #[cfg(unix)]
    fn make_exec(path: &Path) {
        use std::os::unix::fs::PermissionsExt;
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(path, "#!/bin/sh\n").expect("write");
        fs::set_permissions(path, fs::Permissions::from_mode(0o755)).expect("chmod");
    }

    fn info(root: &Path, fakeroot: &Path) -> RecipeInfo {
        let mut d = recipe_data("demo", root);
        d.set_var("FAKEROOTCMD", fakeroot.display().to_string());
        d.set_var("FAKEROOTENV", "PSEUDO_PREFIX=/usr PSEUDO_DISABLED=0 junk");
        RecipeInfo::from_data("demo", &d, &workspace("demo", root)).expect("info")
    }

    #[test]
    fn quoting_leaves_plain_words_alone() {
        assert_eq!(shell_quote("/usr/bin/ssh"), "/usr/bin/ssh");
        assert_eq!(shell_quote("a b"), "'a b'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote(""), "''");
    }

    #[cfg(unix)]
    #[test]
    fn install_script_runs_do_install_under_pseudo() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let root = tmp.path();
        let fakeroot = root.join("sysroot-native/usr/bin/pseudo");
        make_exec(&fakeroot);
        make_exec(&root.join("work/temp/run.do_install"));
        let info = info(root, &fakeroot);
        let store = MemoryStore::new();

        let script = gen_fakeroot_install_script(
            &info,
            Some("cmake --build --preset demo-cortexa57"),
            &store,
            [
                ("HOME".to_string(), "/home/dev".to_string()),
                ("PSEUDO_DISABLED".to_string(), "1".to_string()),
                ("BASH_FUNC_x%%".to_string(), "() { :; }".to_string()),
            ],
        )
        .expect("script");
        assert_eq!(script, info.temp_dir.join("bb_run_do_install"));

        let file = store.get(&script).expect("written");
        assert!(file.executable);
        let lines: Vec<&str> = file.content.lines().collect();
        assert_eq!(lines[0], "#!/bin/sh");
        assert_eq!(
            lines[1],
            format!(
                "( cd {} && cmake --build --preset demo-cortexa57)",
                info.real_srctree.display()
            )
        );
        assert!(lines.contains(&"export HOME=\"/home/dev\""));
        assert!(lines.contains(&"export PSEUDO_DISABLED=\"0\""));
        assert!(lines.contains(&"export PSEUDO_PREFIX=\"/usr\""));
        assert!(!file.content.contains("BASH_FUNC"));
        let last = lines.last().expect("install line");
        assert!(last.starts_with(&format!("{} /bin/sh -c \"rm -rf ", fakeroot.display())));
        assert!(last.contains("/work/packages-split "));
        assert!(last.ends_with("/work/temp/run.do_install\""));
    }

    #[cfg(unix)]
    #[test]
    fn missing_run_script_is_reported() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let fakeroot = tmp.path().join("pseudo");
        make_exec(&fakeroot);
        let info = info(tmp.path(), &fakeroot);
        let err =
            gen_fakeroot_install_script(&info, None, &MemoryStore::new(), Vec::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingExecutable);
        assert!(err.to_string().contains("run.do_install"));
    }

    #[test]
    fn deploy_script_forwards_whitelisted_target_args() {
        let root = Path::new("/nonexistent-root");
        let info = info(root, Path::new("/usr/bin/pseudo"));
        let store = MemoryStore::new();
        let target = TargetOptions {
            target: "root@10.0.0.2".into(),
            key: Some("/home/dev/.ssh/id".into()),
            port: Some("2222".into()),
            ssh_exec: None,
            no_host_check: true,
        };
        let script =
            gen_deploy_target_script(&info, &store, Path::new("/opt/ide-sdk"), &target)
                .expect("script");
        assert_eq!(script, info.temp_dir.join("deploy_target_demo"));
        let content = store.get(&script).expect("written").content;
        let exec_line = content.lines().nth(1).expect("exec line");
        assert!(exec_line.starts_with("exec /opt/ide-sdk deploy-target root@10.0.0.2 --image-dir "));
        assert!(exec_line.contains(
            " --fakeroot-cmd /usr/bin/pseudo --fakeroot-env 'PSEUDO_PREFIX=/usr PSEUDO_DISABLED=0 junk' "
        ));
        assert!(exec_line.contains(" --port 2222 --key /home/dev/.ssh/id --no-host-check "));
        assert!(!exec_line.contains("--ssh-exec"));
        assert!(exec_line.ends_with("\"$@\""));
    }
}
