//! Copying a recipe's installed files onto the target.
//!
//! Every step that touches the image runs under pseudo with the recipe's
//! `FAKEROOTENV`, so the ownership and modes recorded by `do_install` are what
//! ends up on the target. The tarball is unpacked through the same ssh
//! invocation the gdbserver scripts use.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::config::Strictness;
use crate::error::{Error, Result};
use crate::exec::BuildEnv;
use crate::recipe::binaries::is_elf_file;
use crate::recipe::scripts::{fakeroot_env_pairs, shell_quote};
use crate::target::{TargetDevice, TargetOptions};

/// Stripped copy of the image, below the recipe workdir.
pub const STRIPPED_DIR: &str = "ide-sdk-deploy-target-stripped";

const STRIP_FLAGS: &str = "--remove-section=.comment --remove-section=.note";

#[derive(Debug, Clone, Default)]
pub struct DeployRequest {
    pub image_dir: PathBuf,
    pub workdir: PathBuf,
    pub fakeroot_cmd: Option<String>,
    /// `FAKEROOTENV` of the recipe: whitespace separated `K=V` pairs.
    pub fakeroot_env: String,
    pub strip_cmd: Option<String>,
    pub libdir: String,
    pub base_libdir: String,
    pub strip: bool,
    pub target: TargetOptions,
}

impl DeployRequest {
    fn fakeroot(&self) -> Option<&str> {
        self.fakeroot_cmd
            .as_deref()
            .filter(|f| !f.is_empty() && Path::new(f).is_file())
    }

    /// `cmd` as a shell line running under pseudo, or as is without it.
    pub fn fakeroot_line(&self, cmd: &str) -> String {
        let Some(fakeroot) = self.fakeroot() else {
            return cmd.to_string();
        };
        let mut line = String::new();
        let env: Vec<String> = fakeroot_env_pairs(&self.fakeroot_env)
            .map(|(k, v)| format!("{k}={}", shell_quote(v)))
            .collect();
        if !env.is_empty() {
            line.push_str("env ");
            line.push_str(&env.join(" "));
            line.push(' ');
        }
        line.push_str(&format!(
            "{} /bin/sh -c {}",
            shell_quote(fakeroot),
            shell_quote(cmd)
        ));
        line
    }

    fn is_shared_library(&self, rel: &Path) -> bool {
        let name = rel.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        if !name.contains(".so") {
            return false;
        }
        let under = |dir: &str| {
            let dir = dir.trim_start_matches('/');
            !dir.is_empty() && rel.starts_with(dir)
        };
        under(&self.libdir) || under(&self.base_libdir)
    }
}

pub trait DeployRoutine {
    fn deploy(&self, req: &DeployRequest) -> Result<()>;
}

/// Packs the image with `tar` and unpacks it on the target over ssh.
pub struct SshTarDeploy<'a> {
    env: &'a dyn BuildEnv,
}

impl<'a> SshTarDeploy<'a> {
    pub fn new(env: &'a dyn BuildEnv) -> Self {
        Self { env }
    }
}

/// ELF files below `dir`, relative to it, split into shared libraries and
/// everything else.
fn elf_files(dir: &Path, req: &DeployRequest) -> Result<(Vec<PathBuf>, Vec<PathBuf>)> {
    let mut libs = Vec::new();
    let mut others = Vec::new();
    for entry in WalkDir::new(dir).follow_links(false).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() || !is_elf_file(entry.path()) {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(dir)
            .map_err(|e| Error::msg(format!("bad path {}: {e}", entry.path().display())))?
            .to_path_buf();
        if req.is_shared_library(&rel) {
            libs.push(rel);
        } else {
            others.push(rel);
        }
    }
    Ok((libs, others))
}

fn strip_line(strip_cmd: &str, flags: &str, root: &Path, files: &[PathBuf]) -> String {
    let paths: Vec<String> = files
        .iter()
        .map(|f| shell_quote(&root.join(f).display().to_string()))
        .collect();
    format!("{} {flags} {}", shell_quote(strip_cmd), paths.join(" "))
}

impl SshTarDeploy<'_> {
    /// Copy the image to [`STRIPPED_DIR`] and strip the copy, both under
    /// pseudo. Returns the directory to pack.
    fn stripped_copy(&self, req: &DeployRequest) -> Result<PathBuf> {
        let scratch = req.workdir.join(STRIPPED_DIR);
        let scratch_q = shell_quote(&scratch.display().to_string());
        let copy = format!(
            "rm -rf {scratch_q} && cp -af {} {scratch_q}",
            shell_quote(&req.image_dir.join(".").display().to_string())
        );
        self.env.run(&req.fakeroot_line(&copy), None)?;

        let strip_cmd = req.strip_cmd.as_deref().unwrap_or("strip");
        let (libs, others) = elf_files(&req.image_dir, req)?;
        if !others.is_empty() {
            let line = strip_line(strip_cmd, STRIP_FLAGS, &scratch, &others);
            self.env.run(&req.fakeroot_line(&line), None)?;
        }
        if !libs.is_empty() {
            let flags = format!("{STRIP_FLAGS} --strip-unneeded");
            let line = strip_line(strip_cmd, &flags, &scratch, &libs);
            self.env.run(&req.fakeroot_line(&line), None)?;
        }
        tracing::info!("stripped {} files", libs.len() + others.len());
        Ok(scratch)
    }
}

impl DeployRoutine for SshTarDeploy<'_> {
    fn deploy(&self, req: &DeployRequest) -> Result<()> {
        if !req.image_dir.is_dir() {
            return Err(Error::config(format!(
                "image directory {} does not exist, run do_install first",
                req.image_dir.display()
            )));
        }
        let target = TargetDevice::new(&req.target, Strictness::Strict)?;

        let dir = if req.strip {
            self.stripped_copy(req)?
        } else {
            req.image_dir.clone()
        };

        let owner = if req.fakeroot().is_some() {
            ""
        } else {
            tracing::warn!("pseudo is not available, files are deployed as owned by root");
            " --owner=0 --group=0"
        };
        let push = format!(
            "tar cf - -C {}{owner} . | {}",
            shell_quote(&dir.display().to_string()),
            target.ssh_command("tar -xf - -C /")
        );
        tracing::info!("deploying {} to {}", dir.display(), target.target);
        self.env.run(&req.fakeroot_line(&push), None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> DeployRequest {
        DeployRequest {
            libdir: "/usr/lib".into(),
            base_libdir: "/lib".into(),
            ..Default::default()
        }
    }

    #[test]
    fn shared_libraries_are_recognized_by_location() {
        let req = request();
        assert!(req.is_shared_library(Path::new("usr/lib/libfoo.so.1")));
        assert!(req.is_shared_library(Path::new("lib/libc.so.6")));
        assert!(!req.is_shared_library(Path::new("usr/bin/foo")));
        assert!(!req.is_shared_library(Path::new("opt/libfoo.so")));
    }

    #[test]
    fn without_pseudo_the_line_is_unchanged() {
        let req = DeployRequest {
            fakeroot_cmd: Some("/nonexistent/pseudo".into()),
            fakeroot_env: "PSEUDO_PREFIX=/usr".into(),
            ..request()
        };
        assert_eq!(req.fakeroot_line("tar cf - ."), "tar cf - .");
    }

    #[test]
    fn pseudo_line_carries_fakeroot_env() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let pseudo = tmp.path().join("pseudo");
        std::fs::write(&pseudo, "").expect("write");
        let req = DeployRequest {
            fakeroot_cmd: Some(pseudo.display().to_string()),
            fakeroot_env: "PSEUDO_PREFIX=/usr PSEUDO_LOCALSTATEDIR=/w/pseudo/ junk".into(),
            ..request()
        };
        assert_eq!(
            req.fakeroot_line("cp -af a b"),
            format!(
                "env PSEUDO_PREFIX=/usr PSEUDO_LOCALSTATEDIR=/w/pseudo/ {} /bin/sh -c 'cp -af a b'",
                pseudo.display()
            )
        );
    }

    #[test]
    fn missing_image_dir_is_a_config_error() {
        struct NoRun;
        impl BuildEnv for NoRun {
            fn capture(&self, _command: &str) -> Result<String> {
                Err(Error::msg("capture"))
            }
            fn run(&self, command: &str, _log_file: Option<&Path>) -> Result<()> {
                Err(Error::msg(format!("unexpected run: {command}")))
            }
        }
        let tmp = tempfile::tempdir().expect("tempdir");
        let req = DeployRequest {
            image_dir: tmp.path().join("image"),
            target: TargetOptions {
                target: "root@192.168.7.2".into(),
                ..Default::default()
            },
            ..request()
        };
        let err = SshTarDeploy::new(&NoRun).deploy(&req).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Config);
    }
}
