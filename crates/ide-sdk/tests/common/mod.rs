#![allow(dead_code)]

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};

use ide_sdk::config::{Ide, Strictness};
use ide_sdk::datastore::FixtureStore;
use ide_sdk::error::{Error, Result};
use ide_sdk::exec::BuildEnv;
use ide_sdk::setup::SetupOptions;
use ide_sdk::target::TargetOptions;
use ide_sdk::workspace::{Workspace, WorkspaceRecipe};

/// Records rebuild commands instead of running bitbake.
#[derive(Debug, Default)]
pub struct RecordingEnv {
    pub commands: RefCell<Vec<String>>,
}

impl BuildEnv for RecordingEnv {
    fn capture(&self, command: &str) -> Result<String> {
        Err(Error::msg(format!("unexpected capture: {command}")))
    }

    fn run(&self, command: &str, _log_file: Option<&Path>) -> Result<()> {
        self.commands.borrow_mut().push(command.to_string());
        Ok(())
    }
}

#[cfg(unix)]
pub fn write_exec(path: &Path, content: &[u8]) {
    use std::os::unix::fs::PermissionsExt;
    fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    fs::write(path, content).expect("write");
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).expect("chmod");
}

pub const ELF: &[u8] = b"\x7fELF\x02\x01\x01\0\0\0\0\0\0\0\0\0";

/// A build tree for one modified recipe: work dir with image dir, pseudo
/// and run.do_install, plus an image work dir.
pub struct Tree {
    pub root: PathBuf,
}

impl Tree {
    pub fn new(root: &Path) -> Self {
        let root = root.canonicalize().expect("canonical tempdir");
        Self { root }
    }

    pub fn workdir(&self) -> PathBuf {
        self.root.join("tmp/work/cortexa57-poky-linux/demo/1.0")
    }

    pub fn image_dir(&self) -> PathBuf {
        self.workdir().join("image")
    }

    pub fn srctree(&self) -> PathBuf {
        self.root.join("workspace/sources/demo")
    }

    pub fn bbappend(&self) -> PathBuf {
        self.root.join("workspace/appends/demo.bbappend")
    }

    pub fn image_workdir(&self) -> PathBuf {
        self.root.join("tmp/work/qemuarm64-poky-linux/core-image-minimal/1.0")
    }

    pub fn pseudo(&self) -> PathBuf {
        self.root.join("tmp/sysroots-components/x86_64/pseudo-native/usr/bin/pseudo")
    }

    #[cfg(unix)]
    pub fn populate(&self, binaries: &[&str]) {
        for b in binaries {
            write_exec(&self.image_dir().join(b.trim_start_matches('/')), ELF);
        }
        write_exec(&self.image_dir().join("usr/lib/libdemo.so.1"), ELF);
        write_exec(&self.pseudo(), b"#!/bin/sh\n");
        write_exec(&self.workdir().join("temp/run.do_install"), b"#!/bin/sh\n");
        fs::create_dir_all(self.srctree()).expect("srctree");
        fs::create_dir_all(self.bbappend().parent().expect("appends")).expect("appends");
        fs::write(
            self.bbappend(),
            "inherit externalsrc\nEXTERNALSRC:pn-demo = \"placeholder\"\n",
        )
        .expect("bbappend");
    }

    /// Fixture with the image, the cross gdb and the recipe `demo` using
    /// `build_tool` (`cmake`, `meson` or empty).
    pub fn fixture(&self, build_tool: &str, image_extra: &str) -> String {
        let w = self.workdir();
        let iw = self.image_workdir();
        let inherits = if build_tool.is_empty() {
            String::new()
        } else {
            format!("\"{build_tool}\"")
        };
        format!(
            r#"
[recipes.core-image-minimal]
inherits = ["image", "image-combined-dbg"]

[recipes.core-image-minimal.vars]
WORKDIR = "{iw}"
DISTRO_FEATURES = "acl ipv4 ipv6"
PACKAGE_DEBUG_SPLIT_STYLE = "debug-with-srcpkg"
{image_extra}

[recipes.gdb-cross-aarch64.vars]
STAGING_BINDIR_NATIVE = "{root}/tmp/work/x86_64-linux/gdb-cross-aarch64/recipe-sysroot-native/usr/bin"
TARGET_SYS = "aarch64-poky-linux"

[recipes.demo]
inherits = [{inherits}]
exported = ["CC", "CXX"]

[recipes.demo.vars]
BPN = "demo"
S = "{w}/git"
WORKDIR = "{w}"
B = "{w}/build"
D = "{w}/image"
PACKAGE_ARCH = "cortexa57"
TARGET_ARCH = "aarch64"
RECIPE_SYSROOT = "{w}/recipe-sysroot"
RECIPE_SYSROOT_NATIVE = "{w}/recipe-sysroot-native"
FAKEROOTCMD = "{pseudo}"
FAKEROOTENV = "PSEUDO_PREFIX={root}/pseudo PSEUDO_DISABLED=0"
PATH = "{w}/recipe-sysroot-native/usr/bin"
CC = "aarch64-poky-linux-gcc"
CXX = "aarch64-poky-linux-g++"
STRIP = "aarch64-poky-linux-strip"
libdir = "/usr/lib"
base_libdir = "/lib"
OECMAKE_GENERATOR = "Ninja"
OECMAKE_ARGS = "-DCMAKE_INSTALL_PREFIX:PATH=/usr -DBUILD_TESTING=OFF"
EXTRA_OECMAKE = "-DWITH_FOO=ON"
MESON_BUILDTYPE = "plain"
MESONOPTS = "--prefix /usr --buildtype plain"
EXTRA_OEMESON = ""
MESON_CROSS_FILE = "--cross-file {w}/meson.cross"

[workspace.demo]
srctree = "{srctree}"
bbappend = "{bbappend}"
"#,
            iw = iw.display(),
            w = w.display(),
            root = self.root.display(),
            pseudo = self.pseudo().display(),
            srctree = self.srctree().display(),
            bbappend = self.bbappend().display(),
        )
    }

    pub fn workspace(&self, fixture: &FixtureStore) -> Workspace {
        let mut ws = Workspace::new(self.root.join("workspace"));
        for (pn, entry) in &fixture.file.workspace {
            ws.insert(
                pn.clone(),
                WorkspaceRecipe {
                    srctree: entry.srctree.clone(),
                    bbappend: entry.bbappend.clone(),
                },
            );
        }
        ws
    }

    pub fn options(&self, ide: Ide) -> SetupOptions {
        SetupOptions {
            recipename: "demo".into(),
            image: "core-image-minimal".into(),
            ide,
            target: TargetOptions {
                target: "root@192.168.7.2".into(),
                ..Default::default()
            },
            gdbserver_port_start: 1234,
            skip_bitbake: false,
            bitbake_k: false,
            debug_build_config: false,
            strictness: Strictness::Lenient,
            log_dir: None,
            kits_path: None,
            tool_exe: PathBuf::from("/opt/ide-sdk/bin/ide-sdk"),
        }
    }
}
