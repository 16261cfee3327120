use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use toml::Value;

use crate::error::{Error, Result};

pub const DEFAULT_TARGET: &str = "root@192.168.7.2";
pub const DEFAULT_GDBSERVER_PORT_START: u16 = 1234;
pub const SETTINGS_FILE_NAME: &str = "ide-sdk.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Ide {
    Code,
    None,
}

impl Ide {
    pub fn as_str(self) -> &'static str {
        match self {
            Ide::Code => "code",
            Ide::None => "none",
        }
    }

    // First IDE whose launcher is on PATH, `none` otherwise.
    pub fn detect_default() -> Self {
        if which::which("code").is_ok() {
            Ide::Code
        } else {
            Ide::None
        }
    }
}

/// How malformed input that the tool can work around is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strictness {
    /// Log the problem and continue with a partial result.
    #[default]
    Lenient,
    /// Fail the invocation.
    Strict,
}

impl Strictness {
    pub fn from_flag(strict: bool) -> Self {
        if strict {
            Strictness::Strict
        } else {
            Strictness::Lenient
        }
    }

    pub fn report(self, err: Error) -> Result<()> {
        match self {
            Strictness::Strict => Err(err),
            Strictness::Lenient => {
                tracing::error!("{err}");
                Ok(())
            }
        }
    }

    pub fn warn(self, err: Error) -> Result<()> {
        match self {
            Strictness::Strict => Err(err),
            Strictness::Lenient => {
                tracing::warn!("{err}");
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SetupSettings {
    pub ide: Option<Ide>,
    pub target: Option<String>,
    pub gdbserver_port_start: Option<u16>,
    pub strict: Option<bool>,
    pub no_host_check: Option<bool>,
    pub ssh_exec: Option<String>,
    pub key: Option<String>,
    pub port: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BitbakeSettings {
    /// Script sourced to enter the build environment (oe-init-build-env).
    pub init_script: Option<PathBuf>,
    pub skip: Option<bool>,
    pub keep_going: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    pub builddir: Option<PathBuf>,
    pub workspace: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub setup: SetupSettings,
    pub bitbake: BitbakeSettings,
    pub paths: PathSettings,
}

pub fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Table(base_tbl), Value::Table(overlay_tbl)) => {
            for (k, v) in overlay_tbl {
                match base_tbl.get_mut(&k) {
                    Some(existing) => merge(existing, v),
                    None => {
                        base_tbl.insert(k, v);
                    }
                }
            }
        }
        (slot, v) => *slot = v,
    }
}

fn resolve_extends(from_file: &Path, reference: &str) -> PathBuf {
    let p = PathBuf::from(reference);
    if p.is_absolute() {
        p
    } else {
        from_file.parent().unwrap_or_else(|| Path::new(".")).join(p)
    }
}

fn load_layered(path: &Path, seen: &mut HashSet<PathBuf>) -> Result<Value> {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    if !seen.insert(canonical.clone()) {
        return Err(Error::config(format!(
            "settings extends cycle at {}",
            canonical.display()
        )));
    }

    let data = fs::read_to_string(path)
        .map_err(|e| Error::config(format!("failed to read settings {}: {e}", path.display())))?;
    let mut value: Value = toml::from_str(&data)
        .map_err(|e| Error::config(format!("TOML parse error in {}: {e}", path.display())))?;

    let mut out = Value::Table(Default::default());
    let parent = value
        .as_table_mut()
        .and_then(|t| t.remove("extends"))
        .and_then(|v| v.as_str().map(str::to_owned));
    if let Some(parent) = parent {
        out = load_layered(&resolve_extends(path, &parent), seen)?;
    }
    merge(&mut out, value);
    Ok(out)
}

pub fn load(path: &Path) -> Result<Settings> {
    let value = load_layered(path, &mut HashSet::new())?;
    value
        .try_into()
        .map_err(|e| Error::config(format!("invalid settings in {}: {e}", path.display())))
}

// An explicit path must exist; the per-builddir default is optional.
pub fn load_for(explicit: Option<&Path>, builddir: Option<&Path>) -> Result<Settings> {
    if let Some(p) = explicit {
        return load(p);
    }
    if let Some(dir) = builddir {
        let p = dir.join("conf").join(SETTINGS_FILE_NAME);
        if p.is_file() {
            tracing::debug!("loading settings from {}", p.display());
            return load(&p);
        }
    }
    Ok(Settings::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extends_layers_child_over_parent() {
        let tmp = tempfile::tempdir().expect("tempdir");
        fs::write(
            tmp.path().join("base.toml"),
            r#"
[setup]
target = "root@10.0.0.1"
gdbserver_port_start = 2000

[bitbake]
keep_going = true
"#,
        )
        .expect("write base");
        fs::write(
            tmp.path().join("child.toml"),
            r#"
extends = "base.toml"

[setup]
target = "dev@board"
ide = "none"
"#,
        )
        .expect("write child");

        let s = load(&tmp.path().join("child.toml")).expect("load settings");
        assert_eq!(s.setup.target.as_deref(), Some("dev@board"));
        assert_eq!(s.setup.gdbserver_port_start, Some(2000));
        assert_eq!(s.setup.ide, Some(Ide::None));
        assert_eq!(s.bitbake.keep_going, Some(true));
    }

    #[test]
    fn extends_cycle_is_rejected() {
        let tmp = tempfile::tempdir().expect("tempdir");
        fs::write(tmp.path().join("a.toml"), "extends = \"b.toml\"\n").expect("write a");
        fs::write(tmp.path().join("b.toml"), "extends = \"a.toml\"\n").expect("write b");
        let err = load(&tmp.path().join("a.toml")).unwrap_err().to_string();
        assert!(err.contains("cycle"), "unexpected err: {err}");
    }

    #[test]
    fn missing_default_settings_file_is_fine() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let s = load_for(None, Some(tmp.path())).expect("defaults");
        assert!(s.setup.target.is_none());
    }

    #[test]
    fn lenient_report_swallows_error() {
        assert!(
            Strictness::Lenient
                .report(Error::invalid_argument("x"))
                .is_ok()
        );
        assert!(
            Strictness::Strict
                .report(Error::invalid_argument("x"))
                .is_err()
        );
    }
}
