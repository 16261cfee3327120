//! Running commands inside the build environment.

use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::mpsc;

use regex::Regex;

use crate::error::{Error, ErrorKind, Result};

pub trait BuildEnv {
    /// Run `command` and return its stdout. Stderr is logged.
    fn capture(&self, command: &str) -> Result<String>;
    /// Run `command` to completion, streaming its output to the log and,
    /// when given, to `log_file`. A non-zero exit is an error.
    fn run(&self, command: &str, log_file: Option<&Path>) -> Result<()>;
}

/// Runs commands via `/bin/sh`, optionally sourcing the build environment
/// init script first.
#[derive(Debug, Clone)]
pub struct ShellBuildEnv {
    pub init_script: Option<PathBuf>,
    pub builddir: PathBuf,
}

impl ShellBuildEnv {
    pub fn new(init_script: Option<PathBuf>, builddir: PathBuf) -> Self {
        Self {
            init_script,
            builddir,
        }
    }

    pub fn shell_line(&self, command: &str) -> String {
        match &self.init_script {
            Some(init) => format!(
                ". {} {} >/dev/null && {}",
                init.display(),
                self.builddir.display(),
                command
            ),
            None => command.to_string(),
        }
    }

    fn command(&self, command: &str) -> Command {
        let mut cmd = Command::new("/bin/sh");
        cmd.arg("-c")
            .arg(self.shell_line(command))
            .current_dir(&self.builddir)
            .stdin(Stdio::null());
        cmd
    }
}

impl BuildEnv for ShellBuildEnv {
    fn capture(&self, command: &str) -> Result<String> {
        let out = self
            .command(command)
            .output()
            .map_err(|e| Error::new(ErrorKind::Command, format!("spawn failed: {e}")))?;
        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            for line in stderr.lines().rev().take(20).collect::<Vec<_>>().into_iter().rev() {
                tracing::error!(target: "bitbake", "{}", sanitize_output_line(line));
            }
            return Err(Error::new(
                ErrorKind::Command,
                format!("'{}' failed with {}", command, out.status),
            ));
        }
        Ok(String::from_utf8_lossy(&out.stdout).into_owned())
    }

    fn run(&self, command: &str, log_file: Option<&Path>) -> Result<()> {
        tracing::info!("running: {command}");
        let mut cmd = self.command(command);
        run_streaming(&mut cmd, log_file)
    }
}

fn read_lines<R: std::io::Read>(r: R, tx: mpsc::Sender<String>) {
    let reader = BufReader::new(r);
    for line in reader.split(b'\n').map_while(|l| l.ok()) {
        // Progress bars redraw with '\r'; keep only the last frame.
        let text = String::from_utf8_lossy(&line);
        let last = text.rsplit('\r').next().unwrap_or_default().to_string();
        if tx.send(last).is_err() {
            break;
        }
    }
}

/// Spawn `cmd`, forward stdout and stderr line by line, wait for exit.
pub fn run_streaming(cmd: &mut Command, log_file: Option<&Path>) -> Result<()> {
    let mut log = match log_file {
        Some(p) => {
            if let Some(parent) = p.parent() {
                crate::store::ensure_dir(parent)?;
            }
            Some(File::create(p).map_err(|e| {
                Error::msg(format!("failed to create log {}: {e}", p.display()))
            })?)
        }
        None => None,
    };

    let mut child = cmd
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| Error::new(ErrorKind::Command, format!("spawn failed: {e}")))?;

    let (tx, rx) = mpsc::channel::<String>();
    if let Some(out) = child.stdout.take() {
        let tx = tx.clone();
        std::thread::spawn(move || read_lines(out, tx));
    }
    if let Some(err) = child.stderr.take() {
        let tx = tx.clone();
        std::thread::spawn(move || read_lines(err, tx));
    }
    drop(tx);

    for line in rx {
        let line = sanitize_output_line(&line);
        if line.is_empty() {
            continue;
        }
        let write_err = match log.as_mut() {
            Some(f) => writeln!(f, "{line}").err(),
            None => None,
        };
        if let (Some(e), Some(p)) = (write_err, log_file) {
            tracing::warn!(
                "failed to write build log {}: {e}, no longer logging to it",
                p.display()
            );
            log = None;
        }
        tracing::info!(target: "bitbake", "{line}");
    }

    let status = child
        .wait()
        .map_err(|e| Error::new(ErrorKind::Command, format!("wait failed: {e}")))?;
    if !status.success() {
        let hint = log_file
            .map(|p| format!(" (log: {})", p.display()))
            .unwrap_or_default();
        return Err(Error::new(
            ErrorKind::Command,
            format!("command failed with {status}{hint}"),
        ));
    }
    Ok(())
}

const MAX_LINE_CHARS: usize = 4096;

/// Strip terminal escape sequences and control characters from one line of
/// child output.
pub fn sanitize_output_line(input: &str) -> String {
    static ESCAPES: std::sync::OnceLock<Option<Regex>> = std::sync::OnceLock::new();
    let re = ESCAPES.get_or_init(|| {
        // CSI, OSC (BEL or ST terminated), DCS/SOS/PM/APC, then lone ESC + byte.
        Regex::new(
            r"\x1b\[[0-?]*[ -/]*[@-~]|\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)|\x1b[PX^_][^\x1b]*\x1b\\|\x1b.",
        )
        .ok()
    });
    let stripped = match re {
        Some(re) => re.replace_all(input, ""),
        None => input.into(),
    };
    let mut out: String = stripped
        .chars()
        .map(|c| if c == '\t' { ' ' } else { c })
        .filter(|c| !c.is_control())
        .take(MAX_LINE_CHARS)
        .collect();
    if stripped.chars().count() > MAX_LINE_CHARS {
        out.push_str(" ...[truncated]");
    }
    out
}
