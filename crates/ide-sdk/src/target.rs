use crate::config::Strictness;
use crate::error::{Error, Result};

/// SSH login parameters for the target device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetOptions {
    pub target: String,
    pub key: Option<String>,
    pub port: Option<String>,
    pub ssh_exec: Option<String>,
    pub no_host_check: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetDevice {
    /// The connection string as given, `[login@]host`.
    pub target: String,
    pub login: Option<String>,
    pub host: Option<String>,
    pub ssh_exec: String,
    /// `-p <port>` or empty.
    pub ssh_port: String,
    pub extra_options: String,
    opts: TargetOptions,
}

impl TargetDevice {
    pub fn new(opts: &TargetOptions, strictness: Strictness) -> Result<Self> {
        let mut extra = String::new();
        if opts.no_host_check {
            extra.push_str("-o UserKnownHostsFile=/dev/null -o StrictHostKeyChecking=no");
        }
        if let Some(key) = opts.key.as_deref().filter(|k| !k.is_empty()) {
            extra.push_str(&format!(" -i {key}"));
        }
        let ssh_port = opts
            .port
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(|p| format!("-p {p}"))
            .unwrap_or_default();

        let parts: Vec<&str> = opts.target.split('@').collect();
        let (login, host) = match parts.as_slice() {
            [host] => (None, Some(host.to_string())),
            [login, host] => (Some(login.to_string()), Some(host.to_string())),
            _ => {
                strictness.report(Error::invalid_argument(format!(
                    "Invalid target argument: {}",
                    opts.target
                )))?;
                (None, None)
            }
        };

        Ok(Self {
            target: opts.target.clone(),
            login,
            host,
            ssh_exec: opts
                .ssh_exec
                .clone()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "ssh".into()),
            ssh_port,
            extra_options: extra,
            opts: opts.clone(),
        })
    }

    pub fn options(&self) -> &TargetOptions {
        &self.opts
    }

    pub fn host_or_empty(&self) -> &str {
        self.host.as_deref().unwrap_or_default()
    }

    /// Shell command line running `remote_cmd` on the target.
    pub fn ssh_command(&self, remote_cmd: &str) -> String {
        format!(
            "{} {} {} {} '{}'",
            self.ssh_exec, self.ssh_port, self.extra_options, self.target, remote_cmd
        )
    }
}
