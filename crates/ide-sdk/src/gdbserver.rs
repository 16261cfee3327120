//! Per-binary gdbserver sessions on the target.

use std::path::{Path, PathBuf};

use crate::error::{Error, ErrorKind, Result};
use crate::store::{self, ArtifactStore};
use crate::target::TargetDevice;

/// Hands out TCP ports in increasing order. Ports are never reused.
#[derive(Debug, Clone)]
pub struct PortAllocator {
    /// `None` once 65535 has been handed out.
    next: Option<u16>,
}

impl PortAllocator {
    pub fn new(start: u16) -> Self {
        Self { next: Some(start) }
    }

    pub fn allocate(&mut self) -> Result<u16> {
        let port = self
            .next
            .ok_or_else(|| Error::invalid_argument("gdbserver port range exhausted"))?;
        self.next = port.checked_add(1);
        Ok(port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GdbServerEntry {
    pub binary: String,
    pub port: u16,
    pub start_script: Option<PathBuf>,
    pub pretty_id: String,
}

#[derive(Debug)]
pub struct GdbServerRegistry {
    target: TargetDevice,
    /// `--multi` keeps gdbserver alive across attaches; otherwise `--once`.
    multi: bool,
    ports: PortAllocator,
    entries: Vec<GdbServerEntry>,
}

impl GdbServerRegistry {
    pub fn new(target: TargetDevice, port_start: u16, multi: bool) -> Self {
        Self {
            target,
            multi,
            ports: PortAllocator::new(port_start),
            entries: Vec::new(),
        }
    }

    pub fn multi(&self) -> bool {
        self.multi
    }

    pub fn host(&self) -> &str {
        self.target.host_or_empty()
    }

    pub fn target(&self) -> &TargetDevice {
        &self.target
    }

    fn start_cmd(&self, binary: &str, port: u16) -> String {
        let gdbserver_cmd = if self.multi {
            format!("/usr/bin/gdbserver --multi :{port}")
        } else {
            format!("/usr/bin/gdbserver --once :{port} {binary}")
        };
        self.target.ssh_command(&format!("sh -c \"{gdbserver_cmd}\""))
    }

    pub fn script_name(&self, binary: &str, port: u16) -> String {
        let mut name = format!("gdbserver_start_{port}_{}", binary.replace('/', "-"));
        if self.multi {
            name.push_str("_m");
        }
        name
    }

    /// Register `binary` and allocate its port. With a script dir, also
    /// write the start script there.
    pub fn register(
        &mut self,
        store: &dyn ArtifactStore,
        binary: &str,
        script_dir: Option<&Path>,
    ) -> Result<&GdbServerEntry> {
        if self.entries.iter().any(|e| e.binary == binary) {
            return Err(Error::new(
                ErrorKind::Duplicate,
                format!("gdbserver config for binary {binary} is already generated"),
            ));
        }

        let port = self.ports.allocate()?;
        let mut start_script = None;
        if let Some(dir) = script_dir {
            let path = dir.join(self.script_name(binary, port));
            let lines = vec!["#!/bin/sh".to_string(), self.start_cmd(binary, port)];
            store::write_script(store, &path, &lines)?;
            start_script = Some(path);
        }

        self.entries.push(GdbServerEntry {
            binary: binary.to_string(),
            port,
            start_script,
            pretty_id: format!("gdbserver start {port} {binary}"),
        });
        let idx = self.entries.len() - 1;
        Ok(&self.entries[idx])
    }

    pub fn entry(&self, binary: &str) -> Result<&GdbServerEntry> {
        self.entries
            .iter()
            .find(|e| e.binary == binary)
            .ok_or_else(|| Error::msg(format!("no gdbserver registered for {binary}")))
    }

    pub fn port(&self, binary: &str) -> Result<u16> {
        Ok(self.entry(binary)?.port)
    }

    pub fn pretty_id(&self, binary: &str) -> Result<&str> {
        Ok(self.entry(binary)?.pretty_id.as_str())
    }

    pub fn start_script(&self, binary: &str) -> Result<&Path> {
        self.entry(binary)?
            .start_script
            .as_deref()
            .ok_or_else(|| Error::msg(format!("no gdbserver start script for {binary}")))
    }

    /// `(pretty_id, script)` for every entry that has a script, in
    /// registration order.
    pub fn start_scripts(&self) -> impl Iterator<Item = (&str, &Path)> {
        self.entries.iter().filter_map(|e| {
            e.start_script
                .as_deref()
                .map(|s| (e.pretty_id.as_str(), s))
        })
    }
}
