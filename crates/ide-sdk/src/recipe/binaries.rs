use std::fs::File;
use std::io::Read;
use std::path::Path;

use regex::Regex;
use walkdir::WalkDir;

use crate::error::{Error, Result};

const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];

pub fn is_elf_file(path: &Path) -> bool {
    let mut magic = [0u8; 4];
    match File::open(path).and_then(|mut f| f.read_exact(&mut magic)) {
        Ok(()) => magic == ELF_MAGIC,
        Err(_) => false,
    }
}

#[cfg(unix)]
fn is_executable(meta: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_meta: &std::fs::Metadata) -> bool {
    true
}

/// Executable ELF files installed into `d`, as `/`-rooted paths relative to
/// `d`, sorted. Shared objects and symlinks are skipped.
pub fn find_installed_binaries(d: &Path) -> Result<Vec<String>> {
    if !d.is_dir() {
        tracing::warn!("image directory {} does not exist", d.display());
        return Ok(Vec::new());
    }
    let shared_object = Regex::new(r"^.*\.so[.0-9]*$")
        .map_err(|e| Error::msg(format!("regex error: {e}")))?;
    let mut binaries = Vec::new();
    for entry in WalkDir::new(d).follow_links(false) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if shared_object.is_match(&name) {
            continue;
        }
        let meta = entry.metadata()?;
        if !is_executable(&meta) || !is_elf_file(entry.path()) {
            continue;
        }
        let rel = entry.path().strip_prefix(d).map_err(|e| {
            Error::msg(format!("{} is outside {}: {e}", entry.path().display(), d.display()))
        })?;
        binaries.push(format!("/{}", rel.to_string_lossy()));
    }
    binaries.sort();
    Ok(binaries)
}
