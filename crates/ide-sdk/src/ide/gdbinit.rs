//! Plain gdb setup: one init file per installed binary, readable as
//! instructions and loadable with `gdb -ix`.

use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::gdbserver::GdbServerRegistry;
use crate::ide::IdeContext;
use crate::image::RecipeImage;
use crate::recipe::RecipeModified;
use crate::recipe::binaries::find_installed_binaries;

pub fn gdbinit_name(binary: &str) -> String {
    format!("gdbinit{}", binary.replace('/', "-"))
}

pub fn gdbinit_lines(
    recipe: &RecipeModified,
    image: &RecipeImage,
    gdb: &Path,
    gdbservers: &GdbServerRegistry,
    binary: &str,
    gdbinit_path: &Path,
) -> Result<Vec<String>> {
    let info = &recipe.info;
    let port = gdbservers.port(binary)?;
    let (target_help, remote_cmd) = if gdbservers.multi() {
        (format!("#   gdbserver --multi :{port}"), "target extended-remote")
    } else {
        (format!("#   gdbserver :{port} {binary}"), "target remote")
    };

    let mut lines = vec![
        "# This file is generated by ide-sdk".to_string(),
        "# On the remote target:".to_string(),
        target_help,
        "# On the build machine:".to_string(),
        format!("#   cd {}", info.real_srctree.display()),
        format!("#   {} -ix {}", gdb.display(), gdbinit_path.display()),
        format!("set sysroot {}", info.d.display()),
        format!(
            "set substitute-path \"/usr/include\" \"{}\"",
            info.recipe_sysroot.join("usr/include").display()
        ),
    ];
    if image.debuginfod {
        lines.push("set debuginfod enabled on".into());
    } else {
        lines.push("set debuginfod enabled off".into());
        if let Some(rootfs_dbg) = image.rootfs_dbg() {
            lines.push(format!(
                "set solib-search-path \"{}\"",
                recipe.solib_search_path_str(image)
            ));
            lines.push(format!(
                "set substitute-path \"/usr/src/debug\" \"{}\"",
                rootfs_dbg.join("usr/src/debug").display()
            ));
        }
    }
    lines.push(format!("{remote_cmd} {}:{port}", gdbservers.host()));
    lines.push(format!("set remote exec-file {binary}"));
    lines.push(format!(
        "run {}",
        info.d.join(binary.trim_start_matches('/')).display()
    ));
    Ok(lines)
}

/// Register every installed binary with gdbserver and write its init file
/// into the source tree.
pub fn write_gdbinit_files(
    recipe: &RecipeModified,
    ctx: &IdeContext<'_>,
    gdbservers: &mut GdbServerRegistry,
) -> Result<Vec<PathBuf>> {
    let info = &recipe.info;
    let mut written = Vec::new();
    for binary in find_installed_binaries(&info.d)? {
        gdbservers.register(ctx.store, &binary, Some(&info.temp_dir))?;
        let path = info.real_srctree.join(gdbinit_name(&binary));
        let mut content = gdbinit_lines(
            recipe,
            ctx.image,
            ctx.gdb_cross.gdb(),
            gdbservers,
            &binary,
            &path,
        )?
        .join("\n");
        content.push('\n');
        ctx.store.write_text(&path, &content)?;
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_flattens_the_binary_path() {
        assert_eq!(gdbinit_name("/usr/bin/cmake-example"), "gdbinit-usr-bin-cmake-example");
    }
}
