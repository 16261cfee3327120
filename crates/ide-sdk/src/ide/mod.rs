//! Editor and debugger artifacts for a modified recipe.

pub mod gdbinit;
pub mod vscode;

use std::path::Path;

use crate::config::Ide;
use crate::image::RecipeImage;
use crate::store::ArtifactStore;
use crate::toolchain::GdbCross;

/// What artifact generation needs besides the recipe itself.
pub struct IdeContext<'a> {
    pub ide: Ide,
    pub image: &'a RecipeImage,
    pub gdb_cross: &'a GdbCross,
    pub store: &'a dyn ArtifactStore,
    /// Executable the generated deploy script calls back into.
    pub tool_exe: &'a Path,
}
