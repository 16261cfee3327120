use serde_json::{Map, Value};

use crate::config::Strictness;
use crate::error::{Error, ErrorKind, Result};
use crate::recipe::RecipeInfo;
use crate::recipe::bbappend::BbAppend;
use crate::recipe::cmake::CmakeConfig;
use crate::recipe::meson::MesonConfig;
use crate::store::ArtifactStore;

/// What a build tool contributes to the generated IDE setup.
pub trait BuildToolSupport {
    fn name(&self) -> &'static str;

    /// Write the preset or wrapper for this tool. Returns the command that
    /// compiles the recipe outside bitbake, if there is one.
    fn generate(&mut self, info: &RecipeInfo, store: &dyn ArtifactStore) -> Result<Option<String>>;

    fn editor_settings(&self, info: &RecipeInfo, settings: &mut Map<String, Value>);

    fn extension_recommendations(&self, recommendations: &mut Vec<String>);

    fn configuration_provider(&self) -> Option<&'static str>;

    /// Switch between the recipe's release and debug build settings.
    /// Idempotent: the bbappend never collects duplicate blocks.
    fn debug_build_config(
        &mut self,
        enable: bool,
        bbappend: &BbAppend,
        store: &dyn ArtifactStore,
        strictness: Strictness,
    ) -> Result<()>;
}

/// Recipes without cmake or meson: nothing structured to integrate with.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBuildTool;

impl BuildToolSupport for NoBuildTool {
    fn name(&self) -> &'static str {
        "none"
    }

    fn generate(&mut self, _info: &RecipeInfo, _store: &dyn ArtifactStore) -> Result<Option<String>> {
        Ok(None)
    }

    fn editor_settings(&self, _info: &RecipeInfo, _settings: &mut Map<String, Value>) {}

    fn extension_recommendations(&self, _recommendations: &mut Vec<String>) {}

    fn configuration_provider(&self) -> Option<&'static str> {
        None
    }

    fn debug_build_config(
        &mut self,
        enable: bool,
        _bbappend: &BbAppend,
        _store: &dyn ArtifactStore,
        strictness: Strictness,
    ) -> Result<()> {
        if enable {
            strictness.warn(Error::new(
                ErrorKind::Unsupported,
                "--debug-build-config is not implemented for this build tool yet.",
            ))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub enum BuildTool {
    None(NoBuildTool),
    Cmake(CmakeConfig),
    Meson(MesonConfig),
}

impl BuildTool {
    pub fn support(&self) -> &dyn BuildToolSupport {
        match self {
            BuildTool::None(t) => t,
            BuildTool::Cmake(t) => t,
            BuildTool::Meson(t) => t,
        }
    }

    pub fn support_mut(&mut self) -> &mut dyn BuildToolSupport {
        match self {
            BuildTool::None(t) => t,
            BuildTool::Cmake(t) => t,
            BuildTool::Meson(t) => t,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, BuildTool::None(_))
    }

    pub fn as_cmake(&self) -> Option<&CmakeConfig> {
        match self {
            BuildTool::Cmake(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_meson(&self) -> Option<&MesonConfig> {
        match self {
            BuildTool::Meson(m) => Some(m),
            _ => None,
        }
    }
}
