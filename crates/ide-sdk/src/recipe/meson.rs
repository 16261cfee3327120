//! Meson integration: a wrapper around the native `meson.real` that carries
//! the recipe's cross environment, plus settings for the meson extension.

use std::path::PathBuf;

use serde_json::{Map, Value, json};

use crate::config::Strictness;
use crate::datastore::RecipeData;
use crate::error::Result;
use crate::recipe::RecipeInfo;
use crate::recipe::bbappend::BbAppend;
use crate::recipe::build_tool::BuildToolSupport;
use crate::store::{self, ArtifactStore};

pub const DEBUG_BUILD_TYPE_APPEND: &str = "\nMESON_BUILDTYPE = \"debug\"\n";

#[derive(Debug, Clone)]
pub struct MesonConfig {
    pub buildtype: String,
    pub mesonopts: String,
    pub extra_oemeson: String,
    pub cross_file: String,
    wrapper: Option<PathBuf>,
}

impl MesonConfig {
    pub fn from_data(d: &RecipeData) -> Self {
        Self {
            buildtype: d.var_or_empty("MESON_BUILDTYPE"),
            mesonopts: d.var_or_empty("MESONOPTS"),
            extra_oemeson: d.var_or_empty("EXTRA_OEMESON"),
            cross_file: d.var_or_empty("MESON_CROSS_FILE"),
            wrapper: None,
        }
    }

    /// Path of the generated wrapper, once [`BuildToolSupport::generate`] ran.
    pub fn wrapper(&self) -> Option<&std::path::Path> {
        self.wrapper.as_deref()
    }

    pub fn wrapper_path(info: &RecipeInfo) -> PathBuf {
        info.temp_dir.join("meson")
    }

    pub fn configure_options(&self) -> Vec<String> {
        self.mesonopts
            .split_whitespace()
            .chain(self.cross_file.split_whitespace())
            .chain(self.extra_oemeson.split_whitespace())
            .map(String::from)
            .collect()
    }

    pub fn wrapper_lines(info: &RecipeInfo) -> Vec<String> {
        let meson_real = info.recipe_sysroot_native.join("usr/bin/meson.real");
        let private_temp = info.b.join("meson-private").join("tmp");
        let mut lines = vec!["#!/bin/sh".to_string()];
        lines.extend(
            info.exported_vars
                .iter()
                .map(|(var, val)| format!("export {var}=\"{val}\"")),
        );
        lines.push("unset CC CXX CPP LD AR NM STRIP".into());
        lines.push(format!("mkdir -p \"{}\"", private_temp.display()));
        lines.push(format!("export TMPDIR=\"{}\"", private_temp.display()));
        lines.push(format!("exec \"{}\" \"$@\"", meson_real.display()));
        lines
    }

    /// Rewrite the value following `--buildtype` (or of `--buildtype=`) in
    /// the meson options. Options without the flag are left alone.
    fn set_buildtype(&mut self, buildtype: &str) {
        let mut opts: Vec<String> = self.mesonopts.split_whitespace().map(String::from).collect();
        let mut i = 0;
        while i < opts.len() {
            if opts[i] == "--buildtype" {
                if let Some(value) = opts.get_mut(i + 1) {
                    *value = buildtype.to_string();
                }
                i += 1;
            } else if opts[i].starts_with("--buildtype=") {
                opts[i] = format!("--buildtype={buildtype}");
            }
            i += 1;
        }
        self.mesonopts = opts.join(" ");
        self.buildtype = buildtype.to_string();
    }
}

impl BuildToolSupport for MesonConfig {
    fn name(&self) -> &'static str {
        "meson"
    }

    fn generate(&mut self, info: &RecipeInfo, store: &dyn ArtifactStore) -> Result<Option<String>> {
        let wrapper = Self::wrapper_path(info);
        store::write_script(store, &wrapper, &Self::wrapper_lines(info))?;
        let cmd = format!("{} compile -C {}", wrapper.display(), info.b.display());
        self.wrapper = Some(wrapper);
        Ok(Some(cmd))
    }

    fn editor_settings(&self, info: &RecipeInfo, settings: &mut Map<String, Value>) {
        let wrapper = self
            .wrapper
            .clone()
            .unwrap_or_else(|| Self::wrapper_path(info));
        settings.insert(
            "mesonbuild.mesonPath".into(),
            json!(wrapper.display().to_string()),
        );
        settings.insert(
            "mesonbuild.configureOptions".into(),
            json!(self.configure_options()),
        );
        settings.insert(
            "mesonbuild.buildFolder".into(),
            json!(info.b.display().to_string()),
        );
    }

    fn extension_recommendations(&self, recommendations: &mut Vec<String>) {
        recommendations.push("mesonbuild.mesonbuild".into());
    }

    fn configuration_provider(&self) -> Option<&'static str> {
        Some("mesonbuild.mesonbuild")
    }

    fn debug_build_config(
        &mut self,
        enable: bool,
        bbappend: &BbAppend,
        store: &dyn ArtifactStore,
        _strictness: Strictness,
    ) -> Result<()> {
        let present = bbappend.contains(store, DEBUG_BUILD_TYPE_APPEND)?;
        if enable {
            if !present {
                bbappend.append(store, DEBUG_BUILD_TYPE_APPEND)?;
            }
            self.set_buildtype("debug");
        } else if present {
            bbappend.remove(store, DEBUG_BUILD_TYPE_APPEND)?;
            self.set_buildtype("plain");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn meson() -> MesonConfig {
        let mut d = RecipeData::new("meson-example");
        d.set_var("MESON_BUILDTYPE", "plain");
        d.set_var("MESONOPTS", "--prefix /usr --buildtype plain --wrap-mode nodownload");
        d.set_var("EXTRA_OEMESON", "-Dtests=false");
        d.set_var("MESON_CROSS_FILE", "--cross-file /work/meson.cross");
        MesonConfig::from_data(&d)
    }

    #[test]
    fn configure_options_concatenate_in_order() {
        assert_eq!(
            meson().configure_options(),
            vec![
                "--prefix",
                "/usr",
                "--buildtype",
                "plain",
                "--wrap-mode",
                "nodownload",
                "--cross-file",
                "/work/meson.cross",
                "-Dtests=false"
            ]
        );
    }

    #[test]
    fn debug_toggle_rewrites_buildtype_and_is_idempotent() {
        let store = store::MemoryStore::new();
        let bbappend = BbAppend::new("/ws/appends/meson-example.bbappend");
        store
            .write_text(bbappend.path(), "inherit externalsrc\n")
            .expect("seed bbappend");
        let mut m = meson();

        m.debug_build_config(true, &bbappend, &store, Strictness::Strict)
            .expect("enable");
        m.debug_build_config(true, &bbappend, &store, Strictness::Strict)
            .expect("enable again");
        let text = store
            .read_text(Path::new("/ws/appends/meson-example.bbappend"))
            .expect("read")
            .unwrap_or_default();
        assert_eq!(text.matches("MESON_BUILDTYPE").count(), 1);
        assert_eq!(m.buildtype, "debug");
        assert!(m.mesonopts.contains("--buildtype debug"));

        m.debug_build_config(false, &bbappend, &store, Strictness::Strict)
            .expect("disable");
        let text = store
            .read_text(bbappend.path())
            .expect("read")
            .unwrap_or_default();
        assert_eq!(text, "inherit externalsrc\n");
        assert_eq!(m.buildtype, "plain");
        assert!(m.mesonopts.contains("--buildtype plain"));
    }

    #[test]
    fn buildtype_rewrite_without_known_buildtype() {
        let mut d = RecipeData::new("meson-example");
        d.set_var("MESONOPTS", "--prefix /usr --buildtype plain --wrap-mode nodownload");
        let mut m = MesonConfig::from_data(&d);
        assert!(m.buildtype.is_empty());

        m.set_buildtype("debug");
        assert_eq!(m.mesonopts, "--prefix /usr --buildtype debug --wrap-mode nodownload");

        let mut d = RecipeData::new("meson-example");
        d.set_var("MESONOPTS", "--buildtype=plain -Db_lto=false");
        let mut m = MesonConfig::from_data(&d);
        m.set_buildtype("debug");
        assert_eq!(m.mesonopts, "--buildtype=debug -Db_lto=false");
    }
}
