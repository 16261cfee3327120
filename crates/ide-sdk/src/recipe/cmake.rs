//! CMake integration: cache variables replayed from the recipe's configure
//! arguments and a `CMakeUserPresets.json` sharing bitbake's build folder.

use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::config::Strictness;
use crate::datastore::RecipeData;
use crate::error::{Error, Result};
use crate::recipe::bbappend::BbAppend;
use crate::recipe::build_tool::BuildToolSupport;
use crate::recipe::RecipeInfo;
use crate::store::{self, ArtifactStore};

pub const DEBUG_BUILD_TYPE_APPEND: &str =
    "\nOECMAKE_ARGS:append = \" -DCMAKE_BUILD_TYPE:STRING=Debug\"\n";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum CacheVar {
    Plain(String),
    Typed {
        #[serde(rename = "type")]
        kind: String,
        value: String,
    },
}

/// Cache variables in definition order. Redefinitions replace the earlier
/// value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheVars(Vec<(String, CacheVar)>);

impl CacheVars {
    pub fn insert(&mut self, name: impl Into<String>, var: CacheVar) {
        let name = name.into();
        match self.0.iter_mut().find(|(k, _)| *k == name) {
            Some(slot) => slot.1 = var,
            None => self.0.push((name, var)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&CacheVar> {
        self.0.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn remove(&mut self, name: &str) -> Option<CacheVar> {
        let idx = self.0.iter().position(|(k, _)| k == name)?;
        Some(self.0.remove(idx).1)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_json(&self) -> Result<Value> {
        let mut m = Map::new();
        for (k, v) in &self.0 {
            m.insert(k.clone(), serde_json::to_value(v)?);
        }
        Ok(Value::Object(m))
    }
}

fn undefined_to_empty(v: &str) -> String {
    if v.starts_with("${") && v.ends_with('}') {
        String::new()
    } else {
        v.to_string()
    }
}

/// Parse `-DNAME[:TYPE]=VALUE` arguments.
pub fn parse_cache_args<'a>(
    args: impl IntoIterator<Item = &'a str>,
    strictness: Strictness,
) -> Result<CacheVars> {
    let mut vars = CacheVars::default();
    for arg in args {
        let Some(def) = arg.strip_prefix("-D") else {
            strictness.report(Error::invalid_argument(format!(
                "cannot parse cmake argument {arg}: expected a -D"
            )))?;
            continue;
        };
        let Some((name_type, value)) = def.split_once('=') else {
            strictness.report(Error::invalid_argument(format!(
                "cannot parse cmake argument {arg}: expected NAME=VALUE"
            )))?;
            continue;
        };
        let value = undefined_to_empty(value);
        match name_type.split_once(':') {
            None => vars.insert(name_type, CacheVar::Plain(value)),
            Some((name, kind)) => vars.insert(
                name,
                CacheVar::Typed {
                    kind: kind.to_string(),
                    value,
                },
            ),
        }
    }
    Ok(vars)
}

#[derive(Debug, Clone)]
pub struct CmakeConfig {
    pub generator: String,
    pub cache_vars: CacheVars,
}

impl CmakeConfig {
    pub fn from_data(d: &RecipeData, info: &RecipeInfo, strictness: Strictness) -> Result<Self> {
        if info.workdir.join("site-file.cmake").exists() {
            tracing::warn!("site-file.cmake is not supported");
        }
        let oecmake_args = d.var_or_empty("OECMAKE_ARGS");
        let extra = d.var_or_empty("EXTRA_OECMAKE");
        let cache_vars = parse_cache_args(
            oecmake_args
                .split_whitespace()
                .chain(extra.split_whitespace()),
            strictness,
        )?;
        Ok(Self {
            generator: d.var_or_empty("OECMAKE_GENERATOR"),
            cache_vars,
        })
    }

    pub fn preset_name(info: &RecipeInfo) -> String {
        format!("{}-{}", info.bpn, info.package_arch)
    }

    pub fn cmake_executable(info: &RecipeInfo) -> String {
        info.recipe_sysroot_native
            .join("usr/bin/cmake")
            .display()
            .to_string()
    }

    pub fn preset_json(&self, info: &RecipeInfo) -> Result<Value> {
        let name = Self::preset_name(info);
        let display_name = format!("{}: {}", info.bpn, info.package_arch);
        let description = format!(
            "Bitbake build environment for the recipe {} compiled for {}",
            info.bpn, info.package_arch
        );
        let configure = json!({
            "name": name,
            "displayName": display_name,
            "description": description,
            "binaryDir": info.b.display().to_string(),
            "generator": self.generator,
            "toolchainFile": info.workdir.join("toolchain.cmake").display().to_string(),
            "cacheVariables": self.cache_vars.to_json()?,
            "environment": info.exported_vars,
            "cmakeExecutable": Self::cmake_executable(info),
        });
        let derived = json!({
            "name": name,
            "displayName": display_name,
            "description": description,
            "configurePreset": name,
            "inheritConfigureEnvironment": true,
        });
        Ok(json!({
            // cmake 3.21, still readable by kirkstone's cmake
            "version": 3,
            "configurePresets": [configure],
            "buildPresets": [derived.clone()],
            "testPresets": [derived],
        }))
    }
}

impl BuildToolSupport for CmakeConfig {
    fn name(&self) -> &'static str {
        "cmake"
    }

    fn generate(&mut self, info: &RecipeInfo, store: &dyn ArtifactStore) -> Result<Option<String>> {
        tracing::info!("generating cmake preset for recipe {}", info.bpn);
        let preset_file = info.real_srctree.join("CMakeUserPresets.json");
        store::update_json_file(store, &preset_file, self.preset_json(info)?)?;
        Ok(Some(format!(
            "{} --build --preset {}",
            Self::cmake_executable(info),
            Self::preset_name(info)
        )))
    }

    fn editor_settings(&self, info: &RecipeInfo, settings: &mut Map<String, Value>) {
        settings.insert("cmake.configureOnOpen".into(), json!(false));
        settings.insert(
            "cmake.sourceDirectory".into(),
            json!(info.real_srctree.display().to_string()),
        );
    }

    fn extension_recommendations(&self, recommendations: &mut Vec<String>) {
        recommendations.extend(
            [
                "twxs.cmake",
                "ms-vscode.cmake-tools",
                "ms-vscode.cpptools",
                "ms-vscode.cpptools-extension-pack",
                "ms-vscode.cpptools-themes",
            ]
            .map(String::from),
        );
    }

    fn configuration_provider(&self) -> Option<&'static str> {
        Some("ms-vscode.cmake-tools")
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
            self.cache_vars.insert(
                "CMAKE_BUILD_TYPE",
                CacheVar::Typed {
                    kind: "STRING".into(),
                    value: "Debug".into(),
                },
            );
        } else if present {
            bbappend.remove(store, DEBUG_BUILD_TYPE_APPEND)?;
            self.cache_vars.remove("CMAKE_BUILD_TYPE");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn plain_and_typed_definitions() {
        let vars = parse_cache_args(
            ["-DFOO=ON", "-DBAR:PATH=/tmp", "-DEMPTY=${UNSET}"],
            Strictness::Strict,
        )
        .expect("parse");
        assert_eq!(vars.get("FOO"), Some(&CacheVar::Plain("ON".into())));
        assert_eq!(
            vars.get("BAR"),
            Some(&CacheVar::Typed {
                kind: "PATH".into(),
                value: "/tmp".into()
            })
        );
        assert_eq!(vars.get("EMPTY"), Some(&CacheVar::Plain(String::new())));
        assert_eq!(
            vars.to_json().expect("json"),
            json!({"FOO": "ON", "BAR": {"type": "PATH", "value": "/tmp"}, "EMPTY": ""})
        );
    }

    #[test]
    fn later_definition_wins() {
        let vars = parse_cache_args(["-DFOO=ON", "-DX=1", "-DFOO:BOOL=OFF"], Strictness::Strict)
            .expect("parse");
        assert_eq!(vars.len(), 2);
        assert_eq!(
            vars.get("FOO"),
            Some(&CacheVar::Typed {
                kind: "BOOL".into(),
                value: "OFF".into()
            })
        );
    }

    #[test]
    fn missing_dash_d_is_reported() {
        let err = parse_cache_args(["-G", "-DFOO=1"], Strictness::Strict).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let vars = parse_cache_args(["-G", "-DFOO=1"], Strictness::Lenient).expect("lenient");
        assert_eq!(vars.len(), 1);
        assert!(vars.contains("FOO"));
    }

    #[test]
    fn value_may_contain_equals_and_colons() {
        let vars = parse_cache_args(["-DFLAGS:STRING=-Wl,--x=a:b"], Strictness::Strict)
            .expect("parse");
        assert_eq!(
            vars.get("FLAGS"),
            Some(&CacheVar::Typed {
                kind: "STRING".into(),
                value: "-Wl,--x=a:b".into()
            })
        );
    }

    #[test]
    fn debug_toggle_sets_build_type_once() {
        let store = store::MemoryStore::new();
        let bbappend = BbAppend::new("/ws/appends/cmake-example.bbappend");
        store
            .write_text(bbappend.path(), "inherit externalsrc\n")
            .expect("seed bbappend");
        let mut cmake = CmakeConfig {
            generator: "Ninja".into(),
            cache_vars: parse_cache_args(["-DFOO=ON"], Strictness::Strict).expect("parse"),
        };

        cmake
            .debug_build_config(true, &bbappend, &store, Strictness::Strict)
            .expect("enable");
        cmake
            .debug_build_config(true, &bbappend, &store, Strictness::Strict)
            .expect("enable again");
        let text = store
            .read_text(bbappend.path())
            .expect("read")
            .expect("bbappend");
        assert_eq!(text.matches("CMAKE_BUILD_TYPE").count(), 1);
        assert!(cmake.cache_vars.contains("CMAKE_BUILD_TYPE"));

        cmake
            .debug_build_config(false, &bbappend, &store, Strictness::Strict)
            .expect("disable");
        let text = store
            .read_text(bbappend.path())
            .expect("read")
            .expect("bbappend");
        assert_eq!(text, "inherit externalsrc\n");
        assert!(!cmake.cache_vars.contains("CMAKE_BUILD_TYPE"));
        assert!(cmake.cache_vars.contains("FOO"));
    }
}
