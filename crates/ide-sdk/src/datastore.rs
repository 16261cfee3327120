//! Recipe variable lookup.
//!
//! The build-configuration database is consumed as a flat snapshot per recipe:
//! variable values plus the handful of flags this tool cares about (export,
//! unexport, func, python). Two sources produce that snapshot: the output of
//! `bitbake -e <recipe>` and a TOML fixture file.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::exec::BuildEnv;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VarInfo {
    pub value: Option<String>,
    pub export: bool,
    pub unexport: bool,
    pub func: bool,
    pub python: bool,
    pub lineno: Option<u32>,
    pub filename: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct RecipeData {
    pub name: String,
    vars: BTreeMap<String, VarInfo>,
    inherits: BTreeSet<String>,
}

impl RecipeData {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn set_var(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut VarInfo {
        let info = self.vars.entry(key.into()).or_default();
        info.value = Some(value.into());
        info
    }

    pub fn var_mut(&mut self, key: &str) -> &mut VarInfo {
        self.vars.entry(key.to_string()).or_default()
    }

    pub fn add_inherit(&mut self, class: impl Into<String>) {
        self.inherits.insert(class.into());
    }

    pub fn get_var(&self, key: &str) -> Option<&str> {
        self.vars.get(key)?.value.as_deref()
    }

    // Missing variables mean the recipe did not parse the way we expect.
    pub fn require_var(&self, key: &str) -> Result<&str> {
        self.get_var(key).ok_or_else(|| {
            Error::config(format!(
                "variable {} is not set for recipe {}",
                key, self.name
            ))
        })
    }

    pub fn var_or_empty(&self, key: &str) -> String {
        self.get_var(key).unwrap_or_default().to_string()
    }

    pub fn info(&self, key: &str) -> Option<&VarInfo> {
        self.vars.get(key)
    }

    pub fn vars(&self) -> impl Iterator<Item = (&String, &VarInfo)> {
        self.vars.iter()
    }

    pub fn inherits_class(&self, class: &str) -> bool {
        self.inherits.contains(class)
    }
}

pub trait Datastore {
    /// Parse a recipe with its appends applied. Workspace recipes are not
    /// filtered out.
    fn parse_recipe(&mut self, name: &str) -> Result<RecipeData>;
}

fn parse_failed(name: &str, detail: impl std::fmt::Display) -> Error {
    Error::config(format!("Parsing {name} recipe failed: {detail}"))
}

/// Datastore backed by `bitbake -e`.
pub struct BitbakeEnvStore<'a> {
    env: &'a dyn BuildEnv,
}

impl<'a> BitbakeEnvStore<'a> {
    pub fn new(env: &'a dyn BuildEnv) -> Self {
        Self { env }
    }
}

impl Datastore for BitbakeEnvStore<'_> {
    fn parse_recipe(&mut self, name: &str) -> Result<RecipeData> {
        tracing::debug!("bitbake -e {name}");
        let out = self
            .env
            .capture(&format!("bitbake -e {name}"))
            .map_err(|e| parse_failed(name, e))?;
        let data = parse_bitbake_env(name, &out)?;
        if data.get_var("PN").is_none() {
            return Err(parse_failed(name, "no PN in bitbake -e output"));
        }
        Ok(data)
    }
}

fn unescape_value(raw: &str) -> String {
    raw.replace("\\\"", "\"").replace("\\$", "$")
}

fn closes_value(line: &str) -> bool {
    match line.strip_suffix('"') {
        Some(rest) => !rest.ends_with('\\'),
        None => false,
    }
}

/// Parse the environment dump printed by `bitbake -e`.
pub fn parse_bitbake_env(name: &str, text: &str) -> Result<RecipeData> {
    let assign = Regex::new(r#"^(export )?([^\s="]+)="(.*)$"#)
        .map_err(|e| Error::msg(format!("regex error: {e}")))?;
    let func_start = Regex::new(r"^(python )?([^\s(]+) ?\(\) \{$")
        .map_err(|e| Error::msg(format!("regex error: {e}")))?;
    let origin = Regex::new(r"^# line: (\d+), file: (.*)$")
        .map_err(|e| Error::msg(format!("regex error: {e}")))?;

    let mut data = RecipeData::new(name);
    let mut pending_origin: Option<(u32, String)> = None;
    let mut lines = text.lines();

    while let Some(line) = lines.next() {
        if let Some(c) = origin.captures(line) {
            pending_origin = Some((c[1].parse().unwrap_or(0), c[2].to_string()));
            continue;
        }
        if line.starts_with('#') || line.trim().is_empty() {
            continue;
        }
        if let Some(var) = line.strip_prefix("unset ") {
            data.var_mut(var.trim()).unexport = true;
            continue;
        }
        if let Some(var) = line.strip_prefix("export -f ") {
            let info = data.var_mut(var.trim());
            info.export = true;
            info.func = true;
            continue;
        }
        if let Some(c) = func_start.captures(line) {
            let python = c.get(1).is_some();
            let fname = c[2].to_string();
            let mut body = Vec::new();
            for l in lines.by_ref() {
                if l == "}" {
                    break;
                }
                body.push(l);
            }
            let info = data.set_var(fname, body.join("\n"));
            info.func = true;
            info.python = python;
            if let Some((lineno, file)) = pending_origin.take() {
                info.lineno = Some(lineno);
                info.filename = Some(file);
            }
            continue;
        }
        if let Some(c) = assign.captures(line) {
            let export = c.get(1).is_some();
            let key = c[2].to_string();
            let mut raw = c[3].to_string();
            while !closes_value(&raw) {
                let Some(next) = lines.next() else {
                    return Err(parse_failed(
                        name,
                        format!("unterminated value for {key}"),
                    ));
                };
                let cont = raw.strip_suffix(" \\").unwrap_or(&raw).to_string();
                raw = format!("{cont}\n{next}");
            }
            raw.pop();
            let info = data.set_var(key, unescape_value(&raw));
            info.export = export;
            continue;
        }
        // `BASH_FUNC_x%%() ...` one-liners and anything unknown.
        tracing::trace!("bitbake -e: ignoring line: {line}");
    }

    if let Some(included) = data.get_var("BBINCLUDED").map(str::to_owned) {
        for f in included.split_whitespace() {
            let p = Path::new(f);
            if p.extension().and_then(|e| e.to_str()) == Some("bbclass") {
                if let Some(stem) = p.file_stem().and_then(|s| s.to_str()) {
                    data.add_inherit(stem);
                }
            }
        }
    }
    Ok(data)
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FixtureRecipe {
    pub vars: BTreeMap<String, String>,
    pub exported: Vec<String>,
    pub unexported: Vec<String>,
    pub functions: Vec<String>,
    pub python_functions: Vec<String>,
    pub exported_functions: Vec<String>,
    pub inherits: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FixtureWorkspaceEntry {
    pub srctree: PathBuf,
    pub bbappend: PathBuf,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FixtureFile {
    pub recipes: BTreeMap<String, FixtureRecipe>,
    pub workspace: BTreeMap<String, FixtureWorkspaceEntry>,
}

/// Datastore backed by a TOML description of recipes.
#[derive(Debug, Clone, Default)]
pub struct FixtureStore {
    pub file: FixtureFile,
}

impl FixtureStore {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| Error::config(format!("failed to read fixture {}: {e}", path.display())))?;
        Self::from_toml(&text)
            .map_err(|e| Error::config(format!("invalid fixture {}: {e}", path.display())))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let file: FixtureFile = toml::from_str(text)?;
        Ok(Self { file })
    }
}

impl Datastore for FixtureStore {
    fn parse_recipe(&mut self, name: &str) -> Result<RecipeData> {
        let Some(r) = self.file.recipes.get(name) else {
            return Err(parse_failed(name, "recipe not found"));
        };
        let mut data = RecipeData::new(name);
        for (k, v) in &r.vars {
            data.set_var(k.clone(), v.clone());
        }
        for k in &r.exported {
            data.var_mut(k).export = true;
        }
        for k in &r.unexported {
            data.var_mut(k).unexport = true;
        }
        for k in &r.functions {
            data.var_mut(k).func = true;
        }
        for k in &r.python_functions {
            let info = data.var_mut(k);
            info.func = true;
            info.python = true;
        }
        for k in &r.exported_functions {
            let info = data.var_mut(k);
            info.func = true;
            info.export = true;
        }
        for c in &r.inherits {
            data.add_inherit(c.clone());
        }
        Ok(data)
    }
}
