use std::collections::BTreeMap;

use crate::datastore::RecipeData;

/// The environment the recipe's build tasks run with: every variable carrying
/// the export flag, sorted by name.
///
/// Shell functions cannot be carried over into presets or wrappers and are
/// reported and left out.
pub fn exported_variables(d: &RecipeData) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for (name, info) in d.vars() {
        if name.starts_with("__") {
            continue;
        }
        if info.python && info.func {
            continue;
        }
        if !info.export && !info.unexport && !info.func {
            continue;
        }
        if info.unexport {
            continue;
        }
        let Some(val) = info.value.as_deref() else {
            continue;
        };
        if name.chars().any(|c| "-.{}+".contains(c)) {
            tracing::warn!("Found invalid character in variable name {name}");
            continue;
        }
        if let Some(rest) = name.strip_prefix("BASH_FUNC_") {
            let fname = rest.strip_suffix("%%").unwrap_or(rest);
            let body = val.get(3..).unwrap_or_default();
            tracing::warn!("BASH_FUNC_ is not exported to cmake presets ({fname}() {body})");
            continue;
        }
        if info.func {
            if info.export {
                tracing::warn!(
                    "exported shell function {}() is not exported (line: {}, file: {})",
                    name,
                    info.lineno.map(|l| l.to_string()).unwrap_or_else(|| "?".into()),
                    info.filename.as_deref().unwrap_or("?")
                );
            }
            continue;
        }
        if info.export {
            out.insert(name.clone(), val.trim().to_string());
        }
    }
    out
}
