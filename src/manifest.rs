use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use serde::Deserialize;
use serde_yaml_ng::Value;
use tracing::debug;
use crate::error::{RegistryError, Result};

/// Manifest filename used when a registry does not override it.
pub const DEFAULT_MANIFEST_FILENAME: &str = "granted.yml";

/// The parsed contents of a registry manifest (`granted.yml`).
///
/// Placeholders such as `{{ SSOStartURL }}` inside attribute values are kept
/// verbatim; they are substituted when the profiles are rendered.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifest {
    /// Keys the user has to provide a value for before profiles can be synced.
    pub required_keys: BTreeSet<String>,
    /// Static template values shipped with the registry.
    pub variables: BTreeMap<String, String>,
    /// Profile definitions in file order.
    pub profiles: Vec<ProfileDefinition>,
}

/// A single profile as written in the manifest.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileDefinition {
    pub name: String,
    pub attributes: BTreeMap<String, String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawManifest {
    #[serde(default)]
    required_keys: Vec<String>,
    #[serde(default)]
    variables: BTreeMap<String, Value>,
    #[serde(default)]
    profiles: Vec<RawProfile>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawProfile {
    name: String,
    #[serde(default, alias = "attributes")]
    attrs: BTreeMap<String, Value>,
}

impl Manifest {
    /// Returns `<checkout>/<subpath>/<filename>`.
    pub fn location<P: AsRef<Path>>(checkout: P, subpath: Option<&str>, filename: &str) -> PathBuf {
        let mut path = checkout.as_ref().to_path_buf();
        if let Some(subpath) = subpath.filter(|s| !s.is_empty()) {
            path.push(subpath);
        }
        path.push(filename);
        path
    }

    /// Loads the manifest of a checked out registry.
    ///
    /// # Errors
    /// [`RegistryError::ManifestNotFound`] if the file is missing,
    /// [`RegistryError::ManifestInvalid`] if it cannot be parsed or fails validation.
    pub fn load<P: AsRef<Path>>(checkout: P, subpath: Option<&str>, filename: &str) -> Result<Manifest> {
        let path = Manifest::location(checkout, subpath, filename);
        debug!("reading manifest {}", path.display());
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RegistryError::ManifestNotFound { path });
            }
            Err(e) => {
                return Err(RegistryError::ManifestInvalid { path, reason: e.to_string() });
            }
        };
        Manifest::parse(&content, &path)
    }

    /// Parses manifest text. `path` is only used for error messages.
    pub fn parse(content: &str, path: &Path) -> Result<Manifest> {
        let invalid = |reason: String| RegistryError::ManifestInvalid {
            path: path.to_path_buf(),
            reason,
        };
        let raw: RawManifest = serde_yaml_ng::from_str(content)
            .map_err(|e| invalid(e.to_string()))?;

        let mut variables = BTreeMap::new();
        for (key, value) in raw.variables {
            if !is_valid_key(&key) {
                return Err(invalid(format!("invalid variable name '{key}'")));
            }
            let value = scalar_to_string(&value)
                .map_err(|reason| invalid(format!("variable '{key}': {reason}")))?;
            variables.insert(key, value);
        }

        let mut required_keys = BTreeSet::new();
        for key in raw.required_keys {
            if !is_valid_key(&key) {
                return Err(invalid(format!("invalid required key '{key}'")));
            }
            required_keys.insert(key);
        }

        let mut seen = HashSet::new();
        let mut profiles = Vec::with_capacity(raw.profiles.len());
        for profile in raw.profiles {
            if !is_valid_profile_name(&profile.name) {
                return Err(invalid(format!("invalid profile name '{}'", profile.name)));
            }
            if !seen.insert(profile.name.clone()) {
                return Err(invalid(format!("profile '{}' is defined more than once", profile.name)));
            }
            let mut attributes = BTreeMap::new();
            for (key, value) in profile.attrs {
                if !is_valid_key(&key) {
                    return Err(invalid(format!(
                        "profile '{}': invalid attribute name '{key}'", profile.name
                    )));
                }
                let value = scalar_to_string(&value).map_err(|reason| {
                    invalid(format!("profile '{}', attribute '{key}': {reason}", profile.name))
                })?;
                attributes.insert(key, value);
            }
            profiles.push(ProfileDefinition { name: profile.name, attributes });
        }

        Ok(Manifest { required_keys, variables, profiles })
    }
}

/// Profile names end up inside `[profile <name>]` headers and marker comments,
/// so whitespace and brackets are rejected.
pub fn is_valid_profile_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "._-@+/".contains(c))
}

fn is_valid_key(key: &str) -> bool {
    !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric() || "._-".contains(c))
}

fn scalar_to_string(value: &Value) -> std::result::Result<String, String> {
    let value = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return Err("expected a string, number or boolean".to_string()),
    };
    if value.contains('\n') || value.contains('\r') {
        return Err("values must fit on a single line".to_string());
    }
    Ok(value)
}
