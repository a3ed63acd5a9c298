use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;
use crate::error::{RegistryError, Result};
use crate::manifest::{Manifest, DEFAULT_MANIFEST_FILENAME};

/// Where a registry's manifest comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    /// Git URL of the registry repository.
    pub url: String,
    /// Branch, tag or commit to check out after fetching.
    pub git_ref: Option<String>,
    /// Directory inside the repository that holds the manifest.
    pub subpath: Option<String>,
    /// Manifest filename, `granted.yml` unless overridden.
    pub filename: String,
}

impl SourceLocation {
    pub fn new(url: &str) -> SourceLocation {
        SourceLocation {
            url: url.to_string(),
            git_ref: None,
            subpath: None,
            filename: DEFAULT_MANIFEST_FILENAME.to_string(),
        }
    }
}

/// Merge policy of a registry.
///
/// Built once from command line flags (or the settings file) and handed to the
/// sync engine as a plain record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryPolicy {
    /// Ordering weight; higher priorities are placed first in the config file.
    pub priority: i64,
    /// Always expose profiles as `<registry>/<profile>`.
    pub prefix_all_profiles: bool,
    /// Fall back to `<registry>/<profile>` only when the plain name is taken.
    pub prefix_duplicate_profiles: bool,
    /// Keys configured for this registry that need a value before it can be
    /// synced, on top of the ones its manifest declares.
    pub required_keys: BTreeSet<String>,
}

/// A profile exposed by a registry. Recreated from the manifest on every parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub name: String,
    pub attributes: BTreeMap<String, String>,
    /// Name of the registry this profile comes from.
    pub registry: String,
}

/// A subscribed profile registry.
#[derive(Debug, Clone)]
pub struct Registry {
    pub name: String,
    pub source: SourceLocation,
    pub policy: RegistryPolicy,
    /// Values for required keys, as entered by the user.
    pub values: BTreeMap<String, String>,
    /// Template values shipped in the manifest.
    pub variables: BTreeMap<String, String>,
    /// Required keys declared by the manifest as of the last parse.
    pub manifest_keys: BTreeSet<String>,
    pub profiles: Vec<Profile>,
}

/// The persisted form of a registry: identity, source and policy.
///
/// Profiles are never persisted; they are re-derived from the manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryRecord {
    pub name: String,
    pub url: String,
    #[serde(default, rename = "ref", skip_serializing_if = "Option::is_none")]
    pub git_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subpath: Option<String>,
    #[serde(default = "default_filename")]
    pub filename: String,
    #[serde(default)]
    pub priority: i64,
    #[serde(default)]
    pub prefix_all_profiles: bool,
    #[serde(default)]
    pub prefix_duplicate_profiles: bool,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub required_keys: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub values: BTreeMap<String, String>,
}

fn default_filename() -> String {
    DEFAULT_MANIFEST_FILENAME.to_string()
}

/// Checks that a registry name can be used as a key, a prefix and inside a marker.
///
/// # Errors
/// Returns [`RegistryError::InvalidName`] otherwise.
pub fn validate_registry_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            first.is_ascii_alphanumeric()
                && chars.all(|c| c.is_ascii_alphanumeric() || "._-".contains(c))
        }
        None => false,
    };
    if !valid {
        return Err(RegistryError::InvalidName(name.to_string()));
    }
    Ok(())
}

impl Registry {
    /// Creates a registry that is neither fetched nor persisted yet.
    ///
    /// # Errors
    /// Fails if the name is not a valid registry name.
    pub fn new(name: &str, source: SourceLocation, policy: RegistryPolicy) -> Result<Registry> {
        validate_registry_name(name)?;
        Ok(Registry {
            name: name.to_string(),
            source,
            policy,
            values: BTreeMap::new(),
            variables: BTreeMap::new(),
            manifest_keys: BTreeSet::new(),
            profiles: Vec::new(),
        })
    }

    /// Derives the checkout directory for this registry below `root`.
    ///
    /// The path depends only on the source URL, so every sync of the same URL
    /// reuses the same checkout.
    pub fn resolve_local_path<P: AsRef<Path>>(&self, root: P) -> PathBuf {
        let url = self.source.url.trim();
        let digest = hex::encode(Sha256::digest(url.as_bytes()));
        let stem = url
            .trim_end_matches('/')
            .trim_end_matches(".git")
            .rsplit(|c: char| c == '/' || c == ':')
            .find(|s| !s.is_empty())
            .map(sanitize_segment)
            .unwrap_or_default();
        let stem = if stem.is_empty() { "registry".to_string() } else { stem };
        root.as_ref().join(format!("{}-{}", stem, &digest[..12]))
    }

    /// Reads the manifest from the checkout below `root` and populates the profiles.
    ///
    /// Required keys declared by the manifest replace those of the previous parse.
    ///
    /// # Errors
    /// Propagates manifest errors; the registry is left unchanged in that case.
    pub fn parse<P: AsRef<Path>>(&mut self, root: P) -> Result<&[Profile]> {
        let checkout = self.resolve_local_path(root);
        let manifest = Manifest::load(
            &checkout,
            self.source.subpath.as_deref(),
            &self.source.filename,
        )?;
        debug!(
            "registry '{}' defines {} profiles",
            self.name,
            manifest.profiles.len()
        );
        self.apply_manifest(manifest);
        Ok(&self.profiles)
    }

    /// Populates the registry from an already parsed manifest.
    pub fn apply_manifest(&mut self, manifest: Manifest) {
        self.manifest_keys = manifest.required_keys;
        self.variables = manifest.variables;
        self.profiles = manifest
            .profiles
            .into_iter()
            .map(|p| Profile {
                name: p.name,
                attributes: p.attributes,
                registry: self.name.clone(),
            })
            .collect();
    }

    /// Required keys, configured or declared by the manifest, that have no value yet.
    pub fn missing_keys(&self) -> Vec<String> {
        self.policy
            .required_keys
            .union(&self.manifest_keys)
            .filter(|key| !self.values.contains_key(*key))
            .cloned()
            .collect()
    }

    pub fn to_record(&self) -> RegistryRecord {
        RegistryRecord {
            name: self.name.clone(),
            url: self.source.url.clone(),
            git_ref: self.source.git_ref.clone(),
            subpath: self.source.subpath.clone(),
            filename: self.source.filename.clone(),
            priority: self.policy.priority,
            prefix_all_profiles: self.policy.prefix_all_profiles,
            prefix_duplicate_profiles: self.policy.prefix_duplicate_profiles,
            required_keys: self.policy.required_keys.clone(),
            values: self.values.clone(),
        }
    }

    /// Rebuilds a registry from its persisted record. Profiles start out empty.
    ///
    /// # Errors
    /// Fails if the stored name is not a valid registry name.
    pub fn from_record(record: RegistryRecord) -> Result<Registry> {
        validate_registry_name(&record.name)?;
        Ok(Registry {
            name: record.name,
            source: SourceLocation {
                url: record.url,
                git_ref: record.git_ref,
                subpath: record.subpath,
                filename: record.filename,
            },
            policy: RegistryPolicy {
                priority: record.priority,
                prefix_all_profiles: record.prefix_all_profiles,
                prefix_duplicate_profiles: record.prefix_duplicate_profiles,
                required_keys: record.required_keys,
            },
            values: record.values,
            variables: BTreeMap::new(),
            manifest_keys: BTreeSet::new(),
            profiles: Vec::new(),
        })
    }
}

fn sanitize_segment(segment: &str) -> String {
    segment
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || "._-".contains(c) { c } else { '_' })
        .collect()
}
