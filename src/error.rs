//! Error types for registry handling and config-file merging.

use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias used across the library.
pub type Result<T, E = RegistryError> = std::result::Result<T, E>;

/// Everything that can go wrong while managing or syncing a registry.
///
/// Manifest, collision, value and fetch errors are scoped to one registry: a
/// batch sync reports them and moves on. Config-file errors abort the batch.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// The manifest does not exist at the expected location.
    #[error("unable to find manifest at {}", path.display())]
    ManifestNotFound { path: PathBuf },

    /// The manifest exists but its structure is unusable.
    #[error("invalid manifest {}: {reason}", path.display())]
    ManifestInvalid { path: PathBuf, reason: String },

    /// A registry with this name is already subscribed.
    #[error("a registry named '{0}' already exists")]
    DuplicateName(String),

    #[error("no registry named '{0}'")]
    RegistryNotFound(String),

    /// Registry names end up in marker comments and prefixed profile names.
    #[error("invalid registry name '{0}': use letters, digits, '.', '_' or '-'")]
    InvalidName(String),

    /// Two owners want the same profile name and the policy forbids prefixing.
    #[error(
        "profile '{profile}' from registry '{registry}' collides with a profile owned by {owner}; \
         consider --prefix-duplicate-profiles or --prefix-all-profiles"
    )]
    ProfileNameCollision {
        profile: String,
        registry: String,
        owner: String,
    },

    /// A required key or template placeholder has no value.
    #[error("registry '{registry}' needs a value for '{key}'")]
    MissingValue { registry: String, key: String },

    /// `git clone`, `git pull` or `git checkout` failed.
    #[error("failed to fetch {url}: {reason}")]
    FetchFailed { url: String, reason: String },

    #[error("unable to read config file {}", path.display())]
    ConfigFileUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to write config file {}", path.display())]
    ConfigFileUnwritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The settings file could not be read, parsed or saved.
    #[error("settings error at {}: {reason}", path.display())]
    Settings { path: PathBuf, reason: String },
}

impl RegistryError {
    /// Whether this error only concerns the registry being processed.
    ///
    /// A batch sync skips the registry on such errors and continues.
    pub fn is_per_registry(&self) -> bool {
        !matches!(
            self,
            RegistryError::ConfigFileUnreadable { .. }
                | RegistryError::ConfigFileUnwritable { .. }
                | RegistryError::Settings { .. }
        )
    }
}
