use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use crate::config_file::ConfigFile;
use crate::engine::{MergeSummary, SyncEngine};
use crate::error::Result;
use crate::git::{self, RepositoryFetcher};
use crate::prompt::Prompter;
use crate::registry::Registry;
use crate::store::RegistryStore;

/// Result of syncing one registry as part of a batch.
#[derive(Debug)]
pub struct RegistryOutcome {
    pub name: String,
    pub result: Result<MergeSummary>,
}

/// Per-registry results of [`Syncer::sync_all`], in priority order.
#[derive(Debug, Default)]
pub struct SyncReport {
    pub outcomes: Vec<RegistryOutcome>,
}

impl SyncReport {
    pub fn failures(&self) -> impl Iterator<Item = &RegistryOutcome> {
        self.outcomes.iter().filter(|o| o.result.is_err())
    }

    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }
}

/// Fetches registries and merges them into the config file.
///
/// Every public operation reads the config file once and writes it at most
/// once, after all merging succeeded.
pub struct Syncer<'a> {
    fetcher: &'a dyn RepositoryFetcher,
    prompter: &'a dyn Prompter,
    config_path: PathBuf,
    checkout_root: PathBuf,
    force_reset: bool,
}

impl<'a> Syncer<'a> {
    pub fn new<P: Into<PathBuf>, Q: Into<PathBuf>>(
        fetcher: &'a dyn RepositoryFetcher,
        prompter: &'a dyn Prompter,
        config_path: P,
        checkout_root: Q,
    ) -> Syncer<'a> {
        Syncer {
            fetcher,
            prompter,
            config_path: config_path.into(),
            checkout_root: checkout_root.into(),
            force_reset: false,
        }
    }

    /// Discard local changes in checkouts when pulling.
    pub fn with_force_reset(mut self, force_reset: bool) -> Syncer<'a> {
        self.force_reset = force_reset;
        self
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Fetches the registry, parses its manifest and asks for missing values.
    ///
    /// # Errors
    /// Fetch and manifest errors. Values the prompter could not provide are not
    /// an error here; the merge reports them.
    pub fn prepare(&self, registry: &mut Registry) -> Result<()> {
        let checkout = registry.resolve_local_path(&self.checkout_root);
        git::fetch(self.fetcher, &registry.source, &checkout, self.force_reset)?;
        registry.parse(&self.checkout_root)?;

        let missing = registry.missing_keys();
        if !missing.is_empty() {
            debug!("registry '{}' needs values for {:?}", registry.name, missing);
            match self.prompter.prompt(&registry.name, &missing) {
                Ok(values) => registry.values.extend(values),
                Err(e) => warn!("unable to ask for values of registry '{}': {e}", registry.name),
            }
        }
        Ok(())
    }

    /// Fetches and merges a single registry, then writes the config file.
    ///
    /// `is_first` marks the very first registry synced into the file.
    ///
    /// # Errors
    /// Any error of [`Syncer::prepare`], [`SyncEngine::merge`] or the config
    /// file; the config file is untouched in every case.
    pub fn sync(&self, engine: &SyncEngine, registry: &mut Registry, is_first: bool) -> Result<MergeSummary> {
        self.prepare(registry)?;
        let mut file = ConfigFile::read(&self.config_path)?;
        let summary = engine.merge(&mut file, registry, is_first)?;
        file.write(&self.config_path)?;
        info!("synced registry '{}' into {}", registry.name, self.config_path.display());
        Ok(summary)
    }

    /// Syncs every registry of the store in priority order.
    ///
    /// A registry that fails is reported and keeps its previous sections. After
    /// all merges the managed sections are put in priority order and the file is
    /// written once, and only if its content changed.
    ///
    /// # Errors
    /// Only config file failures, which abort the whole batch.
    pub fn sync_all(&self, store: &mut RegistryStore) -> Result<SyncReport> {
        let order = store.names();
        let engine = SyncEngine::new(order.clone());
        let original = ConfigFile::read(&self.config_path)?;
        let mut file = original.clone();

        let mut report = SyncReport::default();
        for name in order {
            let Some(registry) = store.get_mut(&name) else {
                continue;
            };
            let result = self
                .prepare(registry)
                .and_then(|()| engine.merge(&mut file, registry, false));
            match result {
                Err(e) if !e.is_per_registry() => return Err(e),
                Err(ref e) => warn!("skipping registry '{name}': {e}"),
                Ok(_) => {}
            }
            report.outcomes.push(RegistryOutcome { name, result });
        }

        engine.reorder(&mut file);
        if file != original {
            file.write(&self.config_path)?;
            info!("updated {}", self.config_path.display());
        }
        Ok(report)
    }
}

/// Deletes all sections of `registry` from the config file at `config_path`.
///
/// # Errors
/// Config file read or write failures.
pub fn purge_registry<P: AsRef<Path>>(config_path: P, registry: &str) -> Result<usize> {
    let config_path = config_path.as_ref();
    let mut file = ConfigFile::read(config_path)?;
    let removed = SyncEngine::remove(&mut file, registry);
    if removed > 0 {
        file.write(config_path)?;
    }
    Ok(removed)
}
