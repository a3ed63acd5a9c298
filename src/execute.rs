use std::path::PathBuf;
use anyhow::{anyhow, bail, Context, Result};
use colored::Colorize;
use profile_sync::*;
use crate::cli::{SyncCommand, CLI};

/// Files and directories a command works on.
#[derive(Debug)]
pub struct Paths {
    pub config_file: PathBuf,
    pub settings: PathBuf,
    pub checkouts: PathBuf,
}

impl Paths {
    fn resolve(cli: &CLI) -> Result<Paths> {
        Ok(Paths {
            config_file: match &cli.config_file {
                Some(path) => path.clone(),
                None => default_aws_config_path()?,
            },
            settings: match &cli.settings {
                Some(path) => path.clone(),
                None => default_settings_path()?,
            },
            checkouts: match &cli.checkout_dir {
                Some(path) => path.clone(),
                None => default_checkout_root()?,
            },
        })
    }
}

pub fn execute(cli: CLI) -> Result<()> {
    let paths = Paths::resolve(&cli)?;
    match cli.command {
        SyncCommand::Add {
            name,
            url,
            git_ref,
            subpath,
            filename,
            priority,
            prefix_all_profiles,
            prefix_duplicate_profiles,
            values,
            no_prompt,
        } => {
            let source = SourceLocation {
                url,
                git_ref,
                subpath,
                filename: filename.unwrap_or_else(|| DEFAULT_MANIFEST_FILENAME.to_string()),
            };
            let policy = RegistryPolicy {
                priority,
                prefix_all_profiles,
                prefix_duplicate_profiles,
                required_keys: Default::default(),
            };
            let mut registry = Registry::new(&name, source, policy)?;
            registry.values.extend(values);
            execute_add(&paths, registry, no_prompt)
        }
        SyncCommand::Sync { name, reset, no_prompt } => {
            execute_sync(&paths, name, reset, no_prompt)
        }
        SyncCommand::List { json } => {
            execute_list(&paths, json)
        }
        SyncCommand::Remove { name, keep_profiles } => {
            execute_remove(&paths, &name, keep_profiles)
        }
    }
}

fn prompter(no_prompt: bool) -> &'static dyn Prompter {
    if no_prompt { &NoPrompt } else { &StdinPrompter }
}

fn load_store(paths: &Paths) -> Result<RegistryStore> {
    let settings = Settings::load(&paths.settings)?;
    RegistryStore::from_settings(&settings)
        .with_context(|| format!("Invalid settings file {}", paths.settings.display()))
}

pub fn execute_add(paths: &Paths, registry: Registry, no_prompt: bool) -> Result<()> {
    let mut store = load_store(paths)?;
    let name = registry.name.clone();
    let is_first = store.is_empty();
    store.add(registry)?;

    let engine = SyncEngine::new(store.names());
    let syncer = Syncer::new(&GitFetcher, prompter(no_prompt), &paths.config_file, &paths.checkouts);
    let registry = store
        .get_mut(&name)
        .ok_or_else(|| anyhow!("Registry {} not found after adding it", name))?;
    let summary = syncer.sync(&engine, registry, is_first)?;

    // the registry is only remembered once it synced successfully
    store.to_settings().save(&paths.settings)?;
    println!(
        "{} registry '{}' into {} ({})",
        "Added".green().bold(),
        name,
        paths.config_file.display(),
        describe_summary(&summary)
    );
    Ok(())
}

pub fn execute_sync(paths: &Paths, name: Option<String>, reset: bool, no_prompt: bool) -> Result<()> {
    let mut store = load_store(paths)?;
    if store.is_empty() {
        println!("No registries. Run `profile-sync add` to subscribe to one.");
        return Ok(());
    }
    let syncer = Syncer::new(&GitFetcher, prompter(no_prompt), &paths.config_file, &paths.checkouts)
        .with_force_reset(reset);

    match name {
        Some(name) => {
            let engine = SyncEngine::new(store.names());
            let registry = store
                .get_mut(&name)
                .ok_or_else(|| RegistryError::RegistryNotFound(name.clone()))?;
            let summary = syncer.sync(&engine, registry, false)?;
            store.to_settings().save(&paths.settings)?;
            println!("{} {}: {}", "Synced".green().bold(), name, describe_summary(&summary));
        }
        None => {
            let report = syncer.sync_all(&mut store)?;
            store.to_settings().save(&paths.settings)?;
            for outcome in &report.outcomes {
                match &outcome.result {
                    Ok(summary) => {
                        println!("{} {}: {}", "Synced".green().bold(), outcome.name, describe_summary(summary));
                    }
                    Err(e) => {
                        println!("{} {}: {}", "Failed".red().bold(), outcome.name, e);
                    }
                }
            }
            let failed = report.failures().count();
            if failed > 0 {
                bail!("{} of {} registries failed to sync", failed, report.outcomes.len());
            }
        }
    }
    Ok(())
}

pub fn execute_list(paths: &Paths, json: bool) -> Result<()> {
    let store = load_store(paths)?;
    if json {
        let records: Vec<RegistryRecord> = store.list().into_iter().map(Registry::to_record).collect();
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }
    if store.is_empty() {
        println!("No registries");
        return Ok(());
    }
    for registry in store.list() {
        println!("{} (priority {})", registry.name.bold(), registry.policy.priority);
        println!("  url: {}", registry.source.url);
        if let Some(git_ref) = &registry.source.git_ref {
            println!("  ref: {}", git_ref);
        }
        if let Some(subpath) = &registry.source.subpath {
            println!("  path: {}", subpath);
        }
        if registry.source.filename != DEFAULT_MANIFEST_FILENAME {
            println!("  manifest: {}", registry.source.filename);
        }
        if registry.policy.prefix_all_profiles {
            println!("  prefix: all profiles");
        } else if registry.policy.prefix_duplicate_profiles {
            println!("  prefix: duplicate profiles");
        }
    }
    Ok(())
}

pub fn execute_remove(paths: &Paths, name: &str, keep_profiles: bool) -> Result<()> {
    let mut store = load_store(paths)?;
    store.remove(name)?;
    if !keep_profiles {
        let removed = purge_registry(&paths.config_file, name)?;
        println!("Removed {} profiles from {}", removed, paths.config_file.display());
    }
    store.to_settings().save(&paths.settings)?;
    println!("{} registry '{}'", "Removed".green().bold(), name);
    Ok(())
}
