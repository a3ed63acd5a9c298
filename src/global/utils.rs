use std::path::PathBuf;
use anyhow::{anyhow, Result};
use directories::{BaseDirs, ProjectDirs};

pub fn get_global_config_dir() -> Result<PathBuf> {
    let (config_dir, _) = get_global_dirs()?;
    Ok(config_dir)
}

pub fn get_global_data_dir() -> Result<PathBuf> {
    let (_, data_dir) = get_global_dirs()?;
    Ok(data_dir)
}

pub fn get_global_dirs() -> Result<(PathBuf, PathBuf)> {
    let proj_dirs = ProjectDirs::from("io", "profile-sync", "profile-sync")
        .ok_or_else(|| anyhow!("Could not get project directories"))?;

    let config_dir = proj_dirs.config_dir().to_path_buf();
    let data_dir = proj_dirs.data_dir().to_path_buf();

    Ok((config_dir, data_dir))
}

/// `<config dir>/settings.toml`
pub fn default_settings_path() -> Result<PathBuf> {
    Ok(get_global_config_dir()?.join("settings.toml"))
}

/// `<data dir>/registries`, the parent of every registry checkout.
pub fn default_checkout_root() -> Result<PathBuf> {
    Ok(get_global_data_dir()?.join("registries"))
}

/// `~/.aws/config`
pub fn default_aws_config_path() -> Result<PathBuf> {
    let base_dirs = BaseDirs::new().ok_or_else(|| anyhow!("Could not determine home directory"))?;
    Ok(base_dirs.home_dir().join(".aws").join("config"))
}
