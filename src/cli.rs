use std::path::PathBuf;
use clap::{ArgAction, Parser, Subcommand};
use profile_sync::parse_key_value;

#[derive(Debug, Parser, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct CLI {
    #[command(subcommand)]
    pub(crate) command: SyncCommand,

    /// AWS config file to keep in sync. Defaults to `~/.aws/config`
    #[clap(long, global = true, env = "AWS_CONFIG_FILE")]
    pub(crate) config_file: Option<PathBuf>,

    /// Settings file holding the subscribed registries
    #[clap(long, global = true, env = "PROFILE_SYNC_SETTINGS")]
    pub(crate) settings: Option<PathBuf>,

    /// Directory registry repositories are cloned into
    #[clap(long, global = true, env = "PROFILE_SYNC_CHECKOUTS")]
    pub(crate) checkout_dir: Option<PathBuf>,

    /// More output; repeat for debug logs
    #[clap(short, long, global = true, action = ArgAction::Count)]
    pub(crate) verbose: u8,
}

#[derive(Debug, Subcommand, Clone, PartialEq)]
pub enum SyncCommand {
    /// Subscribes to a profile registry and syncs its profiles into the config file
    Add {
        /// Unique name of the registry
        #[clap(long)]
        name: String,
        /// Git URL of the registry repository
        #[clap(long)]
        url: String,
        /// Branch, tag or commit to use
        #[clap(long = "ref")]
        git_ref: Option<String>,
        /// Directory inside the repository containing the manifest
        #[clap(long = "path")]
        subpath: Option<String>,
        /// Manifest filename. Defaults to `granted.yml`
        #[clap(long)]
        filename: Option<String>,
        /// Registries with a higher priority are placed first
        #[clap(long, default_value_t = 0, allow_negative_numbers = true)]
        priority: i64,
        /// Expose every profile as `<registry>/<profile>`
        #[clap(long)]
        prefix_all_profiles: bool,
        /// Expose profiles as `<registry>/<profile>` when their name is already taken
        #[clap(long)]
        prefix_duplicate_profiles: bool,
        /// Value for a required key: KEY=VALUE (repeatable)
        #[clap(long = "value", value_parser = parse_key_value)]
        values: Vec<(String, String)>,
        /// Fail instead of asking for missing values
        #[clap(long)]
        no_prompt: bool,
    },
    /// Pulls registries and syncs their profiles. Defaults to all
    Sync {
        /// Sync one specific registry
        #[clap(long)]
        name: Option<String>,
        /// Discard local changes in registry checkouts
        #[clap(long)]
        reset: bool,
        /// Fail instead of asking for missing values
        #[clap(long)]
        no_prompt: bool,
    },
    /// Lists subscribed registries by priority
    #[clap(alias = "ls")]
    List {
        /// Print JSON instead of text
        #[clap(long)]
        json: bool,
    },
    /// Unsubscribes from a registry and deletes its profiles from the config file
    #[clap(alias = "rm")]
    Remove {
        name: String,
        /// Leave the registry's profiles in the config file
        #[clap(long)]
        keep_profiles: bool,
    },
}
