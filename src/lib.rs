//! # profile-sync Core Library
//!
//! This crate contains the core logic of the `profile-sync` tool, which subscribes to git-hosted
//! *profile registries* and keeps the local AWS config file in sync with all of them.
//!
//! A registry is a repository with a manifest (`granted.yml` by default) listing profiles and
//! their attributes. Every synced profile becomes a section in the config file, tagged with a
//! marker comment naming its registry, so later syncs can update or remove exactly those sections
//! and leave everything the user wrote alone.
//!
//! ## Modules Overview
//! - [`manifest`] – Parsing and validation of registry manifests
//! - [`registry`] – The registry model: source, merge policy, checkout location, profiles
//! - [`store`] – The ordered set of subscribed registries
//! - [`settings`] – Persisting the store as `settings.toml`
//! - [`config_file`] – Lossless reading and atomic writing of the AWS config file
//! - [`engine`] – Merging registry profiles into the config file
//! - [`sync`] – Fetch, parse, prompt and merge for one or all registries
//! - [`git`] – Cloning and updating registry checkouts
//! - [`prompt`] – Asking the user for values of required keys
//! - [`global`] – Per-user default paths
//! - [`util`] – Small shared helpers

pub mod config_file;
pub mod engine;
pub mod error;
pub mod git;
pub mod global;
pub mod manifest;
pub mod prompt;
pub mod registry;
pub mod settings;
pub mod store;
pub mod sync;
pub mod util;

pub use config_file::*;
pub use engine::*;
pub use error::*;
pub use git::*;
pub use manifest::*;
pub use prompt::*;
pub use registry::*;
pub use settings::*;
pub use store::*;
pub use sync::*;
pub use util::*;
pub use global::utils::*;
