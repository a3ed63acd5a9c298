//! Merging registry profiles into the config file.
//!
//! The engine works on an in-memory [`ConfigFile`] and never touches the
//! filesystem. Every merge is computed into a fresh block list that replaces the
//! file's blocks only when the whole registry merged cleanly.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::LazyLock;
use regex::Regex;
use tracing::debug;
use crate::config_file::{Block, ConfigFile, Owner};
use crate::error::{RegistryError, Result};
use crate::registry::{Profile, Registry};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*\.?([A-Za-z0-9_.-]+)\s*\}\}").expect("valid placeholder regex")
});

/// Manifest attribute names that map to a different config key.
const ATTRIBUTE_ALIASES: &[(&str, &str)] = &[("role", "role_arn")];

/// What a merge changed. `added` holds effective names, `updated` and
/// `removed` the profile names from the manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeSummary {
    pub added: Vec<String>,
    pub updated: Vec<String>,
    pub removed: Vec<String>,
}

impl MergeSummary {
    pub fn is_unchanged(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }
}

/// Merges registries into a config file according to their priority order.
#[derive(Debug, Clone, Default)]
pub struct SyncEngine {
    order: Vec<String>,
}

impl SyncEngine {
    /// `order` lists registry names from highest to lowest priority.
    pub fn new<I, S>(order: I) -> SyncEngine
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        SyncEngine {
            order: order.into_iter().map(Into::into).collect(),
        }
    }

    fn rank(&self, registry: &str) -> Option<usize> {
        self.order.iter().position(|name| name == registry)
    }

    /// Merges the profiles of `registry` into `file`.
    ///
    /// Sections previously written for this registry are updated in place,
    /// sections of profiles that left the manifest are deleted and new profiles
    /// are added after the registry's last section. A registry without sections
    /// in the file is appended when `is_first` is set, and otherwise placed
    /// before the first registry that ranks below it.
    ///
    /// A registry wins a profile name over lower ranked registries; their
    /// sections holding that name are renamed to `<registry>/<profile>`.
    ///
    /// # Errors
    /// [`RegistryError::MissingValue`] or [`RegistryError::ProfileNameCollision`];
    /// `file` is left untouched in both cases.
    pub fn merge(&self, file: &mut ConfigFile, registry: &Registry, is_first: bool) -> Result<MergeSummary> {
        if let Some(key) = registry.missing_keys().into_iter().next() {
            return Err(RegistryError::MissingValue {
                registry: registry.name.clone(),
                key,
            });
        }

        let (names, displaced) = self.effective_names(file, registry)?;
        let mut rendered: HashMap<&str, Block> = HashMap::with_capacity(registry.profiles.len());
        for (profile, name) in registry.profiles.iter().zip(&names) {
            rendered.insert(profile.name.as_str(), render_profile(registry, profile, name)?);
        }

        let mut summary = MergeSummary::default();
        let mut blocks = Vec::with_capacity(file.blocks().len() + rendered.len());
        let mut block_end = None;
        for (index, block) in file.blocks().iter().enumerate() {
            match block.owner() {
                Some(owner) if owner.registry == registry.name => {
                    match rendered.remove(owner.profile.as_str()) {
                        Some(new_block) => {
                            if new_block != *block {
                                summary.updated.push(owner.profile.clone());
                            }
                            blocks.push(new_block);
                        }
                        None => summary.removed.push(owner.profile.clone()),
                    }
                    block_end = Some(blocks.len());
                }
                _ => match displaced.get(&index) {
                    Some(renamed) => {
                        debug!("registry '{}' takes over a name, moving section to {renamed}", registry.name);
                        blocks.push(block.renamed(renamed));
                    }
                    None => blocks.push(block.clone()),
                },
            }
        }

        let mut additions = Vec::new();
        for (profile, name) in registry.profiles.iter().zip(&names) {
            if let Some(block) = rendered.remove(profile.name.as_str()) {
                summary.added.push(name.clone());
                additions.push(block);
            }
        }
        let position = match block_end {
            Some(end) => end,
            None if is_first => blocks.len(),
            None => self.placement(&blocks, &registry.name),
        };
        blocks.splice(position..position, additions);

        debug!(
            "merged registry '{}': {} added, {} updated, {} removed",
            registry.name,
            summary.added.len(),
            summary.updated.len(),
            summary.removed.len()
        );
        *file = ConfigFile::new(blocks);
        Ok(summary)
    }

    /// Index at which a registry without any sections should be inserted.
    fn placement(&self, blocks: &[Block], registry: &str) -> usize {
        let Some(mine) = self.rank(registry) else {
            return blocks.len();
        };
        blocks
            .iter()
            .position(|block| {
                block
                    .owner()
                    .and_then(|owner| self.rank(&owner.registry))
                    .is_some_and(|theirs| theirs > mine)
            })
            .unwrap_or(blocks.len())
    }

    /// Rearranges managed sections so registries appear in priority order.
    ///
    /// Managed sections are redistributed over the positions they already
    /// occupy, so user sections and sections of unknown registries stay where
    /// they are. The order of sections within one registry is preserved.
    pub fn reorder(&self, file: &mut ConfigFile) {
        let mut blocks = std::mem::take(file).into_blocks();
        let slots: Vec<usize> = blocks
            .iter()
            .enumerate()
            .filter(|(_, block)| block.owner().and_then(|o| self.rank(&o.registry)).is_some())
            .map(|(index, _)| index)
            .collect();
        let mut managed: Vec<Block> = slots.iter().map(|&i| blocks[i].clone()).collect();
        managed.sort_by_key(|block| block.owner().and_then(|o| self.rank(&o.registry)));
        for (slot, block) in slots.into_iter().zip(managed) {
            blocks[slot] = block;
        }
        *file = ConfigFile::new(blocks);
    }

    /// Picks the name each profile is exposed under, in manifest order.
    ///
    /// Names held by sections of lower ranked registries do not count as taken.
    /// Those sections are returned by index together with their prefixed name,
    /// which their own registry resolves to once it is merged again.
    fn effective_names(
        &self,
        file: &ConfigFile,
        registry: &Registry,
    ) -> Result<(Vec<String>, HashMap<usize, String>)> {
        let mine = self.rank(&registry.name);
        let outranked = |block: &Block| -> bool {
            let theirs = block.owner().and_then(|owner| self.rank(&owner.registry));
            matches!((mine, theirs), (Some(mine), Some(theirs)) if theirs > mine)
        };

        let mut claimed: HashMap<&str, String> = HashMap::new();
        for block in file.blocks() {
            if block.is_owned_by(&registry.name) || outranked(block) {
                continue;
            }
            if let Some(name) = block.profile_name() {
                let owner = match block.owner() {
                    Some(owner) => format!("registry '{}'", owner.registry),
                    None => "your own config".to_string(),
                };
                claimed.entry(name).or_insert(owner);
            }
        }

        let collision = |profile: &str, owner: &str| RegistryError::ProfileNameCollision {
            profile: profile.to_string(),
            registry: registry.name.clone(),
            owner: owner.to_string(),
        };

        let policy = &registry.policy;
        let mut taken = HashSet::new();
        let mut names = Vec::with_capacity(registry.profiles.len());
        for profile in &registry.profiles {
            let prefixed = format!("{}/{}", registry.name, profile.name);
            let name = if policy.prefix_all_profiles {
                prefixed
            } else {
                match claimed.get(profile.name.as_str()) {
                    Some(_) if policy.prefix_duplicate_profiles => prefixed,
                    Some(owner) => return Err(collision(&profile.name, owner)),
                    None => profile.name.clone(),
                }
            };
            if let Some(owner) = claimed.get(name.as_str()) {
                return Err(collision(&name, owner));
            }
            if !taken.insert(name.clone()) {
                return Err(collision(&name, &format!("registry '{}'", registry.name)));
            }
            names.push(name);
        }

        let in_use: HashSet<&str> = file.blocks().iter().filter_map(Block::profile_name).collect();
        let mut displaced = HashMap::new();
        for (index, block) in file.blocks().iter().enumerate() {
            if !outranked(block) {
                continue;
            }
            let (Some(owner), Some(current)) = (block.owner(), block.profile_name()) else {
                continue;
            };
            if !taken.contains(current) {
                continue;
            }
            let renamed = format!("{}/{}", owner.registry, owner.profile);
            if in_use.contains(renamed.as_str()) || taken.contains(&renamed) {
                return Err(collision(&renamed, &format!("registry '{}'", owner.registry)));
            }
            displaced.insert(index, renamed);
        }
        Ok((names, displaced))
    }

    /// Deletes every section owned by `registry` and returns how many were removed.
    pub fn remove(file: &mut ConfigFile, registry: &str) -> usize {
        let blocks = std::mem::take(file).into_blocks();
        let before = blocks.len();
        let kept: Vec<Block> = blocks.into_iter().filter(|b| !b.is_owned_by(registry)).collect();
        let removed = before - kept.len();
        *file = ConfigFile::new(kept);
        removed
    }
}

fn render_profile(registry: &Registry, profile: &Profile, effective_name: &str) -> Result<Block> {
    let mut attributes = BTreeMap::new();
    for (key, value) in &profile.attributes {
        let key = ATTRIBUTE_ALIASES
            .iter()
            .find(|(alias, _)| *alias == key.as_str())
            .map_or(key.as_str(), |&(_, target)| target);
        attributes.insert(key.to_string(), substitute(registry, value)?);
    }
    let attributes: Vec<(String, String)> = attributes.into_iter().collect();
    Ok(Block::managed(
        Owner::new(&registry.name, &profile.name),
        effective_name,
        &attributes,
    ))
}

/// Replaces `{{ key }}` placeholders. User-provided values win over manifest variables.
fn substitute(registry: &Registry, value: &str) -> Result<String> {
    let mut out = String::with_capacity(value.len());
    let mut last = 0;
    for caps in PLACEHOLDER.captures_iter(value) {
        let Some(whole) = caps.get(0) else { continue };
        let key = &caps[1];
        let replacement = registry
            .values
            .get(key)
            .or_else(|| registry.variables.get(key))
            .ok_or_else(|| RegistryError::MissingValue {
                registry: registry.name.clone(),
                key: key.to_string(),
            })?;
        out.push_str(&value[last..whole.start()]);
        out.push_str(replacement);
        last = whole.end();
    }
    out.push_str(&value[last..]);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{Manifest, ProfileDefinition};
    use crate::registry::{RegistryPolicy, SourceLocation};
    use pretty_assertions::assert_eq;

    fn registry(name: &str, profiles: &[(&str, &[(&str, &str)])]) -> Registry {
        let mut reg = Registry::new(
            name,
            SourceLocation::new(&format!("https://example.com/{name}.git")),
            RegistryPolicy::default(),
        )
        .unwrap();
        reg.apply_manifest(Manifest {
            profiles: profiles
                .iter()
                .map(|(profile, attrs)| ProfileDefinition {
                    name: profile.to_string(),
                    attributes: attrs
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                })
                .collect(),
            ..Manifest::default()
        });
        reg
    }

    #[test]
    fn test_first_registry_into_empty_file() {
        let reg = registry("core", &[("dev", &[("role", "arn:aws:iam::111:role/dev")])]);
        let mut file = ConfigFile::default();
        let summary = SyncEngine::new(["core"]).merge(&mut file, &reg, true).unwrap();
        assert_eq!(summary.added, vec!["dev".to_string()]);
        assert_eq!(
            file.render(),
            "[profile dev]\n# profile-sync: registry=core profile=dev\nrole_arn = arn:aws:iam::111:role/dev\n\n"
        );
    }

    #[test]
    fn test_merge_is_idempotent() {
        let reg = registry("core", &[("dev", &[("region", "eu-west-1")]), ("prod", &[])]);
        let engine = SyncEngine::new(["core"]);
        let mut file = ConfigFile::parse("[default]\nregion = us-east-1\n\n");
        engine.merge(&mut file, &reg, true).unwrap();
        let once = file.render();
        let summary = engine.merge(&mut file, &reg, false).unwrap();
        assert_eq!(file.render(), once);
        assert!(summary.is_unchanged());
        assert!(summary.updated.is_empty());
    }

    #[test]
    fn test_collision_without_prefixing_fails_and_leaves_file() {
        let engine = SyncEngine::new(["a", "b"]);
        let mut file = ConfigFile::default();
        engine.merge(&mut file, &registry("a", &[("prod", &[])]), true).unwrap();
        let before = file.clone();

        let b = registry("b", &[("other", &[]), ("prod", &[])]);
        let err = engine.merge(&mut file, &b, false).unwrap_err();
        match err {
            RegistryError::ProfileNameCollision { profile, registry, owner } => {
                assert_eq!(profile, "prod");
                assert_eq!(registry, "b");
                assert_eq!(owner, "registry 'a'");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(file, before);
    }

    #[test]
    fn test_prefix_duplicate_profiles() {
        let engine = SyncEngine::new(["a", "b"]);
        let mut file = ConfigFile::default();
        engine.merge(&mut file, &registry("a", &[("prod", &[])]), true).unwrap();

        let mut b = registry("b", &[("prod", &[]), ("stage", &[])]);
        b.policy.prefix_duplicate_profiles = true;
        let summary = engine.merge(&mut file, &b, false).unwrap();
        assert_eq!(summary.added, vec!["b/prod".to_string(), "stage".to_string()]);
        let names: Vec<_> = file.blocks().iter().filter_map(|b| b.profile_name()).collect();
        assert_eq!(names, vec!["prod", "b/prod", "stage"]);
    }

    #[test]
    fn test_prefix_all_profiles() {
        let mut reg = registry("core", &[("dev", &[])]);
        reg.policy.prefix_all_profiles = true;
        let mut file = ConfigFile::default();
        SyncEngine::new(["core"]).merge(&mut file, &reg, true).unwrap();
        assert!(file.render().starts_with("[profile core/dev]\n# profile-sync: registry=core profile=dev\n"));
    }

    #[test]
    fn test_user_section_claims_name() {
        let mut file = ConfigFile::parse("[profile dev]\nregion = x\n");
        let reg = registry("core", &[("dev", &[])]);
        let err = SyncEngine::new(["core"]).merge(&mut file, &reg, false).unwrap_err();
        assert!(matches!(err, RegistryError::ProfileNameCollision { ref owner, .. } if owner == "your own config"));
    }

    #[test]
    fn test_update_keeps_position_and_appends_new_profiles() {
        let engine = SyncEngine::new(["core"]);
        let mut file = ConfigFile::parse("[profile mine]\nregion = x\n\n");
        engine
            .merge(&mut file, &registry("core", &[("a", &[]), ("b", &[]), ("c", &[])]), true)
            .unwrap();
        let mut text = file.render();
        text.push_str("[profile tail]\nregion = y\n");
        let mut file = ConfigFile::parse(&text);

        let updated = registry("core", &[("b", &[("region", "z")]), ("d", &[]), ("a", &[])]);
        let summary = engine.merge(&mut file, &updated, false).unwrap();
        assert_eq!(summary.added, vec!["d".to_string()]);
        assert_eq!(summary.updated, vec!["b".to_string()]);
        assert_eq!(summary.removed, vec!["c".to_string()]);
        let names: Vec<_> = file.blocks().iter().filter_map(|b| b.profile_name()).collect();
        assert_eq!(names, vec!["mine", "a", "b", "d", "tail"]);
    }

    #[test]
    fn test_new_registry_is_placed_by_priority() {
        let engine = SyncEngine::new(["high", "mid", "low"]);
        let mut file = ConfigFile::default();
        engine.merge(&mut file, &registry("low", &[("l", &[])]), true).unwrap();
        engine.merge(&mut file, &registry("high", &[("h", &[])]), false).unwrap();
        engine.merge(&mut file, &registry("mid", &[("m", &[])]), false).unwrap();
        let names: Vec<_> = file.blocks().iter().filter_map(|b| b.profile_name()).collect();
        assert_eq!(names, vec!["h", "m", "l"]);
    }

    #[test]
    fn test_reorder_keeps_user_sections_in_place() {
        let engine = SyncEngine::new(["low"]);
        let mut file = ConfigFile::default();
        engine.merge(&mut file, &registry("low", &[("l", &[])]), true).unwrap();
        let mut text = file.render();
        text.push_str("[profile mine]\nregion = x\n\n");
        let mut file = ConfigFile::parse(&text);
        SyncEngine::new(["high"]).merge(&mut file, &registry("high", &[("h", &[])]), false).unwrap();

        let engine = SyncEngine::new(["high", "low"]);
        engine.reorder(&mut file);
        let names: Vec<_> = file.blocks().iter().filter_map(|b| b.profile_name()).collect();
        assert_eq!(names, vec!["h", "mine", "l"]);
    }

    #[test]
    fn test_placeholders_are_substituted() {
        let mut reg = registry(
            "core",
            &[("dev", &[("sso_start_url", "{{ .StartURL }}"), ("sso_region", "{{region}}")])],
        );
        reg.policy.required_keys.insert("StartURL".into());
        reg.variables.insert("region".into(), "eu-west-1".into());
        let engine = SyncEngine::new(["core"]);
        let mut file = ConfigFile::default();

        let err = engine.merge(&mut file, &reg, true).unwrap_err();
        assert!(matches!(err, RegistryError::MissingValue { ref key, .. } if key == "StartURL"));
        assert!(file.is_empty());

        reg.values.insert("StartURL".into(), "https://corp.awsapps.com/start".into());
        engine.merge(&mut file, &reg, true).unwrap();
        let text = file.render();
        assert!(text.contains("sso_start_url = https://corp.awsapps.com/start\n"));
        assert!(text.contains("sso_region = eu-west-1\n"));
    }

    #[test]
    fn test_unknown_placeholder_is_missing_value() {
        let reg = registry("core", &[("dev", &[("region", "{{ Nope }}")])]);
        let err = SyncEngine::new(["core"])
            .merge(&mut ConfigFile::default(), &reg, true)
            .unwrap_err();
        assert!(matches!(err, RegistryError::MissingValue { ref key, .. } if key == "Nope"));
    }

    #[test]
    fn test_remove_drops_owned_sections() {
        let engine = SyncEngine::new(["core"]);
        let mut file = ConfigFile::parse("[default]\nregion = x\n\n");
        engine.merge(&mut file, &registry("core", &[("a", &[]), ("b", &[])]), true).unwrap();
        assert_eq!(SyncEngine::remove(&mut file, "core"), 2);
        assert_eq!(file.render(), "[default]\nregion = x\n\n");
    }

    fn prefix_duplicates(mut reg: Registry) -> Registry {
        reg.policy.prefix_duplicate_profiles = true;
        reg
    }

    fn names(file: &ConfigFile) -> Vec<&str> {
        file.blocks().iter().filter_map(|b| b.profile_name()).collect()
    }

    #[test]
    fn test_higher_rank_takes_name_from_lower_rank() {
        let engine = SyncEngine::new(["ten", "five"]);
        let five = prefix_duplicates(registry("five", &[("prod", &[("region", "us-east-1")])]));
        let ten = prefix_duplicates(registry("ten", &[("prod", &[("region", "eu-west-1")])]));
        let mut file = ConfigFile::default();
        engine.merge(&mut file, &five, true).unwrap();

        let summary = engine.merge(&mut file, &ten, false).unwrap();
        assert_eq!(summary.added, vec!["prod".to_string()]);
        assert_eq!(names(&file), vec!["prod", "five/prod"]);
        assert!(file.blocks()[0].is_owned_by("ten"));
        assert!(file.blocks()[1].is_owned_by("five"));

        let before = file.clone();
        assert!(engine.merge(&mut file, &five, false).unwrap().is_unchanged());
        assert_eq!(file, before);
    }

    #[test]
    fn test_lower_rank_gets_prefixed_name() {
        let engine = SyncEngine::new(["ten", "five"]);
        let mut file = ConfigFile::default();
        engine
            .merge(&mut file, &prefix_duplicates(registry("ten", &[("prod", &[])])), true)
            .unwrap();
        let summary = engine
            .merge(&mut file, &prefix_duplicates(registry("five", &[("prod", &[])])), false)
            .unwrap();
        assert_eq!(summary.added, vec!["five/prod".to_string()]);
        assert_eq!(names(&file), vec!["prod", "five/prod"]);
    }

    #[test]
    fn test_prefixed_name_claimed_by_user_section() {
        let engine = SyncEngine::new(["a", "b"]);
        let mut file = ConfigFile::parse("[profile b/prod]\nregion = x\n\n");
        engine.merge(&mut file, &registry("a", &[("prod", &[])]), true).unwrap();
        let before = file.clone();

        let err = engine
            .merge(&mut file, &prefix_duplicates(registry("b", &[("prod", &[])])), false)
            .unwrap_err();
        match err {
            RegistryError::ProfileNameCollision { profile, owner, .. } => {
                assert_eq!(profile, "b/prod");
                assert_eq!(owner, "your own config");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(file, before);
    }

    #[test]
    fn test_two_profiles_resolving_to_one_name() {
        let engine = SyncEngine::new(["a", "b"]);
        let mut file = ConfigFile::default();
        engine.merge(&mut file, &registry("a", &[("prod", &[])]), true).unwrap();

        let b = prefix_duplicates(registry("b", &[("prod", &[]), ("b/prod", &[])]));
        let err = engine.merge(&mut file, &b, false).unwrap_err();
        assert!(matches!(
            err,
            RegistryError::ProfileNameCollision { ref profile, ref owner, .. }
                if profile == "b/prod" && owner == "registry 'b'"
        ));
    }

    #[test]
    fn test_displaced_section_needs_a_free_prefixed_name() {
        let engine = SyncEngine::new(["ten", "five"]);
        let mut file = ConfigFile::parse("[profile five/prod]\nregion = x\n\n");
        engine.merge(&mut file, &registry("five", &[("prod", &[])]), true).unwrap();
        let before = file.clone();

        let err = engine.merge(&mut file, &registry("ten", &[("prod", &[])]), false).unwrap_err();
        assert!(matches!(err, RegistryError::ProfileNameCollision { ref profile, .. } if profile == "five/prod"));
        assert_eq!(file, before);
    }
}

