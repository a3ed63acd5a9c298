use crate::error::{RegistryError, Result};
use crate::registry::Registry;
use crate::settings::Settings;

/// All subscribed registries, in the order they were added.
#[derive(Debug, Default)]
pub struct RegistryStore {
    registries: Vec<Registry>,
}

impl RegistryStore {
    pub fn new() -> RegistryStore {
        RegistryStore::default()
    }

    /// Builds the store from persisted settings.
    ///
    /// # Errors
    /// Fails on invalid or duplicated registry names in the settings file.
    pub fn from_settings(settings: &Settings) -> Result<RegistryStore> {
        let mut store = RegistryStore::new();
        for record in &settings.registries {
            store.add(Registry::from_record(record.clone())?)?;
        }
        Ok(store)
    }

    /// The persisted form of the store. Profiles are not included.
    pub fn to_settings(&self) -> Settings {
        Settings {
            registries: self.registries.iter().map(Registry::to_record).collect(),
        }
    }

    /// Adds a registry.
    ///
    /// # Errors
    /// Returns [`RegistryError::DuplicateName`] if the name is already taken.
    pub fn add(&mut self, registry: Registry) -> Result<()> {
        if self.contains(&registry.name) {
            return Err(RegistryError::DuplicateName(registry.name));
        }
        self.registries.push(registry);
        Ok(())
    }

    /// Registries by descending priority; equal priorities keep insertion order.
    pub fn list(&self) -> Vec<&Registry> {
        let mut list: Vec<&Registry> = self.registries.iter().collect();
        list.sort_by_key(|r| std::cmp::Reverse(r.policy.priority));
        list
    }

    /// Registry names in the order of [`RegistryStore::list`].
    pub fn names(&self) -> Vec<String> {
        self.list().into_iter().map(|r| r.name.clone()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.registries.iter().any(|r| r.name == name)
    }

    pub fn get(&self, name: &str) -> Option<&Registry> {
        self.registries.iter().find(|r| r.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Registry> {
        self.registries.iter_mut().find(|r| r.name == name)
    }

    /// Removes and returns a registry.
    ///
    /// # Errors
    /// Returns [`RegistryError::RegistryNotFound`] for unknown names.
    pub fn remove(&mut self, name: &str) -> Result<Registry> {
        let index = self
            .registries
            .iter()
            .position(|r| r.name == name)
            .ok_or_else(|| RegistryError::RegistryNotFound(name.to_string()))?;
        Ok(self.registries.remove(index))
    }

    pub fn len(&self) -> usize {
        self.registries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registries.is_empty()
    }
}
