//! Layered property store
//!
//! A *provider* is a flat name→value map owned by one component (a material,
//! a geometry, an effect, a light manager, a renderer pass). A *container* is
//! an ordered stack of providers: looking a name up walks the stack from the
//! first layered provider to the last and the first provider defining the
//! name wins. Later providers that define the same name stay shadowed until
//! the earlier one is removed or unsets it.
//!
//! Every mutation compares the resolved `(provider, value)` of each affected
//! `(container, name)` before and after, and queues one container-level
//! [`PropertyEvent`] per observable difference:
//!
//! | before | after | event |
//! |---|---|---|
//! | unresolved | resolved | `Added` |
//! | resolved | unresolved | `Removed` |
//! | resolved | resolved elsewhere or to another value | `ReferenceChanged` |
//!
//! The store never calls out. Events sit in the queue until the owner drains
//! them with [`PropertyStore::pop_event`], which is what keeps observers from
//! re-entering the store mid-mutation.

use std::collections::BTreeMap;

use void_core::{Handle, HandleMap};
use void_event::EventQueue;

use crate::signal::{PropertyChange, PropertyEvent};
use crate::value::Value;
use crate::{DataError, Result};

/// Handle to a provider in a [`PropertyStore`]
pub type ProviderHandle = Handle<Provider>;

/// Handle to a container in a [`PropertyStore`]
pub type ContainerHandle = Handle<Container>;

/// A flat set of named values contributed by one owner
#[derive(Debug)]
pub struct Provider {
    name: String,
    values: BTreeMap<String, Value>,
    containers: Vec<ContainerHandle>,
}

impl Provider {
    /// Debug name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get a value defined by this provider
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Property names defined by this provider, sorted
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Containers this provider is layered into
    pub fn containers(&self) -> &[ContainerHandle] {
        &self.containers
    }
}

/// An ordered stack of providers
#[derive(Debug)]
pub struct Container {
    name: String,
    providers: Vec<ProviderHandle>,
}

impl Container {
    /// Debug name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Layered providers, in lookup order
    pub fn providers(&self) -> &[ProviderHandle] {
        &self.providers
    }
}

type Resolved = Option<(ProviderHandle, Value)>;

/// Arena of providers and containers plus the pending change events
#[derive(Debug, Default)]
pub struct PropertyStore {
    providers: HandleMap<Provider>,
    containers: HandleMap<Container>,
    events: EventQueue<PropertyEvent>,
}

impl PropertyStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    // ----------------------------------------------------------------------
    // Providers
    // ----------------------------------------------------------------------

    /// Create an empty provider
    pub fn create_provider(&mut self, name: impl Into<String>) -> ProviderHandle {
        self.providers.insert(Provider {
            name: name.into(),
            values: BTreeMap::new(),
            containers: Vec::new(),
        })
    }

    /// Unlayer a provider from every container and destroy it
    pub fn destroy_provider(&mut self, provider: ProviderHandle) -> Result<()> {
        let containers = self.provider(provider)?.containers.clone();
        for container in containers {
            self.remove_provider(container, provider)?;
        }
        self.providers.remove(provider);
        Ok(())
    }

    /// Get a provider
    pub fn provider(&self, provider: ProviderHandle) -> Result<&Provider> {
        self.providers
            .get(provider)
            .ok_or(DataError::ProviderNotFound(provider))
    }

    /// Set a value on a provider
    pub fn set(
        &mut self,
        provider: ProviderHandle,
        name: &str,
        value: impl Into<Value>,
    ) -> Result<()> {
        let value = value.into();
        let entry = self
            .providers
            .get(provider)
            .ok_or(DataError::ProviderNotFound(provider))?;

        if entry.values.get(name) == Some(&value) {
            return Ok(());
        }

        let containers = entry.containers.clone();
        let names = [name.to_string()];
        let before = self.snapshot(&containers, &names);

        if let Some(entry) = self.providers.get_mut(provider) {
            entry.values.insert(name.to_string(), value);
        }

        self.emit_differences(&containers, &names, before);
        Ok(())
    }

    /// Remove a value from a provider, returning it
    pub fn unset(&mut self, provider: ProviderHandle, name: &str) -> Result<Option<Value>> {
        let entry = self
            .providers
            .get(provider)
            .ok_or(DataError::ProviderNotFound(provider))?;

        if !entry.values.contains_key(name) {
            return Ok(None);
        }

        let containers = entry.containers.clone();
        let names = [name.to_string()];
        let before = self.snapshot(&containers, &names);

        let removed = self
            .providers
            .get_mut(provider)
            .and_then(|entry| entry.values.remove(name));

        self.emit_differences(&containers, &names, before);
        Ok(removed)
    }

    /// Get a value directly from a provider
    pub fn provider_value(&self, provider: ProviderHandle, name: &str) -> Option<&Value> {
        self.providers.get(provider)?.get(name)
    }

    /// Number of live providers
    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    // ----------------------------------------------------------------------
    // Containers
    // ----------------------------------------------------------------------

    /// Create an empty container
    pub fn create_container(&mut self, name: impl Into<String>) -> ContainerHandle {
        self.containers.insert(Container {
            name: name.into(),
            providers: Vec::new(),
        })
    }

    /// Destroy a container
    ///
    /// No events are emitted: whoever destroys a container is expected to
    /// have torn down the observers of that container first.
    pub fn destroy_container(&mut self, container: ContainerHandle) -> Result<()> {
        let entry = self
            .containers
            .remove(container)
            .ok_or(DataError::ContainerNotFound(container))?;

        for provider in entry.providers {
            if let Some(provider) = self.providers.get_mut(provider) {
                provider.containers.retain(|c| *c != container);
            }
        }
        Ok(())
    }

    /// Get a container
    pub fn container(&self, container: ContainerHandle) -> Result<&Container> {
        self.containers
            .get(container)
            .ok_or(DataError::ContainerNotFound(container))
    }

    /// Layer a provider on top of a container's stack
    pub fn add_provider(&mut self, container: ContainerHandle, provider: ProviderHandle) -> Result<()> {
        let entry = self.container(container)?;
        if entry.providers.contains(&provider) {
            return Err(DataError::AlreadyLayered { provider, container });
        }

        let names = self.provider_names(provider)?;
        let before = self.snapshot(&[container], &names);

        if let Some(entry) = self.containers.get_mut(container) {
            entry.providers.push(provider);
        }
        if let Some(entry) = self.providers.get_mut(provider) {
            entry.containers.push(container);
        }

        self.emit_differences(&[container], &names, before);
        Ok(())
    }

    /// Remove a provider from a container's stack
    pub fn remove_provider(&mut self, container: ContainerHandle, provider: ProviderHandle) -> Result<()> {
        let entry = self.container(container)?;
        if !entry.providers.contains(&provider) {
            return Err(DataError::NotLayered { provider, container });
        }

        let names = self.provider_names(provider)?;
        let before = self.snapshot(&[container], &names);

        if let Some(entry) = self.containers.get_mut(container) {
            entry.providers.retain(|p| *p != provider);
        }
        if let Some(entry) = self.providers.get_mut(provider) {
            entry.containers.retain(|c| *c != container);
        }

        self.emit_differences(&[container], &names, before);
        Ok(())
    }

    /// Check if a provider is layered into a container
    pub fn is_layered(&self, container: ContainerHandle, provider: ProviderHandle) -> bool {
        self.containers
            .get(container)
            .is_some_and(|entry| entry.providers.contains(&provider))
    }

    /// Resolve a name in a container
    pub fn get(&self, container: ContainerHandle, name: &str) -> Option<&Value> {
        let entry = self.containers.get(container)?;
        entry
            .providers
            .iter()
            .find_map(|p| self.providers.get(*p).and_then(|p| p.get(name)))
    }

    /// Check if a name resolves in a container
    pub fn has(&self, container: ContainerHandle, name: &str) -> bool {
        self.get(container, name).is_some()
    }

    /// Provider a name currently resolves to in a container
    pub fn resolve_owner(&self, container: ContainerHandle, name: &str) -> Option<ProviderHandle> {
        let entry = self.containers.get(container)?;
        entry.providers.iter().copied().find(|p| {
            self.providers
                .get(*p)
                .is_some_and(|p| p.values.contains_key(name))
        })
    }

    /// Number of live containers
    pub fn container_count(&self) -> usize {
        self.containers.len()
    }

    // ----------------------------------------------------------------------
    // Events
    // ----------------------------------------------------------------------

    /// Take the oldest pending event
    pub fn pop_event(&mut self) -> Option<PropertyEvent> {
        self.events.receive()
    }

    /// Number of pending events
    pub fn pending_events(&self) -> usize {
        self.events.len()
    }

    /// Take every pending event
    pub fn drain_events(&mut self) -> Vec<PropertyEvent> {
        self.events.drain()
    }

    fn provider_names(&self, provider: ProviderHandle) -> Result<Vec<String>> {
        Ok(self.provider(provider)?.values.keys().cloned().collect())
    }

    fn resolved(&self, container: ContainerHandle, name: &str) -> Resolved {
        let owner = self.resolve_owner(container, name)?;
        let value = self.providers.get(owner)?.get(name)?.clone();
        Some((owner, value))
    }

    fn snapshot(&self, containers: &[ContainerHandle], names: &[String]) -> Vec<Resolved> {
        containers
            .iter()
            .flat_map(|c| names.iter().map(move |n| (*c, n)))
            .map(|(c, n)| self.resolved(c, n))
            .collect()
    }

    fn emit_differences(&mut self, containers: &[ContainerHandle], names: &[String], before: Vec<Resolved>) {
        let after = self.snapshot(containers, names);
        let pairs = containers
            .iter()
            .flat_map(|c| names.iter().map(move |n| (*c, n)));

        for ((container, name), (old, new)) in pairs.zip(before.into_iter().zip(after)) {
            let change = match (old, new) {
                (None, Some(_)) => PropertyChange::Added,
                (Some(_), None) => PropertyChange::Removed,
                (Some(old), Some(new)) if old != new => PropertyChange::ReferenceChanged,
                _ => continue,
            };

            log::trace!("property '{}' {:?} in {:?}", name, change, container);
            self.events.send(PropertyEvent {
                container,
                name: name.clone(),
                change,
            });
        }
    }
}
