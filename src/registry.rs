//! Source registry.
//!
//! Holds every configured source with its buckets and client, plus the
//! mutable enablement state. No query logic lives here.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::store::TimeSeriesClient;

/// A configured source store and the buckets collected from it.
pub struct Source {
    /// Unique source name.
    pub name: String,
    /// Buckets in configured order; empty names are skipped at collection time.
    pub buckets: Vec<String>,
    /// Canonical host label for every point from this source.
    pub host_alias: Option<String>,
    client: Arc<dyn TimeSeriesClient>,
}

impl Source {
    pub fn new(name: impl Into<String>, client: Arc<dyn TimeSeriesClient>) -> Self {
        Self {
            name: name.into(),
            buckets: Vec::new(),
            host_alias: None,
            client,
        }
    }

    pub fn with_buckets<I, S>(mut self, buckets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.buckets = buckets.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_host_alias(mut self, alias: impl Into<String>) -> Self {
        self.host_alias = Some(alias.into());
        self
    }

    /// Read client for this source.
    pub fn client(&self) -> &dyn TimeSeriesClient {
        self.client.as_ref()
    }

    /// Buckets with a non-empty name.
    pub fn active_buckets(&self) -> impl Iterator<Item = &str> {
        self.buckets
            .iter()
            .map(String::as_str)
            .filter(|b| !b.is_empty())
    }
}

impl std::fmt::Debug for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Source")
            .field("name", &self.name)
            .field("endpoint", &self.client.endpoint())
            .field("buckets", &self.buckets)
            .field("host_alias", &self.host_alias)
            .finish()
    }
}

/// Mutable per-source state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceState {
    pub enabled: bool,
    pub last_success: Option<DateTime<Utc>>,
}

impl Default for SourceState {
    fn default() -> Self {
        Self {
            enabled: true,
            last_success: None,
        }
    }
}

/// Registry of all configured sources.
///
/// Sources are fixed at construction; only their [`SourceState`] changes.
pub struct SourceRegistry {
    sources: Vec<Arc<Source>>,
    states: RwLock<HashMap<String, SourceState>>,
}

impl SourceRegistry {
    /// Create a registry with every source enabled.
    ///
    /// Later sources with a duplicate name are dropped.
    pub fn new(sources: Vec<Source>) -> Self {
        let mut states = HashMap::new();
        let mut kept = Vec::with_capacity(sources.len());
        for source in sources {
            if states.contains_key(&source.name) {
                tracing::warn!(source = %source.name, "Duplicate source name, ignoring");
                continue;
            }
            states.insert(source.name.clone(), SourceState::default());
            kept.push(Arc::new(source));
        }

        Self {
            sources: kept,
            states: RwLock::new(states),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, SourceState>> {
        self.states.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, SourceState>> {
        self.states.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every registered source, in configured order.
    pub fn sources(&self) -> &[Arc<Source>] {
        &self.sources
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Source>> {
        self.sources.iter().find(|s| s.name == name)
    }

    /// Sources currently enabled, in configured order.
    pub fn enabled_sources(&self) -> Vec<Arc<Source>> {
        let states = self.read();
        self.sources
            .iter()
            .filter(|s| states.get(&s.name).is_some_and(|st| st.enabled))
            .cloned()
            .collect()
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.read().get(name).is_some_and(|s| s.enabled)
    }

    /// Set a source's enabled flag. Returns `true` if the flag changed.
    pub fn set_enabled(&self, name: &str, enabled: bool) -> bool {
        match self.write().get_mut(name) {
            Some(state) if state.enabled != enabled => {
                state.enabled = enabled;
                true
            }
            _ => false,
        }
    }

    pub fn record_success(&self, name: &str, at: DateTime<Utc>) {
        if let Some(state) = self.write().get_mut(name) {
            state.last_success = Some(at);
        }
    }

    pub fn state(&self, name: &str) -> Option<SourceState> {
        self.read().get(name).cloned()
    }

    /// Consistent copy of every source with its state.
    pub fn snapshot(&self) -> Vec<(Arc<Source>, SourceState)> {
        let states = self.read();
        self.sources
            .iter()
            .map(|s| {
                let state = states.get(&s.name).cloned().unwrap_or_default();
                (Arc::clone(s), state)
            })
            .collect()
    }

    pub fn any_disabled(&self) -> bool {
        self.read().values().any(|s| !s.enabled)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl std::fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceRegistry")
            .field("sources", &self.sources)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn source(name: &str) -> Source {
        Source::new(name, Arc::new(MemoryStore::new(name)))
    }

    #[test]
    fn test_registry_starts_enabled() {
        let registry = SourceRegistry::new(vec![source("a"), source("b")]);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.enabled_sources().len(), 2);
        assert!(!registry.any_disabled());
        assert_eq!(registry.state("a").unwrap().last_success, None);
    }

    #[test]
    fn test_set_enabled_reports_changes() {
        let registry = SourceRegistry::new(vec![source("a"), source("b")]);

        assert!(registry.set_enabled("a", false));
        assert!(!registry.set_enabled("a", false));
        assert!(!registry.is_enabled("a"));
        assert!(registry.any_disabled());

        let enabled: Vec<_> = registry
            .enabled_sources()
            .iter()
            .map(|s| s.name.clone())
            .collect();
        assert_eq!(enabled, vec!["b"]);

        assert!(registry.set_enabled("a", true));
        assert!(!registry.any_disabled());
        assert!(!registry.set_enabled("missing", false));
    }

    #[test]
    fn test_record_success() {
        let registry = SourceRegistry::new(vec![source("a")]);
        let now = Utc::now();
        registry.record_success("a", now);
        assert_eq!(registry.state("a").unwrap().last_success, Some(now));
    }

    #[test]
    fn test_duplicate_names_dropped() {
        let registry = SourceRegistry::new(vec![source("a"), source("a")]);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_active_buckets_skip_empty() {
        let s = source("a").with_buckets(["pods", "", "power"]);
        assert_eq!(s.active_buckets().collect::<Vec<_>>(), vec!["pods", "power"]);
    }
}
