use std::sync::{Arc, Mutex};

use chrono::Utc;
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, info};

use locus_types::{ProviderId, ProviderRecord};

use crate::error::{ClusterError, ClusterResult};

/// The set of providers known to a gateway.
///
/// Every read and update happens under a single `Mutex`, so no caller ever
/// sees a half-applied change.
#[derive(Debug, Default)]
pub struct ProviderRegistry {
    providers: Mutex<Vec<ProviderRecord>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with one fresh record per address. Duplicate addresses are
    /// registered once.
    pub fn from_addresses<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let registry = Self::new();
        for address in addresses {
            registry.add(address);
        }
        registry
    }

    /// Register a provider, returning its id. An already registered address
    /// keeps its existing id.
    pub fn add(&self, address: impl Into<String>) -> ProviderId {
        let address = address.into();
        let mut providers = self.providers.lock().expect("registry lock poisoned");
        if let Some(existing) = providers.iter().find(|p| p.address == address) {
            return existing.id;
        }
        let record = ProviderRecord::new(address);
        let id = record.id;
        info!(provider = %id.short_id(), address = %record.address, "provider registered");
        providers.push(record);
        id
    }

    pub fn remove(&self, id: &ProviderId) -> Option<ProviderRecord> {
        let mut providers = self.providers.lock().expect("registry lock poisoned");
        let index = providers.iter().position(|p| &p.id == id)?;
        let removed = providers.remove(index);
        info!(provider = %id.short_id(), address = %removed.address, "provider removed");
        Some(removed)
    }

    /// Record a completed exchange with the provider at `address`.
    pub fn mark_seen(&self, address: &str) {
        let mut providers = self.providers.lock().expect("registry lock poisoned");
        if let Some(p) = providers.iter_mut().find(|p| p.address == address) {
            p.last_seen = Some(Utc::now());
        }
    }

    pub fn get(&self, id: &ProviderId) -> Option<ProviderRecord> {
        let providers = self.providers.lock().expect("registry lock poisoned");
        providers.iter().find(|p| &p.id == id).cloned()
    }

    pub fn snapshot(&self) -> Vec<ProviderRecord> {
        self.providers.lock().expect("registry lock poisoned").clone()
    }

    pub fn len(&self) -> usize {
        self.providers.lock().expect("registry lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn choose<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<ProviderRecord> {
        let providers = self.providers.lock().expect("registry lock poisoned");
        providers.choose(rng).cloned()
    }
}

/// Picks the provider that receives a new object.
///
/// Uniformly random over the registered providers: no load awareness, no
/// health checks, and no second choice if the chosen provider then fails.
#[derive(Clone, Debug)]
pub struct PlacementSelector {
    registry: Arc<ProviderRegistry>,
}

impl PlacementSelector {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub fn select(&self) -> ClusterResult<ProviderRecord> {
        self.select_with(&mut rand::thread_rng())
    }

    pub fn select_with<R: Rng + ?Sized>(&self, rng: &mut R) -> ClusterResult<ProviderRecord> {
        let chosen = self.registry.choose(rng).ok_or(ClusterError::NoProviderAvailable)?;
        debug!(provider = %chosen.id.short_id(), address = %chosen.address, "provider selected");
        Ok(chosen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::thread;

    #[test]
    fn empty_registry_has_no_provider() {
        let selector = PlacementSelector::new(Arc::new(ProviderRegistry::new()));
        assert!(matches!(selector.select(), Err(ClusterError::NoProviderAvailable)));
    }

    #[test]
    fn single_provider_is_always_chosen() {
        let registry = Arc::new(ProviderRegistry::from_addresses(["a:1"]));
        let selector = PlacementSelector::new(registry);
        for _ in 0..20 {
            assert_eq!(selector.select().unwrap().address, "a:1");
        }
    }

    #[test]
    fn selection_is_roughly_uniform() {
        const N: usize = 20_000;
        let addresses = ["a:1", "b:1", "c:1", "d:1"];
        let selector = PlacementSelector::new(Arc::new(ProviderRegistry::from_addresses(addresses)));

        let mut counts: HashMap<String, usize> = HashMap::new();
        for _ in 0..N {
            *counts.entry(selector.select().unwrap().address).or_default() += 1;
        }

        let expected = N / addresses.len();
        assert_eq!(counts.len(), addresses.len());
        for (address, count) in counts {
            let deviation = count.abs_diff(expected) as f64 / expected as f64;
            assert!(deviation < 0.1, "{address} chosen {count} times, expected ~{expected}");
        }
    }

    #[test]
    fn duplicate_addresses_register_once() {
        let registry = ProviderRegistry::from_addresses(["a:1", "a:1", "b:1"]);
        assert_eq!(registry.len(), 2);
        let id = registry.add("a:1");
        assert_eq!(registry.get(&id).unwrap().address, "a:1");
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn remove_and_mark_seen() {
        let registry = ProviderRegistry::new();
        let a = registry.add("a:1");
        registry.add("b:1");

        registry.mark_seen("b:1");
        let snapshot = registry.snapshot();
        assert!(snapshot.iter().find(|p| p.address == "b:1").unwrap().last_seen.is_some());
        assert!(snapshot.iter().find(|p| p.address == "a:1").unwrap().last_seen.is_none());

        assert_eq!(registry.remove(&a).unwrap().address, "a:1");
        assert!(registry.remove(&a).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn concurrent_selection_during_membership_changes() {
        let registry = Arc::new(ProviderRegistry::from_addresses(["base:1"]));
        let selector = PlacementSelector::new(registry.clone());

        let writer = {
            let registry = registry.clone();
            thread::spawn(move || {
                for i in 0..200 {
                    let id = registry.add(format!("p{i}:1"));
                    registry.remove(&id);
                }
            })
        };
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let selector = selector.clone();
                thread::spawn(move || {
                    for _ in 0..500 {
                        let chosen = selector.select().expect("base provider is never removed");
                        assert!(!chosen.address.is_empty());
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for r in readers {
            r.join().unwrap();
        }
        assert_eq!(registry.len(), 1);
    }
}
