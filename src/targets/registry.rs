//! Target registry.
//!
//! # Responsibilities
//! - Own the set of known targets
//! - Serve immutable snapshots to concurrent readers without locking
//! - Swap the whole set atomically on reload and report invalidated ids
//!
//! # Design Decisions
//! - Readers hold `Arc<Target>`; a reload never invalidates a snapshot a
//!   reader already obtained
//! - A single malformed target is skipped with a log line, the rest load
//! - Invalidation is computed here (content hash diff) but acted on by the
//!   client pool, which owns all transport state

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::config::schema::TargetConfig;
use crate::targets::target::Target;

type TargetMap = HashMap<String, Arc<Target>>;

/// Registry of Redfish targets with lock-free reads and atomic reload.
pub struct TargetRegistry {
    map: ArcSwap<TargetMap>,
}

impl TargetRegistry {
    /// Build a registry from target configurations. Targets that fail to
    /// construct (unreadable TLS material) are skipped, not fatal.
    pub fn from_config(configs: &[TargetConfig]) -> Self {
        let registry = Self {
            map: ArcSwap::from_pointee(TargetMap::new()),
        };
        registry.reload(Self::build_targets(configs));
        registry
    }

    /// Construct Target records from configuration, skipping bad entries.
    pub fn build_targets(configs: &[TargetConfig]) -> Vec<Target> {
        let mut targets = Vec::with_capacity(configs.len());
        for cfg in configs {
            match Target::from_config(cfg) {
                Ok(target) => targets.push(target),
                Err(e) => {
                    tracing::error!(target_id = %cfg.id, error = %e, "Skipping malformed target");
                }
            }
        }
        targets
    }

    /// Look up a target by id. Returns an immutable snapshot.
    pub fn lookup(&self, id: &str) -> Option<Arc<Target>> {
        self.map.load().get(id).cloned()
    }

    /// List all targets, ordered by id. Used by the admin surface.
    pub fn list(&self) -> Vec<Arc<Target>> {
        let map = self.map.load();
        let mut targets: Vec<Arc<Target>> = map.values().cloned().collect();
        targets.sort_by(|a, b| a.id.cmp(&b.id));
        targets
    }

    /// Number of registered targets.
    pub fn len(&self) -> usize {
        self.map.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.load().is_empty()
    }

    /// Atomically replace the whole target set.
    ///
    /// Returns the ids whose content changed or that disappeared; the caller
    /// drops the matching client pool entries. Concurrent readers see either
    /// the entire old set or the entire new set.
    pub fn reload(&self, targets: Vec<Target>) -> Vec<String> {
        let mut new_map = TargetMap::with_capacity(targets.len());
        for target in targets {
            new_map.insert(target.id.clone(), Arc::new(target));
        }

        let old_map = self.map.swap(Arc::new(new_map));
        let new_map = self.map.load();

        let mut invalidated = Vec::new();
        for (id, old) in old_map.iter() {
            match new_map.get(id) {
                Some(new) if new.content_hash() == old.content_hash() => {}
                _ => invalidated.push(id.clone()),
            }
        }
        invalidated.sort();
        invalidated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{
        CredentialsConfig, TargetTimeoutConfig, TargetTlsConfig, UpstreamScheme,
    };

    fn config(id: &str, address: &str) -> TargetConfig {
        TargetConfig {
            id: id.into(),
            address: address.into(),
            scheme: UpstreamScheme::Https,
            enabled: true,
            credentials: CredentialsConfig::Basic {
                username: "root".into(),
                secret: "calvin".into(),
            },
            tls: TargetTlsConfig::default(),
            timeouts: TargetTimeoutConfig::default(),
        }
    }

    #[test]
    fn test_lookup_and_list() {
        let registry =
            TargetRegistry::from_config(&[config("bmc-2", "10.0.0.2"), config("bmc-1", "10.0.0.1")]);

        assert_eq!(registry.len(), 2);
        assert!(registry.lookup("bmc-1").is_some());
        assert!(registry.lookup("bmc-3").is_none());

        let listed = registry.list();
        let ids: Vec<&str> = listed.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["bmc-1", "bmc-2"]);
    }

    #[test]
    fn test_reload_reports_changed_and_removed() {
        let registry =
            TargetRegistry::from_config(&[config("bmc-1", "10.0.0.1"), config("bmc-2", "10.0.0.2")]);

        // bmc-1 unchanged, bmc-2 re-addressed, bmc-3 added, nothing removed
        let new = TargetRegistry::build_targets(&[
            config("bmc-1", "10.0.0.1"),
            config("bmc-2", "10.9.9.9"),
            config("bmc-3", "10.0.0.3"),
        ]);
        let invalidated = registry.reload(new);
        assert_eq!(invalidated, vec!["bmc-2".to_string()]);
        assert_eq!(registry.len(), 3);

        // removing a target invalidates it
        let new = TargetRegistry::build_targets(&[config("bmc-1", "10.0.0.1")]);
        let invalidated = registry.reload(new);
        assert_eq!(
            invalidated,
            vec!["bmc-2".to_string(), "bmc-3".to_string()]
        );
        assert!(registry.lookup("bmc-3").is_none());
    }

    #[test]
    fn test_snapshots_survive_reload() {
        let registry = TargetRegistry::from_config(&[config("bmc-1", "10.0.0.1")]);
        let snapshot = registry.lookup("bmc-1").unwrap();

        registry.reload(TargetRegistry::build_targets(&[config("bmc-1", "10.9.9.9")]));

        // The old snapshot still reads consistently.
        assert_eq!(snapshot.address, "10.0.0.1");
        assert_eq!(registry.lookup("bmc-1").unwrap().address, "10.9.9.9");
    }

    #[test]
    fn test_reload_is_atomic_under_concurrent_readers() {
        let registry = Arc::new(TargetRegistry::from_config(&[
            config("bmc-1", "10.0.0.1"),
            config("bmc-2", "10.0.0.1"),
        ]));

        // Both generations keep the pair's addresses equal, so any single
        // snapshot must observe one generation, never a mixture.
        let reader = {
            let registry = registry.clone();
            std::thread::spawn(move || {
                for _ in 0..10_000 {
                    let snapshot = registry.list();
                    assert_eq!(snapshot.len(), 2);
                    assert_eq!(snapshot[0].address, snapshot[1].address);
                }
            })
        };

        for i in 0..100 {
            let address = format!("10.0.1.{}", i % 250);
            registry.reload(TargetRegistry::build_targets(&[
                config("bmc-1", &address),
                config("bmc-2", &address),
            ]));
        }
        reader.join().unwrap();
    }
}
