//! Composition root: one engine per configured collection kind.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::engine::{LoadOutcome, SyncEngine};
use crate::error::{Error, Result};
use crate::notify::EventBus;
use crate::remote::RemoteStore;
use crate::state::LifecycleSignal;
use crate::storage::LocalPersistentStore;

/// Engines sharing one remote store, one local store and one event bus.
pub struct EngineRegistry {
    engines: BTreeMap<String, SyncEngine>,
    order: Vec<String>,
    bus: EventBus,
}

impl EngineRegistry {
    /// Build every engine up front. Invalid or duplicate configs fail here
    /// rather than at the first lookup.
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        local: Arc<dyn LocalPersistentStore>,
        bus: EventBus,
        configs: impl IntoIterator<Item = EngineConfig>,
    ) -> Result<Self> {
        let mut engines = BTreeMap::new();
        let mut order = Vec::new();
        for config in configs {
            let kind = config.kind.clone();
            if engines.contains_key(&kind) {
                return Err(Error::Config(format!("collection '{kind}' is configured twice")));
            }
            let engine = SyncEngine::new(config, remote.clone(), local.clone(), bus.clone())?;
            engines.insert(kind.clone(), engine);
            order.push(kind);
        }
        tracing::debug!(collections = order.len(), "Engine registry built");
        Ok(Self { engines, order, bus })
    }

    /// The engine for `kind`, or [`Error::UnknownCollection`].
    pub fn require(&self, kind: &str) -> Result<&SyncEngine> {
        self.engines
            .get(kind)
            .ok_or_else(|| Error::UnknownCollection(kind.to_string()))
    }

    pub fn get(&self, kind: &str) -> Option<&SyncEngine> {
        self.engines.get(kind)
    }

    /// Kinds in configuration order.
    pub fn kinds(&self) -> &[String] {
        &self.order
    }

    /// Engines in configuration order.
    pub fn engines(&self) -> impl Iterator<Item = &SyncEngine> {
        self.order.iter().filter_map(|kind| self.engines.get(kind))
    }

    pub const fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Initialize every engine in configuration order.
    ///
    /// Engines that were already initialized are reported with `None`.
    pub async fn init_all(&self) -> Vec<(String, Option<LoadOutcome>)> {
        let mut outcomes = Vec::with_capacity(self.order.len());
        for engine in self.engines() {
            let outcome = engine.init().await;
            outcomes.push((engine.kind().to_string(), outcome));
        }
        outcomes
    }

    /// Flush every pending save. Returns how many engines flushed.
    pub fn flush_all(&self) -> usize {
        self.engines().filter(|engine| engine.flush_now()).count()
    }

    pub fn handle_lifecycle(&self, signal: LifecycleSignal) {
        for engine in self.engines() {
            engine.handle_lifecycle(signal);
        }
    }

    /// Session teardown (logout) for every engine.
    pub fn reset_all(&self) {
        for engine in self.engines() {
            engine.reset();
        }
        tracing::info!(collections = self.order.len(), "All engines reset");
    }
}
