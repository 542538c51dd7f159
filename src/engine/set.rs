//! Engine handles per shard
//!
//! The registry maps ranges to locations; this set maps shard ids to the
//! live engine handle for the location. Handles are shared: the
//! synchronizer, orchestrator, and read path all resolve engines here.

use super::errors::{EngineError, EngineResult};
use super::memory::MemoryEngine;
use super::ops::ShardEngine;
use crate::registry::ShardId;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Shard id to engine handle mapping.
pub struct EngineSet {
    engines: RwLock<HashMap<ShardId, Arc<dyn ShardEngine>>>,
}

impl EngineSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self {
            engines: RwLock::new(HashMap::new()),
        }
    }

    /// Register an engine for a shard (replaces any previous handle).
    pub fn insert(&self, id: ShardId, engine: Arc<dyn ShardEngine>) {
        self.engines
            .write()
            .expect("engine set lock poisoned")
            .insert(id, engine);
    }

    /// Register a fresh in-memory engine for a local shard.
    pub fn insert_local(&self, id: ShardId) -> Arc<dyn ShardEngine> {
        let engine: Arc<dyn ShardEngine> = Arc::new(MemoryEngine::new());
        self.insert(id, engine.clone());
        engine
    }

    /// Resolve the engine for a shard.
    pub fn get(&self, id: &ShardId) -> EngineResult<Arc<dyn ShardEngine>> {
        self.engines
            .read()
            .expect("engine set lock poisoned")
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::NoEngine { shard: id.clone() })
    }

    /// Drop the handle for a shard.
    pub fn remove(&self, id: &ShardId) {
        self.engines
            .write()
            .expect("engine set lock poisoned")
            .remove(id);
    }
}

impl Default for EngineSet {
    fn default() -> Self {
        Self::new()
    }
}
