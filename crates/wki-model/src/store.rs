use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::cache::TrainingCache;
use crate::persist::{self, PersistError};
use crate::snapshot::ModelSnapshot;

/// Holder of the active model.
///
/// Readers clone an `Arc` under a short read lock and then work lock-free on
/// an immutable snapshot; `replace` swaps the pointer under the write lock.
/// A reader therefore sees either the old or the new snapshot in full.
#[derive(Debug, Default)]
pub struct ModelStore {
    current: RwLock<Option<Arc<ModelSnapshot>>>,
}

impl ModelStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: ModelSnapshot) -> Self {
        Self {
            current: RwLock::new(Some(Arc::new(snapshot))),
        }
    }

    pub fn read(&self) -> Option<Arc<ModelSnapshot>> {
        self.current.read().clone()
    }

    pub fn is_trained(&self) -> bool {
        self.current.read().is_some()
    }

    /// Publish a new snapshot; returns the one it displaced.
    pub fn replace(&self, snapshot: ModelSnapshot) -> Option<Arc<ModelSnapshot>> {
        let next = Arc::new(snapshot);
        std::mem::replace(&mut *self.current.write(), Some(next))
    }

    /// Write the active snapshot together with `cache` to `path`.
    pub fn persist(&self, path: &Path, cache: &TrainingCache) -> Result<(), PersistError> {
        let current = self.read();
        persist::save(path, current.as_deref(), cache)
    }

    /// Load a state file, publish its snapshot (if any) and hand back the
    /// cache for the orchestrator. `Ok(None)` when nothing was saved yet.
    pub fn restore(&self, path: &Path) -> Result<Option<TrainingCache>, PersistError> {
        let Some(state) = persist::load(path)? else {
            return Ok(None);
        };
        if let Some(snapshot) = state.snapshot {
            self.replace(snapshot);
        }
        Ok(Some(state.cache))
    }
}
