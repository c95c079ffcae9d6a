use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, info, warn};
use wki_model::{train, ModelStore, PersistError, TrainError, TrainingCache, MIN_TRAINING_SAMPLES};

use crate::discovery::BackendLocator;
use crate::fetcher::TrainingDataFetcher;
use crate::gate::{GatePermit, TrainingGate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingPhase {
    Idle,
    Fetching,
    Reconciling,
    Training,
    Publishing,
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    Started,
    AlreadyRunning,
}

impl TriggerOutcome {
    pub fn started(self) -> bool {
        matches!(self, TriggerOutcome::Started)
    }
}

/// How a training cycle ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CycleOutcome {
    /// No backend known; discovery was (re)started.
    NoBackend,
    /// Backend unreachable after all retries; nothing changed.
    FetchFailed,
    /// Data reconciled but nothing worth retraining.
    Unchanged { cursor: u64 },
    InsufficientData { samples: usize },
    TrainingFailed { reason: String },
    Published { samples: usize, cursor: u64 },
}

/// Point-in-time view for health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct TrainingStatus {
    pub phase: TrainingPhase,
    pub in_progress: bool,
    pub cursor: u64,
    pub cached_records: usize,
    pub last_request_at: Option<DateTime<Utc>>,
    pub last_finished_at: Option<DateTime<Utc>>,
    pub last_outcome: Option<CycleOutcome>,
}

#[derive(Debug)]
struct Progress {
    phase: TrainingPhase,
    last_request_at: Option<DateTime<Utc>>,
    last_finished_at: Option<DateTime<Utc>>,
    last_outcome: Option<CycleOutcome>,
}

/// Runs fetch, reconcile, train and publish as one single-flight cycle.
///
/// Only the run holding the gate permit mutates the cache; other callers
/// take the cache lock briefly to read the cursor and size.
pub struct TrainingOrchestrator {
    gate: TrainingGate,
    locator: Arc<BackendLocator>,
    fetcher: TrainingDataFetcher,
    store: Arc<ModelStore>,
    cache: Mutex<TrainingCache>,
    progress: RwLock<Progress>,
    state_path: Option<PathBuf>,
}

impl TrainingOrchestrator {
    pub fn new(
        locator: Arc<BackendLocator>,
        fetcher: TrainingDataFetcher,
        store: Arc<ModelStore>,
        state_path: Option<PathBuf>,
    ) -> Self {
        Self {
            gate: TrainingGate::new(),
            locator,
            fetcher,
            store,
            cache: Mutex::new(TrainingCache::new()),
            progress: RwLock::new(Progress {
                phase: TrainingPhase::Idle,
                last_request_at: None,
                last_finished_at: None,
                last_outcome: None,
            }),
            state_path,
        }
    }

    /// Load the persisted snapshot and cache, if any. Returns whether state
    /// was found.
    pub fn restore(&self) -> Result<bool, PersistError> {
        let Some(path) = &self.state_path else {
            return Ok(false);
        };
        match self.store.restore(path)? {
            Some(cache) => {
                info!(
                    target: "wki::store",
                    path = %path.display(),
                    records = cache.len(),
                    cursor = cache.cursor(),
                    trained = self.store.is_trained(),
                    "state restored"
                );
                *self.cache.lock() = cache;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn status(&self) -> TrainingStatus {
        let (cursor, cached_records) = {
            let cache = self.cache.lock();
            (cache.cursor(), cache.len())
        };
        let progress = self.progress.read();
        TrainingStatus {
            phase: progress.phase,
            in_progress: self.gate.is_busy(),
            cursor,
            cached_records,
            last_request_at: progress.last_request_at,
            last_finished_at: progress.last_finished_at,
            last_outcome: progress.last_outcome.clone(),
        }
    }

    pub fn cursor(&self) -> u64 {
        self.cache.lock().cursor()
    }

    pub fn locator(&self) -> &Arc<BackendLocator> {
        &self.locator
    }

    pub fn store(&self) -> &Arc<ModelStore> {
        &self.store
    }

    /// Manual trigger: start a run in the background unless one is active.
    pub fn trigger(self: &Arc<Self>) -> TriggerOutcome {
        let Some(permit) = self.gate.try_acquire() else {
            debug!(target: "wki::training", "manual trigger rejected; run in progress");
            return TriggerOutcome::AlreadyRunning;
        };
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.run_cycle(permit).await;
        });
        TriggerOutcome::Started
    }

    /// Scheduled entry: run inline, or `None` if another run holds the gate.
    pub async fn run_once(&self) -> Option<CycleOutcome> {
        let permit = self.gate.try_acquire()?;
        Some(self.run_cycle(permit).await)
    }

    async fn run_cycle(&self, permit: GatePermit) -> CycleOutcome {
        self.progress.write().last_request_at = Some(Utc::now());
        let outcome = self.cycle().await;
        {
            let mut progress = self.progress.write();
            progress.phase = TrainingPhase::Idle;
            progress.last_finished_at = Some(Utc::now());
            progress.last_outcome = Some(outcome.clone());
        }
        drop(permit);
        outcome
    }

    fn set_phase(&self, phase: TrainingPhase) {
        self.progress.write().phase = phase;
        debug!(target: "wki::training", ?phase, "training phase");
    }

    async fn cycle(&self) -> CycleOutcome {
        if self.locator.resolve().is_none() {
            self.set_phase(TrainingPhase::Skipped);
            info!(target: "wki::training", "no backend known; training skipped");
            if self.locator.ensure_discovery() {
                debug!(target: "wki::training", "backend discovery started");
            }
            return CycleOutcome::NoBackend;
        }

        self.set_phase(TrainingPhase::Fetching);
        let since_id = self.cursor();
        let Some(batch) = self.fetcher.fetch(since_id).await else {
            return CycleOutcome::FetchFailed;
        };

        self.set_phase(TrainingPhase::Reconciling);
        let (reconciled, cache) = {
            let mut cache = self.cache.lock();
            let reconciled = cache.reconcile(&batch.records, &batch.meta);
            (reconciled, cache.clone())
        };
        info!(
            target: "wki::training",
            inserted = reconciled.inserted,
            removed = reconciled.removed,
            skipped = reconciled.skipped,
            cursor = reconciled.cursor,
            cached = cache.len(),
            "training data reconciled"
        );

        let needs_model = !self.store.is_trained() && cache.len() >= MIN_TRAINING_SAMPLES;
        if !reconciled.changed && !needs_model {
            self.persist(cache).await;
            return CycleOutcome::Unchanged {
                cursor: reconciled.cursor,
            };
        }
        if cache.len() < MIN_TRAINING_SAMPLES {
            info!(
                target: "wki::training",
                samples = cache.len(),
                required = MIN_TRAINING_SAMPLES,
                "not enough training data"
            );
            let samples = cache.len();
            self.persist(cache).await;
            return CycleOutcome::InsufficientData { samples };
        }

        self.set_phase(TrainingPhase::Training);
        let (trained, cache) = match tokio::task::spawn_blocking(move || {
            let result = train(&cache);
            (result, cache)
        })
        .await
        {
            Ok(pair) => pair,
            Err(err) => {
                warn!(target: "wki::training", %err, "training task failed");
                return CycleOutcome::TrainingFailed {
                    reason: err.to_string(),
                };
            }
        };
        let snapshot = match trained {
            Ok(snapshot) => snapshot,
            Err(TrainError::InsufficientData { found, .. }) => {
                self.persist(cache).await;
                return CycleOutcome::InsufficientData { samples: found };
            }
            Err(err) => {
                warn!(target: "wki::training", %err, "training failed");
                self.persist(cache).await;
                return CycleOutcome::TrainingFailed {
                    reason: err.to_string(),
                };
            }
        };

        self.set_phase(TrainingPhase::Publishing);
        let samples = snapshot.sample_count();
        let cursor = cache.cursor();
        self.store.replace(snapshot);
        info!(target: "wki::training", samples, cursor, "model published");
        self.persist(cache).await;
        CycleOutcome::Published { samples, cursor }
    }

    /// Write the current snapshot and `cache` to disk; failures are logged.
    async fn persist(&self, cache: TrainingCache) {
        let Some(path) = self.state_path.clone() else {
            return;
        };
        let store = Arc::clone(&self.store);
        let result = tokio::task::spawn_blocking(move || store.persist(&path, &cache)).await;
        match result {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(target: "wki::store", %err, "state not persisted"),
            Err(err) => warn!(target: "wki::store", %err, "persist task failed"),
        }
    }
}
