use std::sync::Arc;

use wki_model::{InferenceEngine, ModelStore};

use crate::config::ServiceConfig;
use crate::discovery::BackendLocator;
use crate::orchestrator::TrainingOrchestrator;

#[derive(Clone)]
pub(crate) struct AppState {
    config: Arc<ServiceConfig>,
    device: Arc<str>,
    inference: InferenceEngine,
    orchestrator: Arc<TrainingOrchestrator>,
}

impl AppState {
    pub fn new(
        config: Arc<ServiceConfig>,
        device: impl Into<Arc<str>>,
        orchestrator: Arc<TrainingOrchestrator>,
    ) -> Self {
        Self {
            config,
            device: device.into(),
            inference: InferenceEngine::new(orchestrator.store().clone()),
            orchestrator,
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn inference(&self) -> &InferenceEngine {
        &self.inference
    }

    pub fn orchestrator(&self) -> &Arc<TrainingOrchestrator> {
        &self.orchestrator
    }

    pub fn store(&self) -> &Arc<ModelStore> {
        self.orchestrator.store()
    }

    pub fn locator(&self) -> &Arc<BackendLocator> {
        self.orchestrator.locator()
    }
}
