use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::debug;

use crate::discovery::BackendLocator;
use crate::orchestrator::TrainingOrchestrator;
use crate::tasks::{spawn_supervised, TaskHandle};

/// Poll cadence while no backend is known.
pub const NO_BACKEND_RETRY: Duration = Duration::from_secs(60);

pub fn next_delay(backend_resolved: bool, interval: Duration) -> Duration {
    if backend_resolved {
        interval
    } else {
        interval.min(NO_BACKEND_RETRY)
    }
}

/// Train once right away, then every `interval`. Without a backend the loop
/// polls at the short cadence and wakes as soon as the locator latches one.
pub async fn run(
    orchestrator: Arc<TrainingOrchestrator>,
    locator: Arc<BackendLocator>,
    interval: Duration,
) {
    loop {
        if let Some(outcome) = orchestrator.run_once().await {
            debug!(target: "wki::training", ?outcome, "scheduled cycle finished");
        } else {
            debug!(target: "wki::training", "scheduled cycle skipped; run in progress");
        }

        let resolved = locator.resolve().is_some();
        let delay = next_delay(resolved, interval);
        debug!(
            target: "wki::training",
            delay_secs = delay.as_secs(),
            resolved,
            "next training cycle scheduled"
        );
        if resolved {
            sleep(delay).await;
        } else {
            tokio::select! {
                _ = sleep(delay) => {}
                _ = locator.latched() => {
                    debug!(target: "wki::training", "backend found; training now");
                }
            }
        }
    }
}

pub fn start(
    orchestrator: Arc<TrainingOrchestrator>,
    locator: Arc<BackendLocator>,
    interval: Duration,
) -> TaskHandle {
    spawn_supervised("training.scheduler", move || {
        run(orchestrator.clone(), locator.clone(), interval)
    })
}
