use futures_util::FutureExt;
use std::{
    borrow::Cow,
    time::{Duration, Instant},
};

use tokio::task::JoinHandle;
use tracing::{debug, trace};

const RESTART_BACKOFF_START: Duration = Duration::from_millis(200);
const RESTART_BACKOFF_MAX: Duration = Duration::from_secs(10);
const RESTART_WINDOW: Duration = Duration::from_secs(30);

#[derive(Debug)]
pub struct TaskHandle {
    name: Cow<'static, str>,
    handle: JoinHandle<()>,
}

impl TaskHandle {
    pub fn new(name: impl Into<Cow<'static, str>>, handle: JoinHandle<()>) -> Self {
        Self {
            name: name.into(),
            handle,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

#[derive(Debug, Default)]
pub struct TaskManager {
    tasks: Vec<TaskHandle>,
}

impl TaskManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, task: TaskHandle) {
        trace!(task = task.name(), "task registered");
        self.tasks.push(task);
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Give each task up to `grace` to finish on its own, then abort it.
    pub async fn shutdown_with_grace(self, grace: Duration) {
        let running = self.tasks.iter().filter(|t| !t.is_finished()).count();
        debug!(tasks = self.len(), running, "stopping background tasks");
        for TaskHandle { name, mut handle } in self.tasks {
            if grace.is_zero() {
                handle.abort();
                if let Err(err) = handle.await {
                    debug!(task = %name, ?err, "task join after abort failed");
                }
                continue;
            }

            let sleeper = tokio::time::sleep(grace);
            tokio::pin!(sleeper);
            tokio::select! {
                res = &mut handle => {
                    if let Err(err) = res {
                        debug!(task = %name, ?err, "task exited with error");
                    }
                }
                _ = &mut sleeper => {
                    handle.abort();
                    if let Err(err) = handle.await {
                        debug!(task = %name, ?err, "task join after abort failed");
                    }
                }
            }
        }
    }
}

/// Spawn a background task that restarts on panic with exponential backoff.
/// A task that returns normally is not restarted.
pub fn spawn_supervised<F, Fut>(name: impl Into<Cow<'static, str>>, mut factory: F) -> TaskHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let name_cow = name.into();
    let name_for_task = name_cow.clone();
    let handle = tokio::spawn(async move {
        let mut backoff = RESTART_BACKOFF_START;
        let mut window_start = Instant::now();
        let mut restarts_in_window: u32 = 0;
        loop {
            let result = std::panic::AssertUnwindSafe(factory()).catch_unwind().await;
            if result.is_ok() {
                debug!(task = %name_for_task, "supervised task completed normally");
                break;
            }
            let now = Instant::now();
            if now.duration_since(window_start) > RESTART_WINDOW {
                window_start = now;
                restarts_in_window = 0;
                backoff = RESTART_BACKOFF_START;
            }
            restarts_in_window = restarts_in_window.saturating_add(1);
            tracing::error!(
                task = %name_for_task,
                backoff_ms = backoff.as_millis() as u64,
                restarts_in_window,
                "supervised task panicked; restarting"
            );
            tokio::time::sleep(backoff).await;
            backoff = backoff.saturating_mul(2).min(RESTART_BACKOFF_MAX);
        }
    });
    TaskHandle::new(name_cow, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn panicking_task_is_restarted() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let task = spawn_supervised("test.flaky", move || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    panic!("first run fails");
                }
            }
        });
        tokio::time::timeout(Duration::from_secs(5), async {
            while !task.is_finished() {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("supervisor finished");
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn shutdown_aborts_stuck_tasks() {
        let mut manager = TaskManager::new();
        manager.push(TaskHandle::new(
            "test.stuck",
            tokio::spawn(std::future::pending::<()>()),
        ));
        manager.push(TaskHandle::new("test.quick", tokio::spawn(async {})));
        assert_eq!(manager.len(), 2);
        tokio::time::timeout(
            Duration::from_secs(5),
            manager.shutdown_with_grace(Duration::from_millis(50)),
        )
        .await
        .expect("shutdown completes");
    }
}
