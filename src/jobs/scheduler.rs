//! Fire-once job scheduler with persisted run intents
//!
//! The scheduler owns a single dispatch loop that executes a registered
//! runner for each submitted job ID. The intent to run a job is persisted to
//! the job store before dispatch, so a submitted-but-not-yet-run task is
//! re-dispatched after a process restart. Only the schedule is persisted;
//! a job that crashed mid-run re-runs from its first stage.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::storage::JobStoreDb;

/// Executes the work for a single job ID
///
/// Implementations must not let errors escape: a runner converts failures
/// into terminal job state itself.
#[async_trait]
pub trait JobRunner: Send + Sync + 'static {
    async fn run(&self, job_id: Uuid);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LifecycleState {
    Uninitialized,
    Running,
    Stopped,
}

struct SchedulerInner {
    state: LifecycleState,
    sender: Option<mpsc::Sender<Uuid>>,
}

/// Process-wide task dispatcher with an explicit init/shutdown lifecycle
///
/// Constructed explicitly and injected where needed; a fresh instance starts
/// uninitialized, `initialize` moves it to running, `shutdown` to stopped.
/// Stopped is terminal for an instance.
pub struct Scheduler {
    db: Arc<JobStoreDb>,
    max_concurrent: usize,
    inner: Mutex<SchedulerInner>,
}

impl Scheduler {
    /// Create a new scheduler over the given store
    ///
    /// `max_concurrent` bounds how many runner instances execute at once;
    /// excess submissions queue.
    pub fn new(db: Arc<JobStoreDb>, max_concurrent: usize) -> Self {
        Self {
            db,
            max_concurrent: max_concurrent.max(1),
            inner: Mutex::new(SchedulerInner {
                state: LifecycleState::Uninitialized,
                sender: None,
            }),
        }
    }

    /// Start the dispatch loop and recover persisted task intents
    ///
    /// No-op when already running. Fails loudly if the persistence backend is
    /// unavailable; the process must not accept jobs in that case. A stopped
    /// scheduler cannot be restarted.
    pub fn initialize(&self, runner: Arc<dyn JobRunner>) -> Result<()> {
        let mut inner = self.inner.lock();
        match inner.state {
            LifecycleState::Running => {
                tracing::debug!("Scheduler already running");
                return Ok(());
            }
            LifecycleState::Stopped => {
                return Err(Error::Scheduler(
                    "a stopped scheduler cannot be restarted".to_string(),
                ));
            }
            LifecycleState::Uninitialized => {}
        }

        // Verify the backend before accepting work; this also loads the
        // intents that survived a restart.
        let recovered = self.db.pending_tasks()?;

        let (sender, receiver) = mpsc::channel(1024);
        let runner_db = Arc::clone(&self.db);
        let max_concurrent = self.max_concurrent;
        tokio::spawn(dispatch_loop(receiver, runner, runner_db, max_concurrent));

        if !recovered.is_empty() {
            tracing::info!("Recovered {} pending task(s) from the job store", recovered.len());
        }
        for job_id in recovered {
            if let Err(e) = sender.try_send(job_id) {
                tracing::error!("Failed to re-dispatch recovered job {}: {}", job_id, e);
            }
        }

        inner.sender = Some(sender);
        inner.state = LifecycleState::Running;
        tracing::info!(
            "Scheduler initialized (max {} concurrent jobs)",
            self.max_concurrent
        );
        Ok(())
    }

    /// Submit a job for execution as soon as possible (fire-once)
    ///
    /// The intent is persisted before dispatch; it is cleared after the
    /// runner returns.
    pub async fn submit(&self, job_id: Uuid) -> Result<()> {
        let sender = {
            let inner = self.inner.lock();
            match (&inner.state, &inner.sender) {
                (LifecycleState::Running, Some(sender)) => sender.clone(),
                _ => {
                    return Err(Error::Scheduler("scheduler is not running".to_string()));
                }
            }
        };

        self.db.enqueue_task(job_id)?;

        sender
            .send(job_id)
            .await
            .map_err(|e| Error::Scheduler(format!("failed to dispatch job: {}", e)))?;

        Ok(())
    }

    /// Stop dispatching; safe to call when not running
    ///
    /// In-flight runners finish; queued intents stay persisted and are picked
    /// up by the next process.
    pub fn shutdown(&self) {
        let mut inner = self.inner.lock();
        if inner.state == LifecycleState::Running {
            inner.sender = None;
            inner.state = LifecycleState::Stopped;
            tracing::info!("Scheduler shutdown");
        } else {
            tracing::debug!("Scheduler shutdown requested while not running");
        }
    }

    /// Whether the dispatch loop is accepting submissions
    pub fn is_running(&self) -> bool {
        self.inner.lock().state == LifecycleState::Running
    }
}

/// Pull job IDs off the channel and run them under the concurrency bound
async fn dispatch_loop(
    mut receiver: mpsc::Receiver<Uuid>,
    runner: Arc<dyn JobRunner>,
    db: Arc<JobStoreDb>,
    max_concurrent: usize,
) {
    let semaphore = Arc::new(Semaphore::new(max_concurrent));

    while let Some(job_id) = receiver.recv().await {
        let permit = match Arc::clone(&semaphore).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };
        let runner = Arc::clone(&runner);
        let db = Arc::clone(&db);

        tokio::spawn(async move {
            runner.run(job_id).await;
            if let Err(e) = db.remove_task(job_id) {
                tracing::error!("Failed to clear task intent for job {}: {}", job_id, e);
            }
            drop(permit);
        });
    }

    tracing::info!("Scheduler dispatch loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
    use tokio::time::timeout;

    struct RecordingRunner {
        tx: UnboundedSender<Uuid>,
    }

    #[async_trait]
    impl JobRunner for RecordingRunner {
        async fn run(&self, job_id: Uuid) {
            let _ = self.tx.send(job_id);
        }
    }

    fn recording_runner() -> (Arc<dyn JobRunner>, tokio::sync::mpsc::UnboundedReceiver<Uuid>) {
        let (tx, rx) = unbounded_channel();
        (Arc::new(RecordingRunner { tx }), rx)
    }

    #[tokio::test]
    async fn submit_runs_job_and_clears_intent() {
        let db = Arc::new(JobStoreDb::in_memory().unwrap());
        let scheduler = Scheduler::new(Arc::clone(&db), 2);
        let (runner, mut rx) = recording_runner();
        scheduler.initialize(runner).unwrap();

        let job_id = Uuid::new_v4();
        scheduler.submit(job_id).await.unwrap();

        let ran = timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("runner invoked")
            .unwrap();
        assert_eq!(ran, job_id);

        // The intent row is removed after the runner returns
        for _ in 0..50 {
            if db.pending_tasks().unwrap().is_empty() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("task intent was not cleared");
    }

    #[tokio::test]
    async fn initialize_twice_is_noop() {
        let db = Arc::new(JobStoreDb::in_memory().unwrap());
        let scheduler = Scheduler::new(db, 1);
        let (runner, _rx) = recording_runner();

        scheduler.initialize(Arc::clone(&runner)).unwrap();
        scheduler.initialize(runner).unwrap();
        assert!(scheduler.is_running());
    }

    #[tokio::test]
    async fn submit_before_initialize_errors() {
        let db = Arc::new(JobStoreDb::in_memory().unwrap());
        let scheduler = Scheduler::new(db, 1);

        let result = scheduler.submit(Uuid::new_v4()).await;
        assert!(matches!(result, Err(Error::Scheduler(_))));
    }

    #[tokio::test]
    async fn stopped_scheduler_cannot_restart() {
        let db = Arc::new(JobStoreDb::in_memory().unwrap());
        let scheduler = Scheduler::new(db, 1);
        let (runner, _rx) = recording_runner();

        scheduler.initialize(Arc::clone(&runner)).unwrap();
        scheduler.shutdown();
        assert!(!scheduler.is_running());

        let result = scheduler.initialize(runner);
        assert!(matches!(result, Err(Error::Scheduler(_))));
    }

    #[tokio::test]
    async fn shutdown_when_not_running_is_safe() {
        let db = Arc::new(JobStoreDb::in_memory().unwrap());
        let scheduler = Scheduler::new(db, 1);
        scheduler.shutdown();
        scheduler.shutdown();
        assert!(!scheduler.is_running());
    }

    #[tokio::test]
    async fn persisted_intents_are_dispatched_on_initialize() {
        let db = Arc::new(JobStoreDb::in_memory().unwrap());
        let job_id = Uuid::new_v4();
        // Intent persisted by a previous process that died before running it
        db.enqueue_task(job_id).unwrap();

        let scheduler = Scheduler::new(Arc::clone(&db), 1);
        let (runner, mut rx) = recording_runner();
        scheduler.initialize(runner).unwrap();

        let ran = timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("recovered job ran")
            .unwrap();
        assert_eq!(ran, job_id);
    }

    #[tokio::test]
    async fn submit_after_shutdown_errors() {
        let db = Arc::new(JobStoreDb::in_memory().unwrap());
        let scheduler = Scheduler::new(db, 1);
        let (runner, _rx) = recording_runner();

        scheduler.initialize(runner).unwrap();
        scheduler.shutdown();

        let result = scheduler.submit(Uuid::new_v4()).await;
        assert!(matches!(result, Err(Error::Scheduler(_))));
    }
}
