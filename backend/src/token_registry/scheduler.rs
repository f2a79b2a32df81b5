use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, OwnedMutexGuard, RwLock};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{error, info, warn};

use super::{IngestionError, IngestionReport, TokenIngestionService};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestionState {
    #[default]
    Idle,
    Running,
    Completed,
    Failed,
}

/// Observable result of the most recent ingestion run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestionStatus {
    pub state: IngestionState,
    pub runs_completed: u64,
    pub last_report: Option<IngestionReport>,
    pub last_error: Option<String>,
    pub last_started_at: Option<DateTime<Utc>>,
    pub last_finished_at: Option<DateTime<Utc>>,
}

/// Shutdown handle of the loop spawned by [`IngestionScheduler::start`].
struct LoopHandle {
    generation: u64,
    shutdown_tx: watch::Sender<bool>,
}

/// Runs ingestion as an owned background task. At most one run is active at a
/// time and at most one scheduling loop exists.
pub struct IngestionScheduler {
    service: Arc<TokenIngestionService>,
    interval: Option<Duration>,
    run_lock: Arc<Mutex<()>>,
    status: Arc<RwLock<IngestionStatus>>,
    active_loop: Arc<RwLock<Option<LoopHandle>>>,
    generation: AtomicU64,
}

impl IngestionScheduler {
    pub fn new(service: Arc<TokenIngestionService>, interval: Option<Duration>) -> Self {
        Self {
            service,
            interval,
            run_lock: Arc::new(Mutex::new(())),
            status: Arc::new(RwLock::new(IngestionStatus::default())),
            active_loop: Arc::new(RwLock::new(None)),
            generation: AtomicU64::new(0),
        }
    }

    pub fn service(&self) -> &Arc<TokenIngestionService> {
        &self.service
    }

    pub async fn status(&self) -> IngestionStatus {
        self.status.read().await.clone()
    }

    /// Run ingestion on the current task and wait for the report.
    pub async fn run_once(&self) -> Result<IngestionReport, IngestionError> {
        let guard = self.try_acquire()?;
        self.execute(guard).await
    }

    /// Start one run in the background. The handle resolves to the run's outcome.
    pub fn spawn_run(self: &Arc<Self>) -> Result<JoinHandle<Result<IngestionReport, IngestionError>>, IngestionError> {
        let guard = self.try_acquire()?;
        let scheduler = Arc::clone(self);
        Ok(tokio::spawn(async move { scheduler.execute(guard).await }))
    }

    /// Run immediately, then every `interval` if one is configured.
    ///
    /// Returns `None` if a loop is already active. The handle resolves once the
    /// loop has exited, either after its single run or after [`stop`](Self::stop).
    pub async fn start(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let (generation, mut shutdown_rx) = {
            let mut active = self.active_loop.write().await;
            if active.is_some() {
                warn!("Ingestion scheduler is already running");
                return None;
            }
            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            *active = Some(LoopHandle {
                generation,
                shutdown_tx,
            });
            (generation, shutdown_rx)
        };

        match self.interval {
            Some(interval) => info!("Starting ingestion scheduler with {}s interval", interval.as_secs()),
            None => info!("Starting one-shot ingestion"),
        }

        let scheduler = Arc::clone(self);
        Some(tokio::spawn(async move {
            loop {
                if *shutdown_rx.borrow() {
                    break;
                }

                match scheduler.run_once().await {
                    Ok(report) if report.success() => info!(
                        "Scheduled ingestion completed: {} tokens created, cursor at {}",
                        report.tokens_created, report.end_index
                    ),
                    Ok(report) => warn!(
                        "Scheduled ingestion completed with {} failed pairs, cursor at {}",
                        report.failures.len(),
                        report.end_index
                    ),
                    Err(IngestionError::AlreadyRunning) => {
                        warn!("Skipping scheduled ingestion, a run is already in progress")
                    }
                    Err(e) => error!("Scheduled ingestion failed: {}", e),
                }

                let Some(interval) = scheduler.interval else {
                    break;
                };
                info!("Next ingestion scheduled in {} seconds", interval.as_secs());
                tokio::select! {
                    _ = sleep(interval) => {}
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }

            let mut active = scheduler.active_loop.write().await;
            if active.as_ref().is_some_and(|h| h.generation == generation) {
                *active = None;
            }
            info!("Ingestion scheduler stopped");
        }))
    }

    /// Signal the active loop to exit. A run already in progress finishes first.
    pub async fn stop(&self) {
        if let Some(handle) = self.active_loop.write().await.take() {
            let _ = handle.shutdown_tx.send(true);
            info!("Ingestion scheduler stop requested");
        }
    }

    pub async fn is_running(&self) -> bool {
        self.active_loop.read().await.is_some()
    }

    fn try_acquire(&self) -> Result<OwnedMutexGuard<()>, IngestionError> {
        Arc::clone(&self.run_lock)
            .try_lock_owned()
            .map_err(|_| IngestionError::AlreadyRunning)
    }

    async fn execute(&self, _guard: OwnedMutexGuard<()>) -> Result<IngestionReport, IngestionError> {
        {
            let mut status = self.status.write().await;
            status.state = IngestionState::Running;
            status.last_started_at = Some(Utc::now());
        }

        let result = self.service.run().await;

        let mut status = self.status.write().await;
        status.last_finished_at = Some(Utc::now());
        match &result {
            Ok(report) => {
                status.state = IngestionState::Completed;
                status.runs_completed += 1;
                status.last_report = Some(report.clone());
                status.last_error = None;
            }
            Err(e) => {
                error!("Error fetching pairs: {}", e);
                status.state = IngestionState::Failed;
                status.last_error = Some(e.to_string());
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::InMemoryTokenStore;
    use crate::ledger::{Address, StaticLedger};
    use crate::token_registry::IngestionConfig;

    fn scheduler_with(ledger: StaticLedger, interval: Option<Duration>) -> (Arc<IngestionScheduler>, Arc<InMemoryTokenStore>) {
        let store = Arc::new(InMemoryTokenStore::new());
        let service = Arc::new(TokenIngestionService::new(
            Arc::new(ledger),
            store.clone(),
            store.clone(),
            IngestionConfig::default(),
        ));
        (Arc::new(IngestionScheduler::new(service, interval)), store)
    }

    fn one_pair_ledger() -> StaticLedger {
        StaticLedger::new(Address::repeat_byte(0xfa))
            .with_token(Address::repeat_byte(1), "Wrapped Bone", "WBONE", 18)
            .with_token(Address::repeat_byte(2), "Shiba Inu", "SHIB", 18)
            .with_pair(Address::repeat_byte(0x10), Address::repeat_byte(1), Address::repeat_byte(2))
    }

    #[tokio::test]
    async fn test_status_starts_idle() {
        let (scheduler, _) = scheduler_with(one_pair_ledger(), None);
        let status = scheduler.status().await;
        assert_eq!(status.state, IngestionState::Idle);
        assert!(status.last_report.is_none());
    }

    #[tokio::test]
    async fn test_spawned_run_reports_completion() {
        let (scheduler, store) = scheduler_with(one_pair_ledger(), None);

        let handle = scheduler.spawn_run().unwrap();
        let report = handle.await.unwrap().unwrap();

        assert_eq!(report.tokens_created, 2);
        assert_eq!(store.token_count().await, 2);
        let status = scheduler.status().await;
        assert_eq!(status.state, IngestionState::Completed);
        assert_eq!(status.runs_completed, 1);
        assert_eq!(status.last_report, Some(report));
    }

    #[tokio::test]
    async fn test_concurrent_run_is_rejected() {
        let (scheduler, _) = scheduler_with(one_pair_ledger(), None);

        let guard = scheduler.try_acquire().unwrap();
        assert!(matches!(scheduler.run_once().await, Err(IngestionError::AlreadyRunning)));
        assert!(matches!(scheduler.spawn_run(), Err(IngestionError::AlreadyRunning)));
        drop(guard);

        assert!(scheduler.run_once().await.is_ok());
    }

    #[tokio::test]
    async fn test_one_shot_start_runs_once_and_stops() {
        let (scheduler, store) = scheduler_with(one_pair_ledger(), None);

        let handle = scheduler.start().await.unwrap();
        handle.await.unwrap();

        assert_eq!(store.token_count().await, 2);
        assert!(!scheduler.is_running().await);
        assert_eq!(scheduler.status().await.runs_completed, 1);
    }

    #[tokio::test]
    async fn test_failed_run_is_observable() {
        let ledger = one_pair_ledger();
        ledger.set_offline(true);
        let (scheduler, store) = scheduler_with(ledger, None);

        let result = scheduler.run_once().await;

        assert!(matches!(result, Err(IngestionError::Ledger(_))));
        assert_eq!(store.token_count().await, 0);
        let status = scheduler.status().await;
        assert_eq!(status.state, IngestionState::Failed);
        assert_eq!(status.runs_completed, 0);
        assert!(status.last_error.unwrap().contains("allPairsLength"));
    }

    async fn wait_for_runs(scheduler: &IngestionScheduler, runs: u64) -> u64 {
        for _ in 0..200 {
            let completed = scheduler.status().await.runs_completed;
            if completed >= runs {
                return completed;
            }
            sleep(Duration::from_millis(10)).await;
        }
        scheduler.status().await.runs_completed
    }

    #[tokio::test]
    async fn test_interval_mode_repeats_until_stopped() {
        let (scheduler, store) = scheduler_with(one_pair_ledger(), Some(Duration::from_millis(20)));

        let handle = scheduler.start().await.unwrap();
        assert!(wait_for_runs(&scheduler, 3).await >= 3);
        assert!(scheduler.is_running().await);

        scheduler.stop().await;
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("loop should exit after stop")
            .unwrap();

        assert!(!scheduler.is_running().await);
        let settled = scheduler.status().await.runs_completed;
        sleep(Duration::from_millis(100)).await;
        assert_eq!(scheduler.status().await.runs_completed, settled);
        assert_eq!(store.token_count().await, 2);
    }

    #[tokio::test]
    async fn test_stop_wakes_a_sleeping_loop() {
        let (scheduler, _) = scheduler_with(one_pair_ledger(), Some(Duration::from_secs(3600)));

        let handle = scheduler.start().await.unwrap();
        wait_for_runs(&scheduler, 1).await;
        scheduler.stop().await;

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("sleeping loop should exit after stop")
            .unwrap();
        assert_eq!(scheduler.status().await.runs_completed, 1);
    }

    #[tokio::test]
    async fn test_restart_after_stop_keeps_a_single_loop() {
        let (scheduler, _) = scheduler_with(one_pair_ledger(), Some(Duration::from_millis(100)));

        let first = scheduler.start().await.unwrap();
        sleep(Duration::from_millis(10)).await;
        scheduler.stop().await;
        sleep(Duration::from_millis(10)).await;
        let second = scheduler.start().await.unwrap();

        tokio::time::timeout(Duration::from_secs(2), first)
            .await
            .expect("stopped loop should exit")
            .unwrap();
        // The old loop exiting must not clear the new loop's registration
        assert!(scheduler.is_running().await);
        assert!(scheduler.start().await.is_none());

        let before = scheduler.status().await.runs_completed;
        sleep(Duration::from_millis(1000)).await;
        let runs = scheduler.status().await.runs_completed - before;
        assert!(runs <= 12, "expected a single 100ms loop, saw {} runs in 1s", runs);

        scheduler.stop().await;
        tokio::time::timeout(Duration::from_secs(2), second)
            .await
            .expect("second loop should exit")
            .unwrap();
        assert!(!scheduler.is_running().await);
    }
}
