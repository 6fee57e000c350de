//! The monitor scheduler: a tick loop dispatching due monitors to a bounded
//! worker pool.
//!
//! Invariants: at most one in-flight scan per monitor, sticky pause, no
//! catch-up backlog (an overdue monitor runs once and is rescheduled from
//! now), and failure isolation — a failing or panicking scan marks the
//! monitor's summary as ERROR and never stalls the loop.

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use dashmap::DashMap;
use futures::FutureExt;
use tokio::{
    sync::Semaphore,
    task::JoinSet,
};
use tokio_util::sync::CancellationToken;

use crate::{
    models::monitor::{Monitor, MonitorScanSummary},
    persistence::{error::PersistenceError, traits::Store},
    scanner::ScanPipeline,
};

/// Periodically rescans registered monitors.
pub struct MonitorScheduler {
    store: Arc<dyn Store>,
    pipeline: Arc<ScanPipeline>,
    tick_interval: Duration,
    permits: Arc<Semaphore>,
    in_flight: Arc<DashMap<i64, ()>>,
    cancellation_token: CancellationToken,
}

impl MonitorScheduler {
    /// Creates a scheduler with the given worker pool size and tick interval.
    pub fn new(
        store: Arc<dyn Store>,
        pipeline: Arc<ScanPipeline>,
        pool_size: usize,
        tick_interval: Duration,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            store,
            pipeline,
            tick_interval,
            permits: Arc::new(Semaphore::new(pool_size)),
            in_flight: Arc::new(DashMap::new()),
            cancellation_token,
        }
    }

    /// Runs the tick loop until cancelled, then drains in-flight workers.
    pub async fn run(self) {
        tracing::info!(tick = ?self.tick_interval, "Monitor scheduler started");
        let mut workers: JoinSet<()> = JoinSet::new();

        loop {
            tokio::select! {
                biased;

                _ = self.cancellation_token.cancelled() => {
                    tracing::info!("Scheduler cancellation received, stopping dispatch");
                    break;
                }

                Some(result) = workers.join_next(), if !workers.is_empty() => {
                    if let Err(e) = result {
                        tracing::error!(error = %e, "Monitor worker terminated abnormally");
                    }
                }

                _ = tokio::time::sleep(self.tick_interval) => {
                    if let Err(e) = self.dispatch_due(&mut workers).await {
                        tracing::error!(error = %e, "Dispatch failed, retrying next tick");
                    }
                }
            }
        }

        // Let in-flight scans finish; the supervisor bounds this wait.
        while workers.join_next().await.is_some() {}
        tracing::info!("Monitor scheduler stopped");
    }

    /// Collects due monitors and hands them to the worker pool. A monitor
    /// already in flight is excluded even if its interval has elapsed.
    async fn dispatch_due(&self, workers: &mut JoinSet<()>) -> Result<(), PersistenceError> {
        let due = self.store.due_monitors(Utc::now()).await?;

        for monitor in due {
            if self.in_flight.contains_key(&monitor.id) {
                continue;
            }
            let permit = match Arc::clone(&self.permits).try_acquire_owned() {
                Ok(permit) => permit,
                Err(_) => {
                    // Pool exhausted; the monitor stays due for the next tick.
                    tracing::debug!("Worker pool exhausted, deferring dispatch");
                    break;
                }
            };

            self.in_flight.insert(monitor.id, ());
            tracing::debug!(monitor_id = monitor.id, target = %monitor.target, "Dispatching monitor scan");

            let store = Arc::clone(&self.store);
            let pipeline = Arc::clone(&self.pipeline);
            let in_flight = Arc::clone(&self.in_flight);
            workers.spawn(async move {
                let _permit = permit;
                run_monitor_scan(store, pipeline, &monitor).await;
                in_flight.remove(&monitor.id);
            });
        }
        Ok(())
    }
}

async fn run_monitor_scan(
    store: Arc<dyn Store>,
    pipeline: Arc<ScanPipeline>,
    monitor: &Monitor,
) {
    let dispatched_at = Utc::now();

    let summary = match std::panic::AssertUnwindSafe(pipeline.scan(&monitor.target))
        .catch_unwind()
        .await
    {
        Ok(Ok(record)) => MonitorScanSummary::from(&record),
        Ok(Err(e)) => {
            tracing::error!(monitor_id = monitor.id, error = %e, "Monitor scan failed");
            MonitorScanSummary::failed()
        }
        Err(_) => {
            tracing::error!(monitor_id = monitor.id, "Monitor scan panicked");
            MonitorScanSummary::failed()
        }
    };

    // Overdue monitors run once and restart their cadence from now; missed
    // ticks are never backfilled.
    let next_scan = Utc::now() + chrono::Duration::minutes(i64::from(monitor.interval_minutes));

    if let Err(e) = store.record_monitor_scan(monitor.id, dispatched_at, next_scan, summary).await
    {
        tracing::error!(monitor_id = monitor.id, error = %e, "Failed to record monitor scan");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        downloader::MockFileDownloader,
        fetcher::{FetchOutcome, MockPageFetcher},
        forensics::{
            FileAnalyser, MockFormatCarver, MockMetadataExtractor, MockSignatureScanner,
            MockStringsExtractor,
        },
        models::scan::UrlStatus,
        persistence::SqliteStore,
    };

    async fn memory_store() -> Arc<SqliteStore> {
        let store = SqliteStore::new("sqlite::memory:").await.expect("store should connect");
        store.run_migrations().await.expect("migrations should run");
        Arc::new(store)
    }

    fn analyser() -> Arc<FileAnalyser> {
        let mut signature = MockSignatureScanner::new();
        signature.expect_available().return_const(false);
        let mut strings = MockStringsExtractor::new();
        strings.expect_available().return_const(false);
        let mut metadata = MockMetadataExtractor::new();
        metadata.expect_available().return_const(false);
        let mut carver = MockFormatCarver::new();
        carver.expect_available().return_const(false);
        Arc::new(FileAnalyser::new(
            Arc::new(signature),
            Arc::new(strings),
            Arc::new(metadata),
            Arc::new(carver),
        ))
    }

    fn online_pipeline(store: Arc<SqliteStore>) -> Arc<ScanPipeline> {
        let mut fetcher = MockPageFetcher::new();
        fetcher.expect_fetch().returning(|_| {
            let mut outcome = FetchOutcome::failure(UrlStatus::Online, Some(200), 0.1);
            outcome.text = Some("<body>steady page</body>".to_string());
            outcome
        });
        Arc::new(ScanPipeline::new(
            Arc::new(fetcher),
            Arc::new(MockFileDownloader::new()),
            analyser(),
            store,
            10,
        ))
    }

    async fn run_scheduler_for(
        store: Arc<SqliteStore>,
        pipeline: Arc<ScanPipeline>,
        duration: Duration,
    ) {
        let token = CancellationToken::new();
        let scheduler = MonitorScheduler::new(
            store,
            pipeline,
            4,
            Duration::from_millis(25),
            token.clone(),
        );
        let handle = tokio::spawn(scheduler.run());
        tokio::time::sleep(duration).await;
        token.cancel();
        handle.await.expect("scheduler task should join");
    }

    #[tokio::test]
    async fn due_monitor_is_scanned_and_rescheduled() {
        let store = memory_store().await;
        let pipeline = online_pipeline(Arc::clone(&store));
        let monitor = store
            .create_monitor("http://example.onion/", "http://example.onion/", 1, 5)
            .await
            .unwrap();

        run_scheduler_for(Arc::clone(&store), pipeline, Duration::from_millis(300)).await;

        let updated = store.get_monitor(monitor.id).await.unwrap().unwrap();
        // interval=1 minute: exactly one scan fits in the test window.
        assert_eq!(updated.scan_count, 1);
        assert!(updated.last_scan.is_some());
        assert!(updated.next_scan > Utc::now());
        let summary = updated.last_scan_summary.expect("summary should be recorded");
        assert_eq!(summary.status, UrlStatus::Online);

        let scans = store.scans_for(&monitor.fingerprint, 10).await.unwrap();
        assert_eq!(scans.len(), 1);
    }

    #[tokio::test]
    async fn paused_monitor_is_never_dispatched() {
        let store = memory_store().await;
        let pipeline = online_pipeline(Arc::clone(&store));
        let monitor = store
            .create_monitor("http://example.onion/", "http://example.onion/", 1, 5)
            .await
            .unwrap();
        store.set_monitor_paused(monitor.id, true).await.unwrap();

        run_scheduler_for(Arc::clone(&store), pipeline, Duration::from_millis(200)).await;

        let updated = store.get_monitor(monitor.id).await.unwrap().unwrap();
        assert_eq!(updated.scan_count, 0);
        assert!(updated.last_scan.is_none());
    }

    #[tokio::test]
    async fn failing_pipeline_marks_the_summary_as_error() {
        let store = memory_store().await;
        // A fetcher is never reached: the stored target is invalid, so the
        // pipeline errors before fetching.
        let pipeline = online_pipeline(Arc::clone(&store));
        sqlx::query(
            "INSERT INTO monitors (target, fingerprint, interval_minutes, paused, created_at, \
             next_scan, scan_count) VALUES ('not-a-url', 'not-a-url', 1, 0, ?, ?, 0)",
        )
        .bind(Utc::now())
        .bind(Utc::now())
        .execute(store_pool(&store))
        .await
        .unwrap();

        run_scheduler_for(Arc::clone(&store), pipeline, Duration::from_millis(200)).await;

        let monitors = store.list_monitors().await.unwrap();
        assert_eq!(monitors.len(), 1);
        let summary = monitors[0].last_scan_summary.clone().expect("summary should be recorded");
        assert_eq!(summary.status, UrlStatus::Error);
        assert_eq!(monitors[0].scan_count, 1);
    }

    #[tokio::test]
    async fn overdue_monitor_runs_once_with_no_backlog() {
        let store = memory_store().await;
        let pipeline = online_pipeline(Arc::clone(&store));
        let monitor = store
            .create_monitor("http://example.onion/", "http://example.onion/", 1, 5)
            .await
            .unwrap();
        // Push the monitor five intervals into the past.
        sqlx::query("UPDATE monitors SET next_scan = ? WHERE id = ?")
            .bind(Utc::now() - chrono::Duration::minutes(5))
            .bind(monitor.id)
            .execute(store_pool(&store))
            .await
            .unwrap();

        run_scheduler_for(Arc::clone(&store), pipeline, Duration::from_millis(300)).await;

        let updated = store.get_monitor(monitor.id).await.unwrap().unwrap();
        assert_eq!(updated.scan_count, 1);
        assert!(updated.next_scan > Utc::now());
    }

    // Test-only peek at the pool for fixture rows the public API cannot
    // produce (invalid stored targets, rewound schedules).
    fn store_pool(store: &SqliteStore) -> &sqlx::SqlitePool {
        store.pool()
    }
}
