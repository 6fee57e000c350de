//! The persistence interface of the application.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
#[cfg(test)]
use mockall::automock;

use super::error::PersistenceError;
use crate::models::{
    alert::{Alert, AlertStatus, NewAlert},
    ioc::{IocObservation, IocReuse},
    monitor::{Monitor, MonitorScanSummary},
    scan::{ScanDraft, ScanRecord},
};

/// The document store behind scans, monitors, IOCs and alerts.
///
/// Individual operations are atomic. A scan's (record, IOCs, alerts) triple
/// is applied in that write order, so a reader observing the scan also
/// observes its IOCs; alerts may trail.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Store: Send + Sync {
    // Scan operations:
    /// Appends a scan record, computing its change flag against the prior
    /// ONLINE record and extending the target's status history.
    async fn put_scan(&self, draft: ScanDraft) -> Result<ScanRecord, PersistenceError>;

    /// Fetches one scan record by id.
    async fn get_scan(&self, id: i64) -> Result<Option<ScanRecord>, PersistenceError>;

    /// The most recent scan for a fingerprint.
    async fn latest_scan(&self, fingerprint: &str)
        -> Result<Option<ScanRecord>, PersistenceError>;

    /// Recent scans for a fingerprint, newest first.
    async fn scans_for(
        &self,
        fingerprint: &str,
        limit: u32,
    ) -> Result<Vec<ScanRecord>, PersistenceError>;

    /// Global reverse-chronological scan history.
    async fn history(&self, limit: u32, offset: u32)
        -> Result<Vec<ScanRecord>, PersistenceError>;

    /// Recent ONLINE scans for a fingerprint, newest first.
    async fn recent_online_scans(
        &self,
        fingerprint: &str,
        limit: u32,
    ) -> Result<Vec<ScanRecord>, PersistenceError>;

    /// The scan immediately before `before_id` for a fingerprint, any status.
    async fn previous_scan(
        &self,
        fingerprint: &str,
        before_id: i64,
    ) -> Result<Option<ScanRecord>, PersistenceError>;

    /// The ONLINE scan immediately before `before_id` for a fingerprint.
    async fn previous_online_scan(
        &self,
        fingerprint: &str,
        before_id: i64,
    ) -> Result<Option<ScanRecord>, PersistenceError>;

    // IOC operations:
    /// Appends an IOC observation and reports the size of the indicator's
    /// reuse set and whether the target was already in it.
    async fn ioc_upsert(&self, observation: &IocObservation)
        -> Result<IocReuse, PersistenceError>;

    // Monitor operations:
    /// Registers a monitor, due immediately. Rejects with
    /// [`PersistenceError::LimitExceeded`] at the active-monitor cap.
    async fn create_monitor(
        &self,
        target: &str,
        fingerprint: &str,
        interval_minutes: u32,
        cap: u32,
    ) -> Result<Monitor, PersistenceError>;

    /// Fetches one monitor by id.
    async fn get_monitor(&self, id: i64) -> Result<Option<Monitor>, PersistenceError>;

    /// All registered monitors.
    async fn list_monitors(&self) -> Result<Vec<Monitor>, PersistenceError>;

    /// Deletes a monitor; returns whether it existed.
    async fn delete_monitor(&self, id: i64) -> Result<bool, PersistenceError>;

    /// Deletes all monitors; returns how many were removed.
    async fn delete_all_monitors(&self) -> Result<u64, PersistenceError>;

    /// Sets the sticky pause flag; returns the updated monitor.
    async fn set_monitor_paused(
        &self,
        id: i64,
        paused: bool,
    ) -> Result<Option<Monitor>, PersistenceError>;

    /// Unpaused monitors whose `next_scan` has elapsed.
    async fn due_monitors(&self, now: DateTime<Utc>) -> Result<Vec<Monitor>, PersistenceError>;

    /// Records a completed monitor scan. A missing monitor row (deleted while
    /// the scan was in flight) is not an error; its results are discarded.
    async fn record_monitor_scan(
        &self,
        id: i64,
        last_scan: DateTime<Utc>,
        next_scan: DateTime<Utc>,
        summary: MonitorScanSummary,
    ) -> Result<(), PersistenceError>;

    // Alert operations:
    /// Appends an alert with status `new`.
    async fn put_alert(&self, alert: NewAlert) -> Result<Alert, PersistenceError>;

    /// Recent alerts, newest first, optionally filtered by status.
    async fn list_alerts(
        &self,
        status: Option<AlertStatus>,
        limit: u32,
    ) -> Result<Vec<Alert>, PersistenceError>;

    /// Marks an alert acknowledged. Idempotent; returns the alert.
    async fn acknowledge_alert(&self, id: i64) -> Result<Option<Alert>, PersistenceError>;
}
