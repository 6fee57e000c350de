//! SQLite implementation of the [`Store`] trait.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Row, SqlitePool,
};

use super::{error::PersistenceError, traits::Store};
use crate::models::{
    alert::{Alert, AlertStatus, NewAlert},
    ioc::{IocObservation, IocReuse},
    monitor::{Monitor, MonitorScanSummary},
    scan::{ScanDraft, ScanRecord, StatusHistoryEntry, UrlStatus},
};

/// SQL for scan record operations.
mod scan_sql {
    pub const INSERT_SCAN: &str = "INSERT INTO scans (fingerprint, target, timestamp, url_status, \
         status_code, response_time_seconds, title, content_preview, content_hash, keywords, \
         emails, crypto_addresses, pgp_detected, links, file_links, file_analyses, threat_score, \
         risk_level, category, confidence, threat_indicators, content_changed, status_history) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)";

    pub const SELECT_BY_ID: &str = "SELECT * FROM scans WHERE id = ?";

    pub const SELECT_LATEST: &str =
        "SELECT * FROM scans WHERE fingerprint = ? ORDER BY id DESC LIMIT 1";

    pub const SELECT_FOR_FINGERPRINT: &str =
        "SELECT * FROM scans WHERE fingerprint = ? ORDER BY timestamp DESC, id DESC LIMIT ?";

    pub const SELECT_HISTORY: &str =
        "SELECT * FROM scans ORDER BY timestamp DESC, id DESC LIMIT ? OFFSET ?";

    pub const SELECT_RECENT_ONLINE: &str = "SELECT * FROM scans WHERE fingerprint = ? AND \
         url_status = 'ONLINE' ORDER BY timestamp DESC, id DESC LIMIT ?";

    pub const SELECT_PREVIOUS: &str =
        "SELECT * FROM scans WHERE fingerprint = ? AND id < ? ORDER BY id DESC LIMIT 1";

    pub const SELECT_PREVIOUS_ONLINE: &str = "SELECT * FROM scans WHERE fingerprint = ? AND \
         id < ? AND url_status = 'ONLINE' ORDER BY id DESC LIMIT 1";

    pub const SELECT_LATEST_HISTORY: &str =
        "SELECT status_history FROM scans WHERE fingerprint = ? ORDER BY id DESC LIMIT 1";

    pub const SELECT_LATEST_ONLINE_HASH: &str = "SELECT content_hash FROM scans WHERE \
         fingerprint = ? AND url_status = 'ONLINE' ORDER BY id DESC LIMIT 1";
}

/// SQL for IOC operations.
mod ioc_sql {
    pub const COUNT_DISTINCT_TARGETS: &str =
        "SELECT COUNT(DISTINCT target) FROM iocs WHERE ioc_type = ? AND ioc_value = ?";

    pub const TARGET_KNOWN: &str = "SELECT EXISTS(SELECT 1 FROM iocs WHERE ioc_type = ? AND \
         ioc_value = ? AND target = ?)";

    pub const INSERT_IOC: &str =
        "INSERT INTO iocs (ioc_type, ioc_value, target, timestamp) VALUES (?, ?, ?, ?)";
}

/// SQL for monitor operations.
mod monitor_sql {
    pub const COUNT_MONITORS: &str = "SELECT COUNT(*) FROM monitors";

    pub const INSERT_MONITOR: &str = "INSERT INTO monitors (target, fingerprint, \
         interval_minutes, paused, created_at, next_scan, scan_count) VALUES (?, ?, ?, 0, ?, ?, 0)";

    pub const SELECT_BY_ID: &str = "SELECT * FROM monitors WHERE id = ?";

    pub const SELECT_ALL: &str = "SELECT * FROM monitors ORDER BY id";

    pub const DELETE_BY_ID: &str = "DELETE FROM monitors WHERE id = ?";

    pub const DELETE_ALL: &str = "DELETE FROM monitors";

    pub const SET_PAUSED: &str = "UPDATE monitors SET paused = ? WHERE id = ?";

    pub const SELECT_DUE: &str =
        "SELECT * FROM monitors WHERE paused = 0 AND next_scan <= ? ORDER BY next_scan";

    pub const RECORD_SCAN: &str = "UPDATE monitors SET last_scan = ?, next_scan = ?, \
         scan_count = scan_count + 1, last_scan_summary = ? WHERE id = ?";
}

/// SQL for alert operations.
mod alert_sql {
    pub const INSERT_ALERT: &str = "INSERT INTO alerts (target, alert_type, severity, reason, \
         threat_score, previous_score, score_increase, details, timestamp, status) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 'new')";

    pub const SELECT_BY_ID: &str = "SELECT * FROM alerts WHERE id = ?";

    pub const SELECT_RECENT: &str =
        "SELECT * FROM alerts ORDER BY timestamp DESC, id DESC LIMIT ?";

    pub const SELECT_RECENT_BY_STATUS: &str =
        "SELECT * FROM alerts WHERE status = ? ORDER BY timestamp DESC, id DESC LIMIT ?";

    pub const ACKNOWLEDGE: &str = "UPDATE alerts SET status = 'acknowledged' WHERE id = ?";
}

/// A [`Store`] backed by SQLite.
pub struct SqliteStore {
    /// The SQLite connection pool used for database operations.
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connects to the database, creating the file if it does not exist.
    #[tracing::instrument(level = "info")]
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        tracing::debug!(database_url, "Connecting to SQLite store.");
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        // An in-memory database exists per connection, so the pool must not
        // open more than one.
        let pool = if database_url.contains(":memory:") {
            SqlitePoolOptions::new().max_connections(1).connect_with(options).await?
        } else {
            SqlitePool::connect_with(options).await?
        };
        tracing::info!(database_url, "Connected to SQLite store.");
        Ok(Self { pool })
    }

    /// Runs database migrations.
    #[tracing::instrument(skip(self), level = "info")]
    pub async fn run_migrations(&self) -> Result<(), PersistenceError> {
        sqlx::migrate!("./migrations").run(&self.pool).await.map_err(|e| {
            tracing::error!(error = %e, "Failed to run database migrations.");
            PersistenceError::MigrationError(e.to_string())
        })?;
        tracing::info!("Database migrations completed.");
        Ok(())
    }

    /// Access to the underlying connection pool for advanced operations.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Closes the connection pool gracefully.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn put_scan(&self, draft: ScanDraft) -> Result<ScanRecord, PersistenceError> {
        let mut tx = self.pool.begin().await?;

        let prior_history: Option<String> = sqlx::query_scalar(scan_sql::SELECT_LATEST_HISTORY)
            .bind(&draft.fingerprint)
            .fetch_optional(&mut *tx)
            .await?;

        let prev_online_hash: Option<Option<String>> =
            sqlx::query_scalar(scan_sql::SELECT_LATEST_ONLINE_HASH)
                .bind(&draft.fingerprint)
                .fetch_optional(&mut *tx)
                .await?;

        let content_changed = draft.url_status == UrlStatus::Online
            && match &prev_online_hash {
                Some(previous) => previous != &draft.content_hash,
                None => false,
            };
        if content_changed {
            tracing::warn!(target = %draft.target, "Content change detected");
        }

        let mut status_history: Vec<StatusHistoryEntry> = match prior_history {
            Some(raw) => serde_json::from_str(&raw)
                .map_err(|e| PersistenceError::SerializationError(e.to_string()))?,
            None => Vec::new(),
        };
        status_history.push(StatusHistoryEntry {
            timestamp: draft.timestamp,
            url_status: draft.url_status,
            status_code: draft.status_code,
            response_time_seconds: draft.response_time_seconds,
        });

        let result = sqlx::query(scan_sql::INSERT_SCAN)
            .bind(&draft.fingerprint)
            .bind(&draft.target)
            .bind(draft.timestamp)
            .bind(draft.url_status.as_str())
            .bind(draft.status_code.map(i64::from))
            .bind(draft.response_time_seconds)
            .bind(&draft.title)
            .bind(&draft.content_preview)
            .bind(&draft.content_hash)
            .bind(to_json(&draft.keywords)?)
            .bind(to_json(&draft.emails)?)
            .bind(to_json(&draft.crypto_addresses)?)
            .bind(draft.pgp_detected)
            .bind(to_json(&draft.links)?)
            .bind(to_json(&draft.file_links)?)
            .bind(to_json(&draft.file_analyses)?)
            .bind(i64::from(draft.threat_score))
            .bind(draft.risk_level.as_str())
            .bind(&draft.category)
            .bind(draft.confidence)
            .bind(to_json(&draft.threat_indicators)?)
            .bind(content_changed)
            .bind(to_json(&status_history)?)
            .execute(&mut *tx)
            .await?;

        let id = result.last_insert_rowid();
        tx.commit().await?;

        self.get_scan(id).await?.ok_or_else(|| {
            PersistenceError::OperationFailed("scan row vanished after insert".to_string())
        })
    }

    async fn get_scan(&self, id: i64) -> Result<Option<ScanRecord>, PersistenceError> {
        let row = sqlx::query(scan_sql::SELECT_BY_ID).bind(id).fetch_optional(&self.pool).await?;
        row.map(|r| map_scan_row(&r)).transpose()
    }

    async fn latest_scan(
        &self,
        fingerprint: &str,
    ) -> Result<Option<ScanRecord>, PersistenceError> {
        let row = sqlx::query(scan_sql::SELECT_LATEST)
            .bind(fingerprint)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| map_scan_row(&r)).transpose()
    }

    async fn scans_for(
        &self,
        fingerprint: &str,
        limit: u32,
    ) -> Result<Vec<ScanRecord>, PersistenceError> {
        let rows = sqlx::query(scan_sql::SELECT_FOR_FINGERPRINT)
            .bind(fingerprint)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(map_scan_row).collect()
    }

    async fn history(
        &self,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ScanRecord>, PersistenceError> {
        let rows = sqlx::query(scan_sql::SELECT_HISTORY)
            .bind(i64::from(limit))
            .bind(i64::from(offset))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(map_scan_row).collect()
    }

    async fn recent_online_scans(
        &self,
        fingerprint: &str,
        limit: u32,
    ) -> Result<Vec<ScanRecord>, PersistenceError> {
        let rows = sqlx::query(scan_sql::SELECT_RECENT_ONLINE)
            .bind(fingerprint)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(map_scan_row).collect()
    }

    async fn previous_scan(
        &self,
        fingerprint: &str,
        before_id: i64,
    ) -> Result<Option<ScanRecord>, PersistenceError> {
        let row = sqlx::query(scan_sql::SELECT_PREVIOUS)
            .bind(fingerprint)
            .bind(before_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| map_scan_row(&r)).transpose()
    }

    async fn previous_online_scan(
        &self,
        fingerprint: &str,
        before_id: i64,
    ) -> Result<Option<ScanRecord>, PersistenceError> {
        let row = sqlx::query(scan_sql::SELECT_PREVIOUS_ONLINE)
            .bind(fingerprint)
            .bind(before_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| map_scan_row(&r)).transpose()
    }

    async fn ioc_upsert(
        &self,
        observation: &IocObservation,
    ) -> Result<IocReuse, PersistenceError> {
        let mut tx = self.pool.begin().await?;

        let distinct_before: i64 = sqlx::query_scalar(ioc_sql::COUNT_DISTINCT_TARGETS)
            .bind(observation.ioc_type.as_str())
            .bind(&observation.ioc_value)
            .fetch_one(&mut *tx)
            .await?;

        let target_was_known: bool = sqlx::query_scalar(ioc_sql::TARGET_KNOWN)
            .bind(observation.ioc_type.as_str())
            .bind(&observation.ioc_value)
            .bind(&observation.target)
            .fetch_one(&mut *tx)
            .await?;

        sqlx::query(ioc_sql::INSERT_IOC)
            .bind(observation.ioc_type.as_str())
            .bind(&observation.ioc_value)
            .bind(&observation.target)
            .bind(observation.timestamp)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        let distinct_targets =
            (distinct_before + if target_was_known { 0 } else { 1 }) as u32;
        Ok(IocReuse { distinct_targets, target_was_known })
    }

    async fn create_monitor(
        &self,
        target: &str,
        fingerprint: &str,
        interval_minutes: u32,
        cap: u32,
    ) -> Result<Monitor, PersistenceError> {
        let mut tx = self.pool.begin().await?;

        let active: i64 =
            sqlx::query_scalar(monitor_sql::COUNT_MONITORS).fetch_one(&mut *tx).await?;
        if active >= i64::from(cap) {
            return Err(PersistenceError::LimitExceeded(format!(
                "Maximum {cap} monitors allowed. Delete an existing monitor to add a new one."
            )));
        }

        let now = Utc::now();
        let result = sqlx::query(monitor_sql::INSERT_MONITOR)
            .bind(target)
            .bind(fingerprint)
            .bind(i64::from(interval_minutes))
            .bind(now)
            // New monitors are due immediately.
            .bind(now)
            .execute(&mut *tx)
            .await?;
        let id = result.last_insert_rowid();
        tx.commit().await?;

        self.get_monitor(id).await?.ok_or_else(|| {
            PersistenceError::OperationFailed("monitor row vanished after insert".to_string())
        })
    }

    async fn get_monitor(&self, id: i64) -> Result<Option<Monitor>, PersistenceError> {
        let row =
            sqlx::query(monitor_sql::SELECT_BY_ID).bind(id).fetch_optional(&self.pool).await?;
        row.map(|r| map_monitor_row(&r)).transpose()
    }

    async fn list_monitors(&self) -> Result<Vec<Monitor>, PersistenceError> {
        let rows = sqlx::query(monitor_sql::SELECT_ALL).fetch_all(&self.pool).await?;
        rows.iter().map(map_monitor_row).collect()
    }

    async fn delete_monitor(&self, id: i64) -> Result<bool, PersistenceError> {
        let result = sqlx::query(monitor_sql::DELETE_BY_ID).bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_all_monitors(&self) -> Result<u64, PersistenceError> {
        let result = sqlx::query(monitor_sql::DELETE_ALL).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn set_monitor_paused(
        &self,
        id: i64,
        paused: bool,
    ) -> Result<Option<Monitor>, PersistenceError> {
        let result = sqlx::query(monitor_sql::SET_PAUSED)
            .bind(paused)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_monitor(id).await
    }

    async fn due_monitors(&self, now: DateTime<Utc>) -> Result<Vec<Monitor>, PersistenceError> {
        let rows =
            sqlx::query(monitor_sql::SELECT_DUE).bind(now).fetch_all(&self.pool).await?;
        rows.iter().map(map_monitor_row).collect()
    }

    async fn record_monitor_scan(
        &self,
        id: i64,
        last_scan: DateTime<Utc>,
        next_scan: DateTime<Utc>,
        summary: MonitorScanSummary,
    ) -> Result<(), PersistenceError> {
        let result = sqlx::query(monitor_sql::RECORD_SCAN)
            .bind(last_scan)
            .bind(next_scan)
            .bind(to_json(&summary)?)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            // Deleted while the scan was in flight; results are discarded.
            tracing::debug!(monitor_id = id, "Monitor gone, dropping scan bookkeeping");
        }
        Ok(())
    }

    async fn put_alert(&self, alert: NewAlert) -> Result<Alert, PersistenceError> {
        let result = sqlx::query(alert_sql::INSERT_ALERT)
            .bind(&alert.target)
            .bind(alert.alert_type.as_str())
            .bind(alert.severity.as_str())
            .bind(&alert.reason)
            .bind(alert.threat_score.map(i64::from))
            .bind(alert.previous_score.map(i64::from))
            .bind(alert.score_increase.map(i64::from))
            .bind(alert.details.to_string())
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        let id = result.last_insert_rowid();

        let row = sqlx::query(alert_sql::SELECT_BY_ID).bind(id).fetch_one(&self.pool).await?;
        map_alert_row(&row)
    }

    async fn list_alerts(
        &self,
        status: Option<AlertStatus>,
        limit: u32,
    ) -> Result<Vec<Alert>, PersistenceError> {
        let rows = match status {
            Some(status) => {
                sqlx::query(alert_sql::SELECT_RECENT_BY_STATUS)
                    .bind(status.as_str())
                    .bind(i64::from(limit))
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                sqlx::query(alert_sql::SELECT_RECENT)
                    .bind(i64::from(limit))
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.iter().map(map_alert_row).collect()
    }

    async fn acknowledge_alert(&self, id: i64) -> Result<Option<Alert>, PersistenceError> {
        sqlx::query(alert_sql::ACKNOWLEDGE).bind(id).execute(&self.pool).await?;
        let row = sqlx::query(alert_sql::SELECT_BY_ID).bind(id).fetch_optional(&self.pool).await?;
        row.map(|r| map_alert_row(&r)).transpose()
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, PersistenceError> {
    serde_json::to_string(value).map_err(|e| PersistenceError::SerializationError(e.to_string()))
}

fn json_column<T: DeserializeOwned>(row: &SqliteRow, column: &str) -> Result<T, PersistenceError> {
    let raw: String = row.try_get(column)?;
    serde_json::from_str(&raw).map_err(|e| PersistenceError::SerializationError(e.to_string()))
}

fn map_scan_row(row: &SqliteRow) -> Result<ScanRecord, PersistenceError> {
    Ok(ScanRecord {
        id: row.try_get("id")?,
        fingerprint: row.try_get("fingerprint")?,
        target: row.try_get("target")?,
        timestamp: row.try_get("timestamp")?,
        url_status: parse_enum(row.try_get::<String, _>("url_status")?)?,
        status_code: row.try_get::<Option<i64>, _>("status_code")?.map(|v| v as u16),
        response_time_seconds: row.try_get("response_time_seconds")?,
        title: row.try_get("title")?,
        content_preview: row.try_get("content_preview")?,
        content_hash: row.try_get("content_hash")?,
        keywords: json_column(row, "keywords")?,
        emails: json_column(row, "emails")?,
        crypto_addresses: json_column(row, "crypto_addresses")?,
        pgp_detected: row.try_get("pgp_detected")?,
        links: json_column(row, "links")?,
        file_links: json_column(row, "file_links")?,
        file_analyses: json_column(row, "file_analyses")?,
        threat_score: row.try_get::<i64, _>("threat_score")? as u8,
        risk_level: parse_enum(row.try_get::<String, _>("risk_level")?)?,
        category: row.try_get("category")?,
        confidence: row.try_get("confidence")?,
        threat_indicators: json_column(row, "threat_indicators")?,
        content_changed: row.try_get("content_changed")?,
        status_history: json_column(row, "status_history")?,
    })
}

fn map_monitor_row(row: &SqliteRow) -> Result<Monitor, PersistenceError> {
    let summary: Option<String> = row.try_get("last_scan_summary")?;
    Ok(Monitor {
        id: row.try_get("id")?,
        target: row.try_get("target")?,
        fingerprint: row.try_get("fingerprint")?,
        interval_minutes: row.try_get::<i64, _>("interval_minutes")? as u32,
        paused: row.try_get("paused")?,
        created_at: row.try_get("created_at")?,
        last_scan: row.try_get("last_scan")?,
        next_scan: row.try_get("next_scan")?,
        scan_count: row.try_get::<i64, _>("scan_count")? as u32,
        last_scan_summary: summary
            .map(|raw| {
                serde_json::from_str(&raw)
                    .map_err(|e| PersistenceError::SerializationError(e.to_string()))
            })
            .transpose()?,
    })
}

fn map_alert_row(row: &SqliteRow) -> Result<Alert, PersistenceError> {
    let details: String = row.try_get("details")?;
    Ok(Alert {
        id: row.try_get("id")?,
        target: row.try_get("target")?,
        alert_type: parse_enum(row.try_get::<String, _>("alert_type")?)?,
        severity: parse_enum(row.try_get::<String, _>("severity")?)?,
        reason: row.try_get("reason")?,
        threat_score: row.try_get::<Option<i64>, _>("threat_score")?.map(|v| v as u8),
        previous_score: row.try_get::<Option<i64>, _>("previous_score")?.map(|v| v as u8),
        score_increase: row.try_get::<Option<i64>, _>("score_increase")?.map(|v| v as u8),
        details: serde_json::from_str(&details)
            .map_err(|e| PersistenceError::SerializationError(e.to_string()))?,
        timestamp: row.try_get("timestamp")?,
        status: parse_enum(row.try_get::<String, _>("status")?)?,
    })
}

fn parse_enum<T: FromStr<Err = String>>(raw: String) -> Result<T, PersistenceError> {
    raw.parse().map_err(PersistenceError::SerializationError)
}
