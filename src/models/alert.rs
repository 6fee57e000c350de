//! Alerts raised from scan results.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The rule that produced an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    /// Threat score rose by at least 20 points versus the prior ONLINE scan.
    ThreatIncrease,
    /// URL availability changed versus the prior scan.
    StatusChange,
    /// Page content hash changed versus the prior ONLINE scan.
    ContentChange,
    /// The signature scanner flagged a downloaded file.
    MalwareDetected,
    /// An indicator was observed on a second distinct target.
    IocReuse,
}

impl AlertType {
    /// The canonical wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::ThreatIncrease => "threat_increase",
            AlertType::StatusChange => "status_change",
            AlertType::ContentChange => "content_change",
            AlertType::MalwareDetected => "malware_detected",
            AlertType::IocReuse => "ioc_reuse",
        }
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "threat_increase" => Ok(AlertType::ThreatIncrease),
            "status_change" => Ok(AlertType::StatusChange),
            "content_change" => Ok(AlertType::ContentChange),
            "malware_detected" => Ok(AlertType::MalwareDetected),
            "ioc_reuse" => Ok(AlertType::IocReuse),
            other => Err(format!("unknown alert type '{other}'")),
        }
    }
}

/// Alert severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertSeverity {
    /// Informational.
    Low,
    /// Warrants attention.
    Medium,
    /// Warrants immediate attention.
    High,
}

impl AlertSeverity {
    /// The canonical wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Low => "LOW",
            AlertSeverity::Medium => "MEDIUM",
            AlertSeverity::High => "HIGH",
        }
    }
}

impl FromStr for AlertSeverity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LOW" => Ok(AlertSeverity::Low),
            "MEDIUM" => Ok(AlertSeverity::Medium),
            "HIGH" => Ok(AlertSeverity::High),
            other => Err(format!("unknown alert severity '{other}'")),
        }
    }
}

/// Acknowledgement state. Alerts transition `new -> acknowledged` once and
/// are otherwise immutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    /// Not yet reviewed.
    New,
    /// Reviewed by an operator.
    Acknowledged,
}

impl AlertStatus {
    /// The canonical wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::New => "new",
            AlertStatus::Acknowledged => "acknowledged",
        }
    }
}

impl FromStr for AlertStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(AlertStatus::New),
            "acknowledged" => Ok(AlertStatus::Acknowledged),
            other => Err(format!("unknown alert status '{other}'")),
        }
    }
}

/// An alert before persistence assigns its id, timestamp and status.
#[derive(Debug, Clone)]
pub struct NewAlert {
    /// Target the alert concerns.
    pub target: String,
    /// The rule that fired.
    pub alert_type: AlertType,
    /// Severity of the finding.
    pub severity: AlertSeverity,
    /// Human-readable explanation.
    pub reason: String,
    /// Threat score of the triggering scan.
    pub threat_score: Option<u8>,
    /// Threat score of the comparison baseline.
    pub previous_score: Option<u8>,
    /// Score delta for threat-increase alerts.
    pub score_increase: Option<u8>,
    /// Rule-specific payload.
    pub details: serde_json::Value,
}

/// A persisted alert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    /// Opaque alert id.
    pub id: i64,
    /// Target the alert concerns.
    pub target: String,
    /// The rule that fired.
    pub alert_type: AlertType,
    /// Severity of the finding.
    pub severity: AlertSeverity,
    /// Human-readable explanation.
    pub reason: String,
    /// Threat score of the triggering scan.
    pub threat_score: Option<u8>,
    /// Threat score of the comparison baseline.
    pub previous_score: Option<u8>,
    /// Score delta for threat-increase alerts.
    pub score_increase: Option<u8>,
    /// Rule-specific payload.
    pub details: serde_json::Value,
    /// When the alert was raised.
    pub timestamp: DateTime<Utc>,
    /// Acknowledgement state.
    pub status: AlertStatus,
}
