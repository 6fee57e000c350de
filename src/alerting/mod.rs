//! The alert engine: derives alerts from a freshly persisted scan.
//!
//! Within one scan at most one alert fires per rule, except IOC reuse which
//! raises one alert per reused indicator. Alert writes never fail the scan:
//! a failed write is retried once, then dropped with a log entry.

use std::sync::Arc;

use serde_json::json;

use crate::{
    correlation::ReuseSignal,
    models::{
        alert::{Alert, AlertSeverity, AlertType, NewAlert},
        scan::{RiskLevel, ScanRecord},
    },
    persistence::traits::Store,
};

/// Minimum score delta versus the prior ONLINE scan to raise an alert.
const THREAT_INCREASE_THRESHOLD: i32 = 20;

/// Evaluates alert rules and persists the results.
pub struct AlertEngine {
    store: Arc<dyn Store>,
}

impl AlertEngine {
    /// Creates an engine over the given store.
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Runs all rules for a persisted scan and writes the resulting alerts.
    pub async fn process(&self, curr: &ScanRecord, reuse_signals: &[ReuseSignal]) -> Vec<Alert> {
        let prev_any = match self.store.previous_scan(&curr.fingerprint, curr.id).await {
            Ok(prev) => prev,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load prior scan for alerting");
                None
            }
        };
        let prev_online =
            match self.store.previous_online_scan(&curr.fingerprint, curr.id).await {
                Ok(prev) => prev,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to load prior ONLINE scan for alerting");
                    None
                }
            };

        let new_alerts = evaluate(curr, prev_any.as_ref(), prev_online.as_ref(), reuse_signals);

        let mut persisted = Vec::new();
        for alert in new_alerts {
            if let Some(alert) = self.put_with_retry(alert).await {
                tracing::warn!(
                    alert_type = %alert.alert_type,
                    severity = alert.severity.as_str(),
                    target = %alert.target,
                    "Alert raised"
                );
                persisted.push(alert);
            }
        }
        persisted
    }

    async fn put_with_retry(&self, alert: NewAlert) -> Option<Alert> {
        match self.store.put_alert(alert.clone()).await {
            Ok(stored) => Some(stored),
            Err(first) => {
                tracing::warn!(error = %first, "Alert write failed, retrying once");
                match self.store.put_alert(alert).await {
                    Ok(stored) => Some(stored),
                    Err(second) => {
                        tracing::error!(error = %second, "Alert write failed twice, dropping");
                        None
                    }
                }
            }
        }
    }
}

/// Applies the alert rules. Pure; ordering is malware, threat increase,
/// status change, content change, then IOC reuse.
pub fn evaluate(
    curr: &ScanRecord,
    prev_any: Option<&ScanRecord>,
    prev_online: Option<&ScanRecord>,
    reuse_signals: &[ReuseSignal],
) -> Vec<NewAlert> {
    let mut alerts = Vec::new();

    if curr.threat_indicators.malware_detected {
        let names: Vec<String> = curr
            .file_analyses
            .iter()
            .flat_map(|fa| fa.malware.threats.iter().map(|t| t.name.clone()))
            .collect();
        let reason = if names.is_empty() {
            "Malware detected in downloaded files".to_string()
        } else {
            format!("Malware detected: {}", names.join(", "))
        };
        alerts.push(NewAlert {
            target: curr.target.clone(),
            alert_type: AlertType::MalwareDetected,
            severity: AlertSeverity::High,
            reason,
            threat_score: Some(curr.threat_score),
            previous_score: None,
            score_increase: None,
            details: json!({ "threats": names }),
        });
    }

    let mut threat_increase_fired = false;
    if let Some(prev) = prev_online {
        let delta = i32::from(curr.threat_score) - i32::from(prev.threat_score);
        if delta >= THREAT_INCREASE_THRESHOLD {
            threat_increase_fired = true;
            alerts.push(NewAlert {
                target: curr.target.clone(),
                alert_type: AlertType::ThreatIncrease,
                severity: severity_for_risk(curr.risk_level),
                reason: format!(
                    "Threat score increased from {} to {} (+{delta})",
                    prev.threat_score, curr.threat_score
                ),
                threat_score: Some(curr.threat_score),
                previous_score: Some(prev.threat_score),
                score_increase: Some(delta as u8),
                details: json!({ "category": curr.category }),
            });
        }
    }

    if let Some(prev) = prev_any {
        if prev.url_status != curr.url_status {
            alerts.push(NewAlert {
                target: curr.target.clone(),
                alert_type: AlertType::StatusChange,
                severity: AlertSeverity::Medium,
                reason: format!(
                    "URL status changed from {} to {}",
                    prev.url_status, curr.url_status
                ),
                threat_score: Some(curr.threat_score),
                previous_score: None,
                score_increase: None,
                details: json!({
                    "previous_status": prev.url_status,
                    "current_status": curr.url_status,
                }),
            });
        }
    }

    // A LOW content-change alert is absorbed by a simultaneous threat
    // increase.
    if curr.content_changed && !threat_increase_fired {
        alerts.push(NewAlert {
            target: curr.target.clone(),
            alert_type: AlertType::ContentChange,
            severity: AlertSeverity::Low,
            reason: "Page content changed since the previous scan".to_string(),
            threat_score: Some(curr.threat_score),
            previous_score: None,
            score_increase: None,
            details: json!({ "content_hash": curr.content_hash }),
        });
    }

    for signal in reuse_signals {
        alerts.push(NewAlert {
            target: curr.target.clone(),
            alert_type: AlertType::IocReuse,
            severity: signal.severity,
            reason: format!(
                "Indicator {} reused across {} targets",
                signal.ioc_value, signal.reuse_count
            ),
            threat_score: Some(curr.threat_score),
            previous_score: None,
            score_increase: None,
            details: json!({
                "ioc_type": signal.ioc_type,
                "ioc_value": signal.ioc_value,
                "reuse_count": signal.reuse_count,
            }),
        });
    }

    alerts
}

fn severity_for_risk(risk: RiskLevel) -> AlertSeverity {
    match risk {
        RiskLevel::Low => AlertSeverity::Low,
        RiskLevel::Medium => AlertSeverity::Medium,
        RiskLevel::High => AlertSeverity::High,
    }
}
