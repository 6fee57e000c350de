//! IOC correlation across targets.
//!
//! Every indicator extracted from an ONLINE scan is appended to the IOC
//! index. When an indicator's reuse set grows to a second (or later) distinct
//! target, a reuse signal is raised for the alert engine.

use std::sync::Arc;

use crate::{
    models::{
        alert::AlertSeverity,
        ioc::{IocObservation, IocType},
        scan::ScanRecord,
    },
    persistence::{error::PersistenceError, traits::Store},
};

/// An indicator newly observed on an additional distinct target.
#[derive(Debug, Clone)]
pub struct ReuseSignal {
    /// Indicator kind.
    pub ioc_type: IocType,
    /// Indicator value.
    pub ioc_value: String,
    /// Distinct targets the indicator has now been seen on.
    pub reuse_count: u32,
    /// Severity of the reuse finding.
    pub severity: AlertSeverity,
}

/// Inserts IOC observations and detects cross-target reuse.
pub struct Correlator {
    store: Arc<dyn Store>,
}

impl Correlator {
    /// Creates a correlator over the given store.
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Records every indicator of a scan and returns the reuse signals that
    /// crossed the alert threshold.
    pub async fn record_iocs(
        &self,
        record: &ScanRecord,
    ) -> Result<Vec<ReuseSignal>, PersistenceError> {
        let mut observations: Vec<(IocType, String)> = Vec::new();
        observations
            .extend(record.emails.iter().map(|email| (IocType::Email, email.clone())));
        observations
            .extend(record.crypto_addresses.iter().map(|addr| (IocType::Crypto, addr.clone())));
        observations.extend(
            record.file_analyses.iter().map(|fa| (IocType::FileHash, fa.file_hash.clone())),
        );

        let mut signals = Vec::new();
        for (ioc_type, ioc_value) in observations {
            let observation = IocObservation {
                ioc_type,
                ioc_value: ioc_value.clone(),
                target: record.target.clone(),
                timestamp: record.timestamp,
            };
            let reuse = self.store.ioc_upsert(&observation).await?;

            if reuse.distinct_targets >= 2 && !reuse.target_was_known {
                tracing::warn!(
                    ioc_type = %ioc_type,
                    reuse_count = reuse.distinct_targets,
                    "IOC reuse detected across targets"
                );
                signals.push(ReuseSignal {
                    ioc_type,
                    ioc_value,
                    reuse_count: reuse.distinct_targets,
                    severity: severity_for(ioc_type),
                });
            }
        }
        Ok(signals)
    }
}

fn severity_for(ioc_type: IocType) -> AlertSeverity {
    match ioc_type {
        IocType::Email | IocType::Crypto => AlertSeverity::High,
        IocType::FileHash => AlertSeverity::Medium,
    }
}
