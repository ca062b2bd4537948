//! FP calibration.
//!
//! Windowed FPR arithmetic, privacy-preserving cross-org aggregation, and
//! the promotion/demotion rules that decide whether a Tier B rule has
//! earned the right to block.

use chrono::{DateTime, Duration, Utc};
use oracle_common::{OracleError, Result};
use oracle_models::{FpEvent, FpWindow, RuleDefinition, RuleTier, Severity};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Share of contributors dropped from the bottom of the reputation
/// ordering when Byzantine filtering is on.
const BYZANTINE_TRIM_RATIO: f64 = 0.2;

/// MAD multiplier beyond which a contribution is flagged as an outlier.
const OUTLIER_MAD_FACTOR: f64 = 3.0;

/// One org's contribution to a cross-org aggregate. Identities are
/// salted hashes; the raw org id never reaches this layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrgSample {
    pub org_id_hash: String,
    pub value: f64,
    pub reputation: f64,
    pub sample_size: u32,
}

/// Result of a k-anonymous aggregation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateResult {
    /// Mean of the surviving contributions.
    pub value: f64,
    pub org_count: u32,
    /// Org hashes whose contribution sat more than 3 MAD from the median.
    pub outlier_org_hashes: Vec<String>,
}

/// Cross-org calibration queries.
pub struct CalibrationStore {
    k_anonymity: u32,
}

impl CalibrationStore {
    pub fn new(k_anonymity: u32) -> Self {
        Self { k_anonymity }
    }

    /// Aggregate per-org values. Refuses with `K_ANONYMITY_NOT_MET` unless
    /// at least `k` distinct orgs contribute; the error carries only the
    /// count, never identities.
    pub fn aggregate(&self, samples: &[OrgSample], byzantine_filter: bool) -> Result<AggregateResult> {
        let mut distinct: Vec<&OrgSample> = Vec::new();
        for sample in samples {
            if !distinct.iter().any(|s| s.org_id_hash == sample.org_id_hash) {
                distinct.push(sample);
            }
        }

        let org_count = distinct.len() as u32;
        if org_count < self.k_anonymity {
            return Err(OracleError::KAnonymityNotMet { org_count });
        }

        let mut surviving: Vec<&OrgSample> = distinct;
        if byzantine_filter {
            surviving.sort_by(|a, b| {
                a.reputation
                    .partial_cmp(&b.reputation)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            let trim = ((surviving.len() as f64) * BYZANTINE_TRIM_RATIO).floor() as usize;
            surviving.drain(..trim);
            debug!(trimmed = trim, "byzantine filter dropped low-reputation contributors");
        }

        let values: Vec<f64> = surviving.iter().map(|s| s.value).collect();
        let med = median(&values);
        let mad = median(&values.iter().map(|v| (v - med).abs()).collect::<Vec<_>>());

        let outlier_org_hashes = surviving
            .iter()
            .filter(|s| mad > 0.0 && (s.value - med).abs() > OUTLIER_MAD_FACTOR * mad)
            .map(|s| s.org_id_hash.clone())
            .collect();

        let value = values.iter().sum::<f64>() / values.len() as f64;
        Ok(AggregateResult {
            value,
            org_count,
            outlier_org_hashes,
        })
    }
}

fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Runtime evidence backing a Tier B promotion decision.
#[derive(Debug, Clone)]
pub struct PromotionEvidence {
    pub warn_since: DateTime<Utc>,
    pub red_team_cases_verified: u32,
}

/// The highest severity a rule's findings may carry right now.
///
/// Tier A rules keep their declared severity. A Tier B rule is promoted to
/// its declared severity only when every promotion criterion holds over
/// the supplied window and evidence; any missing or failing condition
/// demotes to `warn`.
pub fn effective_severity(
    def: &RuleDefinition,
    window: Option<&FpWindow>,
    evidence: Option<&PromotionEvidence>,
    now: DateTime<Utc>,
) -> Severity {
    if def.tier == RuleTier::A {
        return def.severity;
    }

    let warn_cap = def.severity.min(Severity::Warn);
    let (Some(window), Some(evidence)) = (window, evidence) else {
        return warn_cap;
    };

    let criteria = &def.promotion_criteria;
    let days_in_warn = (now - evidence.warn_since).num_days();

    let promoted = window.total() >= criteria.min_window_n
        && window.observed_fpr() <= criteria.max_observed_fpr
        && days_in_warn >= i64::from(criteria.min_days_in_warn)
        && evidence.red_team_cases_verified >= criteria.min_red_team_cases;

    if promoted {
        def.severity
    } else {
        warn_cap
    }
}

/// Build per-org FPR samples from rule windows for cross-org
/// aggregation. Events whose consent type is `none` never leave their
/// tenant; an org with no consented events contributes nothing. Each org
/// contributes at most one sample.
pub fn fp_metric_samples(windows: &[FpWindow], default_reputation: f64) -> Vec<OrgSample> {
    let mut per_org: Vec<(String, u32, u32)> = Vec::new();
    for window in windows {
        for event in &window.events {
            if event.consent == oracle_models::ConsentType::None {
                continue;
            }
            match per_org.iter_mut().find(|(org, _, _)| *org == event.org_id_hash) {
                Some((_, fp, total)) => {
                    *total += 1;
                    if event.is_false_positive {
                        *fp += 1;
                    }
                }
                None => per_org.push((
                    event.org_id_hash.clone(),
                    u32::from(event.is_false_positive),
                    1,
                )),
            }
        }
    }
    per_org
        .into_iter()
        .map(|(org_id_hash, fp, total)| OrgSample {
            org_id_hash,
            value: f64::from(fp) / f64::from(total),
            reputation: default_reputation,
            sample_size: total,
        })
        .collect()
}

/// Randomize an event timestamp uniformly within the batch window before
/// persistence, defeating timing correlation across contributors.
pub fn randomize_timestamp(event: &mut FpEvent, batch_window_ms: u64) {
    if batch_window_ms == 0 {
        return;
    }
    let offset = rand::thread_rng().gen_range(0..batch_window_ms) as i64;
    event.timestamp = event.timestamp - Duration::milliseconds(offset);
}
