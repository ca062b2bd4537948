use super::{ensure_dir, list_json_files, read_json, sanitize, write_json_atomic, StoreLock};
use crate::FpStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use oracle_common::Result;
use oracle_models::{FpEvent, FpWindow};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

/// Review label for a finding, stored separately from the event stream so
/// `is_false_positive` is a point lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct FpLabel {
    finding_id: String,
    reviewer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    ticket: Option<String>,
    labeled_at: DateTime<Utc>,
}

/// File-backed [`FpStore`]: one file per event under `fp_events/`, one
/// label file per finding under `fp_events/labels/`.
pub struct LocalFpStore {
    dir: PathBuf,
    labels_dir: PathBuf,
    lock: StoreLock,
}

impl LocalFpStore {
    pub fn new(dir: PathBuf, lock: StoreLock) -> Result<Self> {
        ensure_dir(&dir)?;
        let labels_dir = dir.join("labels");
        ensure_dir(&labels_dir)?;
        Ok(Self {
            dir,
            labels_dir,
            lock,
        })
    }

    fn event_path(&self, event_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize(event_id)))
    }

    fn label_path(&self, finding_id: &str) -> PathBuf {
        self.labels_dir.join(format!("{}.json", sanitize(finding_id)))
    }

    fn load_rule_events(&self, rule_id: &str) -> Result<Vec<FpEvent>> {
        let mut events = Vec::new();
        for path in list_json_files(&self.dir)? {
            if let Some(event) = read_json::<FpEvent>(&path)? {
                if event.rule_id == rule_id {
                    events.push(event);
                }
            }
        }
        // Cross-request ordering contract: (rule_id, timestamp, event_id),
        // ties broken by event_id.
        events.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.event_id.cmp(&b.event_id))
        });
        Ok(events)
    }
}

#[async_trait]
impl FpStore for LocalFpStore {
    async fn record_event(&self, event: FpEvent) -> Result<()> {
        let _guard = self.lock.lock();
        let path = self.event_path(&event.event_id);
        if path.exists() {
            debug!(event_id = %event.event_id, "duplicate fp event ignored");
            return Ok(());
        }
        write_json_atomic(&path, &event)
    }

    async fn mark_false_positive(
        &self,
        finding_id: &str,
        reviewer: &str,
        ticket: Option<&str>,
    ) -> Result<()> {
        let _guard = self.lock.lock();
        let label = FpLabel {
            finding_id: finding_id.to_string(),
            reviewer: reviewer.to_string(),
            ticket: ticket.map(str::to_string),
            labeled_at: Utc::now(),
        };
        write_json_atomic(&self.label_path(finding_id), &label)
    }

    async fn is_false_positive(&self, finding_id: &str) -> Result<bool> {
        let _guard = self.lock.lock();
        Ok(self.label_path(finding_id).exists())
    }

    async fn window_by_count(&self, rule_id: &str, n: u32) -> Result<FpWindow> {
        let _guard = self.lock.lock();
        let mut events = self.load_rule_events(rule_id)?;
        let keep = n as usize;
        if events.len() > keep {
            events.drain(..events.len() - keep);
        }
        Ok(FpWindow {
            rule_id: rule_id.to_string(),
            events,
        })
    }

    async fn window_by_since(&self, rule_id: &str, since: DateTime<Utc>) -> Result<FpWindow> {
        let _guard = self.lock.lock();
        let mut events = self.load_rule_events(rule_id)?;
        events.retain(|e| e.timestamp >= since);
        Ok(FpWindow {
            rule_id: rule_id.to_string(),
            events,
        })
    }
}
