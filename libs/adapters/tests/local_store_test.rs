//! Integration tests for the file-backed adapter bundle.

use chrono::Utc;
use oracle_adapters::local::local_bundle;
use oracle_adapters::{BaselineMetadata, BaselineStorage, BlockCounter, ConsentStore, FpStore, SecretStore};
use oracle_models::{ConsentRecord, ConsentResource, ConsentType, FpEvent};
use std::sync::Arc;

fn event(id: &str, rule: &str) -> FpEvent {
    FpEvent {
        event_id: id.to_string(),
        rule_id: rule.to_string(),
        rule_version: "1".to_string(),
        finding_id: format!("f-{id}"),
        org_id_hash: "a".repeat(64),
        timestamp: Utc::now(),
        is_false_positive: false,
        reviewed_by: None,
        ticket: None,
        consent: ConsentType::Explicit,
        expires_at: None,
    }
}

#[tokio::test]
async fn test_concurrent_counter_increments_are_not_lost() {
    let dir = tempfile::tempdir().unwrap();
    let (_fp, _consent, counter, _secrets, _baselines) = local_bundle(dir.path()).unwrap();
    let counter = Arc::new(counter);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let counter = counter.clone();
        handles.push(tokio::spawn(async move {
            for _ in 0..25 {
                counter.increment("MD-002", 3600).await.unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(counter.get("MD-002", 3600).await.unwrap(), 200);
}

#[tokio::test]
async fn test_concurrent_event_records_with_duplicates() {
    let dir = tempfile::tempdir().unwrap();
    let (fp, _consent, _counter, _secrets, _baselines) = local_bundle(dir.path()).unwrap();
    let fp = Arc::new(fp);

    // Two writers race on the same event ids; the window must contain each
    // id exactly once.
    let mut handles = Vec::new();
    for _ in 0..2 {
        let fp = fp.clone();
        handles.push(tokio::spawn(async move {
            for i in 0..20 {
                fp.record_event(event(&format!("e{i}"), "MD-001")).await.unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let window = fp.window_by_count("MD-001", 100).await.unwrap();
    assert_eq!(window.total(), 20);
}

#[tokio::test]
async fn test_bundle_stores_are_independent() {
    let dir = tempfile::tempdir().unwrap();
    let (fp, consent, counter, secrets, baselines) = local_bundle(dir.path()).unwrap();

    fp.record_event(event("e1", "MD-001")).await.unwrap();
    consent
        .grant_consent(ConsentRecord {
            org_id: "org-1".to_string(),
            repo_id: None,
            resource: ConsentResource::FpMetrics,
            consent_type: ConsentType::Explicit,
            granted_at: Utc::now(),
            expires_at: None,
            revoked_at: None,
            grantor: "admin".to_string(),
        })
        .await
        .unwrap();
    counter.increment("MD-001", 3600).await.unwrap();
    secrets.rotate(&"ab".repeat(32)).await.unwrap();
    baselines
        .put(
            "main",
            b"{\"metric\":3.0}",
            BaselineMetadata {
                content_type: "application/json".to_string(),
                created_at: Utc::now(),
                labels: Default::default(),
            },
        )
        .await
        .unwrap();

    // Each store landed in its own subdirectory.
    for sub in ["fp_events", "consent", "block_counter", "secrets", "baselines"] {
        assert!(dir.path().join(sub).is_dir(), "missing {sub}");
    }

    assert_eq!(fp.window_by_count("MD-001", 10).await.unwrap().total(), 1);
    assert!(consent
        .has_consent("org-1", ConsentResource::FpMetrics, Some("any-repo"))
        .await
        .unwrap());
    assert_eq!(counter.get("MD-001", 3600).await.unwrap(), 1);
    assert_eq!(secrets.get_nonce(None).await.unwrap().unwrap().version, 1);
    assert!(baselines.get("main").await.unwrap().is_some());
}

#[tokio::test]
async fn test_no_temp_files_survive_writes() {
    let dir = tempfile::tempdir().unwrap();
    let (fp, _consent, _counter, _secrets, _baselines) = local_bundle(dir.path()).unwrap();
    for i in 0..10 {
        fp.record_event(event(&format!("e{i}"), "MD-001")).await.unwrap();
    }

    let mut stack = vec![dir.path().to_path_buf()];
    while let Some(path) = stack.pop() {
        for entry in std::fs::read_dir(&path).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                stack.push(path);
            } else {
                assert_ne!(
                    path.extension().and_then(|e| e.to_str()),
                    Some("tmp"),
                    "leftover temp file: {path:?}"
                );
            }
        }
    }
}
