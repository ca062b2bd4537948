//! Artifact persistence for benchmark runs.
//!
//! One run produces a pair of files under the output root: the raw
//! reports as canonical JSON (stable key order, diffable run-to-run)
//! and the rendered markdown summary.

use crate::result::TargetReport;
use crate::markdown;
use std::fs;
use std::io::{Error, ErrorKind};
use std::path::{Path, PathBuf};

/// Write both artifacts for a run and return their paths
/// `(json, markdown)`.
pub fn save_artifacts(reports: &[TargetReport], out_root: &Path) -> std::io::Result<(PathBuf, PathBuf)> {
    let stamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");

    let json_path = out_root.join("raw").join(format!("results_{stamp}.json"));
    fs::create_dir_all(json_path.parent().unwrap_or(Path::new(".")))?;
    let mut lines = Vec::with_capacity(reports.len());
    for report in reports {
        lines.push(
            report
                .to_canonical_json()
                .map_err(|e| Error::new(ErrorKind::InvalidData, e))?,
        );
    }
    // One canonical object per line keeps the artifact append-friendly.
    fs::write(&json_path, lines.join("\n"))?;

    let md_path = out_root.join(format!("report_{stamp}.md"));
    fs::write(&md_path, markdown::generate_report(reports))?;

    Ok((json_path, md_path))
}

/// Read a raw artifact back into reports.
pub fn load_reports(path: &Path) -> std::io::Result<Vec<TargetReport>> {
    let content = fs::read_to_string(path)?;
    content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(|e| Error::new(ErrorKind::InvalidData, e)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let reports = vec![
            TargetReport::new("l0_validation", serde_json::json!({"p99_ns": 42}), Duration::from_millis(3)),
            TargetReport::new("redaction", serde_json::json!({"validate_p99_ns": 1800}), Duration::from_millis(9)),
        ];

        let (json_path, md_path) = save_artifacts(&reports, dir.path()).unwrap();
        assert!(md_path.exists());

        let loaded = load_reports(&json_path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].target_id, "l0_validation");
        assert_eq!(loaded[1].elapsed_ms, 9);
    }
}
