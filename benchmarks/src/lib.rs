pub mod io;
pub mod markdown;
pub mod result;
pub mod targets;

pub use result::TargetReport;

use std::time::Instant;

/// Run every registered target, timing each one from the outside, and
/// print a one-line summary per target as it completes.
pub fn run_all() -> Vec<TargetReport> {
    let mut reports = Vec::new();
    for target in targets::registry() {
        let started = Instant::now();
        let metrics = target.run();
        let report = TargetReport::new(target.id(), metrics, started.elapsed());
        println!(
            "{:<16} {:>6} ms   {}",
            report.target_id,
            report.elapsed_ms,
            report.headline()
        );
        reports.push(report);
    }
    reports
}
