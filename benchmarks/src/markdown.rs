use crate::result::TargetReport;

/// Render the markdown report for one benchmark run.
pub fn generate_report(reports: &[TargetReport]) -> String {
    let mut out = String::new();

    out.push_str("# Oracle Benchmark Results\n\n");
    out.push_str(&format!("Generated at: {}\n\n", chrono::Utc::now().to_rfc3339()));
    out.push_str(&format!("Total benchmarks: {}\n\n", reports.len()));

    out.push_str("## Summary\n\n");
    out.push_str("| Target | Elapsed | Headline |\n");
    out.push_str("|--------|---------|----------|\n");
    for report in reports {
        out.push_str(&format!(
            "| {} | {} ms | {} |\n",
            report.target_id,
            report.elapsed_ms,
            report.headline()
        ));
    }
    out.push('\n');

    out.push_str("## Detailed Results\n\n");
    for report in reports {
        out.push_str(&format!("### {}\n\n", report.target_id));
        out.push_str(&format!("Ran at: {}\n\n", report.ran_at.to_rfc3339()));
        out.push_str("```json\n");
        out.push_str(&serde_json::to_string_pretty(&report.metrics).unwrap_or_default());
        out.push_str("\n```\n\n");
    }

    out
}

/// Compact plain-text summary for terminal output.
pub fn generate_summary(reports: &[TargetReport]) -> String {
    let mut out = format!("Total Benchmarks: {}\n", reports.len());
    for report in reports {
        out.push_str(&format!("  {}: {}\n", report.target_id, report.headline()));
    }
    out
}
