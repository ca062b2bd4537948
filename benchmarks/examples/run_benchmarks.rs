use oracle_benchmarks::{io, markdown, run_all};
use std::path::Path;

/// Run every benchmark target and persist the artifacts.
fn main() -> std::io::Result<()> {
    println!("governance-oracle benchmarks\n");

    let reports = run_all();
    let (json_path, md_path) = io::save_artifacts(&reports, Path::new("benchmarks/output"))?;

    println!("\n{}", markdown::generate_summary(&reports));
    println!("raw:    {}", json_path.display());
    println!("report: {}", md_path.display());
    Ok(())
}
