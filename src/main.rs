use anyhow::{bail, Context, Result};
use log::info;
use std::env;
use std::path::Path;
use std::sync::Arc;

use consignado_mapper::{BatchProcessor, JobStore, MappingIndex, UploadedFile};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        eprintln!("Usage: consignado-mapper <reference.csv> <dataset.csv>...");
        eprintln!("       Writes resultado_consolidado_<timestamp>.csv to the current directory.");
        std::process::exit(2);
    }

    run(&args[1], &args[2..])
}

fn run(reference_path: &str, dataset_paths: &[String]) -> Result<()> {
    println!("📇 Loading reference table...");
    let index = MappingIndex::load(Path::new(reference_path))
        .with_context(|| format!("failed to load reference table '{}'", reference_path))?;
    println!("✓ Reference index: {} entries", index.len());

    let mut files = Vec::new();
    for path in dataset_paths {
        let bytes =
            std::fs::read(path).with_context(|| format!("failed to read dataset '{}'", path))?;
        let filename = Path::new(path)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(path)
            .to_string();
        files.push(UploadedFile { filename, bytes });
    }

    let processor = BatchProcessor::new(Arc::new(index));
    let jobs = JobStore::new();
    let job = jobs.create();
    info!("Job {} started for {} file(s)", job.id, files.len());

    println!("\n⚙️  Processing {} file(s)...", files.len());
    let outcome = processor.process_files(&jobs, &job.id, files, Path::new("."))?;

    println!("\n📊 Per-bank summaries:");
    for summary in &outcome.summaries {
        println!(
            "  {}: total {}, duplicates removed {}, mapped {}, unmapped {}",
            summary.bank_name,
            summary.total_records,
            summary.duplicates_removed,
            summary.mapped_records,
            summary.unmapped_records
        );
        let mut statuses: Vec<_> = summary.status_distribution.iter().collect();
        statuses.sort();
        for (status, count) in statuses {
            println!("      {}: {}", status, count);
        }
    }

    let job = jobs
        .get(&outcome.job_id)
        .context("job disappeared from the store")?;
    if !job.is_terminal() {
        bail!("job {} did not reach a terminal state", job.id);
    }

    // Summaries land next to the result file for downstream tooling
    let summary_file = outcome.result_file.with_extension("json");
    std::fs::write(
        &summary_file,
        serde_json::to_string_pretty(&outcome.summaries)?,
    )
    .with_context(|| format!("failed to write {}", summary_file.display()))?;

    println!(
        "\n✅ {} records written to {}",
        outcome.total_records,
        outcome.result_file.display()
    );
    println!("   Summaries at {}", summary_file.display());

    Ok(())
}
