use std::path::{Path, PathBuf};
use std::process::ExitCode;

use pdf_shrink::config::job::JobFile;
use pdf_shrink::config::merged::MergedConfig;
use pdf_shrink::config::{self};
use pdf_shrink::pipeline::job_runner::{JobConfig, JobResult};
use pdf_shrink::pipeline::orchestrator::run_all_jobs;
use pdf_shrink::pipeline::supervisor::CompressionOutcome;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();

    if args.is_empty() || args.iter().any(|a| a == "--help" || a == "-h") {
        eprintln!("Usage: pdf_shrink [--json] <jobs.yaml>...");
        eprintln!("  Compress PDF, image and video files according to job specifications.");
        return if args.is_empty() {
            ExitCode::FAILURE
        } else {
            ExitCode::SUCCESS
        };
    }

    if args.iter().any(|a| a == "--version" || a == "-V") {
        eprintln!("pdf_shrink {}", env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let json = args.iter().any(|a| a == "--json");
    let job_files: Vec<&String> = args.iter().filter(|a| !a.starts_with("--")).collect();
    if job_files.is_empty() {
        eprintln!("ERROR: No job file given");
        return ExitCode::FAILURE;
    }

    // Collect job configs from all job files, keeping the largest worker count.
    let mut job_configs: Vec<JobConfig> = Vec::new();
    let mut parallel_workers = 0;

    for job_file_arg in job_files {
        let job_file_path = Path::new(job_file_arg);

        // Load settings from the same directory as the job file.
        let settings = match config::load_settings_for_job(job_file_path) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("ERROR: Failed to load settings for {job_file_arg}: {e}");
                return ExitCode::FAILURE;
            }
        };

        let yaml_content = match std::fs::read_to_string(job_file_path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("ERROR: Failed to read job file {job_file_arg}: {e}");
                return ExitCode::FAILURE;
            }
        };

        let job_file = match JobFile::from_yaml(&yaml_content) {
            Ok(jf) => jf,
            Err(e) => {
                eprintln!("ERROR: Failed to parse job file {job_file_arg}: {e}");
                return ExitCode::FAILURE;
            }
        };

        // Resolve job file directory for relative paths.
        let job_dir = job_file_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();

        for job in &job_file.jobs {
            let merged = MergedConfig::new(&settings, job);
            parallel_workers = parallel_workers.max(merged.parallel_workers);
            job_configs.push(JobConfig {
                input_path: resolve_path(&job_dir, &job.input),
                output_path: resolve_path(&job_dir, &job.output),
                compression: merged.compression,
                engine: merged.engine,
            });
        }
    }

    let results = run_all_jobs(&job_configs, parallel_workers);

    let mut has_error = false;
    for (job, result) in job_configs.iter().zip(&results) {
        if result.is_err() {
            has_error = true;
        }
        if json {
            println!("{}", json_line(job, result));
        } else {
            print_line(job, result);
        }
    }

    if has_error {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn print_line(job: &JobConfig, result: &pdf_shrink::Result<JobResult>) {
    match result {
        Ok(JobResult {
            outcome:
                CompressionOutcome::Success {
                    original_size,
                    compressed_size,
                    strategy,
                    profile,
                    ..
                },
            ..
        }) => {
            let saved = 100.0 * (1.0 - *compressed_size as f64 / *original_size as f64);
            eprintln!(
                "OK: {} -> {} ({} -> {} bytes, -{:.1}%, {} / {})",
                job.input_path.display(),
                job.output_path.display(),
                original_size,
                compressed_size,
                saved,
                profile,
                strategy
            );
        }
        Ok(JobResult {
            outcome: CompressionOutcome::Skipped { reason, input_size },
            ..
        }) => {
            eprintln!(
                "SKIPPED: {} ({}, {} bytes)",
                job.input_path.display(),
                reason,
                input_size
            );
        }
        Err(e) => {
            eprintln!(
                "ERROR: {} -> {}: {e}",
                job.input_path.display(),
                job.output_path.display()
            );
        }
    }
}

fn json_line(job: &JobConfig, result: &pdf_shrink::Result<JobResult>) -> serde_json::Value {
    match result {
        Ok(r) => serde_json::json!({
            "input": job.input_path,
            "output": job.output_path,
            "result": r.outcome,
        }),
        Err(e) => serde_json::json!({
            "input": job.input_path,
            "output": job.output_path,
            "result": { "outcome": "error", "error": e.to_string() },
        }),
    }
}

/// Resolve a potentially relative path against a base directory.
/// If the path is already absolute, return it as-is.
fn resolve_path(base_dir: &Path, path: &str) -> PathBuf {
    let p = Path::new(path);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        base_dir.join(p)
    }
}
