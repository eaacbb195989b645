use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// Import from our modularized library
use repo_validator_rs::core::collision_validator::DEFAULT_MAX_CONNECTIONS;
use repo_validator_rs::prelude::*;

#[derive(Clone, Copy, ValueEnum)]
enum AlgorithmArg {
    Md5,
    Sha1,
    Sha256,
}

impl From<AlgorithmArg> for ChecksumAlgorithm {
    fn from(arg: AlgorithmArg) -> Self {
        match arg {
            AlgorithmArg::Md5 => ChecksumAlgorithm::Md5,
            AlgorithmArg::Sha1 => ChecksumAlgorithm::Sha1,
            AlgorithmArg::Sha256 => ChecksumAlgorithm::Sha256,
        }
    }
}

#[derive(Parser)]
#[command(name = "repo_validator_rs")]
#[command(about = "Validates a local artifact repository before it is published", long_about = None)]
struct Cli {
    /// Root of the local repository to validate
    directory: PathBuf,

    /// Checksum algorithms whose sidecar files must exist and match
    #[arg(long, value_enum, value_delimiter = ',', default_values = ["md5", "sha1"])]
    algorithms: Vec<AlgorithmArg>,

    /// Skip sidecar checksum validation
    #[arg(long)]
    skip_checksums: bool,

    /// Glob of artifacts to check for checksums (repeatable, default: all)
    #[arg(long = "checksum-include")]
    checksum_include: Vec<String>,

    /// Base URL of the remote repository to check for collisions
    #[arg(long)]
    remote_url: Option<String>,

    /// Glob of artifacts to check against the remote (repeatable, default: all)
    #[arg(long = "collision-include")]
    collision_include: Vec<String>,

    /// Digest compared against the remote repository
    #[arg(long, value_enum, default_value = "sha1")]
    remote_algorithm: AlgorithmArg,

    /// Maximum concurrent connections to the remote repository
    #[arg(long, default_value_t = DEFAULT_MAX_CONNECTIONS)]
    max_connections: usize,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,

    /// JSON file listing exception filters ({"pattern": ..., "kind": ...})
    #[arg(long)]
    filters: Option<PathBuf>,

    /// Number of worker threads for checksum validation (default: number of CPUs)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Output report filename
    #[arg(short, long, default_value = "validation_report.txt")]
    output: PathBuf,

    /// Also write the failures as JSON
    #[arg(long)]
    json_output: Option<PathBuf>,

    /// Run in batch mode (no progress bar)
    #[arg(long)]
    batch: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Set up rayon thread pool
    if let Some(workers) = cli.workers {
        rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build_global()
            .context("Failed to build thread pool")?;
    }

    println!("Repository Validator (Rust Edition)");
    println!("Using {} worker thread(s)", rayon::current_num_threads());
    println!();

    let filters = match cli.filters {
        Some(ref path) => load_filters(path)?,
        None => Vec::new(),
    };
    let ctx = ValidationContext::new(&cli.directory, filters);

    let mut validators: Vec<Box<dyn Validator>> = Vec::new();
    if !cli.skip_checksums {
        let config = ChecksumValidatorConfig {
            algorithms: cli.algorithms.iter().map(|&a| ChecksumAlgorithm::from(a).into()).collect(),
            include: FileFilter::from_patterns(&cli.checksum_include)
                .context("Invalid --checksum-include pattern")?,
            ..Default::default()
        };
        validators.push(Box::new(
            ChecksumValidator::new(config).with_progress(progress_bar(cli.batch, "checksums")?),
        ));
    }
    if let Some(ref remote_url) = cli.remote_url {
        let config = CollisionValidatorConfig {
            include: FileFilter::from_patterns(&cli.collision_include)
                .context("Invalid --collision-include pattern")?,
            max_connections: cli.max_connections,
            request_timeout: Duration::from_secs(cli.timeout_secs),
            ..CollisionValidatorConfig::new(remote_url.as_str())
        };
        let digests = SidecarDigestProvider::new(ChecksumAlgorithm::from(cli.remote_algorithm));
        validators.push(Box::new(
            CollisionValidator::new(config, digests).with_progress(progress_bar(cli.batch, "remote")?),
        ));
    }

    let aborted = run_validators(validators, &ctx);

    let reported = ctx.reported_failures().len();
    let ignored = ctx.ignored_failures().len();

    // Print summary
    println!();
    println!("==================================================");
    println!("VALIDATION COMPLETE");
    println!("==================================================");
    println!("Reported failures: {}", reported);
    println!("Ignored failures: {}", ignored);
    for validator in &aborted {
        eprintln!("Validator '{}' aborted: {}", validator.name, validator.error);
    }
    println!();

    write_report(&cli.output, &ctx, default_reporters())?;
    println!("Detailed report saved to: {:?}", cli.output);

    if let Some(ref json_output) = cli.json_output {
        write_json_report(json_output, &ctx)?;
        println!("JSON report saved to: {:?}", json_output);
    }

    if reported > 0 || !aborted.is_empty() {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn progress_bar(batch: bool, label: &'static str) -> Result<ProgressBar> {
    if batch {
        return Ok(ProgressBar::hidden());
    }
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} {prefix:>9} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%)")
            .context("Invalid progress bar template")?
            .progress_chars("#>-"),
    );
    pb.set_prefix(label);
    Ok(pb)
}

/// Load exception filters from a JSON file
fn load_filters(path: &Path) -> Result<Vec<Box<dyn ExceptionFilter>>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open filter file {}", path.display()))?;
    let configs: Vec<ExceptionFilterConfig> = serde_json::from_reader(file)
        .context("Failed to parse filter file")?;

    let mut filters: Vec<Box<dyn ExceptionFilter>> = Vec::with_capacity(configs.len());
    for config in &configs {
        filters.push(Box::new(config.build()?));
    }
    Ok(filters)
}
