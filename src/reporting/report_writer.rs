//! Report writing functionality

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::core::context::{Failure, FailureDetail, FailureKind, ValidationContext};

/// Renders part of the accumulated failures
///
/// Reporters mark what they render as processed so later reporters can
/// skip it.
pub trait Reporter {
    /// Lower values report first
    fn priority(&self) -> u32;

    fn report(&self, ctx: &ValidationContext, out: &mut dyn Write) -> io::Result<()>;
}

/// Missing and mismatching sidecar checksums
pub struct ChecksumReporter;

impl Reporter for ChecksumReporter {
    fn priority(&self) -> u32 {
        200
    }

    fn report(&self, ctx: &ValidationContext, out: &mut dyn Write) -> io::Result<()> {
        let missing = pending(ctx, FailureKind::ChecksumMissing);
        let mismatched = pending(ctx, FailureKind::ChecksumMismatch);
        if missing.is_empty() && mismatched.is_empty() {
            return Ok(());
        }

        writeln!(out, "--- CHECKSUM REPORT ---")?;

        if !missing.is_empty() {
            writeln!(out, "Found {} missing checksums.", missing.len())?;
            for failure in &missing {
                if let FailureDetail::ChecksumMissing { algorithm } = &failure.detail {
                    writeln!(out, "{} missing {}", failure.path, algorithm)?;
                }
                ctx.mark_processed(failure);
            }
        }

        if !mismatched.is_empty() {
            writeln!(out, "Found {} not matching checksums.", mismatched.len())?;
            for failure in &mismatched {
                if let FailureDetail::ChecksumMismatch {
                    algorithm,
                    computed,
                    expected,
                } = &failure.detail
                {
                    writeln!(
                        out,
                        "{} not match {} (computed {}, expected {})",
                        failure.path, algorithm, computed, expected
                    )?;
                }
                ctx.mark_processed(failure);
            }
        }

        writeln!(out)?;
        out.flush()
    }
}

/// Collisions and failed probes against the remote repository
pub struct CollisionReporter;

impl Reporter for CollisionReporter {
    fn priority(&self) -> u32 {
        300
    }

    fn report(&self, ctx: &ValidationContext, out: &mut dyn Write) -> io::Result<()> {
        let sections = [
            (FailureKind::RemoteCollision, "remote collisions"),
            (FailureKind::RemoteUnexpectedStatus, "unexpected remote responses"),
            (FailureKind::RemoteRequestFailed, "failed remote requests"),
        ];
        let groups: Vec<_> = sections
            .iter()
            .map(|(kind, label)| (pending(ctx, *kind), *label))
            .collect();
        if groups.iter().all(|(failures, _)| failures.is_empty()) {
            return Ok(());
        }

        writeln!(out, "--- REMOTE REPOSITORY COLLISION REPORT ---")?;
        for (failures, label) in groups.iter().filter(|(f, _)| !f.is_empty()) {
            writeln!(out, "Found {} {}.", failures.len(), label)?;
            for failure in failures {
                writeln!(out, "{}", failure)?;
                ctx.mark_processed(failure);
            }
        }

        writeln!(out)?;
        out.flush()
    }
}

/// Whatever no other reporter rendered
pub struct DefaultReporter;

impl Reporter for DefaultReporter {
    fn priority(&self) -> u32 {
        u32::MAX
    }

    fn report(&self, ctx: &ValidationContext, out: &mut dyn Write) -> io::Result<()> {
        let remaining = ctx.unprocessed_failures();
        if remaining.is_empty() {
            return Ok(());
        }

        writeln!(out, "--- OTHER FAILURES ---")?;
        for failure in &remaining {
            writeln!(out, "[{}] {}", failure.check.name(), failure)?;
            ctx.mark_processed(failure);
        }

        writeln!(out)?;
        out.flush()
    }
}

fn pending(ctx: &ValidationContext, kind: FailureKind) -> Vec<Failure> {
    ctx.failures_of_kind(kind)
        .into_iter()
        .filter(|f| !ctx.is_processed(f))
        .collect()
}

/// Checksum, collision and catch-all reporters
pub fn default_reporters() -> Vec<Box<dyn Reporter>> {
    vec![
        Box::new(ChecksumReporter),
        Box::new(CollisionReporter),
        Box::new(DefaultReporter),
    ]
}

/// Run reporters in ascending priority order
pub fn run_reporters(
    mut reporters: Vec<Box<dyn Reporter>>,
    ctx: &ValidationContext,
    out: &mut dyn Write,
) -> io::Result<()> {
    reporters.sort_by_key(|r| r.priority());
    for reporter in &reporters {
        reporter.report(ctx, out)?;
    }
    Ok(())
}

/// Write a text report of the run to a file
///
/// # Arguments
/// * `output_path` - Path to output file
/// * `ctx` - Context holding the run's failures
/// * `reporters` - Reporters rendering the failure sections
pub fn write_report(
    output_path: &Path,
    ctx: &ValidationContext,
    reporters: Vec<Box<dyn Reporter>>,
) -> Result<()> {
    let file = File::create(output_path)
        .with_context(|| format!("Failed to create report {}", output_path.display()))?;
    let mut out = BufWriter::new(file);

    let reported = ctx.reported_failures().len();
    let ignored = ctx.ignored_failures().len();

    writeln!(out, "Repository Validation Report")?;
    writeln!(out, "============================")?;
    writeln!(out, "Repository: {}", ctx.root().display())?;
    writeln!(out)?;
    writeln!(out, "Summary Statistics:")?;
    writeln!(out, "-------------------")?;
    writeln!(out, "  Reported failures: {}", reported)?;
    writeln!(out, "  Ignored failures: {}", ignored)?;
    writeln!(out)?;

    run_reporters(reporters, ctx, &mut out).context("Failed to write report sections")?;
    out.flush()?;
    Ok(())
}

#[derive(Serialize)]
struct JsonReport<'a> {
    repository: String,
    reported: &'a [Failure],
    ignored: &'a [Failure],
}

/// Write reported and ignored failures as JSON
pub fn write_json_report(output_path: &Path, ctx: &ValidationContext) -> Result<()> {
    let reported = ctx.reported_failures();
    let ignored = ctx.ignored_failures();
    let report = JsonReport {
        repository: ctx.root().display().to_string(),
        reported: &reported,
        ignored: &ignored,
    };

    let file = File::create(output_path)
        .with_context(|| format!("Failed to create JSON report {}", output_path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), &report)
        .context("Failed to write JSON report")?;
    Ok(())
}
