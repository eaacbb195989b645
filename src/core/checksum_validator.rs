//! Sidecar checksum validation

use indicatif::{ParallelProgressIterator, ProgressBar};
use rayon::prelude::*;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

use super::context::{CheckKind, FailureDetail, ValidationContext};
use super::digest::{compute_digests, digests_equal, read_sidecar, AlgorithmSpec};
use super::runner::{Validator, ValidatorError};
use crate::scanner::file_scanner::{collect_files, Artifact, FileFilter};

/// Marker files that are never artifacts
pub const EXCLUDED_FILES: &[&str] = &[".maven-repository"];

#[derive(Debug, Clone)]
pub struct ChecksumValidatorConfig {
    pub algorithms: Vec<AlgorithmSpec>,
    pub include: FileFilter,
    pub excluded_names: Vec<String>,
}

impl Default for ChecksumValidatorConfig {
    fn default() -> Self {
        Self {
            algorithms: AlgorithmSpec::default_set(),
            include: FileFilter::all(),
            excluded_names: EXCLUDED_FILES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Verifies every artifact has a matching sidecar for every algorithm
pub struct ChecksumValidator {
    config: ChecksumValidatorConfig,
    progress: ProgressBar,
}

impl ChecksumValidator {
    pub fn new(config: ChecksumValidatorConfig) -> Self {
        Self {
            config,
            progress: ProgressBar::hidden(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    fn is_sidecar(&self, file_name: &str) -> bool {
        self.config
            .algorithms
            .iter()
            .any(|spec| file_name.ends_with(&spec.suffix))
    }

    fn is_excluded(&self, file_name: &str) -> bool {
        self.config.excluded_names.iter().any(|n| n == file_name)
    }

    /// Artifacts passing the inclusion filter that are neither sidecars nor
    /// excluded marker files, in walk order
    pub fn find_artifacts(&self, root: &Path) -> Result<Vec<Artifact>, ValidatorError> {
        let artifacts = collect_files(root, |name, relative| {
            self.config.include.accepts(relative)
                && !self.is_sidecar(name)
                && !self.is_excluded(name)
        })?;
        Ok(artifacts)
    }

    /// Compare one artifact against its sidecars
    ///
    /// # Errors
    /// Returns the I/O error if the artifact itself cannot be read. Missing
    /// or unreadable sidecars are reported as failures instead.
    pub fn check_artifact(&self, artifact: &Artifact) -> io::Result<Vec<FailureDetail>> {
        let algorithms: Vec<_> = self.config.algorithms.iter().map(|s| s.algorithm).collect();
        let computed = compute_digests(&artifact.path, &algorithms)?;

        let mut failures = Vec::new();
        for (spec, computed) in self.config.algorithms.iter().zip(computed) {
            match read_sidecar(&sidecar_path(&artifact.path, &spec.suffix)) {
                Err(_) => failures.push(FailureDetail::ChecksumMissing {
                    algorithm: spec.algorithm,
                }),
                Ok(expected) if !digests_equal(&computed, &expected) => {
                    failures.push(FailureDetail::ChecksumMismatch {
                        algorithm: spec.algorithm,
                        computed,
                        expected,
                    })
                }
                Ok(_) => {}
            }
        }
        Ok(failures)
    }
}

impl Default for ChecksumValidator {
    fn default() -> Self {
        Self::new(ChecksumValidatorConfig::default())
    }
}

impl Validator for ChecksumValidator {
    fn name(&self) -> &str {
        "checksum"
    }

    fn validate(&self, ctx: &ValidationContext) -> Result<(), ValidatorError> {
        let artifacts = self.find_artifacts(ctx.root())?;
        tracing::debug!(count = artifacts.len(), "checksum validation started");
        self.validate_artifacts(ctx, &artifacts)
    }
}

impl ChecksumValidator {
    /// Check `artifacts` in parallel, then submit their failures in order
    ///
    /// Stops at the first unreadable artifact; failures of the artifacts
    /// before it have already been submitted.
    pub(crate) fn validate_artifacts(
        &self,
        ctx: &ValidationContext,
        artifacts: &[Artifact],
    ) -> Result<(), ValidatorError> {
        self.progress.set_length(artifacts.len() as u64);
        let outcomes: Vec<io::Result<Vec<FailureDetail>>> = artifacts
            .par_iter()
            .progress_with(self.progress.clone())
            .map(|artifact| self.check_artifact(artifact))
            .collect();
        self.progress.finish_with_message("checksums done");

        // Submit in walk order so reports do not depend on scheduling.
        let mut submitted = 0usize;
        for (artifact, outcome) in artifacts.iter().zip(outcomes) {
            tracing::trace!(artifact = %artifact.relative, "validated");
            let failures = outcome.map_err(|source| ValidatorError::UnreadableArtifact {
                path: artifact.relative.clone(),
                source,
            })?;
            for detail in failures {
                ctx.submit(CheckKind::Checksum, &artifact.relative, detail);
                submitted += 1;
            }
        }

        tracing::info!(
            artifacts = artifacts.len(),
            failures = submitted,
            "checksum validation finished"
        );
        Ok(())
    }
}

/// `<artifact><suffix>`
fn sidecar_path(artifact: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(artifact.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}
