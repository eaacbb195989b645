//! Remote repository collision validation
//!
//! Publishing an artifact must never replace different content already
//! stored under the same coordinates. Each local artifact is probed at its
//! remote location; a remote hit with a different digest is a collision,
//! a hit with the same digest is an allowed re-publish.

use indicatif::{ParallelProgressIterator, ProgressBar};
use rayon::prelude::*;
use std::path::Path;
use std::time::Duration;

use super::context::{CheckKind, FailureDetail, ValidationContext};
use super::digest::{digests_equal, DigestProvider, SidecarDigestProvider};
use super::remote::{
    remote_url_for, RemoteError, RemoteStore, UreqRemoteStore, DEFAULT_REQUEST_TIMEOUT,
};
use super::runner::{Validator, ValidatorError};
use crate::scanner::file_scanner::{collect_files, Artifact, FileFilter};

/// Default cap on concurrent requests to the remote repository
pub const DEFAULT_MAX_CONNECTIONS: usize = 20;

const HTTP_OK: u16 = 200;
const HTTP_NOT_FOUND: u16 = 404;

#[derive(Debug, Clone)]
pub struct CollisionValidatorConfig {
    /// Base address artifact paths are appended to
    pub remote_url: String,
    pub include: FileFilter,
    /// Upper bound on in-flight requests during one run
    pub max_connections: usize,
    /// Applied to every probe and fetch
    pub request_timeout: Duration,
}

impl CollisionValidatorConfig {
    pub fn new(remote_url: impl Into<String>) -> Self {
        Self {
            remote_url: remote_url.into(),
            include: FileFilter::all(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// Checks local artifacts against a remote repository
pub struct CollisionValidator {
    config: CollisionValidatorConfig,
    store: Box<dyn RemoteStore>,
    digests: Box<dyn DigestProvider>,
    progress: ProgressBar,
}

impl CollisionValidator {
    /// Validator talking HTTP with the configured request timeout
    pub fn new(config: CollisionValidatorConfig, digests: impl DigestProvider + 'static) -> Self {
        let store = UreqRemoteStore::new(config.request_timeout);
        Self {
            config,
            store: Box::new(store),
            digests: Box::new(digests),
            progress: ProgressBar::hidden(),
        }
    }

    /// Validator comparing SHA-1 digests
    pub fn with_defaults(config: CollisionValidatorConfig) -> Self {
        Self::new(config, SidecarDigestProvider::default())
    }

    /// Replace the remote store, e.g. with an in-memory one
    pub fn with_store(mut self, store: impl RemoteStore + 'static) -> Self {
        self.store = Box::new(store);
        self
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    pub fn find_artifacts(&self, root: &Path) -> Result<Vec<Artifact>, ValidatorError> {
        let artifacts = collect_files(root, |_, relative| self.config.include.accepts(relative))?;
        Ok(artifacts)
    }

    /// Probe one artifact's remote location and classify the outcome
    ///
    /// # Returns
    /// `None` when publishing the artifact is safe
    ///
    /// # Errors
    /// Returns an error only if the local artifact cannot be read.
    pub fn check_artifact(&self, artifact: &Artifact) -> Result<Option<FailureDetail>, ValidatorError> {
        let remote_url = remote_url_for(&self.config.remote_url, &artifact.relative);

        let probe = match self.store.probe(&remote_url) {
            Ok(probe) => probe,
            Err(err) => return Ok(Some(classify_remote_error(remote_url, err))),
        };

        match probe.status {
            HTTP_OK => {
                let remote_digest =
                    match self
                        .digests
                        .remote_digest(&*self.store, &remote_url, &probe)
                    {
                        Ok(digest) => digest,
                        Err(err) => return Ok(Some(classify_remote_error(remote_url, err))),
                    };
                let local_digest = self.digests.local_digest(&artifact.path).map_err(|source| {
                    ValidatorError::UnreadableArtifact {
                        path: artifact.relative.clone(),
                        source,
                    }
                })?;

                if digests_equal(&remote_digest, &local_digest) {
                    tracing::debug!(url = %remote_url, "remote holds identical content");
                    Ok(None)
                } else {
                    Ok(Some(FailureDetail::RemoteCollision { remote_url }))
                }
            }
            HTTP_NOT_FOUND => Ok(None),
            status => Ok(Some(FailureDetail::RemoteUnexpectedStatus { remote_url, status })),
        }
    }
}

impl Validator for CollisionValidator {
    fn name(&self) -> &str {
        "remote-collision"
    }

    fn priority(&self) -> u32 {
        200
    }

    fn validate(&self, ctx: &ValidationContext) -> Result<(), ValidatorError> {
        let artifacts = self.find_artifacts(ctx.root())?;
        tracing::debug!(
            count = artifacts.len(),
            remote = %self.config.remote_url,
            "collision validation started"
        );

        // Pool size bounds outbound concurrency; dropped when the run ends.
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.max_connections.max(1))
            .thread_name(|i| format!("remote-probe-{}", i))
            .build()?;

        self.progress.set_length(artifacts.len() as u64);
        let outcome = pool.install(|| {
            artifacts
                .par_iter()
                .progress_with(self.progress.clone())
                .try_for_each(|artifact| {
                    if let Some(detail) = self.check_artifact(artifact)? {
                        ctx.submit(CheckKind::RemoteCollision, &artifact.relative, detail);
                    }
                    Ok::<(), ValidatorError>(())
                })
        });
        self.progress.finish_with_message("remote checks done");
        outcome?;

        tracing::info!(artifacts = artifacts.len(), "collision validation finished");
        Ok(())
    }
}

fn classify_remote_error(remote_url: String, err: RemoteError) -> FailureDetail {
    match err {
        RemoteError::UnexpectedStatus { status, .. } => {
            FailureDetail::RemoteUnexpectedStatus { remote_url, status }
        }
        RemoteError::Transport { reason, .. } => FailureDetail::RemoteRequestFailed {
            remote_url,
            cause: reason,
        },
    }
}
