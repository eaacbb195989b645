//! Shared aggregator of validation failures for one run

use globset::{Glob, GlobMatcher};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::digest::ChecksumAlgorithm;
use crate::scanner::file_scanner::relative_path;

/// Check that produced a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CheckKind {
    Checksum,
    RemoteCollision,
}

impl CheckKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Checksum => "checksum",
            Self::RemoteCollision => "remote-collision",
        }
    }
}

/// Classification of a failure, used for querying and filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    ChecksumMissing,
    ChecksumMismatch,
    RemoteCollision,
    RemoteUnexpectedStatus,
    RemoteRequestFailed,
}

/// What went wrong with an artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind")]
pub enum FailureDetail {
    #[error("checksum {algorithm} does not exist")]
    ChecksumMissing { algorithm: ChecksumAlgorithm },

    #[error("checksum {algorithm} does not match (computed {computed}, expected {expected})")]
    ChecksumMismatch {
        algorithm: ChecksumAlgorithm,
        computed: String,
        expected: String,
    },

    #[error("remote repository already contains {remote_url} with different content")]
    RemoteCollision { remote_url: String },

    #[error("remote repository returned HTTP {status} for {remote_url}")]
    RemoteUnexpectedStatus { remote_url: String, status: u16 },

    #[error("remote repository request failed for {remote_url}: {cause}")]
    RemoteRequestFailed { remote_url: String, cause: String },
}

impl FailureDetail {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::ChecksumMissing { .. } => FailureKind::ChecksumMissing,
            Self::ChecksumMismatch { .. } => FailureKind::ChecksumMismatch,
            Self::RemoteCollision { .. } => FailureKind::RemoteCollision,
            Self::RemoteUnexpectedStatus { .. } => FailureKind::RemoteUnexpectedStatus,
            Self::RemoteRequestFailed { .. } => FailureKind::RemoteRequestFailed,
        }
    }
}

/// A classified failure recorded in a [`ValidationContext`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    /// Submission sequence number, unique within a context
    pub id: u64,
    pub check: CheckKind,
    /// Artifact path relative to the repository root
    pub path: String,
    pub detail: FailureDetail,
}

impl Failure {
    pub fn kind(&self) -> FailureKind {
        self.detail.kind()
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.detail)
    }
}

/// Rule that routes a known-acceptable failure away from the report
pub trait ExceptionFilter: Send + Sync {
    fn matches(&self, path: &str, kind: FailureKind) -> bool;
}

/// Errors building exception filters
#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    #[error("invalid filter pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },
}

/// Filter matching a glob over the relative artifact path
///
/// With no kind, every failure of a matching artifact is ignored.
#[derive(Debug, Clone)]
pub struct PathPatternFilter {
    matcher: GlobMatcher,
    kind: Option<FailureKind>,
}

impl PathPatternFilter {
    pub fn new(pattern: &str, kind: Option<FailureKind>) -> Result<Self, FilterError> {
        let glob = Glob::new(pattern).map_err(|source| FilterError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(Self {
            matcher: glob.compile_matcher(),
            kind,
        })
    }
}

impl ExceptionFilter for PathPatternFilter {
    fn matches(&self, path: &str, kind: FailureKind) -> bool {
        self.kind.map_or(true, |k| k == kind) && self.matcher.is_match(path)
    }
}

/// Serialized form of a [`PathPatternFilter`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionFilterConfig {
    pub pattern: String,
    #[serde(default)]
    pub kind: Option<FailureKind>,
}

impl ExceptionFilterConfig {
    pub fn build(&self) -> Result<PathPatternFilter, FilterError> {
        PathPatternFilter::new(&self.pattern, self.kind)
    }
}

#[derive(Default)]
struct ContextState {
    next_id: u64,
    reported: Vec<Failure>,
    ignored: Vec<Failure>,
    processed: HashSet<u64>,
}

/// Thread-safe collection of every failure submitted during a run
///
/// Each submitted failure lands in exactly one of the reported or ignored
/// sequences; both are append-only.
pub struct ValidationContext {
    root: PathBuf,
    filters: Vec<Box<dyn ExceptionFilter>>,
    state: Mutex<ContextState>,
}

impl ValidationContext {
    pub fn new(root: impl Into<PathBuf>, filters: Vec<Box<dyn ExceptionFilter>>) -> Self {
        Self {
            root: root.into(),
            filters,
            state: Mutex::new(ContextState::default()),
        }
    }

    /// Repository root all reported paths are relative to
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn relativize(&self, path: &Path) -> String {
        relative_path(&self.root, path)
    }

    // A panic while holding the lock cannot leave the sequences half-written.
    fn state(&self) -> MutexGuard<'_, ContextState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a failure, routing it to the ignored sequence when any
    /// exception filter matches
    ///
    /// # Returns
    /// The stored failure
    pub fn submit(&self, check: CheckKind, path: &str, detail: FailureDetail) -> Failure {
        let kind = detail.kind();
        let ignored = self.filters.iter().any(|f| f.matches(path, kind));

        let mut state = self.state();
        let failure = Failure {
            id: state.next_id,
            check,
            path: path.to_string(),
            detail,
        };
        state.next_id += 1;

        if ignored {
            tracing::debug!(%failure, "failure ignored by exception filter");
            state.ignored.push(failure.clone());
        } else {
            state.reported.push(failure.clone());
        }
        failure
    }

    /// Reported failures of one kind, in submission order
    pub fn failures_of_kind(&self, kind: FailureKind) -> Vec<Failure> {
        self.state()
            .reported
            .iter()
            .filter(|f| f.kind() == kind)
            .cloned()
            .collect()
    }

    pub fn reported_failures(&self) -> Vec<Failure> {
        self.state().reported.clone()
    }

    pub fn ignored_failures(&self) -> Vec<Failure> {
        self.state().ignored.clone()
    }

    pub fn has_reported_failures(&self) -> bool {
        !self.state().reported.is_empty()
    }

    /// Flag a failure as already rendered by a reporter
    pub fn mark_processed(&self, failure: &Failure) {
        self.state().processed.insert(failure.id);
    }

    pub fn is_processed(&self, failure: &Failure) -> bool {
        self.state().processed.contains(&failure.id)
    }

    /// Reported failures no reporter has rendered yet
    pub fn unprocessed_failures(&self) -> Vec<Failure> {
        let state = self.state();
        state
            .reported
            .iter()
            .filter(|f| !state.processed.contains(&f.id))
            .cloned()
            .collect()
    }
}

impl fmt::Debug for ValidationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("ValidationContext")
            .field("root", &self.root)
            .field("filters", &self.filters.len())
            .field("reported", &state.reported.len())
            .field("ignored", &state.ignored.len())
            .field("processed", &state.processed.len())
            .finish()
    }
}
