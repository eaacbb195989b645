//! Validator trait and run assembly

use std::io;

use super::context::ValidationContext;

/// Conditions that stop a validator from finishing its run
///
/// Per-artifact outcomes never end up here; they are submitted to the
/// [`ValidationContext`] instead.
#[derive(Debug, thiserror::Error)]
pub enum ValidatorError {
    /// An artifact's own bytes could not be read.
    #[error("cannot read artifact {path}: {source}")]
    UnreadableArtifact {
        /// Artifact path relative to the repository root.
        path: String,
        #[source]
        source: io::Error,
    },

    /// The repository tree could not be walked.
    #[error("failed to walk repository: {0}")]
    Walk(#[from] walkdir::Error),

    /// The bounded worker pool could not be created.
    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// A check run over the whole repository
pub trait Validator {
    fn name(&self) -> &str;

    /// Lower values run first
    fn priority(&self) -> u32 {
        100
    }

    /// Check every artifact, submitting failures into `ctx`
    ///
    /// # Errors
    /// Returns an error only when the run cannot make a determination,
    /// e.g. an artifact is unreadable.
    fn validate(&self, ctx: &ValidationContext) -> Result<(), ValidatorError>;
}

/// A validator that terminated abnormally
#[derive(Debug)]
pub struct AbortedValidator {
    pub name: String,
    pub error: ValidatorError,
}

/// Run every validator against the shared context in priority order
///
/// A validator that aborts does not stop the remaining ones.
///
/// # Returns
/// The validators that aborted, in the order they ran
pub fn run_validators(
    mut validators: Vec<Box<dyn Validator>>,
    ctx: &ValidationContext,
) -> Vec<AbortedValidator> {
    validators.sort_by_key(|v| v.priority());

    let mut aborted = Vec::new();
    for validator in &validators {
        tracing::info!(validator = validator.name(), "running validator");
        if let Err(error) = validator.validate(ctx) {
            tracing::warn!(validator = validator.name(), %error, "validator aborted");
            aborted.push(AbortedValidator {
                name: validator.name().to_string(),
                error,
            });
        }
    }
    aborted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::context::{CheckKind, FailureDetail};
    use crate::core::digest::ChecksumAlgorithm;
    use std::sync::{Arc, Mutex};

    struct Recording {
        name: &'static str,
        priority: u32,
        fail: bool,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Validator for Recording {
        fn name(&self) -> &str {
            self.name
        }

        fn priority(&self) -> u32 {
            self.priority
        }

        fn validate(&self, ctx: &ValidationContext) -> Result<(), ValidatorError> {
            self.log.lock().unwrap().push(self.name);
            if self.fail {
                return Err(ValidatorError::UnreadableArtifact {
                    path: "a.jar".into(),
                    source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
                });
            }
            ctx.submit(
                CheckKind::Checksum,
                self.name,
                FailureDetail::ChecksumMissing {
                    algorithm: ChecksumAlgorithm::Md5,
                },
            );
            Ok(())
        }
    }

    #[test]
    fn test_runs_in_priority_order_and_survives_aborts() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let make = |name, priority, fail| -> Box<dyn Validator> {
            Box::new(Recording {
                name,
                priority,
                fail,
                log: Arc::clone(&log),
            })
        };
        let ctx = ValidationContext::new("", Vec::new());

        let aborted = run_validators(
            vec![make("late", 300, false), make("broken", 50, true), make("early", 100, false)],
            &ctx,
        );

        assert_eq!(*log.lock().unwrap(), vec!["broken", "early", "late"]);
        assert_eq!(aborted.len(), 1);
        assert_eq!(aborted[0].name, "broken");
        assert_eq!(ctx.reported_failures().len(), 2);
    }
}
