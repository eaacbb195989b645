//! Repository Validator Library
//!
//! Pre-publish integrity checks for artifact repository trees: sidecar
//! checksums and collisions with a remote repository, with parallel
//! processing and a shared, filterable failure context.

pub mod core;
pub mod scanner;
pub mod reporting;

pub use self::core::context;
pub use self::scanner::file_scanner;
pub use self::reporting::report_writer;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::core::checksum_validator::{ChecksumValidator, ChecksumValidatorConfig};
    pub use crate::core::collision_validator::{CollisionValidator, CollisionValidatorConfig};
    pub use crate::core::context::{
        CheckKind, ExceptionFilter, ExceptionFilterConfig, Failure, FailureDetail, FailureKind,
        PathPatternFilter, ValidationContext,
    };
    pub use crate::core::digest::{
        compute_file_digest, AlgorithmSpec, ChecksumAlgorithm, DigestProvider,
        SidecarDigestProvider,
    };
    pub use crate::core::remote::{
        DigestResponse, FetchResponse, ProbeResponse, RemoteError, RemoteStore, UreqRemoteStore,
    };
    pub use crate::core::runner::{run_validators, Validator, ValidatorError};
    pub use crate::scanner::file_scanner::{collect_files, Artifact, FileFilter};
    pub use crate::reporting::report_writer::{
        default_reporters, run_reporters, write_json_report, write_report, Reporter,
    };
}
