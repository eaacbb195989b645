//! Repository tree scanning

pub mod file_scanner;

pub use file_scanner::{collect_files, relative_path, Artifact, FileFilter};
