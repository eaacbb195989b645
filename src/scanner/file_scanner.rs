//! Repository tree scanning and artifact collection

use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A file under the repository root that is a candidate for validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Location on disk
    pub path: PathBuf,
    /// Path relative to the repository root, `/`-separated
    pub relative: String,
}

/// Inclusion filter over relative artifact paths
///
/// An empty filter accepts every file.
#[derive(Debug, Clone, Default)]
pub struct FileFilter {
    include: Option<GlobSet>,
}

impl FileFilter {
    /// Filter that accepts every file
    pub fn all() -> Self {
        Self::default()
    }

    /// Build a filter from glob patterns such as `**/*.jar`
    ///
    /// # Errors
    /// Returns the first pattern that fails to compile.
    pub fn from_patterns<S: AsRef<str>>(patterns: &[S]) -> Result<Self, globset::Error> {
        if patterns.is_empty() {
            return Ok(Self::all());
        }

        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            builder.add(Glob::new(pattern.as_ref())?);
        }
        Ok(Self {
            include: Some(builder.build()?),
        })
    }

    pub fn accepts(&self, relative: &str) -> bool {
        self.include
            .as_ref()
            .map(|set| set.is_match(relative))
            .unwrap_or(true)
    }
}

/// Express `path` relative to `root` with `/` separators
///
/// Paths outside the root are returned as-is.
pub fn relative_path(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Collect every regular file under `root` accepted by `accept`
///
/// Traversal is sorted by file name so the result order does not depend on
/// the file system. Symbolic links are not followed.
///
/// # Arguments
/// * `root` - Repository root to walk
/// * `accept` - Predicate over the file name and the artifact's relative path
pub fn collect_files<F>(root: &Path, accept: F) -> Result<Vec<Artifact>, walkdir::Error>
where
    F: Fn(&str, &str) -> bool,
{
    let mut artifacts = Vec::new();

    for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = relative_path(root, entry.path());
        let file_name = entry.file_name().to_string_lossy();
        if accept(file_name.as_ref(), relative.as_str()) {
            artifacts.push(Artifact {
                path: entry.path().to_path_buf(),
                relative,
            });
        }
    }

    Ok(artifacts)
}
