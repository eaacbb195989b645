//! Content digests for local artifacts and their remote counterparts

use md5::Md5;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use super::remote::{DigestResponse, ProbeResponse, RemoteError, RemoteStore};

/// Supported checksum algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChecksumAlgorithm {
    #[serde(rename = "MD5")]
    Md5,
    #[serde(rename = "SHA-1")]
    Sha1,
    #[serde(rename = "SHA-256")]
    Sha256,
}

impl ChecksumAlgorithm {
    /// Conventional algorithm name, e.g. `SHA-1`
    pub fn name(self) -> &'static str {
        match self {
            Self::Md5 => "MD5",
            Self::Sha1 => "SHA-1",
            Self::Sha256 => "SHA-256",
        }
    }

    /// Sidecar suffix used by Maven-layout repositories
    pub fn default_suffix(self) -> &'static str {
        match self {
            Self::Md5 => ".md5",
            Self::Sha1 => ".sha1",
            Self::Sha256 => ".sha256",
        }
    }

    /// Response header Nexus and Artifactory use to advertise this digest
    pub fn checksum_header(self) -> &'static str {
        match self {
            Self::Md5 => "x-checksum-md5",
            Self::Sha1 => "x-checksum-sha1",
            Self::Sha256 => "x-checksum-sha256",
        }
    }

    fn hasher(self) -> Hasher {
        match self {
            Self::Md5 => Hasher::Md5(Md5::new()),
            Self::Sha1 => Hasher::Sha1(Sha1::new()),
            Self::Sha256 => Hasher::Sha256(Sha256::new()),
        }
    }
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An algorithm bound to the sidecar suffix it is stored under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlgorithmSpec {
    pub algorithm: ChecksumAlgorithm,
    pub suffix: String,
}

impl AlgorithmSpec {
    pub fn new(algorithm: ChecksumAlgorithm, suffix: impl Into<String>) -> Self {
        Self {
            algorithm,
            suffix: suffix.into(),
        }
    }

    /// MD5 and SHA-1 with their conventional suffixes
    pub fn default_set() -> Vec<Self> {
        [ChecksumAlgorithm::Md5, ChecksumAlgorithm::Sha1]
            .into_iter()
            .map(Self::from)
            .collect()
    }
}

impl From<ChecksumAlgorithm> for AlgorithmSpec {
    fn from(algorithm: ChecksumAlgorithm) -> Self {
        Self::new(algorithm, algorithm.default_suffix())
    }
}

enum Hasher {
    Md5(Md5),
    Sha1(Sha1),
    Sha256(Sha256),
}

impl Hasher {
    fn update(&mut self, bytes: &[u8]) {
        match self {
            Self::Md5(h) => h.update(bytes),
            Self::Sha1(h) => h.update(bytes),
            Self::Sha256(h) => h.update(bytes),
        }
    }

    fn finalize_hex(self) -> String {
        match self {
            Self::Md5(h) => format!("{:x}", h.finalize()),
            Self::Sha1(h) => format!("{:x}", h.finalize()),
            Self::Sha256(h) => format!("{:x}", h.finalize()),
        }
    }
}

/// Compute several digests of a file in a single read
///
/// # Returns
/// Lowercase hex digests in the same order as `algorithms`
pub fn compute_digests(path: &Path, algorithms: &[ChecksumAlgorithm]) -> io::Result<Vec<String>> {
    let file = File::open(path)?;
    compute_reader_digests(file, algorithms)
}

/// Digest everything `reader` yields, 8 KiB at a time
pub fn compute_reader_digests<R: Read>(
    mut reader: R,
    algorithms: &[ChecksumAlgorithm],
) -> io::Result<Vec<String>> {
    let mut hashers: Vec<Hasher> = algorithms.iter().map(|a| a.hasher()).collect();
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        for hasher in &mut hashers {
            hasher.update(&buffer[..bytes_read]);
        }
    }

    Ok(hashers.into_iter().map(Hasher::finalize_hex).collect())
}

/// Single-algorithm form of [`compute_reader_digests`]
pub fn compute_reader_digest<R: Read>(reader: R, algorithm: ChecksumAlgorithm) -> io::Result<String> {
    let mut digests = compute_reader_digests(reader, &[algorithm])?;
    Ok(digests.remove(0))
}

/// Compute a single digest of a file
pub fn compute_file_digest(path: &Path, algorithm: ChecksumAlgorithm) -> io::Result<String> {
    let mut digests = compute_digests(path, &[algorithm])?;
    Ok(digests.remove(0))
}

/// Digest an in-memory buffer
pub fn compute_bytes_digest(bytes: &[u8], algorithm: ChecksumAlgorithm) -> String {
    let mut hasher = algorithm.hasher();
    hasher.update(bytes);
    hasher.finalize_hex()
}

/// Extract the digest from sidecar text
///
/// Sidecars may hold `<hex>  <file name>`; only the first token counts.
pub fn parse_sidecar(text: &str) -> String {
    text.split_whitespace().next().unwrap_or_default().to_string()
}

/// Read the digest stored in a sidecar checksum file
pub fn read_sidecar(path: &Path) -> io::Result<String> {
    let text = std::fs::read_to_string(path)?;
    Ok(parse_sidecar(&text))
}

/// Case-insensitive digest comparison
pub fn digests_equal(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

/// Source of the digests compared during collision checks
pub trait DigestProvider: Send + Sync {
    /// Digest of a local artifact's full content
    fn local_digest(&self, path: &Path) -> io::Result<String>;

    /// Digest the remote artifact at `remote_url` is expected to have
    ///
    /// `probe` is the response of the existence probe that found it.
    fn remote_digest(
        &self,
        store: &dyn RemoteStore,
        remote_url: &str,
        probe: &ProbeResponse,
    ) -> Result<String, RemoteError>;
}

/// Digest provider backed by checksum headers and remote sidecars
///
/// Resolution order for the remote digest: the probe's `X-Checksum-*`
/// header, then `<remote_url><suffix>`, then the remote body itself.
#[derive(Debug, Clone)]
pub struct SidecarDigestProvider {
    spec: AlgorithmSpec,
}

impl SidecarDigestProvider {
    pub fn new(spec: impl Into<AlgorithmSpec>) -> Self {
        Self { spec: spec.into() }
    }

    pub fn algorithm(&self) -> ChecksumAlgorithm {
        self.spec.algorithm
    }
}

impl Default for SidecarDigestProvider {
    fn default() -> Self {
        Self::new(ChecksumAlgorithm::Sha1)
    }
}

impl DigestProvider for SidecarDigestProvider {
    fn local_digest(&self, path: &Path) -> io::Result<String> {
        compute_file_digest(path, self.spec.algorithm)
    }

    fn remote_digest(
        &self,
        store: &dyn RemoteStore,
        remote_url: &str,
        probe: &ProbeResponse,
    ) -> Result<String, RemoteError> {
        if let Some(value) = probe.header(self.spec.algorithm.checksum_header()) {
            let digest = parse_sidecar(value);
            if !digest.is_empty() {
                return Ok(digest);
            }
        }

        let sidecar_url = format!("{}{}", remote_url, self.spec.suffix);
        let sidecar = store.fetch(&sidecar_url)?;
        if sidecar.status == 200 {
            let digest = parse_sidecar(&String::from_utf8_lossy(&sidecar.body));
            if !digest.is_empty() {
                return Ok(digest);
            }
        }
        tracing::debug!(url = %sidecar_url, status = sidecar.status, "no remote sidecar, digesting remote body");

        match store.fetch_digest(remote_url, self.spec.algorithm)? {
            DigestResponse {
                status: 200,
                digest: Some(digest),
            } => Ok(digest),
            DigestResponse { status, .. } => Err(RemoteError::UnexpectedStatus {
                url: remote_url.to_string(),
                status,
            }),
        }
    }
}
