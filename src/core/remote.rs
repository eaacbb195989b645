//! Remote repository access
//!
//! Provides a trait-based abstraction over the HTTP calls the collision
//! validator makes, so tests can substitute an in-memory store.

use std::collections::BTreeMap;
use std::io::Read;
use std::time::Duration;

use super::digest::{compute_bytes_digest, compute_reader_digest, ChecksumAlgorithm};

/// Default per-request timeout for remote probes and fetches
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors arising from talking to the remote repository
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    /// The request never produced a usable response.
    #[error("request to {url} failed: {reason}")]
    Transport {
        /// The URL that was requested.
        url: String,
        /// A human-readable description of the failure.
        reason: String,
    },

    /// The server answered with a status the caller cannot interpret.
    #[error("{url} returned HTTP {status}")]
    UnexpectedStatus {
        /// The URL that was requested.
        url: String,
        /// The HTTP status code.
        status: u16,
    },
}

/// Outcome of an existence probe (HTTP `HEAD`)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeResponse {
    pub status: u16,
    headers: BTreeMap<String, String>,
}

impl ProbeResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
        }
    }

    /// Attach a header; names are case-insensitive
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// Outcome of a full fetch (HTTP `GET`)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// Outcome of digesting a remote body without keeping it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DigestResponse {
    pub status: u16,
    /// Hex digest of the body; only present for `200`
    pub digest: Option<String>,
}

/// Read-only view of a remote artifact repository
pub trait RemoteStore: Send + Sync {
    /// Ask for the metadata of `url` without transferring its body.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Transport`] if no response arrives.
    fn probe(&self, url: &str) -> Result<ProbeResponse, RemoteError>;

    /// Fetch `url` including its body, held in memory. Meant for small
    /// files such as sidecars.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Transport`] if no complete response arrives.
    fn fetch(&self, url: &str) -> Result<FetchResponse, RemoteError>;

    /// Fetch `url` and digest its body with `algorithm`.
    ///
    /// The default buffers the body through [`RemoteStore::fetch`]; stores
    /// serving large artifacts should stream instead.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Transport`] if no complete response arrives.
    fn fetch_digest(
        &self,
        url: &str,
        algorithm: ChecksumAlgorithm,
    ) -> Result<DigestResponse, RemoteError> {
        let response = self.fetch(url)?;
        let digest = (response.status == 200)
            .then(|| compute_bytes_digest(&response.body, algorithm));
        Ok(DigestResponse {
            status: response.status,
            digest,
        })
    }
}

/// HTTP-based store using `ureq`
///
/// Every request made through one store shares the same timeout.
pub struct UreqRemoteStore {
    agent: ureq::Agent,
}

impl UreqRemoteStore {
    pub fn new(timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
        }
    }
}

impl Default for UreqRemoteStore {
    fn default() -> Self {
        Self::new(DEFAULT_REQUEST_TIMEOUT)
    }
}

impl RemoteStore for UreqRemoteStore {
    fn probe(&self, url: &str) -> Result<ProbeResponse, RemoteError> {
        let response = self
            .agent
            .head(url)
            .call()
            .map_err(|e| map_ureq_error(url, &e))?;

        let mut probe = ProbeResponse::new(response.status().as_u16());
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                probe = probe.with_header(name.as_str(), value);
            }
        }
        Ok(probe)
    }

    fn fetch(&self, url: &str) -> Result<FetchResponse, RemoteError> {
        let response = self
            .agent
            .get(url)
            .call()
            .map_err(|e| map_ureq_error(url, &e))?;

        let status = response.status().as_u16();
        let mut body = Vec::new();
        response
            .into_body()
            .as_reader()
            .read_to_end(&mut body)
            .map_err(|e| RemoteError::Transport {
                url: url.to_owned(),
                reason: e.to_string(),
            })?;
        Ok(FetchResponse { status, body })
    }

    fn fetch_digest(
        &self,
        url: &str,
        algorithm: ChecksumAlgorithm,
    ) -> Result<DigestResponse, RemoteError> {
        let response = self
            .agent
            .get(url)
            .call()
            .map_err(|e| map_ureq_error(url, &e))?;

        let status = response.status().as_u16();
        if status != 200 {
            return Ok(DigestResponse {
                status,
                digest: None,
            });
        }

        let mut body = response.into_body();
        let digest = compute_reader_digest(body.as_reader(), algorithm).map_err(|e| {
            RemoteError::Transport {
                url: url.to_owned(),
                reason: e.to_string(),
            }
        })?;
        Ok(DigestResponse {
            status,
            digest: Some(digest),
        })
    }
}

/// Map a ureq error to a [`RemoteError`].
fn map_ureq_error(url: &str, err: &ureq::Error) -> RemoteError {
    match err {
        ureq::Error::StatusCode(status) => RemoteError::UnexpectedStatus {
            url: url.to_owned(),
            status: *status,
        },
        other => RemoteError::Transport {
            url: url.to_owned(),
            reason: other.to_string(),
        },
    }
}

/// Remote location of an artifact: base URL joined with its relative path
pub fn remote_url_for(base: &str, relative: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        relative.trim_start_matches('/')
    )
}
