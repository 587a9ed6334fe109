//! Error taxonomy for a channel fetch.
//!
//! Fatal variants end the fetch and bubble up to the caller. `PartRequest`
//! and `UnknownVideo` are absorbed by the fetcher, logged, and kept as
//! diagnostics on the finished run.

use thiserror::Error;

/// Failure reported by the HTTP collaborator for a single request.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The API answered with a non-success status.
    #[error("{resource} request failed with status {status} ({url})")]
    Status {
        resource: String,
        status: u16,
        /// Request URL with the API key removed.
        url: String,
    },

    /// The request never produced a response (DNS, TLS, timeout, ...).
    #[error("{resource} request failed: {message}")]
    Network { resource: String, message: String },

    /// The response body was not the JSON shape we expected.
    #[error("{resource} response could not be decoded: {message}")]
    Decode { resource: String, message: String },
}

impl TransportError {
    pub fn resource(&self) -> &str {
        match self {
            TransportError::Status { resource, .. }
            | TransportError::Network { resource, .. }
            | TransportError::Decode { resource, .. } => resource,
        }
    }

    /// HTTP status when the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    /// Channel to upload playlist lookup failed or returned nothing usable.
    #[error("could not resolve upload playlist for channel {channel_id}: {reason}")]
    Resolution { channel_id: String, reason: String },

    /// A snippet page request failed; pagination stopped.
    #[error("snippet page request failed: {source}")]
    TransientFetch {
        resource: String,
        status: Option<u16>,
        #[source]
        source: TransportError,
    },

    /// One enrichment batch failed. The other batches still run.
    #[error("'{part}' request for {} video(s) failed: {source}", .ids.len())]
    PartRequest {
        part: String,
        ids: Vec<String>,
        #[source]
        source: TransportError,
    },

    /// An enrichment response mentioned an id the snippet pass never saw.
    #[error("'{part}' response references unknown video {video_id}")]
    UnknownVideo { video_id: String, part: String },

    #[error("unknown part: {0}")]
    UnknownPart(String),

    #[error("invalid batch size: {0}")]
    InvalidSize(usize),

    #[error("max results must be at least 1, got {0}")]
    InvalidMaxResults(usize),

    #[error("failed to write export: {0}")]
    Export(#[from] std::io::Error),

    #[error("failed to serialize export: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl FetchError {
    pub(crate) fn transient(source: TransportError) -> Self {
        FetchError::TransientFetch {
            resource: source.resource().to_string(),
            status: source.status(),
            source,
        }
    }

    /// Whether the fetcher keeps going after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            FetchError::PartRequest { .. } | FetchError::UnknownVideo { .. }
        )
    }
}
