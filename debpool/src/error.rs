use std::{io, path::PathBuf};
use thiserror::Error;
use url::Url;

/// The failures `debpool` distinguishes. Public operations return [`anyhow::Result`], with one of
/// these at the root of the error chain, so callers can recover the kind with
/// `err.downcast_ref::<DebPoolError>()`.
#[derive(Debug, Error)]
#[allow(clippy::module_name_repetitions)]
pub enum DebPoolError {
    /// A transport, DNS, or HTTP status failure while talking to `url`.
    #[error("request to {url} failed")]
    Network {
        url: Url,
        #[source]
        source: reqwest::Error,
    },

    /// The release API answered with something other than the expected JSON.
    #[error("the response from {url} was not a valid list of releases")]
    Format {
        url: Url,
        #[source]
        source: serde_json::Error,
    },

    /// The release tag does not yield a version that can go in a pool file name.
    #[error("the version `{version}` from the release tag `{tag}` {reason}")]
    UnusableTag {
        tag: String,
        version: String,
        reason: &'static str,
    },

    #[error("cannot find the dpkg architecture of {0}")]
    UnrecognizedArch(String),

    #[error("{action} {}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{owner}/{repo} does not have any releases that are not prereleases")]
    NoRelease { owner: String, repo: String },

    #[error("{0}")]
    InvalidConfig(String),
}

impl DebPoolError {
    pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        DebPoolError::Io {
            action,
            path: path.into(),
            source,
        }
    }
}
