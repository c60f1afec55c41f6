use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

use crate::transport::Verb;

/// Main error type for McM operations
#[derive(Debug, Error)]
pub enum McmError {
    /// Credential file could not be obtained
    #[error("credential file {} is unavailable", path.display())]
    CredentialUnavailable { path: PathBuf },

    /// The external cookie helper ran but reported failure
    #[error("{program} exited with {status}")]
    CookieHelperFailed { program: String, status: ExitStatus },

    /// The external cookie helper could not be started
    #[error("failed to run {program}: {source}")]
    CookieHelperSpawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Required environment variable is not set
    #[error("environment variable {0} is not set")]
    MissingEnvironment(&'static str),

    #[error("unable to resolve the home directory")]
    NoHomeDirectory,

    /// Cookie jar file has a line that is not in Netscape format
    #[error("invalid cookie file {} at line {line}: {reason}", path.display())]
    InvalidCookieFile {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    /// Response body is not valid JSON
    #[error("error while making a {verb} request to {url}: {source}")]
    Decode {
        verb: Verb,
        url: String,
        #[source]
        source: serde_json::Error,
    },

    /// Connection, TLS or I/O failure during a call
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing error
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl McmError {
    /// Check if this error comes from credential setup.
    ///
    /// These are raised while building a transport and leave no usable client behind;
    /// a CLI embedding usually terminates on them.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            McmError::CredentialUnavailable { .. }
                | McmError::CookieHelperFailed { .. }
                | McmError::CookieHelperSpawn { .. }
                | McmError::MissingEnvironment(_)
                | McmError::NoHomeDirectory
                | McmError::InvalidCookieFile { .. }
        )
    }

    /// Check if this error is a malformed or empty response body
    pub fn is_decode(&self) -> bool {
        matches!(self, McmError::Decode { .. })
    }
}

/// Result type for McM operations
pub type Result<T> = std::result::Result<T, McmError>;
