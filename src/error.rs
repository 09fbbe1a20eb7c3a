//! Crate-wide error taxonomy.
//!
//! Each component keeps its own narrow error enum; [`PublishError`] is the
//! boundary type `publish()` returns, aggregating the others via `#[from]`.

use thiserror::Error;

use crate::archive::ArchiveError;
use crate::client::ServiceError;
use crate::credentials::CredentialError;
use crate::signature::SignatureError;
use crate::transcode::CodecError;
use crate::upload::UploadError;

pub type Result<T> = std::result::Result<T, PublishError>;

#[derive(Debug, Error)]
pub enum IoError {
    #[error("I/O error on {path}: {source}")]
    Failed {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl IoError {
    pub fn at(path: impl Into<std::path::PathBuf>, source: std::io::Error) -> Self {
        IoError::Failed {
            path: path.into(),
            source,
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("two-factor verification failed")]
    TwoFactorFailed,

    #[error("session expired")]
    SessionExpired,

    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),
}

/// Top-level error returned from [`crate::orchestrator::publish`].
#[derive(Debug, Error)]
pub enum PublishError {
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Io(#[from] IoError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error(transparent)]
    Signature(#[from] SignatureError),

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error("publication cancelled")]
    Cancelled,
}

impl PublishError {
    /// A short, human-readable description suitable for a non-fatal
    /// notification. Auth errors are handled separately by the caller
    /// (routed back to the credentials prompt) and are not expected to
    /// reach this helper, but it degrades gracefully if they do.
    pub fn user_message(&self) -> String {
        match self {
            PublishError::Archive(e) => format!("This bundle file is not valid: {e}"),
            PublishError::Codec(e) => format!("Could not decode an asset bundle: {e}"),
            PublishError::Io(e) => format!("A file could not be read or written: {e}"),
            PublishError::Auth(e) => format!("Sign-in failed: {e}"),
            PublishError::Service(e) => format!("The service rejected the request: {e}"),
            PublishError::Upload(e) => format!("Upload failed: {e}"),
            PublishError::Signature(e) => format!("Could not generate a file signature: {e}"),
            PublishError::Credential(e) => format!("Could not access the credential store: {e}"),
            PublishError::Cancelled => "Publication was cancelled".to_string(),
        }
    }
}
