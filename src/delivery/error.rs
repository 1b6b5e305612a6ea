use thiserror::Error;

/// Errors raised while building a delivery channel. Faults of individual
/// sends are reported as [`super::DeliveryOutcome`] values instead.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// A bot token or chat id is missing.
    #[error("Missing delivery credentials: {0}")]
    MissingCredentials(&'static str),

    /// The endpoint URL could not be built.
    #[error("Invalid endpoint URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The underlying HTTP client could not be created.
    #[error("Failed to create HTTP client: {0}")]
    HttpClientBuildError(String),
}
