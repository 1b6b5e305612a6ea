use thiserror::Error;

use crate::{config::ConfigurationError, delivery::DeliveryError, persistence::StoreError};

/// Errors that can occur during application context initialization.
#[derive(Debug, Error)]
pub enum AppContextError {
    /// Configuration error.
    #[error("Config error: {0}")]
    Config(#[from] ConfigurationError),

    /// Shared store error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The delivery client could not be built.
    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),
}
