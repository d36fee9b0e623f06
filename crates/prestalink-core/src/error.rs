use thiserror::Error;

use crate::models::{Model, RemoteId};

/// Application-wide error types.
///
/// This enum represents all possible errors that can occur in prestalink.
/// It uses the `thiserror` crate for ergonomic error handling and automatic conversion
/// from underlying library errors.
///
/// # Error Classes
///
/// - Transport errors (`ClientError`, `NetworkError`, `Timeout`, `RateLimitExceeded`)
///   come from the remote webservice. Importers recover from these by recording a
///   checkpoint, see [`AppError::is_transport`].
/// - Mapping errors (`MissingBinding`, `MissingField`, `InvalidField`, `ImageResize`)
///   are fatal for the item being imported and always propagate.
///
/// # Examples
///
/// ```no_run
/// use prestalink_core::error::AppError;
///
/// fn example() -> Result<(), AppError> {
///     Err(AppError::Generic("Something went wrong".to_string()))
/// }
/// ```
#[derive(Error, Debug)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    /// HTTP request to the webservice failed or returned an error status.
    #[error("API Client error: {0}")]
    ClientError(String),

    /// JSON serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// URL parsing failed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Invalid PrestaShop backend location provided.
    #[error("Invalid PrestaShop backend URL: {0}")]
    InvalidBackendUrl(String),

    /// API response contained no data.
    #[error("Empty response from API")]
    EmptyResponse,

    /// Network or connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Request timeout.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Rate limit exceeded.
    #[error("Rate limit exceeded. Please wait and try again.")]
    RateLimitExceeded,

    /// A referenced remote entity has no local binding.
    ///
    /// Raised during mapping when a required parent (e.g. the product template
    /// owning an image) was never imported.
    #[error("No {model} binding for remote id {remote_id}")]
    MissingBinding { model: Model, remote_id: RemoteId },

    /// A remote record lacks a field the mapper requires.
    #[error("Remote record has no field `{0}`")]
    MissingField(String),

    /// A remote or local field holds a value of the wrong shape.
    #[error("Invalid value for field `{field}`: {reason}")]
    InvalidField { field: String, reason: String },

    /// Two mapping rules declare the same output key.
    #[error("Mapping rules `{first}` and `{second}` both write key `{key}`")]
    MapperConflict {
        key: String,
        first: String,
        second: String,
    },

    /// Image payload could not be decoded or resized.
    #[error("Image resize failed: {0}")]
    ImageResize(String),

    /// The store has no persistence for the requested model.
    #[error("Unsupported model: {0}")]
    UnsupportedModel(Model),

    /// Configuration file could not be read or parsed.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Generic application error for cases not covered by specific variants.
    #[error("Error: {0}")]
    Generic(String),
}

impl AppError {
    /// Returns a user-friendly error message suitable for CLI output.
    pub fn user_message(&self) -> String {
        match self {
            AppError::DatabaseError(e) => {
                if e.to_string().contains("connection") {
                    "Cannot connect to database. Is PostgreSQL running?\n   Try: docker-compose up -d".to_string()
                } else {
                    format!("Database error: {}", e)
                }
            }
            AppError::ClientError(msg) => {
                if msg.contains("401") || msg.contains("Unauthorized") {
                    "PrestaShop rejected the API key.\n   Check your PRESTASHOP_API_KEY environment variable.".to_string()
                } else if msg.contains("connect") {
                    format!("Cannot connect to shop: {}\n   Check your internet connection and the backend URL.", msg)
                } else {
                    format!("API error: {}", msg)
                }
            }
            AppError::InvalidBackendUrl(url) => {
                format!(
                    "Invalid backend URL: {}\n   Example: https://shop.example.com",
                    url
                )
            }
            AppError::NetworkError(msg) => {
                format!("Network error: {}\n   Check your internet connection.", msg)
            }
            AppError::Timeout(secs) => {
                format!("Request timed out after {} seconds.\n   The shop may be overloaded. Try again later.", secs)
            }
            AppError::RateLimitExceeded => {
                "Too many requests. Please wait a moment and try again.".to_string()
            }
            AppError::MissingBinding { model, remote_id } => {
                format!(
                    "{} {} has not been imported yet.\n   Import it before its dependents.",
                    model, remote_id
                )
            }
            _ => self.to_string(),
        }
    }

    /// Returns true if this error was raised by the remote webservice transport.
    ///
    /// # Examples
    ///
    /// ```
    /// use prestalink_core::error::AppError;
    ///
    /// assert!(AppError::ClientError("HTTP 500".to_string()).is_transport());
    /// assert!(!AppError::MissingField("id_image".to_string()).is_transport());
    /// ```
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            AppError::ClientError(_)
                | AppError::NetworkError(_)
                | AppError::Timeout(_)
                | AppError::RateLimitExceeded
                | AppError::EmptyResponse
        )
    }

    /// Returns true if the same request may succeed when sent again.
    ///
    /// `ClientError` is excluded: a rejected request fails the same way twice.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::NetworkError(_) | AppError::Timeout(_) | AppError::RateLimitExceeded
        )
    }
}
