//! Error types for bus operations.

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;

/// Errors that can occur during bus operations.
///
/// Validation errors (`ReservedName`, `NotFound`, `NoConnection`, `Destroyed`)
/// are detected locally before any backend interaction; backend errors are
/// surfaced to the caller and never retried by the core.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Event name '{event}' is reserved for the liveness probe")]
    ReservedName { event: String },

    #[error("No event bus named '{name}' is registered")]
    NotFound { name: String },

    #[error("Event bus has no established connections")]
    NoConnection,

    #[error("Event bus was destroyed")]
    Destroyed,

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Subscribe failed: {0}")]
    Subscribe(String),

    #[error("Payload serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}
