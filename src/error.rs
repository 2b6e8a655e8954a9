use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Authentication rejected: {0}")]
    AuthRejected(String),

    #[error("Profile store {operation} timed out after {after_ms}ms")]
    StoreTimeout {
        operation: &'static str,
        after_ms: u64,
    },

    #[error("Profile store error: {0}")]
    Store(String),

    #[error("Auth provider error: {0}")]
    Provider(String),

    #[error("Resolution engine is not running")]
    EngineStopped,

    #[error("Configuration error: {0}")]
    Config(String),
}

// Serialized as its display string for JSON event output
impl Serialize for IdentityError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

pub type Result<T> = std::result::Result<T, IdentityError>;
