//! Error types for omadm-client

use thiserror::Error;

/// Result type alias for omadm-client operations
pub type Result<T> = std::result::Result<T, Error>;

/// OMA-DM status codes reported in the `sc` field of P3 status entries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusCode;

impl StatusCode {
    pub const OK: u16 = 200;
    pub const BAD_REQUEST: u16 = 400;
    pub const NOT_FOUND: u16 = 404;
    pub const NOT_ACCEPTABLE: u16 = 406;
    pub const CONFLICT: u16 = 409;
    pub const INTERNAL_ERROR: u16 = 500;
    pub const NOT_IMPLEMENTED: u16 = 501;
    pub const SERVICE_UNAVAILABLE: u16 = 503;
}

/// Errors that can occur in omadm-client operations
#[derive(Error, Debug)]
pub enum Error {
    /// DDF file could not be read
    #[error("DDF file error: {0}")]
    SchemaFile(String),

    /// DDF document could not be parsed or lacks the MgmtTree/Node wrapper
    #[error("DDF schema error: {0}")]
    Schema(String),

    /// No MO type registered under this type id
    #[error("No DDF registered for MO type {0}")]
    UnknownType(String),

    /// MO type has no instance with this id
    #[error("MO type {type_id} has no instance {instance_id}")]
    UnknownInstance {
        type_id: String,
        instance_id: String,
    },

    /// Path does not exist in the MO type's schema
    #[error("Node {path} does not exist in MO type {type_id}")]
    UnknownNode { type_id: String, path: String },

    /// Requested instance id is already taken
    #[error("MO type {type_id} already has an instance {instance_id}")]
    DuplicateInstance {
        type_id: String,
        instance_id: String,
    },

    /// MO implementation declared itself incompatible with the type id
    #[error("MO object declares not compatible with {0}")]
    CompatibilityRejected(String),

    /// Routing succeeded but writing into an MO instance is not available yet
    #[error("Writing node {0} is not implemented")]
    NodeWriteNotImplemented(String),

    /// Server-supplied URL could not be parsed
    #[error("Invalid URL: {0}")]
    Url(String),

    /// Command is missing a positional parameter
    #[error("{command} command is missing parameter {index}")]
    MissingParameter { command: &'static str, index: usize },

    /// Connection, timeout or HTTP failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Malformed protocol package
    #[error("Decode error: {0}")]
    Decode(String),

    /// Invalid client configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Map the error to the status code reported to the backend
    pub fn status_code(&self) -> u16 {
        match self {
            Error::UnknownType(_) | Error::UnknownInstance { .. } | Error::UnknownNode { .. } => {
                StatusCode::NOT_FOUND
            }
            Error::DuplicateInstance { .. } => StatusCode::CONFLICT,
            Error::CompatibilityRejected(_) => StatusCode::NOT_ACCEPTABLE,
            Error::NodeWriteNotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
            Error::Url(_) | Error::MissingParameter { .. } | Error::Decode(_) => {
                StatusCode::BAD_REQUEST
            }
            Error::Transport(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::SchemaFile(_)
            | Error::Schema(_)
            | Error::Config(_)
            | Error::Io(_)
            | Error::Json(_) => StatusCode::INTERNAL_ERROR,
        }
    }

    /// Whether the failure is worth another attempt
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Transport(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routing_errors_map_to_not_found() {
        let err = Error::UnknownInstance {
            type_id: "urn:oma:mo:oma-fumo:1.0".into(),
            instance_id: "apps".into(),
        };
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            Error::UnknownType("typeX".into()).status_code(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_fetch_failures() {
        assert_eq!(
            Error::Url("ftp://x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        let transport = Error::Transport("connection refused".into());
        assert_eq!(transport.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(transport.is_transient());
        assert!(!Error::Url("x".into()).is_transient());
    }
}
