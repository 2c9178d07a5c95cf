//! Error types for elemental_runtime

use elemental_core::{BehaviorError, DomError};
use thiserror::Error;

/// Errors raised while defining or instantiating an elemental
#[derive(Error, Debug)]
pub enum ElementalError {
    /// Elementals must be named
    #[error("elemental name must be a non-empty string")]
    InvalidName,

    /// Default options must be a JSON object
    #[error("default options of '{name}' must be an object, got {found}")]
    InvalidDefaults { name: String, found: String },

    /// The behavior body failed; nothing was registered
    #[error("elemental '{name}' failed to initialize: {source}")]
    Body {
        name: String,
        #[source]
        source: BehaviorError,
    },

    /// The target element is not part of the document
    #[error("Document error: {0}")]
    Dom(#[from] DomError),
}

/// Errors raised while loading a runtime configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Errors raised while handling one element's declarations
///
/// These never escape the lifecycle manager; they are logged per element or
/// per declaration.
#[derive(Error, Debug)]
pub enum DeclarationError {
    /// The attribute looked like JSON but did not parse
    #[error("malformed declaration JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The attribute parsed but does not describe declarations
    #[error("invalid declaration: {0}")]
    Invalid(String),

    /// A resumed declaration has no matching instance
    #[error("no '{name}' instance with id '{id}'")]
    MissingInstance { name: String, id: String },

    /// Pause, resume or destroy failed
    #[error("'{name}' failed to {operation}: {source}")]
    Lifecycle {
        name: String,
        operation: &'static str,
        #[source]
        source: BehaviorError,
    },

    #[error(transparent)]
    Elemental(#[from] ElementalError),
}

/// Result type for elemental_runtime operations
pub type Result<T> = std::result::Result<T, ElementalError>;
