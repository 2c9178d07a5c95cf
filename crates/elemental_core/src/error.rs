//! Error types for elemental_core

use thiserror::Error;

use crate::dom::ElementId;

/// Errors raised by the host document model
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomError {
    /// The element id is not (or no longer) part of the document
    #[error("unknown element {0:?}")]
    UnknownElement(ElementId),

    /// The document root cannot be detached or removed
    #[error("the document root cannot be removed")]
    RootRemoval,

    /// Inserting the child would create a cycle
    #[error("cannot insert {child:?} into {parent:?}")]
    HierarchyRequest { parent: ElementId, child: ElementId },

    /// The event kind has no known propagation preset
    #[error("event type '{0}' is not implemented for dispatch")]
    UnsupportedEvent(String),
}

/// Errors raised by behavior instances and behavior bodies
#[derive(Error, Debug)]
pub enum BehaviorError {
    /// The instance does not implement the requested lifecycle capability
    #[error("behavior does not implement \"{0}\"")]
    Unsupported(&'static str),

    /// The behavior reported a failure
    #[error("{0}")]
    Failed(String),

    /// The behavior received options it could not use
    #[error("invalid options: {0}")]
    InvalidOptions(String),

    /// A document operation performed by the behavior failed
    #[error(transparent)]
    Dom(#[from] DomError),

    /// Any other error bubbled up from behavior code
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BehaviorError {
    /// Convenience constructor for [`BehaviorError::Failed`]
    pub fn failed(message: impl Into<String>) -> Self {
        BehaviorError::Failed(message.into())
    }
}

/// Result type for behavior operations
pub type Result<T> = std::result::Result<T, BehaviorError>;
