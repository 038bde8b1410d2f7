use crate::model::NodeId;

/// Errors raised by the content model.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("Malformed document: {0}")]
    MalformedDocument(String),
    #[error("Anchor references detached node {0}")]
    DanglingAnchor(NodeId),
    #[error("Node {0} is not part of the document")]
    NotAttached(NodeId),
    #[error("Invalid position: {0}")]
    InvalidPosition(String),
}

/// Errors raised while turning a command name and argument into a command.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum CommandError {
    #[error("Unknown command: {0}")]
    UnknownCommand(String),
    #[error("Invalid input for {command}: {reason}")]
    InvalidUserInput {
        command: &'static str,
        reason: String,
    },
}

/// Errors reported by a host editing surface.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum HostError {
    #[error("Host does not support primitive: {0}")]
    UnsupportedPrimitive(String),
}

/// Errors raised by the export pipelines and download sinks.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("Rasterization failed: {0}")]
    AsyncExportFailure(String),
    #[error("Image could not be loaded: {0}")]
    Image(String),
    #[error("Invalid export filename: {0}")]
    InvalidFilename(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the persistent key-value store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid store key: {0}")]
    InvalidKey(String),
}
