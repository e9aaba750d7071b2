// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Typed error surface for the graph engine.
//!
//! Nodes never panic across a graph boundary; every failure mode a node can
//! hit is represented here so the executor can decide whether to retry,
//! degrade, or abort.

use std::time::Duration;
use thiserror::Error;

/// Result alias used throughout the engine.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by graph construction and execution.
#[derive(Debug, Error)]
pub enum Error {
    /// A named node failed during execution.
    #[error("node '{node}' failed: {source}")]
    NodeExecution {
        /// Name of the node that failed.
        node: String,
        /// Underlying error.
        #[source]
        source: Box<Error>,
    },

    /// Graph construction or state validation failed.
    #[error("validation error: {0}")]
    Validation(String),

    /// An operation exceeded its allotted duration.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// The graph has no entry point, an edge points to an undeclared node,
    /// or a cycle was detected where one is not permitted.
    #[error("graph definition error: {0}")]
    GraphDefinition(String),

    /// A conditional router returned a key absent from its routes table.
    #[error("router for node '{node}' returned unknown route '{route}'")]
    UnknownRoute {
        /// Node whose router produced the bad route.
        node: String,
        /// The offending route key.
        route: String,
    },

    /// Checkpoint persistence failed.
    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    /// The workflow was cancelled mid-execution.
    #[error("execution was cancelled")]
    Cancelled,

    /// Catch-all for uncaught internal failures (bugs, not expected flows).
    #[error("internal execution error: {0}")]
    InternalExecutionError(String),

    /// Serialization/deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O failure (checkpoint files, etc).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wrap this error as having occurred inside the named node.
    #[must_use]
    pub fn in_node(self, node: impl Into<String>) -> Self {
        Error::NodeExecution {
            node: node.into(),
            source: Box::new(self),
        }
    }
}
