//! Structured error types shared across bayesdag crates.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured payload attached to every [`DagError`] variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable machine readable error code.
    pub code: String,
    /// Human readable diagnostic message.
    pub message: String,
    /// Contextual key value pairs (node names, move names, counts, etc.).
    #[serde(default)]
    pub context: BTreeMap<String, String>,
    /// Optional hint that may help the caller resolve the issue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ErrorInfo {
    /// Creates a new error payload with the provided code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            context: BTreeMap::new(),
            hint: None,
        }
    }

    /// Adds a context entry to the payload.
    pub fn with_context(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.context.insert(key.into(), value.to_string());
        self
    }

    /// Sets a human readable hint for remediation.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

/// Canonical error type for the bayesdag engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "family", content = "detail")]
pub enum DagError {
    /// Graph construction and node access errors.
    #[error("graph error: {0}")]
    Graph(ErrorInfo),
    /// Failure to connect a move or monitor to a model copy.
    #[error("rewire error: {0}")]
    Rewire(ErrorInfo),
    /// No computable starting state could be found.
    #[error("initialization error: {0}")]
    Initialization(ErrorInfo),
    /// Proposal misuse (wrong node kind, protocol violations).
    #[error("proposal error: {0}")]
    Proposal(ErrorInfo),
    /// Move schedule errors.
    #[error("schedule error: {0}")]
    Schedule(ErrorInfo),
    /// Monitor output errors.
    #[error("monitor error: {0}")]
    Monitor(ErrorInfo),
    /// Invalid configuration values.
    #[error("config error: {0}")]
    Config(ErrorInfo),
    /// Serialization and schema errors.
    #[error("serde error: {0}")]
    Serde(ErrorInfo),
}

impl Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code: {})", self.message, self.code)?;
        if !self.context.is_empty() {
            write!(f, " | context: [")?;
            for (idx, (key, value)) in self.context.iter().enumerate() {
                if idx > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{key}={value}")?;
            }
            write!(f, "]")?;
        }
        if let Some(hint) = &self.hint {
            write!(f, " | hint: {hint}")?;
        }
        Ok(())
    }
}

impl DagError {
    /// Returns a reference to the payload describing the error.
    pub fn info(&self) -> &ErrorInfo {
        match self {
            DagError::Graph(info)
            | DagError::Rewire(info)
            | DagError::Initialization(info)
            | DagError::Proposal(info)
            | DagError::Schedule(info)
            | DagError::Monitor(info)
            | DagError::Config(info)
            | DagError::Serde(info) => info,
        }
    }

    /// Returns the stable error code of the payload.
    pub fn code(&self) -> &str {
        &self.info().code
    }

    /// Adds a context entry to the payload regardless of the error family.
    pub fn with_context(self, key: impl Into<String>, value: impl ToString) -> Self {
        match self {
            DagError::Graph(info) => DagError::Graph(info.with_context(key, value)),
            DagError::Rewire(info) => DagError::Rewire(info.with_context(key, value)),
            DagError::Initialization(info) => {
                DagError::Initialization(info.with_context(key, value))
            }
            DagError::Proposal(info) => DagError::Proposal(info.with_context(key, value)),
            DagError::Schedule(info) => DagError::Schedule(info.with_context(key, value)),
            DagError::Monitor(info) => DagError::Monitor(info.with_context(key, value)),
            DagError::Config(info) => DagError::Config(info.with_context(key, value)),
            DagError::Serde(info) => DagError::Serde(info.with_context(key, value)),
        }
    }
}
