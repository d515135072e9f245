#![deny(missing_docs)]
#![doc = "Core identifiers, values and adapter contracts for the bayesdag engine."]

use std::fmt;

use serde::{Deserialize, Serialize};

pub mod errors;
pub mod rng;
mod schema;
mod value;

pub use errors::{DagError, ErrorInfo};
pub use rng::{derive_substream_seed, RngHandle};
pub use schema::SchemaVersion;
pub use value::Value;

/// Identifier for a node within a model.
///
/// Identifiers are arena indices assigned at construction time and are
/// preserved when a model is cloned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(u64);

impl NodeId {
    /// Creates a new identifier from its raw integer representation.
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw integer representation of the identifier.
    pub fn as_raw(&self) -> u64 {
        self.0
    }

    /// Returns the arena slot addressed by this identifier.
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Density/mass evaluation and sampling capability of a stochastic node.
///
/// Parent values are supplied positionally in the order the node declared
/// its parents. Implementations must be pure: the engine caches their
/// results and only calls them again after the node was touched.
pub trait Distribution: fmt::Debug + Send + Sync {
    /// Short name used in diagnostics.
    fn name(&self) -> &str;

    /// Log density (or log mass) of `value` given the parent values.
    ///
    /// Values outside the support yield `f64::NEG_INFINITY`, not an error.
    fn ln_density(&self, value: &Value, parents: &[&Value]) -> Result<f64, DagError>;

    /// Draws a fresh value given the parent values.
    fn sample(&self, parents: &[&Value], rng: &mut RngHandle) -> Result<Value, DagError>;

    /// Returns true when `value` has a finite log density.
    fn support_is_finite(&self, value: &Value, parents: &[&Value]) -> bool {
        self.ln_density(value, parents)
            .map(|ln| ln.is_finite())
            .unwrap_or(false)
    }
}

/// Pure value computation backing a deterministic node.
pub trait Function: fmt::Debug + Send + Sync {
    /// Short name used in diagnostics.
    fn name(&self) -> &str;

    /// Computes the node value from the parent values.
    fn compute(&self, parents: &[&Value]) -> Result<Value, DagError>;
}
