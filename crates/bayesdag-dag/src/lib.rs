#![deny(missing_docs)]
#![doc = "Arena-backed probabilistic DAG with lazy, incremental re-evaluation."]

//! Nodes are created through [`Model`] and mutated only through the
//! touch / keep / restore protocol implemented in the lifecycle module.

mod density;
mod hash;
mod lifecycle;
pub mod library;
mod model;
mod node;

pub use density::LnComponents;
pub use hash::state_hash;
pub use model::Model;
pub use node::{DagNode, NodeKind};
