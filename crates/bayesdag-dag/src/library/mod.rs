//! Reference distribution and function adapters.
//!
//! Parents are positional. Parameters outside their valid range produce a
//! log density of `-inf` instead of an error so that the sampler can treat
//! them as rejections.

mod distributions;
mod functions;

pub use distributions::{
    Degenerate, DiscreteUniform, Exponential, LogNormal, Normal, NormalVector, Uniform,
};
pub use functions::{Affine, Exp, Product, Sum};

use bayesdag_core::{DagError, ErrorInfo, Value};

fn expect_arity(adapter: &str, parents: &[&Value], expected: usize) -> Result<(), DagError> {
    if parents.len() != expected {
        return Err(DagError::Graph(
            ErrorInfo::new("adapter-arity", "adapter received the wrong number of parents")
                .with_context("adapter", adapter)
                .with_context("expected", expected)
                .with_context("found", parents.len()),
        ));
    }
    Ok(())
}

fn invalid_parameter(adapter: &str, detail: impl ToString) -> DagError {
    DagError::Graph(
        ErrorInfo::new("invalid-parameter", "distribution parameters are out of range")
            .with_context("adapter", adapter)
            .with_context("detail", detail),
    )
}
