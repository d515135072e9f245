use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

use crate::errors::{DagError, ErrorInfo};

/// Value held by a graph node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "kebab-case")]
pub enum Value {
    /// Scalar real number.
    Real(f64),
    /// Scalar integer.
    Integer(i64),
    /// Fixed-length vector of reals.
    RealVector(Vec<f64>),
}

impl Value {
    /// Returns the value as a real scalar, widening integers.
    pub fn as_real(&self) -> Result<f64, DagError> {
        match self {
            Value::Real(x) => Ok(*x),
            Value::Integer(x) => Ok(*x as f64),
            Value::RealVector(_) => Err(type_error("real", self)),
        }
    }

    /// Returns the value as an integer scalar.
    pub fn as_integer(&self) -> Result<i64, DagError> {
        match self {
            Value::Integer(x) => Ok(*x),
            _ => Err(type_error("integer", self)),
        }
    }

    /// Returns the vector elements.
    pub fn as_vector(&self) -> Result<&[f64], DagError> {
        match self {
            Value::RealVector(values) => Ok(values),
            _ => Err(type_error("real-vector", self)),
        }
    }

    /// Returns mutable access to the vector elements.
    pub fn as_vector_mut(&mut self) -> Result<&mut Vec<f64>, DagError> {
        match self {
            Value::RealVector(values) => Ok(values),
            other => Err(type_error("real-vector", other)),
        }
    }

    /// Short type label used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Real(_) => "real",
            Value::Integer(_) => "integer",
            Value::RealVector(_) => "real-vector",
        }
    }

    /// Returns true when every element is a finite number.
    pub fn is_finite(&self) -> bool {
        match self {
            Value::Real(x) => x.is_finite(),
            Value::Integer(_) => true,
            Value::RealVector(values) => values.iter().all(|x| x.is_finite()),
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Real(x) => write!(f, "{x}"),
            Value::Integer(x) => write!(f, "{x}"),
            Value::RealVector(values) => {
                write!(f, "[")?;
                for (idx, x) in values.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{x}")?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Real(x)
    }
}

impl From<i64> for Value {
    fn from(x: i64) -> Self {
        Value::Integer(x)
    }
}

impl From<Vec<f64>> for Value {
    fn from(values: Vec<f64>) -> Self {
        Value::RealVector(values)
    }
}

fn type_error(expected: &str, found: &Value) -> DagError {
    DagError::Graph(
        ErrorInfo::new("value-type-mismatch", "value has an unexpected type")
            .with_context("expected", expected)
            .with_context("found", found.type_name()),
    )
}
