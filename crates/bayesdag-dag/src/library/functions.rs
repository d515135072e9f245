use bayesdag_core::{DagError, Function, Value};

use super::expect_arity;

/// Sum of scalar parents, or of the elements of a single vector parent.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sum;

impl Function for Sum {
    fn name(&self) -> &str {
        "sum"
    }

    fn compute(&self, parents: &[&Value]) -> Result<Value, DagError> {
        if let [Value::RealVector(values)] = parents {
            return Ok(Value::Real(values.iter().sum()));
        }
        let mut total = 0.0;
        for parent in parents {
            total += parent.as_real()?;
        }
        Ok(Value::Real(total))
    }
}

/// Product of scalar parents.
#[derive(Debug, Clone, Copy, Default)]
pub struct Product;

impl Function for Product {
    fn name(&self) -> &str {
        "product"
    }

    fn compute(&self, parents: &[&Value]) -> Result<Value, DagError> {
        let mut total = 1.0;
        for parent in parents {
            total *= parent.as_real()?;
        }
        Ok(Value::Real(total))
    }
}

/// Exponential of a single scalar parent.
#[derive(Debug, Clone, Copy, Default)]
pub struct Exp;

impl Function for Exp {
    fn name(&self) -> &str {
        "exp"
    }

    fn compute(&self, parents: &[&Value]) -> Result<Value, DagError> {
        expect_arity(self.name(), parents, 1)?;
        Ok(Value::Real(parents[0].as_real()?.exp()))
    }
}

/// `scale * x + shift` of a single scalar parent.
#[derive(Debug, Clone, Copy)]
pub struct Affine {
    /// Multiplicative factor.
    pub scale: f64,
    /// Additive offset.
    pub shift: f64,
}

impl Function for Affine {
    fn name(&self) -> &str {
        "affine"
    }

    fn compute(&self, parents: &[&Value]) -> Result<Value, DagError> {
        expect_arity(self.name(), parents, 1)?;
        Ok(Value::Real(self.scale * parents[0].as_real()? + self.shift))
    }
}
