use std::f64::consts::PI;

use bayesdag_core::{DagError, Distribution, RngHandle, Value};
use rand::Rng;
use rand_distr::Distribution as _;

use super::{expect_arity, invalid_parameter};

/// Strictly positive and not NaN.
fn positive(x: f64) -> bool {
    x > 0.0
}

/// `upper` strictly above `lower`, neither NaN.
fn ordered(lower: f64, upper: f64) -> bool {
    upper > lower
}

fn ln_normal(x: f64, mean: f64, sd: f64) -> f64 {
    if !positive(sd) {
        return f64::NEG_INFINITY;
    }
    let z = (x - mean) / sd;
    -0.5 * (2.0 * PI).ln() - sd.ln() - 0.5 * z * z
}

/// Normal distribution; parents `[mean, sd]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Normal;

impl Distribution for Normal {
    fn name(&self) -> &str {
        "normal"
    }

    fn ln_density(&self, value: &Value, parents: &[&Value]) -> Result<f64, DagError> {
        expect_arity(self.name(), parents, 2)?;
        Ok(ln_normal(
            value.as_real()?,
            parents[0].as_real()?,
            parents[1].as_real()?,
        ))
    }

    fn sample(&self, parents: &[&Value], rng: &mut RngHandle) -> Result<Value, DagError> {
        expect_arity(self.name(), parents, 2)?;
        let dist = rand_distr::Normal::new(parents[0].as_real()?, parents[1].as_real()?)
            .map_err(|err| invalid_parameter(self.name(), err))?;
        Ok(Value::Real(dist.sample(rng)))
    }
}

/// Independent normal elements of a fixed-length vector; parents `[mean, sd]`.
#[derive(Debug, Clone, Copy)]
pub struct NormalVector {
    /// Number of elements.
    pub len: usize,
}

impl Distribution for NormalVector {
    fn name(&self) -> &str {
        "normal-vector"
    }

    fn ln_density(&self, value: &Value, parents: &[&Value]) -> Result<f64, DagError> {
        expect_arity(self.name(), parents, 2)?;
        let mean = parents[0].as_real()?;
        let sd = parents[1].as_real()?;
        let elements = value.as_vector()?;
        if elements.len() != self.len {
            return Ok(f64::NEG_INFINITY);
        }
        Ok(elements.iter().map(|x| ln_normal(*x, mean, sd)).sum())
    }

    fn sample(&self, parents: &[&Value], rng: &mut RngHandle) -> Result<Value, DagError> {
        expect_arity(self.name(), parents, 2)?;
        let dist = rand_distr::Normal::new(parents[0].as_real()?, parents[1].as_real()?)
            .map_err(|err| invalid_parameter(self.name(), err))?;
        Ok(Value::RealVector(
            (0..self.len).map(|_| dist.sample(rng)).collect(),
        ))
    }
}

/// Exponential distribution; parents `[rate]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Exponential;

impl Distribution for Exponential {
    fn name(&self) -> &str {
        "exponential"
    }

    fn ln_density(&self, value: &Value, parents: &[&Value]) -> Result<f64, DagError> {
        expect_arity(self.name(), parents, 1)?;
        let x = value.as_real()?;
        let rate = parents[0].as_real()?;
        if !positive(rate) || x < 0.0 {
            return Ok(f64::NEG_INFINITY);
        }
        Ok(rate.ln() - rate * x)
    }

    fn sample(&self, parents: &[&Value], rng: &mut RngHandle) -> Result<Value, DagError> {
        expect_arity(self.name(), parents, 1)?;
        let dist = rand_distr::Exp::new(parents[0].as_real()?)
            .map_err(|err| invalid_parameter(self.name(), err))?;
        Ok(Value::Real(dist.sample(rng)))
    }
}

/// Continuous uniform distribution; parents `[lower, upper]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Uniform;

impl Distribution for Uniform {
    fn name(&self) -> &str {
        "uniform"
    }

    fn ln_density(&self, value: &Value, parents: &[&Value]) -> Result<f64, DagError> {
        expect_arity(self.name(), parents, 2)?;
        let x = value.as_real()?;
        let lower = parents[0].as_real()?;
        let upper = parents[1].as_real()?;
        if !ordered(lower, upper) || x < lower || x > upper {
            return Ok(f64::NEG_INFINITY);
        }
        Ok(-(upper - lower).ln())
    }

    fn sample(&self, parents: &[&Value], rng: &mut RngHandle) -> Result<Value, DagError> {
        expect_arity(self.name(), parents, 2)?;
        let lower = parents[0].as_real()?;
        let upper = parents[1].as_real()?;
        if !ordered(lower, upper) {
            return Err(invalid_parameter(self.name(), "upper bound must exceed lower bound"));
        }
        Ok(Value::Real(lower + (upper - lower) * rng.uniform01()))
    }
}

/// Log-normal distribution; parents `[mu, sigma]` on the log scale.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNormal;

impl Distribution for LogNormal {
    fn name(&self) -> &str {
        "lognormal"
    }

    fn ln_density(&self, value: &Value, parents: &[&Value]) -> Result<f64, DagError> {
        expect_arity(self.name(), parents, 2)?;
        let x = value.as_real()?;
        if !positive(x) {
            return Ok(f64::NEG_INFINITY);
        }
        Ok(ln_normal(x.ln(), parents[0].as_real()?, parents[1].as_real()?) - x.ln())
    }

    fn sample(&self, parents: &[&Value], rng: &mut RngHandle) -> Result<Value, DagError> {
        expect_arity(self.name(), parents, 2)?;
        let dist = rand_distr::LogNormal::new(parents[0].as_real()?, parents[1].as_real()?)
            .map_err(|err| invalid_parameter(self.name(), err))?;
        Ok(Value::Real(dist.sample(rng)))
    }
}

/// Uniform distribution over the integers `lower..=upper`; parents `[lower, upper]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscreteUniform;

impl Distribution for DiscreteUniform {
    fn name(&self) -> &str {
        "discrete-uniform"
    }

    fn ln_density(&self, value: &Value, parents: &[&Value]) -> Result<f64, DagError> {
        expect_arity(self.name(), parents, 2)?;
        let x = value.as_integer()?;
        let lower = parents[0].as_integer()?;
        let upper = parents[1].as_integer()?;
        if upper < lower || x < lower || x > upper {
            return Ok(f64::NEG_INFINITY);
        }
        Ok(-((upper - lower + 1) as f64).ln())
    }

    fn sample(&self, parents: &[&Value], rng: &mut RngHandle) -> Result<Value, DagError> {
        expect_arity(self.name(), parents, 2)?;
        let lower = parents[0].as_integer()?;
        let upper = parents[1].as_integer()?;
        if upper < lower {
            return Err(invalid_parameter(self.name(), "empty integer range"));
        }
        Ok(Value::Integer(rng.gen_range(lower..=upper)))
    }
}

/// Point mass at the value of its single parent; parents `[point]`.
///
/// Useful for pinning a stochastic node: every other value has zero mass.
#[derive(Debug, Clone, Copy, Default)]
pub struct Degenerate;

impl Distribution for Degenerate {
    fn name(&self) -> &str {
        "degenerate"
    }

    fn ln_density(&self, value: &Value, parents: &[&Value]) -> Result<f64, DagError> {
        expect_arity(self.name(), parents, 1)?;
        if value == parents[0] {
            Ok(0.0)
        } else {
            Ok(f64::NEG_INFINITY)
        }
    }

    fn sample(&self, parents: &[&Value], _rng: &mut RngHandle) -> Result<Value, DagError> {
        expect_arity(self.name(), parents, 1)?;
        Ok(parents[0].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_density_matches_closed_form() {
        let ln = Normal
            .ln_density(&Value::Real(0.0), &[&Value::Real(0.0), &Value::Real(1.0)])
            .unwrap();
        assert!((ln + 0.918_938_533_204_672_7).abs() < 1e-12);
    }

    #[test]
    fn out_of_support_is_negative_infinity() {
        let ln = Exponential
            .ln_density(&Value::Real(-1.0), &[&Value::Real(2.0)])
            .unwrap();
        assert_eq!(ln, f64::NEG_INFINITY);
        assert!(!Uniform.support_is_finite(
            &Value::Real(3.0),
            &[&Value::Real(0.0), &Value::Real(1.0)]
        ));
    }

    #[test]
    fn nan_parameters_are_outside_the_support() {
        let x = Value::Real(0.5);
        let nan = Value::Real(f64::NAN);
        let one = Value::Real(1.0);
        assert_eq!(Normal.ln_density(&x, &[&one, &nan]).unwrap(), f64::NEG_INFINITY);
        assert_eq!(Exponential.ln_density(&x, &[&nan]).unwrap(), f64::NEG_INFINITY);
        assert_eq!(Uniform.ln_density(&x, &[&nan, &one]).unwrap(), f64::NEG_INFINITY);
        assert_eq!(
            LogNormal.ln_density(&nan, &[&one, &one]).unwrap(),
            f64::NEG_INFINITY
        );
        let mut rng = RngHandle::from_seed(1);
        let err = Uniform.sample(&[&nan, &one], &mut rng).unwrap_err();
        assert_eq!(err.code(), "invalid-parameter");
    }

    #[test]
    fn arity_is_validated() {
        let err = Normal
            .ln_density(&Value::Real(0.0), &[&Value::Real(0.0)])
            .unwrap_err();
        assert_eq!(err.code(), "adapter-arity");
    }

    #[test]
    fn degenerate_has_a_single_atom() {
        let point = Value::Integer(3);
        let mut rng = RngHandle::from_seed(9);
        assert_eq!(Degenerate.sample(&[&point], &mut rng).unwrap(), point);
        assert_eq!(Degenerate.ln_density(&point, &[&point]).unwrap(), 0.0);
        assert_eq!(
            Degenerate.ln_density(&Value::Integer(4), &[&point]).unwrap(),
            f64::NEG_INFINITY
        );
    }

    #[test]
    fn discrete_uniform_samples_inside_range() {
        let mut rng = RngHandle::from_seed(3);
        for _ in 0..100 {
            let draw = DiscreteUniform
                .sample(&[&Value::Integer(2), &Value::Integer(4)], &mut rng)
                .unwrap();
            let x = draw.as_integer().unwrap();
            assert!((2..=4).contains(&x));
        }
    }
}
