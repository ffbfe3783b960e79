use crate::traits::{ResidualSystem, Scalar};
use nalgebra::DMatrix;
use num_traits::{One, Zero};
use std::ops::{Add, Div, Mul, Neg, Sub};

/// Simple Dual Number for Forward Mode AD
/// val: real part
/// eps: infinitesimal part
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Dual {
    pub val: f64,
    pub eps: f64,
}

impl Dual {
    pub fn new(val: f64, eps: f64) -> Self {
        Self { val, eps }
    }

    /// A seeded variable: value `val` with unit derivative.
    pub fn variable(val: f64) -> Self {
        Self::new(val, 1.0)
    }
}

impl Zero for Dual {
    fn zero() -> Self {
        Self::new(0.0, 0.0)
    }
    fn is_zero(&self) -> bool {
        self.val == 0.0 && self.eps == 0.0
    }
}

impl One for Dual {
    fn one() -> Self {
        Self::new(1.0, 0.0)
    }
}

impl Add for Dual {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.val + rhs.val, self.eps + rhs.eps)
    }
}

impl Sub for Dual {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.val - rhs.val, self.eps - rhs.eps)
    }
}

impl Mul for Dual {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        Self::new(self.val * rhs.val, self.val * rhs.eps + self.eps * rhs.val)
    }
}

impl Div for Dual {
    type Output = Self;
    fn div(self, rhs: Self) -> Self {
        let denom = rhs.val * rhs.val;
        Self::new(
            self.val / rhs.val,
            (self.eps * rhs.val - self.val * rhs.eps) / denom,
        )
    }
}

impl Neg for Dual {
    type Output = Self;
    fn neg(self) -> Self {
        Self::new(-self.val, -self.eps)
    }
}

impl Scalar for Dual {
    fn cst(value: f64) -> Self {
        Self::new(value, 0.0)
    }

    fn value(self) -> f64 {
        self.val
    }

    fn exp(self) -> Self {
        let e = self.val.exp();
        Self::new(e, e * self.eps)
    }

    fn ln(self) -> Self {
        Self::new(self.val.ln(), self.eps / self.val)
    }

    fn sqrt(self) -> Self {
        let s = self.val.sqrt();
        Self::new(s, self.eps / (2.0 * s))
    }

    fn powf(self, exponent: f64) -> Self {
        let p = self.val.powf(exponent);
        Self::new(p, exponent * self.val.powf(exponent - 1.0) * self.eps)
    }
}

/// Jacobian of a residual system at `state`, one dual sweep per column.
/// Returned row-major: `jacobian[(i, j)] = dF_i/dx_j`.
pub fn residual_jacobian<S>(system: &S, state: &[f64]) -> DMatrix<f64>
where
    S: ResidualSystem<Dual>,
{
    let dim = state.len();
    let mut jacobian = DMatrix::zeros(dim, dim);
    let mut dual_state = vec![Dual::zero(); dim];
    let mut dual_out = vec![Dual::zero(); dim];

    for j in 0..dim {
        for i in 0..dim {
            dual_state[i] = Dual::new(state[i], if i == j { 1.0 } else { 0.0 });
        }
        system.residual(&dual_state, &mut dual_out);
        for i in 0..dim {
            jacobian[(i, j)] = dual_out[i].eps;
        }
    }

    jacobian
}
