use num_traits::{One, Zero};
use std::fmt::Debug;
use std::ops::{Add, Div, Mul, Neg, Sub};

/// A trait for types that residuals and fit models can be evaluated on.
/// Implemented by `f64` and by the forward-mode `Dual` number, so a single
/// generic residual yields both values and Jacobians.
pub trait Scalar:
    Copy
    + Debug
    + PartialOrd
    + Zero
    + One
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + 'static
{
    /// Lifts a constant into the scalar type (zero derivative part).
    fn cst(value: f64) -> Self;

    /// The real (value) part.
    fn value(self) -> f64;

    fn exp(self) -> Self;
    fn ln(self) -> Self;
    fn sqrt(self) -> Self;
    fn powf(self, exponent: f64) -> Self;

    fn is_finite(self) -> bool {
        self.value().is_finite()
    }
}

impl Scalar for f64 {
    fn cst(value: f64) -> Self {
        value
    }
    fn value(self) -> f64 {
        self
    }
    fn exp(self) -> Self {
        f64::exp(self)
    }
    fn ln(self) -> Self {
        f64::ln(self)
    }
    fn sqrt(self) -> Self {
        f64::sqrt(self)
    }
    fn powf(self, exponent: f64) -> Self {
        f64::powf(self, exponent)
    }
}

/// A square system of residual equations F(x) = 0.
///
/// Implementors capture their fixed context (densities, temperature, target
/// sound speeds, ...) by value, so the solver never reaches into shared
/// mutable state.
pub trait ResidualSystem<T: Scalar> {
    /// Number of unknowns (and equations).
    fn dimension(&self) -> usize;

    /// Evaluates the residual at `x` and writes it into `out`.
    fn residual(&self, x: &[T], out: &mut [T]);
}
