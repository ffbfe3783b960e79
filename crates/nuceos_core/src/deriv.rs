//! Central finite differences with error control, used for the
//! second-derivative quantities behind the sound speed.

use anyhow::{bail, Result};

#[derive(Debug, Clone, Copy)]
pub struct Derivative {
    pub value: f64,
    pub abserr: f64,
}

/// Default step for differentiating around `x`.
pub fn default_step(x: f64) -> f64 {
    if x != 0.0 {
        1e-4 * x.abs()
    } else {
        1e-4
    }
}

/// Five-point central derivative of `f` at `x` with step `h`. The step is
/// re-optimised once when rounding error is smaller than truncation error.
pub fn deriv_central<F>(mut f: F, x: f64, h: f64) -> Result<Derivative>
where
    F: FnMut(f64) -> Result<f64>,
{
    if !(h > 0.0) {
        bail!("Derivative step must be positive (got {h}).");
    }
    let (r0, round, trunc) = central_estimate(&mut f, x, h)?;
    let mut value = r0;
    let mut error = round + trunc;

    if round < trunc && round > 0.0 && trunc > 0.0 {
        let h_opt = h * (round / (2.0 * trunc)).powf(1.0 / 3.0);
        let (r_opt, round_opt, trunc_opt) = central_estimate(&mut f, x, h_opt)?;
        let error_opt = round_opt + trunc_opt;
        if error_opt < error && (r_opt - r0).abs() < 4.0 * error {
            value = r_opt;
            error = error_opt;
        }
    }

    if !value.is_finite() {
        bail!("Derivative at x = {x} is not finite.");
    }
    Ok(Derivative { value, abserr: error })
}

fn central_estimate<F>(f: &mut F, x: f64, h: f64) -> Result<(f64, f64, f64)>
where
    F: FnMut(f64) -> Result<f64>,
{
    let fm1 = f(x - h)?;
    let fp1 = f(x + h)?;
    let fmh = f(x - 0.5 * h)?;
    let fph = f(x + 0.5 * h)?;

    let r3 = 0.5 * (fp1 - fm1);
    let r5 = (4.0 / 3.0) * (fph - fmh) - r3 / 3.0;

    let e3 = (fp1.abs() + fm1.abs()) * f64::EPSILON;
    let e5 = 2.0 * (fph.abs() + fmh.abs()) * f64::EPSILON + e3;
    let dy = (r3 / h).abs().max((r5 / h).abs()) * (x.abs() / h) * f64::EPSILON;

    let trunc = ((r5 - r3) / h).abs();
    let round = (e5 / h).abs() + dy;
    Ok((r5 / h, round, trunc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn differentiates_sine() {
        let d = deriv_central(|x| Ok(x.sin()), 0.7, 1e-3).expect("derivative should compute");
        assert!((d.value - 0.7_f64.cos()).abs() < 1e-10);
        assert!(d.abserr < 1e-6);
    }

    #[test]
    fn default_step_scales_with_argument() {
        assert!((default_step(2.0) - 2e-4).abs() < 1e-16);
        assert!((default_step(0.0) - 1e-4).abs() < 1e-16);
    }

    #[test]
    fn propagates_function_failure() {
        let result = deriv_central(
            |x| {
                if x < 1.0 {
                    bail!("outside domain")
                }
                Ok(x)
            },
            1.0,
            0.1,
        );
        assert!(result.is_err());
    }
}
