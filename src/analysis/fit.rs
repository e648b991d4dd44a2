//! Curve fitting for rating curves.
//!
//! `fit` turns paired samples into an immutable `FittedCurve`:
//! - `Power`: least-squares line through (ln x, ln y), `f(x) = a * x^b`.
//!   The first sample is dropped because rating tables start at Q = 0 or
//!   H = 0, where the log is undefined.
//! - `Linear`: piecewise linear interpolation.
//! - `Cubic`: not-a-knot cubic spline.
//!
//! Linear and cubic curves only evaluate inside the sampled x range.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::model::FitError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FitKind {
    Power,
    Linear,
    Cubic,
}

impl fmt::Display for FitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FitKind::Power => write!(f, "power"),
            FitKind::Linear => write!(f, "linear"),
            FitKind::Cubic => write!(f, "cubic"),
        }
    }
}

impl FromStr for FitKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "power" => Ok(FitKind::Power),
            "linear" => Ok(FitKind::Linear),
            "cubic" => Ok(FitKind::Cubic),
            other => Err(format!("unknown fit kind '{}'", other)),
        }
    }
}

/// A fitted curve. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub enum FittedCurve {
    Power { a: f64, b: f64 },
    Linear { xs: Vec<f64>, ys: Vec<f64> },
    /// `m` holds the spline's second derivative at each knot.
    Cubic { xs: Vec<f64>, ys: Vec<f64>, m: Vec<f64> },
}

impl FittedCurve {
    /// Sampled x range for interpolants; `None` for power curves.
    pub fn domain(&self) -> Option<(f64, f64)> {
        match self {
            FittedCurve::Power { .. } => None,
            FittedCurve::Linear { xs, .. } | FittedCurve::Cubic { xs, .. } => {
                Some((xs[0], xs[xs.len() - 1]))
            }
        }
    }

    pub fn eval(&self, x: f64) -> Result<f64, FitError> {
        if let Some((min, max)) = self.domain() {
            if !(min..=max).contains(&x) {
                return Err(FitError::OutOfDomain { x, min, max });
            }
        }

        match self {
            FittedCurve::Power { a, b } => Ok(a * x.powf(*b)),
            FittedCurve::Linear { xs, ys } => {
                let (lo, hi) = bracket(xs, x);
                if xs[hi] == xs[lo] {
                    return Ok(ys[hi]);
                }
                Ok(ys[lo] + (x - xs[lo]) * (ys[hi] - ys[lo]) / (xs[hi] - xs[lo]))
            }
            FittedCurve::Cubic { xs, ys, m } => {
                let (i, j) = bracket(xs, x);
                let h = xs[j] - xs[i];
                let left = xs[j] - x;
                let right = x - xs[i];
                Ok(m[i] * left.powi(3) / (6.0 * h)
                    + m[j] * right.powi(3) / (6.0 * h)
                    + (ys[i] / h - m[i] * h / 6.0) * left
                    + (ys[j] / h - m[j] * h / 6.0) * right)
            }
        }
    }

    pub fn eval_many(&self, xs: &[f64]) -> Result<Vec<f64>, FitError> {
        xs.iter().map(|&x| self.eval(x)).collect()
    }
}

/// Interval `(lo, lo + 1)` containing `x`, found like a left-sided binary
/// search clamped to the interior.
fn bracket(xs: &[f64], x: f64) -> (usize, usize) {
    let idx = xs.partition_point(|&v| v < x).clamp(1, xs.len() - 1);
    (idx - 1, idx)
}

/// Fits `ys` as a function of `xs`.
pub fn fit(xs: &[f64], ys: &[f64], kind: FitKind) -> Result<FittedCurve, FitError> {
    if xs.len() != ys.len() {
        return Err(FitError::LengthMismatch {
            xs: xs.len(),
            ys: ys.len(),
        });
    }

    match kind {
        FitKind::Power => fit_power(xs, ys),
        FitKind::Linear => {
            let (xs, ys) = sorted_samples(xs, ys, 2, false)?;
            Ok(FittedCurve::Linear { xs, ys })
        }
        FitKind::Cubic => {
            let (xs, ys) = sorted_samples(xs, ys, 4, true)?;
            let m = not_a_knot_second_derivatives(&xs, &ys);
            Ok(FittedCurve::Cubic { xs, ys, m })
        }
    }
}

fn fit_power(xs: &[f64], ys: &[f64]) -> Result<FittedCurve, FitError> {
    let got = xs.len().saturating_sub(1);
    if got < 2 {
        return Err(FitError::InsufficientSamples { needed: 3, got: xs.len() });
    }

    let mut log_x = Vec::with_capacity(got);
    let mut log_y = Vec::with_capacity(got);
    for (&x, &y) in xs.iter().zip(ys).skip(1) {
        if !(x > 0.0 && y > 0.0) || !x.is_finite() || !y.is_finite() {
            return Err(FitError::NonPositiveSample { x, y });
        }
        log_x.push(x.ln());
        log_y.push(y.ln());
    }

    let (b, log_a) = least_squares_line(&log_x, &log_y)?;
    Ok(FittedCurve::Power { a: log_a.exp(), b })
}

/// Slope and intercept of the least-squares line through the points.
fn least_squares_line(xs: &[f64], ys: &[f64]) -> Result<(f64, f64), FitError> {
    let n = xs.len() as f64;
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;

    let sxx: f64 = xs.iter().map(|x| (x - mean_x).powi(2)).sum();
    let sxy: f64 = xs
        .iter()
        .zip(ys)
        .map(|(x, y)| (x - mean_x) * (y - mean_y))
        .sum();

    if sxx == 0.0 {
        return Err(FitError::DuplicateX(xs[0].exp()));
    }

    let slope = sxy / sxx;
    Ok((slope, mean_y - slope * mean_x))
}

/// Copies the samples sorted by x (stable). With `strict`, repeated x
/// values are rejected.
fn sorted_samples(
    xs: &[f64],
    ys: &[f64],
    needed: usize,
    strict: bool,
) -> Result<(Vec<f64>, Vec<f64>), FitError> {
    if xs.len() < needed {
        return Err(FitError::InsufficientSamples { needed, got: xs.len() });
    }
    if xs.iter().chain(ys).any(|v| !v.is_finite()) {
        return Err(FitError::NonFinite);
    }

    let mut pairs: Vec<(f64, f64)> = xs.iter().copied().zip(ys.iter().copied()).collect();
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

    if strict {
        if let Some(w) = pairs.windows(2).find(|w| w[0].0 == w[1].0) {
            return Err(FitError::DuplicateX(w[0].0));
        }
    }

    Ok(pairs.into_iter().unzip())
}

/// Second derivatives of the not-a-knot cubic spline through `(xs, ys)`.
///
/// Not-a-knot makes the third derivative continuous at the second and
/// second-to-last knots. Substituting those two conditions for `m[0]` and
/// `m[n-1]` leaves a tridiagonal system in `m[1..n-1]`. Needs `n >= 4`.
fn not_a_knot_second_derivatives(xs: &[f64], ys: &[f64]) -> Vec<f64> {
    let n = xs.len();
    let h: Vec<f64> = xs.windows(2).map(|w| w[1] - w[0]).collect();
    let d: Vec<f64> = (0..n - 1).map(|i| (ys[i + 1] - ys[i]) / h[i]).collect();

    let size = n - 2;
    let mut sub = vec![0.0; size];
    let mut diag = vec![0.0; size];
    let mut sup = vec![0.0; size];
    let mut rhs = vec![0.0; size];
    for k in 0..size {
        let i = k + 1;
        sub[k] = h[i - 1];
        diag[k] = 2.0 * (h[i - 1] + h[i]);
        sup[k] = h[i];
        rhs[k] = 6.0 * (d[i] - d[i - 1]);
    }

    let (h0, h1) = (h[0], h[1]);
    diag[0] = (h0 + h1) * (h0 + 2.0 * h1) / h1;
    sup[0] = (h1 * h1 - h0 * h0) / h1;

    let (a, b) = (h[n - 3], h[n - 2]);
    sub[size - 1] = (a * a - b * b) / a;
    diag[size - 1] = (a + b) * (2.0 * a + b) / a;

    let inner = solve_tridiagonal(&sub, &diag, &sup, &rhs);

    let mut m = Vec::with_capacity(n);
    m.push(((h0 + h1) * inner[0] - h0 * inner[1]) / h1);
    m.extend_from_slice(&inner);
    m.push(((a + b) * inner[size - 1] - b * inner[size - 2]) / a);
    m
}

/// Thomas algorithm. `sub[0]` and `sup[len - 1]` are ignored.
fn solve_tridiagonal(sub: &[f64], diag: &[f64], sup: &[f64], rhs: &[f64]) -> Vec<f64> {
    let n = diag.len();
    let mut c = vec![0.0; n];
    let mut r = vec![0.0; n];

    c[0] = sup[0] / diag[0];
    r[0] = rhs[0] / diag[0];
    for k in 1..n {
        let denom = diag[k] - sub[k] * c[k - 1];
        c[k] = sup[k] / denom;
        r[k] = (rhs[k] - sub[k] * r[k - 1]) / denom;
    }

    let mut x = vec![0.0; n];
    x[n - 1] = r[n - 1];
    for k in (0..n - 1).rev() {
        x[k] = r[k] - c[k] * x[k + 1];
    }
    x
}
