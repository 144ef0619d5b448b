//! Efficiency ratios and turn-on fits.
//!
//! A fit takes the numerator and denominator projections of a region pair,
//! forms the per-bin ratio, drops bins without a finite ratio and fits a
//! [`FitFunction`] to the remaining `(bin center, ratio)` points by least
//! squares. Failing to fit is an ordinary outcome ([`FitOutcome::Failed`]);
//! only an inconsistent input (different binning) is an error.

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::fmt;
use te_core::{Error, FitResult, Result};
use te_hist::Histogram;
use tracing::debug;

use crate::function::FitFunction;
use crate::optimizer::{BoundedLbfgs, Objective, OptimizerConfig};

/// Bound on the scaled parameters `p / p0`.
const SCALED_BOUND: f64 = 1e4;

/// Per-bin efficiency of a numerator/denominator pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Efficiency {
    /// Bin centers.
    pub centers: Vec<f64>,
    /// Numerator contents.
    pub numerator: Vec<f64>,
    /// Denominator contents.
    pub denominator: Vec<f64>,
    /// `numerator / denominator`; NaN where the denominator is zero.
    pub ratio: Vec<f64>,
}

impl Efficiency {
    /// Ratio of two histograms with identical binning.
    pub fn from_histograms(num: &Histogram, den: &Histogram) -> Result<Self> {
        if !num.same_binning(den) {
            return Err(Error::Config(format!(
                "numerator '{}' and denominator '{}' have different binning",
                num.name, den.name
            )));
        }
        let ratio = num
            .bin_content
            .iter()
            .zip(&den.bin_content)
            .map(|(&n, &d)| if d == 0.0 { f64::NAN } else { n / d })
            .collect();
        Ok(Self {
            centers: den.centers(),
            numerator: num.bin_content.clone(),
            denominator: den.bin_content.clone(),
            ratio,
        })
    }

    /// `(center, ratio)` of every bin with a finite ratio.
    pub fn valid_points(&self) -> Vec<(f64, f64)> {
        self.centers.iter().zip(&self.ratio).filter(|(_, r)| r.is_finite()).map(|(&x, &r)| (x, r)).collect()
    }
}

/// Why a fit produced no parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum FitFailure {
    /// Fewer than two bins with a finite ratio.
    TooFewPoints {
        /// Bins with a finite ratio.
        n_valid: usize,
    },
    /// The optimizer stopped without meeting a convergence criterion.
    NotConverged {
        /// Solver status.
        status: String,
        /// Last parameters `(a, b)`.
        parameters: Vec<f64>,
    },
    /// The optimizer aborted.
    Optimizer {
        /// Error message.
        message: String,
    },
}

impl fmt::Display for FitFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FitFailure::TooFewPoints { n_valid } => write!(f, "only {n_valid} bins with a finite efficiency"),
            FitFailure::NotConverged { status, .. } => write!(f, "fit did not converge ({status})"),
            FitFailure::Optimizer { message } => write!(f, "{message}"),
        }
    }
}

/// Converged turn-on fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnOnFit {
    /// Fitted shape.
    pub function: FitFunction,
    /// Parameters `(a, b)`, uncertainties and covariance.
    pub result: FitResult,
}

impl TurnOnFit {
    /// Steepness `a`.
    pub fn a(&self) -> f64 {
        self.result.parameters[0]
    }

    /// Turn-on point `b`.
    pub fn turn_on_point(&self) -> f64 {
        self.result.parameters[1]
    }

    /// Width `1 / a`.
    pub fn width(&self) -> f64 {
        1.0 / self.a()
    }

    /// Fitted curve at `x`.
    pub fn eval(&self, x: f64) -> f64 {
        self.function.eval(x, self.a(), self.turn_on_point())
    }

    /// `mu=..., sigma=...` legend label.
    pub fn label(&self) -> String {
        self.function.param_label(self.a(), self.turn_on_point())
    }
}

/// Result of one fit attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FitOutcome {
    /// Parameters found.
    Converged(TurnOnFit),
    /// Reported, non-fatal failure.
    Failed(FitFailure),
}

impl FitOutcome {
    /// The fit, if it converged.
    pub fn fit(&self) -> Option<&TurnOnFit> {
        match self {
            FitOutcome::Converged(fit) => Some(fit),
            FitOutcome::Failed(_) => None,
        }
    }

    /// The failure, if any.
    pub fn failure(&self) -> Option<&FitFailure> {
        match self {
            FitOutcome::Converged(_) => None,
            FitOutcome::Failed(failure) => Some(failure),
        }
    }
}

/// Sum of squared residuals in parameters scaled by the initial guess.
struct ScaledLeastSquares<'a> {
    function: FitFunction,
    points: &'a [(f64, f64)],
    scale: [f64; 2],
}

impl ScaledLeastSquares<'_> {
    fn unscale(&self, u: &[f64]) -> (f64, f64) {
        (u[0] * self.scale[0], u[1] * self.scale[1])
    }
}

impl Objective for ScaledLeastSquares<'_> {
    fn cost(&self, u: &[f64]) -> Result<f64> {
        let (a, b) = self.unscale(u);
        Ok(sse(self.function, self.points, a, b))
    }

    fn gradient(&self, u: &[f64]) -> Result<Vec<f64>> {
        let (a, b) = self.unscale(u);
        let mut g = vec![0.0; 2];
        for &(x, y) in self.points {
            let r = self.function.eval(x, a, b) - y;
            let [da, db] = self.function.gradient(x, a, b);
            g[0] += 2.0 * r * da * self.scale[0];
            g[1] += 2.0 * r * db * self.scale[1];
        }
        Ok(g)
    }
}

fn sse(function: FitFunction, points: &[(f64, f64)], a: f64, b: f64) -> f64 {
    points.iter().map(|&(x, y)| (function.eval(x, a, b) - y).powi(2)).sum()
}

/// `s^2 (J^T J)^-1` with `s^2 = SSE / (n - 2)`; `None` for `n <= 2` or a singular `J^T J`.
fn covariance(function: FitFunction, points: &[(f64, f64)], a: f64, b: f64, sse: f64) -> Option<Vec<f64>> {
    let n = points.len();
    if n <= 2 {
        return None;
    }
    let rows: Vec<f64> = points.iter().flat_map(|&(x, _)| function.gradient(x, a, b)).collect();
    let jac = DMatrix::from_row_slice(n, 2, &rows);
    let jtj = jac.transpose() * &jac;
    let inv = match nalgebra::linalg::Cholesky::new(jtj.clone()) {
        Some(chol) => chol.inverse(),
        None => jtj.lu().try_inverse()?,
    };
    let s2 = sse / (n - 2) as f64;
    let cov = inv * s2;
    if (0..2).any(|i| !(cov[(i, i)].is_finite() && cov[(i, i)] >= 0.0)) {
        return None;
    }
    // row-major
    Some(cov.transpose().as_slice().to_vec())
}

/// Least-squares turn-on fitter.
#[derive(Debug, Clone)]
pub struct TurnOnFitter {
    optimizer: BoundedLbfgs,
}

impl Default for TurnOnFitter {
    fn default() -> Self {
        Self::new(OptimizerConfig::default())
    }
}

impl TurnOnFitter {
    /// Fitter with the given optimizer settings.
    pub fn new(config: OptimizerConfig) -> Self {
        Self { optimizer: BoundedLbfgs::new(config) }
    }

    /// Fit `function` to `numerator / denominator` starting from `guess = (a, b)`.
    ///
    /// Different binning of the two histograms is a configuration error.
    pub fn fit(
        &self,
        numerator: &Histogram,
        denominator: &Histogram,
        function: FitFunction,
        guess: [f64; 2],
    ) -> Result<FitOutcome> {
        let eff = Efficiency::from_histograms(numerator, denominator)?;
        self.fit_points(&eff.valid_points(), function, guess)
    }

    /// Fit `function` to `(x, efficiency)` points.
    pub fn fit_points(&self, points: &[(f64, f64)], function: FitFunction, guess: [f64; 2]) -> Result<FitOutcome> {
        if guess.iter().any(|g| !g.is_finite()) {
            return Err(Error::Validation(format!("initial guess {guess:?} is not finite")));
        }
        if points.len() < 2 {
            return Ok(FitOutcome::Failed(FitFailure::TooFewPoints { n_valid: points.len() }));
        }

        let scale = guess.map(|g| if g == 0.0 { 1.0 } else { g });
        let objective = ScaledLeastSquares { function, points, scale };
        let start: Vec<f64> = guess.iter().zip(&scale).map(|(g, s)| g / s).collect();
        let bounds = [(-SCALED_BOUND, SCALED_BOUND); 2];

        let minimum = match self.optimizer.minimize(&objective, &start, &bounds) {
            Ok(m) => m,
            Err(e) => return Ok(FitOutcome::Failed(FitFailure::Optimizer { message: e.to_string() })),
        };
        let (a, b) = objective.unscale(&minimum.parameters);
        debug!(%function, a, b, sse = minimum.cost, n_points = points.len(), "{minimum}");
        if !minimum.converged {
            return Ok(FitOutcome::Failed(FitFailure::NotConverged {
                status: minimum.status,
                parameters: vec![a, b],
            }));
        }

        let sse = sse(function, points, a, b);
        let mut result = FitResult::new(vec![a, b], sse, points.len(), true, minimum.n_iter);
        if let Some(cov) = covariance(function, points, a, b, sse) {
            result = result.with_covariance(cov);
        }
        Ok(FitOutcome::Converged(TurnOnFit { function, result }))
    }
}

/// Fit with default optimizer settings.
pub fn fit(numerator: &Histogram, denominator: &Histogram, function: FitFunction, guess: [f64; 2]) -> Result<FitOutcome> {
    TurnOnFitter::default().fit(numerator, denominator, function, guess)
}
