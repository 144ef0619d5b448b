//! Common data types for trigeff

use serde::{Deserialize, Serialize};

/// Least-squares fit result containing parameter estimates and uncertainties
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitResult {
    /// Best-fit parameter values
    pub parameters: Vec<f64>,

    /// Parameter uncertainties (sqrt of covariance diagonal, NaN if unavailable)
    pub uncertainties: Vec<f64>,

    /// Covariance matrix (row-major, N×N). `None` if it could not be estimated.
    pub covariance: Option<Vec<f64>>,

    /// Residual sum of squares at the minimum
    pub sse: f64,

    /// Number of data points entering the fit
    pub n_points: usize,

    /// Convergence status
    pub converged: bool,

    /// Number of optimizer iterations
    pub n_iter: u64,
}

impl FitResult {
    /// Create a new fit result without covariance
    pub fn new(parameters: Vec<f64>, sse: f64, n_points: usize, converged: bool, n_iter: u64) -> Self {
        let uncertainties = vec![f64::NAN; parameters.len()];
        Self { parameters, uncertainties, covariance: None, sse, n_points, converged, n_iter }
    }

    /// Attach a covariance matrix; uncertainties are taken from its diagonal.
    pub fn with_covariance(mut self, covariance: Vec<f64>) -> Self {
        let n = self.parameters.len();
        self.uncertainties = (0..n).map(|i| covariance[i * n + i].sqrt()).collect();
        self.covariance = Some(covariance);
        self
    }

    /// Degrees of freedom of the fit (`n_points - n_parameters`).
    pub fn ndof(&self) -> usize {
        self.n_points.saturating_sub(self.parameters.len())
    }

    /// Get correlation matrix element (i, j). Returns `None` if covariance is unavailable.
    pub fn correlation(&self, i: usize, j: usize) -> Option<f64> {
        let cov = self.covariance.as_ref()?;
        let n = self.parameters.len();
        if i >= n || j >= n {
            return None;
        }
        let sigma_i = self.uncertainties[i];
        let sigma_j = self.uncertainties[j];
        if !(sigma_i > 0.0 && sigma_j > 0.0) {
            return None;
        }
        Some(cov[i * n + j] / (sigma_i * sigma_j))
    }
}
