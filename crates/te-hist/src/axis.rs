//! Histogram axes: categorical (sparse, string-valued) and binned (dense, numeric).

use serde::{Deserialize, Serialize};
use te_core::{Error, Result};

/// A categorical axis, e.g. `dataset` or `region`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatAxis {
    /// Axis name.
    pub name: String,
    /// Human-readable label.
    pub label: String,
}

impl CatAxis {
    /// Create a categorical axis.
    pub fn new(name: impl Into<String>, label: impl Into<String>) -> Self {
        Self { name: name.into(), label: label.into() }
    }
}

/// A numeric axis with fixed or variable-width bins covering `[edges[0], edges[n])`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinAxis {
    /// Axis name.
    pub name: String,
    /// Human-readable label.
    pub label: String,
    edges: Vec<f64>,
}

impl BinAxis {
    /// `n` equal-width bins between `lo` and `hi`.
    pub fn regular(
        name: impl Into<String>,
        label: impl Into<String>,
        n: usize,
        lo: f64,
        hi: f64,
    ) -> Result<Self> {
        if n == 0 || !(lo < hi) {
            return Err(Error::Config(format!("invalid regular axis: n={n}, range=[{lo}, {hi})")));
        }
        let width = (hi - lo) / n as f64;
        let mut edges: Vec<f64> = (0..n).map(|i| lo + width * i as f64).collect();
        edges.push(hi);
        Ok(Self { name: name.into(), label: label.into(), edges })
    }

    /// Variable-width bins from explicit, strictly increasing edges.
    pub fn variable(name: impl Into<String>, label: impl Into<String>, edges: Vec<f64>) -> Result<Self> {
        let axis = Self { name: name.into(), label: label.into(), edges };
        axis.validate()?;
        Ok(axis)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.edges.len() < 2 {
            return Err(Error::Config(format!(
                "axis '{}' needs at least two edges, got {}",
                self.name,
                self.edges.len()
            )));
        }
        if self.edges.iter().any(|e| !e.is_finite())
            || self.edges.windows(2).any(|w| !(w[0] < w[1]))
        {
            return Err(Error::Config(format!(
                "axis '{}' edges must be finite and strictly increasing",
                self.name
            )));
        }
        Ok(())
    }

    /// Bin edges (length = `n_bins() + 1`).
    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    /// Number of bins.
    pub fn n_bins(&self) -> usize {
        self.edges.len() - 1
    }

    /// Lower edge of the first bin.
    pub fn lo(&self) -> f64 {
        self.edges[0]
    }

    /// Upper edge of the last bin.
    pub fn hi(&self) -> f64 {
        self.edges[self.edges.len() - 1]
    }

    /// Bin centers.
    pub fn centers(&self) -> Vec<f64> {
        self.edges.windows(2).map(|w| 0.5 * (w[0] + w[1])).collect()
    }

    /// Index of the bin containing `val`.
    ///
    /// Returns `None` for values outside `[lo, hi)` and for NaN; such values
    /// are dropped by the histograms, never clipped into the outer bins.
    pub fn find_bin(&self, val: f64) -> Option<usize> {
        find_bin(&self.edges, val)
    }

    /// Whether every edge of `coarse` coincides with an edge of this axis.
    pub fn is_refined_by(&self, coarse: &BinAxis) -> bool {
        coarse.edges.iter().all(|&c| {
            let tol = 1e-9 * c.abs().max(1.0);
            self.edges.iter().any(|&e| (e - c).abs() <= tol)
        })
    }
}

/// Find the bin index for a value given sorted bin edges.
pub(crate) fn find_bin(edges: &[f64], val: f64) -> Option<usize> {
    if val.is_nan() || val < edges[0] || val >= edges[edges.len() - 1] {
        return None;
    }
    // Number of edges <= val; at least 1 and at most len - 1 given the range check.
    Some(edges.partition_point(|&e| e <= val) - 1)
}
