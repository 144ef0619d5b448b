//! One-dimensional histogram, the projection consumed by efficiency ratios and fits.

use serde::{Deserialize, Serialize};

use crate::axis::BinAxis;

/// A 1D histogram projected out of a [`crate::Hist`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    /// Histogram name.
    pub name: String,
    /// Histogram title (axis label).
    pub title: String,
    /// Number of bins (excluding under/overflow).
    pub n_bins: usize,
    /// Lower edge of first bin.
    pub x_min: f64,
    /// Upper edge of last bin.
    pub x_max: f64,
    /// Bin edges (length = n_bins + 1).
    pub bin_edges: Vec<f64>,
    /// Bin contents (length = n_bins, excluding under/overflow).
    pub bin_content: Vec<f64>,
    /// Sum of weights squared per bin.
    pub sumw2: Vec<f64>,
    /// Total number of in-range entries.
    pub entries: f64,
}

impl Histogram {
    /// Build from an axis and matching contents.
    pub fn from_axis(
        name: impl Into<String>,
        axis: &BinAxis,
        bin_content: Vec<f64>,
        sumw2: Vec<f64>,
        entries: f64,
    ) -> Self {
        Self {
            name: name.into(),
            title: axis.label.clone(),
            n_bins: axis.n_bins(),
            x_min: axis.lo(),
            x_max: axis.hi(),
            bin_edges: axis.edges().to_vec(),
            bin_content,
            sumw2,
            entries,
        }
    }

    /// Bin centers.
    pub fn centers(&self) -> Vec<f64> {
        self.bin_edges.windows(2).map(|w| 0.5 * (w[0] + w[1])).collect()
    }

    /// Whether `other` has exactly the same bin edges.
    pub fn same_binning(&self, other: &Histogram) -> bool {
        self.n_bins == other.n_bins && self.bin_edges == other.bin_edges
    }

    /// Sum of all bin contents.
    pub fn integral(&self) -> f64 {
        self.bin_content.iter().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_axis_copies_binning() {
        let ax = BinAxis::variable("recoil", "Recoil (GeV)", vec![50.0, 150.0, 250.0, 350.0]).unwrap();
        let h = Histogram::from_axis("num", &ax, vec![0.0, 5.0, 10.0], vec![0.0, 5.0, 10.0], 15.0);
        assert_eq!(h.n_bins, 3);
        assert_eq!(h.x_min, 50.0);
        assert_eq!(h.x_max, 350.0);
        assert_eq!(h.title, "Recoil (GeV)");
        assert_eq!(h.centers(), vec![100.0, 200.0, 300.0]);
        assert_eq!(h.integral(), 15.0);
    }

    #[test]
    fn binning_comparison() {
        let a = BinAxis::regular("x", "", 3, 0.0, 3.0).unwrap();
        let b = BinAxis::regular("x", "", 3, 0.0, 6.0).unwrap();
        let ha = Histogram::from_axis("a", &a, vec![0.0; 3], vec![0.0; 3], 0.0);
        let hb = Histogram::from_axis("b", &b, vec![0.0; 3], vec![0.0; 3], 0.0);
        assert!(ha.same_binning(&ha.clone()));
        assert!(!ha.same_binning(&hb));
    }
}
