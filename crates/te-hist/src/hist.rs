//! Multi-axis histogram: sparse categorical axes over dense binned axes.
//!
//! Each distinct categorical coordinate (e.g. `("Muon_2022E", "tr_jet_num")`)
//! owns a dense block of bins spanning every numeric axis, stored row-major
//! with the last axis varying fastest. Coordinates are created lazily on the
//! first fill, so a histogram with no fills is the additive identity.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use te_core::{Error, Result};

use crate::axis::{BinAxis, CatAxis};
use crate::histogram::Histogram;

/// Dense bin storage for one categorical coordinate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bins {
    /// Sum of weights per bin.
    pub sumw: Vec<f64>,
    /// Sum of squared weights per bin.
    pub sumw2: Vec<f64>,
    /// Sum of weights of values that fell outside the axis ranges, or that a
    /// reduction excluded.
    pub dropped: f64,
    /// Number of in-range fills. Reductions (`integrate_range`, `rebin`) keep
    /// the count of the histogram they were derived from.
    pub entries: u64,
}

impl Bins {
    pub(crate) fn zeros(size: usize) -> Self {
        Self { sumw: vec![0.0; size], sumw2: vec![0.0; size], dropped: 0.0, entries: 0 }
    }

    fn add(&mut self, other: &Bins) {
        for (a, b) in self.sumw.iter_mut().zip(&other.sumw) {
            *a += b;
        }
        for (a, b) in self.sumw2.iter_mut().zip(&other.sumw2) {
            *a += b;
        }
        self.dropped += other.dropped;
        self.entries += other.entries;
    }
}

/// Selects identifiers along a categorical axis.
#[derive(Debug, Clone)]
pub enum CategorySelector {
    /// Every identifier.
    All,
    /// One identifier, compared exactly.
    Exact(String),
    /// Identifiers matching a regular expression anchored at the start.
    Pattern(Regex),
}

impl CategorySelector {
    /// Build a pattern selector; the expression is anchored at the start of the identifier.
    pub fn pattern(expr: &str) -> Result<Self> {
        let re = Regex::new(&format!("^(?:{expr})"))
            .map_err(|e| Error::Config(format!("invalid category pattern '{expr}': {e}")))?;
        Ok(Self::Pattern(re))
    }

    /// Whether `value` is selected.
    pub fn matches(&self, value: &str) -> bool {
        match self {
            Self::All => true,
            Self::Exact(s) => s == value,
            Self::Pattern(re) => re.is_match(value),
        }
    }
}

/// Histogram with categorical and binned axes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "HistRepr", into = "HistRepr")]
pub struct Hist {
    label: String,
    categories: Vec<CatAxis>,
    axes: Vec<BinAxis>,
    pub(crate) bins: BTreeMap<Vec<String>, Bins>,
}

impl Hist {
    /// Create an empty histogram. At least one binned axis is required.
    pub fn new(label: impl Into<String>, categories: Vec<CatAxis>, axes: Vec<BinAxis>) -> Result<Self> {
        if axes.is_empty() {
            return Err(Error::Config("histogram needs at least one binned axis".into()));
        }
        for ax in &axes {
            ax.validate()?;
        }
        let mut names: Vec<&str> = categories.iter().map(|c| c.name.as_str()).collect();
        names.extend(axes.iter().map(|a| a.name.as_str()));
        let n = names.len();
        names.sort_unstable();
        names.dedup();
        if names.len() != n {
            return Err(Error::Config("histogram axis names must be unique".into()));
        }
        Ok(Self { label: label.into(), categories, axes, bins: BTreeMap::new() })
    }

    /// Content label (e.g. "Counts").
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Categorical axes.
    pub fn categories(&self) -> &[CatAxis] {
        &self.categories
    }

    /// Binned axes.
    pub fn axes(&self) -> &[BinAxis] {
        &self.axes
    }

    /// Number of dense bins per categorical coordinate.
    pub fn dense_size(&self) -> usize {
        self.axes.iter().map(BinAxis::n_bins).product()
    }

    /// Populated categorical coordinates.
    pub fn keys(&self) -> impl Iterator<Item = &[String]> {
        self.bins.keys().map(|k| k.as_slice())
    }

    /// Bins of one categorical coordinate, if it was ever filled.
    pub fn get(&self, key: &[&str]) -> Option<&Bins> {
        let key: Vec<String> = key.iter().map(|s| s.to_string()).collect();
        self.bins.get(&key)
    }

    /// Sum of weights per dense bin for one coordinate (zeros if never filled).
    pub fn values(&self, key: &[&str]) -> Vec<f64> {
        self.get(key).map(|b| b.sumw.clone()).unwrap_or_else(|| vec![0.0; self.dense_size()])
    }

    /// Distinct identifiers present along a categorical axis.
    pub fn identifiers(&self, axis: &str) -> Result<Vec<String>> {
        let pos = self.category_position(axis)?;
        let mut ids: Vec<String> = self.bins.keys().map(|k| k[pos].clone()).collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    /// Whether both histograms have the same label and the same categorical and
    /// binned axis definitions.
    pub fn compatible(&self, other: &Hist) -> bool {
        self.label == other.label && self.categories == other.categories && self.axes == other.axes
    }

    /// Pointwise addition of `other` into `self`.
    ///
    /// Mismatched labels or axis definitions are a configuration error.
    pub fn add(&mut self, other: &Hist) -> Result<()> {
        if !self.compatible(other) {
            return Err(Error::Config(format!(
                "cannot add histograms with different definitions: '{}' [{}] vs '{}' [{}]",
                self.label,
                self.describe_axes(),
                other.label,
                other.describe_axes()
            )));
        }
        let size = self.dense_size();
        for (key, bins) in &other.bins {
            self.bins.entry(key.clone()).or_insert_with(|| Bins::zeros(size)).add(bins);
        }
        Ok(())
    }

    /// A histogram with the same axes and no content.
    pub fn zeroed(&self) -> Self {
        Self {
            label: self.label.clone(),
            categories: self.categories.clone(),
            axes: self.axes.clone(),
            bins: BTreeMap::new(),
        }
    }

    /// Sum over the identifiers of categorical axis `axis` chosen by `selector`;
    /// the axis is removed from the result.
    pub fn integrate_category(&self, axis: &str, selector: &CategorySelector) -> Result<Hist> {
        let pos = self.category_position(axis)?;
        let mut categories = self.categories.clone();
        categories.remove(pos);
        let mut out = Hist { label: self.label.clone(), categories, axes: self.axes.clone(), bins: BTreeMap::new() };
        let size = self.dense_size();
        for (key, bins) in &self.bins {
            if !selector.matches(&key[pos]) {
                continue;
            }
            let mut reduced = key.clone();
            reduced.remove(pos);
            out.bins.entry(reduced).or_insert_with(|| Bins::zeros(size)).add(bins);
        }
        Ok(out)
    }

    /// Sum the bins of numeric axis `axis` whose centers lie in `[lo, hi)`;
    /// the axis is removed from the result.
    ///
    /// The weight of the excluded bins moves to `dropped`, so `sumw + dropped`
    /// is conserved per coordinate, as in [`Hist::rebin`].
    pub fn integrate_range(&self, axis: &str, lo: f64, hi: f64) -> Result<Hist> {
        let pos = self.axis_position(axis)?;
        if self.axes.len() == 1 {
            return Err(Error::Validation(format!(
                "cannot integrate away '{axis}', the only binned axis"
            )));
        }
        let selected: Vec<bool> =
            self.axes[pos].centers().iter().map(|c| (lo..hi).contains(c)).collect();

        let mut axes = self.axes.clone();
        axes.remove(pos);
        let mut out = Hist {
            label: self.label.clone(),
            categories: self.categories.clone(),
            axes,
            bins: BTreeMap::new(),
        };
        let out_size = out.dense_size();
        let shape: Vec<usize> = self.axes.iter().map(BinAxis::n_bins).collect();

        for (key, bins) in &self.bins {
            let mut reduced = Bins::zeros(out_size);
            reduced.dropped = bins.dropped;
            reduced.entries = bins.entries;
            for flat in 0..bins.sumw.len() {
                let idx = unravel(flat, &shape);
                if !selected[idx[pos]] {
                    reduced.dropped += bins.sumw[flat];
                    continue;
                }
                let target = ravel_without(&idx, &shape, pos);
                reduced.sumw[target] += bins.sumw[flat];
                reduced.sumw2[target] += bins.sumw2[flat];
            }
            out.bins.insert(key.clone(), reduced);
        }
        Ok(out)
    }

    /// Re-bin numeric axis `axis` onto `coarse`, whose edges must all be edges of the
    /// current axis. Old bins falling outside `coarse` move to `dropped`.
    pub fn rebin(&self, axis: &str, coarse: BinAxis) -> Result<Hist> {
        let pos = self.axis_position(axis)?;
        coarse.validate()?;
        if !self.axes[pos].is_refined_by(&coarse) {
            return Err(Error::Config(format!(
                "cannot rebin '{axis}': new edges are not a subset of the existing edges"
            )));
        }
        let mapping: Vec<Option<usize>> =
            self.axes[pos].centers().into_iter().map(|c| coarse.find_bin(c)).collect();

        let mut axes = self.axes.clone();
        axes[pos] = coarse;
        let mut out = Hist {
            label: self.label.clone(),
            categories: self.categories.clone(),
            axes,
            bins: BTreeMap::new(),
        };
        let old_shape: Vec<usize> = self.axes.iter().map(BinAxis::n_bins).collect();
        let new_shape: Vec<usize> = out.axes.iter().map(BinAxis::n_bins).collect();
        let out_size = out.dense_size();

        for (key, bins) in &self.bins {
            let mut rebinned = Bins::zeros(out_size);
            rebinned.dropped = bins.dropped;
            rebinned.entries = bins.entries;
            for flat in 0..bins.sumw.len() {
                let mut idx = unravel(flat, &old_shape);
                match mapping[idx[pos]] {
                    Some(b) => {
                        idx[pos] = b;
                        let target = ravel(&idx, &new_shape);
                        rebinned.sumw[target] += bins.sumw[flat];
                        rebinned.sumw2[target] += bins.sumw2[flat];
                    }
                    None => rebinned.dropped += bins.sumw[flat],
                }
            }
            out.bins.insert(key.clone(), rebinned);
        }
        Ok(out)
    }

    /// Project onto the single remaining binned axis, summing every categorical coordinate.
    pub fn project(&self, name: impl Into<String>) -> Result<Histogram> {
        if self.axes.len() != 1 {
            return Err(Error::Validation(format!(
                "projection needs exactly one binned axis, histogram has {}",
                self.axes.len()
            )));
        }
        let size = self.dense_size();
        let mut total = Bins::zeros(size);
        for bins in self.bins.values() {
            total.add(bins);
        }
        let entries = total.sumw.iter().sum();
        Ok(Histogram::from_axis(name, &self.axes[0], total.sumw, total.sumw2, entries))
    }

    fn category_position(&self, axis: &str) -> Result<usize> {
        self.categories
            .iter()
            .position(|c| c.name == axis)
            .ok_or_else(|| Error::Config(format!("no categorical axis named '{axis}'")))
    }

    fn axis_position(&self, axis: &str) -> Result<usize> {
        self.axes
            .iter()
            .position(|a| a.name == axis)
            .ok_or_else(|| Error::Config(format!("no binned axis named '{axis}'")))
    }

    fn describe_axes(&self) -> String {
        let cats = self.categories.iter().map(|c| c.name.clone());
        let dense = self.axes.iter().map(|a| format!("{}[{}]", a.name, a.n_bins()));
        cats.chain(dense).collect::<Vec<_>>().join(", ")
    }
}

pub(crate) fn ravel(idx: &[usize], shape: &[usize]) -> usize {
    idx.iter().zip(shape).fold(0, |acc, (&i, &n)| acc * n + i)
}

fn unravel(mut flat: usize, shape: &[usize]) -> Vec<usize> {
    let mut idx = vec![0; shape.len()];
    for (slot, &n) in idx.iter_mut().zip(shape).rev() {
        *slot = flat % n;
        flat /= n;
    }
    idx
}

fn ravel_without(idx: &[usize], shape: &[usize], skip: usize) -> usize {
    idx.iter()
        .zip(shape)
        .enumerate()
        .filter(|(d, _)| *d != skip)
        .fold(0, |acc, (_, (&i, &n))| acc * n + i)
}

#[derive(Serialize, Deserialize)]
struct HistRepr {
    label: String,
    categories: Vec<CatAxis>,
    axes: Vec<BinAxis>,
    bins: Vec<(Vec<String>, Bins)>,
}

impl From<Hist> for HistRepr {
    fn from(h: Hist) -> Self {
        Self { label: h.label, categories: h.categories, axes: h.axes, bins: h.bins.into_iter().collect() }
    }
}

impl TryFrom<HistRepr> for Hist {
    type Error = Error;

    fn try_from(repr: HistRepr) -> Result<Self> {
        let mut h = Hist::new(repr.label, repr.categories, repr.axes)?;
        let size = h.dense_size();
        for (key, bins) in repr.bins {
            if key.len() != h.categories.len() || bins.sumw.len() != size || bins.sumw2.len() != size {
                return Err(Error::Data(format!(
                    "stored bins for {key:?} do not match the histogram axes"
                )));
            }
            h.bins.insert(key, bins);
        }
        Ok(h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset_region_hist() -> Hist {
        Hist::new(
            "Counts",
            vec![CatAxis::new("dataset", "Primary dataset"), CatAxis::new("region", "Selection region")],
            vec![BinAxis::regular("jetpt", "Jet pT", 4, 0.0, 400.0).unwrap()],
        )
        .unwrap()
    }

    #[test]
    fn duplicate_axis_names_rejected() {
        let err = Hist::new(
            "Counts",
            vec![CatAxis::new("x", "")],
            vec![BinAxis::regular("x", "", 2, 0.0, 1.0).unwrap()],
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(Hist::new("Counts", vec![], vec![]).is_err());
    }

    #[test]
    fn add_is_pointwise_and_keeps_disjoint_keys() {
        let mut a = dataset_region_hist();
        a.fill(&["Muon_2022C", "den"], &[&[50.0, 150.0]], None).unwrap();
        let mut b = dataset_region_hist();
        b.fill(&["Muon_2022C", "den"], &[&[60.0]], None).unwrap();
        b.fill(&["Muon_2022E", "den"], &[&[350.0]], None).unwrap();

        a.add(&b).unwrap();
        assert_eq!(a.values(&["Muon_2022C", "den"]), vec![2.0, 1.0, 0.0, 0.0]);
        assert_eq!(a.values(&["Muon_2022E", "den"]), vec![0.0, 0.0, 0.0, 1.0]);
        assert_eq!(a.get(&["Muon_2022C", "den"]).unwrap().entries, 3);
    }

    #[test]
    fn add_rejects_mismatched_axes() {
        let mut a = dataset_region_hist();
        let b = Hist::new(
            "Counts",
            vec![CatAxis::new("dataset", ""), CatAxis::new("region", "")],
            vec![BinAxis::regular("jetpt", "Jet pT", 5, 0.0, 400.0).unwrap()],
        )
        .unwrap();
        let err = a.add(&b).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("jetpt[4]"));
    }

    #[test]
    fn add_rejects_mismatched_labels() {
        let mut a = dataset_region_hist();
        a.fill(&["d", "r"], &[&[50.0]], None).unwrap();
        let mut b = dataset_region_hist();
        b.label = "Events".into();
        b.fill(&["d", "r"], &[&[50.0]], None).unwrap();

        assert!(!a.compatible(&b));
        let err = a.add(&b).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("'Events'"), "{err}");
        assert_eq!(a.values(&["d", "r"]), vec![1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn integrate_dataset_by_pattern() {
        let mut h = dataset_region_hist();
        h.fill(&["Muon0_2022C", "num"], &[&[10.0]], None).unwrap();
        h.fill(&["Muon_2022D", "num"], &[&[110.0]], None).unwrap();
        h.fill(&["Muon_2022E", "num"], &[&[210.0]], None).unwrap();
        h.fill(&["SingleMuon_2022C", "num"], &[&[310.0]], None).unwrap();

        let sel = CategorySelector::pattern("Muon.*2022[CD]").unwrap();
        let cd = h.integrate_category("dataset", &sel).unwrap();
        assert_eq!(cd.categories().len(), 1);
        assert_eq!(cd.values(&["num"]), vec![1.0, 1.0, 0.0, 0.0]);

        let all = h.integrate_category("dataset", &CategorySelector::All).unwrap();
        assert_eq!(all.values(&["num"]), vec![1.0, 1.0, 1.0, 1.0]);

        assert!(h.integrate_category("run", &sel).is_err());
        assert!(CategorySelector::pattern("(").is_err());
    }

    #[test]
    fn identifiers_are_sorted_and_unique() {
        let mut h = dataset_region_hist();
        h.fill(&["B", "r1"], &[&[1.0]], None).unwrap();
        h.fill(&["A", "r2"], &[&[1.0]], None).unwrap();
        h.fill(&["A", "r1"], &[&[1.0]], None).unwrap();
        assert_eq!(h.identifiers("dataset").unwrap(), vec!["A", "B"]);
        assert_eq!(h.identifiers("region").unwrap(), vec!["r1", "r2"]);
    }

    #[test]
    fn rebin_merges_and_drops_outside() {
        let mut h = dataset_region_hist();
        h.fill(&["d", "r"], &[&[50.0, 150.0, 250.0, 350.0, 360.0]], None).unwrap();
        let coarse = BinAxis::variable("jetpt", "Jet pT", vec![0.0, 200.0, 300.0]).unwrap();
        let r = h.rebin("jetpt", coarse).unwrap();
        assert_eq!(r.values(&["d", "r"]), vec![2.0, 1.0]);
        assert_eq!(r.get(&["d", "r"]).unwrap().dropped, 2.0);

        let bad = BinAxis::variable("jetpt", "", vec![0.0, 150.0, 400.0]).unwrap();
        assert!(h.rebin("jetpt", bad).is_err());
    }

    #[test]
    fn integrate_range_on_two_axes() {
        let mut h = Hist::new(
            "Counts",
            vec![CatAxis::new("region", "")],
            vec![
                BinAxis::regular("jeteta", "|eta|", 2, 0.0, 5.0).unwrap(),
                BinAxis::regular("jetpt", "pT", 3, 0.0, 300.0).unwrap(),
            ],
        )
        .unwrap();
        h.fill(&["r"], &[&[0.5, 0.7, 3.0], &[50.0, 150.0, 250.0]], None).unwrap();
        assert_eq!(h.values(&["r"]), vec![1.0, 1.0, 0.0, 0.0, 0.0, 1.0]);

        let central = h.integrate_range("jeteta", 0.0, 2.5).unwrap();
        assert_eq!(central.axes().len(), 1);
        assert_eq!(central.values(&["r"]), vec![1.0, 1.0, 0.0]);

        let forward = h.integrate_range("jeteta", 2.5, 5.0).unwrap();
        assert_eq!(forward.values(&["r"]), vec![0.0, 0.0, 1.0]);

        // excluded slices are accounted as dropped weight
        let kept = central.get(&["r"]).unwrap();
        assert_eq!(kept.dropped, 1.0);
        assert_eq!(kept.entries, 3);
        assert_eq!(forward.get(&["r"]).unwrap().dropped, 2.0);

        assert!(central.integrate_range("jetpt", 0.0, 100.0).is_err());
    }

    #[test]
    fn project_sums_categories() {
        let mut h = dataset_region_hist();
        h.fill(&["a", "r"], &[&[10.0, 110.0]], Some(&[2.0, 1.0])).unwrap();
        h.fill(&["b", "r"], &[&[10.0]], None).unwrap();
        let p = h.project("sum").unwrap();
        assert_eq!(p.bin_content, vec![3.0, 1.0, 0.0, 0.0]);
        assert_eq!(p.sumw2, vec![5.0, 1.0, 0.0, 0.0]);
        assert_eq!(p.entries, 4.0);
    }

    #[test]
    fn serde_roundtrip_preserves_content() {
        let mut h = dataset_region_hist();
        h.fill(&["Muon_2022E", "tr_jet_num"], &[&[120.0, 130.0]], None).unwrap();
        let text = serde_json::to_string(&h).unwrap();
        let back: Hist = serde_json::from_str(&text).unwrap();
        assert_eq!(back, h);
    }

    #[test]
    fn deserialize_rejects_inconsistent_bins() {
        let text = r#"{"label":"Counts","categories":[{"name":"region","label":""}],
            "axes":[{"name":"x","label":"","edges":[0.0,1.0,2.0]}],
            "bins":[[["r"],{"sumw":[1.0],"sumw2":[1.0],"dropped":0.0,"entries":1}]]}"#;
        assert!(serde_json::from_str::<Hist>(text).is_err());
    }

    #[test]
    fn ravel_unravel_consistency() {
        let shape = [2, 3, 4];
        for flat in 0..24 {
            let idx = unravel(flat, &shape);
            assert_eq!(ravel(&idx, &shape), flat);
        }
        let idx = unravel(17, &shape);
        assert_eq!(ravel_without(&idx, &shape, 1), idx[0] * 4 + idx[2]);
    }
}
