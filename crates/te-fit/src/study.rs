//! Turn-on studies over a merged accumulator.
//!
//! A study picks one distribution, optionally rebins it and integrates a
//! numeric slice, then computes one efficiency curve per entry in its curve
//! list. Each curve names a region pair base (`<base>_num` / `<base>_den`)
//! and a dataset pattern. Curves of the era studies are also fitted.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use te_core::{Error, Result};
use te_hist::{Accumulator, BinAxis, CategorySelector, Hist, Histogram};
use te_select::regions::{DEN_SUFFIX, NUM_SUFFIX};
use tracing::{info, warn};

use crate::function::FitFunction;
use crate::turnon::{Efficiency, FitOutcome, TurnOnFitter};

/// Categorical axis holding dataset names.
pub const DATASET_AXIS: &str = "dataset";
/// Categorical axis holding region names.
pub const REGION_AXIS: &str = "region";

/// Run eras as `(label, dataset pattern)`.
pub const ERAS: [(&str, &str); 3] =
    [("2022C+D", "Muon.*2022[CD]"), ("2022E", "Muon.*2022E"), ("2022F", "Muon.*2022F")];

/// Leading-jet |eta| bands as `(label, lo, hi)`.
pub const ETA_SLICES: [(&str, f64, f64); 3] =
    [("central", 0.0, 1.3), ("endcap", 1.3, 2.5), ("forward", 2.5, 5.0)];

/// Coarser binning applied before the ratio is formed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rebin {
    /// Numeric axis to rebin.
    pub axis: String,
    /// New edges; each must be an edge of the filled axis.
    pub edges: Vec<f64>,
}

impl Rebin {
    /// Rebin `axis` onto `edges`.
    pub fn new(axis: impl Into<String>, edges: Vec<f64>) -> Self {
        Self { axis: axis.into(), edges }
    }

    /// Equal-width edges, `n` bins over `[lo, hi]`.
    pub fn regular(axis: impl Into<String>, n: usize, lo: f64, hi: f64) -> Self {
        let width = (hi - lo) / n as f64;
        let mut edges: Vec<f64> = (0..n).map(|i| lo + width * i as f64).collect();
        edges.push(hi);
        Self::new(axis, edges)
    }

    fn apply(&self, hist: &Hist) -> Result<Hist> {
        let label = hist
            .axes()
            .iter()
            .find(|a| a.name == self.axis)
            .map(|a| a.label.clone())
            .ok_or_else(|| Error::Config(format!("no binned axis named '{}'", self.axis)))?;
        hist.rebin(&self.axis, BinAxis::variable(self.axis.clone(), label, self.edges.clone())?)
    }
}

/// Bins of a numeric axis summed away before the ratio is formed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slice {
    /// Numeric axis to integrate.
    pub axis: String,
    /// Lower edge (inclusive, compared with bin centers).
    pub lo: f64,
    /// Upper edge (exclusive).
    pub hi: f64,
}

/// One efficiency curve of a study.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Curve {
    /// Legend label.
    pub label: String,
    /// Region pair base.
    pub region: String,
    /// Dataset pattern, anchored at the start of the dataset name.
    pub datasets: String,
}

impl Curve {
    /// Curve for region pair `region` over the datasets matching `datasets`.
    pub fn new(label: impl Into<String>, region: impl Into<String>, datasets: impl Into<String>) -> Self {
        Self { label: label.into(), region: region.into(), datasets: datasets.into() }
    }
}

/// A named turn-on study.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnOnStudy {
    /// Unique study name, used in reports.
    pub name: String,
    /// Trigger description.
    pub title: String,
    /// Accumulator histogram to read.
    pub distribution: String,
    /// Optional coarser binning.
    pub rebin: Option<Rebin>,
    /// Optional numeric slice.
    pub slice: Option<Slice>,
    /// Curves to compute.
    pub curves: Vec<Curve>,
    /// Initial `(a, b)` for fitting each curve; no fit when absent.
    pub guess: Option<[f64; 2]>,
}

/// Efficiency and optional fit of one curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurveReport {
    /// The curve definition.
    pub curve: Curve,
    /// Per-bin efficiency.
    pub efficiency: Efficiency,
    /// Fit result, when the study fits.
    pub fit: Option<FitOutcome>,
}

impl CurveReport {
    /// Legend label, with fitted `mu` and `sigma` when available.
    pub fn legend(&self) -> String {
        match self.fit.as_ref().and_then(FitOutcome::fit) {
            Some(fit) => format!("{}, {}", self.curve.label, fit.label()),
            None => self.curve.label.clone(),
        }
    }
}

/// Result of one study.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyReport {
    /// Study name.
    pub name: String,
    /// Trigger description.
    pub title: String,
    /// Distribution read.
    pub distribution: String,
    /// Slice applied, if any.
    pub slice: Option<Slice>,
    /// One entry per curve.
    pub curves: Vec<CurveReport>,
}

/// A study that could not be set up (missing histogram, bad pattern, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedStudy {
    /// Study name.
    pub name: String,
    /// Error message.
    pub reason: String,
}

/// Results of a batch of studies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnOnReport {
    /// Shape used for every fit.
    pub function: FitFunction,
    /// Equation of that shape.
    pub equation: String,
    /// Completed studies, in input order.
    pub studies: Vec<StudyReport>,
    /// Studies that could not run.
    pub skipped: Vec<SkippedStudy>,
}

impl TurnOnReport {
    /// Completed study by name.
    pub fn study(&self, name: &str) -> Option<&StudyReport> {
        self.studies.iter().find(|s| s.name == name)
    }

    /// Number of curves whose fit failed.
    pub fn n_failed_fits(&self) -> usize {
        self.studies
            .iter()
            .flat_map(|s| &s.curves)
            .filter(|c| c.fit.as_ref().is_some_and(|f| f.failure().is_some()))
            .count()
    }
}

impl TurnOnStudy {
    /// Rebinned, sliced histogram the curves are read from.
    fn prepare(&self, acc: &Accumulator) -> Result<Hist> {
        let mut hist = acc.hist(&self.distribution)?.clone();
        if let Some(rebin) = &self.rebin {
            hist = rebin.apply(&hist)?;
        }
        if let Some(slice) = &self.slice {
            hist = hist.integrate_range(&slice.axis, slice.lo, slice.hi)?;
        }
        Ok(hist)
    }

    /// Compute every curve, fitting with `function` when the study has a guess.
    ///
    /// Fit failures are recorded in the curve reports; an `Err` means the
    /// study itself is inconsistent with the accumulator.
    pub fn run(&self, acc: &Accumulator, fitter: &TurnOnFitter, function: FitFunction) -> Result<StudyReport> {
        let hist = self.prepare(acc)?;
        let curves = self
            .curves
            .par_iter()
            .map(|curve| self.run_curve(&hist, curve, fitter, function))
            .collect::<Result<Vec<_>>>()?;
        info!(study = %self.name, curves = curves.len(), "turn-on study done");
        Ok(StudyReport {
            name: self.name.clone(),
            title: self.title.clone(),
            distribution: self.distribution.clone(),
            slice: self.slice.clone(),
            curves,
        })
    }

    fn run_curve(
        &self,
        hist: &Hist,
        curve: &Curve,
        fitter: &TurnOnFitter,
        function: FitFunction,
    ) -> Result<CurveReport> {
        let selected = hist.integrate_category(DATASET_AXIS, &CategorySelector::pattern(&curve.datasets)?)?;
        let project = |suffix: &str| -> Result<Histogram> {
            let region = format!("{}{suffix}", curve.region);
            selected.integrate_category(REGION_AXIS, &CategorySelector::Exact(region.clone()))?.project(region)
        };
        let efficiency = Efficiency::from_histograms(&project(NUM_SUFFIX)?, &project(DEN_SUFFIX)?)?;

        let fit = match self.guess {
            Some(guess) => {
                let outcome = fitter.fit_points(&efficiency.valid_points(), function, guess)?;
                if let Some(failure) = outcome.failure() {
                    warn!(study = %self.name, curve = %curve.label, %failure, "turn-on fit failed");
                }
                Some(outcome)
            }
            None => None,
        };
        Ok(CurveReport { curve: curve.clone(), efficiency, fit })
    }
}

/// Run `studies` in parallel. A study that cannot run is listed in
/// [`TurnOnReport::skipped`] and the others continue.
pub fn run_studies(
    acc: &Accumulator,
    studies: &[TurnOnStudy],
    fitter: &TurnOnFitter,
    function: FitFunction,
) -> TurnOnReport {
    let results: Vec<_> = studies.par_iter().map(|s| (s, s.run(acc, fitter, function))).collect();
    let mut report = TurnOnReport {
        function,
        equation: function.equation().to_string(),
        studies: Vec::with_capacity(results.len()),
        skipped: Vec::new(),
    };
    for (study, result) in results {
        match result {
            Ok(r) => report.studies.push(r),
            Err(e) => {
                warn!(study = %study.name, error = %e, "skipping turn-on study");
                report.skipped.push(SkippedStudy { name: study.name.clone(), reason: e.to_string() });
            }
        }
    }
    report
}

/// `start..stop` in steps of `step`.
fn steps(start: u32, stop: u32, step: usize) -> impl Iterator<Item = f64> {
    (start..stop).step_by(step).map(f64::from)
}

/// 20 GeV bins below 500, 40 GeV bins up to 1000. The grid is closed at the
/// filled axis end, so `[960, 1000)` stays a coarse bin instead of being dropped.
fn pt_rebin(axis: &str) -> Rebin {
    Rebin::new(axis, steps(0, 500, 20).chain(steps(500, 1000, 40)).chain([1000.0]).collect())
}

/// 80 GeV bins below 2000, 160 GeV bins up to 4000, closed at 4000 like [`pt_rebin`].
fn ht_rebin() -> Rebin {
    Rebin::new("ht", steps(0, 2000, 80).chain(steps(2000, 4000, 160)).chain([4000.0]).collect())
}

fn era_curves(region: &str, eras: &[(&str, &str)]) -> Vec<Curve> {
    eras.iter().map(|(label, pattern)| Curve::new(*label, region, *pattern)).collect()
}

/// The analysis' standard studies.
///
/// The pt and HT turn-ons are rebinned onto grids whose last edge is the upper
/// edge of the filled axis (1000 GeV and 4000 GeV), so the top coarse bin keeps
/// its content rather than moving it to `dropped`.
pub fn builtin_studies() -> Vec<TurnOnStudy> {
    let mut studies = Vec::new();

    // per-era turn-ons with fits
    for (region, title, distribution, rebin, guess) in [
        ("tr_metnomu", "HLT_PFMETNoMu120_PFMHTNoMu120_IDTight", "recoil", pt_rebin("recoil"), [0.05, 200.0]),
        (
            "tr_metnomu_filterhf",
            "HLT_PFMETNoMu120_PFMHTNoMu120_IDTight_FilterHF",
            "recoil",
            pt_rebin("recoil"),
            [0.05, 200.0],
        ),
        ("tr_jet", "HLT_PFJet500", "ak4_pt0", pt_rebin("jetpt"), [0.02, 500.0]),
        ("tr_ht", "HLT_PFHT1050", "ht", ht_rebin(), [0.04, 1050.0]),
    ] {
        studies.push(TurnOnStudy {
            name: format!("turnons_{region}"),
            title: title.into(),
            distribution: distribution.into(),
            rebin: Some(rebin),
            slice: None,
            curves: era_curves(region, &ERAS),
            guess: Some(guess),
        });
    }

    for (label, lo, hi) in ETA_SLICES {
        studies.push(TurnOnStudy {
            name: format!("turnons_tr_jet_eta_{label}"),
            title: format!("HLT_PFJet500, {lo:.1} < |eta| < {hi:.1}"),
            distribution: "ak4_abseta0_pt0".into(),
            rebin: Some(pt_rebin("jetpt")),
            slice: Some(Slice { axis: "jeteta".into(), lo, hi }),
            curves: era_curves("tr_jet", &ERAS),
            guess: None,
        });
    }

    studies.push(TurnOnStudy {
        name: "turnons_tr_jet_eta".into(),
        title: "HLT_PFJet500".into(),
        distribution: "ak4_eta0".into(),
        rebin: Some(Rebin::regular("jeteta", 25, -5.0, 5.0)),
        slice: None,
        curves: era_curves("tr_jet", &ERAS),
        guess: None,
    });

    studies.push(TurnOnStudy {
        name: "turnons_water_leak".into(),
        title: "HLT_PFJet500".into(),
        distribution: "ak4_pt0".into(),
        rebin: Some(pt_rebin("jetpt")),
        slice: None,
        curves: vec![
            Curve::new("water_leak", "tr_jet_water_leak", "Muon.*2022E"),
            Curve::new("no_water_leak", "tr_jet_water_leak_veto", "Muon.*2022E"),
        ],
        guess: None,
    });

    studies.push(TurnOnStudy {
        name: "turnons_l1_vs_hlt_ht1050".into(),
        title: "HT1050".into(),
        distribution: "ht".into(),
        rebin: Some(ht_rebin()),
        slice: None,
        curves: vec![
            Curve::new("hlt_ht1050", "tr_ht", "Muon.*2022E.*"),
            Curve::new("l1_ht1050", "tr_l1_ht", "Muon.*2022E.*"),
        ],
        guess: None,
    });

    studies
}

#[cfg(test)]
mod tests {
    use super::*;
    use te_hist::CatAxis;

    fn pt_accumulator() -> Accumulator {
        let hist = Hist::new(
            "Counts",
            vec![CatAxis::new(DATASET_AXIS, "Primary dataset"), CatAxis::new(REGION_AXIS, "Selection region")],
            vec![BinAxis::regular("jetpt", "Leading jet pt", 50, 0.0, 1000.0).unwrap()],
        )
        .unwrap();
        let mut acc = Accumulator::new();
        acc.insert("ak4_pt0", hist);
        acc
    }

    fn fill(acc: &mut Accumulator, dataset: &str, region: &str, values: &[f64]) {
        acc.hist_mut("ak4_pt0").unwrap().fill(&[dataset, region], &[values], None).unwrap();
    }

    #[test]
    fn builtin_rebin_edges_refine_the_filled_axes() {
        let jetpt = BinAxis::regular("jetpt", "", 50, 0.0, 1000.0).unwrap();
        let ht = BinAxis::regular("ht", "", 100, 0.0, 4000.0).unwrap();
        let eta = BinAxis::regular("jeteta", "", 50, -5.0, 5.0).unwrap();
        let pt = pt_rebin("jetpt");
        assert_eq!(pt.edges.len(), 25 + 13 + 1);
        assert!(jetpt.is_refined_by(&BinAxis::variable("jetpt", "", pt.edges).unwrap()));
        assert!(ht.is_refined_by(&BinAxis::variable("ht", "", ht_rebin().edges).unwrap()));
        let coarse_eta = Rebin::regular("jeteta", 25, -5.0, 5.0);
        assert!(eta.is_refined_by(&BinAxis::variable("jeteta", "", coarse_eta.edges).unwrap()));
    }

    #[test]
    fn coarse_grids_keep_the_top_bin() {
        let mut acc = pt_accumulator();
        fill(&mut acc, "d", "r", &[970.0, 990.0, 500.0]);
        let coarse = pt_rebin("jetpt").apply(acc.hist("ak4_pt0").unwrap()).unwrap();
        let edges = coarse.axes()[0].edges();
        assert_eq!(&edges[edges.len() - 2..], &[960.0, 1000.0]);
        assert_eq!(coarse.values(&["d", "r"]).last(), Some(&2.0));
        assert_eq!(coarse.get(&["d", "r"]).unwrap().dropped, 0.0);

        let ht = ht_rebin().edges;
        assert_eq!(&ht[ht.len() - 2..], &[3840.0, 4000.0]);
    }

    #[test]
    fn builtin_studies_are_unique() {
        let studies = builtin_studies();
        assert_eq!(studies.len(), 4 + 3 + 3);
        let mut names: Vec<_> = studies.iter().map(|s| s.name.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), studies.len());
        assert_eq!(studies.iter().filter(|s| s.guess.is_some()).count(), 4);
    }

    #[test]
    fn curves_select_datasets_by_pattern() {
        let mut acc = pt_accumulator();
        fill(&mut acc, "Muon_Run2022C", "tr_jet_den", &[30.0, 50.0]);
        fill(&mut acc, "Muon_Run2022D", "tr_jet_den", &[30.0, 50.0]);
        fill(&mut acc, "Muon_Run2022D", "tr_jet_num", &[50.0]);
        fill(&mut acc, "Muon_Run2022E", "tr_jet_den", &[30.0]);
        let study = TurnOnStudy {
            name: "t".into(),
            title: String::new(),
            distribution: "ak4_pt0".into(),
            rebin: None,
            slice: None,
            curves: era_curves("tr_jet", &ERAS),
            guess: None,
        };
        let report = study.run(&acc, &TurnOnFitter::default(), FitFunction::ErrorFunction).unwrap();
        let cd = &report.curves[0].efficiency;
        assert_eq!(cd.denominator[1], 2.0);
        assert_eq!(cd.ratio[1], 0.0);
        assert_eq!(cd.ratio[2], 0.5);
        assert!(cd.ratio[0].is_nan());
        let e = &report.curves[1].efficiency;
        assert_eq!(e.denominator.iter().sum::<f64>(), 1.0);
        // no 2022F datasets: every bin is undefined
        assert!(report.curves[2].efficiency.ratio.iter().all(|r| r.is_nan()));
        assert_eq!(report.curves[0].legend(), "2022C+D");
    }

    #[test]
    fn failed_fit_does_not_stop_the_study() {
        let mut acc = pt_accumulator();
        fill(&mut acc, "Muon_2022E", "tr_jet_den", &[510.0]);
        fill(&mut acc, "Muon_2022E", "tr_jet_num", &[510.0]);
        let study = TurnOnStudy {
            name: "single_bin".into(),
            title: String::new(),
            distribution: "ak4_pt0".into(),
            rebin: Some(pt_rebin("jetpt")),
            slice: None,
            curves: vec![Curve::new("E", "tr_jet", "Muon.*2022E")],
            guess: Some([0.02, 500.0]),
        };
        let report = run_studies(&acc, &[study], &TurnOnFitter::default(), FitFunction::Sigmoid);
        assert!(report.skipped.is_empty());
        let fit = report.studies[0].curves[0].fit.as_ref().unwrap();
        assert!(matches!(fit, FitOutcome::Failed(crate::turnon::FitFailure::TooFewPoints { n_valid: 1 })));
        assert_eq!(report.n_failed_fits(), 1);
    }

    #[test]
    fn missing_distribution_is_skipped() {
        let acc = pt_accumulator();
        let report = run_studies(&acc, &builtin_studies(), &TurnOnFitter::default(), FitFunction::ErrorFunction);
        // only the ak4_pt0 studies can run against this accumulator
        let ran: Vec<_> = report.studies.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(ran, ["turnons_tr_jet", "turnons_water_leak"]);
        assert_eq!(report.skipped.len(), 8);
        assert!(report.skipped.iter().any(|s| s.name == "turnons_tr_ht" && s.reason.contains("ht")));
    }
}
