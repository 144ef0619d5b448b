//! Chunk processor: candidates → region masks → histogram fills.
//!
//! Every chunk produces its own [`Accumulator`]; chunks are independent and
//! their results are combined with the commutative, associative merge, so
//! [`HltProcessor::process_chunks`] can reduce them in parallel in any order.

use std::f64::consts::PI;

use rayon::prelude::*;
use te_core::config::Config;
use te_core::Result;
use te_hist::{Accumulator, BinAxis, CatAxis, Hist};
use tracing::{debug, info};

use crate::batch::EventBatch;
use crate::candidates::Candidates;
use crate::cuts::{CutContext, dimuon_mass};
use crate::regions::RegionTable;

/// Categorical axes shared by every histogram.
fn category_axes() -> Vec<CatAxis> {
    vec![CatAxis::new("dataset", "Primary dataset"), CatAxis::new("region", "Selection region")]
}

/// |eta| edges chosen so that the central/endcap/forward bands (0-1.3, 1.3-2.5, 2.5-5.0)
/// are unions of whole bins.
const ABSETA_EDGES: [f64; 10] = [0.0, 0.5, 1.0, 1.3, 1.5, 2.0, 2.5, 3.0, 4.0, 5.0];

/// Empty accumulator with every analysis histogram registered.
pub fn hlt_accumulator() -> Result<Accumulator> {
    let jet_pt = BinAxis::regular("jetpt", "Jet pT (GeV)", 50, 0.0, 1000.0)?;
    let jet_eta = BinAxis::regular("jeteta", "Jet eta", 50, -5.0, 5.0)?;
    let jet_phi = BinAxis::regular("jetphi", "Jet phi", 50, -PI, PI)?;
    let jet_abseta = BinAxis::variable("jeteta", "Jet |eta|", ABSETA_EDGES.to_vec())?;
    let dimu_mass = BinAxis::regular("dimumass", "Dimuon mass (GeV)", 50, 60.0, 120.0)?;
    let recoil = BinAxis::regular("recoil", "Recoil (GeV)", 50, 0.0, 1000.0)?;
    let met = BinAxis::regular("met", "MET (GeV)", 50, 0.0, 1000.0)?;
    let ht = BinAxis::regular("ht", "HT (GeV)", 100, 0.0, 4000.0)?;

    let hist = |axes: Vec<BinAxis>| Hist::new("Counts", category_axes(), axes);
    Ok([
        ("ak4_pt0", hist(vec![jet_pt.clone()])?),
        ("ak4_eta0", hist(vec![jet_eta])?),
        ("ak4_phi0", hist(vec![jet_phi])?),
        ("ak4_abseta0_pt0", hist(vec![jet_abseta, jet_pt])?),
        ("dimu_mass", hist(vec![dimu_mass])?),
        ("recoil", hist(vec![recoil])?),
        ("met", hist(vec![met])?),
        ("ht", hist(vec![ht])?),
    ]
    .into_iter()
    .map(|(name, h)| (name.to_string(), h))
    .collect())
}

/// Per-event values filled into one histogram, one column per binned axis.
///
/// Events where the quantity is undefined (no leading jet, fewer than two
/// muons) have `present == false` and are never filled.
struct Observable {
    columns: Vec<Vec<f64>>,
    present: Vec<bool>,
}

impl Observable {
    fn always(column: Vec<f64>) -> Self {
        let present = vec![true; column.len()];
        Self { columns: vec![column], present }
    }

    fn optional(columns: Vec<Vec<Option<f64>>>) -> Self {
        let n = columns.first().map_or(0, Vec::len);
        let present = (0..n).map(|i| columns.iter().all(|c| c[i].is_some())).collect();
        let columns = columns.into_iter().map(|c| c.into_iter().map(|v| v.unwrap_or(0.0)).collect()).collect();
        Self { columns, present }
    }
}

/// Quantity filled into each built-in histogram.
fn observables(c: &Candidates) -> Result<Vec<(&'static str, Observable)>> {
    let abseta = c.ak4.leading("abseta")?;
    let pt = c.ak4.leading("pt")?;
    Ok(vec![
        ("ak4_pt0", Observable::optional(vec![pt.clone()])),
        ("ak4_eta0", Observable::optional(vec![c.ak4.leading("eta")?])),
        ("ak4_phi0", Observable::optional(vec![c.ak4.leading("phi")?])),
        ("ak4_abseta0_pt0", Observable::optional(vec![abseta, pt])),
        ("dimu_mass", Observable::optional(vec![dimuon_mass(&c.muons)?])),
        ("recoil", Observable::always(c.recoil_pt.clone())),
        ("met", Observable::always(c.met_pt.clone())),
        ("ht", Observable::always(c.ht.clone())),
    ])
}

/// Fills the analysis histograms for every region of the table.
#[derive(Debug, Clone)]
pub struct HltProcessor {
    cfg: Config,
    regions: RegionTable,
    template: Accumulator,
}

impl HltProcessor {
    /// Processor with the built-in regions and histograms.
    pub fn new(cfg: Config) -> Result<Self> {
        Self::with_regions(cfg, RegionTable::hlt_regions()?)
    }

    /// Processor with a custom region table.
    pub fn with_regions(cfg: Config, regions: RegionTable) -> Result<Self> {
        Ok(Self { cfg, regions, template: hlt_accumulator()? })
    }

    /// Active configuration.
    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Region table.
    pub fn regions(&self) -> &RegionTable {
        &self.regions
    }

    /// Empty accumulator of the right shape.
    pub fn template(&self) -> &Accumulator {
        &self.template
    }

    /// Process one chunk of events belonging to `dataset`.
    pub fn process(&self, dataset: &str, batch: &EventBatch) -> Result<Accumulator> {
        let candidates = Candidates::build(batch, &self.cfg)?;
        let ctx = CutContext::new(batch, &candidates, &self.cfg);
        let masks = self.regions.evaluate_all(&ctx)?;
        let observables = observables(&candidates)?;

        let mut out = self.template.zeroed();
        for (region, mask) in &masks {
            let n_pass = mask.iter().filter(|&&m| m).count();
            debug!(region = region.as_str(), n_pass, "region mask");
            for (name, obs) in &observables {
                let selected: Vec<bool> = mask.iter().zip(&obs.present).map(|(m, p)| *m && *p).collect();
                let cols: Vec<&[f64]> = obs.columns.iter().map(Vec::as_slice).collect();
                out.hist_mut(name)?.fill_masked(&[dataset, region.as_str()], &cols, Some(&selected), None)?;
            }
        }
        info!(dataset, n_events = batch.n_events, n_regions = masks.len(), "processed chunk");
        Ok(out)
    }

    /// Process independent chunks in parallel and merge the results.
    ///
    /// No chunks yields the empty (zeroed) accumulator.
    pub fn process_chunks(&self, dataset: &str, batches: &[EventBatch]) -> Result<Accumulator> {
        let merged = batches
            .par_iter()
            .map(|batch| self.process(dataset, batch))
            .try_reduce(|| self.template.zeroed(), |a, b| a.merge(&b))?;
        info!(dataset, n_chunks = batches.len(), "merged chunks");
        Ok(merged)
    }
}
