//! Named event-level cut predicates.
//!
//! Every cut is a variant of the closed [`Cut`] enum, resolved from its
//! string name, and evaluates to one boolean per event. Cuts never mutate
//! their inputs; evaluating a cut twice yields the same mask.

use std::fmt;
use std::str::FromStr;

use te_core::config::Config;
use te_core::{Error, Result};

use crate::batch::EventBatch;
use crate::candidates::{CandidateArray, Candidates};

/// Leading-muon pT threshold of the `muon_pt>30` cut (GeV).
const LEADING_MUON_PT: f64 = 30.0;

/// Everything a cut may read for one chunk.
#[derive(Debug, Clone, Copy)]
pub struct CutContext<'a> {
    /// Raw columns (trigger bits, quality flags, luminosity mask).
    pub batch: &'a EventBatch,
    /// Candidate collections and event-level quantities.
    pub candidates: &'a Candidates,
    /// Thresholds and column names.
    pub cfg: &'a Config,
}

impl<'a> CutContext<'a> {
    /// Bundle the inputs of one chunk.
    pub fn new(batch: &'a EventBatch, candidates: &'a Candidates, cfg: &'a Config) -> Self {
        Self { batch, candidates, cfg }
    }

    /// Number of events in the chunk.
    pub fn n_events(&self) -> usize {
        self.batch.n_events
    }
}

/// Registry of every named cut.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Cut {
    /// Leading jet passes the pT and |eta| thresholds.
    LeadAk4PtEta,
    /// Leading jet passes the tight jet ID.
    LeadAk4Id,
    /// Leading jet lies inside the water-leak window.
    LeadAk4WaterLeak,
    /// A leading jet exists and lies outside the water-leak window.
    LeadAk4WaterLeakVeto,
    /// Exactly one loose muon.
    OneMuon,
    /// Exactly two loose muons.
    TwoMuons,
    /// No loose electron.
    VetoEle,
    /// No loose photon.
    VetoPho,
    /// At least one muon passing the tight working point.
    AtLeastOneTightMu,
    /// Single-muon reference trigger.
    HltIsoMu27,
    /// MET+MHT trigger.
    MftmhtTrig,
    /// MET+MHT trigger with the HF filter.
    MftmhtCleanTrig,
    /// Single-jet trigger.
    Jet500Trig,
    /// HT trigger.
    Ht1050Trig,
    /// L1 seed of the HT trigger.
    L1Ht1050Trig,
    /// Leading muon pT above 30 GeV.
    MuonPt30,
    /// Invariant mass of the two leading muons inside the dimuon window.
    DimuonMass,
    /// Two leading muons have opposite charge.
    DimuonCharge,
    /// Event is in the certified-luminosity mask.
    LumiMask,
    /// Every MET quality filter passes.
    FiltMet,
    /// PF and calorimeter MET agree relative to the recoil.
    CaloDiff,
}

impl Cut {
    /// Every registered cut.
    pub const ALL: [Cut; 21] = [
        Cut::LeadAk4PtEta,
        Cut::LeadAk4Id,
        Cut::LeadAk4WaterLeak,
        Cut::LeadAk4WaterLeakVeto,
        Cut::OneMuon,
        Cut::TwoMuons,
        Cut::VetoEle,
        Cut::VetoPho,
        Cut::AtLeastOneTightMu,
        Cut::HltIsoMu27,
        Cut::MftmhtTrig,
        Cut::MftmhtCleanTrig,
        Cut::Jet500Trig,
        Cut::Ht1050Trig,
        Cut::L1Ht1050Trig,
        Cut::MuonPt30,
        Cut::DimuonMass,
        Cut::DimuonCharge,
        Cut::LumiMask,
        Cut::FiltMet,
        Cut::CaloDiff,
    ];

    /// Registered name.
    pub fn name(self) -> &'static str {
        match self {
            Cut::LeadAk4PtEta => "leadak4_pt_eta",
            Cut::LeadAk4Id => "leadak4_id",
            Cut::LeadAk4WaterLeak => "leadak4_water_leak",
            Cut::LeadAk4WaterLeakVeto => "leadak4_water_leak_veto",
            Cut::OneMuon => "one_muon",
            Cut::TwoMuons => "two_muons",
            Cut::VetoEle => "veto_ele",
            Cut::VetoPho => "veto_pho",
            Cut::AtLeastOneTightMu => "at_least_one_tight_mu",
            Cut::HltIsoMu27 => "HLT_IsoMu27",
            Cut::MftmhtTrig => "mftmht_trig",
            Cut::MftmhtCleanTrig => "mftmht_clean_trig",
            Cut::Jet500Trig => "jet500_trig",
            Cut::Ht1050Trig => "ht1050_trig",
            Cut::L1Ht1050Trig => "l1_ht1050_trig",
            Cut::MuonPt30 => "muon_pt>30",
            Cut::DimuonMass => "dimuon_mass",
            Cut::DimuonCharge => "dimuon_charge",
            Cut::LumiMask => "lumi_mask",
            Cut::FiltMet => "filt_met",
            Cut::CaloDiff => "calo_diff",
        }
    }

    /// Resolve a registered name.
    pub fn from_name(name: &str) -> Option<Cut> {
        Cut::ALL.into_iter().find(|c| c.name() == name)
    }

    /// Whether this cut is a trigger-bit lookup.
    pub fn is_trigger(self) -> bool {
        matches!(
            self,
            Cut::HltIsoMu27
                | Cut::MftmhtTrig
                | Cut::MftmhtCleanTrig
                | Cut::Jet500Trig
                | Cut::Ht1050Trig
                | Cut::L1Ht1050Trig
        )
    }

    /// Per-event mask of this cut.
    pub fn evaluate(self, ctx: &CutContext<'_>) -> Result<Vec<bool>> {
        let c = ctx.candidates;
        let cfg = ctx.cfg;
        let sel = &cfg.selection;
        let triggers = &cfg.triggers;
        match self {
            Cut::LeadAk4PtEta => {
                let pt = c.ak4.leading("pt")?;
                let abseta = c.ak4.leading("abseta")?;
                Ok(pt
                    .iter()
                    .zip(&abseta)
                    .map(|(pt, abseta)| match (pt, abseta) {
                        (Some(pt), Some(abseta)) => *pt > sel.leadak4.pt && *abseta < sel.leadak4.eta,
                        _ => false,
                    })
                    .collect())
            }
            Cut::LeadAk4Id => Ok(c.ak4.leading_flag("tight_id")?.into_iter().map(|id| id == Some(true)).collect()),
            Cut::LeadAk4WaterLeak | Cut::LeadAk4WaterLeakVeto => {
                let inside = self == Cut::LeadAk4WaterLeak;
                let eta = c.ak4.leading("eta")?;
                let phi = c.ak4.leading("phi")?;
                Ok(eta
                    .iter()
                    .zip(&phi)
                    .map(|(eta, phi)| match (eta, phi) {
                        (Some(eta), Some(phi)) => sel.water_leak.contains(*eta, *phi) == inside,
                        _ => false,
                    })
                    .collect())
            }
            Cut::OneMuon => Ok(count_equals(&c.muons, 1)),
            Cut::TwoMuons => Ok(count_equals(&c.muons, 2)),
            Cut::VetoEle => Ok(count_equals(&c.electrons, 0)),
            Cut::VetoPho => Ok(count_equals(&c.photons, 0)),
            Cut::AtLeastOneTightMu => {
                let wp = &cfg.muon.cuts.tight;
                let tight = c.muons.flags("tight_id")?;
                let pt = c.muons.values("pt")?;
                let abseta = c.muons.values("abseta")?;
                let iso = c.muons.values("iso")?;
                let mask: Vec<bool> = (0..c.muons.n_objects())
                    .map(|i| tight[i] && pt[i] > wp.pt && abseta[i] < wp.eta && iso[i] < wp.iso)
                    .collect();
                Ok(c.muons.count_where(&mask).into_iter().map(|n| n >= 1).collect())
            }
            Cut::HltIsoMu27 => ctx.batch.flag(&triggers.isomu27),
            Cut::MftmhtTrig => ctx.batch.flag(&triggers.mftmht),
            Cut::MftmhtCleanTrig => ctx.batch.flag(&triggers.mftmht_clean),
            Cut::Jet500Trig => ctx.batch.flag(&triggers.jet500),
            Cut::Ht1050Trig => ctx.batch.flag(&triggers.ht1050),
            Cut::L1Ht1050Trig => ctx.batch.flag(&triggers.l1_ht1050),
            Cut::MuonPt30 => Ok(c
                .muons
                .leading("pt")?
                .into_iter()
                .map(|pt| pt.is_some_and(|pt| pt > LEADING_MUON_PT))
                .collect()),
            Cut::DimuonMass => {
                let window = &sel.dimuon;
                Ok(dimuon_mass(&c.muons)?
                    .into_iter()
                    .map(|m| m.is_some_and(|m| m > window.mass_min && m < window.mass_max))
                    .collect())
            }
            Cut::DimuonCharge => {
                let q0 = c.muons.nth("charge", 0)?;
                let q1 = c.muons.nth("charge", 1)?;
                Ok(q0
                    .iter()
                    .zip(&q1)
                    .map(|(a, b)| match (a, b) {
                        (Some(a), Some(b)) => a * b < 0.0,
                        _ => false,
                    })
                    .collect())
            }
            Cut::LumiMask => ctx.batch.flag(&cfg.lumi_mask),
            Cut::FiltMet => {
                let mut mask = vec![true; ctx.n_events()];
                for name in &cfg.filters.met {
                    for (m, f) in mask.iter_mut().zip(ctx.batch.flag(name)?) {
                        *m &= f;
                    }
                }
                Ok(mask)
            }
            Cut::CaloDiff => Ok(c
                .met_pt
                .iter()
                .zip(&c.calomet_pt)
                .zip(&c.recoil_pt)
                .map(|((met, calo), recoil)| *recoil > 0.0 && (met - calo).abs() / recoil < sel.calo_diff_max)
                .collect()),
        }
    }
}

impl fmt::Display for Cut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Cut {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Cut::from_name(s).ok_or_else(|| Error::Config(format!("unknown cut '{s}'")))
    }
}

fn count_equals(coll: &CandidateArray, n: usize) -> Vec<bool> {
    coll.counts().into_iter().map(|c| c == n).collect()
}

/// Invariant mass of the two leading objects of every event (`None` with fewer than two).
///
/// Objects are treated as massless: `m^2 = 2 pt1 pt2 (cosh(d_eta) - cos(d_phi))`.
pub fn dimuon_mass(muons: &CandidateArray) -> Result<Vec<Option<f64>>> {
    let pt0 = muons.nth("pt", 0)?;
    let pt1 = muons.nth("pt", 1)?;
    let eta0 = muons.nth("eta", 0)?;
    let eta1 = muons.nth("eta", 1)?;
    let phi0 = muons.nth("phi", 0)?;
    let phi1 = muons.nth("phi", 1)?;
    Ok((0..muons.n_events())
        .map(|i| {
            let (pt0, pt1) = (pt0[i]?, pt1[i]?);
            let m2 = 2.0 * pt0 * pt1 * ((eta0[i]? - eta1[i]?).cosh() - (phi0[i]? - phi1[i]?).cos());
            Some(m2.max(0.0).sqrt())
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Three events with jet counts [1, 0, 2] and minimal other collections.
    fn three_event_batch() -> EventBatch {
        EventBatch::new(3)
            .with_column("nJet", vec![1.0, 0.0, 2.0])
            .with_column("Jet_pt", vec![45.0, 120.0, 33.0])
            .with_column("Jet_eta", vec![0.5, 2.0, 0.1])
            .with_column("Jet_phi", vec![0.0, 1.5, 0.0])
            .with_column("Jet_jetId", vec![2.0, 6.0, 0.0])
            .with_column("nMuon", vec![1.0, 2.0, 0.0])
            .with_column("Muon_pt", vec![35.0, 45.0, 40.0])
            .with_column("Muon_eta", vec![0.1, 0.2, -0.3])
            .with_column("Muon_phi", vec![0.5, 0.0, 3.0])
            .with_column("Muon_charge", vec![1.0, 1.0, 1.0])
            .with_column("Muon_pfRelIso04_all", vec![0.01, 0.02, 0.03])
            .with_column("Muon_dxy", vec![0.0, 0.0, 0.0])
            .with_column("Muon_dz", vec![0.0, 0.0, 0.0])
            .with_column("Muon_looseId", vec![1.0, 1.0, 1.0])
            .with_column("Muon_tightId", vec![1.0, 0.0, 1.0])
            .with_column("nElectron", vec![0.0, 0.0, 0.0])
            .with_column("Electron_pt", vec![])
            .with_column("Electron_eta", vec![])
            .with_column("Electron_deltaEtaSC", vec![])
            .with_column("Electron_phi", vec![])
            .with_column("Electron_charge", vec![])
            .with_column("Electron_dxy", vec![])
            .with_column("Electron_dz", vec![])
            .with_column("nPhoton", vec![0.0, 1.0, 0.0])
            .with_column("Photon_pt", vec![50.0])
            .with_column("Photon_eta", vec![0.0])
            .with_column("Photon_phi", vec![0.0])
            .with_column("Photon_r9", vec![0.9])
            .with_column("Photon_isScEtaEB", vec![1.0])
            .with_column("MET_pt", vec![200.0, 0.0, 80.0])
            .with_column("MET_phi", vec![0.0, 0.0, 0.0])
            .with_column("CaloMET_pt", vec![190.0, 0.0, 10.0])
            .with_column("HLT_IsoMu27", vec![1.0, 1.0, 0.0])
            .with_column("HLT_PFJet500", vec![0.0, 1.0, 1.0])
            .with_column("lumi_mask", vec![1.0, 1.0, 1.0])
    }

    fn eval(cut: Cut, batch: &EventBatch) -> Result<Vec<bool>> {
        let cfg = Config::default();
        let cands = Candidates::build(batch, &cfg)?;
        cut.evaluate(&CutContext::new(batch, &cands, &cfg))
    }

    #[test]
    fn names_roundtrip_through_registry() {
        for cut in Cut::ALL {
            assert_eq!(cut.name().parse::<Cut>().unwrap(), cut);
            assert_eq!(cut.to_string(), cut.name());
        }
        let err = "leadak4_ptt".parse::<Cut>().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn leading_jet_cut_uses_first_jet() {
        let mut batch = three_event_batch();
        batch.insert("Jet_pt", vec![45.0, 20.0, 33.0]);
        let mut cfg = Config::default();
        cfg.selection.leadak4.pt = 30.0;
        let cands = Candidates::build(&batch, &cfg).unwrap();
        let mask = Cut::LeadAk4PtEta.evaluate(&CutContext::new(&batch, &cands, &cfg)).unwrap();
        // the second event has no jet; the third leads with 20 GeV although its second jet has 33
        assert_eq!(mask, vec![true, false, false]);
    }

    #[test]
    fn zero_jet_events_fail_leading_cuts() {
        let batch = three_event_batch();
        assert_eq!(eval(Cut::LeadAk4Id, &batch).unwrap(), vec![true, false, true]);
        // the leading jet of the last event sits inside the water-leak window
        assert_eq!(eval(Cut::LeadAk4WaterLeak, &batch).unwrap(), vec![false, false, true]);
        assert_eq!(eval(Cut::LeadAk4WaterLeakVeto, &batch).unwrap(), vec![true, false, false]);
    }

    #[test]
    fn water_leak_window_selects_leading_jet() {
        let mut batch = three_event_batch();
        batch.insert("Jet_eta", vec![2.0, 2.0, 0.1]);
        batch.insert("Jet_phi", vec![1.5, 1.5, 0.0]);
        assert_eq!(eval(Cut::LeadAk4WaterLeak, &batch).unwrap(), vec![true, false, true]);
        assert_eq!(eval(Cut::LeadAk4WaterLeakVeto, &batch).unwrap(), vec![false, false, false]);
    }

    #[test]
    fn object_counts() {
        let batch = three_event_batch();
        assert_eq!(eval(Cut::OneMuon, &batch).unwrap(), vec![true, false, false]);
        assert_eq!(eval(Cut::TwoMuons, &batch).unwrap(), vec![false, true, false]);
        assert_eq!(eval(Cut::VetoEle, &batch).unwrap(), vec![true, true, true]);
        assert_eq!(eval(Cut::VetoPho, &batch).unwrap(), vec![true, false, true]);
        assert_eq!(eval(Cut::AtLeastOneTightMu, &batch).unwrap(), vec![true, true, false]);
        assert_eq!(eval(Cut::MuonPt30, &batch).unwrap(), vec![true, true, false]);
    }

    #[test]
    fn dimuon_cuts() {
        let batch = three_event_batch();
        // both muons of event 1 are positive
        assert_eq!(eval(Cut::DimuonCharge, &batch).unwrap(), vec![false, false, false]);

        let mut batch = three_event_batch();
        // two back-to-back 45 GeV muons at eta 0: m = 90
        batch.insert("Muon_pt", vec![35.0, 45.0, 45.0]);
        batch.insert("Muon_eta", vec![0.1, 0.0, 0.0]);
        batch.insert("Muon_phi", vec![0.5, 0.0, std::f64::consts::PI]);
        batch.insert("Muon_charge", vec![1.0, 1.0, -1.0]);
        assert_eq!(eval(Cut::DimuonMass, &batch).unwrap(), vec![false, true, false]);
        assert_eq!(eval(Cut::DimuonCharge, &batch).unwrap(), vec![false, true, false]);

        let cands = Candidates::build(&batch, &Config::default()).unwrap();
        let mass = dimuon_mass(&cands.muons).unwrap();
        assert!(mass[0].is_none());
        assert_relative_eq!(mass[1].unwrap(), 90.0, epsilon = 1e-9);
    }

    #[test]
    fn trigger_bits_and_missing_columns() {
        let batch = three_event_batch();
        assert_eq!(eval(Cut::HltIsoMu27, &batch).unwrap(), vec![true, true, false]);
        assert_eq!(eval(Cut::Jet500Trig, &batch).unwrap(), vec![false, true, true]);
        assert!(matches!(eval(Cut::Ht1050Trig, &batch).unwrap_err(), Error::Config(_)));
        assert!(Cut::Ht1050Trig.is_trigger());
        assert!(!Cut::CaloDiff.is_trigger());
    }

    #[test]
    fn met_filters_are_anded() {
        let mut batch = three_event_batch();
        let cfg = Config::default();
        for (i, name) in cfg.filters.met.iter().enumerate() {
            let bad = if i == 3 { vec![1.0, 0.0, 1.0] } else { vec![1.0, 1.0, 1.0] };
            batch.insert(name.clone(), bad);
        }
        assert_eq!(eval(Cut::FiltMet, &batch).unwrap(), vec![true, false, true]);
    }

    #[test]
    fn calo_diff_requires_positive_recoil() {
        let batch = three_event_batch();
        // event 0: MET 200 along x plus muon 35 at phi 0.5; event 1: recoil from muons only,
        // MET and CaloMET both zero; event 2: |80 - 10| / 80 > 0.5
        let mask = eval(Cut::CaloDiff, &batch).unwrap();
        assert_eq!(mask, vec![true, true, false]);

        let mut batch = three_event_batch();
        batch.insert("nMuon", vec![0.0, 0.0, 0.0]);
        for col in ["Muon_pt", "Muon_eta", "Muon_phi", "Muon_charge", "Muon_pfRelIso04_all"] {
            batch.insert(col, vec![]);
        }
        for col in ["Muon_dxy", "Muon_dz", "Muon_looseId", "Muon_tightId"] {
            batch.insert(col, vec![]);
        }
        assert_eq!(eval(Cut::CaloDiff, &batch).unwrap(), vec![true, false, false]);
    }
}
