//! Physics candidates as ragged collections built from flat input arrays.
//!
//! Each collection is constructed once from a count column and its per-object
//! fields, gets its derived fields (absolute eta, ID bits, supercluster eta,
//! ...) computed in bulk, and is immediately reduced by the loose baseline
//! selection of its object type. The unfiltered collection is not kept.

use std::collections::BTreeMap;
use te_core::config::Config;
use te_core::{Error, Result};
use tracing::debug;

use crate::batch::EventBatch;
use crate::jagged::Offsets;

/// Electrons with `|eta_SC|` up to this value are in the ECAL barrel.
const ELECTRON_BARREL_ETA_SC: f64 = 1.4442;

/// Impact-parameter bounds of the loose muon baseline (cm).
const MUON_MAX_DXY: f64 = 0.1;
const MUON_MAX_DZ: f64 = 0.2;

/// A ragged collection of per-object records with numeric and boolean fields.
///
/// Immutable once built; [`CandidateArray::filter`] returns a new collection.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateArray {
    offsets: Offsets,
    values: BTreeMap<String, Vec<f64>>,
    flags: BTreeMap<String, Vec<bool>>,
}

impl CandidateArray {
    /// Build from per-event counts and flattened fields.
    ///
    /// Every field must have exactly `sum(counts)` entries.
    pub fn from_counts(
        counts: &[usize],
        values: Vec<(&str, Vec<f64>)>,
        flags: Vec<(&str, Vec<bool>)>,
    ) -> Result<Self> {
        let offsets = Offsets::from_counts(counts)?;
        let total = offsets.total();
        let lengths = values.iter().map(|(n, v)| (*n, v.len())).chain(flags.iter().map(|(n, v)| (*n, v.len())));
        for (name, len) in lengths {
            if len != total {
                return Err(Error::Data(format!(
                    "field '{name}' has {len} entries but the counts sum to {total}"
                )));
            }
        }
        Ok(Self {
            offsets,
            values: values.into_iter().map(|(n, v)| (n.to_string(), v)).collect(),
            flags: flags.into_iter().map(|(n, v)| (n.to_string(), v)).collect(),
        })
    }

    /// Per-event boundaries.
    pub fn offsets(&self) -> &Offsets {
        &self.offsets
    }

    /// Number of events.
    pub fn n_events(&self) -> usize {
        self.offsets.n_entries()
    }

    /// Number of objects across all events.
    pub fn n_objects(&self) -> usize {
        self.offsets.total()
    }

    /// Objects per event.
    pub fn counts(&self) -> Vec<usize> {
        self.offsets.counts()
    }

    /// Flattened numeric field.
    pub fn values(&self, name: &str) -> Result<&[f64]> {
        self.values
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| Error::Config(format!("candidate field '{name}' does not exist")))
    }

    /// Flattened boolean field.
    pub fn flags(&self, name: &str) -> Result<&[bool]> {
        self.flags
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| Error::Config(format!("candidate flag '{name}' does not exist")))
    }

    /// Whether a numeric or boolean field exists.
    pub fn has_field(&self, name: &str) -> bool {
        self.values.contains_key(name) || self.flags.contains_key(name)
    }

    /// Keep only objects with `keep[i] == true`. Events keep their position,
    /// possibly with zero objects.
    pub fn filter(&self, keep: &[bool]) -> Result<Self> {
        if keep.len() != self.n_objects() {
            return Err(Error::Data(format!(
                "object mask has {} entries, collection has {} objects",
                keep.len(),
                self.n_objects()
            )));
        }
        let select_f = |v: &Vec<f64>| v.iter().zip(keep).filter(|(_, k)| **k).map(|(x, _)| *x).collect();
        let select_b = |v: &Vec<bool>| v.iter().zip(keep).filter(|(_, k)| **k).map(|(x, _)| *x).collect();
        Ok(Self {
            offsets: self.offsets.filter(keep),
            values: self.values.iter().map(|(n, v)| (n.clone(), select_f(v))).collect(),
            flags: self.flags.iter().map(|(n, v)| (n.clone(), select_b(v))).collect(),
        })
    }

    /// Numeric field of the `index`-th object of every event (`None` if absent).
    pub fn nth(&self, name: &str, index: usize) -> Result<Vec<Option<f64>>> {
        Ok(self.offsets.nth(self.values(name)?, index))
    }

    /// Numeric field of the leading (first) object of every event.
    pub fn leading(&self, name: &str) -> Result<Vec<Option<f64>>> {
        self.nth(name, 0)
    }

    /// Boolean field of the leading object of every event.
    pub fn leading_flag(&self, name: &str) -> Result<Vec<Option<bool>>> {
        Ok(self.offsets.nth(self.flags(name)?, 0))
    }

    /// Per-event count of objects passing `mask`.
    pub fn count_where(&self, mask: &[bool]) -> Vec<usize> {
        self.offsets.count_true(mask)
    }
}

/// Boolean element-wise AND of object masks.
fn and_all(masks: &[&[bool]]) -> Vec<bool> {
    let n = masks.first().map_or(0, |m| m.len());
    (0..n).map(|i| masks.iter().all(|m| m[i])).collect()
}

fn abs_of(v: &[f64]) -> Vec<f64> {
    v.iter().map(|x| x.abs()).collect()
}

fn to_flags(v: &[f64]) -> Vec<bool> {
    v.iter().map(|&x| x != 0.0).collect()
}

/// AK4 jets. Tight ID is bit 2 of `Jet_jetId` (1 = loose, 2 = tight, 4 = tight + lepton veto).
pub fn build_jets(batch: &EventBatch) -> Result<CandidateArray> {
    let counts = batch.counts("nJet")?;
    let pt = batch.column("Jet_pt")?.to_vec();
    let eta = batch.column("Jet_eta")?;
    let jet_id = batch.column("Jet_jetId")?;
    let tight_id = jet_id.iter().map(|&id| (id as i64) & 2 == 2).collect();
    CandidateArray::from_counts(
        &counts,
        vec![
            ("mass", vec![0.0; pt.len()]),
            ("pt", pt),
            ("eta", eta.to_vec()),
            ("abseta", abs_of(eta)),
            ("phi", batch.column("Jet_phi")?.to_vec()),
        ],
        vec![("tight_id", tight_id)],
    )
}

/// Muons passing the loose baseline.
pub fn build_muons(batch: &EventBatch, cfg: &Config) -> Result<CandidateArray> {
    let counts = batch.counts("nMuon")?;
    let pt = batch.column("Muon_pt")?.to_vec();
    let eta = batch.column("Muon_eta")?;
    let muons = CandidateArray::from_counts(
        &counts,
        vec![
            ("mass", vec![0.0; pt.len()]),
            ("pt", pt),
            ("eta", eta.to_vec()),
            ("abseta", abs_of(eta)),
            ("phi", batch.column("Muon_phi")?.to_vec()),
            ("charge", batch.column("Muon_charge")?.to_vec()),
            ("iso", batch.column("Muon_pfRelIso04_all")?.to_vec()),
            ("dxy", batch.column("Muon_dxy")?.to_vec()),
            ("dz", batch.column("Muon_dz")?.to_vec()),
        ],
        vec![
            ("loose_id", to_flags(batch.column("Muon_looseId")?)),
            ("tight_id", to_flags(batch.column("Muon_tightId")?)),
        ],
    )?;

    let wp = &cfg.muon.cuts.loose;
    let (iso, pt, abseta) = (muons.values("iso")?, muons.values("pt")?, muons.values("abseta")?);
    let (dxy, dz) = (muons.values("dxy")?, muons.values("dz")?);
    let keep: Vec<bool> = (0..muons.n_objects())
        .map(|i| {
            iso[i] < wp.iso
                && pt[i] > wp.pt
                && abseta[i] < wp.eta
                && dxy[i].abs() < MUON_MAX_DXY
                && dz[i].abs() < MUON_MAX_DZ
        })
        .collect();
    muons.filter(&keep)
}

/// Electrons passing the loose baseline; impact parameters are stored as absolute values.
pub fn build_electrons(batch: &EventBatch, cfg: &Config) -> Result<CandidateArray> {
    let counts = batch.counts("nElectron")?;
    let pt = batch.column("Electron_pt")?.to_vec();
    let eta = batch.column("Electron_eta")?;
    let delta_eta_sc = batch.column("Electron_deltaEtaSC")?;
    if delta_eta_sc.len() != eta.len() {
        return Err(Error::Data(format!(
            "Electron_deltaEtaSC has {} entries, Electron_eta has {}",
            delta_eta_sc.len(),
            eta.len()
        )));
    }
    let etasc: Vec<f64> = eta.iter().zip(delta_eta_sc).map(|(e, d)| e + d).collect();
    let absetasc = abs_of(&etasc);
    let barrel: Vec<bool> = absetasc.iter().map(|&a| a <= ELECTRON_BARREL_ETA_SC).collect();

    let mut flags = vec![("barrel", barrel)];
    let id_cfg = &cfg.electron;
    if id_cfg.id.apply {
        let id = batch.column(&id_cfg.branch.id)?;
        flags.push(("loose_id", id.iter().map(|&v| v >= 1.0).collect()));
        flags.push(("tight_id", id.iter().map(|&v| v == 4.0).collect()));
    }

    let electrons = CandidateArray::from_counts(
        &counts,
        vec![
            ("mass", vec![0.0; pt.len()]),
            ("pt", pt),
            ("eta", eta.to_vec()),
            ("abseta", abs_of(eta)),
            ("etasc", etasc),
            ("absetasc", absetasc),
            ("phi", batch.column("Electron_phi")?.to_vec()),
            ("charge", batch.column("Electron_charge")?.to_vec()),
            ("dxy", abs_of(batch.column("Electron_dxy")?)),
            ("dz", abs_of(batch.column("Electron_dz")?)),
        ],
        flags,
    )?;

    let wp = &id_cfg.cuts.loose;
    let pt = electrons.values("pt")?;
    let absetasc = electrons.values("absetasc")?;
    let dxy = electrons.values("dxy")?;
    let dz = electrons.values("dz")?;
    let barrel = electrons.flags("barrel")?;
    let kinematic: Vec<bool> = (0..electrons.n_objects())
        .map(|i| {
            pt[i] > wp.pt
                && absetasc[i] < wp.eta
                && dxy[i] < wp.dxy.for_region(barrel[i])
                && dz[i] < wp.dz.for_region(barrel[i])
        })
        .collect();
    let keep = if id_cfg.id.apply { and_all(&[&kinematic, electrons.flags("loose_id")?]) } else { kinematic };
    electrons.filter(&keep)
}

/// Photons passing the loose baseline.
pub fn build_photons(batch: &EventBatch, cfg: &Config) -> Result<CandidateArray> {
    let counts = batch.counts("nPhoton")?;
    let pt = batch.column("Photon_pt")?.to_vec();
    let eta = batch.column("Photon_eta")?;

    let mut flags = vec![("barrel", to_flags(batch.column("Photon_isScEtaEB")?))];
    let id_cfg = &cfg.photon;
    if id_cfg.id.apply {
        let branch = if batch.has_column(&id_cfg.branch.id) {
            id_cfg.branch.id.as_str()
        } else {
            id_cfg.branch.idv7.as_deref().unwrap_or(id_cfg.branch.id.as_str())
        };
        debug!(branch, "photon identification branch");
        let id = batch.column(branch)?;
        let veto = to_flags(batch.column("Photon_electronVeto")?);
        if veto.len() != id.len() {
            return Err(Error::Data("Photon_electronVeto and photon ID lengths differ".into()));
        }
        flags.push(("loose_id", id.iter().zip(&veto).map(|(&v, &e)| v >= 1.0 && e).collect()));
        flags.push(("medium_id", id.iter().zip(&veto).map(|(&v, &e)| v >= 2.0 && e).collect()));
    }

    let photons = CandidateArray::from_counts(
        &counts,
        vec![
            ("mass", vec![0.0; pt.len()]),
            ("pt", pt),
            ("eta", eta.to_vec()),
            ("abseta", abs_of(eta)),
            ("phi", batch.column("Photon_phi")?.to_vec()),
            ("r9", batch.column("Photon_r9")?.to_vec()),
        ],
        flags,
    )?;

    let wp = &id_cfg.cuts.loose;
    let pt = photons.values("pt")?;
    let abseta = photons.values("abseta")?;
    let kinematic: Vec<bool> = pt.iter().zip(abseta).map(|(&p, &a)| p > wp.pt && a < wp.eta).collect();
    let keep = if id_cfg.id.apply { and_all(&[&kinematic, photons.flags("loose_id")?]) } else { kinematic };
    photons.filter(&keep)
}

/// All candidate collections and event-level quantities of one chunk.
#[derive(Debug, Clone)]
pub struct Candidates {
    /// Number of events.
    pub n_events: usize,
    /// Missing transverse momentum.
    pub met_pt: Vec<f64>,
    /// Azimuth of the missing transverse momentum.
    pub met_phi: Vec<f64>,
    /// Calorimeter-only missing transverse momentum.
    pub calomet_pt: Vec<f64>,
    /// MET with the selected muons added back (hadronic recoil), magnitude.
    pub recoil_pt: Vec<f64>,
    /// Recoil azimuth.
    pub recoil_phi: Vec<f64>,
    /// Scalar sum of jet pT for jets inside the HT acceptance.
    pub ht: Vec<f64>,
    /// AK4 jets.
    pub ak4: CandidateArray,
    /// Loose muons.
    pub muons: CandidateArray,
    /// Loose electrons.
    pub electrons: CandidateArray,
    /// Loose photons.
    pub photons: CandidateArray,
}

impl Candidates {
    /// Build every collection from one event batch.
    pub fn build(batch: &EventBatch, cfg: &Config) -> Result<Self> {
        let ak4 = build_jets(batch)?;
        let muons = build_muons(batch, cfg)?;
        let electrons = build_electrons(batch, cfg)?;
        let photons = build_photons(batch, cfg)?;
        for (name, coll) in [("jets", &ak4), ("muons", &muons), ("electrons", &electrons), ("photons", &photons)] {
            if coll.n_events() != batch.n_events {
                return Err(Error::Data(format!(
                    "{name} cover {} events, batch has {}",
                    coll.n_events(),
                    batch.n_events
                )));
            }
        }

        let met_pt = batch.event_column("MET_pt")?.to_vec();
        let met_phi = batch.event_column("MET_phi")?.to_vec();
        let calomet_pt = batch.event_column("CaloMET_pt")?.to_vec();

        let (recoil_pt, recoil_phi) = recoil(&met_pt, &met_phi, &muons)?;

        let ht_cfg = &cfg.selection.ht;
        let in_ht: Vec<bool> = ak4
            .values("pt")?
            .iter()
            .zip(ak4.values("abseta")?)
            .map(|(&pt, &abseta)| pt > ht_cfg.jet_pt && abseta < ht_cfg.jet_eta)
            .collect();
        let ht = ak4.offsets().sum_where(ak4.values("pt")?, &in_ht);

        debug!(
            n_events = batch.n_events,
            n_jets = ak4.n_objects(),
            n_muons = muons.n_objects(),
            n_electrons = electrons.n_objects(),
            n_photons = photons.n_objects(),
            "built candidates"
        );

        Ok(Self {
            n_events: batch.n_events,
            met_pt,
            met_phi,
            calomet_pt,
            recoil_pt,
            recoil_phi,
            ht,
            ak4,
            muons,
            electrons,
            photons,
        })
    }
}

/// Vector sum of MET and all muons of each event.
fn recoil(met_pt: &[f64], met_phi: &[f64], muons: &CandidateArray) -> Result<(Vec<f64>, Vec<f64>)> {
    let mut px: Vec<f64> = met_pt.iter().zip(met_phi).map(|(p, f)| p * f.cos()).collect();
    let mut py: Vec<f64> = met_pt.iter().zip(met_phi).map(|(p, f)| p * f.sin()).collect();
    let pt = muons.values("pt")?;
    let phi = muons.values("phi")?;
    for (i, event) in muons.offsets().parents().into_iter().enumerate() {
        px[event] += pt[i] * phi[i].cos();
        py[event] += pt[i] * phi[i].sin();
    }
    let recoil_pt = px.iter().zip(&py).map(|(x, y)| x.hypot(*y)).collect();
    let recoil_phi = px.iter().zip(&py).map(|(x, y)| y.atan2(*x)).collect();
    Ok((recoil_pt, recoil_phi))
}
