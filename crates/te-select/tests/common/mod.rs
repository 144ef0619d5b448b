//! Synthetic events in the flat-column layout of the input files.

#![allow(dead_code)]

use proptest::prelude::*;
use te_core::Config;
use te_select::EventBatch;

#[derive(Debug, Clone)]
pub struct Jet {
    pub pt: f64,
    pub eta: f64,
    pub phi: f64,
    pub jet_id: u8,
}

#[derive(Debug, Clone)]
pub struct Muon {
    pub pt: f64,
    pub eta: f64,
    pub phi: f64,
    pub charge: f64,
    pub iso: f64,
    pub tight: bool,
}

/// Trigger/flag bit positions in [`Event::bits`].
pub const ISOMU27: u8 = 1 << 0;
pub const MFTMHT: u8 = 1 << 1;
pub const MFTMHT_CLEAN: u8 = 1 << 2;
pub const JET500: u8 = 1 << 3;
pub const HT1050: u8 = 1 << 4;
pub const L1_HT1050: u8 = 1 << 5;
pub const LUMI: u8 = 1 << 6;
pub const FILTERS: u8 = 1 << 7;

#[derive(Debug, Clone)]
pub struct Event {
    pub jets: Vec<Jet>,
    pub muons: Vec<Muon>,
    pub electron_pts: Vec<f64>,
    pub photon_pts: Vec<f64>,
    pub met: f64,
    pub met_phi: f64,
    pub calomet: f64,
    pub bits: u8,
}

impl Event {
    pub fn new(jets: Vec<Jet>, muons: Vec<Muon>, bits: u8) -> Self {
        Self {
            jets,
            muons,
            electron_pts: vec![],
            photon_pts: vec![],
            met: 250.0,
            met_phi: 0.0,
            calomet: 240.0,
            bits,
        }
    }
}

pub fn jet(pt: f64, eta: f64) -> Jet {
    Jet { pt, eta, phi: 0.3, jet_id: 6 }
}

pub fn tight_muon(pt: f64) -> Muon {
    Muon { pt, eta: 0.2, phi: 2.0, charge: -1.0, iso: 0.05, tight: true }
}

/// Flatten events into a batch with every column the processor reads.
pub fn batch_from_events(events: &[Event]) -> EventBatch {
    let cfg = Config::default();
    let n = events.len();
    let col = |f: fn(&Event) -> f64| per_event(events, f);
    let bit = |mask: u8| per_event(events, |e| f64::from(u8::from(e.bits & mask != 0)));

    let mut b = EventBatch::new(n)
        .with_column("nJet", col(|e| e.jets.len() as f64))
        .with_column("Jet_pt", events.iter().flat_map(|e| e.jets.iter().map(|j| j.pt)).collect())
        .with_column("Jet_eta", events.iter().flat_map(|e| e.jets.iter().map(|j| j.eta)).collect())
        .with_column("Jet_phi", events.iter().flat_map(|e| e.jets.iter().map(|j| j.phi)).collect())
        .with_column("Jet_jetId", events.iter().flat_map(|e| e.jets.iter().map(|j| f64::from(j.jet_id))).collect())
        .with_column("nMuon", col(|e| e.muons.len() as f64))
        .with_column("Muon_pt", events.iter().flat_map(|e| e.muons.iter().map(|m| m.pt)).collect())
        .with_column("Muon_eta", events.iter().flat_map(|e| e.muons.iter().map(|m| m.eta)).collect())
        .with_column("Muon_phi", events.iter().flat_map(|e| e.muons.iter().map(|m| m.phi)).collect())
        .with_column("Muon_charge", events.iter().flat_map(|e| e.muons.iter().map(|m| m.charge)).collect())
        .with_column("Muon_pfRelIso04_all", events.iter().flat_map(|e| e.muons.iter().map(|m| m.iso)).collect())
        .with_column("Muon_dxy", events.iter().flat_map(|e| e.muons.iter().map(|_| 0.01)).collect())
        .with_column("Muon_dz", events.iter().flat_map(|e| e.muons.iter().map(|_| 0.02)).collect())
        .with_column("Muon_looseId", events.iter().flat_map(|e| e.muons.iter().map(|_| 1.0)).collect())
        .with_column(
            "Muon_tightId",
            events.iter().flat_map(|e| e.muons.iter().map(|m| f64::from(u8::from(m.tight)))).collect(),
        )
        .with_column("nElectron", col(|e| e.electron_pts.len() as f64))
        .with_column("nPhoton", col(|e| e.photon_pts.len() as f64))
        .with_column("MET_pt", col(|e| e.met))
        .with_column("MET_phi", col(|e| e.met_phi))
        .with_column("CaloMET_pt", col(|e| e.calomet));

    let electrons: Vec<f64> = events.iter().flat_map(|e| e.electron_pts.iter().copied()).collect();
    let n_ele = electrons.len();
    b.insert("Electron_pt", electrons);
    for name in ["Electron_eta", "Electron_deltaEtaSC", "Electron_phi", "Electron_dxy", "Electron_dz"] {
        b.insert(name, vec![0.0; n_ele]);
    }
    b.insert("Electron_charge", vec![1.0; n_ele]);

    let photons: Vec<f64> = events.iter().flat_map(|e| e.photon_pts.iter().copied()).collect();
    let n_pho = photons.len();
    b.insert("Photon_pt", photons);
    for name in ["Photon_eta", "Photon_phi"] {
        b.insert(name, vec![0.0; n_pho]);
    }
    b.insert("Photon_r9", vec![0.9; n_pho]);
    b.insert("Photon_isScEtaEB", vec![1.0; n_pho]);

    let t = &cfg.triggers;
    b.insert(t.isomu27.clone(), bit(ISOMU27));
    b.insert(t.mftmht.clone(), bit(MFTMHT));
    b.insert(t.mftmht_clean.clone(), bit(MFTMHT_CLEAN));
    b.insert(t.jet500.clone(), bit(JET500));
    b.insert(t.ht1050.clone(), bit(HT1050));
    b.insert(t.l1_ht1050.clone(), bit(L1_HT1050));
    b.insert(cfg.lumi_mask.clone(), bit(LUMI));
    for name in &cfg.filters.met {
        b.insert(name.clone(), bit(FILTERS));
    }
    b
}

fn per_event(events: &[Event], f: impl Fn(&Event) -> f64) -> Vec<f64> {
    events.iter().map(f).collect()
}

fn jet_strategy() -> impl Strategy<Value = Jet> {
    (0.0..800.0f64, -5.0..5.0f64, -3.1..3.1f64, 0..7u8).prop_map(|(pt, eta, phi, jet_id)| Jet { pt, eta, phi, jet_id })
}

fn muon_strategy() -> impl Strategy<Value = Muon> {
    (5.0..120.0f64, -2.6..2.6f64, -3.1..3.1f64, any::<bool>(), 0.0..0.4f64, any::<bool>()).prop_map(
        |(pt, eta, phi, positive, iso, tight)| Muon {
            pt,
            eta,
            phi,
            charge: if positive { 1.0 } else { -1.0 },
            iso,
            tight,
        },
    )
}

pub fn event_strategy() -> impl Strategy<Value = Event> {
    (
        prop::collection::vec(jet_strategy(), 0..4),
        prop::collection::vec(muon_strategy(), 0..3),
        prop::collection::vec(5.0..60.0f64, 0..2),
        prop::collection::vec(5.0..60.0f64, 0..2),
        (0.0..900.0f64, -3.1..3.1f64, 0.0..900.0f64),
        any::<u8>(),
    )
        .prop_map(|(jets, muons, electron_pts, photon_pts, (met, met_phi, calomet), bits)| Event {
            jets,
            muons,
            electron_pts,
            photon_pts,
            met,
            met_phi,
            calomet,
            bits,
        })
}
