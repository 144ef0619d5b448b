//! Analysis configuration (YAML or programmatic).
//!
//! Thresholds are grouped by object type and working point, so that they can
//! be addressed by a hierarchical path such as `MUON.CUTS.LOOSE.ISO`. Every
//! section has defaults; a YAML file only needs to name what it overrides,
//! down to a single field of a working point.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

use crate::{Error, Result};

/// Top-level analysis configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE")]
pub struct Config {
    /// Muon working points.
    pub muon: MuonConfig,
    /// Electron identification and working points.
    pub electron: ElectronConfig,
    /// Photon identification and working points.
    pub photon: PhotonConfig,
    /// Event-level selection thresholds.
    pub selection: SelectionConfig,
    /// Trigger-bit column names.
    pub triggers: TriggerConfig,
    /// Event-quality flag columns.
    pub filters: FilterConfig,
    /// Column holding the certified-luminosity mask.
    pub lumi_mask: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            muon: MuonConfig::default(),
            electron: ElectronConfig::default(),
            photon: PhotonConfig::default(),
            selection: SelectionConfig::default(),
            triggers: TriggerConfig::default(),
            filters: FilterConfig::default(),
            lumi_mask: "lumi_mask".into(),
        }
    }
}

impl Config {
    /// Parse a configuration from YAML (or JSON) text.
    ///
    /// The document is merged key by key onto the defaults, so any subset of
    /// fields may be given at any depth. An empty document yields the defaults.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let mut merged = serde_json::to_value(Config::default())?;
        if !text.trim().is_empty() {
            let overrides: Value = serde_yaml_ng::from_str(text)?;
            if !overrides.is_null() {
                merge_onto(&mut merged, overrides);
            }
        }
        Ok(serde_json::from_value(merged)?)
    }

    /// Read a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    /// Resolve a numeric threshold by hierarchical path, e.g. `MUON.CUTS.LOOSE.ISO`.
    ///
    /// Path segments are matched case-insensitively.
    pub fn lookup(&self, path: &str) -> Result<f64> {
        let root = serde_json::to_value(self)?;
        let mut node = &root;
        for segment in path.split('.') {
            let key = segment.to_ascii_uppercase();
            node = node
                .get(&key)
                .ok_or_else(|| Error::Config(format!("unknown configuration path '{path}'")))?;
        }
        node.as_f64().ok_or_else(|| {
            Error::Config(format!("configuration path '{path}' is not a numeric threshold"))
        })
    }
}

/// Recursive object merge; any non-object value replaces what it lands on.
fn merge_onto(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(slot) => merge_onto(slot, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

/// Kinematic/isolation thresholds for one muon working point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct MuonWorkingPoint {
    /// Minimum transverse momentum (GeV).
    pub pt: f64,
    /// Maximum `|eta|`.
    pub eta: f64,
    /// Maximum relative PF isolation (`pfRelIso04_all`).
    pub iso: f64,
}

/// Muon working points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE")]
pub struct MuonCuts {
    /// Baseline muons, also used for the lepton veto.
    pub loose: MuonWorkingPoint,
    /// Muons eligible for the reference selection.
    pub tight: MuonWorkingPoint,
}

impl Default for MuonCuts {
    fn default() -> Self {
        Self {
            loose: MuonWorkingPoint { pt: 10.0, eta: 2.4, iso: 0.25 },
            tight: MuonWorkingPoint { pt: 20.0, eta: 2.4, iso: 0.15 },
        }
    }
}

/// Muon section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE")]
pub struct MuonConfig {
    /// Working-point thresholds.
    pub cuts: MuonCuts,
}

/// A threshold that differs between the ECAL barrel and endcaps.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct BarrelEndcap {
    /// Value for `|eta_SC| <= 1.479`.
    pub barrel: f64,
    /// Value beyond the barrel.
    pub endcap: f64,
}

impl BarrelEndcap {
    /// Threshold applicable to an object in the barrel (`true`) or endcap.
    pub fn for_region(&self, barrel: bool) -> f64 {
        if barrel { self.barrel } else { self.endcap }
    }
}

/// Electron kinematic and impact-parameter thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ElectronWorkingPoint {
    /// Minimum transverse momentum (GeV).
    pub pt: f64,
    /// Maximum `|eta|`.
    pub eta: f64,
    /// Maximum `|dxy|` (cm).
    pub dxy: BarrelEndcap,
    /// Maximum `|dz|` (cm).
    pub dz: BarrelEndcap,
}

/// Electron working points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ElectronCuts {
    /// Baseline electrons, used for the lepton veto.
    pub loose: ElectronWorkingPoint,
}

impl Default for ElectronCuts {
    fn default() -> Self {
        Self {
            loose: ElectronWorkingPoint {
                pt: 10.0,
                eta: 2.5,
                dxy: BarrelEndcap { barrel: 0.05, endcap: 0.10 },
                dz: BarrelEndcap { barrel: 0.10, endcap: 0.20 },
            },
        }
    }
}

/// Input branches carrying cut-based identification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE")]
pub struct IdBranches {
    /// Identification branch name.
    pub id: String,
    /// Fallback branch for older input versions.
    pub idv7: Option<String>,
}

/// Whether identification flags are built and required in the baseline selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE")]
pub struct IdOption {
    /// Require the identification flag.
    pub apply: bool,
}

/// Electron section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ElectronConfig {
    /// Identification branches.
    pub branch: IdBranches,
    /// Identification requirement.
    pub id: IdOption,
    /// Working-point thresholds.
    pub cuts: ElectronCuts,
}

impl Default for ElectronConfig {
    fn default() -> Self {
        Self {
            branch: IdBranches { id: "Electron_cutBased".into(), idv7: None },
            id: IdOption::default(),
            cuts: ElectronCuts::default(),
        }
    }
}

/// Minimum pt and maximum `|eta|`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct PtEta {
    /// Minimum transverse momentum (GeV).
    pub pt: f64,
    /// Maximum `|eta|`.
    pub eta: f64,
}

/// Photon working points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE")]
pub struct PhotonCuts {
    /// Baseline photons, used for the photon veto.
    pub loose: PtEta,
}

impl Default for PhotonCuts {
    fn default() -> Self {
        Self { loose: PtEta { pt: 15.0, eta: 2.5 } }
    }
}

/// Photon section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE")]
pub struct PhotonConfig {
    /// Identification branches.
    pub branch: IdBranches,
    /// Identification requirement.
    pub id: IdOption,
    /// Working-point thresholds.
    pub cuts: PhotonCuts,
}

impl Default for PhotonConfig {
    fn default() -> Self {
        Self {
            branch: IdBranches {
                id: "Photon_cutBased".into(),
                idv7: Some("Photon_cutBasedBitmap".into()),
            },
            id: IdOption::default(),
            cuts: PhotonCuts::default(),
        }
    }
}

/// Jets entering the HT sum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct HtConfig {
    /// Minimum jet pt (GeV).
    pub jet_pt: f64,
    /// Maximum jet `|eta|`.
    pub jet_eta: f64,
}

/// Invariant-mass window (GeV), bounds exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct MassWindow {
    /// Lower bound.
    pub mass_min: f64,
    /// Upper bound.
    pub mass_max: f64,
}

/// Eta-phi window of the detector region affected by the water leak.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct EtaPhiWindow {
    /// Lower eta bound.
    pub eta_min: f64,
    /// Upper eta bound.
    pub eta_max: f64,
    /// Lower phi bound.
    pub phi_min: f64,
    /// Upper phi bound.
    pub phi_max: f64,
}

impl EtaPhiWindow {
    /// Whether `(eta, phi)` lies inside the window (bounds inclusive).
    pub fn contains(&self, eta: f64, phi: f64) -> bool {
        (self.eta_min..=self.eta_max).contains(&eta) && (self.phi_min..=self.phi_max).contains(&phi)
    }
}

/// Event-level selection thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE")]
pub struct SelectionConfig {
    /// Leading AK4 jet requirement.
    pub leadak4: PtEta,
    /// HT jet definition.
    pub ht: HtConfig,
    /// Dimuon mass window.
    pub dimuon: MassWindow,
    /// Maximum `|pf MET - calo MET| / recoil`.
    pub calo_diff_max: f64,
    /// Region vetoed by the water-leak cuts.
    pub water_leak: EtaPhiWindow,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            leadak4: PtEta { pt: 40.0, eta: 4.7 },
            ht: HtConfig { jet_pt: 30.0, jet_eta: 2.5 },
            dimuon: MassWindow { mass_min: 60.0, mass_max: 120.0 },
            calo_diff_max: 0.5,
            water_leak: EtaPhiWindow { eta_min: 1.5, eta_max: 2.5, phi_min: 1.2, phi_max: 1.8 },
        }
    }
}

/// Trigger-bit column names used by the trigger cuts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE")]
pub struct TriggerConfig {
    /// Single-muon reference trigger.
    pub isomu27: String,
    /// MET/MHT trigger.
    pub mftmht: String,
    /// MET/MHT trigger with the HF filter.
    pub mftmht_clean: String,
    /// Single-jet trigger.
    pub jet500: String,
    /// HLT HT trigger.
    pub ht1050: String,
    /// L1 seed of the HT trigger.
    pub l1_ht1050: String,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            isomu27: "HLT_IsoMu27".into(),
            mftmht: "HLT_PFMETNoMu120_PFMHTNoMu120_IDTight".into(),
            mftmht_clean: "HLT_PFMETNoMu120_PFMHTNoMu120_IDTight_FilterHF".into(),
            jet500: "HLT_PFJet500".into(),
            ht1050: "HLT_PFHT1050".into(),
            l1_ht1050: "L1_HTT280er".into(),
        }
    }
}

/// Event-quality flag columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE")]
pub struct FilterConfig {
    /// MET filter flags; all must be set.
    pub met: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            met: [
                "Flag_goodVertices",
                "Flag_globalSuperTightHalo2016Filter",
                "Flag_HBHENoiseFilter",
                "Flag_HBHENoiseIsoFilter",
                "Flag_EcalDeadCellTriggerPrimitiveFilter",
                "Flag_BadPFMuonFilter",
                "Flag_eeBadScFilter",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}
