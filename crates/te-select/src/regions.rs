//! Region definition table: region name → ordered list of cuts.
//!
//! Cut names are resolved when the table is built, so a typo fails at setup
//! instead of in the middle of a chunk. Numerator/denominator pairs (regions
//! named `<base>_num` / `<base>_den`) are validated at the same time.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};

use te_core::{Error, Result};
use tracing::debug;

use crate::cuts::{Cut, CutContext};

/// Suffix of numerator regions.
pub const NUM_SUFFIX: &str = "_num";
/// Suffix of denominator regions.
pub const DEN_SUFFIX: &str = "_den";

/// Muon-reference selection shared by every trigger turn-on region.
const REFERENCE_CUTS: [&str; 11] = [
    "leadak4_pt_eta",
    "leadak4_id",
    "at_least_one_tight_mu",
    "one_muon",
    "veto_ele",
    "veto_pho",
    "lumi_mask",
    "HLT_IsoMu27",
    "muon_pt>30",
    "filt_met",
    "calo_diff",
];

/// A validated numerator/denominator region pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionPair {
    /// Common stem, e.g. `tr_jet`.
    pub base: String,
    /// Numerator region name.
    pub numerator: String,
    /// Denominator region name.
    pub denominator: String,
    /// The one cut the numerator adds (trigger under test).
    pub trigger: Cut,
}

/// Region name → resolved cut list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegionTable {
    regions: BTreeMap<String, Vec<Cut>>,
}

impl RegionTable {
    /// Resolve every cut name and validate every `_num`/`_den` pair.
    pub fn from_names<R, N, C>(regions: R) -> Result<Self>
    where
        R: IntoIterator<Item = (N, C)>,
        N: AsRef<str>,
        C: IntoIterator,
        C::Item: AsRef<str>,
    {
        let mut table = BTreeMap::new();
        for (region, cuts) in regions {
            let region = region.as_ref();
            let resolved = cuts
                .into_iter()
                .map(|name| {
                    let name = name.as_ref();
                    Cut::from_name(name).ok_or_else(|| {
                        Error::Config(format!("region '{region}' uses unknown cut '{name}'"))
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            table.insert(region.to_string(), resolved);
        }
        let table = Self { regions: table };
        table.pairs()?;
        Ok(table)
    }

    /// Built-in analysis regions.
    pub fn hlt_regions() -> Result<Self> {
        let with = |extra: &[&'static str]| -> Vec<&'static str> {
            REFERENCE_CUTS.iter().copied().chain(extra.iter().copied()).collect()
        };
        let mut regions: Vec<(String, Vec<&'static str>)> = vec![
            ("turn on denominator".into(), with(&[])),
            ("turn on numerator".into(), with(&["mftmht_trig"])),
            ("clean turn on numerator".into(), with(&["mftmht_clean_trig"])),
            (
                "dimuon".into(),
                vec![
                    "leadak4_pt_eta",
                    "leadak4_id",
                    "at_least_one_tight_mu",
                    "two_muons",
                    "dimuon_mass",
                    "dimuon_charge",
                    "veto_ele",
                    "veto_pho",
                    "lumi_mask",
                    "HLT_IsoMu27",
                    "filt_met",
                ],
            ),
        ];
        let pairs: [(&str, &[&'static str], &'static str); 7] = [
            ("tr_metnomu", &[], "mftmht_trig"),
            ("tr_metnomu_filterhf", &[], "mftmht_clean_trig"),
            ("tr_jet", &[], "jet500_trig"),
            ("tr_ht", &[], "ht1050_trig"),
            ("tr_l1_ht", &[], "l1_ht1050_trig"),
            ("tr_jet_water_leak", &["leadak4_water_leak"], "jet500_trig"),
            ("tr_jet_water_leak_veto", &["leadak4_water_leak_veto"], "jet500_trig"),
        ];
        for (base, extra, trigger) in pairs {
            let den = with(extra);
            let mut num = den.clone();
            num.push(trigger);
            regions.push((format!("{base}{DEN_SUFFIX}"), den));
            regions.push((format!("{base}{NUM_SUFFIX}"), num));
        }
        Self::from_names(regions.iter().map(|(name, cuts)| (name.as_str(), cuts.iter().copied())))
    }

    /// Region names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.regions.keys().map(String::as_str)
    }

    /// Number of regions.
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Resolved cuts of a region.
    pub fn cuts(&self, region: &str) -> Result<&[Cut]> {
        self.regions
            .get(region)
            .map(Vec::as_slice)
            .ok_or_else(|| Error::Config(format!("unknown region '{region}'")))
    }

    /// Every `(region, cuts)` entry.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Cut])> {
        self.regions.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Numerator/denominator pairs, validated.
    ///
    /// A `_num` region without its `_den` partner (or vice versa) is a
    /// configuration error, as is a numerator that does not add exactly one
    /// cut to its denominator.
    pub fn pairs(&self) -> Result<Vec<RegionPair>> {
        let mut out = Vec::new();
        for (name, num_cuts) in &self.regions {
            let Some(base) = name.strip_suffix(NUM_SUFFIX) else {
                if let Some(base) = name.strip_suffix(DEN_SUFFIX)
                    && !self.regions.contains_key(&format!("{base}{NUM_SUFFIX}"))
                {
                    return Err(Error::Config(format!("region '{name}' has no numerator partner")));
                }
                continue;
            };
            let den_name = format!("{base}{DEN_SUFFIX}");
            let den_cuts = self
                .regions
                .get(&den_name)
                .ok_or_else(|| Error::Config(format!("region '{name}' has no denominator partner")))?;
            let trigger = single_extra_cut(num_cuts, den_cuts).ok_or_else(|| {
                Error::Config(format!(
                    "region '{name}' must contain every cut of '{den_name}' plus exactly one more"
                ))
            })?;
            out.push(RegionPair {
                base: base.to_string(),
                numerator: name.clone(),
                denominator: den_name,
                trigger,
            });
        }
        Ok(out)
    }

    /// Event mask of one region: AND of its cuts.
    pub fn evaluate(&self, region: &str, ctx: &CutContext<'_>) -> Result<Vec<bool>> {
        let mut mask = vec![true; ctx.n_events()];
        for cut in self.cuts(region)? {
            and_into(&mut mask, &cut.evaluate(ctx)?);
        }
        Ok(mask)
    }

    /// Event masks of every region. Each distinct cut is evaluated once.
    pub fn evaluate_all(&self, ctx: &CutContext<'_>) -> Result<BTreeMap<String, Vec<bool>>> {
        let mut cache: HashMap<Cut, Vec<bool>> = HashMap::new();
        let mut out = BTreeMap::new();
        for (region, cuts) in &self.regions {
            let mut mask = vec![true; ctx.n_events()];
            for &cut in cuts {
                let cut_mask = match cache.entry(cut) {
                    Entry::Occupied(e) => e.into_mut(),
                    Entry::Vacant(e) => e.insert(cut.evaluate(ctx)?),
                };
                and_into(&mut mask, cut_mask);
            }
            out.insert(region.clone(), mask);
        }
        debug!(n_regions = out.len(), n_cuts = cache.len(), "evaluated regions");
        Ok(out)
    }
}

fn and_into(mask: &mut [bool], other: &[bool]) {
    for (m, o) in mask.iter_mut().zip(other) {
        *m &= *o;
    }
}

/// The single cut of `num` missing from `den`, if `num = den + {cut}` as sets.
fn single_extra_cut(num: &[Cut], den: &[Cut]) -> Option<Cut> {
    if !den.iter().all(|c| num.contains(c)) {
        return None;
    }
    let mut extra = num.iter().filter(|c| !den.contains(c));
    let first = *extra.next()?;
    if extra.any(|c| *c != first) { None } else { Some(first) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_table_is_valid() {
        let table = RegionTable::hlt_regions().unwrap();
        assert_eq!(table.len(), 18);
        let pairs = table.pairs().unwrap();
        let bases: Vec<&str> = pairs.iter().map(|p| p.base.as_str()).collect();
        assert_eq!(
            bases,
            vec![
                "tr_ht",
                "tr_jet",
                "tr_jet_water_leak",
                "tr_jet_water_leak_veto",
                "tr_l1_ht",
                "tr_metnomu_filterhf",
                "tr_metnomu",
            ]
        );
        let jet = pairs.iter().find(|p| p.base == "tr_jet").unwrap();
        assert_eq!(jet.trigger, Cut::Jet500Trig);
        assert_eq!(jet.denominator, "tr_jet_den");
        assert_eq!(table.cuts("turn on denominator").unwrap().len(), 11);
        assert_eq!(table.cuts("clean turn on numerator").unwrap().last(), Some(&Cut::MftmhtCleanTrig));
    }

    #[test]
    fn unknown_cut_fails_at_setup() {
        let err = RegionTable::from_names([("sr", vec!["one_muon", "two_muon"])]).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("two_muon"));
    }

    #[test]
    fn unknown_region_is_configuration_error() {
        let table = RegionTable::hlt_regions().unwrap();
        assert!(matches!(table.cuts("signal").unwrap_err(), Error::Config(_)));
    }

    #[test]
    fn pair_must_add_exactly_one_cut() {
        let ok = RegionTable::from_names([
            ("x_den", vec!["one_muon", "lumi_mask"]),
            ("x_num", vec!["lumi_mask", "jet500_trig", "one_muon"]),
        ]);
        assert!(ok.is_ok());

        let two_extra = RegionTable::from_names([
            ("x_den", vec!["one_muon"]),
            ("x_num", vec!["one_muon", "jet500_trig", "ht1050_trig"]),
        ]);
        assert!(matches!(two_extra.unwrap_err(), Error::Config(_)));

        let not_superset = RegionTable::from_names([
            ("x_den", vec!["one_muon", "lumi_mask"]),
            ("x_num", vec!["one_muon", "jet500_trig"]),
        ]);
        assert!(not_superset.is_err());

        let same = RegionTable::from_names([("x_den", vec!["one_muon"]), ("x_num", vec!["one_muon"])]);
        assert!(same.is_err());
    }

    #[test]
    fn orphan_pair_members_are_rejected() {
        assert!(RegionTable::from_names([("x_num", vec!["one_muon"])]).is_err());
        assert!(RegionTable::from_names([("x_den", vec!["one_muon"])]).is_err());
    }

    #[test]
    fn single_extra_cut_ignores_duplicates() {
        let num = [Cut::OneMuon, Cut::Jet500Trig, Cut::Jet500Trig];
        assert_eq!(single_extra_cut(&num, &[Cut::OneMuon]), Some(Cut::Jet500Trig));
    }
}
