//! Named collection of histograms produced per chunk and merged across chunks.
//!
//! [`Accumulator::merge`] is commutative and associative with the empty
//! accumulator as identity, so chunk results can be reduced in any order or
//! tree shape.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use te_core::{Error, Result};
use tracing::debug;

use crate::hist::Hist;

/// Histogram name → histogram.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Accumulator {
    hists: BTreeMap<String, Hist>,
}

impl Accumulator {
    /// Empty accumulator (the merge identity).
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a histogram under `name`, replacing any previous one.
    pub fn insert(&mut self, name: impl Into<String>, hist: Hist) {
        self.hists.insert(name.into(), hist);
    }

    /// Histogram by name.
    pub fn get(&self, name: &str) -> Option<&Hist> {
        self.hists.get(name)
    }

    /// Histogram by name; a missing name is a configuration error.
    pub fn hist(&self, name: &str) -> Result<&Hist> {
        self.get(name).ok_or_else(|| Error::Config(format!("no histogram named '{name}'")))
    }

    /// Mutable histogram by name; a missing name is a configuration error.
    pub fn hist_mut(&mut self, name: &str) -> Result<&mut Hist> {
        self.hists.get_mut(name).ok_or_else(|| Error::Config(format!("no histogram named '{name}'")))
    }

    /// Histogram names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.hists.keys().map(String::as_str)
    }

    /// Number of histograms.
    pub fn len(&self) -> usize {
        self.hists.len()
    }

    /// Whether no histogram is registered.
    pub fn is_empty(&self) -> bool {
        self.hists.is_empty()
    }

    /// Fill a one-dimensional histogram under `(dataset, region)` with unit or given weights.
    pub fn fill(
        &mut self,
        name: &str,
        dataset: &str,
        region: &str,
        values: &[f64],
        weights: Option<&[f64]>,
    ) -> Result<()> {
        self.hist_mut(name)?.fill(&[dataset, region], &[values], weights)
    }

    /// Copy of this accumulator with the same histograms and no content.
    pub fn zeroed(&self) -> Self {
        Self { hists: self.hists.iter().map(|(k, h)| (k.clone(), h.zeroed())).collect() }
    }

    /// Add `other` into `self` histogram by histogram.
    ///
    /// Names present only in `other` are copied. Mismatched labels or axes under
    /// the same name are a configuration error, and `self` is left unchanged in that case.
    pub fn merge_from(&mut self, other: &Accumulator) -> Result<()> {
        for (name, theirs) in &other.hists {
            if let Some(ours) = self.hists.get(name)
                && !ours.compatible(theirs)
            {
                return Err(Error::Config(format!(
                    "histogram '{name}' has different label or axis definitions in the merged accumulators"
                )));
            }
        }
        for (name, theirs) in &other.hists {
            match self.hists.get_mut(name) {
                Some(ours) => ours.add(theirs)?,
                None => {
                    debug!(histogram = %name, "carried over from merged accumulator");
                    self.hists.insert(name.clone(), theirs.clone());
                }
            }
        }
        Ok(())
    }

    /// Consuming merge.
    pub fn merge(mut self, other: &Accumulator) -> Result<Self> {
        self.merge_from(other)?;
        Ok(self)
    }

    /// Merge a sequence of accumulators, left to right.
    pub fn merge_all<'a>(parts: impl IntoIterator<Item = &'a Accumulator>) -> Result<Self> {
        parts.into_iter().try_fold(Accumulator::new(), |acc, part| acc.merge(part))
    }
}

impl FromIterator<(String, Hist)> for Accumulator {
    fn from_iter<I: IntoIterator<Item = (String, Hist)>>(iter: I) -> Self {
        Self { hists: iter.into_iter().collect() }
    }
}
