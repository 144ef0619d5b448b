//! Per-event boundaries of ragged (variable-length) collections.
//!
//! A ragged collection is stored as flat arrays plus an offset table with
//! `n_events + 1` entries; event `i` owns `flat[offsets[i]..offsets[i + 1]]`.

use std::ops::Range;
use te_core::{Error, Result};

/// Offset table of a ragged collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Offsets(Vec<usize>);

impl Offsets {
    /// Prefix sums of per-event counts.
    ///
    /// Counts whose sum does not fit in `usize` are a data-consistency error.
    pub fn from_counts(counts: &[usize]) -> Result<Self> {
        let mut offsets = Vec::with_capacity(counts.len() + 1);
        offsets.push(0);
        let mut total = 0usize;
        for (i, &c) in counts.iter().enumerate() {
            total = total.checked_add(c).ok_or_else(|| {
                Error::Data(format!("object counts overflow at event {i} (count {c})"))
            })?;
            offsets.push(total);
        }
        Ok(Self(offsets))
    }

    /// Number of events.
    pub fn n_entries(&self) -> usize {
        self.0.len().saturating_sub(1)
    }

    /// Number of objects across all events.
    pub fn total(&self) -> usize {
        self.0.last().copied().unwrap_or(0)
    }

    /// Raw offsets (`n_entries() + 1` values).
    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }

    /// Objects per event.
    pub fn counts(&self) -> Vec<usize> {
        self.0.windows(2).map(|w| w[1] - w[0]).collect()
    }

    /// Flat index range of event `row`.
    pub fn range(&self, row: usize) -> Range<usize> {
        self.0[row]..self.0[row + 1]
    }

    /// Element `index` of event `row`, or `None` if the event has fewer objects.
    pub fn get<T: Copy>(&self, flat: &[T], row: usize, index: usize) -> Option<T> {
        let r = self.range(row);
        if index >= r.len() { None } else { Some(flat[r.start + index]) }
    }

    /// Element `index` of every event.
    pub fn nth<T: Copy>(&self, flat: &[T], index: usize) -> Vec<Option<T>> {
        (0..self.n_entries()).map(|row| self.get(flat, row, index)).collect()
    }

    /// Offsets after keeping only the objects with `keep[i] == true`.
    pub fn filter(&self, keep: &[bool]) -> Self {
        // subsets of a valid table cannot overflow
        let mut total = 0;
        let mut offsets = Vec::with_capacity(self.0.len());
        offsets.push(0);
        for c in self.count_true(keep) {
            total += c;
            offsets.push(total);
        }
        Self(offsets)
    }

    /// Per-event number of objects with `mask[i] == true`.
    pub fn count_true(&self, mask: &[bool]) -> Vec<usize> {
        (0..self.n_entries()).map(|row| mask[self.range(row)].iter().filter(|&&m| m).count()).collect()
    }

    /// Per-event sum of `flat` over the objects with `mask[i] == true`.
    pub fn sum_where(&self, flat: &[f64], mask: &[bool]) -> Vec<f64> {
        (0..self.n_entries())
            .map(|row| {
                let r = self.range(row);
                flat[r.clone()].iter().zip(&mask[r]).filter(|(_, m)| **m).map(|(v, _)| v).sum()
            })
            .collect()
    }

    /// Event index of every object (length `total()`).
    pub fn parents(&self) -> Vec<usize> {
        let mut parents = Vec::with_capacity(self.total());
        for (row, w) in self.0.windows(2).enumerate() {
            parents.extend(std::iter::repeat_n(row, w[1] - w[0]));
        }
        parents
    }
}
