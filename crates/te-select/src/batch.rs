//! Columnar event batch: the flat arrays of one chunk of events.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use te_core::{Error, Result};

/// Flat arrays keyed by input field name.
///
/// Per-event columns (counts, MET, trigger bits, quality flags) have
/// `n_events` entries; per-object columns (`Jet_pt`, ...) have as many
/// entries as the sum of the matching count column. Booleans are stored as
/// numbers and read as `value != 0`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventBatch {
    /// Number of events in the chunk.
    pub n_events: usize,
    /// Flat arrays by field name.
    pub columns: HashMap<String, Vec<f64>>,
}

impl EventBatch {
    /// Empty batch of `n_events` events.
    pub fn new(n_events: usize) -> Self {
        Self { n_events, columns: HashMap::new() }
    }

    /// Builder-style column insertion.
    pub fn with_column(mut self, name: impl Into<String>, values: Vec<f64>) -> Self {
        self.insert(name, values);
        self
    }

    /// Insert or replace a column.
    pub fn insert(&mut self, name: impl Into<String>, values: Vec<f64>) {
        self.columns.insert(name.into(), values);
    }

    /// Whether a column is present.
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    /// Any column, without a length check.
    pub fn column(&self, name: &str) -> Result<&[f64]> {
        self.columns
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| Error::Config(format!("missing required input column '{name}'")))
    }

    /// A per-event column; its length must equal `n_events`.
    pub fn event_column(&self, name: &str) -> Result<&[f64]> {
        let col = self.column(name)?;
        if col.len() != self.n_events {
            return Err(Error::Data(format!(
                "column '{name}' has {} entries, batch has {} events",
                col.len(),
                self.n_events
            )));
        }
        Ok(col)
    }

    /// A per-event boolean column (non-zero is true).
    pub fn flag(&self, name: &str) -> Result<Vec<bool>> {
        Ok(self.event_column(name)?.iter().map(|&v| v != 0.0).collect())
    }

    /// A per-event object-count column; entries must be non-negative integers
    /// representable as `usize`.
    pub fn counts(&self, name: &str) -> Result<Vec<usize>> {
        self.event_column(name)?
            .iter()
            .enumerate()
            .map(|(i, &v)| {
                if v >= 0.0 && v.fract() == 0.0 && v < usize::MAX as f64 {
                    Ok(v as usize)
                } else {
                    Err(Error::Data(format!("count column '{name}' has invalid value {v} at event {i}")))
                }
            })
            .collect()
    }
}
