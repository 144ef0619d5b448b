//! # te-select
//!
//! Event selection for trigger turn-on studies: ragged candidate collections
//! built from flat columns, the named cut registry, the region table and the
//! chunk processor that fills the analysis histograms.
//!
//! ```no_run
//! use te_core::Config;
//! use te_select::{EventBatch, HltProcessor};
//!
//! # fn main() -> te_core::Result<()> {
//! let processor = HltProcessor::new(Config::default())?;
//! let batch: EventBatch = serde_json::from_str(&std::fs::read_to_string("chunk0.json")?)?;
//! let acc = processor.process("Muon_2022E", &batch)?;
//! println!("{} histograms", acc.len());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod batch;
pub mod candidates;
pub mod cuts;
pub mod jagged;
pub mod processor;
pub mod regions;

pub use batch::EventBatch;
pub use candidates::{CandidateArray, Candidates};
pub use cuts::{Cut, CutContext};
pub use jagged::Offsets;
pub use processor::{HltProcessor, hlt_accumulator};
pub use regions::{RegionPair, RegionTable};
