//! # te-hist
//!
//! Histograms for trigger efficiency studies: sparse categorical axes
//! (dataset, region) over dense numeric axes, plus the mergeable
//! [`Accumulator`] that chunk workers produce.
//!
//! ## Example
//!
//! ```
//! use te_hist::{Accumulator, BinAxis, CatAxis, Hist};
//!
//! let hist = Hist::new(
//!     "Counts",
//!     vec![CatAxis::new("dataset", "Primary dataset"), CatAxis::new("region", "Selection region")],
//!     vec![BinAxis::regular("recoil", "Recoil (GeV)", 50, 0.0, 1000.0).unwrap()],
//! )
//! .unwrap();
//! let mut acc: Accumulator = [("recoil".to_string(), hist)].into_iter().collect();
//! acc.fill("recoil", "Muon_2022E", "tr_metnomu_den", &[180.0, 240.0], None).unwrap();
//! let merged = acc.clone().merge(&acc).unwrap();
//! assert_eq!(merged.hist("recoil").unwrap().project("recoil").unwrap().integral(), 4.0);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod accumulator;
pub mod axis;
pub mod filler;
pub mod hist;
pub mod histogram;

pub use accumulator::Accumulator;
pub use axis::{BinAxis, CatAxis};
pub use hist::{Bins, CategorySelector, Hist};
pub use histogram::Histogram;
