//! # te-fit
//!
//! Trigger efficiency curves and their fits: per-bin ratios of region-pair
//! projections, least-squares fits of sigmoid-family turn-on shapes with a
//! bounded L-BFGS minimizer, and the analysis' built-in turn-on studies.
//!
//! ## Example
//!
//! ```
//! use te_fit::{FitFunction, TurnOnFitter};
//!
//! let points: Vec<(f64, f64)> =
//!     (0..20).map(|i| 100.0 + 10.0 * i as f64).map(|x| (x, FitFunction::Sigmoid.eval(x, 0.05, 200.0))).collect();
//! let outcome = TurnOnFitter::default().fit_points(&points, FitFunction::Sigmoid, [0.04, 190.0]).unwrap();
//! let fit = outcome.fit().unwrap();
//! assert!((fit.turn_on_point() - 200.0).abs() < 1e-3);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod function;
pub mod optimizer;
pub mod study;
pub mod turnon;

pub use function::FitFunction;
pub use optimizer::{BoundedLbfgs, Minimum, Objective, OptimizerConfig};
pub use study::{Curve, Rebin, Slice, StudyReport, TurnOnReport, TurnOnStudy, builtin_studies, run_studies};
pub use turnon::{Efficiency, FitFailure, FitOutcome, TurnOnFit, TurnOnFitter, fit};
