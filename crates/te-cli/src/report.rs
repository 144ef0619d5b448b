//! Plain-text summaries printed next to the JSON outputs.

use std::fmt::Write;
use te_fit::{FitOutcome, TurnOnReport};
use te_select::RegionTable;

/// One line per curve: study, curve, fit parameters or failure.
pub fn summary(report: &TurnOnReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", report.equation);
    for study in &report.studies {
        let _ = writeln!(out, "{} ({}, {})", study.name, study.title, study.distribution);
        for curve in &study.curves {
            let fit = match &curve.fit {
                Some(FitOutcome::Converged(fit)) => {
                    let err = |i: usize| fit.result.uncertainties.get(i).copied().unwrap_or(f64::NAN);
                    format!(
                        "mu = {:.2} +- {:.2}, sigma = {:.2}, sse/ndof = {:.3e}/{}",
                        fit.turn_on_point(),
                        err(1),
                        fit.width(),
                        fit.result.sse,
                        fit.result.ndof()
                    )
                }
                Some(FitOutcome::Failed(failure)) => format!("fit failed: {failure}"),
                None => {
                    let valid = curve.efficiency.valid_points().len();
                    format!("{valid} bins with a defined efficiency")
                }
            };
            let _ = writeln!(out, "  {:<16} {}", curve.curve.label, fit);
        }
    }
    for skipped in &report.skipped {
        let _ = writeln!(out, "{} skipped: {}", skipped.name, skipped.reason);
    }
    out
}

/// Region names with their cut lists.
pub fn region_table(table: &RegionTable) -> String {
    let width = table.names().map(str::len).max().unwrap_or(0);
    let mut out = String::new();
    for (name, cuts) in table.iter() {
        let cuts: Vec<String> = cuts.iter().map(ToString::to_string).collect();
        let _ = writeln!(out, "{name:<width$}  {}", cuts.join(", "));
    }
    out
}
