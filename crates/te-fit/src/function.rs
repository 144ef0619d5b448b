//! Monotone two-parameter turn-on shapes.

use serde::{Deserialize, Serialize};
use statrs::function::erf::erf;
use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;
use te_core::{Error, Result};

/// Turn-on curve family `f(x; a, b)`: `b` is the turn-on point, `1/a` the width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitFunction {
    /// Logistic `1 / (1 + exp(-a (x - b)))`.
    Sigmoid,
    /// Gaussian error function `0.5 (1 + erf(a (x - b)))`.
    #[default]
    #[serde(alias = "erf")]
    ErrorFunction,
}

impl FitFunction {
    /// Every supported shape.
    pub const ALL: [FitFunction; 2] = [FitFunction::Sigmoid, FitFunction::ErrorFunction];

    /// Short name used on the command line and in reports.
    pub fn name(self) -> &'static str {
        match self {
            FitFunction::Sigmoid => "sigmoid",
            FitFunction::ErrorFunction => "erf",
        }
    }

    /// Value at `x`.
    pub fn eval(self, x: f64, a: f64, b: f64) -> f64 {
        let z = a * (x - b);
        match self {
            FitFunction::Sigmoid => 1.0 / (1.0 + (-z).exp()),
            FitFunction::ErrorFunction => 0.5 * (1.0 + erf(z)),
        }
    }

    /// Partial derivatives `(df/da, df/db)` at `x`.
    pub fn gradient(self, x: f64, a: f64, b: f64) -> [f64; 2] {
        let d = x - b;
        // df/dz; z = a (x - b)
        let dfdz = match self {
            FitFunction::Sigmoid => {
                let s = self.eval(x, a, b);
                s * (1.0 - s)
            }
            FitFunction::ErrorFunction => (-(a * d).powi(2)).exp() / PI.sqrt(),
        };
        [dfdz * d, -dfdz * a]
    }

    /// Closed form with the turn-on point `mu` and width `sigma` made explicit.
    pub fn equation(self) -> &'static str {
        match self {
            FitFunction::Sigmoid => "Eff(x) = 1 / (1 + exp(-(x - mu) / sigma))",
            FitFunction::ErrorFunction => "Eff(x) = 0.5 * (1 + erf((x - mu) / sigma))",
        }
    }

    /// Legend label for fitted parameters: `mu=<b>, sigma=<1/a>`.
    pub fn param_label(self, a: f64, b: f64) -> String {
        format!("mu={b:.2}, sigma={:.2}", 1.0 / a)
    }
}

impl fmt::Display for FitFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FitFunction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sigmoid" => Ok(FitFunction::Sigmoid),
            "erf" | "error_function" => Ok(FitFunction::ErrorFunction),
            other => Err(Error::Validation(format!("unknown fit function '{other}' (expected sigmoid or erf)"))),
        }
    }
}
