//! Bounded L-BFGS minimization on top of argmin.
//!
//! Bounds are enforced by clamping every evaluated point into the box and
//! projecting the gradient at active bounds, so the line search never walks
//! into a flat clamped region.

use argmin::core::{CostFunction, Executor, Gradient, State, TerminationReason, TerminationStatus};
use argmin::solver::linesearch::MoreThuenteLineSearch;
use argmin::solver::quasinewton::LBFGS;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use te_core::{Error, Result};

/// Settings of the L-BFGS minimizer.
#[derive(Debug, Clone)]
pub struct OptimizerConfig {
    /// Maximum number of iterations.
    pub max_iter: u64,
    /// Convergence tolerance on the gradient norm.
    pub tol_grad: f64,
    /// Convergence tolerance on the change of the cost between iterations.
    pub tol_cost: f64,
    /// A cost at or below this value counts as converged.
    pub target_cost: f64,
    /// Number of stored corrections approximating the inverse Hessian.
    pub history: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self { max_iter: 500, tol_grad: 1e-9, tol_cost: 1e-14, target_cost: 1e-14, history: 7 }
    }
}

/// Minimum found by the optimizer.
#[derive(Debug, Clone)]
pub struct Minimum {
    /// Parameters at the minimum (inside the bounds).
    pub parameters: Vec<f64>,
    /// Cost at the minimum.
    pub cost: f64,
    /// Iterations performed.
    pub n_iter: u64,
    /// Cost evaluations.
    pub n_cost: usize,
    /// Gradient evaluations.
    pub n_grad: usize,
    /// Whether a convergence criterion was met (as opposed to the iteration limit).
    pub converged: bool,
    /// Termination status reported by the solver.
    pub status: String,
}

impl fmt::Display for Minimum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Minimum(cost={:.3e}, n_iter={}, n_cost={}, n_grad={}, converged={})",
            self.cost, self.n_iter, self.n_cost, self.n_grad, self.converged
        )
    }
}

/// A differentiable scalar cost.
pub trait Objective: Send + Sync {
    /// Cost at `params`.
    fn cost(&self, params: &[f64]) -> Result<f64>;

    /// Gradient at `params`; central differences unless overridden.
    fn gradient(&self, params: &[f64]) -> Result<Vec<f64>> {
        let mut grad = vec![0.0; params.len()];
        let mut shifted = params.to_vec();
        for i in 0..params.len() {
            let h = 1e-8 * params[i].abs().max(1.0);
            shifted[i] = params[i] + h;
            let up = self.cost(&shifted)?;
            shifted[i] = params[i] - h;
            let down = self.cost(&shifted)?;
            shifted[i] = params[i];
            grad[i] = (up - down) / (2.0 * h);
        }
        Ok(grad)
    }
}

#[derive(Default)]
struct EvalCounts {
    cost: AtomicUsize,
    grad: AtomicUsize,
}

/// Adapter from [`Objective`] to argmin's problem traits.
struct Problem<'a> {
    objective: &'a dyn Objective,
    bounds: &'a [(f64, f64)],
    counts: Arc<EvalCounts>,
}

fn clamp(params: &[f64], bounds: &[(f64, f64)]) -> Vec<f64> {
    params.iter().zip(bounds).map(|(&v, &(lo, hi))| v.clamp(lo, hi)).collect()
}

fn to_argmin(e: Error) -> argmin::core::Error {
    argmin::core::Error::msg(e.to_string())
}

impl CostFunction for Problem<'_> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, params: &Self::Param) -> std::result::Result<f64, argmin::core::Error> {
        self.counts.cost.fetch_add(1, Ordering::Relaxed);
        self.objective.cost(&clamp(params, self.bounds)).map_err(to_argmin)
    }
}

impl Gradient for Problem<'_> {
    type Param = Vec<f64>;
    type Gradient = Vec<f64>;

    fn gradient(&self, params: &Self::Param) -> std::result::Result<Vec<f64>, argmin::core::Error> {
        self.counts.grad.fetch_add(1, Ordering::Relaxed);
        let x = clamp(params, self.bounds);
        let mut g = self.objective.gradient(&x).map_err(to_argmin)?;
        // zero components pushing further out of an active bound
        const EPS: f64 = 1e-12;
        for (gi, (&xi, &(lo, hi))) in g.iter_mut().zip(x.iter().zip(self.bounds)) {
            if (xi <= lo + EPS && *gi > 0.0) || (xi >= hi - EPS && *gi < 0.0) {
                *gi = 0.0;
            }
        }
        Ok(g)
    }
}

/// L-BFGS with box constraints.
#[derive(Debug, Clone, Default)]
pub struct BoundedLbfgs {
    config: OptimizerConfig,
}

impl BoundedLbfgs {
    /// Minimizer with the given settings.
    pub fn new(config: OptimizerConfig) -> Self {
        Self { config }
    }

    /// Settings in use.
    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Minimize `objective` from `init` inside `bounds`.
    ///
    /// An `Err` means the problem could not be set up or the solver aborted
    /// (e.g. the line search failed); hitting the iteration limit is reported
    /// through [`Minimum::converged`] instead.
    pub fn minimize(&self, objective: &dyn Objective, init: &[f64], bounds: &[(f64, f64)]) -> Result<Minimum> {
        if init.len() != bounds.len() {
            return Err(Error::Validation(format!(
                "{} initial values for {} bounds",
                init.len(),
                bounds.len()
            )));
        }
        let start = clamp(init, bounds);

        // Already at the target: a zero gradient would give the line search no direction.
        let start_cost = objective.cost(&start)?;
        if start_cost <= self.config.target_cost {
            return Ok(Minimum {
                parameters: start,
                cost: start_cost,
                n_iter: 0,
                n_cost: 1,
                n_grad: 0,
                converged: true,
                status: "initial point meets the target cost".into(),
            });
        }

        let counts = Arc::new(EvalCounts::default());
        let problem = Problem { objective, bounds, counts: Arc::clone(&counts) };
        let solver = LBFGS::new(MoreThuenteLineSearch::new(), self.config.history)
            .with_tolerance_grad(self.config.tol_grad)
            .and_then(|s| s.with_tolerance_cost(self.config.tol_cost))
            .map_err(|e| Error::Validation(format!("invalid optimizer tolerance: {e}")))?;

        let res = Executor::new(problem, solver)
            .configure(|state| {
                state.param(start).max_iters(self.config.max_iter).target_cost(self.config.target_cost)
            })
            .run()
            .map_err(|e| Error::Computation(format!("optimizer aborted: {e}")))?;

        let state = res.state();
        let best = state
            .get_best_param()
            .ok_or_else(|| Error::Computation("optimizer returned no parameters".into()))?;
        let termination = state.get_termination_status();
        let converged = matches!(
            termination,
            TerminationStatus::Terminated(TerminationReason::SolverConverged)
                | TerminationStatus::Terminated(TerminationReason::TargetCostReached)
        );

        Ok(Minimum {
            parameters: clamp(best, bounds),
            cost: state.get_best_cost(),
            n_iter: state.get_iter(),
            n_cost: counts.cost.load(Ordering::Relaxed),
            n_grad: counts.grad.load(Ordering::Relaxed),
            converged,
            status: termination.to_string(),
        })
    }
}
