//! # Selection Engine
//!
//! $$
//! (\mu, \Sigma) \to Q \to \{\text{exact},\ \text{hybrid}\} \to \text{report}
//! $$
//!
//! High-level orchestration: one formulation, both solvers, one comparable
//! report per solver plus a side-by-side comparison.

use anyhow::Result;
use ndarray::Array1;
use ndarray::Array2;
use prettytable::Table;
use prettytable::row;
use tracing::info;

use crate::metrics::portfolio_metrics;
use crate::metrics::PortfolioMetrics;
use crate::qubo::QuboFormulation;
use crate::qubo::SectorGroups;
use crate::solver::brute_force::solve_exact;
use crate::solver::brute_force::ExactSolution;
use crate::solver::hybrid::HybridConfig;
use crate::solver::hybrid::HybridSolution;
use crate::solver::hybrid::HybridSolver;
use crate::solver::oracle::SamplingOracle;

/// Engine-level configuration shared by both solver paths.
#[derive(Clone, Debug)]
pub struct SelectionConfig {
  /// Number of assets to select.
  pub k: usize,
  /// Risk-aversion weight in [0, 1]; 0 maximizes return, 1 minimizes risk.
  pub lambda: f64,
  /// Cardinality penalty override; derived from the input scale when `None`.
  pub penalty: Option<f64>,
  /// Per-sector selection cap, applied only when sector groups are supplied.
  pub max_per_sector: Option<usize>,
  /// Hybrid-loop tunables.
  pub hybrid: HybridConfig,
}

impl Default for SelectionConfig {
  fn default() -> Self {
    Self {
      k: 2,
      lambda: 0.5,
      penalty: None,
      max_per_sector: None,
      hybrid: HybridConfig::default(),
    }
  }
}

/// Exact solver output paired with its portfolio metrics.
#[derive(Clone, Debug)]
pub struct ExactReport {
  pub solution: ExactSolution,
  pub metrics: PortfolioMetrics,
}

/// Hybrid solver output paired with its portfolio metrics.
///
/// `metrics` is `None` when the readout selected nothing at all, which can
/// only happen for degenerate oracle distributions.
#[derive(Clone, Debug)]
pub struct HybridReport {
  pub solution: HybridSolution,
  pub metrics: Option<PortfolioMetrics>,
}

/// Side-by-side outcome of running both solvers on the same formulation.
#[derive(Clone, Debug)]
pub struct SolverComparison {
  pub exact: ExactReport,
  pub hybrid: HybridReport,
  /// Non-negative empirical optimality gap of the hybrid readout.
  pub cost_gap: f64,
  /// Whether both solvers selected the same index set.
  pub selections_match: bool,
}

/// Single entry point wiring the formulation to both solvers.
#[derive(Clone, Debug)]
pub struct SelectionEngine {
  config: SelectionConfig,
}

impl SelectionEngine {
  /// Construct a new engine with explicit configuration.
  pub fn new(config: SelectionConfig) -> Self {
    Self { config }
  }

  /// Borrow engine configuration.
  pub fn config(&self) -> &SelectionConfig {
    &self.config
  }

  fn formulation(
    &self,
    returns: &Array1<f64>,
    covariance: &Array2<f64>,
    sectors: Option<&SectorGroups>,
  ) -> Result<QuboFormulation> {
    let formulation = QuboFormulation::new(
      returns.clone(),
      covariance.clone(),
      self.config.k,
      self.config.lambda,
      self.config.penalty,
    )?;

    match (sectors, self.config.max_per_sector) {
      (Some(groups), Some(cap)) => formulation.with_sector_cap(groups.clone(), cap),
      _ => Ok(formulation),
    }
  }

  /// Run the exhaustive solver and score its selection.
  pub fn solve_exact(
    &self,
    returns: &Array1<f64>,
    covariance: &Array2<f64>,
    sectors: Option<&SectorGroups>,
  ) -> Result<ExactReport> {
    let formulation = self.formulation(returns, covariance, sectors)?;
    let solution = solve_exact(&formulation);
    let metrics = portfolio_metrics(&solution.selected, returns, covariance)?;
    Ok(ExactReport { solution, metrics })
  }

  /// Run the hybrid loop against `oracle` and score its selection.
  pub fn solve_hybrid(
    &self,
    returns: &Array1<f64>,
    covariance: &Array2<f64>,
    sectors: Option<&SectorGroups>,
    oracle: &dyn SamplingOracle,
  ) -> Result<HybridReport> {
    let formulation = self.formulation(returns, covariance, sectors)?;
    let solver = HybridSolver::new(formulation, self.config.hybrid)?;
    let solution = solver.solve(oracle)?;

    let metrics = if solution.selected.is_empty() {
      None
    } else {
      Some(portfolio_metrics(&solution.selected, returns, covariance)?)
    };

    Ok(HybridReport { solution, metrics })
  }

  /// Run both solvers on identical inputs and relate their outcomes.
  pub fn compare(
    &self,
    returns: &Array1<f64>,
    covariance: &Array2<f64>,
    sectors: Option<&SectorGroups>,
    oracle: &dyn SamplingOracle,
  ) -> Result<SolverComparison> {
    let exact = self.solve_exact(returns, covariance, sectors)?;
    let hybrid = self.solve_hybrid(returns, covariance, sectors, oracle)?;

    let cost_gap = (hybrid.solution.cost - exact.solution.cost).max(0.0);
    let selections_match = hybrid.solution.selected == exact.solution.selected;

    info!(
      cost_gap,
      selections_match,
      exact_cost = exact.solution.cost,
      hybrid_cost = hybrid.solution.cost,
      "solver comparison complete"
    );

    Ok(SolverComparison {
      exact,
      hybrid,
      cost_gap,
      selections_match,
    })
  }
}

impl SolverComparison {
  /// Render the comparison as a printable side-by-side table.
  pub fn to_table(&self) -> Table {
    let exact = &self.exact;
    let hybrid = &self.hybrid;

    let hybrid_return = hybrid
      .metrics
      .as_ref()
      .map(|m| format!("{:.4}", m.expected_return))
      .unwrap_or_else(|| "-".to_string());
    let hybrid_risk = hybrid
      .metrics
      .as_ref()
      .map(|m| format!("{:.4}", m.risk))
      .unwrap_or_else(|| "-".to_string());
    let hybrid_sharpe = hybrid
      .metrics
      .as_ref()
      .map(|m| format!("{:.4}", m.sharpe))
      .unwrap_or_else(|| "-".to_string());

    let mut table = Table::new();
    table.add_row(row!["", "exact", "hybrid"]);
    table.add_row(row![
      "selected",
      format!("{:?}", exact.solution.selected),
      format!("{:?}", hybrid.solution.selected)
    ]);
    table.add_row(row![
      "bitstring",
      exact.solution.bitstring,
      hybrid.solution.bitstring
    ]);
    table.add_row(row![
      "cost",
      format!("{:.6}", exact.solution.cost),
      format!("{:.6}", hybrid.solution.cost)
    ]);
    table.add_row(row![
      "expected return",
      format!("{:.4}", exact.metrics.expected_return),
      hybrid_return
    ]);
    table.add_row(row![
      "risk",
      format!("{:.4}", exact.metrics.risk),
      hybrid_risk
    ]);
    table.add_row(row![
      "sharpe",
      format!("{:.4}", exact.metrics.sharpe),
      hybrid_sharpe
    ]);
    table.add_row(row![
      "cardinality feasible",
      "yes",
      if hybrid.solution.cardinality_feasible {
        "yes"
      } else {
        "no"
      }
    ]);
    table.add_row(row![
      "combinations / iterations",
      exact.solution.combinations,
      hybrid.solution.iterations
    ]);
    table.add_row(row!["cost gap", "", format!("{:.6}", self.cost_gap)]);
    table
  }
}
