//! # Hybrid Optimization Loop
//!
//! $$
//! \min_{\gamma,\beta}\ \widehat{\mathbb{E}}\big[\mathbf{x}^\top Q\,\mathbf{x}\big],\qquad
//! \widehat{\mathbb{E}} = \frac{\sum_b c_b\, \mathbf{x}_b^\top Q\,\mathbf{x}_b}{\sum_b c_b}
//! $$
//!
//! Derivative-free search over 2p layer parameters against a shot-weighted
//! empirical objective supplied by a pluggable sampling oracle.

use std::f64::consts::PI;

use anyhow::Context;
use anyhow::Result;
use anyhow::bail;
use anyhow::ensure;
use argmin::core::CostFunction;
use argmin::core::Executor;
use argmin::solver::neldermead::NelderMead;
use impl_new_derive::ImplNew;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::Distribution;
use rand_distr::Uniform;
use tracing::debug;
use tracing::info;

use super::decode_bitstring;
use super::oracle::SamplingOracle;
use super::selected_from;
use crate::ising::IsingModel;
use crate::qubo::QuboFormulation;

/// Final-readout shot multiplier relative to optimization-time shots.
const READOUT_SHOT_FACTOR: u64 = 4;

/// Tunables for the sampling-driven variational loop.
#[derive(ImplNew, Clone, Copy, Debug)]
pub struct HybridConfig {
  /// Number of `(gamma, beta)` layers, so the search runs over `2 * layers`
  /// real parameters.
  pub layers: usize,
  /// Iteration budget for the Nelder-Mead search.
  pub maxiter: u64,
  /// Shots per objective evaluation; the final readout requests four times
  /// this amount.
  pub shots: u64,
  /// Seed for the initial parameter draw.
  pub seed: u64,
}

impl Default for HybridConfig {
  fn default() -> Self {
    Self {
      layers: 1,
      maxiter: 50,
      shots: 1024,
      seed: 42,
    }
  }
}

/// Best-effort selection produced by the hybrid loop.
///
/// The reported candidate is the empirical minimum over observed samples,
/// not a provable optimum.
#[derive(Clone, Debug)]
pub struct HybridSolution {
  /// Selected index set in ascending order.
  pub selected: Vec<usize>,
  /// Selected candidate as a 0/1 string, character `i` = asset `i`.
  pub bitstring: String,
  /// QUBO cost of the selected candidate.
  pub cost: f64,
  /// Optimizer iterations consumed.
  pub iterations: u64,
  /// Number of binary variables, equal to the asset count.
  pub num_variables: usize,
  /// Parameter layers used.
  pub layers: usize,
  /// False when the readout's best candidate does not carry exactly `k`
  /// ones. Surfaced as an approximation artifact, never repaired.
  pub cardinality_feasible: bool,
}

/// Classical driver around an injected sampling oracle.
#[derive(Debug)]
pub struct HybridSolver {
  formulation: QuboFormulation,
  ising: IsingModel,
  config: HybridConfig,
}

impl HybridSolver {
  /// Derive the spin coefficients and validate the loop configuration.
  pub fn new(formulation: QuboFormulation, config: HybridConfig) -> Result<Self> {
    ensure!(
      config.layers >= 1,
      "layers must be at least 1, got {}",
      config.layers
    );
    ensure!(
      config.maxiter >= 1,
      "maxiter must be at least 1, got {}",
      config.maxiter
    );
    ensure!(
      config.shots >= 1,
      "shots must be at least 1, got {}",
      config.shots
    );

    let ising = IsingModel::from_qubo(formulation.matrix())?;
    Ok(Self {
      formulation,
      ising,
      config,
    })
  }

  /// The spin-model coefficients handed to the oracle.
  pub fn ising(&self) -> &IsingModel {
    &self.ising
  }

  /// Loop configuration in effect.
  pub fn config(&self) -> HybridConfig {
    self.config
  }

  /// Run the variational search, then a high-shot readout, and report the
  /// lowest-cost observed candidate.
  ///
  /// Oracle failures (including an empty sample set) propagate as errors;
  /// non-convergence of the parameter search does not.
  pub fn solve(&self, oracle: &dyn SamplingOracle) -> Result<HybridSolution> {
    let n = self.formulation.num_assets();
    let p = self.config.layers;
    let dim = 2 * p;

    let mut rng = StdRng::seed_from_u64(self.config.seed);
    let draw = Uniform::new(0.0, PI);
    let x0: Vec<f64> = (0..dim).map(|_| draw.sample(&mut rng)).collect();

    let mut simplex = Vec::with_capacity(dim + 1);
    simplex.push(x0.clone());
    for i in 0..dim {
      let mut vertex = x0.clone();
      vertex[i] += 0.5;
      simplex.push(vertex);
    }

    let cost = ExpectationCost {
      formulation: &self.formulation,
      ising: &self.ising,
      oracle,
      layers: p,
      shots: self.config.shots,
    };

    let solver = NelderMead::new(simplex)
      .with_sd_tolerance(1e-8)
      .context("invalid simplex tolerance")?;
    let res = Executor::new(cost, solver)
      .configure(|state| state.max_iters(self.config.maxiter))
      .run()
      .context("hybrid parameter search failed")?;

    let iterations = res.state.iter;
    let best_params = res.state.best_param.unwrap_or(x0);
    let (gamma, beta) = best_params.split_at(p);

    let counts = oracle.sample(
      &self.ising.h,
      &self.ising.j,
      n,
      gamma,
      beta,
      self.config.shots * READOUT_SHOT_FACTOR,
    )?;

    let mut best: Option<(String, f64)> = None;
    for (bits, &count) in &counts {
      if count == 0 {
        continue;
      }
      let x = decode_bitstring(bits, n)?;
      let candidate_cost = self.formulation.evaluate(&x);
      let better = match &best {
        Some((_, incumbent)) => candidate_cost < *incumbent,
        None => true,
      };
      if better {
        best = Some((bits.clone(), candidate_cost));
      }
    }

    let Some((bitstring, cost)) = best else {
      bail!("sampling oracle returned zero samples at final readout");
    };

    let x = decode_bitstring(&bitstring, n)?;
    let selected = selected_from(&x);
    let cardinality_feasible = selected.len() == self.formulation.k();

    info!(
      cost,
      iterations,
      cardinality_feasible,
      bitstring = bitstring.as_str(),
      "hybrid readout complete"
    );

    Ok(HybridSolution {
      selected,
      bitstring,
      cost,
      iterations,
      num_variables: n,
      layers: p,
      cardinality_feasible,
    })
  }
}

struct ExpectationCost<'a> {
  formulation: &'a QuboFormulation,
  ising: &'a IsingModel,
  oracle: &'a dyn SamplingOracle,
  layers: usize,
  shots: u64,
}

impl ExpectationCost<'_> {
  /// Shot-weighted empirical expectation of the QUBO objective.
  fn estimate(&self, params: &[f64]) -> Result<f64> {
    let n = self.formulation.num_assets();
    let (gamma, beta) = params.split_at(self.layers);
    let counts = self
      .oracle
      .sample(&self.ising.h, &self.ising.j, n, gamma, beta, self.shots)?;

    let mut weighted = 0.0;
    let mut total = 0u64;
    for (bits, &count) in &counts {
      if count == 0 {
        continue;
      }
      let x = decode_bitstring(bits, n)?;
      weighted += self.formulation.evaluate(&x) * count as f64;
      total += count;
    }
    ensure!(
      total > 0,
      "sampling oracle returned zero samples, expectation is undefined"
    );

    let estimate = weighted / total as f64;
    debug!(estimate, shots = self.shots, "expectation evaluated");
    Ok(estimate)
  }
}

impl CostFunction for ExpectationCost<'_> {
  type Param = Vec<f64>;
  type Output = f64;

  fn cost(&self, params: &Self::Param) -> Result<Self::Output, argmin::core::Error> {
    self.estimate(params)
  }
}

#[cfg(test)]
mod tests {
  use std::collections::BTreeMap;

  use ndarray::array;
  use ndarray::Array1;
  use ndarray::Array2;

  use super::*;

  /// Oracle that replays one engineered distribution on every call.
  struct FixedOracle {
    counts: BTreeMap<String, u64>,
  }

  impl FixedOracle {
    fn from_pairs(pairs: &[(&str, u64)]) -> Self {
      Self {
        counts: pairs
          .iter()
          .map(|(bits, count)| (bits.to_string(), *count))
          .collect(),
      }
    }
  }

  impl SamplingOracle for FixedOracle {
    fn sample(
      &self,
      _h: &Array1<f64>,
      _j: &Array2<f64>,
      _n: usize,
      _gamma: &[f64],
      _beta: &[f64],
      _shots: u64,
    ) -> Result<BTreeMap<String, u64>> {
      Ok(self.counts.clone())
    }
  }

  struct EmptyOracle;

  impl SamplingOracle for EmptyOracle {
    fn sample(
      &self,
      _h: &Array1<f64>,
      _j: &Array2<f64>,
      _n: usize,
      _gamma: &[f64],
      _beta: &[f64],
      _shots: u64,
    ) -> Result<BTreeMap<String, u64>> {
      Ok(BTreeMap::new())
    }
  }

  fn four_asset_formulation() -> QuboFormulation {
    let returns = array![0.10, 0.20, 0.15, 0.05];
    let covariance = Array2::from_diag(&array![0.04, 0.09, 0.06, 0.02]);
    QuboFormulation::new(returns, covariance, 2, 0.5, None).unwrap()
  }

  fn small_config() -> HybridConfig {
    HybridConfig::new(1, 10, 64, 42)
  }

  #[test]
  fn expectation_is_the_shot_weighted_mean() {
    let returns = array![0.1, 0.2];
    let covariance = Array2::from_diag(&array![0.04, 0.09]);
    let formulation = QuboFormulation::new(returns, covariance, 1, 0.5, None).unwrap();
    let ising = IsingModel::from_qubo(formulation.matrix()).unwrap();
    let oracle = FixedOracle::from_pairs(&[("10", 3), ("01", 1)]);

    let cost = ExpectationCost {
      formulation: &formulation,
      ising: &ising,
      oracle: &oracle,
      layers: 1,
      shots: 4,
    };

    let expected = (formulation.evaluate(&[1, 0]) * 3.0 + formulation.evaluate(&[0, 1])) / 4.0;
    let estimate = cost.estimate(&[0.7, 0.3]).unwrap();
    assert!((estimate - expected).abs() < 1e-12);
  }

  #[test]
  fn readout_picks_the_lowest_cost_observed_candidate() {
    let formulation = four_asset_formulation();
    // {0, 1} beats {2, 3} on the pair objective even with fewer counts.
    let oracle = FixedOracle::from_pairs(&[("0011", 30), ("1100", 2)]);

    let solver = HybridSolver::new(formulation, small_config()).unwrap();
    let solution = solver.solve(&oracle).unwrap();

    assert_eq!(solution.bitstring, "1100");
    assert_eq!(solution.selected, vec![0, 1]);
    assert!(solution.cardinality_feasible);
    assert_eq!(solution.num_variables, 4);
    assert_eq!(solution.layers, 1);
    assert!(solution.iterations <= 10);
  }

  #[test]
  fn empty_sample_set_is_an_explicit_error() {
    let solver = HybridSolver::new(four_asset_formulation(), small_config()).unwrap();
    let err = solver.solve(&EmptyOracle).unwrap_err();
    assert!(format!("{:#}", err).contains("zero samples"));
  }

  #[test]
  fn infeasible_readout_is_flagged_not_repaired() {
    let formulation = four_asset_formulation();
    let oracle = FixedOracle::from_pairs(&[("1110", 5), ("1111", 1)]);

    let solver = HybridSolver::new(formulation, small_config()).unwrap();
    let solution = solver.solve(&oracle).unwrap();

    assert!(!solution.cardinality_feasible);
    assert_eq!(solution.selected.len(), 3);
  }

  #[test]
  fn config_defaults_and_validation() {
    let config = HybridConfig::default();
    assert_eq!(config.layers, 1);
    assert_eq!(config.maxiter, 50);
    assert_eq!(config.shots, 1024);
    assert_eq!(config.seed, 42);

    let err = HybridSolver::new(four_asset_formulation(), HybridConfig::new(0, 10, 64, 1))
      .unwrap_err()
      .to_string();
    assert!(err.contains("layers"));
  }

  #[test]
  fn identical_seeds_walk_identical_parameters() {
    let oracle = FixedOracle::from_pairs(&[("0110", 4), ("1100", 4)]);
    let a = HybridSolver::new(four_asset_formulation(), small_config())
      .unwrap()
      .solve(&oracle)
      .unwrap();
    let b = HybridSolver::new(four_asset_formulation(), small_config())
      .unwrap()
      .solve(&oracle)
      .unwrap();

    assert_eq!(a.bitstring, b.bitstring);
    assert_eq!(a.cost, b.cost);
    assert_eq!(a.iterations, b.iterations);
  }
}
