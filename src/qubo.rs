//! # QUBO Formulation
//!
//! $$
//! \min_{\mathbf{x}\in\{0,1\}^n}\ \mathbf{x}^\top Q\,\mathbf{x},\qquad
//! Q \leftarrow \lambda\Sigma - (1-\lambda)\mu + P\Big(\sum_i x_i - k\Big)^2
//! $$
//!
//! Penalty-augmented binary objective for selecting exactly `k` of `n` assets.

use std::collections::BTreeMap;

use anyhow::Result;
use anyhow::ensure;
use ndarray::Array1;
use ndarray::Array2;

/// Immutable sector membership, label to member asset indices.
///
/// Built once per optimization call and never mutated by any solver.
#[derive(Clone, Debug, Default)]
pub struct SectorGroups {
  groups: BTreeMap<String, Vec<usize>>,
}

impl SectorGroups {
  /// Build sector groups from one label per asset, in asset order.
  pub fn from_labels<S: AsRef<str>>(labels: &[S]) -> Self {
    let mut groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (idx, label) in labels.iter().enumerate() {
      groups
        .entry(label.as_ref().to_string())
        .or_default()
        .push(idx);
    }
    Self { groups }
  }

  /// Iterate sectors in label order, members in ascending index order.
  pub fn iter(&self) -> impl Iterator<Item = (&str, &[usize])> {
    self
      .groups
      .iter()
      .map(|(label, members)| (label.as_str(), members.as_slice()))
  }

  /// Number of distinct sectors.
  pub fn len(&self) -> usize {
    self.groups.len()
  }

  pub fn is_empty(&self) -> bool {
    self.groups.is_empty()
  }

  fn max_index(&self) -> Option<usize> {
    self
      .groups
      .values()
      .flat_map(|members| members.iter().copied())
      .max()
  }
}

#[derive(Clone, Debug)]
struct SectorCap {
  groups: SectorGroups,
  max_per_sector: usize,
}

/// Per-term decomposition of the portfolio objective for one candidate.
#[derive(Clone, Copy, Debug)]
pub struct ObjectiveBreakdown {
  /// Quadratic risk term `x' Sigma x`.
  pub risk: f64,
  /// Linear return term `mu . x`.
  pub expected_return: f64,
  /// Number of selected assets.
  pub selected_count: usize,
  /// Squared cardinality deviation `(selected - k)^2`.
  pub cardinality_violation: f64,
  /// Cardinality penalty contribution `P (selected - k)^2`.
  pub penalty_term: f64,
  /// Sector-cap penalty contribution, zero when no cap is active.
  pub sector_penalty_term: f64,
  /// Full constrained objective including the constant penalty parts.
  pub total: f64,
}

/// Cardinality-constrained mean-variance selection encoded as a QUBO.
///
/// The matrix keeps only the diagonal and upper triangle populated; each
/// off-diagonal entry carries the doubled symmetric coefficient, so
/// `x' Q x` over the stored matrix equals the symmetric quadratic form.
#[derive(Clone, Debug)]
pub struct QuboFormulation {
  returns: Array1<f64>,
  covariance: Array2<f64>,
  k: usize,
  lambda: f64,
  penalty: f64,
  sector_cap: Option<SectorCap>,
  q: Array2<f64>,
}

impl QuboFormulation {
  /// Validate inputs and build the penalty-augmented QUBO matrix.
  ///
  /// `penalty` falls back to `max(10, 2 max(|Sigma|, |mu|) n)`, which makes
  /// any cardinality violation more expensive than every achievable
  /// return/risk trade-off among feasible subsets.
  pub fn new(
    returns: Array1<f64>,
    covariance: Array2<f64>,
    k: usize,
    lambda: f64,
    penalty: Option<f64>,
  ) -> Result<Self> {
    let n = returns.len();
    ensure!(n > 0, "returns must not be empty");
    ensure!(
      covariance.nrows() == covariance.ncols(),
      "covariance matrix must be square, got {}x{}",
      covariance.nrows(),
      covariance.ncols()
    );
    ensure!(
      covariance.nrows() == n,
      "returns length ({}) must match covariance dimension ({})",
      n,
      covariance.nrows()
    );
    ensure!(
      returns.iter().all(|r| r.is_finite()),
      "returns must be finite, found NaN or infinity"
    );
    ensure!(
      covariance.iter().all(|c| c.is_finite()),
      "covariance must be finite, found NaN or infinity"
    );
    ensure!(
      (0.0..=1.0).contains(&lambda),
      "lambda_param must be in [0, 1], got {}",
      lambda
    );
    ensure!((1..=n).contains(&k), "k must be in [1, {}], got {}", n, k);
    if let Some(p) = penalty {
      ensure!(
        p.is_finite() && p > 0.0,
        "penalty must be finite and positive, got {}",
        p
      );
    }

    let penalty = penalty.unwrap_or_else(|| default_penalty(&returns, &covariance));
    let q = build_matrix(&returns, &covariance, k, lambda, penalty, None);

    Ok(Self {
      returns,
      covariance,
      k,
      lambda,
      penalty,
      sector_cap: None,
      q,
    })
  }

  /// Activate a per-sector cap of `max_per_sector` selected assets.
  ///
  /// Sectors whose member count exceeds the cap receive a secondary penalty
  /// `P/2` with the cardinality pattern re-targeted at `max_per_sector`,
  /// restricted to that sector's index block.
  pub fn with_sector_cap(mut self, groups: SectorGroups, max_per_sector: usize) -> Result<Self> {
    ensure!(
      max_per_sector >= 1,
      "max_per_sector must be at least 1, got {}",
      max_per_sector
    );
    if let Some(max_idx) = groups.max_index() {
      ensure!(
        max_idx < self.num_assets(),
        "sector member index {} out of range for {} assets",
        max_idx,
        self.num_assets()
      );
    }

    let cap = SectorCap {
      groups,
      max_per_sector,
    };
    self.q = build_matrix(
      &self.returns,
      &self.covariance,
      self.k,
      self.lambda,
      self.penalty,
      Some(&cap),
    );
    self.sector_cap = Some(cap);
    Ok(self)
  }

  /// Number of assets in the universe.
  pub fn num_assets(&self) -> usize {
    self.returns.len()
  }

  /// Cardinality target.
  pub fn k(&self) -> usize {
    self.k
  }

  /// Risk-aversion weight.
  pub fn lambda(&self) -> f64 {
    self.lambda
  }

  /// Active cardinality penalty coefficient.
  pub fn penalty(&self) -> f64 {
    self.penalty
  }

  /// Annualized expected returns.
  pub fn returns(&self) -> &Array1<f64> {
    &self.returns
  }

  /// Annualized covariance matrix.
  pub fn covariance(&self) -> &Array2<f64> {
    &self.covariance
  }

  /// The QUBO matrix (diagonal plus upper triangle).
  pub fn matrix(&self) -> &Array2<f64> {
    &self.q
  }

  /// Symmetrized variant `(Q + Q') / 2` of the stored matrix.
  pub fn symmetric_matrix(&self) -> Array2<f64> {
    (&self.q + &self.q.t()) / 2.0
  }

  /// Evaluate `x' Q x` for a binary candidate.
  ///
  /// # Panics
  /// Panics if `x.len()` differs from the number of assets.
  pub fn evaluate(&self, x: &[u8]) -> f64 {
    let n = self.num_assets();
    assert_eq!(x.len(), n, "candidate length must equal the asset count");

    let mut cost = 0.0;
    for i in 0..n {
      if x[i] == 0 {
        continue;
      }
      cost += self.q[[i, i]];
      for j in (i + 1)..n {
        if x[j] != 0 {
          cost += self.q[[i, j]];
        }
      }
    }
    cost
  }

  /// Decompose the full constrained objective for a binary candidate.
  ///
  /// Unlike [`QuboFormulation::evaluate`], the reported total keeps the
  /// constant parts of the squared penalties, so `penalty_term` is exactly
  /// `P (selected - k)^2`.
  ///
  /// # Panics
  /// Panics if `x.len()` differs from the number of assets.
  pub fn components(&self, x: &[u8]) -> ObjectiveBreakdown {
    let n = self.num_assets();
    assert_eq!(x.len(), n, "candidate length must equal the asset count");

    let mut risk = 0.0;
    for i in 0..n {
      if x[i] == 0 {
        continue;
      }
      for j in 0..n {
        if x[j] != 0 {
          risk += self.covariance[[i, j]];
        }
      }
    }

    let expected_return: f64 = (0..n).filter(|&i| x[i] != 0).map(|i| self.returns[i]).sum();
    let selected_count = x.iter().filter(|&&b| b != 0).count();

    let deviation = selected_count as f64 - self.k as f64;
    let cardinality_violation = deviation * deviation;
    let penalty_term = self.penalty * cardinality_violation;

    let mut sector_penalty_term = 0.0;
    if let Some(cap) = &self.sector_cap {
      let half = self.penalty / 2.0;
      for (_, members) in cap.groups.iter() {
        if members.len() <= cap.max_per_sector {
          continue;
        }
        let in_sector = members.iter().filter(|&&i| x[i] != 0).count();
        let dev = in_sector as f64 - cap.max_per_sector as f64;
        sector_penalty_term += half * dev * dev;
      }
    }

    let total = self.lambda * risk - (1.0 - self.lambda) * expected_return
      + penalty_term
      + sector_penalty_term;

    ObjectiveBreakdown {
      risk,
      expected_return,
      selected_count,
      cardinality_violation,
      penalty_term,
      sector_penalty_term,
      total,
    }
  }
}

fn default_penalty(returns: &Array1<f64>, covariance: &Array2<f64>) -> f64 {
  let risk_scale = covariance.iter().fold(0.0_f64, |acc, c| acc.max(c.abs()));
  let return_scale = returns.iter().fold(0.0_f64, |acc, r| acc.max(r.abs()));
  let max_scale = risk_scale.max(return_scale);
  (2.0 * max_scale * returns.len() as f64).max(10.0)
}

fn build_matrix(
  returns: &Array1<f64>,
  covariance: &Array2<f64>,
  k: usize,
  lambda: f64,
  penalty: f64,
  sector_cap: Option<&SectorCap>,
) -> Array2<f64> {
  let n = returns.len();
  let mut q = Array2::zeros((n, n));

  for i in 0..n {
    q[[i, i]] =
      lambda * covariance[[i, i]] - (1.0 - lambda) * returns[i] + penalty * (1.0 - 2.0 * k as f64);
  }
  for i in 0..n {
    for j in (i + 1)..n {
      q[[i, j]] = 2.0 * (lambda * covariance[[i, j]] + penalty);
    }
  }

  if let Some(cap) = sector_cap {
    let half = penalty / 2.0;
    let m = cap.max_per_sector;
    for (_, members) in cap.groups.iter() {
      if members.len() <= m {
        continue;
      }
      for (pos, &i) in members.iter().enumerate() {
        q[[i, i]] += half * (1.0 - 2.0 * m as f64);
        for &j in &members[pos + 1..] {
          let (lo, hi) = if i < j { (i, j) } else { (j, i) };
          q[[lo, hi]] += 2.0 * half;
        }
      }
    }
  }

  q
}

#[cfg(test)]
mod tests {
  use ndarray::array;

  use super::*;

  fn two_asset() -> (Array1<f64>, Array2<f64>) {
    (
      array![0.1, 0.2],
      array![[0.04, 0.01], [0.01, 0.09]],
    )
  }

  #[test]
  fn matrix_matches_hand_computation() {
    let (returns, covariance) = two_asset();
    let qubo = QuboFormulation::new(returns, covariance, 1, 0.5, None).unwrap();

    // Default penalty: max(10, 2 * 0.2 * 2) = 10.
    assert!((qubo.penalty() - 10.0).abs() < 1e-12);

    let q = qubo.matrix();
    assert!((q[[0, 0]] - (0.02 - 0.05 - 10.0)).abs() < 1e-12);
    assert!((q[[1, 1]] - (0.045 - 0.1 - 10.0)).abs() < 1e-12);
    assert!((q[[0, 1]] - 2.0 * (0.005 + 10.0)).abs() < 1e-12);
    assert_eq!(q[[1, 0]], 0.0);
  }

  #[test]
  fn validation_names_the_offending_parameter() {
    let (returns, covariance) = two_asset();

    let err = QuboFormulation::new(returns.clone(), covariance.clone(), 1, 1.5, None)
      .unwrap_err()
      .to_string();
    assert!(err.contains("lambda_param"));

    let err = QuboFormulation::new(returns.clone(), covariance.clone(), 3, 0.5, None)
      .unwrap_err()
      .to_string();
    assert!(err.contains("k must be in [1, 2]"));

    let err = QuboFormulation::new(returns.clone(), Array2::zeros((2, 3)), 1, 0.5, None)
      .unwrap_err()
      .to_string();
    assert!(err.contains("square"));

    let err = QuboFormulation::new(returns.clone(), Array2::zeros((3, 3)), 1, 0.5, None)
      .unwrap_err()
      .to_string();
    assert!(err.contains("match covariance dimension"));

    let err = QuboFormulation::new(array![0.1, f64::NAN], covariance, 1, 0.5, None)
      .unwrap_err()
      .to_string();
    assert!(err.contains("returns must be finite"));
  }

  #[test]
  fn penalty_grows_quadratically_with_cardinality_deviation() {
    let returns = array![0.1, 0.12, 0.08, 0.11, 0.09, 0.1];
    let covariance = Array2::from_diag(&array![0.04, 0.05, 0.03, 0.06, 0.02, 0.04]);
    let qubo = QuboFormulation::new(returns, covariance, 2, 0.5, None).unwrap();
    let p = qubo.penalty();

    let candidates = [
      (vec![1, 1, 0, 0, 0, 0], 0.0),
      (vec![1, 1, 1, 0, 0, 0], 1.0),
      (vec![1, 1, 1, 1, 0, 0], 4.0),
      (vec![1, 1, 1, 1, 1, 0], 9.0),
    ];
    let mut last = -1.0;
    for (x, violation) in &candidates {
      let parts = qubo.components(x);
      assert!((parts.cardinality_violation - violation).abs() < 1e-12);
      assert!((parts.penalty_term - p * violation).abs() < 1e-9);
      assert!(parts.penalty_term > last);
      last = parts.penalty_term;
    }
  }

  #[test]
  fn evaluate_agrees_with_components_up_to_penalty_constants() {
    let returns = array![0.1, 0.2, 0.15];
    let covariance = array![
      [0.04, 0.01, 0.0],
      [0.01, 0.09, 0.02],
      [0.0, 0.02, 0.06]
    ];
    let qubo = QuboFormulation::new(returns, covariance, 2, 0.3, None).unwrap();
    let k = qubo.k() as f64;
    let shift = qubo.penalty() * k * k;

    for x in [[1, 1, 0], [1, 0, 1], [1, 1, 1], [0, 0, 0], [1, 0, 0]] {
      let parts = qubo.components(&x);
      assert!((qubo.evaluate(&x) - (parts.total - shift)).abs() < 1e-9);
    }
  }

  #[test]
  fn symmetric_matrix_preserves_the_quadratic_form() {
    let returns = array![0.1, 0.2, 0.15];
    let covariance = array![
      [0.04, 0.01, 0.0],
      [0.01, 0.09, 0.02],
      [0.0, 0.02, 0.06]
    ];
    let qubo = QuboFormulation::new(returns, covariance, 2, 0.5, None).unwrap();
    let sym = qubo.symmetric_matrix();

    for x in [[1u8, 1, 0], [1, 0, 1], [1, 1, 1], [0, 1, 0]] {
      let mut form = 0.0;
      for i in 0..3 {
        for j in 0..3 {
          form += sym[[i, j]] * x[i] as f64 * x[j] as f64;
        }
      }
      assert!((form - qubo.evaluate(&x)).abs() < 1e-9);
    }
  }

  #[test]
  fn sector_cap_adds_block_penalty_terms() {
    let returns = array![0.1, 0.2, 0.15];
    let covariance = Array2::from_diag(&array![0.04, 0.09, 0.06]);
    let plain = QuboFormulation::new(returns.clone(), covariance.clone(), 2, 0.5, None).unwrap();
    let capped = QuboFormulation::new(returns, covariance, 2, 0.5, None)
      .unwrap()
      .with_sector_cap(SectorGroups::from_labels(&["tech", "tech", "energy"]), 1)
      .unwrap();

    let half = plain.penalty() / 2.0;
    let q0 = plain.matrix();
    let q1 = capped.matrix();

    // The oversubscribed "tech" block {0, 1} picks up the secondary penalty.
    assert!((q1[[0, 0]] - (q0[[0, 0]] - half)).abs() < 1e-12);
    assert!((q1[[1, 1]] - (q0[[1, 1]] - half)).abs() < 1e-12);
    assert!((q1[[0, 1]] - (q0[[0, 1]] + 2.0 * half)).abs() < 1e-12);
    // "energy" has a single member and stays untouched.
    assert!((q1[[2, 2]] - q0[[2, 2]]).abs() < 1e-12);
    assert!((q1[[0, 2]] - q0[[0, 2]]).abs() < 1e-12);
  }

  #[test]
  fn sector_cap_penalizes_concentrated_feasible_subsets() {
    // Both "tech" names dominate on raw return, so the uncapped optimum
    // concentrates; the cap must make the diversified pair strictly cheaper.
    let returns = array![0.30, 0.28, 0.05, 0.04];
    let covariance = Array2::from_diag(&array![0.04, 0.04, 0.03, 0.03]);
    let groups = SectorGroups::from_labels(&["tech", "tech", "util", "util"]);

    let plain =
      QuboFormulation::new(returns.clone(), covariance.clone(), 2, 0.5, None).unwrap();
    assert!(plain.evaluate(&[1, 1, 0, 0]) < plain.evaluate(&[1, 0, 1, 0]));

    let capped = QuboFormulation::new(returns, covariance, 2, 0.5, None)
      .unwrap()
      .with_sector_cap(groups, 1)
      .unwrap();
    assert!(capped.evaluate(&[1, 0, 1, 0]) < capped.evaluate(&[1, 1, 0, 0]));
  }

  #[test]
  fn sector_groups_build_in_asset_order() {
    let groups = SectorGroups::from_labels(&["b", "a", "b", "a"]);
    let collected: Vec<(&str, Vec<usize>)> = groups
      .iter()
      .map(|(label, members)| (label, members.to_vec()))
      .collect();
    assert_eq!(collected, vec![("a", vec![1, 3]), ("b", vec![0, 2])]);
  }

  #[test]
  fn sector_cap_rejects_out_of_range_members() {
    let (returns, covariance) = two_asset();
    let err = QuboFormulation::new(returns, covariance, 1, 0.5, None)
      .unwrap()
      .with_sector_cap(SectorGroups::from_labels(&["a", "a", "a"]), 1)
      .unwrap_err()
      .to_string();
    assert!(err.contains("out of range"));
  }
}
