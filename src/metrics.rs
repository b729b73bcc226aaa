//! # Portfolio Metrics
//!
//! $$
//! \mu_p = \frac{1}{|S|}\sum_{i\in S}\mu_i,\qquad
//! \sigma_p = \sqrt{\mathbf{w}^\top\Sigma\,\mathbf{w}}
//! $$
//!
//! Equal-weight return, risk and Sharpe ratio for a selected index set.

use anyhow::Result;
use anyhow::ensure;
use ndarray::Array1;
use ndarray::Array2;

/// Equal-weight metrics for one selected index set.
#[derive(Clone, Debug)]
pub struct PortfolioMetrics {
  /// Mean annualized return over the selected assets.
  pub expected_return: f64,
  /// Portfolio standard deviation under equal weights.
  pub risk: f64,
  /// `expected_return / risk`, zero exactly when `risk` is zero.
  pub sharpe: f64,
  /// Full-length weight vector, `1/|S|` on selected indices, zero elsewhere.
  pub weights: Vec<f64>,
}

/// Per-asset diagnostics reported alongside a selection.
#[derive(Clone, Debug)]
pub struct AssetMetrics {
  /// Asset position in the universe.
  pub index: usize,
  /// Annualized expected return.
  pub expected_return: f64,
  /// Annualized volatility `sqrt(Sigma_ii)`.
  pub volatility: f64,
  /// Whether the asset is part of the selection.
  pub selected: bool,
}

/// Compute equal-weight metrics for `selected` under the supplied inputs.
///
/// Both solvers' outputs are scored through this one function so their
/// comparison is well-defined.
pub fn portfolio_metrics(
  selected: &[usize],
  returns: &Array1<f64>,
  covariance: &Array2<f64>,
) -> Result<PortfolioMetrics> {
  let n = returns.len();
  validate_inputs(n, covariance)?;
  ensure!(
    !selected.is_empty(),
    "selected_indices must not be empty"
  );
  for &idx in selected {
    ensure!(
      idx < n,
      "selected index {} out of range for {} assets",
      idx,
      n
    );
  }

  let count = selected.len() as f64;
  let mut weights = vec![0.0; n];
  for &idx in selected {
    weights[idx] = 1.0 / count;
  }

  let expected_return = selected.iter().map(|&idx| returns[idx]).sum::<f64>() / count;

  let w = Array1::from_vec(weights.clone());
  let variance = w.dot(&covariance.dot(&w));
  let risk = variance.max(0.0).sqrt();
  let sharpe = if risk > 0.0 {
    expected_return / risk
  } else {
    0.0
  };

  Ok(PortfolioMetrics {
    expected_return,
    risk,
    sharpe,
    weights,
  })
}

/// Per-asset return/volatility table with selection flags.
pub fn asset_metrics(
  returns: &Array1<f64>,
  covariance: &Array2<f64>,
  selected: &[usize],
) -> Result<Vec<AssetMetrics>> {
  let n = returns.len();
  validate_inputs(n, covariance)?;

  Ok(
    (0..n)
      .map(|i| AssetMetrics {
        index: i,
        expected_return: returns[i],
        volatility: covariance[[i, i]].max(0.0).sqrt(),
        selected: selected.contains(&i),
      })
      .collect(),
  )
}

fn validate_inputs(n: usize, covariance: &Array2<f64>) -> Result<()> {
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
  Ok(())
}
