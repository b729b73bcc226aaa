//! # Input Preparation
//!
//! $$
//! r_t = \ln\frac{p_t}{p_{t-1}},\qquad
//! \mu = \bar{r}\cdot A,\qquad \Sigma = \operatorname{cov}(r)\cdot A
//! $$
//!
//! Helpers that turn close-price series into the annualized return vector
//! and covariance matrix consumed by the optimization engine.

use anyhow::Result;
use anyhow::ensure;
use ndarray::Array1;
use ndarray::Array2;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;

/// Trading periods per year for daily close series.
pub const TRADING_DAYS: f64 = 252.0;

/// Convert close prices to log-return series, skipping non-positive prices.
pub fn log_returns_series(closes: &[f64]) -> Vec<f64> {
  let mut out = Vec::with_capacity(closes.len().saturating_sub(1));
  for i in 1..closes.len() {
    if closes[i - 1] > 0.0 && closes[i] > 0.0 {
      out.push((closes[i] / closes[i - 1]).ln());
    }
  }
  out
}

/// Align multiple return series to their common tail length.
pub fn align_return_series(all_returns: &[Vec<f64>]) -> Vec<Vec<f64>> {
  let min_len = all_returns.iter().map(|r| r.len()).min().unwrap_or(0);
  all_returns
    .iter()
    .map(|r| r[r.len().saturating_sub(min_len)..].to_vec())
    .collect()
}

/// Annualized mean returns and sample covariance from aligned return series.
///
/// One row per asset; every row must share the same length. The covariance
/// uses the unbiased `T - 1` denominator before annualization.
pub fn annualized_inputs(
  aligned: &[Vec<f64>],
  periods_per_year: f64,
) -> Result<(Array1<f64>, Array2<f64>)> {
  let n = aligned.len();
  ensure!(n > 0, "aligned return series must not be empty");
  ensure!(
    periods_per_year > 0.0 && periods_per_year.is_finite(),
    "periods_per_year must be finite and positive, got {}",
    periods_per_year
  );

  let t = aligned[0].len();
  ensure!(
    t >= 2,
    "each return series needs at least 2 observations, got {}",
    t
  );
  for (i, series) in aligned.iter().enumerate() {
    ensure!(
      series.len() == t,
      "return series {} has length {}, expected {}",
      i,
      series.len(),
      t
    );
    ensure!(
      series.iter().all(|r| r.is_finite()),
      "return series {} contains NaN or infinity",
      i
    );
  }

  let means: Vec<f64> = aligned
    .iter()
    .map(|series| series.iter().sum::<f64>() / t as f64)
    .collect();

  let mut covariance = Array2::zeros((n, n));
  for i in 0..n {
    for j in i..n {
      let mut acc = 0.0;
      for obs in 0..t {
        acc += (aligned[i][obs] - means[i]) * (aligned[j][obs] - means[j]);
      }
      let cov = acc / (t - 1) as f64 * periods_per_year;
      covariance[[i, j]] = cov;
      covariance[[j, i]] = cov;
    }
  }

  let returns = Array1::from_vec(means.iter().map(|m| m * periods_per_year).collect());
  Ok((returns, covariance))
}

/// Seeded synthetic returns and a positive-semidefinite covariance matrix.
///
/// Test and bench fixture only; volatilities land in [0.1, 0.4] and returns
/// in [0.05, 0.25], roughly matching annualized equity magnitudes.
pub fn sample_problem(n: usize, seed: u64) -> (Array1<f64>, Array2<f64>) {
  let mut rng = StdRng::seed_from_u64(seed);

  let returns: Vec<f64> = (0..n).map(|_| rng.gen_range(0.05..0.25)).collect();
  let vols: Vec<f64> = (0..n).map(|_| rng.gen_range(0.1..0.4)).collect();

  // Gram-matrix construction keeps the correlation factor PSD without an
  // eigenvalue cleanup pass.
  let factors: Vec<Vec<f64>> = (0..n)
    .map(|_| (0..n).map(|_| rng.gen_range(-1.0..1.0)).collect())
    .collect();

  let mut gram = Array2::zeros((n, n));
  for i in 0..n {
    for j in 0..n {
      gram[[i, j]] = (0..n).map(|f| factors[i][f] * factors[j][f]).sum::<f64>();
    }
  }

  let mut covariance = Array2::zeros((n, n));
  for i in 0..n {
    for j in 0..n {
      let denom = (gram[[i, i]] * gram[[j, j]]).sqrt();
      let corr = if denom > 1e-15 {
        (gram[[i, j]] / denom).clamp(-1.0, 1.0)
      } else if i == j {
        1.0
      } else {
        0.0
      };
      covariance[[i, j]] = vols[i] * vols[j] * corr;
    }
  }

  (Array1::from_vec(returns), covariance)
}
