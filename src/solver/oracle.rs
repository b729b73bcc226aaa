//! # Sampling Oracle
//!
//! $$
//! \texttt{sample}(h, J, \gamma, \beta, \text{shots}) \to \{\,\text{bitstring} \mapsto \text{count}\,\}
//! $$
//!
//! Boundary trait for the hybrid loop's bitstring source, plus a classical
//! reference sampler so the loop runs end-to-end without external hardware.

use std::cell::RefCell;
use std::collections::BTreeMap;

use anyhow::Result;
use anyhow::ensure;
use ndarray::Array1;
use ndarray::Array2;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;

/// External capability that draws candidate bitstrings from a distribution
/// shaped by the spin coefficients and the `(gamma, beta)` parameters.
///
/// Contract: returned counts sum to `shots`; keys are length-`n` strings of
/// `0`/`1` with character `i` addressing variable `i`. Determinism across
/// calls is not guaranteed; more shots reduce estimator variance. The map is
/// ordered so downstream tie-breaking stays deterministic.
pub trait SamplingOracle {
  fn sample(
    &self,
    h: &Array1<f64>,
    j: &Array2<f64>,
    n: usize,
    gamma: &[f64],
    beta: &[f64],
    shots: u64,
  ) -> Result<BTreeMap<String, u64>>;
}

/// Seeded Metropolis walk on the Ising energy.
///
/// A classical stand-in for the sampling capability, not a simulation of
/// quantum dynamics: `|gamma|` sets the inverse temperature of the walk
/// (larger values concentrate mass on low-energy candidates) and `|beta|`
/// drives a post-walk mixing step that re-randomizes spins.
pub struct MetropolisSampler {
  sweeps: usize,
  rng: RefCell<StdRng>,
}

impl MetropolisSampler {
  pub fn new(seed: u64) -> Self {
    Self {
      sweeps: 24,
      rng: RefCell::new(StdRng::seed_from_u64(seed)),
    }
  }

  /// Override the sweep count per shot; at least one sweep is always run.
  pub fn with_sweeps(mut self, sweeps: usize) -> Self {
    self.sweeps = sweeps.max(1);
    self
  }
}

impl SamplingOracle for MetropolisSampler {
  fn sample(
    &self,
    h: &Array1<f64>,
    j: &Array2<f64>,
    n: usize,
    gamma: &[f64],
    beta: &[f64],
    shots: u64,
  ) -> Result<BTreeMap<String, u64>> {
    ensure!(n > 0, "variable count must be positive");
    ensure!(
      h.len() == n,
      "field length ({}) must match variable count ({})",
      h.len(),
      n
    );
    ensure!(
      j.nrows() == n && j.ncols() == n,
      "coupling matrix must be {}x{}, got {}x{}",
      n,
      n,
      j.nrows(),
      j.ncols()
    );
    ensure!(shots >= 1, "shots must be at least 1, got {}", shots);
    ensure!(
      !gamma.is_empty() && gamma.len() == beta.len(),
      "gamma and beta must be non-empty and of equal length, got {} and {}",
      gamma.len(),
      beta.len()
    );

    // Normalize the drive by the coefficient scale so the acceptance rule
    // stays meaningful across penalty magnitudes.
    let scale = h
      .iter()
      .chain(j.iter())
      .fold(0.0_f64, |acc, c| acc.max(c.abs()))
      .max(1.0);
    let drive = gamma.iter().map(|g| g.abs()).sum::<f64>() / gamma.len() as f64;
    let inv_temp = drive / scale;

    let mix = beta.iter().map(|b| b.abs()).sum::<f64>() / beta.len() as f64;
    let flip_prob = 0.5 * mix.sin().powi(2);

    let mut rng = self.rng.borrow_mut();
    let mut counts: BTreeMap<String, u64> = BTreeMap::new();

    for _ in 0..shots {
      let mut z: Vec<i8> = (0..n)
        .map(|_| if rng.gen_bool(0.5) { 1 } else { -1 })
        .collect();

      for _ in 0..self.sweeps {
        for i in 0..n {
          let mut local = h[i];
          for a in 0..i {
            local += j[[a, i]] * z[a] as f64;
          }
          for b in (i + 1)..n {
            local += j[[i, b]] * z[b] as f64;
          }

          let delta = -2.0 * z[i] as f64 * local;
          if delta <= 0.0 || rng.gen_bool((-delta * inv_temp).exp()) {
            z[i] = -z[i];
          }
        }
      }

      if flip_prob > 0.0 {
        for s in &mut z {
          if rng.gen_bool(flip_prob) {
            *s = -*s;
          }
        }
      }

      let bits: String = z.iter().map(|&s| if s == 1 { '0' } else { '1' }).collect();
      *counts.entry(bits).or_insert(0) += 1;
    }

    Ok(counts)
  }
}
