//! # Ising Transform
//!
//! $$
//! \mathbf{x}^\top Q\,\mathbf{x} \;=\; \text{offset} + \mathbf{h}\cdot\mathbf{z}
//! + \sum_{i<j} J_{ij} z_i z_j,\qquad z_i = 1 - 2x_i
//! $$
//!
//! Exact closed-form conversion of a QUBO matrix to spin coefficients.

use anyhow::Result;
use anyhow::ensure;
use ndarray::Array1;
use ndarray::Array2;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;

/// Linear field, pairwise coupling and constant offset of a spin model.
#[derive(Clone, Debug)]
pub struct IsingModel {
  /// Linear spin field, length `n`.
  pub h: Array1<f64>,
  /// Pairwise coupling, upper-triangular `n x n`.
  pub j: Array2<f64>,
  /// Constant energy offset.
  pub offset: f64,
}

/// Outcome of the QUBO/Ising round-trip self-check.
#[derive(Clone, Copy, Debug)]
pub struct RoundTripReport {
  /// Largest absolute energy discrepancy over the sampled vectors.
  pub max_error: f64,
  /// Mean absolute energy discrepancy.
  pub mean_error: f64,
  /// Number of random binary vectors sampled.
  pub samples: usize,
  /// True when `max_error` is below the 1e-10 tolerance.
  pub verified: bool,
}

impl IsingModel {
  /// Derive spin coefficients from a QUBO matrix via `x_i = (1 - z_i) / 2`.
  ///
  /// Order-independent over the matrix entries, so it accepts both the
  /// upper-triangular and the symmetrized QUBO layout.
  pub fn from_qubo(q: &Array2<f64>) -> Result<Self> {
    ensure!(
      q.nrows() == q.ncols(),
      "QUBO matrix must be square, got {}x{}",
      q.nrows(),
      q.ncols()
    );

    let n = q.nrows();
    let mut h = Array1::zeros(n);
    let mut j = Array2::zeros((n, n));
    let mut offset = 0.0;

    for row in 0..n {
      for col in 0..n {
        if row == col {
          offset += q[[row, row]] / 2.0;
          h[row] -= q[[row, row]] / 2.0;
        } else {
          offset += q[[row, col]] / 4.0;
          h[row] -= q[[row, col]] / 4.0;
          h[col] -= q[[row, col]] / 4.0;
          let (lo, hi) = if row < col { (row, col) } else { (col, row) };
          j[[lo, hi]] += q[[row, col]] / 4.0;
        }
      }
    }

    Ok(Self { h, j, offset })
  }

  /// Number of spin variables.
  pub fn num_spins(&self) -> usize {
    self.h.len()
  }

  /// Spin-model energy `offset + h.z + sum J_ij z_i z_j`.
  ///
  /// # Panics
  /// Panics if `z.len()` differs from the number of spins.
  pub fn energy(&self, z: &[i8]) -> f64 {
    let n = self.num_spins();
    assert_eq!(z.len(), n, "spin vector length must equal the spin count");

    let mut energy = self.offset;
    for i in 0..n {
      energy += self.h[i] * z[i] as f64;
      for j in (i + 1)..n {
        energy += self.j[[i, j]] * z[i] as f64 * z[j] as f64;
      }
    }
    energy
  }

  /// Map binary variables to spins, `z = 1 - 2x`.
  pub fn binary_to_spin(x: &[u8]) -> Vec<i8> {
    x.iter().map(|&b| 1 - 2 * b as i8).collect()
  }

  /// Map spins back to binary variables, `x = (1 - z) / 2`.
  pub fn spin_to_binary(z: &[i8]) -> Vec<u8> {
    z.iter().map(|&s| ((1 - s) / 2) as u8).collect()
  }

  /// Check QUBO-vs-Ising energy equality on seeded random binary vectors.
  ///
  /// This is a correctness self-check for the transform, not a runtime
  /// dependency of any solver.
  pub fn verify_round_trip(&self, q: &Array2<f64>, samples: usize, seed: u64) -> RoundTripReport {
    let n = self.num_spins();
    let mut rng = StdRng::seed_from_u64(seed);
    let mut max_error = 0.0_f64;
    let mut error_sum = 0.0;

    for _ in 0..samples {
      let x: Vec<u8> = (0..n).map(|_| rng.gen_range(0..2u8)).collect();
      let z = Self::binary_to_spin(&x);

      let mut qubo_energy = 0.0;
      for i in 0..n {
        for jj in 0..n {
          qubo_energy += q[[i, jj]] * x[i] as f64 * x[jj] as f64;
        }
      }

      let error = (qubo_energy - self.energy(&z)).abs();
      max_error = max_error.max(error);
      error_sum += error;
    }

    let mean_error = if samples > 0 {
      error_sum / samples as f64
    } else {
      0.0
    };

    RoundTripReport {
      max_error,
      mean_error,
      samples,
      verified: max_error < 1e-10,
    }
  }
}
