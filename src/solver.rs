//! # Solvers
//!
//! $$
//! \mathbf{x}^\* = \arg\min_{\mathbf{x}} \ \mathbf{x}^\top Q\,\mathbf{x}
//! $$
//!
//! Exact enumeration and the sampling-driven hybrid loop over one shared
//! bitstring convention: character `i` of a candidate addresses asset `i`.

use anyhow::Result;
use anyhow::ensure;

pub mod brute_force;
pub mod hybrid;
pub mod oracle;

pub use brute_force::solve_exact;
pub use brute_force::ExactSolution;
pub use hybrid::HybridConfig;
pub use hybrid::HybridSolution;
pub use hybrid::HybridSolver;
pub use oracle::MetropolisSampler;
pub use oracle::SamplingOracle;

pub(crate) fn decode_bitstring(bits: &str, n: usize) -> Result<Vec<u8>> {
  ensure!(
    bits.len() == n,
    "bitstring length ({}) must match variable count ({})",
    bits.len(),
    n
  );

  bits
    .chars()
    .map(|c| match c {
      '0' => Ok(0u8),
      '1' => Ok(1u8),
      other => anyhow::bail!("bitstring may only contain 0 and 1, found {:?}", other),
    })
    .collect()
}

pub(crate) fn encode_bitstring(x: &[u8]) -> String {
  x.iter().map(|&b| if b != 0 { '1' } else { '0' }).collect()
}

pub(crate) fn selected_from(x: &[u8]) -> Vec<usize> {
  x.iter()
    .enumerate()
    .filter(|(_, &b)| b != 0)
    .map(|(i, _)| i)
    .collect()
}
