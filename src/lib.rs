//! # qubo-portfolio-rs
//!
//! $$
//! \min_{\mathbf{x}\in\{0,1\}^n}\ \lambda\,\mathbf{x}^\top\Sigma\,\mathbf{x}
//! -(1-\lambda)\,\mu^\top\mathbf{x}
//! \quad\text{s.t.}\quad \sum_i x_i = k
//! $$
//!
//! Cardinality-constrained portfolio selection encoded as a penalty QUBO,
//! with an exact combinatorial solver, an exact Ising transform, and a
//! sampling-driven hybrid loop behind a pluggable oracle boundary.

pub mod data;
pub mod engine;
pub mod ising;
pub mod metrics;
pub mod qubo;
pub mod solver;

pub use engine::ExactReport;
pub use engine::HybridReport;
pub use engine::SelectionConfig;
pub use engine::SelectionEngine;
pub use engine::SolverComparison;
pub use ising::IsingModel;
pub use ising::RoundTripReport;
pub use metrics::asset_metrics;
pub use metrics::portfolio_metrics;
pub use metrics::AssetMetrics;
pub use metrics::PortfolioMetrics;
pub use qubo::ObjectiveBreakdown;
pub use qubo::QuboFormulation;
pub use qubo::SectorGroups;
pub use solver::solve_exact;
pub use solver::ExactSolution;
pub use solver::HybridConfig;
pub use solver::HybridSolution;
pub use solver::HybridSolver;
pub use solver::MetropolisSampler;
pub use solver::SamplingOracle;
