//! Accelerator-backed dynamic-programming engine for exact (weighted)
//! #SAT model counting over a precomputed tree decomposition.
//!
//! [`driver::solve`] is the entry point a collaborator (CLI front-end,
//! test, embedding program) calls with a [`gpusat_types::SatFormula`], a
//! [`gpusat_types::TreeDecomposition`], and a [`gpusat_types::SolveConfig`].

pub mod bag;
pub mod device;
pub mod error;
pub mod exponent;
pub mod kernels;
pub mod table;

mod driver;

pub use driver::solve;
pub use error::Error;
