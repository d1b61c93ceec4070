//! # rfaspace
//!
//! Regularized forest accessibility (RFA) similarity matrices for
//! hyperbolic-embedding pipelines.
//!
//! Pipeline: item files → feature matrix → symmetric k-NN distance graph →
//! (optional) connectivity repair → exponential-kernel similarity →
//! unnormalized Laplacian `L` → `RFA = (L + I)^-1`.
//!
//! ```no_run
//! use rfaspace::builder::RfaBuilder;
//! use rfaspace::metric::LocalMetric;
//!
//! let out = RfaBuilder::new()
//!     .with_k_neighbours(15)
//!     .with_metric(LocalMetric::Minkowski { p: 2.0 })
//!     .with_connected(true)
//!     .build_from_dir("data/pssm")
//!     .unwrap();
//! assert_eq!(out.rfa.shape(), (out.labels.len(), out.labels.len()));
//! ```
pub mod builder;
pub mod components;
pub mod errors;
pub mod graph;
pub mod knn;
pub mod laplacian;
pub mod loader;
pub mod metric;
pub mod repair;
pub mod rfa;

#[cfg(test)]
mod tests;
