//! Local distance metrics used to build the k-NN graph and to measure
//! bridging distances during connectivity repair.
//!
//! Names follow the usual nearest-neighbour vocabulary so a configuration
//! written as `distlocal = "cityblock"` or `"minkowski:3"` parses directly.

use std::fmt;
use std::str::FromStr;

use log::{debug, trace};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use smartcore::linalg::basic::arrays::Array2;
use smartcore::linalg::basic::matrix::DenseMatrix;

use crate::errors::{RfaError, Result};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub enum LocalMetric {
    /// L_p distance. The kernel bandwidth is multiplied by the feature
    /// dimensionality for this metric only.
    Minkowski { p: f64 },
    Euclidean,
    Manhattan,
    Chebyshev,
    /// `1 - cos(x, y)`; a zero vector sits at distance 1 from everything.
    Cosine,
    /// Distances are supplied by the caller as a matrix.
    Precomputed,
}

impl Default for LocalMetric {
    fn default() -> Self {
        LocalMetric::Minkowski { p: 2.0 }
    }
}

impl LocalMetric {
    pub fn name(&self) -> String {
        match self {
            LocalMetric::Minkowski { p } if *p == 2.0 => "minkowski".to_string(),
            LocalMetric::Minkowski { p } => format!("minkowski:{}", p),
            LocalMetric::Euclidean => "euclidean".to_string(),
            LocalMetric::Manhattan => "manhattan".to_string(),
            LocalMetric::Chebyshev => "chebyshev".to_string(),
            LocalMetric::Cosine => "cosine".to_string(),
            LocalMetric::Precomputed => "precomputed".to_string(),
        }
    }

    pub fn is_minkowski(&self) -> bool {
        matches!(self, LocalMetric::Minkowski { .. })
    }

    /// Distance between two feature vectors of equal length.
    ///
    /// `Precomputed` has no feature-space form and returns `InvalidMetric`.
    pub fn distance(&self, a: &[f64], b: &[f64]) -> Result<f64> {
        debug_assert_eq!(a.len(), b.len());
        let d = match self {
            LocalMetric::Minkowski { p } => {
                if *p == 2.0 {
                    squared_l2(a, b).sqrt()
                } else if *p == 1.0 {
                    l1(a, b)
                } else {
                    a.iter()
                        .zip(b)
                        .map(|(x, y)| (x - y).abs().powf(*p))
                        .sum::<f64>()
                        .powf(1.0 / p)
                }
            }
            LocalMetric::Euclidean => squared_l2(a, b).sqrt(),
            LocalMetric::Manhattan => l1(a, b),
            LocalMetric::Chebyshev => a
                .iter()
                .zip(b)
                .map(|(x, y)| (x - y).abs())
                .fold(0.0, f64::max),
            LocalMetric::Cosine => {
                let na = a.iter().map(|x| x * x).sum::<f64>().sqrt();
                let nb = b.iter().map(|x| x * x).sum::<f64>().sqrt();
                if na < 1e-15 || nb < 1e-15 {
                    1.0
                } else {
                    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
                    // rounding can push 1 - cos slightly below zero
                    (1.0 - (dot / (na * nb)).clamp(-1.0, 1.0)).max(0.0)
                }
            }
            LocalMetric::Precomputed => {
                return Err(RfaError::invalid_metric(self.name(), "features"));
            }
        };
        Ok(d)
    }
}

fn squared_l2(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn l1(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum()
}

impl fmt::Display for LocalMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for LocalMetric {
    type Err = RfaError;

    fn from_str(s: &str) -> Result<Self> {
        let lowered = s.trim().to_lowercase();
        let metric = match lowered.as_str() {
            "minkowski" => LocalMetric::Minkowski { p: 2.0 },
            "euclidean" | "l2" => LocalMetric::Euclidean,
            "manhattan" | "cityblock" | "l1" => LocalMetric::Manhattan,
            "chebyshev" => LocalMetric::Chebyshev,
            "cosine" => LocalMetric::Cosine,
            "precomputed" => LocalMetric::Precomputed,
            other => match other.strip_prefix("minkowski:") {
                Some(p) => {
                    let p: f64 = p
                        .parse()
                        .map_err(|_| RfaError::invalid_metric(s, "any"))?;
                    if !(p.is_finite() && p >= 1.0) {
                        return Err(RfaError::invalid_metric(s, "any"));
                    }
                    LocalMetric::Minkowski { p }
                }
                None => return Err(RfaError::invalid_metric(s, "any")),
            },
        };
        Ok(metric)
    }
}

/// Full N×N pairwise distance matrix over feature rows.
///
/// Rows are computed in parallel; each entry is independent so the result
/// does not depend on scheduling.
pub fn pairwise_distances(rows: &[Vec<f64>], metric: LocalMetric) -> Result<DenseMatrix<f64>> {
    if metric == LocalMetric::Precomputed {
        return Err(RfaError::invalid_metric(metric.name(), "features"));
    }
    let n = rows.len();
    debug!("Computing {}x{} pairwise {} distances", n, n, metric);

    let dist_rows: Vec<Vec<f64>> = (0..n)
        .into_par_iter()
        .map(|i| {
            (0..n)
                .map(|j| {
                    if i == j {
                        Ok(0.0)
                    } else {
                        metric.distance(&rows[i], &rows[j])
                    }
                })
                .collect::<Result<Vec<f64>>>()
        })
        .collect::<Result<Vec<_>>>()?;

    trace!("Pairwise distances computed");
    Ok(DenseMatrix::from_iterator(
        dist_rows.into_iter().flatten(),
        n,
        n,
        0,
    ))
}
