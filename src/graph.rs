use std::fmt;

use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};
use smartcore::linalg::basic::arrays::Array2;
use smartcore::linalg::basic::matrix::DenseMatrix;
use sprs::CsMat;

use crate::knn::Symmetrization;
use crate::metric::LocalMetric;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphParams {
    pub k: usize,
    pub symmetrization: Symmetrization,
    pub metric: LocalMetric,
    pub sigma: f64,
    pub connected: bool, // bridge components before the Laplacian
}

impl Default for GraphParams {
    fn default() -> Self {
        Self {
            k: 15,
            symmetrization: Symmetrization::Max,
            metric: LocalMetric::Minkowski { p: 2.0 },
            sigma: 1.0,
            connected: false,
        }
    }
}

// Custom PartialEq implementation using approximate equality for floats
impl PartialEq for GraphParams {
    fn eq(&self, other: &Self) -> bool {
        self.k == other.k
            && self.symmetrization == other.symmetrization
            && match (self.metric, other.metric) {
                (LocalMetric::Minkowski { p: a }, LocalMetric::Minkowski { p: b }) => {
                    approx::relative_eq!(a, b)
                }
                (a, b) => a == b,
            }
            && approx::relative_eq!(self.sigma, other.sigma)
            && self.connected == other.connected
    }
}

/// Unnormalized graph Laplacian `L = D - S` over the similarity graph.
#[derive(Debug, Clone)]
pub struct GraphLaplacian {
    // off-diagonals are -s_ij, diagonal is the row sum of s
    pub matrix: CsMat<f64>,
    pub nnodes: usize,
    pub graph_params: GraphParams,
}

impl GraphLaplacian {
    /// Get the matrix dimensions as (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        self.matrix.shape()
    }

    /// Entry `(i, j)`, zero where nothing is stored.
    ///
    /// # Panics
    ///
    /// If `i` or `j` is not below `nnodes`.
    pub fn get(&self, i: usize, j: usize) -> f64 {
        assert!(
            i < self.nnodes && j < self.nnodes,
            "Laplacian index ({}, {}) out of range for {} nodes",
            i,
            j,
            self.nnodes
        );
        self.matrix.get(i, j).copied().unwrap_or(0.0)
    }

    /// Diagonal of `L`: the similarity-weighted degree of each node.
    pub fn degrees(&self) -> Vec<f64> {
        (0..self.nnodes).map(|i| self.get(i, i)).collect()
    }

    /// Row sums; all ≈ 0 for a well-formed Laplacian.
    pub fn row_sums(&self) -> Vec<f64> {
        self.matrix
            .outer_iterator()
            .map(|row| row.iter().map(|(_, &v)| v).sum())
            .collect()
    }

    pub fn is_symmetric(&self, tolerance: f64) -> bool {
        let asym = self.max_asymmetry();
        trace!("Laplacian max asymmetry {:.2e} (tolerance {:.2e})", asym, tolerance);
        asym <= tolerance
    }

    fn max_asymmetry(&self) -> f64 {
        self.matrix
            .iter()
            .map(|(&v, (i, j))| (v - self.get(j, i)).abs())
            .fold(0.0, f64::max)
    }

    /// Check what `compute_rfa` relies on: zero row sums, a non-negative
    /// diagonal and symmetry.
    pub fn verify_properties(&self, tolerance: f64) -> LaplacianValidation {
        let row_sum_violations: Vec<(usize, f64)> = self
            .row_sums()
            .into_iter()
            .enumerate()
            .filter(|(_, s)| s.abs() > tolerance)
            .collect();
        let negative_degrees: Vec<usize> = self
            .degrees()
            .into_iter()
            .enumerate()
            .filter(|(_, d)| *d < 0.0)
            .map(|(i, _)| i)
            .collect();
        let max_asymmetry = self.max_asymmetry();

        let validation = LaplacianValidation {
            is_valid: row_sum_violations.is_empty()
                && negative_degrees.is_empty()
                && max_asymmetry <= tolerance,
            max_asymmetry,
            row_sum_violations,
            negative_degrees,
        };
        if validation.is_valid {
            debug!("Laplacian passes validation at tolerance {:.2e}", tolerance);
        } else {
            warn!(
                "Laplacian fails validation: {} row sum violation(s), {} negative degree(s), asymmetry {:.2e}",
                validation.row_sum_violations.len(),
                validation.negative_degrees.len(),
                validation.max_asymmetry
            );
        }
        validation
    }

    /// Stored entries, explicit zeros excluded.
    pub fn nnz(&self) -> usize {
        self.matrix.iter().filter(|(v, _)| **v != 0.0).count()
    }

    /// Dense copy, row-major
    pub fn to_dense(&self) -> DenseMatrix<f64> {
        let n = self.nnodes;
        let mut data = vec![0.0; n * n];
        for (&v, (i, j)) in self.matrix.iter() {
            data[i * n + j] = v;
        }
        DenseMatrix::from_iterator(data.into_iter(), n, n, 0)
    }

    /// Edge and degree summary of the similarity graph behind `L`.
    pub fn statistics(&self) -> LaplacianStats {
        let degrees = self.degrees();
        let n_edges = self
            .matrix
            .iter()
            .filter(|&(v, (i, j))| i < j && *v != 0.0)
            .count();
        let (min_degree, max_degree) = degrees
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &d| (lo.min(d), hi.max(d)));

        LaplacianStats {
            nnodes: self.nnodes,
            n_edges,
            nnz: self.nnz(),
            isolated: degrees.iter().filter(|&&d| d == 0.0).count(),
            min_degree,
            max_degree,
            mean_degree: degrees.iter().sum::<f64>() / self.nnodes.max(1) as f64,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LaplacianValidation {
    pub is_valid: bool,
    pub max_asymmetry: f64,
    /// (row, sum) for every row whose sum exceeds the tolerance
    pub row_sum_violations: Vec<(usize, f64)>,
    pub negative_degrees: Vec<usize>,
}

#[derive(Debug, Clone)]
pub struct LaplacianStats {
    pub nnodes: usize,
    /// Undirected edges with non-zero similarity
    pub n_edges: usize,
    pub nnz: usize,
    /// Nodes without any edge; their RFA row is the identity row
    pub isolated: usize,
    pub min_degree: f64,
    pub max_degree: f64,
    pub mean_degree: f64,
}

impl fmt::Display for GraphLaplacian {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let p = &self.graph_params;
        writeln!(f, "GraphLaplacian ({}×{}):", self.nnodes, self.nnodes)?;
        writeln!(
            f,
            "k={} {:?} metric={} sigma={} connected={}",
            p.k, p.symmetrization, p.metric, p.sigma, p.connected
        )?;
        if self.nnodes > 10 {
            return write!(f, "{}", self.statistics());
        }
        for i in 0..self.nnodes {
            let row: Vec<String> = (0..self.nnodes)
                .map(|j| format!("{:8.4}", self.get(i, j)))
                .collect();
            writeln!(f, "[{}]", row.join(" "))?;
        }
        Ok(())
    }
}

impl fmt::Display for LaplacianStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Nodes: {} ({} isolated), edges: {}, stored entries: {}",
            self.nnodes, self.isolated, self.n_edges, self.nnz
        )?;
        writeln!(
            f,
            "Degree min/mean/max: {:.4} / {:.4} / {:.4}",
            self.min_degree, self.mean_degree, self.max_degree
        )
    }
}
