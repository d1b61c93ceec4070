//! # k-nearest-neighbour distance graph
//!
//! Two construction modes:
//!
//! 1. **Feature mode**: each item keeps its `k` nearest *other* items under a
//!    [`LocalMetric`]. Edges are directed and weighted by distance.
//! 2. **Precomputed mode**: each row of a caller-supplied distance matrix
//!    keeps its `k + 1` smallest entries, since the row's own item is among
//!    the query results. The self entry is then dropped.
//!
//! Both are followed by symmetrization, entrywise max (`sym`) or min of the
//! graph and its transpose, with an absent edge reading as 0. A min rule keeps
//! only mutual neighbours.
//!
//! A stored value of zero is never an edge: zero-distance pairs are not
//! inserted.

use std::collections::BTreeMap;
use std::fmt;

use log::{debug, info, trace, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use smartcore::linalg::basic::arrays::{Array, Array2};
use smartcore::linalg::basic::matrix::DenseMatrix;
use sprs::{CsMat, TriMat};

use crate::errors::{RfaError, Result};
use crate::loader::DistanceMatrix;
use crate::metric::LocalMetric;

/// How `graph` and `graph^T` are combined.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum Symmetrization {
    /// Keep an edge if either endpoint selected the other.
    #[default]
    Max,
    /// Keep an edge only if both endpoints selected each other.
    Min,
}

impl Symmetrization {
    /// `distfn` values containing "sym" (any case) select `Max`, all others `Min`.
    pub fn from_distfn(distfn: &str) -> Self {
        if distfn.to_lowercase().contains("sym") {
            Symmetrization::Max
        } else {
            Symmetrization::Min
        }
    }

    fn combine(&self, a: f64, b: f64) -> f64 {
        match self {
            Symmetrization::Max => a.max(b),
            Symmetrization::Min => a.min(b),
        }
    }
}

/// Sparse N×N distance graph. An absent entry means "no edge".
#[derive(Debug, Clone)]
pub struct KnnGraph {
    pub matrix: CsMat<f64>,
    pub nnodes: usize,
}

impl KnnGraph {
    /// Build from directed `(i, j, distance)` edges. Self loops and
    /// non-positive distances are skipped.
    pub fn from_edges(nnodes: usize, edges: impl IntoIterator<Item = (usize, usize, f64)>) -> Self {
        let mut triplets = TriMat::new((nnodes, nnodes));
        for (i, j, d) in edges {
            if i != j && d > 0.0 {
                triplets.add_triplet(i, j, d);
            }
        }
        let matrix: CsMat<f64> = triplets.to_csr();
        Self { matrix, nnodes }
    }

    /// k-NN graph over feature rows, self excluded.
    pub fn from_features(rows: &[Vec<f64>], k: usize, metric: LocalMetric) -> Result<Self> {
        if metric == LocalMetric::Precomputed {
            return Err(RfaError::invalid_metric(metric.name(), "features"));
        }
        let n = rows.len();
        if n == 0 {
            return Err(RfaError::disconnected("cannot build a k-NN graph over zero items"));
        }
        let k = clamp_k(k, n - 1)?;
        info!("Computing k-NN graph: {} items, k={}, metric={}", n, k, metric);

        let adj_rows: Vec<Vec<(usize, f64)>> = (0..n)
            .into_par_iter()
            .map(|i| {
                let candidates = (0..n)
                    .filter(|&j| j != i)
                    .map(|j| Ok((j, metric.distance(&rows[i], &rows[j])?)))
                    .collect::<Result<Vec<(usize, f64)>>>()?;
                Ok(nearest(candidates, k))
            })
            .collect::<Result<Vec<_>>>()?;

        let graph = Self::from_edges(
            n,
            adj_rows
                .into_iter()
                .enumerate()
                .flat_map(|(i, row)| row.into_iter().map(move |(j, d)| (i, j, d))),
        );
        debug!("Directed k-NN graph has {} stored edges", graph.nnz());
        Ok(graph)
    }

    /// k-NN graph from a precomputed distance matrix, queried against itself
    /// with `k + 1` neighbours.
    pub fn from_precomputed(distances: &DistanceMatrix, k: usize) -> Result<Self> {
        let n = distances.n();
        if n == 0 {
            return Err(RfaError::disconnected("cannot build a k-NN graph over zero items"));
        }
        let k = clamp_k(k, n - 1)?;
        info!("Computing k-NN graph from precomputed distances: {} items, k={}", n, k);

        let adj_rows: Vec<Vec<(usize, f64)>> = (0..n)
            .into_par_iter()
            .map(|i| {
                let candidates: Vec<(usize, f64)> =
                    (0..n).map(|j| (j, *distances.matrix.get((i, j)))).collect();
                nearest(candidates, k + 1)
                    .into_iter()
                    .filter(|&(j, _)| j != i)
                    .collect()
            })
            .collect();

        let graph = Self::from_edges(
            n,
            adj_rows
                .into_iter()
                .enumerate()
                .flat_map(|(i, row)| row.into_iter().map(move |(j, d)| (i, j, d))),
        );
        debug!("Directed k-NN graph has {} stored edges", graph.nnz());
        Ok(graph)
    }

    /// Combine the graph with its transpose.
    pub fn symmetrize(self, rule: Symmetrization) -> Self {
        trace!("Symmetrizing k-NN graph with {:?}", rule);
        let directed: BTreeMap<(usize, usize), f64> = self.edges().into_iter().map(|(i, j, d)| ((i, j), d)).collect();

        let mut sym: BTreeMap<(usize, usize), f64> = BTreeMap::new();
        for &(i, j) in directed.keys() {
            let a = directed.get(&(i, j)).copied().unwrap_or(0.0);
            let b = directed.get(&(j, i)).copied().unwrap_or(0.0);
            let w = rule.combine(a, b);
            if w > 0.0 {
                sym.insert((i, j), w);
                sym.insert((j, i), w);
            }
        }

        let graph = Self::from_edges(self.nnodes, sym.into_iter().map(|((i, j), w)| (i, j, w)));
        debug!(
            "Symmetrized graph: {} undirected edges",
            graph.nnz() / 2
        );
        graph
    }

    /// Edge weight, 0 when absent.
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.matrix.get(i, j).copied().unwrap_or(0.0)
    }

    pub fn has_edge(&self, i: usize, j: usize) -> bool {
        self.get(i, j) > 0.0
    }

    /// Stored directed edges in row-major order.
    pub fn edges(&self) -> Vec<(usize, usize, f64)> {
        self.matrix
            .outer_iterator()
            .enumerate()
            .flat_map(|(i, row)| {
                row.iter()
                    .map(move |(j, &d)| (i, j, d))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    pub fn nnz(&self) -> usize {
        self.matrix.nnz()
    }

    pub fn is_symmetric(&self, tolerance: f64) -> bool {
        self.edges()
            .iter()
            .all(|&(i, j, d)| (d - self.get(j, i)).abs() <= tolerance)
    }

    /// Return a new graph with the given undirected edges added.
    /// Existing entries are left untouched.
    pub fn with_added_edges(self, added: &[(usize, usize, f64)]) -> Self {
        let mut edges = self.edges();
        for &(i, j, d) in added {
            if !self.has_edge(i, j) {
                edges.push((i, j, d));
            }
            if !self.has_edge(j, i) {
                edges.push((j, i, d));
            }
        }
        Self::from_edges(self.nnodes, edges)
    }

    /// Dense N×N view, zero where no edge exists.
    pub fn to_dense(&self) -> DenseMatrix<f64> {
        let n = self.nnodes;
        let mut data = vec![0.0; n * n];
        for (i, j, d) in self.edges() {
            data[i * n + j] = d;
        }
        DenseMatrix::from_iterator(data.into_iter(), n, n, 0)
    }
}

impl fmt::Display for KnnGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "KnnGraph ({}×{}), {} stored edges", self.nnodes, self.nnodes, self.nnz())?;
        if self.nnodes <= 10 {
            for i in 0..self.nnodes {
                write!(f, "Row {}: [", i)?;
                for j in 0..self.nnodes {
                    write!(f, "{:8.4} ", self.get(i, j))?;
                }
                writeln!(f, "]")?;
            }
        }
        Ok(())
    }
}

fn clamp_k(k: usize, available: usize) -> Result<usize> {
    if k == 0 {
        return Err(RfaError::invalid_parameter("k_neighbours must be at least 1"));
    }
    if k > available {
        warn!("k={} exceeds the {} available neighbours, clamping", k, available);
        return Ok(available);
    }
    Ok(k)
}

/// Keep the `k` smallest distances; ties go to the lower index.
fn nearest(mut candidates: Vec<(usize, f64)>, k: usize) -> Vec<(usize, f64)> {
    candidates.sort_unstable_by(|a, b| {
        a.1.partial_cmp(&b.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    candidates.truncate(k);
    candidates
}

/// Make sure the dense matrix has a shape compatible with `n` nodes.
pub(crate) fn check_square(m: &DenseMatrix<f64>, n: usize) -> Result<()> {
    let shape = m.shape();
    if shape != (n, n) {
        return Err(RfaError::data_format(
            "<memory>",
            format!(
                "distance matrix is {}x{}, graph has {} nodes",
                shape.0, shape.1, n
            ),
        ));
    }
    Ok(())
}
