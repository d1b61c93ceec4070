//! # Connectivity repair
//!
//! The Laplacian of a disconnected graph is block diagonal, so accessibility
//! between items of different blocks carries no information. This module
//! bridges components until a single one remains.
//!
//! ## Algorithm
//!
//! The component holding node 0 is grown one component at a time:
//!
//! 1. Over every pair `(i, j)` with `i` inside the grown component and `j`
//!    outside, pick the pair with the smallest entry in the *full* pairwise
//!    distance matrix (not the sparse k-NN graph).
//! 2. Insert `(i, j)` and `(j, i)` with that distance as weight.
//! 3. Absorb every node of `j`'s component.
//!
//! Ties on distance are resolved by the lowest `(i, j)` in lexicographic
//! order, so repeated runs add the same bridges.
//!
//! ## Complexity
//!
//! For every outside node the closest inside node is kept up to date as
//! components are absorbed (a Prim-style frontier), so each node is scanned
//! against the others once: `O(n²)` total, plus `O(n)` per bridge to pick the
//! best frontier entry.

use log::{debug, info, trace};
use smartcore::linalg::basic::arrays::Array;
use smartcore::linalg::basic::matrix::DenseMatrix;

use crate::components::union_find_of;
use crate::errors::{RfaError, Result};
use crate::knn::{check_square, KnnGraph};

/// An edge inserted by the repair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bridge {
    /// Node inside the grown component
    pub from: usize,
    /// Node of the absorbed component
    pub to: usize,
    /// Weight stored in the graph
    pub distance: f64,
}

#[derive(Debug, Clone, Default)]
pub struct RepairReport {
    pub components_before: usize,
    pub bridges: Vec<Bridge>,
}

impl RepairReport {
    pub fn is_noop(&self) -> bool {
        self.bridges.is_empty()
    }
}

/// Connect `graph` into a single component using `distances` (N×N).
///
/// The graph is consumed and a new one is returned; existing edges keep their
/// weight and edges are only added between previously unlinked nodes.
/// A connected graph comes back unchanged with an empty report.
///
/// A bridge between two identical items (distance 0) is stored with the
/// smallest positive weight, since a zero entry is not an edge.
///
/// # Errors
///
/// `DisconnectedInput` for a graph without nodes; `DataFormat` if
/// `distances` is not N×N.
pub fn connect_components(
    graph: KnnGraph,
    distances: &DenseMatrix<f64>,
) -> Result<(KnnGraph, RepairReport)> {
    let n = graph.nnodes;
    if n == 0 {
        return Err(RfaError::disconnected("graph has no nodes to connect"));
    }
    check_square(distances, n)?;

    let mut uf = union_find_of(&graph);
    let components_before = uf.n_sets();
    if components_before <= 1 {
        debug!("Graph already connected, nothing to repair");
        return Ok((
            graph,
            RepairReport {
                components_before,
                bridges: Vec::new(),
            },
        ));
    }
    info!("Connecting {} components", components_before);

    let labels = uf.labels();
    let members = labels.members();

    let mut inside = vec![false; n];
    // closest inside node for each outside node: (distance, inside index)
    let mut frontier: Vec<(f64, usize)> = vec![(f64::INFINITY, usize::MAX); n];

    let absorb = |group: &[usize], inside: &mut [bool], frontier: &mut [(f64, usize)]| {
        for &u in group {
            inside[u] = true;
        }
        for &u in group {
            for j in 0..n {
                if inside[j] {
                    continue;
                }
                let d = *distances.get((u, j));
                let (best_d, best_i) = frontier[j];
                if d < best_d || (d == best_d && u < best_i) {
                    frontier[j] = (d, u);
                }
            }
        }
    };

    absorb(&members[labels.labels[0]], &mut inside, &mut frontier);

    let mut remaining = components_before;
    let mut bridges = Vec::with_capacity(components_before - 1);

    while remaining > 1 {
        let mut pick: Option<(f64, usize, usize)> = None;
        for j in 0..n {
            if inside[j] {
                continue;
            }
            let (d, i) = frontier[j];
            let better = match pick {
                None => true,
                Some((pd, pi, pj)) => d < pd || (d == pd && (i, j) < (pi, pj)),
            };
            if better {
                pick = Some((d, i, j));
            }
        }

        let (d, i, j) = pick.ok_or_else(|| {
            RfaError::disconnected(format!(
                "{} components left but no node outside the grown one",
                remaining
            ))
        })?;
        if i == usize::MAX || !d.is_finite() {
            return Err(RfaError::disconnected(format!(
                "no finite distance from the grown component to node {}",
                j
            )));
        }

        let weight = if d > 0.0 { d } else { f64::MIN_POSITIVE };
        trace!("Bridge {} -> {} at distance {:.6}", i, j, d);
        bridges.push(Bridge {
            from: i,
            to: j,
            distance: weight,
        });

        absorb(&members[labels.labels[j]], &mut inside, &mut frontier);
        uf.union(i, j);
        remaining -= 1;
    }

    debug_assert_eq!(uf.n_sets(), 1);
    info!("Added {} bridging edges", bridges.len());

    let added: Vec<(usize, usize, f64)> = bridges.iter().map(|b| (b.from, b.to, b.distance)).collect();
    let graph = graph.with_added_edges(&added);

    Ok((
        graph,
        RepairReport {
            components_before,
            bridges,
        },
    ))
}
