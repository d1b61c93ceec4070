//! # Regularized forest accessibility
//!
//! `RFA = (L + I)^-1` for the unnormalized Laplacian `L` of the similarity
//! graph. Entry `(i, j)` counts (normalised) spanning forests in which `i`
//! and `j` share a tree, a commute-time like similarity that stays finite on
//! any graph.
//!
//! `L + I` is symmetric positive definite whenever `L` is a proper Laplacian
//! (eigenvalues of `L` are ≥ 0), so the solver checks that before inverting:
//!
//! 1. every entry is finite;
//! 2. the Gershgorin bound `min_i (m_ii - Σ_{j≠i} |m_ij|)` is positive, which
//!    certifies invertibility without a factorization (always 1 for a proper
//!    Laplacian);
//! 3. otherwise a Cholesky factorization must succeed, after adding
//!    `ridge * I` once if the first attempt fails.
//!
//! The inverse itself comes from an LU decomposition and is checked for
//! non-finite values; nothing is masked after the fact.

use std::time::Instant;

use log::{debug, info, warn};
use smartcore::linalg::basic::arrays::{Array, Array2, MutArray};
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::linalg::traits::cholesky::CholeskyDecomposable;
use smartcore::linalg::traits::lu::LUDecomposable;

use crate::errors::{RfaError, Result};
use crate::graph::GraphLaplacian;

/// Default ridge added to the diagonal when `L + I` fails the definiteness check.
pub const DEFAULT_RIDGE: f64 = 1e-8;

const GERSHGORIN_TOLERANCE: f64 = 1e-12;
const PIVOT_TOLERANCE: f64 = 1e-12;

/// Dense N×N RFA similarity matrix.
#[derive(Debug, Clone)]
pub struct RfaMatrix {
    pub matrix: DenseMatrix<f64>,
    pub nnodes: usize,
    /// Ridge added to `L + I` before inversion, if the fallback was needed
    pub ridge: Option<f64>,
}

impl RfaMatrix {
    pub fn shape(&self) -> (usize, usize) {
        self.matrix.shape()
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        *self.matrix.get((i, j))
    }

    pub fn row(&self, i: usize) -> Vec<f64> {
        self.matrix.get_row(i).iterator(0).copied().collect()
    }

    /// Row-major copy, e.g. for handing to an embedding step.
    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        (0..self.nnodes).map(|i| self.row(i)).collect()
    }

    pub fn is_symmetric(&self, tolerance: f64) -> bool {
        for i in 0..self.nnodes {
            for j in (i + 1)..self.nnodes {
                if (self.get(i, j) - self.get(j, i)).abs() > tolerance {
                    return false;
                }
            }
        }
        true
    }
}

/// Lower bound on the smallest eigenvalue of a symmetric matrix.
pub fn gershgorin_lower_bound(m: &DenseMatrix<f64>) -> f64 {
    let (n, _) = m.shape();
    (0..n)
        .map(|i| {
            let off: f64 = (0..n).filter(|&j| j != i).map(|j| m.get((i, j)).abs()).sum();
            *m.get((i, i)) - off
        })
        .fold(f64::INFINITY, f64::min)
}

/// Cholesky factorization with every pivot strictly positive.
///
/// smartcore only rejects negative pivots; a zero pivot leaves non-finite
/// values in the factor instead.
fn check_positive_definite(m: &DenseMatrix<f64>) -> std::result::Result<(), String> {
    let chol = m.cholesky().map_err(|e| e.to_string())?;
    let l = chol.L();
    let (n, _) = m.shape();
    for j in 0..n {
        let d = *l.get((j, j));
        let pivot = d * d;
        if !(pivot.is_finite() && pivot > PIVOT_TOLERANCE) {
            return Err(format!("pivot {:e} in column {}", pivot, j));
        }
    }
    Ok(())
}

/// Invert `L + I`.
///
/// # Errors
///
/// `DisconnectedInput` for an empty Laplacian; `SingularMatrix` when `L + I`
/// holds non-finite values, is not positive definite even with `ridge`
/// added, or the inverse is not finite.
pub fn compute_rfa(laplacian: &GraphLaplacian, ridge: f64) -> Result<RfaMatrix> {
    let n = laplacian.nnodes;
    if n == 0 {
        return Err(RfaError::disconnected("Laplacian has no nodes"));
    }
    info!("Computing RFA...");
    let start = Instant::now();

    let mut m = laplacian.to_dense();
    for i in 0..n {
        let v = *m.get((i, i));
        m.set((i, i), v + 1.0);
    }

    for i in 0..n {
        for j in 0..n {
            let v = *m.get((i, j));
            if !v.is_finite() {
                return Err(RfaError::singular(
                    n,
                    format!("non-finite entry {} at ({}, {})", v, i, j),
                ));
            }
        }
    }

    let mut ridge_applied = None;
    let bound = gershgorin_lower_bound(&m);
    debug!("Gershgorin lower bound on eigenvalues of L + I: {:.6e}", bound);

    if bound <= GERSHGORIN_TOLERANCE {
        if let Err(reason) = check_positive_definite(&m) {
            if !(ridge.is_finite() && ridge > 0.0) {
                return Err(RfaError::singular(
                    n,
                    format!("L + I is not positive definite ({}), no ridge configured", reason),
                ));
            }
            warn!(
                "L + I is not positive definite ({}), retrying with ridge {:e}",
                reason, ridge
            );
            for i in 0..n {
                let v = *m.get((i, i));
                m.set((i, i), v + ridge);
            }
            check_positive_definite(&m).map_err(|reason| {
                RfaError::singular(
                    n,
                    format!("L + I + {:e} I is not positive definite: {}", ridge, reason),
                )
            })?;
            ridge_applied = Some(ridge);
        }
    }

    let lu = m
        .lu()
        .map_err(|e| RfaError::singular(n, format!("LU decomposition failed: {}", e)))?;
    // smartcore panics when asked to invert with a zero pivot
    let u = lu.U();
    if let Some(j) = (0..n).find(|&j| {
        let p = *u.get((j, j));
        p == 0.0 || !p.is_finite()
    }) {
        return Err(RfaError::singular(n, format!("zero LU pivot in column {}", j)));
    }
    let inverse = lu
        .inverse()
        .map_err(|e| RfaError::singular(n, format!("LU inversion failed: {}", e)))?;

    if let Some((i, j)) = (0..n)
        .flat_map(|i| (0..n).map(move |j| (i, j)))
        .find(|&(i, j)| !inverse.get((i, j)).is_finite())
    {
        return Err(RfaError::singular(
            n,
            format!("inverse has a non-finite entry at ({}, {})", i, j),
        ));
    }

    info!("RFA computed in {:.2} sec", start.elapsed().as_secs_f64());
    Ok(RfaMatrix {
        matrix: inverse,
        nnodes: n,
        ridge: ridge_applied,
    })
}
