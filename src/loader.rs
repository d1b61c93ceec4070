//! # Tensor loading
//!
//! Reads one flat numeric vector per item file into a dense N×D feature
//! matrix with parallel labels, and reads precomputed pairwise distance
//! matrices from CSV.
//!
//! Item files hold whitespace-delimited numbers over any number of lines
//! (a PSSM-style `.aamtx` matrix is flattened row after row). `#` starts a
//! comment. The label of an item is its file name up to the first `.`, so
//! `17.aamtx` becomes `17`.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, trace, warn};
use smartcore::api::{Transformer, UnsupervisedEstimator};
use smartcore::linalg::basic::arrays::{Array, Array2};
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::preprocessing::numerical::{StandardScaler, StandardScalerParameters};

use crate::errors::{RfaError, Result};

pub const DEFAULT_EXTENSION: &str = ".aamtx";

/// Dense feature matrix (rows = items) and the item labels, in row order.
#[derive(Debug, Clone)]
pub struct FeatureSet {
    pub features: DenseMatrix<f64>,
    pub labels: Vec<String>,
}

impl FeatureSet {
    /// Build from row vectors. All rows must share the first row's length.
    pub fn from_rows(rows: Vec<Vec<f64>>, labels: Vec<String>) -> Result<Self> {
        if rows.is_empty() {
            return Err(RfaError::data_format("<memory>", "no items"));
        }
        if rows.len() != labels.len() {
            return Err(RfaError::data_format(
                "<memory>",
                format!("{} rows but {} labels", rows.len(), labels.len()),
            ));
        }
        let d = rows[0].len();
        if d == 0 {
            return Err(RfaError::data_format("<memory>", "items have no features"));
        }
        if let Some((i, r)) = rows.iter().enumerate().find(|(_, r)| r.len() != d) {
            return Err(RfaError::data_format(
                "<memory>",
                format!("row {} has {} values, expected {}", i, r.len(), d),
            ));
        }
        if let Some(i) = rows.iter().position(|r| r.iter().any(|v| !v.is_finite())) {
            return Err(RfaError::data_format(
                "<memory>",
                format!("row {} ({}) holds a non-finite value", i, labels[i]),
            ));
        }
        let features = DenseMatrix::from_2d_vec(&rows)
            .map_err(|e| RfaError::data_format("<memory>", e.to_string()))?;
        Ok(Self { features, labels })
    }

    pub fn nitems(&self) -> usize {
        self.features.shape().0
    }

    pub fn nfeatures(&self) -> usize {
        self.features.shape().1
    }

    /// Owned copy of the rows, the layout the distance code works on.
    pub fn rows(&self) -> Vec<Vec<f64>> {
        (0..self.nitems())
            .map(|i| self.features.get_row(i).iterator(0).copied().collect())
            .collect()
    }

    /// Drop constant columns, then z-score the rest.
    pub fn standardise(self) -> Result<Self> {
        let rows = self.rows();
        let n = rows.len() as f64;
        let d = self.nfeatures();

        let keep: Vec<usize> = (0..d)
            .filter(|&c| {
                let mean = rows.iter().map(|r| r[c]).sum::<f64>() / n;
                let var = rows.iter().map(|r| (r[c] - mean).powi(2)).sum::<f64>() / n;
                var > 0.0
            })
            .collect();
        debug!("Standardising: keeping {} of {} columns", keep.len(), d);
        if keep.is_empty() {
            return Err(RfaError::data_format(
                "<memory>",
                "every feature column is constant, nothing left to standardise",
            ));
        }

        let reduced: Vec<Vec<f64>> = rows
            .iter()
            .map(|r| keep.iter().map(|&c| r[c]).collect())
            .collect();
        let reduced = DenseMatrix::from_2d_vec(&reduced)
            .map_err(|e| RfaError::data_format("<memory>", e.to_string()))?;

        let scaler = StandardScaler::fit(&reduced, StandardScalerParameters::default())
            .map_err(|e| RfaError::data_format("<memory>", e.to_string()))?;
        let features = scaler
            .transform(&reduced)
            .map_err(|e| RfaError::data_format("<memory>", e.to_string()))?;
        trace!("Items standardised successfully");

        Ok(Self {
            features,
            labels: self.labels,
        })
    }
}

/// Square matrix of pairwise distances, optionally labelled by a CSV header.
#[derive(Debug, Clone)]
pub struct DistanceMatrix {
    pub matrix: DenseMatrix<f64>,
    pub labels: Option<Vec<String>>,
}

impl DistanceMatrix {
    /// Validate a square, finite, non-negative matrix.
    pub fn new(matrix: DenseMatrix<f64>, labels: Option<Vec<String>>) -> Result<Self> {
        let (r, c) = matrix.shape();
        if r != c {
            return Err(RfaError::data_format(
                "<memory>",
                format!("distance matrix must be square, got {}x{}", r, c),
            ));
        }
        for i in 0..r {
            for j in 0..c {
                let v = *matrix.get((i, j));
                if !v.is_finite() || v < 0.0 {
                    return Err(RfaError::data_format(
                        "<memory>",
                        format!("invalid distance {} at ({}, {})", v, i, j),
                    ));
                }
            }
        }
        if let Some(l) = &labels {
            if l.len() != r {
                return Err(RfaError::data_format(
                    "<memory>",
                    format!("{} labels for a {}x{} distance matrix", l.len(), r, c),
                ));
            }
        }
        Ok(Self { matrix, labels })
    }

    pub fn n(&self) -> usize {
        self.matrix.shape().0
    }
}

/// Parse one item file into a flat vector.
pub fn read_item(path: &Path) -> Result<Vec<f64>> {
    let text = fs::read_to_string(path).map_err(|e| RfaError::io(path, e))?;
    let mut values = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        let content = match line.find('#') {
            Some(pos) => &line[..pos],
            None => line,
        };
        for token in content.split_whitespace() {
            let v: f64 = token.parse().map_err(|_| {
                RfaError::data_format(
                    path,
                    format!("cannot parse '{}' as a number on line {}", token, lineno + 1),
                )
            })?;
            values.push(v);
        }
    }
    Ok(values)
}

/// List item files in `dir` whose name contains `extension`, sorted by name.
fn list_items(dir: &Path, extension: &str, with_root: bool) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| RfaError::io(dir, e))?;
    let root_name = format!("0{}", extension);

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| RfaError::io(dir, e))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.contains(extension) {
            continue;
        }
        if !with_root && name == root_name {
            debug!("Excluding root item {}", name);
            continue;
        }
        files.push(path);
    }
    files.sort();
    Ok(files)
}

fn label_of(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.split('.').next().unwrap_or_default().to_string()
}

/// Load every item file of `dir` into a [`FeatureSet`].
///
/// # Errors
///
/// `DataFormat` when no file matches `extension`, when a value does not
/// parse, or when an item's length differs from the first item's. Items are
/// never padded or truncated.
pub fn load_features(
    dir: impl AsRef<Path>,
    extension: &str,
    with_root: bool,
    maxlen: Option<usize>,
) -> Result<FeatureSet> {
    let dir = dir.as_ref();
    let files = list_items(dir, extension, with_root)?;
    if files.is_empty() {
        return Err(RfaError::data_format(
            dir,
            format!("no '{}' files found", extension),
        ));
    }
    info!("{} items found in folder {:?}", files.len(), dir);

    let first = read_item(&files[0])?;
    let width = first.len();
    if width == 0 {
        return Err(RfaError::data_format(&files[0], "item file holds no values"));
    }
    if let Some(maxlen) = maxlen {
        if width > maxlen {
            debug!("Item width {} exceeds maxlen {}", width, maxlen);
        }
    }

    let mut rows = Vec::with_capacity(files.len());
    let mut labels = Vec::with_capacity(files.len());
    rows.push(first);
    labels.push(label_of(&files[0]));

    for path in files.iter().skip(1) {
        let row = read_item(path)?;
        if row.len() != width {
            return Err(RfaError::data_format(
                path,
                format!("expected {} values (as the first item), found {}", width, row.len()),
            ));
        }
        trace!("Loaded {:?} with {} values", path, row.len());
        rows.push(row);
        labels.push(label_of(path));
    }

    let set = FeatureSet::from_rows(rows, labels)?;
    info!(
        "Tensor construction terminated: {} items x {} features",
        set.nitems(),
        set.nfeatures()
    );
    Ok(set)
}

/// Read a CSV distance matrix.
///
/// With `has_header` the first row holds the item labels, numeric or not
/// (`17,23,42` is a header, not data). A leading column of row names is
/// dropped when it is non-numeric or when every row has one cell too many.
pub fn load_distance_csv(path: impl AsRef<Path>, has_header: bool) -> Result<DistanceMatrix> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|e| RfaError::io(path, e))?;

    let mut lines = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty());

    let parse_row = |line: &str| -> Vec<String> {
        line.split(',').map(|s| s.trim().trim_matches('"').to_string()).collect()
    };

    let header: Option<Vec<String>> = if has_header {
        lines.next().map(parse_row)
    } else {
        None
    };

    let records: Vec<Vec<String>> = lines.map(parse_row).collect();
    // row names: a non-numeric first cell, or one cell too many on every row
    let n_records = records.len();
    let row_names = n_records > 0 && records.iter().all(|r| r.len() == n_records + 1);

    let mut rows: Vec<Vec<f64>> = Vec::with_capacity(n_records);
    for (lineno, mut fields) in records.into_iter().enumerate() {
        if row_names || fields.first().is_some_and(|f| f.parse::<f64>().is_err()) {
            fields.remove(0);
        }
        let row = fields
            .iter()
            .map(|f| {
                f.parse::<f64>().map_err(|_| {
                    RfaError::data_format(
                        path,
                        format!("cannot parse '{}' on data row {}", f, lineno + 1),
                    )
                })
            })
            .collect::<Result<Vec<f64>>>()?;
        rows.push(row);
    }

    let n = rows.len();
    if n == 0 {
        return Err(RfaError::data_format(path, "distance matrix has no rows"));
    }
    if let Some((i, r)) = rows.iter().enumerate().find(|(_, r)| r.len() != n) {
        return Err(RfaError::data_format(
            path,
            format!("row {} has {} columns, expected {} (square matrix)", i, r.len(), n),
        ));
    }

    // header may carry an empty cell over a row-name column
    let labels = header.map(|mut h| {
        if h.len() == n + 1 {
            h.remove(0);
        }
        h
    });
    let labels = match labels {
        Some(l) if l.len() == n => Some(l),
        Some(l) => {
            warn!("Ignoring CSV header with {} fields for {} columns", l.len(), n);
            None
        }
        None => None,
    };

    let matrix = DenseMatrix::from_iterator(rows.into_iter().flatten(), n, n, 0);
    let dm = DistanceMatrix::new(matrix, labels).map_err(|e| match e {
        RfaError::DataFormat { message, .. } => RfaError::data_format(path, message),
        other => other,
    })?;
    info!("Loaded {}x{} distance matrix from {:?}", n, n, path);
    Ok(dm)
}
