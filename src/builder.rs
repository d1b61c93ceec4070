use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Instant;

use log::{debug, info, trace, warn};
use serde::{Deserialize, Serialize};

use crate::components::connected_components;
use crate::errors::{RfaError, Result};
use crate::graph::{GraphLaplacian, GraphParams};
use crate::knn::{KnnGraph, Symmetrization};
use crate::laplacian::build_laplacian_matrix;
use crate::loader::{load_distance_csv, load_features, DistanceMatrix, FeatureSet, DEFAULT_EXTENSION};
use crate::metric::{pairwise_distances, LocalMetric};
use crate::repair::{connect_components, RepairReport};
use crate::rfa::{compute_rfa, RfaMatrix, DEFAULT_RIDGE};

/// Where the k-NN graph gets its distances from.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum InputMode {
    #[default]
    Features,
    Precomputed,
}

impl fmt::Display for InputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputMode::Features => write!(f, "features"),
            InputMode::Precomputed => write!(f, "precomputed"),
        }
    }
}

impl FromStr for InputMode {
    type Err = RfaError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "features" => Ok(InputMode::Features),
            "precomputed" => Ok(InputMode::Precomputed),
            other => Err(RfaError::invalid_parameter(format!(
                "unknown mode '{}', expected 'features' or 'precomputed'",
                other
            ))),
        }
    }
}

/// Everything a run produces, in pipeline order.
#[derive(Debug, Clone)]
pub struct RfaOutput {
    pub labels: Vec<String>,
    pub knn: KnnGraph,
    pub repair: Option<RepairReport>,
    pub laplacian: GraphLaplacian,
    pub rfa: RfaMatrix,
}

pub struct RfaBuilder {
    graph_params: GraphParams,
    mode: InputMode,
    distance_file: Option<PathBuf>,
    distance_header: bool,

    // loading
    extension: String,
    with_root: bool,
    maxlen: usize, // accepted for compatibility, items are never padded
    normalise: bool,

    ridge: f64,
}

impl Default for RfaBuilder {
    fn default() -> Self {
        debug!("Creating RfaBuilder with default parameters");
        Self {
            graph_params: GraphParams::default(),
            mode: InputMode::Features,
            distance_file: None,
            distance_header: true,

            extension: DEFAULT_EXTENSION.to_string(),
            with_root: true,
            maxlen: 872,
            normalise: false,

            ridge: DEFAULT_RIDGE,
        }
    }
}

impl RfaBuilder {
    pub fn new() -> Self {
        info!("Initializing new RfaBuilder");
        Self::default()
    }

    // -------------------- Graph configuration --------------------

    /// Number of neighbours per item in the k-NN graph.
    pub fn with_k_neighbours(mut self, k: usize) -> Self {
        info!("Setting k_neighbours: {}", k);
        self.graph_params.k = k;
        self
    }

    /// Symmetrization rule from a `distfn` string: "sym" (max) or anything else (min).
    pub fn with_distfn(mut self, distfn: &str) -> Self {
        self.graph_params.symmetrization = Symmetrization::from_distfn(distfn);
        info!(
            "Setting distfn '{}': {:?} symmetrization",
            distfn, self.graph_params.symmetrization
        );
        self
    }

    pub fn with_symmetrization(mut self, rule: Symmetrization) -> Self {
        info!("Setting symmetrization: {:?}", rule);
        self.graph_params.symmetrization = rule;
        self
    }

    pub fn with_metric(mut self, metric: LocalMetric) -> Self {
        info!("Setting local metric: {}", metric);
        self.graph_params.metric = metric;
        self
    }

    /// Kernel bandwidth; multiplied by the feature count for minkowski.
    pub fn with_sigma(mut self, sigma: f64) -> Self {
        info!("Setting sigma: {}", sigma);
        self.graph_params.sigma = sigma;
        self
    }

    /// Bridge components so the graph is connected before the Laplacian.
    pub fn with_connected(mut self, connected: bool) -> Self {
        info!("Setting connected: {}", connected);
        self.graph_params.connected = connected;
        self
    }

    pub fn with_graph_params(mut self, params: GraphParams) -> Self {
        debug!("Replacing graph parameters: {:?}", params);
        self.graph_params = params;
        self
    }

    // -------------------- Input configuration --------------------

    pub fn with_mode(mut self, mode: InputMode) -> Self {
        info!("Setting mode: {}", mode);
        self.mode = mode;
        self
    }

    /// CSV distance matrix used by `build_from_dir`/`build` in precomputed mode.
    pub fn with_distance_file(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        info!("Setting distance file: {:?}", path);
        self.distance_file = Some(path);
        self
    }

    /// Whether the first CSV row holds labels (default `true`).
    pub fn with_distance_header(mut self, has_header: bool) -> Self {
        info!("Setting distance file header: {}", has_header);
        self.distance_header = has_header;
        self
    }

    pub fn with_extension(mut self, extension: &str) -> Self {
        info!("Setting item extension: {}", extension);
        self.extension = extension.to_string();
        self
    }

    /// Keep (`true`) or drop the root item `0<extension>` when loading.
    pub fn with_root(mut self, with_root: bool) -> Self {
        info!("Setting with_root: {}", with_root);
        self.with_root = with_root;
        self
    }

    pub fn with_maxlen(mut self, maxlen: usize) -> Self {
        info!("Setting maxlen: {}", maxlen);
        self.maxlen = maxlen;
        self
    }

    /// Standardise feature columns before building the graph.
    pub fn with_normalisation(mut self, normalise: bool) -> Self {
        info!("Setting normalization: {}", normalise);
        self.normalise = normalise;
        self
    }

    /// Ridge added to `L + I` when it fails the definiteness check; 0 disables.
    pub fn with_ridge(mut self, ridge: f64) -> Self {
        info!("Setting ridge fallback: {:e}", ridge);
        self.ridge = ridge;
        self
    }

    pub fn graph_params(&self) -> &GraphParams {
        &self.graph_params
    }

    // -------------------- Build --------------------

    /// Load the items of `dir` and run the pipeline.
    pub fn build_from_dir(self, dir: impl AsRef<Path>) -> Result<RfaOutput> {
        let features = load_features(dir, &self.extension, self.with_root, Some(self.maxlen))?;
        self.build(features)
    }

    /// Run the pipeline on loaded features.
    ///
    /// In precomputed mode the distance file configured with
    /// `with_distance_file` drives the k-NN graph; the features are still used
    /// for repair distances and the minkowski scaling.
    pub fn build(self, features: FeatureSet) -> Result<RfaOutput> {
        match self.mode {
            InputMode::Features => self.build_features(features),
            InputMode::Precomputed => {
                let path = self.distance_file.clone().ok_or_else(|| {
                    RfaError::invalid_parameter("precomputed mode needs a distance file")
                })?;
                let distances = load_distance_csv(path, self.distance_header)?;
                self.build_precomputed(distances, Some(features))
            }
        }
    }

    fn prepare(&self, features: FeatureSet) -> Result<FeatureSet> {
        if self.normalise {
            debug!("Standardising feature columns");
            features.standardise()
        } else {
            trace!("Skipping normalization - using raw item magnitudes");
            Ok(features)
        }
    }

    fn build_features(self, features: FeatureSet) -> Result<RfaOutput> {
        let params = &self.graph_params;
        if params.metric == LocalMetric::Precomputed {
            return Err(RfaError::invalid_metric(params.metric.name(), InputMode::Features.to_string()));
        }
        let features = self.prepare(features)?;
        info!(
            "Building RFA from {} items with {} features",
            features.nitems(),
            features.nfeatures()
        );
        debug!("Build configuration: {:?}", params);

        let start = Instant::now();
        let rows = features.rows();
        let knn = KnnGraph::from_features(&rows, params.k, params.metric)?
            .symmetrize(params.symmetrization);

        let (knn, repair) = if params.connected {
            let distances = pairwise_distances(&rows, params.metric)?;
            let (g, report) = connect_components(knn, &distances)?;
            (g, Some(report))
        } else {
            (knn, None)
        };

        let dimensionality = features.nfeatures();
        self.finish(features.labels, dimensionality, knn, repair, start)
    }

    /// Run the pipeline on a precomputed distance matrix.
    ///
    /// Labels come from `features` if given, else from the CSV header, else
    /// from row indices.
    pub fn build_precomputed(
        self,
        distances: DistanceMatrix,
        features: Option<FeatureSet>,
    ) -> Result<RfaOutput> {
        let params = &self.graph_params;
        let n = distances.n();
        let features = features.map(|f| self.prepare(f)).transpose()?;

        if let Some(f) = &features {
            if f.nitems() != n {
                return Err(RfaError::data_format(
                    self.distance_file.clone().unwrap_or_default(),
                    format!("{}x{} distance matrix for {} items", n, n, f.nitems()),
                ));
            }
        } else if params.metric.is_minkowski() {
            return Err(RfaError::invalid_metric(
                params.metric.name(),
                "precomputed (no features for the dimensionality scaling)",
            ));
        }

        info!("Building RFA from a {}x{} precomputed distance matrix", n, n);
        debug!("Build configuration: {:?}", params);

        let start = Instant::now();
        let knn = KnnGraph::from_precomputed(&distances, params.k)?.symmetrize(params.symmetrization);

        let (knn, repair) = if params.connected {
            let (g, report) = match (&features, params.metric) {
                (Some(f), metric) if metric != LocalMetric::Precomputed => {
                    let d = pairwise_distances(&f.rows(), metric)?;
                    connect_components(knn, &d)?
                }
                _ => connect_components(knn, &distances.matrix)?,
            };
            (g, Some(report))
        } else {
            (knn, None)
        };

        let dimensionality = features.as_ref().map(|f| f.nfeatures()).unwrap_or(0);
        let labels = match (features, distances.labels) {
            (Some(f), _) => f.labels,
            (None, Some(l)) => l,
            (None, None) => (0..n).map(|i| i.to_string()).collect(),
        };

        self.finish(labels, dimensionality, knn, repair, start)
    }

    fn finish(
        &self,
        labels: Vec<String>,
        dimensionality: usize,
        knn: KnnGraph,
        repair: Option<RepairReport>,
        start: Instant,
    ) -> Result<RfaOutput> {
        let components = connected_components(&knn);
        if !components.is_connected() {
            warn!(
                "k-NN graph has {} components; RFA between them will be block diagonal",
                components.n_components
            );
        }

        info!("Computing laplacian...");
        let laplacian = build_laplacian_matrix(&knn, &self.graph_params, dimensionality)?;
        info!("Laplacian computed in {:.2} sec", start.elapsed().as_secs_f64());
        debug!("{}", laplacian.statistics());

        let rfa = compute_rfa(&laplacian, self.ridge)?;

        info!("RFA build completed successfully");
        Ok(RfaOutput {
            labels,
            knn,
            repair,
            laplacian,
            rfa,
        })
    }
}
