mod test_knn;
mod test_laplacian;

use crate::graph::GraphParams;
use crate::knn::Symmetrization;
use crate::metric::LocalMetric;

pub const GRAPH_PARAMS: GraphParams = GraphParams {
    k: 3,
    symmetrization: Symmetrization::Max,
    metric: LocalMetric::Euclidean,
    sigma: 1.0,
    connected: true,
};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
