use approx::{assert_abs_diff_eq, assert_relative_eq};

use crate::errors::RfaError;
use crate::graph::GraphParams;
use crate::knn::{KnnGraph, Symmetrization};
use crate::laplacian::*;
use crate::metric::{pairwise_distances, LocalMetric};
use crate::repair::connect_components;
use crate::tests::test_data::{three_clusters, two_pairs};
use crate::tests::{init_logging, GRAPH_PARAMS};

fn connected_graph(items: &[Vec<f64>], k: usize) -> KnnGraph {
    let g = KnnGraph::from_features(items, k, LocalMetric::Euclidean)
        .unwrap()
        .symmetrize(Symmetrization::Max);
    let d = pairwise_distances(items, LocalMetric::Euclidean).unwrap();
    connect_components(g, &d).unwrap().0
}

#[test]
fn test_kernel_scale_policy() {
    // only minkowski is scaled by dimensionality
    assert_relative_eq!(kernel_scale(0.5, LocalMetric::Minkowski { p: 2.0 }, 20).unwrap(), 10.0);
    assert_relative_eq!(kernel_scale(0.5, LocalMetric::Minkowski { p: 1.0 }, 4).unwrap(), 2.0);
    assert_relative_eq!(kernel_scale(0.5, LocalMetric::Euclidean, 20).unwrap(), 0.5);
    assert_relative_eq!(kernel_scale(0.5, LocalMetric::Cosine, 20).unwrap(), 0.5);
    assert_relative_eq!(kernel_scale(2.0, LocalMetric::Precomputed, 0).unwrap(), 2.0);
}

#[test]
fn test_kernel_scale_rejects_bad_sigma() {
    for sigma in [0.0, -1.0, f64::NAN, f64::INFINITY] {
        assert!(matches!(
            kernel_scale(sigma, LocalMetric::Euclidean, 3),
            Err(RfaError::InvalidParameter { .. })
        ));
    }
    assert!(kernel_scale(1.0, LocalMetric::default(), 0).is_err());
}

#[test]
fn test_similarity_values_and_masking() {
    let g = KnnGraph::from_edges(3, vec![(0, 1, 2.0), (1, 0, 2.0)]);
    let s = similarity_matrix(&g, 4.0);

    assert_relative_eq!(*s.get(0, 1).unwrap(), (-0.5f64).exp());
    assert_relative_eq!(*s.get(1, 0).unwrap(), (-0.5f64).exp());
    // no edge, no similarity, even though exp(0) = 1
    assert!(s.get(0, 2).is_none());
    assert!(s.get(2, 2).is_none());
    assert!(s.get(0, 0).is_none());
}

#[test]
fn test_two_node_laplacian() {
    let g = KnnGraph::from_edges(2, vec![(0, 1, 1.0), (1, 0, 1.0)]);
    let gl = build_laplacian_matrix(&g, &GRAPH_PARAMS, 2).unwrap();
    let s = (-1.0f64).exp();

    assert_eq!(gl.nnodes, 2);
    assert_eq!(gl.shape(), (2, 2));
    assert_relative_eq!(gl.get(0, 0), s);
    assert_relative_eq!(gl.get(1, 1), s);
    assert_relative_eq!(gl.get(0, 1), -s);
    assert_relative_eq!(gl.get(1, 0), -s);
    assert_eq!(gl.graph_params, GRAPH_PARAMS);
}

#[test]
fn test_laplacian_mathematical_properties() {
    init_logging();
    let items = three_clusters(10, 5, 42);
    let g = connected_graph(&items, 4);
    let gl = build_laplacian_matrix(&g, &GRAPH_PARAMS, 5).unwrap();
    let n = gl.nnodes;

    // Property 1: Row sums should be zero (within numerical precision)
    for row_sum in gl.row_sums() {
        assert_abs_diff_eq!(row_sum, 0.0, epsilon = 1e-12);
    }

    // Property 2: Matrix should be symmetric
    assert!(gl.is_symmetric(1e-12));

    // Property 3: Diagonal entries should be positive on a connected graph
    for (i, d) in gl.degrees().into_iter().enumerate() {
        assert!(d > 0.0, "Diagonal L[{},{}] should be positive, got {:.6}", i, i, d);
    }

    // Property 4: Off-diagonal entries should be non-positive
    for i in 0..n {
        for j in 0..n {
            if i != j {
                assert!(gl.get(i, j) <= 0.0, "Off-diagonal L[{},{}] = {:.6}", i, j, gl.get(i, j));
            }
        }
    }

    let validation = gl.verify_properties(1e-10);
    assert!(validation.is_valid);
    assert!(validation.row_sum_violations.is_empty());
}

#[test]
fn test_minkowski_bandwidth_uses_dimensionality() {
    let items = two_pairs();
    let g = connected_graph(&items, 1);

    let mink = GraphParams {
        metric: LocalMetric::Minkowski { p: 2.0 },
        sigma: 1.0,
        ..GRAPH_PARAMS
    };
    let eucl = GraphParams {
        metric: LocalMetric::Euclidean,
        sigma: 1.0,
        ..GRAPH_PARAMS
    };
    let gl_mink = build_laplacian_matrix(&g, &mink, 2).unwrap();
    let gl_eucl = build_laplacian_matrix(&g, &eucl, 2).unwrap();

    // bridge (1, 2) has distance 9
    assert_relative_eq!(gl_mink.get(1, 2), -(-9.0f64 / 2.0).exp(), epsilon = 1e-15);
    assert_relative_eq!(gl_eucl.get(1, 2), -(-9.0f64).exp(), epsilon = 1e-15);
}

#[test]
fn test_disconnected_graph_gives_zero_degree_rows() {
    let g = KnnGraph::from_edges(3, vec![(0, 1, 1.0), (1, 0, 1.0)]);
    let gl = build_laplacian_matrix(&g, &GRAPH_PARAMS, 2).unwrap();
    assert_eq!(gl.get(2, 2), 0.0);
    for row_sum in gl.row_sums() {
        assert_abs_diff_eq!(row_sum, 0.0, epsilon = 1e-15);
    }
}

#[test]
fn test_statistics_and_display() {
    let g = connected_graph(&two_pairs(), 1);
    let gl = build_laplacian_matrix(&g, &GRAPH_PARAMS, 2).unwrap();

    let stats = gl.statistics();
    assert_eq!(stats.nnodes, 4);
    // 4 diagonal entries + 3 undirected edges
    assert_eq!(stats.nnz, 10);
    assert_eq!(stats.n_edges, 3);
    assert_eq!(stats.isolated, 0);
    assert!(stats.min_degree > 0.0);
    assert!(stats.max_degree >= stats.mean_degree);

    let shown = format!("{}", gl);
    assert!(shown.starts_with("GraphLaplacian (4×4):"));
    assert!(format!("{}", stats).contains("Nodes: 4"));
}

#[test]
fn test_isolated_nodes_counted_in_statistics() {
    let g = KnnGraph::from_edges(3, vec![(0, 1, 1.0), (1, 0, 1.0)]);
    let stats = build_laplacian_matrix(&g, &GRAPH_PARAMS, 2).unwrap().statistics();
    assert_eq!(stats.n_edges, 1);
    assert_eq!(stats.isolated, 1);
    assert_eq!(stats.min_degree, 0.0);
}

#[test]
fn test_validation_flags_broken_laplacian() {
    let g = KnnGraph::from_edges(2, vec![(0, 1, 1.0), (1, 0, 1.0)]);
    let mut gl = build_laplacian_matrix(&g, &GRAPH_PARAMS, 2).unwrap();
    if let Some(v) = gl.matrix.get_mut(0, 1) {
        *v = 0.5;
    }
    let validation = gl.verify_properties(1e-10);
    assert!(!validation.is_valid);
    assert!(validation.max_asymmetry > 0.1);
    assert_eq!(validation.row_sum_violations.len(), 1);
    assert!(validation.negative_degrees.is_empty());
}

#[test]
#[should_panic(expected = "out of range")]
fn test_get_out_of_range_panics() {
    let g = KnnGraph::from_edges(2, vec![(0, 1, 1.0), (1, 0, 1.0)]);
    let gl = build_laplacian_matrix(&g, &GRAPH_PARAMS, 2).unwrap();
    gl.get(2, 0);
}
