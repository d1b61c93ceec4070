use approx::assert_relative_eq;
use smartcore::linalg::basic::arrays::Array;
use smartcore::linalg::basic::matrix::DenseMatrix;

use crate::errors::RfaError;
use crate::knn::{KnnGraph, Symmetrization};
use crate::loader::DistanceMatrix;
use crate::metric::{pairwise_distances, LocalMetric};
use crate::tests::init_logging;
use crate::tests::test_data::{three_clusters, two_pairs};

fn line(points: &[f64]) -> Vec<Vec<f64>> {
    points.iter().map(|&x| vec![x]).collect()
}

#[test]
fn test_feature_mode_keeps_k_nearest_excluding_self() {
    init_logging();
    let g = KnnGraph::from_features(&two_pairs(), 1, LocalMetric::Euclidean).unwrap();

    assert_eq!(g.nnodes, 4);
    assert_eq!(g.nnz(), 4, "one directed edge per node");
    assert_relative_eq!(g.get(0, 1), 1.0);
    assert_relative_eq!(g.get(1, 0), 1.0);
    assert_relative_eq!(g.get(2, 3), 1.5);
    assert_relative_eq!(g.get(3, 2), 1.5);
    for i in 0..4 {
        assert_eq!(g.get(i, i), 0.0, "no self loops");
    }
}

#[test]
fn test_feature_mode_is_directed_before_symmetrization() {
    // 2 picks 1 (distance 2) but 1 picks 0 (distance 1)
    let g = KnnGraph::from_features(&line(&[0.0, 1.0, 3.0]), 1, LocalMetric::Euclidean).unwrap();
    assert!(g.has_edge(2, 1));
    assert!(!g.has_edge(1, 2));
    assert!(!g.is_symmetric(1e-12));
}

#[test]
fn test_symmetrize_max_and_min() {
    let items = line(&[0.0, 1.0, 3.0]);

    let max = KnnGraph::from_features(&items, 1, LocalMetric::Euclidean)
        .unwrap()
        .symmetrize(Symmetrization::Max);
    assert!(max.is_symmetric(0.0));
    assert_relative_eq!(max.get(1, 2), 2.0);
    assert_relative_eq!(max.get(2, 1), 2.0);
    assert_eq!(max.nnz(), 4);

    // min keeps mutual neighbours only
    let min = KnnGraph::from_features(&items, 1, LocalMetric::Euclidean)
        .unwrap()
        .symmetrize(Symmetrization::Min);
    assert!(min.is_symmetric(0.0));
    assert!(!min.has_edge(1, 2));
    assert!(!min.has_edge(2, 1));
    assert_relative_eq!(min.get(0, 1), 1.0);
    assert_eq!(min.nnz(), 2);
}

#[test]
fn test_distfn_parsing() {
    assert_eq!(Symmetrization::from_distfn("sym"), Symmetrization::Max);
    assert_eq!(Symmetrization::from_distfn("SYM_max"), Symmetrization::Max);
    assert_eq!(Symmetrization::from_distfn("min"), Symmetrization::Min);
    assert_eq!(Symmetrization::from_distfn(""), Symmetrization::Min);
}

#[test]
fn test_symmetrized_graph_is_symmetric_on_clustered_data() {
    init_logging();
    let items = three_clusters(15, 4, 7);
    for metric in [
        LocalMetric::Minkowski { p: 2.0 },
        LocalMetric::Manhattan,
        LocalMetric::Cosine,
        LocalMetric::Chebyshev,
    ] {
        for rule in [Symmetrization::Max, Symmetrization::Min] {
            let g = KnnGraph::from_features(&items, 5, metric).unwrap().symmetrize(rule);
            for i in 0..g.nnodes {
                for j in 0..g.nnodes {
                    assert_eq!(g.get(i, j), g.get(j, i), "{:?}/{:?} at ({}, {})", metric, rule, i, j);
                }
            }
        }
    }
}

#[test]
fn test_ties_go_to_lower_index() {
    // 1 is equidistant from 0 and 2
    let g = KnnGraph::from_features(&line(&[0.0, 1.0, 2.0]), 1, LocalMetric::Euclidean).unwrap();
    assert!(g.has_edge(1, 0));
    assert!(!g.has_edge(1, 2));
}

#[test]
fn test_precomputed_mode_matches_feature_mode() {
    let items = two_pairs();
    let dm = DistanceMatrix::new(pairwise_distances(&items, LocalMetric::Euclidean).unwrap(), None).unwrap();

    let pre = KnnGraph::from_precomputed(&dm, 1).unwrap().symmetrize(Symmetrization::Max);
    let feat = KnnGraph::from_features(&items, 1, LocalMetric::Euclidean)
        .unwrap()
        .symmetrize(Symmetrization::Max);

    assert_eq!(pre.edges(), feat.edges());
}

#[test]
fn test_precomputed_mode_drops_self_entry() {
    let dm = DistanceMatrix::new(
        DenseMatrix::from_2d_vec(&vec![
            vec![0.0, 2.0, 5.0],
            vec![2.0, 0.0, 1.0],
            vec![5.0, 1.0, 0.0],
        ])
        .unwrap(),
        None,
    )
    .unwrap();
    let g = KnnGraph::from_precomputed(&dm, 1).unwrap();
    assert_eq!(g.nnz(), 3);
    assert_relative_eq!(g.get(0, 1), 2.0);
    assert_relative_eq!(g.get(1, 2), 1.0);
    assert_relative_eq!(g.get(2, 1), 1.0);
    for i in 0..3 {
        assert!(!g.has_edge(i, i));
    }
}

#[test]
fn test_k_is_clamped_to_available_neighbours() {
    let g = KnnGraph::from_features(&two_pairs(), 50, LocalMetric::Euclidean).unwrap();
    assert_eq!(g.nnz(), 12, "complete directed graph on 4 nodes");
}

#[test]
fn test_zero_k_is_rejected() {
    assert!(matches!(
        KnnGraph::from_features(&two_pairs(), 0, LocalMetric::Euclidean),
        Err(RfaError::InvalidParameter { .. })
    ));
}

#[test]
fn test_feature_mode_rejects_precomputed_metric() {
    let err = KnnGraph::from_features(&two_pairs(), 1, LocalMetric::Precomputed).unwrap_err();
    assert!(matches!(err, RfaError::InvalidMetric { ref mode, .. } if mode == "features"));
}

#[test]
fn test_empty_input_is_degenerate() {
    let err = KnnGraph::from_features(&[], 3, LocalMetric::Euclidean).unwrap_err();
    assert!(matches!(err, RfaError::DisconnectedInput { .. }));
}

#[test]
fn test_zero_distance_pairs_are_not_edges() {
    let items = vec![vec![1.0, 1.0], vec![1.0, 1.0], vec![4.0, 5.0]];
    let g = KnnGraph::from_features(&items, 1, LocalMetric::Euclidean).unwrap();
    assert!(!g.has_edge(0, 1));
    assert!(!g.has_edge(1, 0));
    assert_relative_eq!(g.get(2, 0), 5.0);
}

#[test]
fn test_dense_view() {
    let g = KnnGraph::from_features(&two_pairs(), 1, LocalMetric::Euclidean)
        .unwrap()
        .symmetrize(Symmetrization::Max);
    let dense = g.to_dense();
    assert_eq!(dense.shape(), (4, 4));
    assert_relative_eq!(*dense.get((2, 3)), 1.5);
    assert_eq!(*dense.get((0, 2)), 0.0);
}
