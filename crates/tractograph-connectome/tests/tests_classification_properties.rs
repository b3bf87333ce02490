//! Property tests for classification and aggregation
//!
//! Random label volumes and random streamlines are pushed through
//! `compute_resolution`; every streamline must land in exactly one bucket and
//! every stored edge must be canonical.

use ndarray::Array3;
use proptest::prelude::*;
use tractograph_config::EngineSettings;
use tractograph_connectome::*;
use tractograph_observability::NoProgress;
use tractograph_structures::{
    ParcellationVolume, Point, RegionDescription, Tractogram, TractogramHeader,
};

const SIDE: usize = 6;
const DECLARED_REGIONS: usize = 4;

fn inputs(labels: Vec<i64>) -> ResolutionInputs {
    let data = Array3::from_shape_vec((SIDE, SIDE, SIDE), labels).unwrap();
    ResolutionInputs {
        key: "scale1".to_string(),
        parcellation: ParcellationVolume::new(data, [1.0; 3]).unwrap(),
        descriptions: (1..=DECLARED_REGIONS as u32)
            .map(RegionDescription::unnamed)
            .collect(),
        number_of_regions: DECLARED_REGIONS,
    }
}

fn tractogram(streamlines: &[Vec<Point>]) -> Tractogram {
    Tractogram::from_streamlines(TractogramHeader::default(), streamlines).unwrap()
}

fn point() -> impl Strategy<Value = Point> {
    prop::array::uniform3(-2.0f32..8.0)
}

fn streamline_sets() -> impl Strategy<Value = Vec<Vec<Point>>> {
    prop::collection::vec(prop::collection::vec(point(), 0..5), 0..60)
}

fn label_data() -> impl Strategy<Value = Vec<i64>> {
    // 5 exceeds the declared region count
    prop::collection::vec(0i64..=5, SIDE * SIDE * SIDE)
}

/// Tests for the classification partition
#[cfg(test)]
mod test_partition {
    use super::*;

    proptest! {
        #[test]
        fn every_streamline_lands_in_one_bucket(
            labels in label_data(),
            streamlines in streamline_sets(),
            allow_self in any::<bool>(),
        ) {
            let tractogram = tractogram(&streamlines);
            let settings = EngineSettings {
                allow_self_connections: allow_self,
                ..EngineSettings::default()
            };
            let result = compute_resolution(
                &inputs(labels),
                &tractogram,
                &[],
                &settings,
                &NoProgress,
                &AbortHandle::new(),
            )
            .unwrap();
            let counts = result.classification.counts;

            prop_assert_eq!(result.classification.labels.len(), tractogram.len());
            prop_assert_eq!(counts.total, tractogram.len());
            prop_assert_eq!(
                result.graph.total_fibers() + counts.orphans() + counts.excluded(),
                tractogram.len()
            );
            prop_assert_eq!(result.aggregation.lengths.len(), counts.valid);
            if !allow_self {
                prop_assert!(result.graph.edges.keys().all(|k| !k.is_self_loop()));
            }
        }
    }
}

/// Tests for canonical edges and metric bounds
#[cfg(test)]
mod test_edges {
    use super::*;

    proptest! {
        #[test]
        fn edges_are_canonical_and_metrics_bounded(
            labels in label_data(),
            streamlines in streamline_sets(),
        ) {
            let tractogram = tractogram(&streamlines);
            let result = compute_resolution(
                &inputs(labels),
                &tractogram,
                &[],
                &EngineSettings::default(),
                &NoProgress,
                &AbortHandle::new(),
            )
            .unwrap();

            let mut proportion = 0.0;
            for (key, metrics) in &result.graph.edges {
                prop_assert!(key.source() <= key.target());
                prop_assert!(key.target() as usize <= DECLARED_REGIONS);
                prop_assert!(metrics.number_of_fibers > 0);
                prop_assert!(metrics.fiber_density.unwrap() >= 0.0);
                prop_assert!(metrics.normalized_fiber_density.unwrap() >= 0.0);
                if metrics.fiber_length.unwrap().mean == 0.0 {
                    prop_assert_eq!(metrics.fiber_density, Some(0.0));
                    prop_assert_eq!(metrics.normalized_fiber_density, Some(0.0));
                }
                proportion += metrics.fiber_proportion.unwrap();
            }
            if result.classification.counts.valid > 0 {
                prop_assert!((proportion - 100.0).abs() < 1e-9);
            }
        }

        #[test]
        fn reversing_streamlines_keeps_the_graph(
            labels in label_data(),
            streamlines in streamline_sets(),
        ) {
            let forward = tractogram(&streamlines);
            let reversed: Vec<Vec<Point>> = streamlines
                .iter()
                .map(|s| s.iter().rev().copied().collect())
                .collect();
            let backward = tractogram(&reversed);
            let run = |t: &Tractogram| {
                compute_resolution(
                    &inputs(labels.clone()),
                    t,
                    &[],
                    &EngineSettings::default(),
                    &NoProgress,
                    &AbortHandle::new(),
                )
                .unwrap()
            };
            let (a, b) = (run(&forward), run(&backward));

            prop_assert_eq!(
                a.graph.edges.keys().collect::<Vec<_>>(),
                b.graph.edges.keys().collect::<Vec<_>>()
            );
            for (key, metrics) in &a.graph.edges {
                prop_assert_eq!(metrics.number_of_fibers, b.graph.edges[key].number_of_fibers);
            }
        }
    }
}

/// Tests for bit-identical reruns
#[cfg(test)]
mod test_determinism {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn repeated_runs_are_identical(
            labels in label_data(),
            streamlines in streamline_sets(),
        ) {
            let tractogram = tractogram(&streamlines);
            let run = || {
                compute_resolution(
                    &inputs(labels.clone()),
                    &tractogram,
                    &[],
                    &EngineSettings::default(),
                    &NoProgress,
                    &AbortHandle::new(),
                )
                .unwrap()
            };
            let (a, b) = (run(), run());
            prop_assert_eq!(a.classification, b.classification);
            prop_assert_eq!(a.aggregation.lengths, b.aggregation.lengths);
            prop_assert_eq!(a.graph.edges, b.graph.edges);
        }
    }
}
