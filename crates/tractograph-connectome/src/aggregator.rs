// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Metric aggregation: valid streamlines grouped by edge, reduced to
//! per-edge statistics.
//!
//! Groups are formed in streamline order and reduced independently, so every
//! edge sees its members in the same order regardless of thread count.

use std::collections::{BTreeMap, BTreeSet};

use ahash::AHashMap;
use rayon::prelude::*;
use tractograph_config::{EndpointRounding, EngineSettings, MetricKind, TotalVolumeMode};
use tractograph_observability::{PercentCounter, ProgressReporter};
use tractograph_structures::{
    EdgeKey, EdgeMetrics, RegionId, RegionNode, ScalarMap, ScalarStats, Streamline, Tractogram,
};

use crate::classifier::Classification;
use crate::endpoints::voxel_index;

/// Which optional metrics to compute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricSettings {
    pub fiber_length: bool,
    pub fiber_density: bool,
    pub fiber_proportion: bool,
    pub normalized_fiber_density: bool,
    pub scalar_maps: bool,
    pub total_volume: TotalVolumeMode,
}

impl MetricSettings {
    pub fn all() -> Self {
        Self {
            fiber_length: true,
            fiber_density: true,
            fiber_proportion: true,
            normalized_fiber_density: true,
            scalar_maps: true,
            total_volume: TotalVolumeMode::EdgeNodes,
        }
    }

    pub fn from_engine(settings: &EngineSettings) -> Self {
        Self {
            fiber_length: settings.metric_enabled(MetricKind::FiberLength),
            fiber_density: settings.metric_enabled(MetricKind::FiberDensity),
            fiber_proportion: settings.metric_enabled(MetricKind::FiberProportion),
            normalized_fiber_density: settings
                .metric_enabled(MetricKind::NormalizedFiberDensity),
            scalar_maps: settings.metric_enabled(MetricKind::ScalarMaps),
            total_volume: settings.total_volume,
        }
    }
}

/// A scalar volume and the metric prefix it is reported under
#[derive(Debug, Clone)]
pub struct NamedScalarMap {
    pub name: String,
    pub map: ScalarMap,
}

/// Mean, median and population standard deviation, ignoring NaNs.
///
/// All-NaN or empty input yields NaN for every statistic.
pub fn nan_stats(values: &[f64]) -> ScalarStats {
    let mut finite: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if finite.is_empty() {
        return ScalarStats {
            mean: f64::NAN,
            median: f64::NAN,
            std: f64::NAN,
        };
    }

    let n = finite.len() as f64;
    let mean = finite.iter().sum::<f64>() / n;
    let variance = finite.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;

    finite.sort_by(|a, b| a.total_cmp(b));
    let mid = finite.len() / 2;
    let median = if finite.len() % 2 == 1 {
        finite[mid]
    } else {
        (finite[mid - 1] + finite[mid]) / 2.0
    };

    ScalarStats {
        mean,
        median,
        std: variance.sqrt(),
    }
}

/// Arc length of each streamline at `indices`
pub fn fiber_lengths(tractogram: &Tractogram, indices: &[usize]) -> Vec<f64> {
    indices
        .par_iter()
        .map(|&index| tractogram.streamline(index).length())
        .collect()
}

/// Values of `map` at every point of `streamline` (nearest voxel, map's own
/// voxel size); `None` if any point falls outside the map
pub fn sample_streamline(streamline: &Streamline<'_>, map: &ScalarMap) -> Option<Vec<f64>> {
    let voxel_size = map.voxel_size();
    streamline
        .points
        .iter()
        .map(|point| {
            let index = voxel_index(point, voxel_size, EndpointRounding::Nearest)?;
            map.get(index)
        })
        .collect()
}

/// Edge groups in canonical edge order; members are positions in
/// `valid_fiber_indices`, ascending
pub fn group_by_edge(classification: &Classification) -> Vec<(EdgeKey, Vec<usize>)> {
    let mut groups: AHashMap<EdgeKey, Vec<usize>> = AHashMap::new();
    for (position, key) in classification.valid_pairs().enumerate() {
        groups.entry(key).or_default().push(position);
    }
    let mut groups: Vec<(EdgeKey, Vec<usize>)> = groups.into_iter().collect();
    groups.sort_unstable_by_key(|(key, _)| *key);
    groups
}

/// Summed volume used by the normalized density
pub fn total_volume(
    nodes: &BTreeMap<RegionId, RegionNode>,
    edges: impl Iterator<Item = EdgeKey>,
    mode: TotalVolumeMode,
) -> usize {
    let volume = |label: &RegionId| nodes.get(label).map_or(0, |n| n.volume);
    match mode {
        TotalVolumeMode::AllNodes => nodes.values().map(|n| n.volume).sum(),
        TotalVolumeMode::EdgeNodes => {
            let touched: BTreeSet<RegionId> =
                edges.flat_map(|k| [k.source(), k.target()]).collect();
            touched.iter().map(volume).sum()
        }
    }
}

/// Result of aggregating one resolution
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregation {
    pub edges: BTreeMap<EdgeKey, EdgeMetrics>,
    /// Arc length of each valid streamline, parallel to `valid_fiber_indices`
    pub lengths: Vec<f64>,
    /// Per scalar map, fibers dropped from sampling for leaving the map
    pub scalar_discards: BTreeMap<String, usize>,
    pub total_volume: usize,
}

struct EdgeContext<'a> {
    tractogram: &'a Tractogram,
    valid: &'a [usize],
    lengths: &'a [f64],
    nodes: &'a BTreeMap<RegionId, RegionNode>,
    scalar_maps: &'a [NamedScalarMap],
    settings: &'a MetricSettings,
    total_valid: usize,
    total_volume: usize,
}

impl EdgeContext<'_> {
    fn volume(&self, label: RegionId) -> f64 {
        self.nodes.get(&label).map_or(0.0, |n| n.volume as f64)
    }

    fn metrics(&self, key: EdgeKey, members: &[usize]) -> (EdgeMetrics, Vec<usize>) {
        let n = members.len() as f64;
        let lengths: Vec<f64> = members.iter().map(|&p| self.lengths[p]).collect();
        let length_stats = nan_stats(&lengths);
        let mean_length = length_stats.mean;

        let pair_volume = self.volume(key.source()) + self.volume(key.target());
        let degenerate = !(mean_length > 0.0 && mean_length.is_finite())
            || self.volume(key.source()) == 0.0
            || self.volume(key.target()) == 0.0;

        let mut metrics = EdgeMetrics {
            number_of_fibers: members.len(),
            ..EdgeMetrics::default()
        };
        if self.settings.fiber_length {
            metrics.fiber_length = Some(length_stats);
        }
        if self.settings.fiber_density {
            metrics.fiber_density = Some(if degenerate {
                0.0
            } else {
                n / mean_length * 2.0 / pair_volume
            });
        }
        if self.settings.normalized_fiber_density {
            metrics.normalized_fiber_density = Some(if degenerate {
                0.0
            } else {
                (n / self.total_valid as f64) / mean_length * 2.0 * self.total_volume as f64
                    / pair_volume
            });
        }
        if self.settings.fiber_proportion {
            metrics.fiber_proportion = Some(100.0 * n / self.total_valid as f64);
        }

        let mut discards = vec![0; self.scalar_maps.len()];
        if self.settings.scalar_maps {
            for (slot, named) in self.scalar_maps.iter().enumerate() {
                let mut samples = Vec::new();
                for &position in members {
                    let streamline = self.tractogram.streamline(self.valid[position]);
                    match sample_streamline(&streamline, &named.map) {
                        Some(values) => samples.extend(values),
                        None => discards[slot] += 1,
                    }
                }
                metrics
                    .scalars
                    .insert(named.name.clone(), nan_stats(&samples));
            }
        }
        (metrics, discards)
    }
}

/// Compute per-edge metrics for one resolution
pub fn aggregate(
    tractogram: &Tractogram,
    classification: &Classification,
    nodes: &BTreeMap<RegionId, RegionNode>,
    scalar_maps: &[NamedScalarMap],
    settings: &MetricSettings,
    progress: &dyn ProgressReporter,
    scope: &str,
) -> Aggregation {
    let valid = &classification.valid_fiber_indices;
    let lengths = fiber_lengths(tractogram, valid);
    let groups = group_by_edge(classification);
    let counter = PercentCounter::new(progress, scope, "aggregate", groups.len());
    let total_volume = total_volume(nodes, groups.iter().map(|(k, _)| *k), settings.total_volume);

    let context = EdgeContext {
        tractogram,
        valid,
        lengths: &lengths,
        nodes,
        scalar_maps,
        settings,
        total_valid: valid.len(),
        total_volume,
    };

    let computed: Vec<(EdgeKey, EdgeMetrics, Vec<usize>)> = groups
        .par_iter()
        .map(|(key, members)| {
            let (metrics, discards) = context.metrics(*key, members);
            counter.tick();
            (*key, metrics, discards)
        })
        .collect();

    let mut scalar_discards: BTreeMap<String, usize> = scalar_maps
        .iter()
        .map(|named| (named.name.clone(), 0))
        .collect();
    let mut edges = BTreeMap::new();
    for (key, metrics, discards) in computed {
        for (named, count) in scalar_maps.iter().zip(discards) {
            *scalar_discards.entry(named.name.clone()).or_default() += count;
        }
        edges.insert(key, metrics);
    }

    Aggregation {
        edges,
        lengths,
        scalar_discards,
        total_volume,
    }
}
