// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Typed connectivity graph: region nodes plus canonical, metric-carrying edges.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{Result, StructuresError};
use crate::regions::RegionDescription;

pub type RegionId = u32;

/// Unordered region pair stored as `(min, max)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EdgeKey(RegionId, RegionId);

impl EdgeKey {
    pub fn new(u: RegionId, v: RegionId) -> Self {
        if v < u {
            EdgeKey(v, u)
        } else {
            EdgeKey(u, v)
        }
    }

    pub fn source(self) -> RegionId {
        self.0
    }

    pub fn target(self) -> RegionId {
        self.1
    }

    pub fn is_self_loop(self) -> bool {
        self.0 == self.1
    }
}

/// Per-streamline classification outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FiberLabel {
    /// Valid fiber, canonical pair
    Pair(EdgeKey),
    /// An endpoint fell outside the volume or on background
    Orphan,
    /// Dropped without being an orphan (label out of range or disallowed self pair)
    Excluded,
}

impl FiberLabel {
    /// Row of the per-streamline label array: the pair, `(-1, -1)` or `(0, 0)`
    pub fn as_row(self) -> [i32; 2] {
        match self {
            FiberLabel::Pair(key) => [key.source() as i32, key.target() as i32],
            FiberLabel::Orphan => [-1, -1],
            FiberLabel::Excluded => [0, 0],
        }
    }

    pub fn pair(self) -> Option<EdgeKey> {
        match self {
            FiberLabel::Pair(key) => Some(key),
            _ => None,
        }
    }
}

/// A graph node: region description plus geometry from the label volume
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionNode {
    pub description: RegionDescription,
    /// Mean voxel coordinate; `None` when the label has no voxels
    pub centroid: Option<[f64; 3]>,
    /// Voxel count
    pub volume: usize,
}

impl RegionNode {
    pub fn label(&self) -> RegionId {
        self.description.label
    }

    /// Centroid, or NaNs for a label with no voxels
    pub fn centroid_or_nan(&self) -> [f64; 3] {
        self.centroid.unwrap_or([f64::NAN; 3])
    }
}

/// Mean, median and population standard deviation of a sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScalarStats {
    pub mean: f64,
    pub median: f64,
    pub std: f64,
}

pub const NUMBER_OF_FIBERS: &str = "number_of_fibers";
pub const FIBER_LENGTH_MEAN: &str = "fiber_length_mean";
pub const FIBER_LENGTH_MEDIAN: &str = "fiber_length_median";
pub const FIBER_LENGTH_STD: &str = "fiber_length_std";
pub const FIBER_DENSITY: &str = "fiber_density";
pub const NORMALIZED_FIBER_DENSITY: &str = "normalized_fiber_density";
pub const FIBER_PROPORTION: &str = "fiber_proportion";

/// Metrics of one edge; disabled metrics stay `None`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EdgeMetrics {
    pub number_of_fibers: usize,
    pub fiber_length: Option<ScalarStats>,
    pub fiber_density: Option<f64>,
    pub normalized_fiber_density: Option<f64>,
    pub fiber_proportion: Option<f64>,
    /// Scalar-map statistics keyed by map name
    pub scalars: BTreeMap<String, ScalarStats>,
}

fn push_stats(entries: &mut Vec<(String, f64)>, prefix: &str, stats: &ScalarStats) {
    entries.push((format!("{}_mean", prefix), stats.mean));
    entries.push((format!("{}_median", prefix), stats.median));
    entries.push((format!("{}_std", prefix), stats.std));
}

impl EdgeMetrics {
    /// Flat `(metric key, value)` pairs, sorted by key
    pub fn entries(&self) -> Vec<(String, f64)> {
        let mut entries = vec![(NUMBER_OF_FIBERS.to_string(), self.number_of_fibers as f64)];
        if let Some(stats) = &self.fiber_length {
            push_stats(&mut entries, "fiber_length", stats);
        }
        if let Some(value) = self.fiber_density {
            entries.push((FIBER_DENSITY.to_string(), value));
        }
        if let Some(value) = self.normalized_fiber_density {
            entries.push((NORMALIZED_FIBER_DENSITY.to_string(), value));
        }
        if let Some(value) = self.fiber_proportion {
            entries.push((FIBER_PROPORTION.to_string(), value));
        }
        for (name, stats) in &self.scalars {
            push_stats(&mut entries, name, stats);
        }
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Value of one flat metric key
    pub fn get(&self, key: &str) -> Option<f64> {
        self.entries()
            .into_iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value)
    }

    /// Rebuild metrics from flat pairs (the inverse of [`EdgeMetrics::entries`])
    ///
    /// # Errors
    /// `number_of_fibers` must be present and a non-negative integer; every
    /// other key must be a built-in metric or a `<map>_{mean,median,std}` triple.
    pub fn from_entries<I, K>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, f64)>,
        K: AsRef<str>,
    {
        let mut number_of_fibers = None;
        let mut metrics = EdgeMetrics::default();
        let mut partial: BTreeMap<String, [Option<f64>; 3]> = BTreeMap::new();

        for (key, value) in entries {
            let key = key.as_ref();
            match key {
                NUMBER_OF_FIBERS => {
                    if value < 0.0 || value.fract() != 0.0 {
                        return Err(StructuresError::BadParameters(format!(
                            "number_of_fibers must be a non-negative integer, got {}",
                            value
                        )));
                    }
                    number_of_fibers = Some(value as usize);
                }
                FIBER_DENSITY => metrics.fiber_density = Some(value),
                NORMALIZED_FIBER_DENSITY => metrics.normalized_fiber_density = Some(value),
                FIBER_PROPORTION => metrics.fiber_proportion = Some(value),
                _ => {
                    let (prefix, slot) = if let Some(p) = key.strip_suffix("_mean") {
                        (p, 0)
                    } else if let Some(p) = key.strip_suffix("_median") {
                        (p, 1)
                    } else if let Some(p) = key.strip_suffix("_std") {
                        (p, 2)
                    } else {
                        return Err(StructuresError::BadParameters(format!(
                            "unknown metric '{}'",
                            key
                        )));
                    };
                    partial.entry(prefix.to_string()).or_default()[slot] = Some(value);
                }
            }
        }

        metrics.number_of_fibers = number_of_fibers.ok_or_else(|| {
            StructuresError::BadParameters("edge is missing number_of_fibers".to_string())
        })?;

        for (prefix, slots) in partial {
            let [Some(mean), Some(median), Some(std)] = slots else {
                return Err(StructuresError::BadParameters(format!(
                    "incomplete statistics for '{}'",
                    prefix
                )));
            };
            let stats = ScalarStats { mean, median, std };
            if prefix == "fiber_length" {
                metrics.fiber_length = Some(stats);
            } else {
                metrics.scalars.insert(prefix, stats);
            }
        }

        Ok(metrics)
    }
}

/// Connectome of one resolution
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectivityGraph {
    pub resolution: String,
    pub nodes: BTreeMap<RegionId, RegionNode>,
    pub edges: BTreeMap<EdgeKey, EdgeMetrics>,
}

impl ConnectivityGraph {
    pub fn new(resolution: impl Into<String>) -> Self {
        Self {
            resolution: resolution.into(),
            ..Self::default()
        }
    }

    pub fn add_node(&mut self, node: RegionNode) {
        self.nodes.insert(node.label(), node);
    }

    /// Insert or replace the edge `{u, v}`
    pub fn insert_edge(&mut self, u: RegionId, v: RegionId, metrics: EdgeMetrics) -> EdgeKey {
        let key = EdgeKey::new(u, v);
        self.edges.insert(key, metrics);
        key
    }

    /// Edge `{u, v}` in either orientation
    pub fn edge(&self, u: RegionId, v: RegionId) -> Option<&EdgeMetrics> {
        self.edges.get(&EdgeKey::new(u, v))
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Union of flat metric keys across all edges, sorted
    pub fn metric_keys(&self) -> Vec<String> {
        let keys: BTreeSet<String> = self
            .edges
            .values()
            .flat_map(|metrics| metrics.entries().into_iter().map(|(key, _)| key))
            .collect();
        keys.into_iter().collect()
    }

    /// Sum of `number_of_fibers` over all edges
    pub fn total_fibers(&self) -> usize {
        self.edges.values().map(|m| m.number_of_fibers).sum()
    }
}
