// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration type definitions
//!
//! This module defines all configuration structs that map to sections in
//! `tractograph.toml`.

use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::schemes::ParcellationScheme;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    pub engine: EngineSettings,
    pub input: InputConfig,
    pub resolutions: Vec<ResolutionConfig>,
    pub scalar_maps: Vec<ScalarMapConfig>,
    pub logging: LoggingConfig,
}

impl EngineConfig {
    /// Resolutions to process, with the parcellation scheme applied.
    ///
    /// For a built-in scheme with no explicit `[[resolutions]]`, one entry per
    /// scheme resolution is produced. Explicit entries whose key matches a
    /// scheme resolution inherit its region count when they do not set one.
    pub fn effective_resolutions(&self) -> Vec<ResolutionConfig> {
        let scheme = self.input.parcellation_scheme.resolutions();

        if self.resolutions.is_empty() {
            return scheme
                .iter()
                .map(|res| ResolutionConfig {
                    key: res.key.to_string(),
                    parcellation: None,
                    region_description: None,
                    number_of_regions: Some(res.number_of_regions),
                })
                .collect();
        }

        self.resolutions
            .iter()
            .map(|res| {
                let mut res = res.clone();
                if res.number_of_regions.is_none() {
                    res.number_of_regions = scheme
                        .iter()
                        .find(|s| s.key == res.key)
                        .map(|s| s.number_of_regions);
                }
                res
            })
            .collect()
    }
}

/// Engine behaviour: which metrics, which formats, and how ambiguous cases resolve
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Compute per-streamline mean curvature (written once per run)
    pub compute_curvature: bool,
    pub metrics: BTreeSet<MetricKind>,
    /// TSV is always written, whether listed or not
    pub output_formats: BTreeSet<OutputFormat>,
    pub output_dir: PathBuf,
    /// Worker threads (0 = one per core)
    pub num_threads: usize,
    pub endpoint_rounding: EndpointRounding,
    pub allow_self_connections: bool,
    pub total_volume: TotalVolumeMode,
    /// Resolution whose valid fibers define `streamline_final.trk`
    pub filtered_tractogram_owner: Option<String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            compute_curvature: false,
            metrics: MetricKind::all().into_iter().collect(),
            output_formats: [OutputFormat::Tsv, OutputFormat::Json].into_iter().collect(),
            output_dir: PathBuf::from("connectome"),
            num_threads: 0,
            endpoint_rounding: EndpointRounding::Truncate,
            allow_self_connections: true,
            total_volume: TotalVolumeMode::EdgeNodes,
            filtered_tractogram_owner: None,
        }
    }
}

impl EngineSettings {
    /// Output formats to write, always including TSV
    pub fn effective_output_formats(&self) -> BTreeSet<OutputFormat> {
        let mut formats = self.output_formats.clone();
        formats.insert(OutputFormat::Tsv);
        formats
    }

    pub fn metric_enabled(&self, kind: MetricKind) -> bool {
        kind == MetricKind::FiberNumber || self.metrics.contains(&kind)
    }
}

/// Per-edge connectivity metrics that can be enabled
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// `number_of_fibers`; always computed
    FiberNumber,
    /// `fiber_length_mean`, `fiber_length_median`, `fiber_length_std`
    FiberLength,
    FiberDensity,
    FiberProportion,
    NormalizedFiberDensity,
    /// `<map>_mean`, `<map>_median`, `<map>_std` for every configured scalar map
    ScalarMaps,
}

impl MetricKind {
    pub fn all() -> [MetricKind; 6] {
        [
            MetricKind::FiberNumber,
            MetricKind::FiberLength,
            MetricKind::FiberDensity,
            MetricKind::FiberProportion,
            MetricKind::NormalizedFiberDensity,
            MetricKind::ScalarMaps,
        ]
    }
}

/// Connectome artifact formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Edge-list table
    Tsv,
    /// Versioned JSON graph document
    Json,
    /// Versioned binary graph snapshot
    Snapshot,
    /// MATLAB v5 struct of dense matrices
    Mat,
    Graphml,
}

impl OutputFormat {
    pub fn file_extension(self) -> &'static str {
        match self {
            OutputFormat::Tsv => "tsv",
            OutputFormat::Json => "json",
            OutputFormat::Snapshot => "snapshot",
            OutputFormat::Mat => "mat",
            OutputFormat::Graphml => "graphml",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            OutputFormat::Tsv => "TSV",
            OutputFormat::Json => "JSON",
            OutputFormat::Snapshot => "snapshot",
            OutputFormat::Mat => "MAT",
            OutputFormat::Graphml => "GraphML",
        }
    }
}

/// How a millimetre endpoint is mapped onto a voxel index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointRounding {
    /// Truncate toward zero (default)
    #[default]
    Truncate,
    Nearest,
}

/// Which regions contribute to `total_volume` in the normalized density
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TotalVolumeMode {
    /// Regions touched by at least one edge (default)
    #[default]
    EdgeNodes,
    AllNodes,
}

/// Run inputs shared by all resolutions
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct InputConfig {
    /// TrackVis tractogram
    pub tractogram: Option<PathBuf>,
    pub parcellation_scheme: ParcellationScheme,
    /// Parcellation volumes matched to resolutions by file name when a
    /// resolution has no explicit `parcellation`
    pub candidate_volumes: Vec<PathBuf>,
}

/// One parcellation resolution ("scale")
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ResolutionConfig {
    pub key: String,
    pub parcellation: Option<PathBuf>,
    pub region_description: Option<PathBuf>,
    pub number_of_regions: Option<usize>,
}

/// Auxiliary scalar volume sampled along streamlines
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ScalarMapConfig {
    pub name: String,
    pub path: PathBuf,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file_logging: bool,
    pub log_dir: Option<PathBuf>,
    pub retention_days: u64,
    pub retention_runs: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_logging: false,
            log_dir: None,
            retention_days: 30,
            retention_runs: 10,
        }
    }
}
