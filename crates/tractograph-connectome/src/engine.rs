// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Multi-resolution orchestration.
//!
//! Every configured resolution is loaded, classified, aggregated and written
//! independently. A resolution that fails leaves no files behind and does not
//! stop the others; the outcome of each one is returned in a [`RunReport`].
//! Run-wide artifacts (filtered tractogram, endpoint arrays, curvature) are
//! written once, from the resolution that owns the filtered tractogram.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ndarray::Array1;
use rayon::prelude::*;
use tracing::{debug, error, info, warn};
use tractograph_config::{
    EngineConfig, EngineSettings, MetricKind, OutputFormat, ResolutionConfig,
};
use tractograph_observability::{LogProgress, PercentCounter, ProgressReporter};
use tractograph_serialization::{
    save_snapshot, write_graphml_file, write_json_graph, write_mat, write_npy, write_tsv_file,
    ArtifactTransaction, GraphSnapshot, SerializationError,
};
use tractograph_structures::{
    read_nifti, read_region_descriptions, read_trackvis, write_trackvis, ConnectivityGraph,
    ParcellationVolume, RegionDescription, RegionId, RegionNode, ScalarMap, Tractogram,
};

use crate::aggregator::{aggregate, Aggregation, MetricSettings, NamedScalarMap};
use crate::classifier::{classify, Classification, ClassificationCounts, LabelLookup};
use crate::curvature::mean_curvature_array;
use crate::endpoints::{endpoint_arrays, resolve_endpoints};
use crate::error::{ConnectomeError, Result};
use crate::regions::{build_region_nodes, label_geometry, undeclared_region_node};

const LOG_TARGET: &str = "tractograph-connectome";

/// Run-wide artifact names
pub const FILTERED_TRACTOGRAM: &str = "streamline_final.trk";
pub const ENDPOINTS_VOXEL: &str = "endpoints.npy";
pub const ENDPOINTS_MM: &str = "endpointsmm.npy";
pub const MEAN_CURVATURE: &str = "meancurvature.npy";

/// Shared cancellation flag.
///
/// Resolutions check it between stages; an aborted resolution publishes
/// nothing.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
    flag: Arc<AtomicBool>,
}

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    fn check(&self, resolution: &str) -> Result<()> {
        if self.is_aborted() {
            return Err(ConnectomeError::Aborted {
                resolution: resolution.to_string(),
            });
        }
        Ok(())
    }
}

/// Loaded inputs of one resolution
#[derive(Debug, Clone)]
pub struct ResolutionInputs {
    pub key: String,
    pub parcellation: ParcellationVolume,
    pub descriptions: Vec<RegionDescription>,
    pub number_of_regions: usize,
}

/// In-memory result of one resolution, before serialization
#[derive(Debug, Clone)]
pub struct ResolutionResult {
    pub key: String,
    pub number_of_regions: usize,
    pub voxel_size: [f64; 3],
    pub graph: ConnectivityGraph,
    pub classification: Classification,
    pub aggregation: Aggregation,
}

/// Outcome of a successful resolution
#[derive(Debug, Clone)]
pub struct ResolutionSummary {
    pub key: String,
    pub graph: ConnectivityGraph,
    pub counts: ClassificationCounts,
    pub scalar_discards: BTreeMap<String, usize>,
    /// Published artifact paths
    pub artifacts: Vec<PathBuf>,
}

/// Outcome of one resolution in a run
#[derive(Debug)]
pub struct ResolutionReport {
    pub key: String,
    pub outcome: Result<ResolutionSummary>,
}

/// Per-resolution outcomes plus the run-wide artifacts
#[derive(Debug, Default)]
pub struct RunReport {
    /// In configuration order
    pub resolutions: Vec<ResolutionReport>,
    /// Resolution that defined the filtered tractogram
    pub filtered_tractogram_owner: Option<String>,
    pub run_artifacts: Vec<PathBuf>,
}

impl RunReport {
    pub fn succeeded(&self) -> impl Iterator<Item = &ResolutionSummary> {
        self.resolutions.iter().filter_map(|r| r.outcome.as_ref().ok())
    }

    pub fn failed(&self) -> impl Iterator<Item = (&str, &ConnectomeError)> {
        self.resolutions
            .iter()
            .filter_map(|r| r.outcome.as_ref().err().map(|e| (r.key.as_str(), e)))
    }

    pub fn is_complete(&self) -> bool {
        self.resolutions.iter().all(|r| r.outcome.is_ok())
    }

    pub fn resolution(&self, key: &str) -> Option<&ResolutionReport> {
        self.resolutions.iter().find(|r| r.key == key)
    }
}

/// Classify, aggregate and assemble the graph of one resolution. Writes nothing.
pub fn compute_resolution(
    inputs: &ResolutionInputs,
    tractogram: &Tractogram,
    scalar_maps: &[NamedScalarMap],
    settings: &EngineSettings,
    progress: &dyn ProgressReporter,
    abort: &AbortHandle,
) -> Result<ResolutionResult> {
    let key = inputs.key.as_str();
    abort.check(key)?;

    let voxel_size = inputs.parcellation.voxel_size();
    let endpoints = resolve_endpoints(tractogram, voxel_size, settings.endpoint_rounding);
    let lookup = LabelLookup::from_descriptions(&inputs.descriptions, inputs.number_of_regions);
    let counter = PercentCounter::new(progress, key, "classify", endpoints.len());
    let classification = classify(
        &endpoints,
        &inputs.parcellation,
        &lookup,
        settings.allow_self_connections,
        &counter,
    );
    abort.check(key)?;

    let geometry = label_geometry(&inputs.parcellation);
    let mut nodes: BTreeMap<RegionId, RegionNode> =
        build_region_nodes(key, &inputs.descriptions, &geometry)
            .into_iter()
            .map(|node| (node.label(), node))
            .collect();
    for pair in classification.valid_pairs() {
        for label in [pair.source(), pair.target()] {
            nodes
                .entry(label)
                .or_insert_with(|| undeclared_region_node(label, &geometry));
        }
    }

    let aggregation = aggregate(
        tractogram,
        &classification,
        &nodes,
        scalar_maps,
        &MetricSettings::from_engine(settings),
        progress,
        key,
    );
    abort.check(key)?;

    let mut graph = ConnectivityGraph::new(key);
    for node in nodes.into_values() {
        graph.add_node(node);
    }
    for (edge, metrics) in &aggregation.edges {
        graph.insert_edge(edge.source(), edge.target(), metrics.clone());
    }

    log_summary(key, &classification.counts, &aggregation, inputs.number_of_regions);

    Ok(ResolutionResult {
        key: key.to_string(),
        number_of_regions: inputs.number_of_regions,
        voxel_size,
        graph,
        classification,
        aggregation,
    })
}

fn log_summary(
    key: &str,
    counts: &ClassificationCounts,
    aggregation: &Aggregation,
    number_of_regions: usize,
) {
    info!(
        target: LOG_TARGET,
        "[{}] {} streamlines: {} valid in {} edges, {} orphans ({:.2}%: {} out of volume, {} unlabeled endpoint)",
        key,
        counts.total,
        counts.valid,
        aggregation.edges.len(),
        counts.orphans(),
        counts.percent(counts.orphans()),
        counts.out_of_volume,
        counts.unlabeled
    );
    if counts.label_range > 0 {
        error!(
            target: LOG_TARGET,
            "[{}] {} streamlines ({:.2}%) end on labels outside 1..={}; parcellation and region description disagree",
            key,
            counts.label_range,
            counts.percent(counts.label_range),
            number_of_regions
        );
    }
    if counts.self_connections > 0 {
        info!(
            target: LOG_TARGET,
            "[{}] {} self-connecting streamlines excluded",
            key,
            counts.self_connections
        );
    }
    for (name, discarded) in &aggregation.scalar_discards {
        if *discarded > 0 {
            warn!(
                target: LOG_TARGET,
                "[{}] scalar map '{}': {} streamlines leave the map and were not sampled",
                key,
                name,
                discarded
            );
        }
    }
}

/// Stage and publish every per-resolution artifact in `output_dir`
pub fn write_resolution_artifacts(
    result: &ResolutionResult,
    settings: &EngineSettings,
    output_dir: &Path,
    abort: &AbortHandle,
) -> Result<Vec<PathBuf>> {
    let key = result.key.as_str();
    let graph = &result.graph;
    let mut transaction = ArtifactTransaction::new(output_dir)
        .map_err(ConnectomeError::serialization(key, "output directory"))?;

    for format in settings.effective_output_formats() {
        let name = format!("connectome_{}.{}", key, format.file_extension());
        transaction
            .write_with(&name, |path| match format {
                OutputFormat::Tsv => write_tsv_file(path, graph),
                OutputFormat::Json => write_json_graph(path, graph),
                OutputFormat::Snapshot => {
                    let mut snapshot = GraphSnapshot::new(graph.clone());
                    snapshot.metadata.description = format!("connectome {}", key);
                    save_snapshot(&snapshot, path)
                }
                OutputFormat::Mat => write_mat(path, graph, result.number_of_regions),
                OutputFormat::Graphml => write_graphml_file(path, graph),
            })
            .map_err(ConnectomeError::serialization(key, format.name()))?;
    }

    transaction
        .write_with(&format!("final_fiberslength_{}.npy", key), |path| {
            write_npy(path, &Array1::from(result.aggregation.lengths.clone()))
        })
        .map_err(ConnectomeError::serialization(key, "fiber length array"))?;
    transaction
        .write_with(&format!("filtered_fiberslabel_{}.npy", key), |path| {
            write_npy(path, &result.classification.label_rows())
        })
        .map_err(ConnectomeError::serialization(key, "fiber label array"))?;
    transaction
        .write_with(&format!("final_fiberlabels_{}.npy", key), |path| {
            write_npy(path, &result.classification.valid_label_rows())
        })
        .map_err(ConnectomeError::serialization(key, "valid fiber label array"))?;

    // Dropping the transaction removes the staged files
    abort.check(key)?;
    transaction
        .commit()
        .map_err(ConnectomeError::serialization(key, "artifact commit"))
}

/// Whether `key` occurs in `name` delimited by non-alphanumeric characters,
/// so `scale1` matches `ROIv_scale1.nii.gz` but not `ROIv_scale125.nii.gz`
fn contains_token(name: &str, key: &str) -> bool {
    let is_delimiter = |c: Option<char>| c.map_or(true, |c| !c.is_ascii_alphanumeric());
    !key.is_empty()
        && name.match_indices(key).any(|(start, _)| {
            is_delimiter(name[..start].chars().next_back())
                && is_delimiter(name[start + key.len()..].chars().next())
        })
}

/// Parcellation volume for a resolution: the explicit path, else the first
/// candidate volume whose file name holds the resolution key as a token
pub fn parcellation_path(resolution: &ResolutionConfig, candidates: &[PathBuf]) -> Option<PathBuf> {
    if let Some(path) = &resolution.parcellation {
        return Some(path.clone());
    }
    candidates
        .iter()
        .find(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| contains_token(name, &resolution.key))
        })
        .cloned()
}

/// Load the parcellation and region description of one resolution
pub fn load_resolution_inputs(
    resolution: &ResolutionConfig,
    candidates: &[PathBuf],
) -> Result<ResolutionInputs> {
    let key = resolution.key.as_str();

    let description_path = resolution
        .region_description
        .as_deref()
        .ok_or_else(|| ConnectomeError::missing(key, "region description", None))?;
    if !description_path.exists() {
        return Err(ConnectomeError::missing(
            key,
            "region description",
            Some(description_path),
        ));
    }
    let volume_path = parcellation_path(resolution, candidates)
        .ok_or_else(|| ConnectomeError::missing(key, "parcellation volume", None))?;
    if !volume_path.exists() {
        return Err(ConnectomeError::missing(
            key,
            "parcellation volume",
            Some(volume_path.as_path()),
        ));
    }

    let descriptions =
        read_region_descriptions(description_path).map_err(|source| ConnectomeError::InvalidInput {
            resolution: key.to_string(),
            what: "region description",
            source,
        })?;
    let parcellation: ParcellationVolume =
        read_nifti::<i64, _>(&volume_path).map_err(|source| ConnectomeError::InvalidInput {
            resolution: key.to_string(),
            what: "parcellation volume",
            source,
        })?;
    let number_of_regions = resolution.number_of_regions.unwrap_or(descriptions.len());

    debug!(
        target: LOG_TARGET,
        "[{}] {} regions declared, volume {:?} at {:?} mm ({})",
        key,
        number_of_regions,
        parcellation.shape(),
        parcellation.voxel_size(),
        volume_path.display()
    );

    Ok(ResolutionInputs {
        key: key.to_string(),
        parcellation,
        descriptions,
        number_of_regions,
    })
}

/// Builds connectomes for every configured resolution
pub struct ConnectomeEngine {
    config: EngineConfig,
    progress: Arc<dyn ProgressReporter>,
    abort: AbortHandle,
}

impl ConnectomeEngine {
    /// Engine reporting progress through the log
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            progress: Arc::new(LogProgress::default()),
            abort: AbortHandle::new(),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Handle that cancels the resolutions that have not finished yet
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Load the configured tractogram and run every resolution
    pub fn run(&self) -> Result<RunReport> {
        let path = self
            .config
            .input
            .tractogram
            .as_deref()
            .ok_or_else(|| ConnectomeError::InvalidConfig("no tractogram configured".into()))?;
        let tractogram = read_trackvis(path).map_err(|source| ConnectomeError::RunInput {
            what: "tractogram",
            path: path.to_path_buf(),
            source,
        })?;
        info!(
            target: LOG_TARGET,
            "Loaded {} streamlines ({} points) from {}",
            tractogram.len(),
            tractogram.total_points(),
            path.display()
        );
        self.run_with_tractogram(&tractogram)
    }

    /// Run every resolution against an already loaded tractogram
    pub fn run_with_tractogram(&self, tractogram: &Tractogram) -> Result<RunReport> {
        let resolutions = self.config.effective_resolutions();
        if resolutions.is_empty() {
            return Err(ConnectomeError::InvalidConfig(
                "no resolutions configured".into(),
            ));
        }
        let scalar_maps = self.load_scalar_maps()?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.engine.num_threads)
            .build()
            .map_err(|e| ConnectomeError::ThreadPool(e.to_string()))?;

        let outcomes: Vec<Result<(ResolutionResult, Vec<PathBuf>)>> = pool.install(|| {
            resolutions
                .par_iter()
                .map(|resolution| self.process_resolution(resolution, tractogram, &scalar_maps))
                .collect()
        });

        let mut report = RunReport::default();
        let mut results = Vec::new();
        for (resolution, outcome) in resolutions.iter().zip(outcomes) {
            let outcome = match outcome {
                Ok((result, artifacts)) => {
                    let summary = ResolutionSummary {
                        key: result.key.clone(),
                        graph: result.graph.clone(),
                        counts: result.classification.counts,
                        scalar_discards: result.aggregation.scalar_discards.clone(),
                        artifacts,
                    };
                    results.push(result);
                    Ok(summary)
                }
                Err(e) => {
                    error!(target: LOG_TARGET, "{}", e);
                    Err(e)
                }
            };
            report.resolutions.push(ResolutionReport {
                key: resolution.key.clone(),
                outcome,
            });
        }

        if self.abort.is_aborted() {
            warn!(target: LOG_TARGET, "Run aborted; run-wide artifacts not written");
            return Ok(report);
        }

        let owner = match self.config.engine.filtered_tractogram_owner.as_deref() {
            Some(key) => results.iter().find(|r| r.key == key),
            None => results.first(),
        };
        match owner {
            Some(owner) => {
                report.run_artifacts = pool.install(|| self.write_run_artifacts(owner, tractogram))?;
                report.filtered_tractogram_owner = Some(owner.key.clone());
            }
            None => warn!(
                target: LOG_TARGET,
                "No resolution available to define the filtered tractogram; run-wide artifacts not written"
            ),
        }

        info!(
            target: LOG_TARGET,
            "Run finished: {} of {} resolutions succeeded",
            report.succeeded().count(),
            report.resolutions.len()
        );
        Ok(report)
    }

    fn load_scalar_maps(&self) -> Result<Vec<NamedScalarMap>> {
        if !self.config.engine.metric_enabled(MetricKind::ScalarMaps) {
            return Ok(Vec::new());
        }
        self.config
            .scalar_maps
            .iter()
            .map(|entry| {
                let map: ScalarMap =
                    read_nifti::<f64, _>(&entry.path).map_err(|source| ConnectomeError::RunInput {
                        what: "scalar map",
                        path: entry.path.clone(),
                        source,
                    })?;
                Ok(NamedScalarMap {
                    name: entry.name.clone(),
                    map,
                })
            })
            .collect()
    }

    fn process_resolution(
        &self,
        resolution: &ResolutionConfig,
        tractogram: &Tractogram,
        scalar_maps: &[NamedScalarMap],
    ) -> Result<(ResolutionResult, Vec<PathBuf>)> {
        self.abort.check(&resolution.key)?;
        let inputs = load_resolution_inputs(resolution, &self.config.input.candidate_volumes)?;
        let result = compute_resolution(
            &inputs,
            tractogram,
            scalar_maps,
            &self.config.engine,
            self.progress.as_ref(),
            &self.abort,
        )?;
        let artifacts = write_resolution_artifacts(
            &result,
            &self.config.engine,
            &self.config.engine.output_dir,
            &self.abort,
        )?;
        Ok((result, artifacts))
    }

    fn write_run_artifacts(
        &self,
        owner: &ResolutionResult,
        tractogram: &Tractogram,
    ) -> Result<Vec<PathBuf>> {
        let key = owner.key.as_str();
        let settings = &self.config.engine;
        let mut transaction = ArtifactTransaction::new(&settings.output_dir)
            .map_err(ConnectomeError::serialization(key, "output directory"))?;

        transaction
            .write_with(FILTERED_TRACTOGRAM, |path| {
                let filtered = tractogram.subset(&owner.classification.valid_fiber_indices)?;
                write_trackvis(path, &filtered).map_err(SerializationError::from)
            })
            .map_err(ConnectomeError::serialization(key, "filtered tractogram"))?;

        let (voxels, millimetres) =
            endpoint_arrays(tractogram, owner.voxel_size, settings.endpoint_rounding);
        transaction
            .write_with(ENDPOINTS_VOXEL, |path| write_npy(path, &voxels))
            .map_err(ConnectomeError::serialization(key, "endpoint array"))?;
        transaction
            .write_with(ENDPOINTS_MM, |path| write_npy(path, &millimetres))
            .map_err(ConnectomeError::serialization(key, "endpoint array"))?;

        if settings.compute_curvature {
            let curvature = mean_curvature_array(tractogram);
            transaction
                .write_with(MEAN_CURVATURE, |path| write_npy(path, &curvature))
                .map_err(ConnectomeError::serialization(key, "curvature array"))?;
        }

        let published = transaction
            .commit()
            .map_err(ConnectomeError::serialization(key, "artifact commit"))?;
        info!(
            target: LOG_TARGET,
            "[{}] Filtered tractogram: {} of {} streamlines",
            key,
            owner.classification.valid_fiber_indices.len(),
            tractogram.len()
        );
        Ok(published)
    }
}
