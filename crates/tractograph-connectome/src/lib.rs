// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Tractograph Connectome Engine
//!
//! Turns a tractogram and one or more parcellation volumes into weighted
//! region graphs.
//!
//! ## Pipeline (per resolution)
//! 1. [`endpoints`]: first/last streamline point to voxel index
//! 2. [`classifier`]: endpoint labels to a canonical region pair or a rejection
//! 3. [`regions`]: node centroid and volume from the label volume
//! 4. [`aggregator`]: per-edge statistics over the valid streamlines
//! 5. [`engine`]: artifacts staged and published per resolution
//!
//! ```rust,no_run
//! use tractograph_config::load_config;
//! use tractograph_connectome::ConnectomeEngine;
//!
//! let config = load_config(None, None).unwrap();
//! let report = ConnectomeEngine::new(config).run().unwrap();
//! for (key, err) in report.failed() {
//!     eprintln!("{}: {}", key, err);
//! }
//! ```

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod aggregator;
pub mod classifier;
pub mod curvature;
pub mod endpoints;
pub mod engine;
mod error;
pub mod regions;

pub use aggregator::{aggregate, nan_stats, Aggregation, MetricSettings, NamedScalarMap};
pub use classifier::{
    classify, classify_endpoints, Classification, ClassificationCounts, FiberRejection,
    LabelLookup,
};
pub use curvature::{mean_curvature, mean_curvature_array};
pub use endpoints::{endpoint_arrays, resolve_endpoints, voxel_index, EndpointVoxels};
pub use engine::{
    compute_resolution, load_resolution_inputs, write_resolution_artifacts, AbortHandle,
    ConnectomeEngine, ResolutionInputs, ResolutionReport, ResolutionResult, ResolutionSummary,
    RunReport,
};
pub use error::{ConnectomeError, Result};
pub use regions::{build_region_nodes, label_geometry, LabelGeometry};
