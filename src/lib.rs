// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Tractograph - structural connectome construction
//!
//! Tractograph converts a tractogram (3-D fiber streamlines) and one or more
//! brain parcellation volumes into weighted region graphs. Nodes are
//! anatomical regions; edges carry fiber counts, length statistics,
//! densities, proportions and optional scalar-map statistics.
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! tractograph = "0.1"
//! ```
//!
//! ```rust,no_run
//! use tractograph::prelude::*;
//!
//! let config = load_config(None, None)?;
//! validate_config(&config)?;
//!
//! let report = ConnectomeEngine::new(config).run()?;
//! for summary in report.succeeded() {
//!     println!("{}: {} edges", summary.key, summary.graph.edge_count());
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  Foundation: tractograph-config, tractograph-observability │
//! │  (TOML + overrides, logging, progress hooks)            │
//! └─────────────────────────────────────────────────────────┘
//!                         ↓
//! ┌─────────────────────────────────────────────────────────┐
//! │  Data: tractograph-structures, tractograph-serialization │
//! │  (tractogram, volumes, graph; TSV/JSON/MAT/GraphML/NPY)  │
//! └─────────────────────────────────────────────────────────┘
//!                         ↓
//! ┌─────────────────────────────────────────────────────────┐
//! │  Algorithms: tractograph-connectome                     │
//! │  (endpoints, classification, aggregation, runs)         │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Feature Flags
//!
//! - **`file-logging`**: JSON per-run log files with retention cleanup
//!
//! ## License
//!
//! Apache-2.0

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Re-export foundation
pub use tractograph_config as config;
pub use tractograph_observability as observability;

// Re-export data layer
pub use tractograph_serialization as serialization;
pub use tractograph_structures as structures;

// Re-export algorithms
pub use tractograph_connectome as connectome;

/// Prelude - commonly used types and functions
pub mod prelude {
    pub use crate::config::{
        load_config, validate_config, EngineConfig, EngineSettings, MetricKind, OutputFormat,
    };
    pub use crate::connectome::{
        AbortHandle, Classification, ConnectomeEngine, ConnectomeError, FiberRejection,
        RunReport,
    };
    pub use crate::observability::{LogProgress, NoProgress, ProgressReporter};
    pub use crate::serialization::{read_tsv_file, ArtifactTransaction, SerializationError};
    pub use crate::structures::{
        read_nifti, read_trackvis, ConnectivityGraph, EdgeKey, EdgeMetrics, ParcellationVolume,
        RegionNode, ScalarMap, Tractogram,
    };
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_facade_imports() {
        use crate::prelude::*;
        let key = EdgeKey::new(4, 2);
        assert_eq!((key.source(), key.target()), (2, 4));
        assert!(!crate::VERSION.is_empty());
    }
}
