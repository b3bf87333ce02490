// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! The core data crate for tractograph. Defines the tractogram arena, voxel
//! volumes, region descriptions and the connectivity graph, together with the
//! readers for the input formats they come from (TrackVis, NIfTI, GraphML).

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

mod error;
pub mod graph;
pub mod graphml;
pub mod nifti_io;
pub mod regions;
pub mod trackvis;
pub mod tractogram;
pub mod volume;

pub use error::{Result, StructuresError};
pub use graph::{ConnectivityGraph, EdgeKey, EdgeMetrics, FiberLabel, RegionId, RegionNode, ScalarStats};
pub use graphml::{parse_graphml, read_graphml, GraphmlDocument, GraphmlEdge, GraphmlNode};
pub use nifti_io::{read_nifti, write_nifti};
pub use regions::{read_region_descriptions, region_descriptions, RegionDescription};
pub use trackvis::{read_trackvis, write_trackvis};
pub use tractogram::{Point, Streamline, Tractogram, TractogramHeader};
pub use volume::{ParcellationVolume, ScalarMap, Volume, VoxelIndex, VoxelValue};
