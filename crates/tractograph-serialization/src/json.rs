// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Portable JSON graph document.
//!
//! Nodes and edges are plain arrays so the file needs no knowledge of the
//! in-memory key types. Non-finite metric values are stored as `null`.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tractograph_structures::{
    ConnectivityGraph, EdgeMetrics, RegionDescription, RegionId, RegionNode,
};

use crate::{Result, SerializationError};

pub const JSON_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: RegionId,
    pub voxel_id: i64,
    pub multiscale_id: i64,
    pub name: String,
    pub fs_name: String,
    pub hemisphere: String,
    pub region: String,
    pub centroid: Option<[f64; 3]>,
    pub volume: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub source: RegionId,
    pub target: RegionId,
    pub metrics: BTreeMap<String, Option<f64>>,
}

/// On-disk shape of a connectome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphDocument {
    pub format_version: u32,
    pub resolution: String,
    pub nodes: Vec<NodeRecord>,
    pub edges: Vec<EdgeRecord>,
}

impl GraphDocument {
    pub fn from_graph(graph: &ConnectivityGraph) -> Self {
        let nodes = graph
            .nodes
            .values()
            .map(|node| NodeRecord {
                id: node.label(),
                voxel_id: node.description.voxel_id,
                multiscale_id: node.description.multiscale_id,
                name: node.description.name.clone(),
                fs_name: node.description.fs_name.clone(),
                hemisphere: node.description.hemisphere.clone(),
                region: node.description.region.clone(),
                centroid: node.centroid,
                volume: node.volume,
            })
            .collect();

        let edges = graph
            .edges
            .iter()
            .map(|(key, metrics)| EdgeRecord {
                source: key.source(),
                target: key.target(),
                metrics: metrics
                    .entries()
                    .into_iter()
                    .map(|(name, value)| (name, value.is_finite().then_some(value)))
                    .collect(),
            })
            .collect();

        Self {
            format_version: JSON_FORMAT_VERSION,
            resolution: graph.resolution.clone(),
            nodes,
            edges,
        }
    }

    pub fn into_graph(self) -> Result<ConnectivityGraph> {
        if self.format_version != JSON_FORMAT_VERSION {
            return Err(SerializationError::VersionMismatch {
                file_version: self.format_version,
                expected_version: JSON_FORMAT_VERSION,
            });
        }

        let mut graph = ConnectivityGraph::new(self.resolution);
        for node in self.nodes {
            graph.add_node(RegionNode {
                description: RegionDescription {
                    label: node.id,
                    voxel_id: node.voxel_id,
                    multiscale_id: node.multiscale_id,
                    name: node.name,
                    fs_name: node.fs_name,
                    hemisphere: node.hemisphere,
                    region: node.region,
                },
                centroid: node.centroid,
                volume: node.volume,
            });
        }
        for edge in self.edges {
            let metrics = EdgeMetrics::from_entries(
                edge.metrics
                    .into_iter()
                    .map(|(name, value)| (name, value.unwrap_or(f64::NAN))),
            )?;
            if graph.edge(edge.source, edge.target).is_some() {
                return Err(SerializationError::format(
                    "JSON",
                    format!("edge ({}, {}) appears twice", edge.source, edge.target),
                ));
            }
            graph.insert_edge(edge.source, edge.target, metrics);
        }
        Ok(graph)
    }
}

pub fn write_json_graph<P: AsRef<Path>>(path: P, graph: &ConnectivityGraph) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|e| SerializationError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, &GraphDocument::from_graph(graph))
        .map_err(|e| SerializationError::Serialization(e.to_string()))?;
    writer.flush().map_err(|e| SerializationError::io(path, e))
}

pub fn read_json_graph<P: AsRef<Path>>(path: P) -> Result<ConnectivityGraph> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| SerializationError::io(path, e))?;
    let document: GraphDocument = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| SerializationError::Deserialization(e.to_string()))?;
    document.into_graph()
}
