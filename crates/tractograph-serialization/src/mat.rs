// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! MATLAB v5 (Level 5 MAT-file) writer.
//!
//! The file holds two structs:
//! - `sc`: one field per metric key, each a dense symmetric `n x n` double
//!   matrix indexed by `label - 1` (absent edges are zero)
//! - `nodes`: one field per node attribute, one row per node in label order;
//!   `dn_position` is `rows x 3`, text attributes are cell arrays of strings
//!
//! Everything is little-endian and uncompressed.

use std::collections::BTreeMap;
use std::path::Path;

use byteorder::{LittleEndian, WriteBytesExt};
use tractograph_structures::{ConnectivityGraph, RegionNode};

use crate::{Result, SerializationError};

const FORMAT: &str = "MAT";

const HEADER_TEXT_LEN: usize = 116;
const FIELD_NAME_LEN: usize = 64;

// Data types
const MI_INT8: u32 = 1;
const MI_UINT16: u32 = 4;
const MI_INT32: u32 = 5;
const MI_UINT32: u32 = 6;
const MI_DOUBLE: u32 = 9;
const MI_MATRIX: u32 = 14;

// Array classes
const MX_CELL_CLASS: u32 = 1;
const MX_STRUCT_CLASS: u32 = 2;
const MX_CHAR_CLASS: u32 = 4;
const MX_DOUBLE_CLASS: u32 = 6;

/// In-memory MATLAB value
#[derive(Debug, Clone, PartialEq)]
enum MatValue {
    /// Row-major `rows x cols` values, written column-major
    Double {
        rows: usize,
        cols: usize,
        values: Vec<f64>,
    },
    Char(String),
    /// Column cell array
    Cell(Vec<MatValue>),
    /// 1x1 struct, fields in insertion order
    Struct(Vec<(String, MatValue)>),
}

fn padding(len: usize) -> usize {
    (8 - len % 8) % 8
}

fn dim(value: usize) -> Result<i32> {
    i32::try_from(value)
        .map_err(|_| SerializationError::format(FORMAT, format!("dimension {} too large", value)))
}

fn write_element(out: &mut Vec<u8>, data_type: u32, data: &[u8]) -> Result<()> {
    out.write_u32::<LittleEndian>(data_type)?;
    out.write_u32::<LittleEndian>(dim(data.len())? as u32)?;
    out.extend_from_slice(data);
    out.resize(out.len() + padding(data.len()), 0);
    Ok(())
}

fn check_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && name.len() < FIELD_NAME_LEN;
    if valid {
        Ok(())
    } else {
        Err(SerializationError::format(
            FORMAT,
            format!("'{}' is not a valid MATLAB field name", name),
        ))
    }
}

fn write_matrix(out: &mut Vec<u8>, name: &str, value: &MatValue) -> Result<()> {
    let mut body = Vec::new();

    let (class, dims): (u32, [usize; 2]) = match value {
        MatValue::Double { rows, cols, .. } => (MX_DOUBLE_CLASS, [*rows, *cols]),
        MatValue::Char(text) => {
            let len = text.encode_utf16().count();
            (MX_CHAR_CLASS, if len == 0 { [0, 0] } else { [1, len] })
        }
        MatValue::Cell(items) => (MX_CELL_CLASS, [items.len(), 1]),
        MatValue::Struct(_) => (MX_STRUCT_CLASS, [1, 1]),
    };

    let mut flags = Vec::with_capacity(8);
    flags.write_u32::<LittleEndian>(class)?;
    flags.write_u32::<LittleEndian>(0)?;
    write_element(&mut body, MI_UINT32, &flags)?;

    let mut dimensions = Vec::with_capacity(8);
    for d in dims {
        dimensions.write_i32::<LittleEndian>(dim(d)?)?;
    }
    write_element(&mut body, MI_INT32, &dimensions)?;

    write_element(&mut body, MI_INT8, name.as_bytes())?;

    match value {
        MatValue::Double { rows, cols, values } => {
            let mut data = Vec::with_capacity(values.len() * 8);
            for col in 0..*cols {
                for row in 0..*rows {
                    data.write_f64::<LittleEndian>(values[row * cols + col])?;
                }
            }
            write_element(&mut body, MI_DOUBLE, &data)?;
        }
        MatValue::Char(text) => {
            let mut data = Vec::new();
            for unit in text.encode_utf16() {
                data.write_u16::<LittleEndian>(unit)?;
            }
            write_element(&mut body, MI_UINT16, &data)?;
        }
        MatValue::Cell(items) => {
            for item in items {
                write_matrix(&mut body, "", item)?;
            }
        }
        MatValue::Struct(fields) => {
            let mut length = Vec::with_capacity(4);
            length.write_i32::<LittleEndian>(FIELD_NAME_LEN as i32)?;
            write_element(&mut body, MI_INT32, &length)?;

            let mut names = vec![0u8; fields.len() * FIELD_NAME_LEN];
            for (index, (field, _)) in fields.iter().enumerate() {
                check_name(field)?;
                let start = index * FIELD_NAME_LEN;
                names[start..start + field.len()].copy_from_slice(field.as_bytes());
            }
            write_element(&mut body, MI_INT8, &names)?;

            for (_, field_value) in fields {
                write_matrix(&mut body, "", field_value)?;
            }
        }
    }

    write_element(out, MI_MATRIX, &body)
}

fn header(description: &str) -> Vec<u8> {
    let mut text = format!("MATLAB 5.0 MAT-file, Platform: tractograph, {}", description)
        .into_bytes();
    text.resize(HEADER_TEXT_LEN, b' ');
    let mut out = text;
    // Subsystem data offset: unused
    out.extend_from_slice(&[0u8; 8]);
    out.extend_from_slice(&0x0100u16.to_le_bytes());
    out.extend_from_slice(b"IM");
    out
}

fn column(values: Vec<f64>) -> MatValue {
    MatValue::Double {
        rows: values.len(),
        cols: 1,
        values,
    }
}

fn edge_struct(graph: &ConnectivityGraph, size: usize) -> MatValue {
    let mut matrices: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for key in graph.metric_keys() {
        matrices.insert(key, vec![0.0; size * size]);
    }
    for (edge, metrics) in &graph.edges {
        let (i, j) = (edge.source() as usize - 1, edge.target() as usize - 1);
        for (key, value) in metrics.entries() {
            if let Some(matrix) = matrices.get_mut(&key) {
                matrix[i * size + j] = value;
                matrix[j * size + i] = value;
            }
        }
    }
    MatValue::Struct(
        matrices
            .into_iter()
            .map(|(key, values)| {
                (
                    key,
                    MatValue::Double {
                        rows: size,
                        cols: size,
                        values,
                    },
                )
            })
            .collect(),
    )
}

fn node_struct(graph: &ConnectivityGraph) -> MatValue {
    let nodes: Vec<_> = graph.nodes.values().collect();
    let text = |f: fn(&RegionNode) -> &str| {
        MatValue::Cell(nodes.iter().map(|n| MatValue::Char(f(n).to_string())).collect())
    };

    let mut positions = Vec::with_capacity(nodes.len() * 3);
    for node in &nodes {
        positions.extend_from_slice(&node.centroid_or_nan());
    }

    MatValue::Struct(vec![
        (
            "dn_correspondence_id".to_string(),
            column(nodes.iter().map(|n| n.description.voxel_id as f64).collect()),
        ),
        (
            "dn_multiscaleID".to_string(),
            column(
                nodes
                    .iter()
                    .map(|n| n.description.multiscale_id as f64)
                    .collect(),
            ),
        ),
        ("dn_name".to_string(), text(|n| n.description.name.as_str())),
        ("dn_fsname".to_string(), text(|n| n.description.fs_name.as_str())),
        ("dn_hemisphere".to_string(), text(|n| n.description.hemisphere.as_str())),
        ("dn_region".to_string(), text(|n| n.description.region.as_str())),
        (
            "dn_position".to_string(),
            MatValue::Double {
                rows: nodes.len(),
                cols: 3,
                values: positions,
            },
        ),
        (
            "roi_volume".to_string(),
            column(nodes.iter().map(|n| n.volume as f64).collect()),
        ),
    ])
}

/// Encode `graph` as a MAT file with `sc` and `nodes` variables.
///
/// Matrices are `n x n` with `n = max(number_of_regions, largest label)`.
pub fn encode_mat(graph: &ConnectivityGraph, number_of_regions: usize) -> Result<Vec<u8>> {
    let largest = graph
        .nodes
        .keys()
        .copied()
        .chain(graph.edges.keys().map(|e| e.target()))
        .max()
        .unwrap_or(0) as usize;
    if graph.edges.keys().any(|e| e.source() == 0) {
        return Err(SerializationError::format(FORMAT, "region label 0 cannot be indexed"));
    }
    let size = number_of_regions.max(largest);

    let mut out = header(&format!("resolution {}", graph.resolution));
    write_matrix(&mut out, "sc", &edge_struct(graph, size))?;
    write_matrix(&mut out, "nodes", &node_struct(graph))?;
    Ok(out)
}

pub fn write_mat<P: AsRef<Path>>(
    path: P,
    graph: &ConnectivityGraph,
    number_of_regions: usize,
) -> Result<()> {
    let path = path.as_ref();
    let bytes = encode_mat(graph, number_of_regions)?;
    std::fs::write(path, bytes).map_err(|e| SerializationError::io(path, e))
}
