// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Tractograph Serialization
//!
//! Writers and readers for every artifact the connectome engine produces.
//!
//! ## Formats
//! - **TSV**: edge-list table, one column per metric key (union over edges)
//! - **GraphML**: graph with denormalized node attributes
//! - **JSON**: versioned, portable graph document
//! - **Snapshot**: versioned binary graph (bincode, optional LZ4, checksum)
//! - **MAT**: MATLAB v5 file with `sc` (dense matrices) and `nodes` structs
//! - **NPY**: NumPy arrays for per-streamline diagnostics
//!
//! Per-resolution outputs are staged through an [`ArtifactTransaction`] so a
//! failed resolution leaves no partial files behind.
//!
//! ## Usage
//! ```ignore
//! use tractograph_serialization::{save_snapshot, load_snapshot, GraphSnapshot};
//!
//! save_snapshot(&GraphSnapshot::new(graph), "connectome_scale33.snapshot")?;
//! let snapshot = load_snapshot("connectome_scale33.snapshot")?;
//! ```

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

use std::path::PathBuf;

use thiserror::Error;
use tractograph_structures::StructuresError;

pub mod graphml;
pub mod json;
pub mod mat;
pub mod npy;
pub mod snapshot;
pub mod transaction;
pub mod tsv;

pub use graphml::{parse_graphml_graph, read_graphml_graph, write_graphml, write_graphml_file};
pub use json::{read_json_graph, write_json_graph, GraphDocument, JSON_FORMAT_VERSION};
pub use mat::{encode_mat, write_mat};
pub use npy::{parse_npy, read_npy, write_npy, write_npy_to, NpyElement};
pub use snapshot::{
    decode_snapshot, encode_snapshot, load_snapshot, save_snapshot, GraphSnapshot, SnapshotMetadata,
};
pub use transaction::ArtifactTransaction;
pub use tsv::{read_tsv, read_tsv_file, write_tsv, write_tsv_file};

/// Artifact I/O errors
#[derive(Error, Debug)]
pub enum SerializationError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Stream(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Version mismatch: file version {file_version}, expected {expected_version}")]
    VersionMismatch {
        file_version: u32,
        expected_version: u32,
    },

    #[error("Invalid magic number: expected TGRPH, got {0:?}")]
    InvalidMagic([u8; 5]),

    #[error("Checksum mismatch: file may be corrupted")]
    ChecksumMismatch,

    #[error("Compression error: {0}")]
    Compression(String),

    /// Content that does not fit or does not follow a format's layout
    #[error("Invalid {format} data: {reason}")]
    Format {
        format: &'static str,
        reason: String,
    },

    #[error(transparent)]
    Structures(#[from] StructuresError),
}

impl SerializationError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SerializationError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn format(format: &'static str, reason: impl Into<String>) -> Self {
        SerializationError::Format {
            format,
            reason: reason.into(),
        }
    }
}

impl From<quick_xml::Error> for SerializationError {
    fn from(err: quick_xml::Error) -> Self {
        SerializationError::format("GraphML", err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SerializationError>;

/// Text form of a metric value shared by the TSV and GraphML writers
pub(crate) fn format_value(value: f64) -> String {
    if value.is_nan() {
        "nan".to_string()
    } else if value == f64::INFINITY {
        "inf".to_string()
    } else if value == f64::NEG_INFINITY {
        "-inf".to_string()
    } else {
        format!("{}", value)
    }
}

/// Inverse of [`format_value`]; also accepts the spellings other tools emit
pub(crate) fn parse_value(text: &str) -> Option<f64> {
    let text = text.trim();
    match text.to_ascii_lowercase().as_str() {
        "nan" => Some(f64::NAN),
        "inf" | "+inf" | "infinity" => Some(f64::INFINITY),
        "-inf" | "-infinity" => Some(f64::NEG_INFINITY),
        _ => text.parse::<f64>().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_text_round_trip() {
        for value in [0.0, 6.0, -1.25, 1e-12, 123456.789] {
            assert_eq!(parse_value(&format_value(value)), Some(value));
        }
        assert!(parse_value(&format_value(f64::NAN)).unwrap().is_nan());
        assert_eq!(parse_value("INF"), Some(f64::INFINITY));
        assert_eq!(format_value(6.0), "6");
        assert_eq!(parse_value("abc"), None);
    }
}
