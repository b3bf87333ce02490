// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Versioned binary snapshot of a [`ConnectivityGraph`].
//!
//! ```text
//! [Header]
//! - Magic: "TGRPH" (5 bytes)
//! - Version: u32 (4 bytes)
//! - Flags: u8 (1 byte) - bit 0: compressed
//! - Uncompressed Size: u64 (8 bytes, original size before compression)
//! - Checksum: u64 (8 bytes, FNV-1a of data)
//! [Data]
//! - Bincode-serialized GraphSnapshot (optionally LZ4 compressed)
//! ```

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tractograph_structures::ConnectivityGraph;

use crate::{Result, SerializationError};

/// Magic number for snapshot files: "TGRPH"
const MAGIC: &[u8; 5] = b"TGRPH";

/// Current format version (increment when format changes)
pub const FORMAT_VERSION: u32 = 1;

const HEADER_LEN: usize = 5 + 4 + 1 + 8 + 8;

/// Graph plus provenance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub version: u32,
    pub graph: ConnectivityGraph,
    pub metadata: SnapshotMetadata,
}

impl GraphSnapshot {
    pub fn new(graph: ConnectivityGraph) -> Self {
        Self {
            version: FORMAT_VERSION,
            graph,
            metadata: SnapshotMetadata::default(),
        }
    }
}

/// Snapshot metadata (for tracking and debugging)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    /// Seconds since the Unix epoch when the snapshot was taken
    pub timestamp: u64,

    pub description: String,

    /// Where the graph came from, e.g. the tractogram path
    pub source: String,

    pub tags: BTreeMap<String, String>,
}

impl Default for SnapshotMetadata {
    fn default() -> Self {
        Self {
            timestamp: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
            description: String::new(),
            source: String::from("unknown"),
            tags: BTreeMap::new(),
        }
    }
}

/// Encode a snapshot into the file layout above
pub fn encode_snapshot(snapshot: &GraphSnapshot) -> Result<Vec<u8>> {
    let data = bincode::serialize(snapshot)
        .map_err(|e| SerializationError::Serialization(e.to_string()))?;

    #[cfg(feature = "compression")]
    let (final_data, flags, uncompressed_size) = {
        let original_size = data.len();
        let compressed = lz4::block::compress(&data, None, false)
            .map_err(|e| SerializationError::Compression(e.to_string()))?;
        (compressed, 1u8, original_size as u64)
    };

    #[cfg(not(feature = "compression"))]
    let (final_data, flags, uncompressed_size) = (data, 0u8, 0u64);

    let mut bytes = Vec::with_capacity(HEADER_LEN + final_data.len());
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    bytes.push(flags);
    bytes.extend_from_slice(&uncompressed_size.to_le_bytes());
    bytes.extend_from_slice(&calculate_checksum(&final_data).to_le_bytes());
    bytes.extend_from_slice(&final_data);
    Ok(bytes)
}

/// Decode a snapshot, verifying magic, version and checksum
pub fn decode_snapshot(mut bytes: &[u8]) -> Result<GraphSnapshot> {
    let mut magic = [0u8; 5];
    bytes.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(SerializationError::InvalidMagic(magic));
    }

    let mut version_bytes = [0u8; 4];
    bytes.read_exact(&mut version_bytes)?;
    let version = u32::from_le_bytes(version_bytes);
    if version != FORMAT_VERSION {
        return Err(SerializationError::VersionMismatch {
            file_version: version,
            expected_version: FORMAT_VERSION,
        });
    }

    let mut flags = [0u8; 1];
    bytes.read_exact(&mut flags)?;
    let is_compressed = (flags[0] & 1) != 0;

    let mut size_bytes = [0u8; 8];
    bytes.read_exact(&mut size_bytes)?;
    let uncompressed_size = u64::from_le_bytes(size_bytes);

    let mut checksum_bytes = [0u8; 8];
    bytes.read_exact(&mut checksum_bytes)?;
    let expected_checksum = u64::from_le_bytes(checksum_bytes);

    if calculate_checksum(bytes) != expected_checksum {
        return Err(SerializationError::ChecksumMismatch);
    }

    let data = if is_compressed {
        #[cfg(feature = "compression")]
        {
            let size = i32::try_from(uncompressed_size).map_err(|_| {
                SerializationError::Compression(format!(
                    "uncompressed size {} is too large",
                    uncompressed_size
                ))
            })?;
            lz4::block::decompress(bytes, Some(size)).map_err(|e| {
                SerializationError::Compression(format!("Decompression failed: {}", e))
            })?
        }
        #[cfg(not(feature = "compression"))]
        {
            let _ = uncompressed_size;
            return Err(SerializationError::Compression(
                "File is compressed but compression feature is not enabled".to_string(),
            ));
        }
    } else {
        bytes.to_vec()
    };

    bincode::deserialize(&data).map_err(|e| SerializationError::Deserialization(e.to_string()))
}

/// Save a snapshot to a file
pub fn save_snapshot<P: AsRef<Path>>(snapshot: &GraphSnapshot, path: P) -> Result<()> {
    let path = path.as_ref();
    let bytes = encode_snapshot(snapshot)?;
    let mut file = File::create(path).map_err(|e| SerializationError::io(path, e))?;
    file.write_all(&bytes)
        .map_err(|e| SerializationError::io(path, e))?;
    Ok(())
}

/// Load a snapshot from a file
pub fn load_snapshot<P: AsRef<Path>>(path: P) -> Result<GraphSnapshot> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|e| SerializationError::io(path, e))?;
    decode_snapshot(&bytes)
}

/// FNV-1a hash of the payload
fn calculate_checksum(data: &[u8]) -> u64 {
    const FNV_OFFSET: u64 = 14695981039346656037;
    const FNV_PRIME: u64 = 1099511628211;

    let mut hash = FNV_OFFSET;
    for &byte in data {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;
    use tractograph_structures::{EdgeMetrics, RegionDescription, RegionNode};

    fn graph() -> ConnectivityGraph {
        let mut graph = ConnectivityGraph::new("scale33");
        for label in 1..=2 {
            graph.add_node(RegionNode {
                description: RegionDescription::unnamed(label),
                centroid: Some([1.0, 2.0, 3.0]),
                volume: 8,
            });
        }
        graph.insert_edge(
            2,
            1,
            EdgeMetrics {
                number_of_fibers: 6,
                fiber_density: Some(0.25),
                ..EdgeMetrics::default()
            },
        );
        graph
    }

    #[test]
    fn test_save_load_roundtrip() {
        let mut snapshot = GraphSnapshot::new(graph());
        snapshot.metadata.source = "tracks.trk".to_string();

        let temp_file = NamedTempFile::new().unwrap();
        save_snapshot(&snapshot, temp_file.path()).unwrap();
        let loaded = load_snapshot(temp_file.path()).unwrap();

        assert_eq!(loaded, snapshot);
        assert_eq!(loaded.graph.edge(1, 2).unwrap().number_of_fibers, 6);
    }

    #[test]
    fn test_invalid_magic() {
        let result = decode_snapshot(b"WRONG");
        assert!(matches!(result, Err(SerializationError::InvalidMagic(_))));
    }

    #[test]
    fn test_corrupted_payload_is_detected() {
        let mut bytes = encode_snapshot(&GraphSnapshot::new(graph())).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        assert!(matches!(
            decode_snapshot(&bytes),
            Err(SerializationError::ChecksumMismatch)
        ));
    }

    #[test]
    fn test_future_version_rejected() {
        let mut bytes = encode_snapshot(&GraphSnapshot::new(graph())).unwrap();
        bytes[5..9].copy_from_slice(&(FORMAT_VERSION + 1).to_le_bytes());
        assert!(matches!(
            decode_snapshot(&bytes),
            Err(SerializationError::VersionMismatch { .. })
        ));
    }

    #[test]
    fn test_checksum() {
        assert_eq!(calculate_checksum(b"hello world"), calculate_checksum(b"hello world"));
        assert_ne!(calculate_checksum(b"hello world"), calculate_checksum(b"hello worlD"));
    }
}
