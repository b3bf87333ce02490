// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Endpoint resolution: first and last streamline points (mm) to voxel indices.
//!
//! The resolver does not check volume bounds. An index outside the volume is
//! reported by the classifier as an out-of-volume orphan.

use ndarray::Array3;
use rayon::prelude::*;
use tractograph_config::EndpointRounding;
use tractograph_structures::{Point, Tractogram, VoxelIndex};

/// Start and end voxel of one streamline
pub type EndpointVoxels = [VoxelIndex; 2];

/// Voxel coordinate of `point` before conversion to an integer
fn scaled(point: &Point, voxel_size: [f64; 3], rounding: EndpointRounding) -> [f64; 3] {
    let mut out = [0.0; 3];
    for axis in 0..3 {
        let value = f64::from(point[axis]) / voxel_size[axis];
        out[axis] = match rounding {
            EndpointRounding::Truncate => value.trunc(),
            EndpointRounding::Nearest => value.round(),
        };
    }
    out
}

/// Voxel index of a millimetre point; `None` for non-finite coordinates
pub fn voxel_index(
    point: &Point,
    voxel_size: [f64; 3],
    rounding: EndpointRounding,
) -> Option<VoxelIndex> {
    let coords = scaled(point, voxel_size, rounding);
    if coords.iter().any(|c| !c.is_finite() || c.abs() > i64::MAX as f64) {
        return None;
    }
    Some([coords[0] as i64, coords[1] as i64, coords[2] as i64])
}

/// Endpoint voxels of every streamline, in tractogram order.
///
/// Entries are `None` for empty streamlines and non-finite endpoints.
pub fn resolve_endpoints(
    tractogram: &Tractogram,
    voxel_size: [f64; 3],
    rounding: EndpointRounding,
) -> Vec<Option<EndpointVoxels>> {
    (0..tractogram.len())
        .into_par_iter()
        .map(|index| {
            let streamline = tractogram.streamline(index);
            let start = voxel_index(streamline.first()?, voxel_size, rounding)?;
            let end = voxel_index(streamline.last()?, voxel_size, rounding)?;
            Some([start, end])
        })
        .collect()
}

/// `[n, 2, 3]` arrays of endpoint voxel coordinates and millimetre endpoints.
///
/// Voxel coordinates are kept as floats without bounds checks; empty
/// streamlines produce NaN rows in both arrays.
pub fn endpoint_arrays(
    tractogram: &Tractogram,
    voxel_size: [f64; 3],
    rounding: EndpointRounding,
) -> (Array3<f64>, Array3<f64>) {
    let n = tractogram.len();
    let mut voxels = Array3::<f64>::from_elem((n, 2, 3), f64::NAN);
    let mut millimetres = Array3::<f64>::from_elem((n, 2, 3), f64::NAN);

    for (index, streamline) in tractogram.iter().enumerate() {
        let (Some(first), Some(last)) = (streamline.first(), streamline.last()) else {
            continue;
        };
        for (end, point) in [first, last].into_iter().enumerate() {
            let coords = scaled(point, voxel_size, rounding);
            for axis in 0..3 {
                millimetres[[index, end, axis]] = f64::from(point[axis]);
                voxels[[index, end, axis]] = coords[axis];
            }
        }
    }
    (voxels, millimetres)
}
