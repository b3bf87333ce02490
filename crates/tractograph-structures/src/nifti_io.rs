// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! NIfTI-1 volume I/O (`.nii` and `.nii.gz`).

use std::io::{Cursor, Write};
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use ndarray::Array3;
use nifti::volume::ndarray::IntoNdArray;
use nifti::{InMemNiftiObject, NiftiHeader, NiftiObject};

use crate::error::{Result, StructuresError};
use crate::volume::{Volume, VoxelValue};

const NIFTI1_HEADER_SIZE: usize = 348;
const VOX_OFFSET: usize = 352;

fn is_gzip(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[0] == 0x1f && bytes[1] == 0x8b
}

/// Voxel-to-world affine: the sform when present, else a scaled identity
fn header_affine(header: &NiftiHeader) -> [[f64; 4]; 4] {
    if header.sform_code > 0 {
        let row = |r: &[f32; 4]| [r[0] as f64, r[1] as f64, r[2] as f64, r[3] as f64];
        [
            row(&header.srow_x),
            row(&header.srow_y),
            row(&header.srow_z),
            [0.0, 0.0, 0.0, 1.0],
        ]
    } else {
        [
            [header.pixdim[1] as f64, 0.0, 0.0, 0.0],
            [0.0, header.pixdim[2] as f64, 0.0, 0.0],
            [0.0, 0.0, header.pixdim[3] as f64, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ]
    }
}

/// Parse NIfTI bytes (gzip auto-detected) into a volume
///
/// 4-D inputs keep only their first frame.
pub fn parse_nifti<T: VoxelValue>(bytes: &[u8]) -> Result<Volume<T>> {
    let object = if is_gzip(bytes) {
        InMemNiftiObject::from_reader(GzDecoder::new(Cursor::new(bytes)))
    } else {
        InMemNiftiObject::from_reader(Cursor::new(bytes))
    }
    .map_err(|e| StructuresError::Nifti(e.to_string()))?;

    let header = object.header();
    if header.dim[0] < 3 {
        return Err(StructuresError::Nifti(format!(
            "expected at least a 3-D volume, got {}-D",
            header.dim[0]
        )));
    }
    let voxel_size = [
        header.pixdim[1].abs() as f64,
        header.pixdim[2].abs() as f64,
        header.pixdim[3].abs() as f64,
    ];
    let affine = header_affine(header);

    let array = object
        .into_volume()
        .into_ndarray::<f64>()
        .map_err(|e| StructuresError::Nifti(e.to_string()))?;

    let shape = array.shape().to_vec();
    if shape.len() < 3 {
        return Err(StructuresError::Nifti(format!(
            "expected at least 3 array axes, got {}",
            shape.len()
        )));
    }
    let (nx, ny, nz) = (shape[0], shape[1], shape[2]);
    let frame: usize = shape[3..].iter().product();

    // Logical iteration is row-major, so trailing axes vary fastest
    let values: Vec<T> = array
        .iter()
        .step_by(frame.max(1))
        .take(nx * ny * nz)
        .map(|&v| T::from_f64(v))
        .collect();

    let data = Array3::from_shape_vec((nx, ny, nz), values)
        .map_err(|e| StructuresError::Nifti(e.to_string()))?;

    Ok(Volume::new(data, voxel_size)?.with_affine(affine))
}

/// Read a `.nii` or `.nii.gz` file
pub fn read_nifti<T: VoxelValue, P: AsRef<Path>>(path: P) -> Result<Volume<T>> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|e| StructuresError::io(path, e))?;
    let volume = parse_nifti(&bytes).map_err(|e| match e {
        StructuresError::Nifti(msg) => {
            StructuresError::Nifti(format!("{}: {}", path.display(), msg))
        }
        other => other,
    })?;
    tracing::debug!(
        target: "tractograph-structures",
        "Loaded {:?} volume ({:?} mm voxels) from {}",
        volume.shape(),
        volume.voxel_size(),
        path.display()
    );
    Ok(volume)
}

/// Encode a volume as an uncompressed single-file NIfTI-1 (float32 voxels)
pub fn encode_nifti<T: VoxelValue>(volume: &Volume<T>) -> Result<Vec<u8>> {
    let shape = volume.shape();
    let mut dims = [0i16; 3];
    for (dim, &n) in dims.iter_mut().zip(shape.iter()) {
        *dim = i16::try_from(n).map_err(|_| {
            StructuresError::BadParameters(format!("dimension {} does not fit in NIfTI-1", n))
        })?;
    }
    let voxel_size = volume.voxel_size();

    let mut header = [0u8; NIFTI1_HEADER_SIZE];
    LittleEndian::write_i32(&mut header[0..4], NIFTI1_HEADER_SIZE as i32);
    let dim: [i16; 8] = [3, dims[0], dims[1], dims[2], 1, 1, 1, 1];
    LittleEndian::write_i16_into(&dim, &mut header[40..56]);
    // datatype FLOAT32, bitpix 32
    LittleEndian::write_i16(&mut header[70..72], 16);
    LittleEndian::write_i16(&mut header[72..74], 32);
    let pixdim: [f32; 8] = [
        1.0,
        voxel_size[0] as f32,
        voxel_size[1] as f32,
        voxel_size[2] as f32,
        1.0,
        1.0,
        1.0,
        1.0,
    ];
    LittleEndian::write_f32_into(&pixdim, &mut header[76..108]);
    LittleEndian::write_f32(&mut header[108..112], VOX_OFFSET as f32);
    LittleEndian::write_f32(&mut header[112..116], 1.0);
    // sform_code = 1 (scanner anat)
    LittleEndian::write_i16(&mut header[254..256], 1);
    let affine = volume.affine();
    for (row, offset) in [280usize, 296, 312].iter().enumerate() {
        let srow: Vec<f32> = affine[row].iter().map(|&v| v as f32).collect();
        LittleEndian::write_f32_into(&srow, &mut header[*offset..*offset + 16]);
    }
    header[344..348].copy_from_slice(b"n+1\0");

    let mut buffer = Vec::with_capacity(VOX_OFFSET + shape.iter().product::<usize>() * 4);
    buffer.extend_from_slice(&header);
    buffer.extend_from_slice(&[0u8; 4]);

    // Voxels in Fortran order (x fastest)
    let data = volume.data();
    let mut word = [0u8; 4];
    for k in 0..shape[2] {
        for j in 0..shape[1] {
            for i in 0..shape[0] {
                LittleEndian::write_f32(&mut word, data[[i, j, k]].to_f64() as f32);
                buffer.extend_from_slice(&word);
            }
        }
    }

    Ok(buffer)
}

/// Write a volume; gzip-compressed when the path ends in `.gz`
pub fn write_nifti<T: VoxelValue, P: AsRef<Path>>(path: P, volume: &Volume<T>) -> Result<()> {
    let path = path.as_ref();
    let uncompressed = encode_nifti(volume)?;

    let bytes = if path.extension().is_some_and(|ext| ext == "gz") {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&uncompressed)?;
        encoder.finish()?
    } else {
        uncompressed
    };

    std::fs::write(path, bytes).map_err(|e| StructuresError::io(path, e))
}
