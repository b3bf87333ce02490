// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Flat, index-aligned storage for streamlines.
//!
//! All points live in one contiguous buffer; streamline `i` owns
//! `points[offsets[i]..offsets[i + 1]]`. Per-point scalars and per-streamline
//! properties are stored the same way so that workers can operate on index
//! ranges without chasing references.

use serde::{Deserialize, Serialize};

use crate::error::{Result, StructuresError};

pub type Point = [f32; 3];

/// TrackVis-compatible tractogram header
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TractogramHeader {
    /// Volume dimensions in voxels
    pub dim: [i16; 3],
    /// Voxel size in mm
    pub voxel_size: [f32; 3],
    pub origin: [f32; 3],
    /// Names of per-point scalars (at most 10 are representable in TrackVis)
    pub scalar_names: Vec<String>,
    pub n_scalars: usize,
    /// Names of per-streamline properties (at most 10 are representable)
    pub property_names: Vec<String>,
    pub n_properties: usize,
    /// Row-major voxel-to-RAS affine; all zeros when unknown
    pub vox_to_ras: [[f32; 4]; 4],
    pub voxel_order: [u8; 4],
    pub image_orientation_patient: [f32; 6],
    pub invert_x: u8,
    pub invert_y: u8,
    pub invert_z: u8,
    pub swap_xy: u8,
    pub swap_yz: u8,
    pub swap_zx: u8,
    pub version: i32,
}

impl Default for TractogramHeader {
    fn default() -> Self {
        Self {
            dim: [0; 3],
            voxel_size: [1.0; 3],
            origin: [0.0; 3],
            scalar_names: Vec::new(),
            n_scalars: 0,
            property_names: Vec::new(),
            n_properties: 0,
            vox_to_ras: [[0.0; 4]; 4],
            voxel_order: *b"LAS\0",
            image_orientation_patient: [0.0; 6],
            invert_x: 0,
            invert_y: 0,
            invert_z: 0,
            swap_xy: 0,
            swap_yz: 0,
            swap_zx: 0,
            version: 2,
        }
    }
}

impl TractogramHeader {
    /// Header for a volume of `dim` voxels of `voxel_size` mm
    pub fn for_volume(dim: [i16; 3], voxel_size: [f32; 3]) -> Self {
        let mut vox_to_ras = [[0.0; 4]; 4];
        for axis in 0..3 {
            vox_to_ras[axis][axis] = voxel_size[axis];
        }
        vox_to_ras[3][3] = 1.0;
        Self {
            dim,
            voxel_size,
            vox_to_ras,
            ..Self::default()
        }
    }
}

/// A read-only view of one streamline
#[derive(Debug, Clone, Copy)]
pub struct Streamline<'a> {
    /// Position in the tractogram
    pub index: usize,
    pub points: &'a [Point],
    /// `points.len() * n_scalars` values, point-major
    pub scalars: &'a [f32],
    pub properties: &'a [f32],
}

impl<'a> Streamline<'a> {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first(&self) -> Option<&'a Point> {
        self.points.first()
    }

    pub fn last(&self) -> Option<&'a Point> {
        self.points.last()
    }

    /// Arc length in mm: sum of Euclidean distances between consecutive points
    pub fn length(&self) -> f64 {
        self.points
            .windows(2)
            .map(|pair| {
                let dx = f64::from(pair[1][0]) - f64::from(pair[0][0]);
                let dy = f64::from(pair[1][1]) - f64::from(pair[0][1]);
                let dz = f64::from(pair[1][2]) - f64::from(pair[0][2]);
                (dx * dx + dy * dy + dz * dz).sqrt()
            })
            .sum()
    }
}

/// An ordered collection of streamlines plus header
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tractogram {
    header: TractogramHeader,
    points: Vec<Point>,
    /// `len() + 1` entries; streamline `i` spans `offsets[i]..offsets[i + 1]`
    offsets: Vec<usize>,
    scalars: Vec<f32>,
    properties: Vec<f32>,
}

impl Tractogram {
    pub fn new(header: TractogramHeader) -> Self {
        Self {
            header,
            points: Vec::new(),
            offsets: vec![0],
            scalars: Vec::new(),
            properties: Vec::new(),
        }
    }

    /// Build a tractogram of plain streamlines (no scalars or properties)
    pub fn from_streamlines<I, S>(header: TractogramHeader, streamlines: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[Point]>,
    {
        let mut tractogram = Self::new(header);
        for points in streamlines {
            tractogram.push(points.as_ref(), &[], &[])?;
        }
        Ok(tractogram)
    }

    /// Append a streamline
    ///
    /// `scalars` must hold `points.len() * header.n_scalars` values and
    /// `properties` exactly `header.n_properties`.
    pub fn push(&mut self, points: &[Point], scalars: &[f32], properties: &[f32]) -> Result<()> {
        let expected_scalars = points.len() * self.header.n_scalars;
        if scalars.len() != expected_scalars {
            return Err(StructuresError::BadParameters(format!(
                "streamline {} has {} scalar values, expected {}",
                self.len(),
                scalars.len(),
                expected_scalars
            )));
        }
        if properties.len() != self.header.n_properties {
            return Err(StructuresError::BadParameters(format!(
                "streamline {} has {} properties, expected {}",
                self.len(),
                properties.len(),
                self.header.n_properties
            )));
        }

        self.points.extend_from_slice(points);
        self.scalars.extend_from_slice(scalars);
        self.properties.extend_from_slice(properties);
        self.offsets.push(self.points.len());
        Ok(())
    }

    pub fn header(&self) -> &TractogramHeader {
        &self.header
    }

    pub fn header_mut(&mut self) -> &mut TractogramHeader {
        &mut self.header
    }

    pub fn len(&self) -> usize {
        self.offsets.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn total_points(&self) -> usize {
        self.points.len()
    }

    /// Streamline at `index`
    ///
    /// # Panics
    /// Panics if `index >= self.len()`.
    pub fn streamline(&self, index: usize) -> Streamline<'_> {
        let start = self.offsets[index];
        let end = self.offsets[index + 1];
        let n_scalars = self.header.n_scalars;
        let n_properties = self.header.n_properties;
        Streamline {
            index,
            points: &self.points[start..end],
            scalars: &self.scalars[start * n_scalars..end * n_scalars],
            properties: &self.properties[index * n_properties..(index + 1) * n_properties],
        }
    }

    pub fn get(&self, index: usize) -> Option<Streamline<'_>> {
        (index < self.len()).then(|| self.streamline(index))
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = Streamline<'_>> + '_ {
        (0..self.len()).map(move |index| self.streamline(index))
    }

    /// New tractogram holding only the streamlines at `indices`, in that order
    pub fn subset(&self, indices: &[usize]) -> Result<Tractogram> {
        let mut out = Tractogram::new(self.header.clone());
        for &index in indices {
            let streamline = self.get(index).ok_or_else(|| {
                StructuresError::BadParameters(format!(
                    "streamline index {} out of range (tractogram has {})",
                    index,
                    self.len()
                ))
            })?;
            out.push(streamline.points, streamline.scalars, streamline.properties)?;
        }
        Ok(out)
    }
}
