// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Voxel volumes: integer parcellations and scalar maps.

use ndarray::Array3;

use crate::error::{Result, StructuresError};

/// Integer voxel coordinate; may be negative or beyond the grid before bounds checks
pub type VoxelIndex = [i64; 3];

/// Voxel value types a [`Volume`] can hold
pub trait VoxelValue: Copy + Send + Sync + 'static {
    fn from_f64(value: f64) -> Self;
    fn to_f64(self) -> f64;
}

impl VoxelValue for i64 {
    fn from_f64(value: f64) -> Self {
        value.round() as i64
    }

    fn to_f64(self) -> f64 {
        self as f64
    }
}

impl VoxelValue for f64 {
    fn from_f64(value: f64) -> Self {
        value
    }

    fn to_f64(self) -> f64 {
        self
    }
}

/// A 3-D voxel grid with its voxel size (mm) and voxel-to-world affine
#[derive(Debug, Clone, PartialEq)]
pub struct Volume<T> {
    data: Array3<T>,
    voxel_size: [f64; 3],
    affine: [[f64; 4]; 4],
}

/// Integer label volume; label `0` is background
pub type ParcellationVolume = Volume<i64>;

/// Auxiliary scalar volume sampled along streamlines
pub type ScalarMap = Volume<f64>;

fn scaled_identity(voxel_size: [f64; 3]) -> [[f64; 4]; 4] {
    let mut affine = [[0.0; 4]; 4];
    for axis in 0..3 {
        affine[axis][axis] = voxel_size[axis];
    }
    affine[3][3] = 1.0;
    affine
}

impl<T: VoxelValue> Volume<T> {
    /// Volume with a scaled-identity affine
    ///
    /// # Errors
    /// Voxel sizes must be finite and strictly positive.
    pub fn new(data: Array3<T>, voxel_size: [f64; 3]) -> Result<Self> {
        if voxel_size.iter().any(|v| !v.is_finite() || *v <= 0.0) {
            return Err(StructuresError::BadParameters(format!(
                "voxel size must be finite and positive, got {:?}",
                voxel_size
            )));
        }
        Ok(Self {
            data,
            voxel_size,
            affine: scaled_identity(voxel_size),
        })
    }

    pub fn with_affine(mut self, affine: [[f64; 4]; 4]) -> Self {
        self.affine = affine;
        self
    }

    pub fn data(&self) -> &Array3<T> {
        &self.data
    }

    pub fn shape(&self) -> [usize; 3] {
        let dim = self.data.dim();
        [dim.0, dim.1, dim.2]
    }

    pub fn voxel_size(&self) -> [f64; 3] {
        self.voxel_size
    }

    pub fn affine(&self) -> &[[f64; 4]; 4] {
        &self.affine
    }

    /// Whether `index` lies inside the grid (negative indices never do)
    pub fn contains(&self, index: VoxelIndex) -> bool {
        let shape = self.shape();
        index
            .iter()
            .zip(shape.iter())
            .all(|(&i, &n)| i >= 0 && (i as u64) < n as u64)
    }

    /// Value at `index`, or `None` outside the grid
    pub fn get(&self, index: VoxelIndex) -> Option<T> {
        if !self.contains(index) {
            return None;
        }
        self.data
            .get((index[0] as usize, index[1] as usize, index[2] as usize))
            .copied()
    }
}

impl ParcellationVolume {
    /// Largest label present (0 for an all-background volume)
    pub fn max_label(&self) -> i64 {
        self.data.iter().copied().max().unwrap_or(0).max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds() {
        let mut data = Array3::<i64>::zeros((2, 3, 4));
        data[[1, 2, 3]] = 7;
        let volume = ParcellationVolume::new(data, [1.0, 1.0, 1.0]).unwrap();

        assert_eq!(volume.shape(), [2, 3, 4]);
        assert_eq!(volume.get([1, 2, 3]), Some(7));
        assert_eq!(volume.get([0, 0, 0]), Some(0));
        assert_eq!(volume.get([2, 0, 0]), None);
        assert_eq!(volume.get([-1, 0, 0]), None);
        assert_eq!(volume.max_label(), 7);
    }

    #[test]
    fn test_invalid_voxel_size() {
        let data = Array3::<f64>::zeros((1, 1, 1));
        assert!(ScalarMap::new(data.clone(), [1.0, f64::NAN, 1.0]).is_err());
        assert!(ScalarMap::new(data, [1.0, -2.0, 1.0]).is_err());
    }

    #[test]
    fn test_default_affine_is_scaled_identity() {
        let volume = ScalarMap::new(Array3::zeros((1, 1, 1)), [2.0, 3.0, 4.0]).unwrap();
        assert_eq!(volume.affine()[1][1], 3.0);
        assert_eq!(volume.affine()[3][3], 1.0);
        assert_eq!(volume.affine()[0][3], 0.0);
    }
}
