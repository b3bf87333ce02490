// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Mean streamline curvature from finite differences.

use ndarray::Array2;
use rayon::prelude::*;
use tractograph_structures::{Point, Tractogram};

type Vec3 = [f64; 3];

fn sub(a: Vec3, b: Vec3) -> Vec3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn cross(a: Vec3, b: Vec3) -> Vec3 {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

/// Euclidean norm with zero replaced by machine epsilon
fn magnitude(v: Vec3) -> f64 {
    let m = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
    if m == 0.0 {
        f64::EPSILON
    } else {
        m
    }
}

/// Unit-spacing gradient along the curve: central differences inside,
/// one-sided differences at both ends. Requires at least two samples.
fn gradient(values: &[Vec3]) -> Vec<Vec3> {
    let n = values.len();
    (0..n)
        .map(|i| {
            if i == 0 {
                sub(values[1], values[0])
            } else if i == n - 1 {
                sub(values[n - 1], values[n - 2])
            } else {
                let d = sub(values[i + 1], values[i - 1]);
                [d[0] / 2.0, d[1] / 2.0, d[2] / 2.0]
            }
        })
        .collect()
}

/// Mean of `|r' x r''| / |r'|^3` over the points of a curve.
///
/// Curves with fewer than two points have zero curvature.
pub fn mean_curvature(points: &[Point]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }
    let xyz: Vec<Vec3> = points
        .iter()
        .map(|p| [f64::from(p[0]), f64::from(p[1]), f64::from(p[2])])
        .collect();
    let first = gradient(&xyz);
    let second = gradient(&first);

    let total: f64 = first
        .iter()
        .zip(&second)
        .map(|(&d, &dd)| magnitude(cross(d, dd)) / magnitude(d).powi(3))
        .sum();
    total / xyz.len() as f64
}

/// `[n, 1]` mean curvature of every streamline, in tractogram order
pub fn mean_curvature_array(tractogram: &Tractogram) -> Array2<f64> {
    let values: Vec<f64> = (0..tractogram.len())
        .into_par_iter()
        .map(|index| mean_curvature(tractogram.streamline(index).points))
        .collect();
    Array2::from_shape_fn((values.len(), 1), |(row, _)| values[row])
}
