// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Region graph builder: node geometry from the label volume.

use ahash::AHashMap;
use tracing::warn;
use tractograph_structures::{ParcellationVolume, RegionDescription, RegionId, RegionNode};

/// Voxel count and coordinate sums of one label
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LabelGeometry {
    pub count: usize,
    sum: [f64; 3],
}

impl LabelGeometry {
    /// Mean voxel coordinate, `None` when the label has no voxels
    pub fn centroid(&self) -> Option<[f64; 3]> {
        (self.count > 0).then(|| {
            let n = self.count as f64;
            [self.sum[0] / n, self.sum[1] / n, self.sum[2] / n]
        })
    }
}

/// Geometry of every non-zero label, in one pass over the volume
pub fn label_geometry(volume: &ParcellationVolume) -> AHashMap<i64, LabelGeometry> {
    let mut geometry: AHashMap<i64, LabelGeometry> = AHashMap::new();
    for ((i, j, k), &label) in volume.data().indexed_iter() {
        if label == 0 {
            continue;
        }
        let entry = geometry.entry(label).or_default();
        entry.count += 1;
        entry.sum[0] += i as f64;
        entry.sum[1] += j as f64;
        entry.sum[2] += k as f64;
    }
    geometry
}

fn node(description: RegionDescription, geometry: &AHashMap<i64, LabelGeometry>) -> RegionNode {
    let label_geometry = geometry
        .get(&description.voxel_id)
        .copied()
        .unwrap_or_default();
    RegionNode {
        description,
        centroid: label_geometry.centroid(),
        volume: label_geometry.count,
    }
}

/// Region nodes for one resolution, one per description.
///
/// A region whose voxel id never occurs in the volume keeps a `None`
/// centroid and zero volume, and is reported once as a warning.
pub fn build_region_nodes(
    resolution: &str,
    descriptions: &[RegionDescription],
    geometry: &AHashMap<i64, LabelGeometry>,
) -> Vec<RegionNode> {
    let nodes: Vec<RegionNode> = descriptions
        .iter()
        .cloned()
        .map(|description| node(description, geometry))
        .collect();

    let empty: Vec<RegionId> = nodes
        .iter()
        .filter(|n| n.volume == 0)
        .map(|n| n.label())
        .collect();
    if !empty.is_empty() {
        warn!(
            target: "tractograph-connectome",
            "[{}] {} region(s) have no voxels in the parcellation: {:?}",
            resolution,
            empty.len(),
            empty
        );
    }
    nodes
}

/// Node for a label that fibers reach but no description declares
pub fn undeclared_region_node(
    label: RegionId,
    geometry: &AHashMap<i64, LabelGeometry>,
) -> RegionNode {
    node(RegionDescription::unnamed(label), geometry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn volume() -> ParcellationVolume {
        let mut data = Array3::<i64>::zeros((4, 4, 4));
        data[[0, 0, 0]] = 7;
        data[[2, 0, 0]] = 7;
        data[[1, 3, 2]] = 7;
        data[[3, 3, 3]] = 2;
        ParcellationVolume::new(data, [1.0; 3]).unwrap()
    }

    #[test]
    fn test_centroid_and_volume_use_voxel_id() {
        let geometry = label_geometry(&volume());
        let description = RegionDescription {
            voxel_id: 7,
            multiscale_id: 1007,
            ..RegionDescription::unnamed(1)
        };
        let nodes = build_region_nodes("scale1", &[description], &geometry);

        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].label(), 1);
        assert_eq!(nodes[0].volume, 3);
        assert_eq!(nodes[0].centroid, Some([1.0, 1.0, 2.0 / 3.0]));
    }

    #[test]
    fn test_region_without_voxels_is_kept() {
        let geometry = label_geometry(&volume());
        let nodes = build_region_nodes("scale1", &[RegionDescription::unnamed(5)], &geometry);
        assert_eq!(nodes[0].volume, 0);
        assert_eq!(nodes[0].centroid, None);
        assert!(nodes[0].centroid_or_nan()[0].is_nan());

        let extra = undeclared_region_node(2, &geometry);
        assert_eq!(extra.volume, 1);
        assert_eq!(extra.centroid, Some([3.0, 3.0, 3.0]));
    }
}
