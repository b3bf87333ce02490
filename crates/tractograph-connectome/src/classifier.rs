// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Streamline classification.
//!
//! Each streamline becomes a canonical region pair, an orphan (endpoint out
//! of the volume or on background) or an excluded fiber (label beyond the
//! declared region count, or a self pair when those are disallowed).
//! Outcomes are tallied; nothing is logged per streamline.

use ahash::AHashMap;
use ndarray::Array2;
use rayon::prelude::*;
use tractograph_observability::PercentCounter;
use tractograph_structures::{
    EdgeKey, FiberLabel, ParcellationVolume, RegionDescription, RegionId,
};

use crate::endpoints::EndpointVoxels;

/// Why a streamline does not contribute to the graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FiberRejection {
    /// An endpoint maps outside the volume
    IndexOutOfBounds,
    /// An endpoint voxel is background (`0`)
    UnlabeledEndpoint,
    /// An endpoint label exceeds the declared number of regions
    LabelRange,
    /// Both endpoints in one region while self connections are disallowed
    SelfConnection,
}

impl FiberRejection {
    pub fn is_orphan(self) -> bool {
        matches!(
            self,
            FiberRejection::IndexOutOfBounds | FiberRejection::UnlabeledEndpoint
        )
    }

    pub fn label(self) -> FiberLabel {
        if self.is_orphan() {
            FiberLabel::Orphan
        } else {
            FiberLabel::Excluded
        }
    }
}

/// Maps voxel values to region labels
#[derive(Debug, Clone)]
pub struct LabelLookup {
    number_of_regions: usize,
    /// Declared voxel id of every region; empty when every voxel id is
    /// its own label
    voxel_labels: AHashMap<i64, RegionId>,
}

impl LabelLookup {
    /// Voxel values are region labels
    pub fn identity(number_of_regions: usize) -> Self {
        Self {
            number_of_regions,
            voxel_labels: AHashMap::new(),
        }
    }

    /// Voxel values map through each description's voxel id.
    ///
    /// When every description's voxel id equals its label the lookup is the
    /// identity, so labels with no description still resolve. Otherwise only
    /// declared voxel ids resolve and any other value is a label range error.
    pub fn from_descriptions(descriptions: &[RegionDescription], number_of_regions: usize) -> Self {
        if descriptions.iter().all(|d| d.voxel_id == i64::from(d.label)) {
            return Self::identity(number_of_regions);
        }
        Self {
            number_of_regions,
            voxel_labels: descriptions.iter().map(|d| (d.voxel_id, d.label)).collect(),
        }
    }

    pub fn number_of_regions(&self) -> usize {
        self.number_of_regions
    }

    /// Region label of a non-zero voxel value
    pub fn region(&self, value: i64) -> Result<RegionId, FiberRejection> {
        if value == 0 {
            return Err(FiberRejection::UnlabeledEndpoint);
        }
        let label = if self.voxel_labels.is_empty() {
            value
        } else {
            let label = self
                .voxel_labels
                .get(&value)
                .ok_or(FiberRejection::LabelRange)?;
            i64::from(*label)
        };
        if label < 1 || label as u64 > self.number_of_regions as u64 {
            return Err(FiberRejection::LabelRange);
        }
        Ok(label as RegionId)
    }
}

/// Classify one streamline from its endpoint voxels
pub fn classify_endpoints(
    endpoints: Option<EndpointVoxels>,
    parcellation: &ParcellationVolume,
    lookup: &LabelLookup,
    allow_self_connections: bool,
) -> Result<EdgeKey, FiberRejection> {
    let [start, end] = endpoints.ok_or(FiberRejection::IndexOutOfBounds)?;
    let start_value = parcellation
        .get(start)
        .ok_or(FiberRejection::IndexOutOfBounds)?;
    let end_value = parcellation
        .get(end)
        .ok_or(FiberRejection::IndexOutOfBounds)?;

    if start_value == 0 || end_value == 0 {
        return Err(FiberRejection::UnlabeledEndpoint);
    }
    let key = EdgeKey::new(lookup.region(start_value)?, lookup.region(end_value)?);
    if key.is_self_loop() && !allow_self_connections {
        return Err(FiberRejection::SelfConnection);
    }
    Ok(key)
}

/// Outcome tallies of one classification pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassificationCounts {
    pub total: usize,
    pub valid: usize,
    pub out_of_volume: usize,
    pub unlabeled: usize,
    pub label_range: usize,
    pub self_connections: usize,
}

impl ClassificationCounts {
    pub fn orphans(&self) -> usize {
        self.out_of_volume + self.unlabeled
    }

    /// Streamlines dropped without being orphans
    pub fn excluded(&self) -> usize {
        self.label_range + self.self_connections
    }

    pub fn percent(&self, count: usize) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            count as f64 * 100.0 / self.total as f64
        }
    }

    fn record(&mut self, outcome: Result<EdgeKey, FiberRejection>) {
        self.total += 1;
        match outcome {
            Ok(_) => self.valid += 1,
            Err(FiberRejection::IndexOutOfBounds) => self.out_of_volume += 1,
            Err(FiberRejection::UnlabeledEndpoint) => self.unlabeled += 1,
            Err(FiberRejection::LabelRange) => self.label_range += 1,
            Err(FiberRejection::SelfConnection) => self.self_connections += 1,
        }
    }
}

/// Per-streamline labels of one resolution
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    /// One entry per streamline, in tractogram order
    pub labels: Vec<FiberLabel>,
    /// Indices of valid streamlines, ascending
    pub valid_fiber_indices: Vec<usize>,
    pub counts: ClassificationCounts,
}

impl Classification {
    /// Canonical pair of each valid streamline, parallel to `valid_fiber_indices`
    pub fn valid_pairs(&self) -> impl Iterator<Item = EdgeKey> + '_ {
        self.valid_fiber_indices
            .iter()
            .filter_map(move |&index| self.labels[index].pair())
    }

    /// `[n_fibers, 2]` rows: pair, `(-1, -1)` for orphans, `(0, 0)` for excluded
    pub fn label_rows(&self) -> Array2<i32> {
        rows(self.labels.iter().map(|label| label.as_row()), self.labels.len())
    }

    /// `[n_valid, 2]` canonical pairs only
    pub fn valid_label_rows(&self) -> Array2<i32> {
        rows(
            self.valid_pairs()
                .map(|key| FiberLabel::Pair(key).as_row()),
            self.valid_fiber_indices.len(),
        )
    }
}

fn rows(iter: impl Iterator<Item = [i32; 2]>, n: usize) -> Array2<i32> {
    let mut out = Array2::<i32>::zeros((n, 2));
    for (row, [a, b]) in iter.enumerate() {
        out[[row, 0]] = a;
        out[[row, 1]] = b;
    }
    out
}

/// Classify every streamline
pub fn classify(
    endpoints: &[Option<EndpointVoxels>],
    parcellation: &ParcellationVolume,
    lookup: &LabelLookup,
    allow_self_connections: bool,
    progress: &PercentCounter<'_>,
) -> Classification {
    let outcomes: Vec<Result<EdgeKey, FiberRejection>> = endpoints
        .par_iter()
        .map(|&voxels| {
            let outcome =
                classify_endpoints(voxels, parcellation, lookup, allow_self_connections);
            progress.tick();
            outcome
        })
        .collect();

    let mut counts = ClassificationCounts::default();
    let mut labels = Vec::with_capacity(outcomes.len());
    let mut valid_fiber_indices = Vec::new();
    for (index, outcome) in outcomes.into_iter().enumerate() {
        counts.record(outcome);
        labels.push(match outcome {
            Ok(key) => {
                valid_fiber_indices.push(index);
                FiberLabel::Pair(key)
            }
            Err(rejection) => rejection.label(),
        });
    }

    Classification {
        labels,
        valid_fiber_indices,
        counts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;
    use tractograph_observability::NoProgress;

    fn parcellation() -> ParcellationVolume {
        let mut data = Array3::<i64>::zeros((10, 10, 10));
        data[[1, 1, 1]] = 1;
        data[[8, 8, 8]] = 2;
        data[[5, 5, 5]] = 5;
        data[[2, 2, 2]] = 1035;
        ParcellationVolume::new(data, [1.0; 3]).unwrap()
    }

    #[test]
    fn test_pairs_are_canonical() {
        let volume = parcellation();
        let lookup = LabelLookup::identity(4);
        let key = classify_endpoints(Some([[8, 8, 8], [1, 1, 1]]), &volume, &lookup, true);
        assert_eq!(key, Ok(EdgeKey::new(1, 2)));
        assert_eq!(key.unwrap().source(), 1);
    }

    #[test]
    fn test_rejections() {
        let volume = parcellation();
        let lookup = LabelLookup::identity(4);
        let classify = |e| classify_endpoints(e, &volume, &lookup, false);

        assert_eq!(classify(None), Err(FiberRejection::IndexOutOfBounds));
        assert_eq!(
            classify(Some([[15, 15, 15], [1, 1, 1]])),
            Err(FiberRejection::IndexOutOfBounds)
        );
        assert_eq!(
            classify(Some([[-1, 0, 0], [1, 1, 1]])),
            Err(FiberRejection::IndexOutOfBounds)
        );
        assert_eq!(
            classify(Some([[0, 0, 0], [1, 1, 1]])),
            Err(FiberRejection::UnlabeledEndpoint)
        );
        assert_eq!(
            classify(Some([[5, 5, 5], [1, 1, 1]])),
            Err(FiberRejection::LabelRange)
        );
        assert_eq!(
            classify(Some([[1, 1, 1], [1, 1, 1]])),
            Err(FiberRejection::SelfConnection)
        );
    }

    #[test]
    fn test_lookup_maps_declared_voxel_ids() {
        let descriptions = vec![
            RegionDescription::unnamed(1),
            RegionDescription {
                voxel_id: 1035,
                ..RegionDescription::unnamed(3)
            },
        ];
        let lookup = LabelLookup::from_descriptions(&descriptions, 4);
        assert_eq!(lookup.region(1035), Ok(3));
        assert_eq!(lookup.region(1), Ok(1));
        assert_eq!(lookup.region(5), Err(FiberRejection::LabelRange));
        assert_eq!(lookup.region(-3), Err(FiberRejection::LabelRange));
    }

    #[test]
    fn test_unclaimed_voxel_values_do_not_alias_labels() {
        // Region 3 lives at voxel value 1035, so a voxel holding 3 is not region 3
        let descriptions = vec![
            RegionDescription::unnamed(1),
            RegionDescription {
                voxel_id: 1035,
                ..RegionDescription::unnamed(3)
            },
        ];
        let lookup = LabelLookup::from_descriptions(&descriptions, 4);
        assert_eq!(lookup.region(3), Err(FiberRejection::LabelRange));
        assert_eq!(lookup.region(2), Err(FiberRejection::LabelRange));
    }

    #[test]
    fn test_identity_descriptions_keep_undeclared_labels() {
        let descriptions = vec![RegionDescription::unnamed(1), RegionDescription::unnamed(3)];
        let lookup = LabelLookup::from_descriptions(&descriptions, 4);
        assert_eq!(lookup.region(2), Ok(2));
        assert_eq!(lookup.region(5), Err(FiberRejection::LabelRange));
    }

    #[test]
    fn test_classify_counts_and_rows() {
        let volume = parcellation();
        let lookup = LabelLookup::identity(4);
        let endpoints = vec![
            Some([[1, 1, 1], [8, 8, 8]]),
            Some([[0, 0, 0], [8, 8, 8]]),
            Some([[5, 5, 5], [8, 8, 8]]),
            None,
            Some([[8, 8, 8], [8, 8, 8]]),
        ];
        let reporter = NoProgress;
        let counter = PercentCounter::new(&reporter, "scale1", "classify", endpoints.len());
        let result = classify(&endpoints, &volume, &lookup, true, &counter);

        assert_eq!(result.labels.len(), 5);
        assert_eq!(result.valid_fiber_indices, vec![0, 4]);
        assert_eq!(
            result.counts,
            ClassificationCounts {
                total: 5,
                valid: 2,
                out_of_volume: 1,
                unlabeled: 1,
                label_range: 1,
                self_connections: 0,
            }
        );
        assert_eq!(result.counts.orphans(), 2);
        assert_eq!(counter.done(), 5);

        let rows = result.label_rows();
        assert_eq!(rows.row(0).to_vec(), vec![1, 2]);
        assert_eq!(rows.row(1).to_vec(), vec![-1, -1]);
        assert_eq!(rows.row(2).to_vec(), vec![0, 0]);
        assert_eq!(result.valid_label_rows().row(1).to_vec(), vec![2, 2]);
    }
}
