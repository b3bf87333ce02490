// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Built-in parcellation schemes and their per-resolution region counts.

use serde::{Deserialize, Serialize};

/// A resolution declared by a built-in scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemeResolution {
    pub key: &'static str,
    pub number_of_regions: usize,
}

const LAUSANNE2008: &[SchemeResolution] = &[
    SchemeResolution { key: "scale33", number_of_regions: 83 },
    SchemeResolution { key: "scale60", number_of_regions: 129 },
    SchemeResolution { key: "scale125", number_of_regions: 234 },
    SchemeResolution { key: "scale250", number_of_regions: 463 },
    SchemeResolution { key: "scale500", number_of_regions: 1015 },
];

const NATIVE_FREESURFER: &[SchemeResolution] = &[SchemeResolution {
    key: "freesurferaparc",
    number_of_regions: 83,
}];

/// Parcellation scheme the resolutions belong to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub enum ParcellationScheme {
    Lausanne2008,
    NativeFreesurfer,
    /// Resolutions come entirely from `[[resolutions]]`
    #[default]
    Custom,
}

impl ParcellationScheme {
    pub fn resolutions(self) -> &'static [SchemeResolution] {
        match self {
            ParcellationScheme::Lausanne2008 => LAUSANNE2008,
            ParcellationScheme::NativeFreesurfer => NATIVE_FREESURFER,
            ParcellationScheme::Custom => &[],
        }
    }
}
