// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while building or loading tractograph data structures.
///
/// # Examples
/// ```
/// use tractograph_structures::{ParcellationVolume, StructuresError};
/// use ndarray::Array3;
///
/// let result = ParcellationVolume::new(Array3::zeros((2, 2, 2)), [0.0, 1.0, 1.0]);
/// assert!(matches!(result, Err(StructuresError::BadParameters(_))));
/// ```
#[derive(Debug, Error)]
pub enum StructuresError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Stream(#[from] std::io::Error),

    /// Malformed TrackVis file
    #[error("Invalid TrackVis data: {0}")]
    TrackVis(String),

    /// Malformed or unsupported NIfTI volume
    #[error("Invalid NIfTI volume: {0}")]
    Nifti(String),

    /// Malformed GraphML document
    #[error("Invalid GraphML: {0}")]
    Graphml(String),

    /// Invalid parameters provided to a constructor
    #[error("Bad parameters: {0}")]
    BadParameters(String),
}

impl StructuresError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StructuresError::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<quick_xml::Error> for StructuresError {
    fn from(err: quick_xml::Error) -> Self {
        StructuresError::Graphml(err.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for StructuresError {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        StructuresError::Graphml(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StructuresError>;
