// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

use std::path::{Path, PathBuf};

use thiserror::Error;
use tractograph_serialization::SerializationError;
use tractograph_structures::StructuresError;

fn describe_path(path: &Option<PathBuf>) -> String {
    match path {
        Some(path) => format!(" ({})", path.display()),
        None => String::new(),
    }
}

/// Engine errors.
///
/// Per-streamline problems never surface here; they are tallied by the
/// classifier. Every resolution-scoped variant names its resolution.
#[derive(Debug, Error)]
pub enum ConnectomeError {
    /// A required input for a resolution is not configured or does not exist
    #[error("resolution '{resolution}': missing {what}{}", describe_path(.path))]
    MissingInput {
        resolution: String,
        what: &'static str,
        path: Option<PathBuf>,
    },

    /// An input exists but could not be loaded or is inconsistent
    #[error("resolution '{resolution}': invalid {what}: {source}")]
    InvalidInput {
        resolution: String,
        what: &'static str,
        #[source]
        source: StructuresError,
    },

    #[error("resolution '{resolution}': failed to write {format} output: {source}")]
    Serialization {
        resolution: String,
        format: &'static str,
        #[source]
        source: SerializationError,
    },

    #[error("resolution '{resolution}': aborted")]
    Aborted { resolution: String },

    /// Run-wide input (tractogram, scalar map) failed to load
    #[error("failed to load {what} {}: {source}", .path.display())]
    RunInput {
        what: &'static str,
        path: PathBuf,
        #[source]
        source: StructuresError,
    },

    #[error("invalid engine configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to start worker pool: {0}")]
    ThreadPool(String),
}

impl ConnectomeError {
    pub(crate) fn missing(resolution: &str, what: &'static str, path: Option<&Path>) -> Self {
        ConnectomeError::MissingInput {
            resolution: resolution.to_string(),
            what,
            path: path.map(Path::to_path_buf),
        }
    }

    pub(crate) fn serialization<'a>(
        resolution: &'a str,
        format: &'static str,
    ) -> impl FnOnce(SerializationError) -> Self + 'a {
        move |source| ConnectomeError::Serialization {
            resolution: resolution.to_string(),
            format,
            source,
        }
    }

    /// Resolution the error belongs to, if it is resolution-scoped
    pub fn resolution(&self) -> Option<&str> {
        match self {
            ConnectomeError::MissingInput { resolution, .. }
            | ConnectomeError::InvalidInput { resolution, .. }
            | ConnectomeError::Serialization { resolution, .. }
            | ConnectomeError::Aborted { resolution } => Some(resolution),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ConnectomeError>;
