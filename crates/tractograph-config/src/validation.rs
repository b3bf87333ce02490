// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration validation
//!
//! This module provides validation logic to ensure configuration values are
//! consistent, within valid ranges, and don't conflict with each other.

use std::collections::HashMap;

use crate::{ConfigError, ConfigResult, EngineConfig};

/// Scalar map names whose `<name>_mean` columns would shadow built-in metrics
const RESERVED_SCALAR_NAMES: &[&str] = &["fiber_length", "number_of_fibers", "source", "target"];

/// Longest statistic suffix appended to a scalar map name
const LONGEST_STAT_SUFFIX: &str = "_median";

/// MATLAB caps struct field names at 63 characters
const MAX_FIELD_NAME_LEN: usize = 63;

/// Validation errors that can occur during config validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigValidationError {
    DuplicateKey { section: String, key: String },
    MissingRequired { field: String },
    InvalidValue { field: String, reason: String },
    UnknownReference { field: String, value: String },
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateKey { section, key } => {
                write!(f, "Duplicate {} key '{}'", section, key)
            }
            Self::MissingRequired { field } => {
                write!(f, "Missing required configuration: {}", field)
            }
            Self::InvalidValue { field, reason } => {
                write!(f, "Invalid configuration value for {}: {}", field, reason)
            }
            Self::UnknownReference { field, value } => {
                write!(f, "{} refers to unknown resolution '{}'", field, value)
            }
        }
    }
}

/// Validate the complete configuration
///
/// Checks for:
/// - Resolution keys (non-empty, unique, positive region counts)
/// - Scalar map names (non-empty, unique, usable as column prefixes)
/// - Cross references (filtered tractogram owner)
/// - Engine settings (at least one metric)
///
/// # Errors
///
/// Returns `ConfigError::ValidationError` listing every problem found
pub fn validate_config(config: &EngineConfig) -> ConfigResult<()> {
    let mut errors = Vec::new();

    validate_resolutions(config, &mut errors);
    validate_scalar_maps(config, &mut errors);
    validate_references(config, &mut errors);
    validate_engine(config, &mut errors);

    if !errors.is_empty() {
        let error_messages = errors
            .iter()
            .map(|e| format!("  - {}", e))
            .collect::<Vec<_>>()
            .join("\n");

        return Err(ConfigError::ValidationError(format!(
            "Configuration validation failed:\n{}",
            error_messages
        )));
    }

    Ok(())
}

fn validate_resolutions(config: &EngineConfig, errors: &mut Vec<ConfigValidationError>) {
    let mut seen: HashMap<&str, usize> = HashMap::new();

    for (index, res) in config.resolutions.iter().enumerate() {
        if res.key.trim().is_empty() {
            errors.push(ConfigValidationError::MissingRequired {
                field: format!("resolutions[{}].key", index),
            });
            continue;
        }

        let count = seen.entry(res.key.as_str()).or_insert(0);
        *count += 1;
        if *count == 2 {
            errors.push(ConfigValidationError::DuplicateKey {
                section: "resolution".to_string(),
                key: res.key.clone(),
            });
        }

        if res.number_of_regions == Some(0) {
            errors.push(ConfigValidationError::InvalidValue {
                field: format!("resolutions[{}].number_of_regions", index),
                reason: "must be at least 1".to_string(),
            });
        }
    }
}

fn validate_scalar_maps(config: &EngineConfig, errors: &mut Vec<ConfigValidationError>) {
    let mut seen: HashMap<&str, usize> = HashMap::new();

    for (index, map) in config.scalar_maps.iter().enumerate() {
        if map.name.is_empty() {
            errors.push(ConfigValidationError::MissingRequired {
                field: format!("scalar_maps[{}].name", index),
            });
            continue;
        }

        // Names become metric columns and MAT field names (`<name>_mean`)
        let mut chars = map.name.chars();
        let identifier = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !identifier {
            errors.push(ConfigValidationError::InvalidValue {
                field: format!("scalar_maps[{}].name", index),
                reason: format!(
                    "'{}' must start with an ASCII letter followed by letters, digits or '_'",
                    map.name
                ),
            });
        } else if map.name.len() + LONGEST_STAT_SUFFIX.len() > MAX_FIELD_NAME_LEN {
            errors.push(ConfigValidationError::InvalidValue {
                field: format!("scalar_maps[{}].name", index),
                reason: format!(
                    "'{}' is longer than {} characters",
                    map.name,
                    MAX_FIELD_NAME_LEN - LONGEST_STAT_SUFFIX.len()
                ),
            });
        }

        if RESERVED_SCALAR_NAMES.contains(&map.name.as_str()) {
            errors.push(ConfigValidationError::InvalidValue {
                field: format!("scalar_maps[{}].name", index),
                reason: format!("'{}' collides with a built-in metric", map.name),
            });
        }

        let count = seen.entry(map.name.as_str()).or_insert(0);
        *count += 1;
        if *count == 2 {
            errors.push(ConfigValidationError::DuplicateKey {
                section: "scalar map".to_string(),
                key: map.name.clone(),
            });
        }

        if map.path.as_os_str().is_empty() {
            errors.push(ConfigValidationError::MissingRequired {
                field: format!("scalar_maps[{}].path", index),
            });
        }
    }
}

fn validate_references(config: &EngineConfig, errors: &mut Vec<ConfigValidationError>) {
    let Some(owner) = config.engine.filtered_tractogram_owner.as_deref() else {
        return;
    };

    let known = config
        .effective_resolutions()
        .iter()
        .any(|res| res.key == owner);
    if !known {
        errors.push(ConfigValidationError::UnknownReference {
            field: "engine.filtered_tractogram_owner".to_string(),
            value: owner.to_string(),
        });
    }
}

fn validate_engine(config: &EngineConfig, errors: &mut Vec<ConfigValidationError>) {
    if config.engine.metrics.is_empty() {
        errors.push(ConfigValidationError::InvalidValue {
            field: "engine.metrics".to_string(),
            reason: "at least one metric must be enabled".to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ResolutionConfig, ScalarMapConfig};
    use std::path::PathBuf;

    fn resolution(key: &str) -> ResolutionConfig {
        ResolutionConfig {
            key: key.to_string(),
            parcellation: Some(PathBuf::from(format!("{}.nii.gz", key))),
            region_description: Some(PathBuf::from(format!("{}.graphml", key))),
            number_of_regions: None,
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_duplicate_resolution_key() {
        let mut config = EngineConfig::default();
        config.resolutions = vec![resolution("scale1"), resolution("scale1")];

        let result = validate_config(&config);
        assert!(result.is_err());

        if let Err(ConfigError::ValidationError(msg)) = result {
            assert!(msg.contains("Duplicate resolution key 'scale1'"));
        }
    }

    #[test]
    fn test_all_problems_reported_together() {
        let mut config = EngineConfig::default();
        let mut zero = resolution("scale2");
        zero.number_of_regions = Some(0);
        config.resolutions = vec![resolution(""), zero];
        config.scalar_maps = vec![ScalarMapConfig {
            name: "fa map".to_string(),
            path: PathBuf::from("fa.nii"),
        }];
        config.engine.metrics.clear();

        let Err(ConfigError::ValidationError(msg)) = validate_config(&config) else {
            panic!("expected validation error");
        };
        assert!(msg.contains("resolutions[0].key"));
        assert!(msg.contains("resolutions[1].number_of_regions"));
        assert!(msg.contains("scalar_maps[0].name"));
        assert!(msg.contains("engine.metrics"));
    }

    #[test]
    fn test_unknown_filtered_tractogram_owner() {
        let mut config = EngineConfig::default();
        config.resolutions = vec![resolution("scale1")];
        config.engine.filtered_tractogram_owner = Some("scale9".to_string());

        let result = validate_config(&config);
        if let Err(ConfigError::ValidationError(msg)) = result {
            assert!(msg.contains("scale9"));
        } else {
            panic!("expected validation error");
        }
    }

    #[test]
    fn test_scalar_map_names_must_be_field_identifiers() {
        for name in ["fa-map", "2fa", "_fa"] {
            let mut config = EngineConfig::default();
            config.scalar_maps = vec![ScalarMapConfig {
                name: name.to_string(),
                path: PathBuf::from("fa.nii.gz"),
            }];

            let Err(ConfigError::ValidationError(msg)) = validate_config(&config) else {
                panic!("'{}' should be rejected", name);
            };
            assert!(msg.contains("scalar_maps[0].name"), "{}", msg);
        }

        let mut config = EngineConfig::default();
        config.scalar_maps = vec![ScalarMapConfig {
            name: "fa_map2".to_string(),
            path: PathBuf::from("fa.nii.gz"),
        }];
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_scalar_map_name_leaves_room_for_suffix() {
        let scalar = |len: usize| ScalarMapConfig {
            name: "a".repeat(len),
            path: PathBuf::from("fa.nii.gz"),
        };

        let mut config = EngineConfig::default();
        config.scalar_maps = vec![scalar(56)];
        assert!(validate_config(&config).is_ok());

        config.scalar_maps = vec![scalar(57)];
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_duplicate_scalar_map_name() {
        let mut config = EngineConfig::default();
        let map = ScalarMapConfig {
            name: "gfa".to_string(),
            path: PathBuf::from("gfa.nii.gz"),
        };
        config.scalar_maps = vec![map.clone(), map];

        let result = validate_config(&config);
        assert!(result.is_err());
    }
}
