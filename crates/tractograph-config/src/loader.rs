// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration file loading with override support
//!
//! This module implements the 3-tier configuration loading system:
//! 1. TOML file (base defaults)
//! 2. Environment variables (runtime overrides)
//! 3. CLI arguments (explicit user overrides)

use crate::{ConfigError, ConfigResult, EngineConfig};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_FILE_NAME: &str = "tractograph.toml";

/// Find the tractograph configuration file
///
/// Search order:
/// 1. `TRACTOGRAPH_CONFIG_PATH` environment variable
/// 2. Current working directory: `./tractograph.toml`
/// 3. Up to 5 parent directories
///
/// # Errors
///
/// Returns `ConfigError::FileNotFound` if no config file is found in any location
pub fn find_config_file() -> ConfigResult<PathBuf> {
    if let Ok(env_path) = env::var("TRACTOGRAPH_CONFIG_PATH") {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        } else {
            return Err(ConfigError::FileNotFound(format!(
                "Config file specified by TRACTOGRAPH_CONFIG_PATH not found: {}",
                path.display()
            )));
        }
    }

    let mut search_paths = Vec::new();

    if let Ok(cwd) = env::current_dir() {
        search_paths.push(cwd.join(CONFIG_FILE_NAME));

        let mut current = cwd.clone();
        for _ in 0..5 {
            if let Some(parent) = current.parent() {
                search_paths.push(parent.join(CONFIG_FILE_NAME));
                current = parent.to_path_buf();
            }
        }
    }

    for path in &search_paths {
        if path.exists() {
            return Ok(path.clone());
        }
    }

    let search_list = search_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    Err(ConfigError::FileNotFound(format!(
        "Configuration file '{}' not found in any of these locations:\n{}\n\nSet TRACTOGRAPH_CONFIG_PATH environment variable to specify custom location.",
        CONFIG_FILE_NAME, search_list
    )))
}

/// Load configuration from TOML file
///
/// # Arguments
///
/// * `config_path` - Optional path to config file. If `None`, will search for config file.
/// * `cli_args` - Optional CLI argument overrides
///
/// # Errors
///
/// Returns error if config file is not found or contains invalid TOML.
/// Validation is a separate step (`validate_config`).
pub fn load_config(
    config_path: Option<&Path>,
    cli_args: Option<&HashMap<String, String>>,
) -> ConfigResult<EngineConfig> {
    let config_file = if let Some(path) = config_path {
        path.to_path_buf()
    } else {
        find_config_file()?
    };

    let content = fs::read_to_string(&config_file)?;
    let mut config: EngineConfig = toml::from_str(&content)?;

    // Relative input paths are resolved against the config file's directory
    if let Some(base) = config_file.parent() {
        resolve_relative_paths(&mut config, base);
    }

    apply_environment_overrides(&mut config);

    if let Some(cli) = cli_args {
        apply_cli_overrides(&mut config, cli);
    }

    Ok(config)
}

fn resolve_relative_paths(config: &mut EngineConfig, base: &Path) {
    let resolve = |path: &mut PathBuf| {
        if path.is_relative() && !path.as_os_str().is_empty() {
            *path = base.join(&*path);
        }
    };

    if let Some(path) = config.input.tractogram.as_mut() {
        resolve(path);
    }
    config.input.candidate_volumes.iter_mut().for_each(resolve);
    for res in &mut config.resolutions {
        if let Some(path) = res.parcellation.as_mut() {
            resolve(path);
        }
        if let Some(path) = res.region_description.as_mut() {
            resolve(path);
        }
    }
    for map in &mut config.scalar_maps {
        resolve(&mut map.path);
    }
    resolve(&mut config.engine.output_dir);
}

fn parse_flag(value: &str) -> bool {
    let lower = value.to_lowercase();
    lower == "true" || value == "1" || lower == "yes"
}

/// Apply environment variable overrides to configuration
///
/// Supported environment variables:
/// - `TRACTOGRAPH_OUTPUT_DIR` -> `engine.output_dir`
/// - `TRACTOGRAPH_NUM_THREADS` -> `engine.num_threads`
/// - `TRACTOGRAPH_COMPUTE_CURVATURE` -> `engine.compute_curvature`
/// - `TRACTOGRAPH_TRACTOGRAM` -> `input.tractogram`
/// - `TRACTOGRAPH_LOG_LEVEL` -> `logging.level`
pub fn apply_environment_overrides(config: &mut EngineConfig) {
    if let Ok(value) = env::var("TRACTOGRAPH_OUTPUT_DIR") {
        config.engine.output_dir = PathBuf::from(value);
    }
    if let Ok(value) = env::var("TRACTOGRAPH_NUM_THREADS") {
        if let Ok(threads) = value.parse::<usize>() {
            config.engine.num_threads = threads;
        }
    }
    if let Ok(value) = env::var("TRACTOGRAPH_COMPUTE_CURVATURE") {
        config.engine.compute_curvature = parse_flag(&value);
    }
    if let Ok(value) = env::var("TRACTOGRAPH_TRACTOGRAM") {
        config.input.tractogram = Some(PathBuf::from(value));
    }
    if let Ok(value) = env::var("TRACTOGRAPH_LOG_LEVEL") {
        config.logging.level = value;
    }
}

/// Apply CLI argument overrides to configuration
///
/// # Arguments
///
/// * `config` - Configuration to modify
/// * `cli_args` - HashMap of CLI arguments (e.g., `{"output_dir": "/tmp/out", "num_threads": "4"}`)
pub fn apply_cli_overrides(config: &mut EngineConfig, cli_args: &HashMap<String, String>) {
    if let Some(value) = cli_args.get("output_dir") {
        config.engine.output_dir = PathBuf::from(value);
    }
    if let Some(value) = cli_args.get("num_threads") {
        if let Ok(threads) = value.parse::<usize>() {
            config.engine.num_threads = threads;
        }
    }
    if let Some(value) = cli_args.get("compute_curvature") {
        config.engine.compute_curvature = parse_flag(value);
    }
    if let Some(value) = cli_args.get("tractogram") {
        config.input.tractogram = Some(PathBuf::from(value));
    }
    if let Some(value) = cli_args.get("log_level") {
        config.logging.level = value.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::tempdir;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_find_config_file_env_var() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("custom_config.toml");
        File::create(&config_path).unwrap();

        env::set_var("TRACTOGRAPH_CONFIG_PATH", config_path.to_str().unwrap());
        let result = find_config_file();
        env::remove_var("TRACTOGRAPH_CONFIG_PATH");

        assert_eq!(result.unwrap(), config_path);
    }

    #[test]
    fn test_find_config_file_env_var_missing() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        env::set_var("TRACTOGRAPH_CONFIG_PATH", "/definitely/not/here.toml");
        let result = find_config_file();
        env::remove_var("TRACTOGRAPH_CONFIG_PATH");

        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_load_minimal_config_resolves_relative_paths() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        let dir = tempdir().unwrap();
        let config_path = dir.path().join(CONFIG_FILE_NAME);

        let mut file = File::create(&config_path).unwrap();
        writeln!(file, "[engine]").unwrap();
        writeln!(file, "num_threads = 4").unwrap();
        writeln!(file, "[input]").unwrap();
        writeln!(file, "tractogram = \"tracks.trk\"").unwrap();
        writeln!(file, "[[resolutions]]").unwrap();
        writeln!(file, "key = \"scale1\"").unwrap();
        writeln!(file, "parcellation = \"/abs/scale1.nii.gz\"").unwrap();

        let config = load_config(Some(&config_path), None).unwrap();

        assert_eq!(config.engine.num_threads, 4);
        assert_eq!(
            config.input.tractogram.as_deref(),
            Some(dir.path().join("tracks.trk").as_path())
        );
        assert_eq!(
            config.resolutions[0].parcellation.as_deref(),
            Some(Path::new("/abs/scale1.nii.gz"))
        );
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        let dir = tempdir().unwrap();
        let config_path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&config_path, "[engine\nnum_threads = ").unwrap();

        let result = load_config(Some(&config_path), None);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_environment_overrides() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        let mut config = EngineConfig::default();

        env::set_var("TRACTOGRAPH_NUM_THREADS", "8");
        env::set_var("TRACTOGRAPH_COMPUTE_CURVATURE", "yes");

        apply_environment_overrides(&mut config);

        env::remove_var("TRACTOGRAPH_NUM_THREADS");
        env::remove_var("TRACTOGRAPH_COMPUTE_CURVATURE");

        assert_eq!(config.engine.num_threads, 8);
        assert!(config.engine.compute_curvature);
    }

    #[test]
    fn test_override_precedence() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        let dir = tempdir().unwrap();
        let config_path = dir.path().join(CONFIG_FILE_NAME);

        let mut file = File::create(&config_path).unwrap();
        writeln!(file, "[engine]").unwrap();
        writeln!(file, "num_threads = 2").unwrap();
        writeln!(file, "[logging]").unwrap();
        writeln!(file, "level = \"warn\"").unwrap();

        env::set_var("TRACTOGRAPH_NUM_THREADS", "6");
        env::set_var("TRACTOGRAPH_LOG_LEVEL", "debug");

        let mut cli_args = HashMap::new();
        cli_args.insert("log_level".to_string(), "trace".to_string());

        let config = load_config(Some(&config_path), Some(&cli_args)).unwrap();

        env::remove_var("TRACTOGRAPH_NUM_THREADS");
        env::remove_var("TRACTOGRAPH_LOG_LEVEL");

        // CLI wins for log level, env wins for threads (no CLI override)
        assert_eq!(config.logging.level, "trace");
        assert_eq!(config.engine.num_threads, 6);
    }
}
