// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Connectome Build Tool

Builds connectomes for every resolution configured in `tractograph.toml`.

Usage:
  cargo run --bin build_connectome -- [--config <tractograph.toml>] [--key=value ...] [--debug-<crate> | --debug-all]

Overrides (`--key=value`): output_dir, num_threads, log_level, compute_curvature, tractogram

Example:
  cargo run --release --bin build_connectome -- --config study/tractograph.toml --num_threads=8 --debug-tractograph-connectome

Exit status is 0 when every resolution succeeded, 2 when some failed, 1 on a fatal error.
*/

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use tracing::{error, info};
use tractograph::config::{load_config, validate_config};
use tractograph::connectome::ConnectomeEngine;
use tractograph::observability::{debug_flags_help, init_logging, parse_debug_flags, LoggingOptions};

struct CliArgs {
    config_path: Option<PathBuf>,
    overrides: HashMap<String, String>,
}

fn usage(program: &str) -> String {
    format!(
        "Usage: {} [--config <tractograph.toml>] [--key=value ...] [--debug-<crate> | --debug-all]\n\n{}",
        program,
        debug_flags_help()
    )
}

fn parse_args(args: &[String]) -> Result<Option<CliArgs>> {
    let mut config_path = None;
    let mut overrides = HashMap::new();

    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        if arg == "--help" || arg == "-h" {
            return Ok(None);
        }
        if arg.starts_with("--debug-") {
            continue;
        }
        if arg == "--config" {
            let path = iter.next().context("--config needs a path")?;
            config_path = Some(PathBuf::from(path));
            continue;
        }
        match arg.strip_prefix("--").and_then(|kv| kv.split_once('=')) {
            Some((key, value)) => {
                overrides.insert(key.to_string(), value.to_string());
            }
            None => bail!("Unrecognized argument '{}'", arg),
        }
    }

    Ok(Some(CliArgs {
        config_path,
        overrides,
    }))
}

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let program = args.first().map(String::as_str).unwrap_or("build_connectome");

    let cli = match parse_args(&args) {
        Ok(Some(cli)) => cli,
        Ok(None) => {
            println!("{}", usage(program));
            return Ok(());
        }
        Err(e) => {
            eprintln!("{}\n\n{}", e, usage(program));
            std::process::exit(1);
        }
    };

    let config = load_config(cli.config_path.as_deref(), Some(&cli.overrides))
        .context("Failed to load configuration")?;
    validate_config(&config)?;

    let debug_flags = parse_debug_flags();
    let logging = LoggingOptions {
        level: config.logging.level.clone(),
        file_logging: config.logging.file_logging,
        log_dir: config.logging.log_dir.clone(),
        retention_days: config.logging.retention_days,
        retention_runs: config.logging.retention_runs,
    };
    let _guard = init_logging(&debug_flags, &logging)?;

    info!(
        target: "tractograph",
        "tractograph {} - {} resolution(s), output in {}",
        tractograph::VERSION,
        config.effective_resolutions().len(),
        config.engine.output_dir.display()
    );

    let report = ConnectomeEngine::new(config).run()?;

    for summary in report.succeeded() {
        info!(
            target: "tractograph",
            "{}: {} nodes, {} edges, {} of {} streamlines connected",
            summary.key,
            summary.graph.node_count(),
            summary.graph.edge_count(),
            summary.counts.valid,
            summary.counts.total
        );
    }
    for (key, err) in report.failed() {
        error!(target: "tractograph", "{} failed: {}", key, err);
    }

    if !report.is_complete() {
        std::process::exit(2);
    }
    Ok(())
}
