//! ultragz
//!
//! Reads one input, races every available gzip compressor over it and
//! writes the smallest output that both decoders accept.

mod logger;

use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context};
use bytes::Bytes;
use clap::{ArgGroup, Parser};
use tracing::{error, info};

use ultragz_core::arbiter::{RaceJob, RaceOutcome};
use ultragz_core::candidates::Tool;
use ultragz_core::config::{Configuration, RaceConfig};
use ultragz_core::constants::{PARAM_CORES, PARAM_INTENSITY};
use ultragz_core::engine::TaskEngine;

use crate::logger::{logger_init, LoggerConfig, LoggerError, LoggerFormat};

#[derive(Parser, Debug)]
#[command(
    name = "ultragz",
    version,
    about = "Best-of-N gzip compressor",
    long_about = "Runs every available gzip encoder on the input and keeps the smallest \
                  output that decodes back to the input with two independent decoders."
)]
#[command(group(ArgGroup::new("source").required(true).args(["input", "stdin"])))]
#[command(group(ArgGroup::new("sink").required(true).args(["output", "stdout"])))]
struct Cli {
    /// File to compress.
    #[arg(long = "in", value_name = "PATH")]
    input: Option<PathBuf>,

    /// Read the input from standard input.
    #[arg(long)]
    stdin: bool,

    /// Where to write the gzip output.
    #[arg(long = "out", value_name = "PATH")]
    output: Option<PathBuf>,

    /// Write the gzip output to standard output.
    #[arg(long)]
    stdout: bool,

    /// Effort from 0 (fast) to 10 (exhaustive).
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=10))]
    intensity: Option<u8>,

    /// Worker threads (1..=99, defaults to CPU count).
    #[arg(long)]
    cores: Option<i64>,

    /// Executable override, e.g. `--tool zopfli=/opt/bin/zopfli`. Repeatable.
    #[arg(long = "tool", value_name = "NAME=PATH")]
    tools: Vec<String>,

    /// Raw configuration entry, e.g. `--param relayCapacity=65536`. Repeatable.
    #[arg(long = "param", value_name = "KEY=VALUE")]
    params: Vec<String>,

    /// Log filter directive (overridden by RUST_LOG).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log output format: text or json.
    #[arg(long, default_value = "text")]
    log_format: LoggerFormat,

    /// Print the race report as JSON on stderr.
    #[arg(long, default_value_t = false)]
    report: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_cfg = LoggerConfig {
        format: cli.log_format,
        level: cli.log_level.clone(),
        ..LoggerConfig::default()
    };
    match logger_init(&log_cfg) {
        Ok(()) | Err(LoggerError::AlreadyInitialized) => {}
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    }

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(target: "ultragz::cli", "{e:#}");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let config = RaceConfig::from_configuration(&configuration_from(cli)?)
        .context("invalid configuration")?;

    let (input, name) = read_input(cli)?;

    let engine = TaskEngine::new(config.parallelism()).context("failed to start task engine")?;
    let result = race(&engine, input, &name, config);
    engine.shutdown();
    let outcome = result?;

    if cli.report {
        let json = outcome.snapshot.to_json().context("failed to serialise race report")?;
        eprintln!("{json}");
    }
    write_output(cli, &outcome.best)
}

fn race(engine: &TaskEngine, input: Bytes, name: &str, config: RaceConfig) -> anyhow::Result<RaceOutcome> {
    let job = RaceJob::builder(engine.handle(), input, name).config(config).build()?;
    info!(
        target: "ultragz::cli",
        job = %job.name(),
        workers = engine.worker_count(),
        tools = job.tools().len(),
        "compressing"
    );
    Ok(job.run()?)
}

/// Map flags onto the same keys the command-line store understands.
fn configuration_from(cli: &Cli) -> anyhow::Result<Configuration> {
    let cfg = Configuration::new();
    // Dedicated flags below take precedence over raw entries.
    for param in &cli.params {
        cfg.put_command_line(param)?;
    }
    if let Some(cores) = cli.cores {
        cfg.put_command_line(&format!("{PARAM_CORES}={cores}"))?;
    }
    if let Some(intensity) = cli.intensity {
        cfg.put_command_line(&format!("{PARAM_INTENSITY}={intensity}"))?;
    }
    for spec in &cli.tools {
        let Some((name, path)) = spec.split_once('=') else {
            bail!("--tool expects NAME=PATH, got {spec:?}");
        };
        if !Tool::ALL.iter().any(|t| t.name() == name) {
            let known: Vec<&str> = Tool::ALL.iter().map(|t| t.name()).collect();
            bail!("unknown tool {name:?} (known: {})", known.join(", "));
        }
        cfg.put(name, path);
    }
    Ok(cfg)
}

fn read_input(cli: &Cli) -> anyhow::Result<(Bytes, String)> {
    match &cli.input {
        Some(path) => {
            let data = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            Ok((Bytes::from(data), name))
        }
        None => {
            let mut data = Vec::new();
            io::stdin()
                .lock()
                .read_to_end(&mut data)
                .context("failed to read standard input")?;
            Ok((Bytes::from(data), "stdin".to_string()))
        }
    }
}

fn write_output(cli: &Cli, data: &[u8]) -> anyhow::Result<()> {
    match &cli.output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, data).with_context(|| format!("failed to write {}", path.display()))
        }
        None => {
            let mut out = io::stdout().lock();
            out.write_all(data).context("failed to write standard output")?;
            out.flush().context("failed to flush standard output")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_and_sink_are_required_and_exclusive() {
        assert!(Cli::try_parse_from(["ultragz", "--stdin"]).is_err());
        assert!(Cli::try_parse_from(["ultragz", "--stdin", "--in", "a", "--stdout"]).is_err());
        assert!(Cli::try_parse_from(["ultragz", "--stdin", "--stdout"]).is_ok());
    }

    #[test]
    fn flags_map_to_store_keys() {
        let cli = Cli::try_parse_from([
            "ultragz",
            "--in",
            "data.bin",
            "--out",
            "data.bin.gz",
            "--cores",
            "3",
            "--intensity",
            "9",
            "--tool",
            "zopfli=/opt/zopfli",
        ])
        .unwrap();
        let cfg = configuration_from(&cli).unwrap();
        assert_eq!(cfg.get(PARAM_CORES).as_deref(), Some("3"));
        assert_eq!(cfg.get(PARAM_INTENSITY).as_deref(), Some("9"));
        assert_eq!(cfg.get("zopfli").as_deref(), Some("/opt/zopfli"));

        let config = RaceConfig::from_configuration(&cfg).unwrap();
        assert_eq!(config.workers, 3);
        assert_eq!(config.intensity, 9);
    }

    #[test]
    fn raw_params_reach_the_race_config() {
        let cli = Cli::try_parse_from([
            "ultragz",
            "--stdin",
            "--stdout",
            "--param",
            "relayCapacity=65536",
            "--param",
            "killGraceMs:5",
            "--param",
            "nCores=7",
            "--cores",
            "2",
        ])
        .unwrap();
        let config = RaceConfig::from_configuration(&configuration_from(&cli).unwrap()).unwrap();
        assert_eq!(config.relay_capacity, 65_536);
        assert_eq!(config.kill_grace, std::time::Duration::from_millis(5));
        assert_eq!(config.workers, 2);
    }

    #[test]
    fn unknown_tool_is_rejected() {
        let cli = Cli::try_parse_from(["ultragz", "--stdin", "--stdout", "--tool", "bzip2=/bin/bzip2"]).unwrap();
        assert!(configuration_from(&cli).is_err());
    }

    #[test]
    fn log_format_goes_through_the_logger_parser() {
        let cli = Cli::try_parse_from(["ultragz", "--stdin", "--stdout", "--log-format", "JSON"]).unwrap();
        assert_eq!(cli.log_format, LoggerFormat::Json);
        let cli = Cli::try_parse_from(["ultragz", "--stdin", "--stdout"]).unwrap();
        assert_eq!(cli.log_format, LoggerFormat::Text);

        let err = Cli::try_parse_from(["ultragz", "--stdin", "--stdout", "--log-format", "journald"]).unwrap_err();
        assert!(err.to_string().contains("expected: text|json"));
    }

    #[test]
    fn intensity_is_range_checked() {
        assert!(Cli::try_parse_from(["ultragz", "--stdin", "--stdout", "--intensity", "11"]).is_err());
    }
}
