//! CLI argument definitions for the signalpost collector.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

/// Signalpost observability collector.
///
/// Collects, processes, and exports telemetry data (logs, metrics,
/// traces) through configurable input, processor, and output plugins.
#[derive(Parser, Debug)]
#[command(name = "signalpost")]
#[command(version, about, long_about = None)]
pub struct CollectorCli {
    /// Path to the JSON configuration file.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Process a specific input file (registers a file input for it).
    #[arg(long)]
    pub input_file: Option<PathBuf>,

    /// Output directory for the file output plugin.
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Emit telemetry to stdout instead of files.
    #[arg(long)]
    pub stdout: bool,

    /// Colorize stdout output.
    #[arg(long = "color")]
    pub colorize: bool,

    /// Emit stdout output in JSON format.
    #[arg(long = "json")]
    pub json_format: bool,

    /// Collect and flush once, then exit.
    #[arg(long)]
    pub one_shot: bool,

    /// Enable the HTTP control API.
    #[arg(long)]
    pub api: bool,

    /// Control API listen host.
    #[arg(long, default_value = "localhost")]
    pub api_host: String,

    /// Control API listen port.
    #[arg(long, default_value_t = 8080)]
    pub api_port: u16,
}
