//! Multi-submission execution orchestrator CLI.
//!
//! Runs every selected submission folder against one shared input file and
//! prints a single report. Per-submission failures are part of the report;
//! only problems that prevent any run end the command with an error.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use subrun::core::report::RunReport;
use subrun::exit_codes;
use subrun::io::config::{RunConfig, load_config, render_config, write_config};
use subrun::io::locate::find_folders;
use subrun::orchestrator::Orchestrator;

#[derive(Parser)]
#[command(
    name = "subrun",
    version,
    about = "Run many submissions against one shared input and report every outcome"
)]
struct Cli {
    #[command(flatten)]
    settings: Settings,

    /// Report format written to stdout.
    #[arg(long, global = true, value_enum, default_value_t = Format::Text)]
    format: Format,

    #[command(subcommand)]
    command: Command,
}

/// Overrides applied on top of the config file (or the defaults).
#[derive(Args, Debug, Default)]
struct Settings {
    /// TOML config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Per-submission timeout in milliseconds.
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    /// Maximum submissions running at once.
    #[arg(long, global = true)]
    max_concurrency: Option<usize>,

    /// Per-stream output capture limit in bytes.
    #[arg(long, global = true)]
    output_limit_bytes: Option<usize>,

    /// Interpreter command word; repeat for arguments (`--interpreter python3 --interpreter -I`).
    #[arg(long = "interpreter", value_name = "WORD", global = true, allow_hyphen_values = true)]
    interpreter: Vec<String>,

    /// Entry file extension, without the dot.
    #[arg(long, global = true)]
    extension: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Run each submission folder against the input file.
    Batch {
        /// Submission folders, reported in this order.
        #[arg(required_unless_present = "parent", conflicts_with = "parent")]
        folders: Vec<PathBuf>,
        /// Run every immediate subfolder of this directory instead.
        #[arg(long)]
        parent: Option<PathBuf>,
        /// Shared input file piped to every submission.
        #[arg(long)]
        input: PathBuf,
    },
    /// Run a single source file outside any submission folder.
    One {
        /// Source file to run.
        #[arg(long)]
        code: PathBuf,
        /// Input file piped to the snippet (empty input if omitted).
        #[arg(long)]
        input: Option<PathBuf>,
    },
    /// List the immediate subfolders of a directory.
    Folders { parent: PathBuf },
    /// Print the effective configuration as TOML, or save it.
    Config {
        /// Write the configuration to this file instead of printing it.
        #[arg(long)]
        write: Option<PathBuf>,
    },
}

impl Settings {
    fn resolve(&self) -> Result<RunConfig> {
        let mut cfg = match &self.config {
            Some(path) => {
                if !path.is_file() {
                    bail!("config file {} not found", path.display());
                }
                load_config(path)?
            }
            None => RunConfig::default(),
        };
        if let Some(timeout_ms) = self.timeout_ms {
            cfg.timeout_ms = timeout_ms;
        }
        if let Some(max_concurrency) = self.max_concurrency {
            cfg.max_concurrency = max_concurrency;
        }
        if let Some(output_limit_bytes) = self.output_limit_bytes {
            cfg.output_limit_bytes = output_limit_bytes;
        }
        if !self.interpreter.is_empty() {
            cfg.interpreter = self.interpreter.clone();
        }
        if let Some(extension) = &self.extension {
            cfg.extension = extension.clone();
        }
        cfg.validate().context("invalid settings")?;
        Ok(cfg)
    }
}

fn main() {
    subrun::logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Folders { parent } => {
            for folder in find_folders(&parent)? {
                println!("{}", folder.display());
            }
            Ok(exit_codes::OK)
        }
        Command::Config { write } => {
            let orchestrator = Orchestrator::new(cli.settings.resolve()?)?;
            match write {
                Some(path) => {
                    write_config(&path, orchestrator.config())?;
                    println!("{}", path.display());
                }
                None => print!("{}", render_config(orchestrator.config())?),
            }
            Ok(exit_codes::OK)
        }
        Command::Batch {
            folders,
            parent,
            input,
        } => {
            let orchestrator = Orchestrator::new(cli.settings.resolve()?)?;
            let report = match parent {
                Some(parent) => orchestrator.run_parent(&parent, &input)?,
                None => orchestrator.run_batch(&folders, &input)?,
            };
            emit(&report, cli.format)
        }
        Command::One { code, input } => {
            let orchestrator = Orchestrator::new(cli.settings.resolve()?)?;
            let source = read_text(&code, "source file")?;
            let input_text = match input {
                Some(path) => read_text(&path, "input file")?,
                None => String::new(),
            };
            let report = orchestrator.run_one(&source, &input_text)?;
            emit(&report, cli.format)
        }
    }
}

fn read_text(path: &Path, what: &str) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("read {what} {}", path.display()))
}

fn emit(report: &RunReport, format: Format) -> Result<i32> {
    match format {
        Format::Text => print!("{}", report.render_text()),
        Format::Json => print!("{}", report.to_json()?),
    }
    if report.summary.all_succeeded() {
        Ok(exit_codes::OK)
    } else {
        Ok(exit_codes::FAILURES)
    }
}
