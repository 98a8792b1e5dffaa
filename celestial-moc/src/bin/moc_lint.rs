//! moc-lint: check a MOC file against the IVOA recommendation.
//!
//! Prints one line per diagnostic and a final status line. Exit code 0 means
//! the file conforms, 3 that it conforms with warnings, 1 that it does not.

use anyhow::Context;
use celestial_moc::lint::{self, LintStatus};
use celestial_moc::{LintConfig, MocVersion};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "moc-lint")]
#[command(about = "Check a MOC file (FITS, ASCII or JSON) for standard conformance")]
struct Cli {
    /// MOC file to check
    file: PathBuf,

    /// Stop after this many errors
    #[arg(long, default_value_t = 20)]
    max_errors: usize,

    /// Check against this MOC version (1.0, 1.1, 2.0) instead of the declared one
    #[arg(long = "as", value_parser = parse_version)]
    as_version: Option<MocVersion>,

    /// Log debug events to stderr
    #[arg(short, long)]
    verbose: bool,
}

fn parse_version(s: &str) -> Result<MocVersion, String> {
    MocVersion::parse(s).ok_or_else(|| format!("unknown MOC version '{s}'"))
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive(level.into()))
        .init();
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = LintConfig::default().with_max_errors(cli.max_errors);
    if let Some(version) = cli.as_version {
        config = config.with_version(version);
    }

    let report = lint::lint_path(&cli.file, &config)
        .with_context(|| format!("cannot read {}", cli.file.display()))?;
    println!("{report}");

    Ok(match report.status() {
        LintStatus::Ok => ExitCode::SUCCESS,
        LintStatus::Warning => ExitCode::from(3),
        LintStatus::Error => ExitCode::FAILURE,
    })
}
