//! # FontInstaller: The Main Entry Point
//!
//! This module handles Command Line Interface (CLI) parsing, logging initialization,
//! and runs the installation steps in order:
//!
//! 1. Make sure we are elevated (relaunch through UAC otherwise).
//! 2. Validate the arguments and the source folder.
//! 3. Install the fonts.
//! 4. Write the completion marker.
//! 5. Restart the companion app so it picks the fonts up.
//!
//! Only bad arguments, a missing source folder and a failed elevation stop the run. Every
//! other failure is logged and the next step still runs.

use std::path::PathBuf;

use clap::error::ErrorKind;
use clap::Parser;
use log::{error, info, warn, LevelFilter};
use serde::Serialize;
use simplelog::{Config, SimpleLogger};

mod companion;
mod elevation;
mod installer;
mod marker;
mod system;

use companion::{RestartOutcome, DEFAULT_COMPANION_APP};
use elevation::{Elevation, PlatformPrivileges};
use installer::{InstallOptions, InstallReport};
use system::{FontStore, PlatformSystem, ProcessControl};

/// Exit status for usage errors, a missing source folder and failed elevation.
const EXIT_FAILURE: i32 = 1;
/// Exit status for `--strict` runs where some fonts were not installed.
const EXIT_PARTIAL: i32 = 2;

/// The primary Command Line Interface (CLI) configuration.
#[derive(Parser, Debug)]
#[command(name = "fontinstaller", version)]
#[command(about = "Installs a folder of fonts system-wide and restarts the companion app", long_about = None)]
struct Cli {
    /// Folder containing the font files to install (not searched recursively).
    source: PathBuf,

    /// Marker file written as `[Variables]` / `Installed_Fonts=1` once installation ran.
    marker: PathBuf,

    /// Turn on verbose logging.
    ///
    /// - `-v`: Debug
    /// - `-vv`: Trace
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Image name of the companion app to restart.
    #[arg(long, value_name = "NAME", default_value = DEFAULT_COMPANION_APP)]
    app: String,

    /// Leave the companion app alone.
    #[arg(long)]
    no_restart: bool,

    /// Only install files with a font extension (ttf, otf, ttc, fon).
    #[arg(long)]
    fonts_only: bool,

    /// Update `Installed_Fonts` inside an existing marker file instead of replacing it.
    #[arg(long)]
    merge_marker: bool,

    /// Print the installation report as JSON.
    #[arg(long)]
    json: bool,

    /// Exit with status 2 if any font failed to install.
    ///
    /// By default partial failures still exit with 0.
    #[arg(long)]
    strict: bool,
}

fn main() {
    // Parse first so `-v` applies to the elevation step too; argument errors are only
    // reported once we know this is the instance that does the work.
    let parsed = Cli::try_parse();

    if let Err(err) = &parsed {
        if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) {
            err.exit();
        }
    }

    // Determine log level based on verbosity flag
    let log_level = match parsed.as_ref().map_or(0, |cli| cli.verbose) {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    // Logging failure shouldn't crash the startup
    let _ = SimpleLogger::init(log_level, Config::default());

    let args: Vec<String> = std::env::args_os()
        .skip(1)
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect();

    match elevation::ensure_elevated(&PlatformPrivileges::default(), &args) {
        Ok(Elevation::AlreadyElevated) => {}
        // The elevated instance does the real work.
        Ok(Elevation::Relaunched) => std::process::exit(0),
        Err(e) => {
            error!("{e}");
            std::process::exit(EXIT_FAILURE);
        }
    }

    let cli = match parsed {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            std::process::exit(EXIT_FAILURE);
        }
    };

    std::process::exit(run(&cli, &PlatformSystem::default()));
}

/// What a run did, printed by `--json` once every step has finished.
#[derive(Debug, Serialize)]
struct RunReport {
    install: Option<InstallReport>,
    /// Set when the install step could not run at all.
    install_error: Option<String>,
    marker_written: bool,
    /// `None` with `--no-restart`.
    restart: Option<RestartOutcome>,
}

impl RunReport {
    fn install_clean(&self) -> bool {
        self.install.as_ref().is_some_and(InstallReport::is_clean)
    }
}

/// Runs every step after elevation and argument parsing. Returns the process exit status.
fn run(cli: &Cli, system: &(impl FontStore + ProcessControl)) -> i32 {
    if !cli.source.is_dir() {
        error!("Invalid folder path: {}", cli.source.display());
        return EXIT_FAILURE;
    }

    let report = run_steps(cli, system);

    if cli.json {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{json}"),
            Err(e) => error!("Failed to serialize run report: {e}"),
        }
    }

    if cli.strict && !report.install_clean() {
        warn!("Some fonts were not installed");
        return EXIT_PARTIAL;
    }

    info!("Process completed.");
    0
}

/// Install, marker and restart. None of them stops the others.
fn run_steps(cli: &Cli, system: &(impl FontStore + ProcessControl)) -> RunReport {
    info!("Installing fonts...");
    let options = InstallOptions {
        fonts_only: cli.fonts_only,
    };
    let (install, install_error) = match installer::install_fonts(system, &cli.source, &options) {
        Ok(report) => (Some(report), None),
        Err(e) => {
            error!("Error: {e:#}");
            (None, Some(format!("{e:#}")))
        }
    };

    let written = if cli.merge_marker {
        marker::merge_marker(&cli.marker)
    } else {
        marker::write_marker(&cli.marker)
    };
    let marker_written = match written {
        Ok(()) => {
            info!("File written successfully: {}", cli.marker.display());
            true
        }
        Err(e) => {
            error!("{e:#}");
            false
        }
    };

    let restart = if cli.no_restart {
        info!("Skipping restart of {}", cli.app);
        None
    } else {
        Some(companion::restart_companion_app(system, &cli.app))
    };

    RunReport {
        install,
        install_error,
        marker_written,
        restart,
    }
}
