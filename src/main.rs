//! # remocon-build: The Main Entry Point
//!
//! This module handles Command Line Interface (CLI) parsing, logging
//! initialization, and dispatching to the build pipeline. Invoked with no
//! arguments it runs the full packaging pipeline for OneNote_Remocon, which
//! is the whole job of this tool; `doctor` and `clean` exist for inspecting
//! and resetting the environment.

use std::path::PathBuf;
use clap::{Parser, Subcommand};
use log::{LevelFilter, error};
use simplelog::{Config, SimpleLogger};

mod invariant_ppt;
mod pipeline;
mod profile;
mod prompt;
mod toolchain;

use profile::PackagingProfile;
use toolchain::SystemToolchain;

/// The primary Command Line Interface (CLI) configuration.
///
/// Uses `clap` for sub-command parsing and help generation.
#[derive(Parser)]
#[command(name = "remocon-build")]
#[command(about = "Packages the OneNote Remocon desktop app with PyInstaller", long_about = None)]
struct Cli {
    /// The sub-command to execute. Omitting it runs `build`.
    #[command(subcommand)]
    command: Option<Commands>,

    /// Turn on verbose logging.
    ///
    /// - `-v`: Debug
    /// - `-vv`: Trace
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Available sub-commands.
#[derive(Subcommand)]
enum Commands {
    /// Run the full packaging pipeline (the default).
    ///
    /// This command will:
    /// 1. Verify the Python interpreter.
    /// 2. Verify PyInstaller, installing it via pip if missing.
    /// 3. Remove stale build artifacts.
    /// 4. Invoke PyInstaller with the fixed argument set.
    /// 5. Report the output paths and offer to open the output folder.
    Build {
        /// Dry run: print every step and the exact PyInstaller command line
        /// without deleting or building anything.
        #[arg(long)]
        dry_run: bool,

        /// Open the output folder after a successful build without asking.
        #[arg(long)]
        open: bool,

        /// Never prompt (and never open the folder) after the build.
        #[arg(long, conflicts_with = "open")]
        no_prompt: bool,

        /// Run as if started in DIR (the project root containing main.py).
        #[arg(short = 'C', long, value_name = "DIR")]
        project: Option<PathBuf>,
    },
    /// Inspect the build environment and report issues.
    ///
    /// Checks for:
    /// - The Python interpreter and its version.
    /// - PyInstaller.
    /// - The entry script and asset files.
    /// - Stale artifact directories.
    Doctor,
    /// Remove the build/ and dist/ artifact directories.
    Clean,
}

fn main() {
    let cli = Cli::parse();

    // Determine log level based on verbosity flag
    let log_level = match cli.verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    // Initialize logger
    // We ignore the result here as logging failure shouldn't crash the startup
    let _ = SimpleLogger::init(log_level, Config::default());

    // No sub-command means a plain full build, matching how the tool is
    // normally invoked.
    let command = cli.command.unwrap_or(Commands::Build {
        dry_run: false,
        open: false,
        no_prompt: false,
        project: None,
    });

    let profile = PackagingProfile::default();

    match command {
        Commands::Build { dry_run, open, no_prompt, project } => {
            if let Some(dir) = project {
                if let Err(e) = std::env::set_current_dir(&dir) {
                    error!("Cannot enter project directory {:?}: {}", dir, e);
                    std::process::exit(1);
                }
            }

            let toolchain = SystemToolchain::new();
            match pipeline::run_build(&profile, &toolchain, dry_run) {
                Ok(Some(outcome)) => {
                    pipeline::offer_output_folder(&toolchain, &outcome, open, no_prompt, || {
                        prompt::confirm("Open the output folder?").unwrap_or(false)
                    });
                }
                Ok(None) => {
                    // Dry run; nothing to open.
                }
                Err(e) => {
                    error!("Build failed: {:#}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Doctor => {
            let toolchain = SystemToolchain::new();
            if let Err(e) = pipeline::doctor(&profile, &toolchain) {
                error!("Doctor check failed: {}", e);
            }
        }
        Commands::Clean => {
            let toolchain = SystemToolchain::new();
            pipeline::clean_artifacts(&profile, &toolchain);
        }
    }
}
