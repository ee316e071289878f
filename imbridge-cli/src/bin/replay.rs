use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use imbridge_core::{DetectOptions, detect_backend};
use imbridge_im::Settings;
use imbridge_im::replay::{ReplayReport, Trace, replay};
use serde::Serialize;
use tracing::info;

/// imbridge trace tool: replay recorded input method sessions.
#[derive(Parser, Debug)]
#[command(name = "imbridge-replay")]
#[command(about = "imbridge trace tool: replay recorded input method sessions")]
struct Cli {
    /// Settings file (defaults to the user config file)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Drive a bridge through a JSON trace and print what the editor saw.
    ///
    /// Events are printed one JSON object per line unless --pretty is given.
    Run {
        /// Trace file
        trace: PathBuf,

        /// Print the whole report as indented JSON
        #[arg(short, long)]
        pretty: bool,

        /// Print a one-line summary to stderr after the events
        #[arg(short, long)]
        summary: bool,
    },

    /// Show which backend quirks apply to a native context module id,
    /// using the current environment.
    Backend {
        /// Module id as reported by the toolkit, e.g. "ibus" or "xim"
        module_id: String,
    },
}

fn load_settings(path: Option<&PathBuf>) -> Result<Settings> {
    match path {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    }
}

// --- run subcommand ---

fn print_report(report: &ReplayReport, pretty: bool) -> Result<()> {
    if pretty {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    for event in &report.events {
        println!("{}", serde_json::to_string(event)?);
    }
    Ok(())
}

fn run_replay(trace: PathBuf, settings: &Settings, pretty: bool, summary: bool) -> Result<()> {
    let parsed = Trace::load(&trace)?;
    info!("replaying {:?} ({} steps)", trace, parsed.steps.len());

    let report = replay(&parsed, settings);
    print_report(&report, pretty)?;

    if summary {
        eprintln!(
            "{} event(s), {} key(s), {} protocol violation(s), final state {:?}, document {:?}",
            report.events.len(),
            report.key_results.len(),
            report.protocol_violations,
            report.final_state,
            report.document.text
        );
    }
    Ok(())
}

// --- backend subcommand ---

#[derive(Serialize)]
struct BackendInfo {
    module_id: String,
    backend: String,
    async_key_handling: bool,
    key_snooping: bool,
}

fn run_backend(module_id: String, options: DetectOptions) -> Result<()> {
    let quirks = detect_backend(&module_id, &|name| std::env::var(name).ok(), options);
    let info = BackendInfo {
        backend: quirks.id().to_string(),
        async_key_handling: quirks.supports_async_key_handling(),
        key_snooping: quirks.uses_key_snooping(),
        module_id,
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&info).context("serializing backend info")?
    );
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(cli.config.as_ref())?;
    imbridge_im::init_logging(&settings.logging.filter);

    match cli.command {
        Commands::Run {
            trace,
            pretty,
            summary,
        } => run_replay(trace, &settings, pretty, summary),
        Commands::Backend { module_id } => run_backend(module_id, settings.detect_options()),
    }
}
