//! Wavelength Channel Allocation Tool
//!
//! Builds the interference and score tables offline, and serves channel
//! requests from paired parties over a console transport.

mod commands;
mod console;
mod settings;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use commands::{BuildScoresArgs, BuildTableArgs, KeyRateArgs, SelectArgs};
use settings::Settings;

#[derive(Parser)]
#[command(name = "wavepair", version, about = "Least-interference wavelength channel allocation")]
struct Cli {
    /// Settings file (defaults to $XDG_CONFIG_HOME/wavepair/settings.json)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build the interference table from a measured reference curve
    BuildTable(BuildTableArgs),
    /// Rank candidate channels for every configuration
    BuildScores(BuildScoresArgs),
    /// Pick the best channel for a configuration
    Select(SelectArgs),
    /// Estimate secret key rates of a configuration under classical load
    KeyRate(KeyRateArgs),
    /// Serve channel requests on stdin/stdout
    Serve,
    /// Print the effective settings
    Settings {
        /// Also write them to the settings file
        #[arg(long)]
        write: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "wavepair=info,wave_table=info,wave_alloc=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let settings = Settings::load(cli.settings.as_deref())?;

    match cli.command {
        Command::BuildTable(args) => commands::build_table(&settings, args),
        Command::BuildScores(args) => commands::build_scores(&settings, args),
        Command::Select(args) => commands::select_channel(&settings, args),
        Command::KeyRate(args) => commands::key_rate(&settings, args),
        Command::Serve => {
            tracing::info!("Starting wavepair console");
            console::serve(&settings).await
        }
        Command::Settings { write } => {
            println!("{}", serde_json::to_string_pretty(&settings)?);
            if write {
                let path = settings.save(cli.settings.as_deref())?;
                eprintln!("Saved to {}", path.display());
            }
            Ok(())
        }
    }
}
