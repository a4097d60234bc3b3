//! Offline table commands

use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use tracing::info;
use wave_table::{
    interference_load, select, Channel, ChannelRange, Configuration, InterferenceTable,
    ReferenceCurve, ScoreTable,
};

use crate::settings::Settings;

#[derive(Debug, Args)]
pub struct BuildTableArgs {
    /// Reference curve CSV (`channel,value` rows)
    #[arg(long)]
    pub curve: Option<PathBuf>,
    /// Output interference table
    #[arg(long)]
    pub out: Option<PathBuf>,
    /// Wavelength the curve was measured at (nm)
    #[arg(long)]
    pub reference: Option<f64>,
    /// Lowest channel (nm)
    #[arg(long)]
    pub low: Option<u16>,
    /// Highest channel (nm)
    #[arg(long)]
    pub high: Option<u16>,
}

#[derive(Debug, Args)]
pub struct BuildScoresArgs {
    /// Input interference table
    #[arg(long)]
    pub table: Option<PathBuf>,
    /// Output score table
    #[arg(long)]
    pub out: Option<PathBuf>,
    /// Largest configuration to score (1-4)
    #[arg(long)]
    pub max_size: Option<usize>,
}

#[derive(Debug, Args)]
pub struct SelectArgs {
    /// Configuration key, e.g. 1530-1537-1538 (defaults to the reference configuration)
    #[arg(long)]
    pub config: Option<Configuration>,
    /// Channels to exclude
    #[arg(long, num_args = 1.., value_delimiter = ',')]
    pub exclude: Vec<Channel>,
    /// Score table
    #[arg(long)]
    pub scores: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct KeyRateArgs {
    /// Quantum channels, e.g. 1530-1537-1538 (defaults to the reference configuration)
    #[arg(long)]
    pub config: Option<Configuration>,
    /// Occupied classical channels
    #[arg(long, num_args = 1.., value_delimiter = ',', required = true)]
    pub occupied: Vec<Channel>,
    /// Interference table
    #[arg(long)]
    pub table: Option<PathBuf>,
}

/// Build the interference table from a reference curve
pub fn build_table(settings: &Settings, args: BuildTableArgs) -> anyhow::Result<()> {
    let files = &settings.files;
    let curve_path = args.curve.unwrap_or_else(|| files.resolve(&files.curve));
    let out = args.out.unwrap_or_else(|| files.resolve(&files.table));
    let reference_nm = args.reference.unwrap_or(settings.reference_nm);
    let range = match (args.low, args.high) {
        (None, None) => settings.range()?,
        (low, high) => ChannelRange::new(
            low.unwrap_or(settings.channel_low),
            high.unwrap_or(settings.channel_high),
        )?,
    };

    let curve = ReferenceCurve::load(reference_nm, &curve_path)
        .with_context(|| format!("Failed to load curve {}", curve_path.display()))?;
    let (table, report) = InterferenceTable::build(range, &curve);
    table
        .save(&out)
        .with_context(|| format!("Failed to write {}", out.display()))?;

    info!("Interference table written to {}", out.display());
    println!(
        "{} channels ({}..={}) -> {}",
        range.len(),
        range.low(),
        range.high(),
        out.display()
    );
    if !report.undefined.is_empty() {
        println!(
            "{} undefined cells: {} singular, {} outside the curve",
            report.undefined.len(),
            report.singular_count(),
            report.out_of_domain_count()
        );
    }
    Ok(())
}

/// Aggregate the interference table into ranked candidates per configuration
pub fn build_scores(settings: &Settings, args: BuildScoresArgs) -> anyhow::Result<()> {
    let files = &settings.files;
    let table_path = args.table.unwrap_or_else(|| files.resolve(&files.table));
    let out = args.out.unwrap_or_else(|| files.resolve(&files.scores));
    let max_size = args.max_size.unwrap_or(settings.max_configuration_size);

    let table = InterferenceTable::load(&table_path)
        .with_context(|| format!("Failed to load {}", table_path.display()))?;
    let scores = ScoreTable::aggregate(&table, max_size)?;
    scores
        .save(&out)
        .with_context(|| format!("Failed to write {}", out.display()))?;

    info!("Score table written to {}", out.display());
    println!("{} configurations -> {}", scores.len(), out.display());
    Ok(())
}

/// Print the best candidate for a configuration
pub fn select_channel(settings: &Settings, args: SelectArgs) -> anyhow::Result<()> {
    let files = &settings.files;
    let scores_path = args.scores.unwrap_or_else(|| files.resolve(&files.scores));
    let config = args
        .config
        .unwrap_or_else(|| settings.reference_configuration.clone());
    let exclusion: BTreeSet<Channel> = args.exclude.into_iter().collect();

    let scores = ScoreTable::load(&scores_path)
        .with_context(|| format!("Failed to load {}", scores_path.display()))?;

    match select(&scores, &config, &exclusion) {
        Some(candidate) => println!("{} (S = {:e})", candidate.channel, candidate.score),
        None => println!("No channel available for {}", config),
    }
    Ok(())
}

/// Print the interference load and key rate of each quantum channel
pub fn key_rate(settings: &Settings, args: KeyRateArgs) -> anyhow::Result<()> {
    let files = &settings.files;
    let table_path = args.table.unwrap_or_else(|| files.resolve(&files.table));
    let config = args
        .config
        .unwrap_or_else(|| settings.reference_configuration.clone());

    let table = InterferenceTable::load(&table_path)
        .with_context(|| format!("Failed to load {}", table_path.display()))?;
    let loads = interference_load(&table, &config, &args.occupied);

    for (q, load) in config.channels().iter().zip(&loads) {
        println!(
            "{}: load {:e}, rate {:e}",
            q,
            load,
            settings.key_rate.secret_key_rate(*load)
        );
    }
    println!("total: {:e}", settings.key_rate.total_key_rate(&loads));
    Ok(())
}
