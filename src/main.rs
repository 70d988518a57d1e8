//! Command-line harness: analyze one or more palm photos and print the
//! responses as a JSON array.

use clap::{Parser, ValueEnum};
use palmline_lib::{respond, AnalysisConfig, PalmAnalyzer, PrecisionTier, ResponseOptions};
use rayon::prelude::*;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Copy, Clone, ValueEnum)]
enum TierArg {
    Standard,
    HighPrecision,
    ColorMarker,
}

impl From<TierArg> for PrecisionTier {
    fn from(tier: TierArg) -> Self {
        match tier {
            TierArg::Standard => PrecisionTier::Standard,
            TierArg::HighPrecision => PrecisionTier::HighPrecision,
            TierArg::ColorMarker => PrecisionTier::ColorMarker,
        }
    }
}

/// Measure the life line in palm photographs.
#[derive(Parser)]
#[command(name = "palmline")]
#[command(version, long_about = None)]
struct Cli {
    /// Named analysis configuration
    #[arg(long, value_enum, default_value = "standard")]
    tier: TierArg,

    /// JSON configuration file; overrides --tier
    #[arg(long)]
    config: Option<PathBuf>,

    /// Fixed fortune seed (default: derived from each image's digest)
    #[arg(long)]
    seed: Option<u64>,

    /// Skip the fortune reading
    #[arg(long)]
    no_fortune: bool,

    /// Print single-line JSON
    #[arg(long)]
    compact: bool,

    /// Images to analyze
    #[arg(name = "IMAGE", required = true)]
    images: Vec<PathBuf>,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => match std::fs::read_to_string(path)
            .map_err(|err| format!("could not read {}: {}", path.display(), err))
            .and_then(|raw| AnalysisConfig::from_json(&raw).map_err(|err| err.to_string()))
        {
            Ok(config) => config,
            Err(message) => {
                eprintln!("palmline: {}", message);
                return ExitCode::FAILURE;
            }
        },
        None => AnalysisConfig::from_tier(cli.tier.into()),
    };
    let analyzer = match PalmAnalyzer::new(config) {
        Ok(analyzer) => analyzer,
        Err(err) => {
            eprintln!("palmline: {}", err);
            return ExitCode::FAILURE;
        }
    };
    log::info!(
        "Analyzing {} image(s) with tier {:?}",
        cli.images.len(),
        analyzer.config().tier
    );

    let options = ResponseOptions {
        with_fortune: !cli.no_fortune,
        seed: cli.seed,
    };

    let results: Vec<_> = cli
        .images
        .par_iter()
        .map(|path| {
            std::fs::read(path)
                .map(|bytes| respond(&analyzer, &bytes, &options))
                .map_err(|err| format!("could not read {}: {}", path.display(), err))
        })
        .collect();

    let mut read_failed = false;
    let mut responses = Vec::with_capacity(results.len());
    for result in results {
        match result {
            Ok(response) => responses.push(response),
            Err(message) => {
                eprintln!("palmline: {}", message);
                read_failed = true;
            }
        }
    }

    let rendered = if cli.compact {
        serde_json::to_string(&responses)
    } else {
        serde_json::to_string_pretty(&responses)
    };
    match rendered {
        Ok(json) => println!("{}", json),
        Err(err) => {
            eprintln!("palmline: could not serialize results: {}", err);
            return ExitCode::FAILURE;
        }
    }

    if read_failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
