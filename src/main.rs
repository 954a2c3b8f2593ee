//! Sentiment/price correlation CLI
//!
//! Reads observation arrays from JSON files and prints the analysis.

use clap::{Parser, Subcommand};
use sentiment_correlation::{
    cache::AnalysisCache,
    config::EngineConfig,
    provider::{fetch_then_analyze_cached, JsonFileProvider},
    AnalysisWindow, SentimentPriceAnalyzer,
};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "sentiment-engine")]
#[command(about = "Correlate news sentiment with price for a symbol")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path (defaults to the standard search locations)
    #[arg(short, long)]
    config: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze one symbol
    Analyze {
        /// Ticker symbol
        #[arg(short, long)]
        symbol: String,
        /// Look-back window: 1d, 7d, 14d or 30d
        #[arg(short, long, default_value = "7d")]
        window: String,
        /// Directory holding <symbol>_sentiment.json and <symbol>_prices.json
        #[arg(short, long)]
        data_dir: Option<String>,
        /// Bucket width override in milliseconds
        #[arg(long)]
        bucket_width_ms: Option<u64>,
        /// Timeout for fetch and compute
        #[arg(long)]
        timeout_secs: Option<u64>,
        /// Pretty-print the JSON output
        #[arg(long)]
        pretty: bool,
    },
    /// Show the bucket width used for each window
    Policy,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    // Load configuration
    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::load_default()?,
    };

    match cli.command {
        Commands::Analyze {
            symbol,
            window,
            data_dir,
            bucket_width_ms,
            timeout_secs,
            pretty,
        } => {
            analyze(
                config,
                &symbol,
                &window,
                data_dir,
                bucket_width_ms,
                timeout_secs,
                pretty,
            )
            .await
        }
        Commands::Policy => show_policy(config),
    }
}

async fn analyze(
    config: EngineConfig,
    symbol: &str,
    window: &str,
    data_dir: Option<String>,
    bucket_width_ms: Option<u64>,
    timeout_secs: Option<u64>,
    pretty: bool,
) -> anyhow::Result<()> {
    let analyzer = SentimentPriceAnalyzer::from_config(&config)?;
    let data_dir = data_dir.unwrap_or_else(|| config.provider.data_dir.clone());
    let provider = JsonFileProvider::from_config_dir(&data_dir)?;
    let timeout = Duration::from_secs(timeout_secs.unwrap_or(config.provider.timeout_secs));

    tracing::info!(symbol, window, data_dir = %provider.data_dir().display(), "Starting analysis");

    let cache = config
        .cache
        .enabled
        .then(|| AnalysisCache::from_config(&config.cache));

    let result = fetch_then_analyze_cached(
        &provider,
        &analyzer,
        cache.as_ref(),
        symbol,
        window,
        bucket_width_ms,
        timeout,
    )
    .await?;

    for warning in &result.quality.warnings {
        tracing::warn!("{}", warning);
    }
    if let Some(explanation) = result.explanation() {
        tracing::info!("{}", explanation);
    }

    let output = if pretty {
        serde_json::to_string_pretty(&result)?
    } else {
        serde_json::to_string(&result)?
    };
    println!("{}", output);

    Ok(())
}

fn show_policy(config: EngineConfig) -> anyhow::Result<()> {
    let analyzer = SentimentPriceAnalyzer::from_config(&config)?;

    println!("{:<8} {:>14} {:>14}", "Window", "Bucket (min)", "Bucket (ms)");
    println!("{}", "-".repeat(38));
    for window in AnalysisWindow::ALL {
        let width = analyzer.policy().width_for(window);
        println!(
            "{:<8} {:>14.1} {:>14}",
            window.as_str(),
            width.as_minutes(),
            width.as_millis()
        );
    }
    println!(
        "\nMinimum sample: {}  Limited below: {}  Distinct days: {}",
        config.quality.min_sample_size,
        config.quality.limited_sample_threshold,
        config.quality.min_distinct_days
    );

    Ok(())
}
