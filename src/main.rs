mod types;
mod indicators;
mod ml;
mod engine;
mod exchange;
mod config;
mod error;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use config::PipelineConfig;
use engine::{run_forever, PassOutcome, SignalPipeline};
use exchange::{BinanceClient, MarketData};
use ml::FileModelStore;
use types::TimeFrame;

#[derive(Parser)]
#[command(name = "signal-pipeline")]
#[command(version = "0.1.0")]
#[command(about = "Per-symbol ML trading signals from Binance spot candles", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit log lines as JSON
    #[arg(long)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a prediction cycle at every candle close until interrupted
    Run {
        /// Run one cycle right away instead of waiting for the first close
        #[arg(long)]
        immediate: bool,
    },
    /// Run a single prediction cycle and exit
    Once,
    /// Train (or retrain) the model for one symbol and interval
    Train {
        #[arg(short, long)]
        symbol: String,
        /// Candle interval (1m, 5m, 15m, 30m, 1h, 2h, 4h, 6h, 12h, 1d)
        #[arg(short, long, default_value = "1h")]
        interval: TimeFrame,
    },
    /// Predict for one symbol and interval, training first if no model exists
    Predict {
        #[arg(short, long)]
        symbol: String,
        #[arg(short, long, default_value = "1h")]
        interval: TimeFrame,
    },
    /// List the symbols a cycle would cover
    Symbols,
    /// Print the effective configuration as TOML
    ShowConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level.as_str()));
    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);
    if cli.json_logs {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }

    let config = PipelineConfig::load(&cli.config)
        .with_context(|| format!("loading configuration from {}", cli.config))?;
    if let Err(errors) = config.validate() {
        return Err(anyhow!("invalid configuration:\n  {}", errors.join("\n  ")));
    }

    if let Commands::ShowConfig = cli.command {
        println!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    info!("Signal pipeline v0.1.0");

    let market: Arc<dyn MarketData> = Arc::new(BinanceClient::new(&config.exchange)?);
    let store = FileModelStore::new(&config.models_dir);
    store.ensure_models_dir()?;
    let pipeline = SignalPipeline::new(market, Arc::new(store), config);

    match cli.command {
        Commands::Run { immediate } => run(&pipeline, immediate).await?,
        Commands::Once => {
            let symbols = universe(&pipeline).await?;
            pipeline.run_cycle(&symbols).await;
        }
        Commands::Train { symbol, interval } => {
            let report = pipeline.train_slot(&symbol.to_uppercase(), interval).await?;
            println!("\n=== {} {} ===", symbol.to_uppercase(), interval);
            println!("Strategy:       {:?}", report.strategy);
            println!("Samples:        {}", report.samples);
            println!("Train accuracy: {:.3}", report.train_accuracy);
            if let Some(f1) = report.holdout_f1 {
                println!("Holdout F1:     {:.3}", f1);
            }
            if let Some(params) = &report.hyperparameters {
                println!("Best params:    {:?}", params);
            }
            println!("Took:           {:.2}s", report.elapsed.as_secs_f64());
        }
        Commands::Predict { symbol, interval } => {
            match pipeline.run_pass(&symbol.to_uppercase(), interval).await {
                PassOutcome::Completed(result) => println!("{}", serde_json::to_string_pretty(&result)?),
                PassOutcome::Skipped { symbol, timeframe, reason } => {
                    return Err(anyhow!("{} [{}] skipped: {}", symbol, timeframe, reason));
                }
            }
        }
        Commands::Symbols => {
            let symbols = universe(&pipeline).await?;
            println!("\n=== {} symbols ({}) ===", symbols.len(), pipeline.config().run.quote_asset);
            for symbol in symbols {
                println!("{}", symbol);
            }
        }
        Commands::ShowConfig => {}
    }

    Ok(())
}

async fn universe(pipeline: &SignalPipeline) -> Result<Vec<String>> {
    let symbols = pipeline.resolve_symbols().await?;
    if symbols.is_empty() {
        warn!("No tradable symbols for quote asset {}", pipeline.config().run.quote_asset);
    }
    Ok(symbols)
}

async fn run(pipeline: &SignalPipeline, immediate: bool) -> Result<()> {
    let run = &pipeline.config().run;
    info!(
        "Intervals: {:?} | quote: {} | cycle on every {} close",
        run.intervals.iter().map(TimeFrame::as_str).collect::<Vec<_>>(),
        run.quote_asset,
        run.cycle_timeframe
    );

    if immediate {
        let symbols = universe(pipeline).await?;
        pipeline.run_cycle(&symbols).await;
    }

    info!("Press Ctrl+C to stop");
    tokio::select! {
        _ = run_forever(pipeline) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down...");
        }
    }
    Ok(())
}
