use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use deliberation::{
    classify_symbol, AssetType, DeliberationPipeline, Generator, SituationMemory, SituationRecord, Truncator,
};
use tracing::{info, warn};

use trading_agents::analysts::{DataFeed, DirectoryFeed, EmptyFeed, GenerativeAnalyst};
use trading_agents::config::{check_endpoint, AgentsConfig};
use trading_agents::generation::RigGenerator;
use trading_agents::memory::PersistentMemory;

/// Multi-agent trading deliberation
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a full deliberation and print the signal
    Run {
        #[arg(long)]
        symbol: String,

        /// Analysis date (YYYY-MM-DD)
        #[arg(long)]
        date: NaiveDate,

        #[arg(long, value_enum, default_value_t = AssetTypeArg::Auto)]
        asset_type: AssetTypeArg,

        /// TOML config file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Directory of analyst source files (`<dir>/<SYMBOL>/<kind>.md`)
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// JSON file of past situations; the run's decision is appended to it
        #[arg(long)]
        memory: Option<PathBuf>,

        /// Overrides `deliberation.max_debate_rounds`
        #[arg(long)]
        max_debate_rounds: Option<u32>,

        /// Overrides `deliberation.max_risk_discuss_rounds`
        #[arg(long)]
        max_risk_rounds: Option<u32>,

        /// Write the full state and stage transitions as JSON
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Print the asset class guessed for a symbol
    Classify {
        #[arg(long)]
        symbol: String,
    },

    /// Probe the configured backend
    Check {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum AssetTypeArg {
    /// Guess from the symbol
    Auto,
    Stock,
    Cryptocurrency,
}

impl AssetTypeArg {
    fn resolve(self, symbol: &str) -> AssetType {
        match self {
            Self::Auto => classify_symbol(symbol),
            Self::Stock => AssetType::Stock,
            Self::Cryptocurrency => AssetType::Cryptocurrency,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    match Args::parse().command {
        Command::Run {
            symbol,
            date,
            asset_type,
            config,
            data_dir,
            memory,
            max_debate_rounds,
            max_risk_rounds,
            output,
        } => {
            let mut config = AgentsConfig::load(config.as_deref())?;
            if let Some(n) = max_debate_rounds {
                config.deliberation.max_debate_rounds = n;
            }
            if let Some(n) = max_risk_rounds {
                config.deliberation.max_risk_discuss_rounds = n;
            }
            config.validate()?;

            let asset_type = asset_type.resolve(&symbol);
            run(&config, &symbol, date, asset_type, data_dir, memory.as_deref(), output.as_deref()).await
        }
        Command::Classify { symbol } => {
            println!("{}", classify_symbol(&symbol));
            Ok(())
        }
        Command::Check { config } => {
            let config = AgentsConfig::load(config.as_deref())?;
            let url = &config.provider.backend_url;
            if check_endpoint(url).await {
                println!("{url}: reachable");
                Ok(())
            } else {
                bail!("{url}: unreachable")
            }
        }
    }
}

async fn run(
    config: &AgentsConfig,
    symbol: &str,
    date: NaiveDate,
    asset_type: AssetType,
    data_dir: Option<PathBuf>,
    memory_path: Option<&Path>,
    output: Option<&Path>,
) -> Result<()> {
    info!(
        backend = %config.provider.backend_url,
        quick = %config.models.quick_think_llm,
        deep = %config.models.deep_think_llm,
        %asset_type,
        "Trading deliberation starting"
    );

    let quick: Arc<dyn Generator> = Arc::new(RigGenerator::new(
        config.client().context("quick model client")?,
        &config.models.quick_think_llm,
        config.quick_temperature,
    ));
    let deep: Arc<dyn Generator> = Arc::new(RigGenerator::new(
        config.client().context("deep model client")?,
        &config.models.deep_think_llm,
        config.deep_temperature,
    ));

    let truncator = Truncator::heuristic();
    let memory = config.open_memory(&truncator)?;
    if let Some(path) = memory_path {
        let records = load_memory(path)?;
        info!(count = records.len(), backend = ?config.memory.backend, path = %path.display(), "memory loaded");
        memory
            .persistence
            .restore(records)
            .await
            .context("Failed to index stored situations")?;
    }

    let feed: Arc<dyn DataFeed> = match data_dir {
        Some(dir) => Arc::new(DirectoryFeed::new(dir)),
        None => {
            warn!("no --data-dir given; analysts work without source data");
            Arc::new(EmptyFeed)
        }
    };

    let mut builder = DeliberationPipeline::builder()
        .quick(Arc::clone(&quick))
        .deep(deep)
        .memory(Arc::clone(&memory.lookup))
        .config(config.deliberation.clone())
        .truncator(truncator.clone());
    for analyst in GenerativeAnalyst::full_team(quick, feed, config.deliberation.prompt_budget(), &truncator) {
        builder = builder.analyst(analyst);
    }
    let pipeline = builder.build()?;

    let outcome = pipeline.run(symbol, date, asset_type).await?;

    if let Some(path) = output {
        let json = serde_json::to_string_pretty(&outcome).context("serialize run outcome")?;
        std::fs::write(path, json).context(format!("Failed to write {}", path.display()))?;
        info!(path = %path.display(), "run outcome written");
    }

    if let Some(path) = memory_path {
        if let Some(decision) = outcome.state.final_trade_decision() {
            memory
                .lookup
                .record(&outcome.state.analyst_reports().situation(), decision)
                .await?;
        }
        save_memory(path, &memory.persistence.snapshot().await)?;
    }

    match outcome.signal {
        Some(signal) => println!("{signal}"),
        None => println!("{}", outcome.signal_text),
    }
    Ok(())
}

fn load_memory(path: &Path) -> Result<Vec<SituationRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content =
        std::fs::read_to_string(path).context(format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).context("Failed to parse memory file")
}

fn save_memory(path: &Path, records: &[SituationRecord]) -> Result<()> {
    let json = serde_json::to_string_pretty(records).context("serialize memory")?;
    std::fs::write(path, json).context(format!("Failed to write {}", path.display()))
}
