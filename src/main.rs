//! ICD Harvester main entry point
//!
//! This is the command-line interface for the ICD-11 linearization harvester.

use anyhow::{bail, Context};
use clap::Parser;
use icd_harvester::auth::{ClientCredentials, TokenCache, TokenProvider};
use icd_harvester::config::{load_config_with_hash, validate, Config, OutputFormat};
use icd_harvester::crawler::{build_http_client, Coordinator, RunOptions};
use icd_harvester::output::{create_sink, write_markdown_report};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// ICD Harvester: a resumable crawler for the ICD-11 API
///
/// ICD Harvester walks the linearization from its release root, classifies
/// each entity as chapter, section, subsection or diagnosis, links it to
/// its ancestors and writes the linked records to the configured sink.
#[derive(Parser, Debug)]
#[command(name = "icd-harvester")]
#[command(version)]
#[command(about = "A resumable ICD-11 taxonomy harvester", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Output format, overriding [output] format
    #[arg(long, value_name = "FORMAT")]
    format: Option<OutputFormat>,

    /// Output file or directory, overriding [output] path
    #[arg(long, value_name = "PATH")]
    output: Option<String>,

    /// Accept-Language for entity requests, overriding [api] language
    #[arg(long, value_name = "LANG")]
    language: Option<String>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Start a fresh crawl, ignoring previous state
    #[arg(long)]
    fresh: bool,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the state database and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    apply_cli_overrides(&mut config, &cli);
    validate(&config).context("invalid configuration after command-line overrides")?;

    if cli.dry_run {
        handle_dry_run(&config);
    } else if cli.stats {
        handle_stats(&config)?;
    } else {
        handle_crawl(config, cli.fresh, config_hash).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
///
/// `RUST_LOG`, when set, replaces the verbosity flags.
fn setup_logging(verbose: u8, quiet: bool) {
    let default = if quiet {
        "error"
    } else {
        match verbose {
            0 => "icd_harvester=info,warn",
            1 => "icd_harvester=debug,info",
            2 => "icd_harvester=trace,debug",
            _ => "trace",
        }
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn apply_cli_overrides(config: &mut Config, cli: &Cli) {
    if let Some(format) = cli.format {
        config.output.format = format;
    }
    if let Some(output) = &cli.output {
        config.output.path = output.clone();
    }
    if let Some(language) = &cli.language {
        config.api.language = language.clone();
    }
}

/// Handles the --dry-run mode: shows the effective configuration
fn handle_dry_run(config: &Config) {
    println!("=== ICD Harvester Dry Run ===\n");

    println!("API:");
    println!("  Release root: {}", config.api.release_url);
    println!("  Release id: {}", config.api.release_id);
    println!("  Language: {}", config.api.language);
    println!("  API version: {}", config.api.api_version);
    println!("  Token endpoint: {}", config.api.token_url);
    println!("  Scope: {}", config.api.scope);
    println!("  Request timeout: {}s", config.api.request_timeout_secs);
    println!("  Force https: {}", config.api.force_https);

    println!("\nCrawler:");
    println!("  Concurrency: {}", config.crawler.concurrency);
    println!("  Max attempts: {}", config.crawler.max_attempts);
    println!("  Initial backoff: {}ms", config.crawler.initial_backoff_ms);
    println!("  Requeue limit: {}", config.crawler.requeue_limit);
    println!("  Channel capacity: {}", config.crawler.channel_capacity);

    println!(
        "\nInfectious keywords ({}):",
        config.classification.infectious_keywords.len()
    );
    for keyword in &config.classification.infectious_keywords {
        println!("  - {}", keyword);
    }

    println!("\nOutput:");
    println!("  Format: {}", config.output.format.as_str());
    println!("  Path: {}", config.output.path);
    println!(
        "  State: {}",
        config.output.state_path.as_deref().unwrap_or("(in memory)")
    );
    if let Some(report) = &config.output.report_path {
        println!("  Report: {}", report);
    }

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: shows statistics from the state database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    use icd_harvester::output::{load_statistics, print_statistics};
    use icd_harvester::storage::open_storage;

    let Some(state_path) = &config.output.state_path else {
        bail!("--stats needs [output] state-path to be configured");
    };
    println!("Database: {}\n", state_path);

    let storage = open_storage(Path::new(state_path))?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, fresh: bool, config_hash: String) -> anyhow::Result<()> {
    if fresh {
        tracing::info!("Starting fresh crawl (ignoring previous state)");
    } else {
        tracing::info!("Starting crawl (will resume if an unfinished run exists)");
    }

    let client = build_http_client(&config.api)?;
    let tokens: Arc<dyn TokenProvider> = Arc::new(TokenCache::new(ClientCredentials::from_config(
        client,
        &config.api,
    )));

    // A resumed run keeps what earlier attempts already wrote
    let append = !fresh && config.output.state_path.is_some();
    let sink = create_sink(&config.output, &config.api.release_id, append)
        .with_context(|| format!("failed to open output {}", config.output.path))?;

    let report_path = config.output.report_path.clone();
    let coordinator = Coordinator::new(config, sink, tokens, RunOptions { fresh, config_hash })?;

    match coordinator.run().await {
        Ok(report) => {
            if let Some(path) = report_path {
                write_markdown_report(&report, Path::new(&path))?;
                tracing::info!("Report written to {}", path);
            }
            tracing::info!("Crawl completed successfully");
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}
