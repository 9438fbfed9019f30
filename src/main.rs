use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;
use slawatch::config::SlawatchConfig;
use slawatch::enrich::{self, Enricher, NoopEnricher, PlaybookEnricher};
use slawatch::report::{self, ReportEnvelope};
use slawatch::Pipeline;

#[derive(Parser)]
#[command(
    name = "slawatch",
    about = "Batch SLA analysis for infrastructure monitoring snapshots",
    version,
    long_about = None
)]
struct Cli {
    /// Config file (defaults: $SLAWATCH_CONFIG, ./slawatch.toml, built-in)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit JSON log lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a JSON array of monitoring snapshots
    Analyze {
        /// Input file (JSON array of records)
        #[arg(long)]
        input: PathBuf,

        /// Write the report envelope to this file
        #[arg(long)]
        output: Option<PathBuf>,

        /// Override the configured gap tolerance
        #[arg(long)]
        gap_tolerance_secs: Option<u64>,

        /// Recommendation source for incidents
        #[arg(long, value_enum, default_value = "none")]
        enrich: EnrichMode,

        /// Annotations requested at once
        #[arg(long, default_value_t = enrich::DEFAULT_CONCURRENCY)]
        enrich_concurrency: usize,

        /// Print the report envelope as JSON instead of a text summary
        #[arg(long)]
        json: bool,

        /// Incidents shown in the text summary
        #[arg(long, default_value = "20")]
        top: usize,
    },

    /// Print the effective rule set
    Rules,

    /// Validate a config file and exit
    CheckConfig,
}

#[derive(Clone, Copy, ValueEnum)]
enum EnrichMode {
    None,
    Playbook,
}

fn env_filter(default_level: &str) -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level))
}

/// Load config under a stderr subscriber of its own; the real one depends on
/// the config's `[logging]` section.
fn load_config(path: Option<&Path>) -> Result<SlawatchConfig> {
    let bootstrap = tracing_subscriber::fmt()
        .with_env_filter(env_filter("warn"))
        .with_writer(std::io::stderr)
        .finish();
    let cfg = tracing::subscriber::with_default(bootstrap, || match path {
        Some(p) => SlawatchConfig::load(p),
        None => SlawatchConfig::load_or_default(),
    })
    .context("Failed to load configuration")?;
    Ok(cfg)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut cfg = load_config(cli.config.as_deref())?;

    // Initialize tracing
    let filter = env_filter(&cfg.logging.level);
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if cli.log_json || cfg.logging.json {
        builder.json().init();
    } else {
        builder.init();
    }

    match cli.command {
        Commands::Analyze {
            input,
            output,
            gap_tolerance_secs,
            enrich: mode,
            enrich_concurrency,
            json,
            top,
        } => {
            if let Some(secs) = gap_tolerance_secs {
                cfg.engine.gap_tolerance_secs = secs;
            }
            let pipeline = Pipeline::from_config(&cfg).context("Invalid configuration")?;

            tracing::info!(input = %input.display(), "Reading snapshots");
            let raw = tokio::fs::read_to_string(&input)
                .await
                .with_context(|| format!("Failed to read {}", input.display()))?;
            let records: Vec<Value> = serde_json::from_str(&raw)
                .with_context(|| format!("{} is not a JSON array", input.display()))?;

            let outcome = tokio::task::spawn_blocking(move || pipeline.run(&records)).await??;

            let enricher: Box<dyn Enricher> = match mode {
                EnrichMode::None => Box::new(NoopEnricher),
                EnrichMode::Playbook => Box::new(PlaybookEnricher),
            };
            let ranked = enrich::enrich(outcome.report, enricher.as_ref(), enrich_concurrency).await;
            let envelope = ReportEnvelope::new(&ranked, &outcome.diagnostics);

            if let Some(path) = &output {
                let body = serde_json::to_string_pretty(&envelope)?;
                tokio::fs::write(path, body)
                    .await
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                tracing::info!(output = %path.display(), "Report written");
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&envelope)?);
            } else {
                println!("\nslawatch SLA Report");
                print!("{}", report::format_summary(&ranked, top));
                if !outcome.diagnostics.rejections.is_empty() {
                    println!("\nRejected records:");
                    for r in outcome.diagnostics.rejections.iter().take(top) {
                        println!(" - #{}: {}", r.index, r.reason);
                    }
                }
                println!();
            }
        }
        Commands::Rules => {
            let rules = cfg.validate()?;
            println!("{:<4} | {:<24} | {:<3} | {:>10} | Severity", "#", "Metric", "Op", "Limit");
            println!("{:-<4}-|-{:-<24}-|-{:-<3}-|-{:-<10}-|-{:-<8}", "", "", "", "", "");
            for (i, rule) in rules.iter() {
                println!(
                    "{:<4} | {:<24} | {:<3} | {:>10} | {}",
                    i, rule.metric, rule.comparator, rule.limit, rule.severity
                );
            }
        }
        Commands::CheckConfig => {
            let rules = cfg.validate()?;
            println!(
                "Configuration OK: {} rule{}, gap tolerance {}s",
                rules.len(),
                if rules.len() == 1 { "" } else { "s" },
                cfg.engine.gap_tolerance_secs
            );
        }
    }

    Ok(())
}
