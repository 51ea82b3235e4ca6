//! CLI binary for scholar-search.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use scholar_search::{AggregatorConfig, ResearchAggregator, SearchRequest};
use tracing_subscriber::EnvFilter;

/// Search several scholarly sources at once and print fused, ranked results.
#[derive(Parser)]
#[command(name = "scholar-search", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    command: Command,
}

/// Available commands.
#[derive(Subcommand)]
enum Command {
    /// Run one search and print the aggregate response as JSON.
    Search {
        /// Free-text query.
        query: String,

        /// Maximum number of results.
        #[arg(short, long)]
        limit: Option<usize>,

        /// Ranked results to skip.
        #[arg(long, default_value_t = 0)]
        offset: usize,

        /// Exclude code-linked sources.
        #[arg(long)]
        no_code_sources: bool,

        /// Deduplicate only, without cross-source enrichment.
        #[arg(long)]
        no_cross_reference: bool,

        /// Pretty-print the JSON output.
        #[arg(long)]
        pretty: bool,
    },

    /// Print the effective configuration as TOML.
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout stays machine-readable.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("scholar_search=info,reqwest=warn,hyper=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match cli.config {
        Some(ref path) => AggregatorConfig::from_file(path)?,
        None => AggregatorConfig::default(),
    };

    match cli.command {
        Command::Search {
            query,
            limit,
            offset,
            no_code_sources,
            no_cross_reference,
            pretty,
        } => {
            let aggregator = ResearchAggregator::new(config)?;
            let mut request = SearchRequest::new(query).with_offset(offset);
            if let Some(limit) = limit {
                request = request.with_limit(limit);
            }
            if no_code_sources {
                request = request.with_code_sources(false);
            }
            if no_cross_reference {
                request = request.with_cross_reference(false);
            }

            let response = aggregator.search(request).await?;
            let json = if pretty {
                serde_json::to_string_pretty(&response)?
            } else {
                serde_json::to_string(&response)?
            };
            println!("{json}");

            if !response.success {
                anyhow::bail!(response
                    .error
                    .unwrap_or_else(|| "search failed".to_owned()));
            }
            Ok(())
        }
        Command::Config => {
            config.validate()?;
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}
