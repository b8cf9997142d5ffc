use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use tracing::info;

use swing_scrape_lib::config::AppConfig;
use swing_scrape_lib::db::Store;
use swing_scrape_lib::gancio::{GancioClient, Publisher};
use swing_scrape_lib::scraping::base::HttpFetcher;
use swing_scrape_lib::utils;
use swing_scrape_lib::{Collaborators, RunOptions};

#[derive(Parser)]
#[command(
    name = "swing-scrape",
    version,
    about = "Scrapes swing events from the studio sitemap and republishes them to Gancio"
)]
struct Cli {
    /// Config file (default: config.json in the data directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape recent events and publish the first few future occurrences
    Run(RunArgs),
    /// Extract a single event page and print it as JSON
    Scrape { url: String },
    /// List sitemap entries young enough to be scraped
    Sitemap(SitemapArgs),
    /// List records earlier runs submitted to Gancio
    Published,
    /// Print the effective configuration
    Config {
        /// Save it as the config file
        #[arg(long)]
        write: bool,
    },
}

#[derive(Args)]
struct SitemapArgs {
    /// Events are scraped from here
    #[arg(long)]
    sitemap_url: Option<String>,
    /// Skip sitemap entries modified more than this many days ago
    #[arg(long)]
    max_age_days: Option<i64>,
}

#[derive(Args)]
struct RunArgs {
    #[command(flatten)]
    sitemap: SitemapArgs,
    /// Gancio instance receiving the events
    #[arg(long)]
    instance_url: Option<String>,
    /// Max records submitted per run
    #[arg(short = 'n', long)]
    publish_limit: Option<usize>,
    /// Snapshots are saved here
    #[arg(long)]
    output_dir: Option<PathBuf>,
    /// Build and dump records without submitting them
    #[arg(long)]
    dry_run: bool,
    /// Submit even if an earlier run already published a record
    #[arg(long)]
    no_ledger: bool,
    /// Also save the publish records as NDJSON
    #[arg(long)]
    dump_records: bool,
}

impl SitemapArgs {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(url) = &self.sitemap_url {
            config.sitemap_url = url.clone();
        }
        if let Some(days) = self.max_age_days {
            config.max_age_days = days;
        }
    }
}

impl RunArgs {
    fn apply(&self, config: &mut AppConfig) {
        self.sitemap.apply(config);
        if let Some(url) = &self.instance_url {
            config.instance_url = Some(url.clone());
        }
        if let Some(limit) = self.publish_limit {
            config.publish_limit = limit;
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if self.no_ledger {
            config.ledger = false;
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(utils::config_path);
    let mut config = AppConfig::load_from(&config_path).context("failed to load configuration")?;

    let now = Utc::now();
    let timeout = Duration::from_secs(config.timeout_secs);

    match cli.command {
        Commands::Run(args) => {
            args.apply(&mut config);
            let fetcher = HttpFetcher::new(&config.user_agent, timeout)?;

            let gancio = match (&config.instance_url, args.dry_run) {
                (_, true) => None,
                (Some(url), false) => {
                    let client = GancioClient::new(url, timeout)?;
                    info!("Publishing to {}", client.endpoint());
                    Some(client)
                }
                (None, false) => bail!(
                    "no Gancio instance configured: pass --instance-url, set GANCIO_INSTANCE_URL or use --dry-run"
                ),
            };
            let store = if config.ledger {
                Some(Store::open_default().context("failed to open publish ledger")?)
            } else {
                None
            };

            let collaborators = Collaborators {
                fetcher: &fetcher,
                publisher: gancio.as_ref().map(|client| client as &dyn Publisher),
                store: store.as_ref(),
            };
            let options = RunOptions {
                dry_run: args.dry_run,
                dump_records: args.dump_records,
            };
            let summary = swing_scrape_lib::run(&config, &options, &collaborators, now)?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Scrape { url } => {
            let fetcher = HttpFetcher::new(&config.user_agent, timeout)?;
            let event = swing_scrape_lib::scrape_one(&fetcher, &url)?;
            println!("{}", serde_json::to_string_pretty(&event)?);
        }
        Commands::Sitemap(args) => {
            args.apply(&mut config);
            let fetcher = HttpFetcher::new(&config.user_agent, timeout)?;
            for entry in swing_scrape_lib::sitemap_entries(&config, &fetcher, now)? {
                println!("{}\t{}", entry.last_modified, entry.url);
            }
        }
        Commands::Published => {
            let store = Store::open_default().context("failed to open publish ledger")?;
            for row in store.list_published()? {
                println!(
                    "{}\t{}\t{}\t{}",
                    row.published_at_utc, row.start_epoch, row.title, row.source_url
                );
            }
        }
        Commands::Config { write } => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            if write {
                config
                    .save(&config_path)
                    .with_context(|| format!("failed to save {}", config_path.display()))?;
                info!("Saved configuration to `{}`", config_path.display());
            }
        }
    }

    Ok(())
}
