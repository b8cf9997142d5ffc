pub mod config;
pub mod db;
pub mod dump;
pub mod gancio;
pub mod models;
pub mod publish;
pub mod scraping;
pub mod utils;

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use config::AppConfig;
use db::Store;
use gancio::Publisher;
use models::{PublishRecord, ScrapedEvent, SitemapEntry};
use scraping::base::Fetcher;
use scraping::swing_revolution_html::SwingRevolution;
use scraping::{sitemap, EventSource};

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Build and dump everything but submit nothing.
    pub dry_run: bool,
    pub dump_records: bool,
}

/// External systems a run talks to. `publisher` is unused on dry runs and
/// `store` is `None` when the ledger is disabled.
pub struct Collaborators<'a> {
    pub fetcher: &'a dyn Fetcher,
    pub publisher: Option<&'a dyn Publisher>,
    pub store: Option<&'a Store>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub scraped: usize,
    pub failed: usize,
    pub image_failures: usize,
    pub future: usize,
    pub skipped: usize,
    pub already_published: usize,
    pub published: usize,
    pub publish_failures: usize,
    pub snapshot: Option<PathBuf>,
    pub records_dump: Option<PathBuf>,
}

impl RunSummary {
    pub fn counts_line(&self) -> String {
        format!(
            "Run finished: {} scraped, {} failed, {} future records, {} past occurrences skipped, {} published, {} publish failures",
            self.scraped,
            self.failed,
            self.future,
            self.skipped,
            self.published,
            self.publish_failures
        )
    }
}

pub fn source() -> &'static dyn EventSource {
    &SwingRevolution
}

/// Fetches the sitemap and returns the entries young enough to scrape.
pub fn sitemap_entries(
    config: &AppConfig,
    fetcher: &dyn Fetcher,
    now: DateTime<Utc>,
) -> Result<Vec<SitemapEntry>> {
    let xml = fetcher
        .fetch_bytes(&config.sitemap_url)
        .with_context(|| format!("failed to fetch sitemap {}", config.sitemap_url))?;
    sitemap::list_entries(&xml, config.max_age_days, now)
        .with_context(|| format!("failed to read sitemap {}", config.sitemap_url))
}

pub fn scrape_one(fetcher: &dyn Fetcher, url: &str) -> Result<ScrapedEvent> {
    scraping::scrape_page(source(), fetcher, url).with_context(|| format!("failed to scrape {url}"))
}

/// One full pass: sitemap, pages, records, dumps, then a bounded number of
/// submissions. `now` is the single clock reading for the whole run.
pub fn run(
    config: &AppConfig,
    options: &RunOptions,
    collaborators: &Collaborators<'_>,
    now: DateTime<Utc>,
) -> Result<RunSummary> {
    let fetcher = collaborators.fetcher;
    let mut summary = RunSummary::default();

    let entries = sitemap_entries(config, fetcher, now)?;
    let report = scraping::scrape_all(source(), fetcher, &entries);
    summary.scraped = report.events.len();
    summary.failed = report.failures.len();

    let mut records = Vec::new();
    for event in &report.events {
        match publish::prepare_records(event, now, fetcher) {
            Ok(prepared) => {
                summary.skipped += prepared.skipped;
                records.extend(prepared.records);
            }
            Err(err) => {
                error!("[{}] Failed to fetch image, dropping event: {err}", event.title);
                summary.image_failures += 1;
            }
        }
    }
    summary.future = records.len();

    let snapshot = dump::write_snapshot(&config.output_dir, &report.events, now)
        .context("failed to write event snapshot")?;
    summary.snapshot = Some(snapshot);

    if options.dump_records {
        let path = dump::write_records_ndjson(&config.output_dir, &records, now)
            .context("failed to write publish records")?;
        summary.records_dump = Some(path);
    }

    if records.is_empty() {
        info!("No Gancio events created");
    } else {
        info!("Prepared {} events", records.len());
        let pending = unpublished(records, collaborators.store, &mut summary)?;
        let batch: Vec<&PublishRecord> = pending.iter().take(config.publish_limit).collect();

        match (options.dry_run, collaborators.publisher) {
            (false, Some(publisher)) => {
                submit(&batch, publisher, collaborators.store, now, &mut summary);
            }
            (false, None) => {
                warn!("No Gancio instance configured, nothing submitted");
            }
            (true, _) => {
                for record in &batch {
                    info!(
                        "[{}] Dry run, would publish start {}",
                        record.title, record.start_datetime
                    );
                }
            }
        }
    }

    info!("{}", summary.counts_line());
    Ok(summary)
}

fn unpublished(
    records: Vec<PublishRecord>,
    store: Option<&Store>,
    summary: &mut RunSummary,
) -> Result<Vec<PublishRecord>> {
    let Some(store) = store else {
        return Ok(records);
    };
    let mut pending = Vec::with_capacity(records.len());
    for record in records {
        if store
            .is_published(&record.key())
            .context("failed to read publish ledger")?
        {
            summary.already_published += 1;
            continue;
        }
        pending.push(record);
    }
    if summary.already_published > 0 {
        info!(
            "{} records were published by an earlier run",
            summary.already_published
        );
    }
    Ok(pending)
}

fn submit(
    batch: &[&PublishRecord],
    publisher: &dyn Publisher,
    store: Option<&Store>,
    now: DateTime<Utc>,
    summary: &mut RunSummary,
) {
    for record in batch {
        match publisher.publish(record) {
            Ok(response) => {
                info!("[{}] Published: {response}", record.title);
                summary.published += 1;
                if let Some(store) = store {
                    if let Err(err) = store.mark_published(record, &response, now) {
                        error!("[{}] Published but not recorded in ledger: {err}", record.title);
                    }
                }
            }
            Err(err) => {
                error!("[{}] Failed to publish: {err}", record.title);
                summary.publish_failures += 1;
            }
        }
    }
}
