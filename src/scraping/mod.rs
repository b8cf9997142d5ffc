pub mod base;
pub mod polish_date;
pub mod sitemap;
pub mod swing_revolution_html;

use thiserror::Error;
use tracing::{error, info};

use crate::models::{ScrapedEvent, SitemapEntry};
use base::{FetchError, Fetcher};

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("title not found")]
    MissingTitle,
    #[error("place details not found")]
    MissingPlace,
    #[error("schedule section not found")]
    NoSchedule,
    #[error("polish month name not found in `{0}`")]
    UnknownMonth(String),
    #[error("invalid date `{0}`")]
    InvalidDate(String),
    #[error("invalid time `{0}`")]
    InvalidTime(String),
    #[error("local time does not exist: {0}")]
    NonexistentLocalTime(String),
}

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("extraction failed for {url}: {source}")]
    Extract {
        url: String,
        #[source]
        source: ExtractError,
    },
}

/// A site whose event pages can be turned into [`ScrapedEvent`]s.
pub trait EventSource {
    fn source_id(&self) -> &'static str;
    fn extract(&self, html: &str, url: &str) -> Result<ScrapedEvent, ExtractError>;
}

pub struct ScrapeReport {
    pub events: Vec<ScrapedEvent>,
    pub failures: Vec<(String, ScrapeError)>,
}

pub fn scrape_page(
    source: &dyn EventSource,
    fetcher: &dyn Fetcher,
    url: &str,
) -> Result<ScrapedEvent, ScrapeError> {
    let bytes = fetcher.fetch_bytes(url)?;
    let html = String::from_utf8_lossy(&bytes);
    source
        .extract(&html, url)
        .map_err(|err| ScrapeError::Extract {
            url: url.to_string(),
            source: err,
        })
}

/// Scrapes every entry in order. A failing URL is logged and left out.
pub fn scrape_all(
    source: &dyn EventSource,
    fetcher: &dyn Fetcher,
    entries: &[SitemapEntry],
) -> ScrapeReport {
    let mut events = Vec::new();
    let mut failures = Vec::new();

    for entry in entries {
        match scrape_page(source, fetcher, &entry.url) {
            Ok(event) => events.push(event),
            Err(err) => {
                error!("{}: skipping {}: {err}", source.source_id(), entry.url);
                failures.push((entry.url.clone(), err));
            }
        }
    }

    info!(
        "Extracted details for {} events ({} failed)",
        events.len(),
        failures.len()
    );
    ScrapeReport { events, failures }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MapFetcher(HashMap<&'static str, &'static str>);

    impl Fetcher for MapFetcher {
        fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
            self.0
                .get(url)
                .map(|body| body.as_bytes().to_vec())
                .ok_or_else(|| FetchError::Other(format!("404 {url}")))
        }
    }

    fn entry(url: &str) -> SitemapEntry {
        SitemapEntry {
            url: url.to_string(),
            last_modified: "2024-06-25T10:06:15+00:00".to_string(),
        }
    }

    #[test]
    fn failures_do_not_stop_other_urls() {
        let fetcher = MapFetcher(HashMap::from([
            (
                "https://a",
                "<h1>A</h1><div><h5>Gdzie?</h5><p>Studio, Gdańsk</p></div>",
            ),
            ("https://broken", "<h1>No place</h1>"),
            (
                "https://c",
                "<h1>C</h1><div><h5>Gdzie?</h5><p>Klub, Sopot</p></div>",
            ),
        ]));
        let entries = vec![
            entry("https://a"),
            entry("https://missing"),
            entry("https://broken"),
            entry("https://c"),
        ];

        let report = scrape_all(&swing_revolution_html::SwingRevolution, &fetcher, &entries);

        let titles: Vec<&str> = report.events.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["A", "C"]);
        assert_eq!(report.failures.len(), 2);
        assert!(matches!(
            report.failures[0],
            (ref url, ScrapeError::Fetch(_)) if url == "https://missing"
        ));
        assert!(matches!(
            report.failures[1].1,
            ScrapeError::Extract {
                source: ExtractError::MissingPlace,
                ..
            }
        ));
    }
}
