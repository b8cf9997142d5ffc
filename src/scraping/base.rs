use std::time::Duration;

use chrono::{DateTime, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use chrono_tz::Tz;
use reqwest::blocking::Client;
use scraper::{ElementRef, Html, Selector};
use thiserror::Error;

pub const DEFAULT_USER_AGENT: &str = "SwingScrape/0.1 (+https://swingrevolution.pl)";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed for {url}: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("non-success status {status} for {url}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("unable to read response body for {url}: {source}")]
    Body {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{0}")]
    Other(String),
}

/// Raw GET of sitemap, page and image content.
pub trait Fetcher {
    fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|err| FetchError::Other(format!("http client: {err}")))?;
        Ok(Self { client })
    }
}

impl Fetcher for HttpFetcher {
    fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|source| FetchError::Request {
                url: url.to_string(),
                source,
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status,
            });
        }
        response
            .bytes()
            .map(|bytes| bytes.to_vec())
            .map_err(|source| FetchError::Body {
                url: url.to_string(),
                source,
            })
    }
}

pub fn clean_text(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Raw text content, whitespace preserved.
pub fn raw_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>()
}

/// Finds the first `heading` element whose text contains `label` and returns
/// its parent element, which holds the rest of the section.
pub fn find_section_by_label<'a>(
    document: &'a Html,
    heading: &Selector,
    label: &str,
) -> Option<ElementRef<'a>> {
    document
        .select(heading)
        .find(|elem| raw_text(*elem).contains(label))
        .and_then(|elem| elem.parent())
        .and_then(ElementRef::wrap)
}

pub fn to_timezone_datetime(date: NaiveDate, time: NaiveTime, tz: Tz) -> Option<DateTime<Tz>> {
    let naive = NaiveDateTime::new(date, time);
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt),
        LocalResult::Ambiguous(dt, _) => Some(dt),
        LocalResult::None => None,
    }
}
