use chrono::{DateTime, NaiveDate, Utc};
use quick_xml::events::attributes::AttrError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::NsReader;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::models::SitemapEntry;

pub const DEFAULT_MAX_AGE_DAYS: i64 = 30;

const XSI_NAMESPACE: &[u8] = b"http://www.w3.org/2001/XMLSchema-instance";
const SECONDS_PER_DAY: i64 = 86_400;

#[derive(Debug, Error)]
pub enum SitemapError {
    #[error("malformed sitemap xml: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("malformed sitemap attribute: {0}")]
    Attribute(#[from] AttrError),
    #[error("sitemap has no root element")]
    MissingRoot,
    #[error("sitemap root declares no namespace in xsi:schemaLocation")]
    MissingNamespace,
    #[error("sitemap ends before its root element is closed")]
    Truncated,
}

#[derive(Default)]
struct RawUrl {
    loc: Option<String>,
    lastmod: Option<String>,
}

#[derive(Clone, Copy)]
enum Field {
    Loc,
    Lastmod,
}

/// Lists sitemap entries modified within `max_age_days` of `now`, newest first.
///
/// The sitemap lists events oldest to newest, so the surviving entries are
/// reversed once here. Entries with a missing or unparseable `lastmod` are
/// skipped with a warning.
pub fn list_entries(
    xml: &[u8],
    max_age_days: i64,
    now: DateTime<Utc>,
) -> Result<Vec<SitemapEntry>, SitemapError> {
    let urls = parse_urlset(xml)?;
    info!("Found {} events in the sitemap", urls.len());

    let mut entries = Vec::new();
    for raw in urls {
        let Some(url) = raw.loc.filter(|loc| !loc.is_empty()) else {
            warn!("Sitemap entry without <loc>, skipping");
            continue;
        };
        let Some(lastmod) = raw.lastmod else {
            warn!("Sitemap entry `{url}` has no <lastmod>, skipping");
            continue;
        };
        let modified = match parse_lastmod(&lastmod) {
            Some(dt) => dt,
            None => {
                warn!("Failed to parse lastmod date `{lastmod}` of `{url}`, skipping");
                continue;
            }
        };
        let age = age_in_days(modified, now);
        if age > max_age_days {
            debug!("Event `{url}` is {age} days old (limit {max_age_days}), skipping");
            continue;
        }
        entries.push(SitemapEntry {
            url,
            last_modified: lastmod,
        });
    }

    entries.reverse();
    info!("Extracted {} events from the sitemap", entries.len());
    Ok(entries)
}

fn parse_urlset(xml: &[u8]) -> Result<Vec<RawUrl>, SitemapError> {
    let mut reader = NsReader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut namespace: Option<Vec<u8>> = None;
    let mut urls = Vec::new();
    let mut current: Option<RawUrl> = None;
    let mut field: Option<Field> = None;
    let mut depth = 0usize;

    loop {
        let (resolved, event) = reader.read_resolved_event_into(&mut buf)?;
        let in_namespace = matches!(
            (&resolved, namespace.as_deref()),
            (ResolveResult::Bound(Namespace(bound)), Some(ns)) if *bound == ns
        );

        match event {
            Event::Start(e) if namespace.is_none() => {
                depth += 1;
                namespace = Some(schema_namespace(&reader, &e)?);
            }
            Event::Empty(e) if namespace.is_none() => {
                namespace = Some(schema_namespace(&reader, &e)?);
                break;
            }
            Event::Start(e) if in_namespace => {
                depth += 1;
                match e.local_name().as_ref() {
                    b"url" => current = Some(RawUrl::default()),
                    b"loc" if current.is_some() => field = Some(Field::Loc),
                    b"lastmod" if current.is_some() => field = Some(Field::Lastmod),
                    _ => field = None,
                }
            }
            Event::Start(_) => {
                depth += 1;
                field = None;
            }
            Event::Text(e) => {
                if let (Some(raw), Some(field)) = (current.as_mut(), field) {
                    store(raw, field, e.unescape()?.trim());
                }
            }
            Event::CData(e) => {
                if let (Some(raw), Some(field)) = (current.as_mut(), field) {
                    store(raw, field, String::from_utf8_lossy(&e.into_inner()).trim());
                }
            }
            Event::End(e) => {
                depth = depth.saturating_sub(1);
                field = None;
                if in_namespace && e.local_name().as_ref() == b"url" {
                    if let Some(raw) = current.take() {
                        urls.push(raw);
                    }
                }
            }
            Event::Eof if depth > 0 => return Err(SitemapError::Truncated),
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if namespace.is_none() {
        return Err(SitemapError::MissingRoot);
    }
    Ok(urls)
}

fn store(raw: &mut RawUrl, field: Field, text: &str) {
    let slot = match field {
        Field::Loc => &mut raw.loc,
        Field::Lastmod => &mut raw.lastmod,
    };
    slot.get_or_insert_with(String::new).push_str(text);
}

/// First token of the root's `xsi:schemaLocation` attribute.
fn schema_namespace(
    reader: &NsReader<&[u8]>,
    root: &BytesStart<'_>,
) -> Result<Vec<u8>, SitemapError> {
    for attr in root.attributes() {
        let attr = attr?;
        let (ns, local) = reader.resolve_attribute(attr.key);
        let is_schema_location = local.as_ref() == b"schemaLocation"
            && matches!(ns, ResolveResult::Bound(Namespace(bound)) if bound == XSI_NAMESPACE);
        if !is_schema_location {
            continue;
        }
        let value = attr.unescape_value()?;
        return value
            .split_whitespace()
            .next()
            .map(|token| token.as_bytes().to_vec())
            .ok_or(SitemapError::MissingNamespace);
    }
    Err(SitemapError::MissingNamespace)
}

fn parse_lastmod(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Whole days between `modified` and `now`; any started day counts.
fn age_in_days(modified: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let seconds = (now - modified).num_seconds();
    seconds.div_euclid(SECONDS_PER_DAY) + i64::from(seconds.rem_euclid(SECONDS_PER_DAY) != 0)
}
