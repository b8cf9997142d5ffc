use chrono_tz::Tz;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use tracing::{info, warn};

use super::base;
use super::polish_date;
use super::{EventSource, ExtractError};
use crate::models::{Occurrence, ScrapedEvent};

pub const TIMEZONE: Tz = chrono_tz::Europe::Warsaw;

/// Heading texts that label the page sections.
pub struct Markers {
    pub schedule: &'static str,
    pub place: &'static str,
    pub description: &'static str,
}

pub const MARKERS: Markers = Markers {
    schedule: "Kiedy?",
    place: "Gdzie?",
    description: "Trochę szczegółów",
};

static TITLE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h1").expect("swing revolution title"));
static IMAGE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("header div[data-bg]").expect("swing revolution image"));
static SECTION_HEADING: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h5").expect("swing revolution section heading"));
static DESCRIPTION_HEADING: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h4").expect("swing revolution description heading"));
static PARAGRAPH_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("p").expect("swing revolution paragraph"));
static DATE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("strong").expect("swing revolution date"));

pub struct SwingRevolution;

impl EventSource for SwingRevolution {
    fn source_id(&self) -> &'static str {
        "swing_revolution"
    }

    fn extract(&self, html: &str, url: &str) -> Result<ScrapedEvent, ExtractError> {
        extract_event(html, url)
    }
}

pub fn extract_event(html: &str, url: &str) -> Result<ScrapedEvent, ExtractError> {
    let document = Html::parse_document(html);

    let title = get_title(&document)?;
    let image_url = get_image_url(&document);
    if image_url.is_none() {
        warn!("[{title}] no header image found on {url}");
    }
    let (place_name, place_address) = get_place(&document)?;
    let description = get_description(&document).unwrap_or_else(|| {
        warn!("[{title}] no description found on {url}");
        String::new()
    });

    let occurrences = match get_occurrences(&document) {
        Ok(occurrences) => occurrences,
        Err(ExtractError::NoSchedule) => {
            info!("[{title}] no date/time found, treating as a past event");
            Vec::new()
        }
        Err(err) => return Err(err),
    };

    for occurrence in occurrences.iter().filter(|o| o.is_inverted()) {
        warn!(
            "[{title}] occurrence ends before it starts: {:?} > {:?}",
            occurrence.start, occurrence.end
        );
    }

    Ok(ScrapedEvent {
        source_url: url.to_string(),
        title,
        description,
        place_name,
        place_address,
        image_url,
        occurrences,
    })
}

fn get_title(document: &Html) -> Result<String, ExtractError> {
    document
        .select(&TITLE_SELECTOR)
        .next()
        .map(|elem| base::raw_text(elem).trim().to_string())
        .filter(|title| !title.is_empty())
        .ok_or(ExtractError::MissingTitle)
}

fn get_image_url(document: &Html) -> Option<String> {
    let style = document
        .select(&IMAGE_SELECTOR)
        .next()?
        .value()
        .attr("data-bg")?;
    let (_, rest) = style.split_once('(')?;
    let url = rest
        .split(')')
        .next()
        .unwrap_or_default()
        .trim()
        .trim_matches(|c| c == '\'' || c == '"');
    (!url.is_empty()).then(|| url.to_string())
}

fn get_place(document: &Html) -> Result<(String, String), ExtractError> {
    let paragraph = base::find_section_by_label(document, &SECTION_HEADING, MARKERS.place)
        .and_then(|section| section.select(&PARAGRAPH_SELECTOR).next())
        .ok_or(ExtractError::MissingPlace)?;
    let text = base::raw_text(paragraph);
    let text = text.trim_start();
    let text = text.strip_prefix('`').unwrap_or(text).trim();
    let (name, address) = text.split_once(',').unwrap_or((text, ""));
    Ok((base::clean_text(name), base::clean_text(address)))
}

fn get_description(document: &Html) -> Option<String> {
    base::find_section_by_label(document, &DESCRIPTION_HEADING, MARKERS.description)
        .and_then(|section| section.select(&PARAGRAPH_SELECTOR).next())
        .map(|paragraph| base::clean_text(&paragraph.inner_html()))
}

fn get_occurrences(document: &Html) -> Result<Vec<Occurrence>, ExtractError> {
    let section = base::find_section_by_label(document, &SECTION_HEADING, MARKERS.schedule)
        .ok_or(ExtractError::NoSchedule)?;
    let mut occurrences = Vec::new();
    for (row, date) in section.select(&PARAGRAPH_SELECTOR).filter_map(schedule_row) {
        match polish_date::parse_occurrence(&row, &date, TIMEZONE) {
            Ok(occurrence) => occurrences.push(occurrence),
            Err(ExtractError::NonexistentLocalTime(when)) => {
                warn!(
                    "skipping schedule row `{}`: local time does not exist ({when})",
                    base::clean_text(&row)
                );
            }
            Err(err) => return Err(err),
        }
    }
    Ok(occurrences)
}

/// Returns (row text, bolded date text) for rows carrying a date.
fn schedule_row(paragraph: ElementRef<'_>) -> Option<(String, String)> {
    let date = paragraph.select(&DATE_SELECTOR).next()?;
    Some((base::raw_text(paragraph), base::raw_text(date).trim().to_string()))
}
