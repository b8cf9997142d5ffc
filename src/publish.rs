use chrono::{DateTime, Utc};
use once_cell::unsync::OnceCell;
use tracing::info;

use crate::models::{PublishRecord, ScrapedEvent};
use crate::scraping::base::{FetchError, Fetcher};

pub const TAGS: [&str; 1] = ["swing"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptyReason {
    /// The page had no schedule when it was scraped.
    NoSchedule,
    /// Every occurrence started before `now`.
    AllPast,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prepared {
    pub records: Vec<PublishRecord>,
    pub skipped: usize,
    pub total: usize,
}

impl Prepared {
    pub fn empty_reason(&self) -> Option<EmptyReason> {
        match (self.records.is_empty(), self.total) {
            (false, _) => None,
            (true, 0) => Some(EmptyReason::NoSchedule),
            (true, _) => Some(EmptyReason::AllPast),
        }
    }

    /// Log lines describing what became of the event's occurrences.
    pub fn outcome_messages(&self, title: &str) -> Vec<String> {
        match self.empty_reason() {
            Some(EmptyReason::NoSchedule) => vec![format!(
                "[{title}] No publish records created: no schedule found at scrape time"
            )],
            Some(EmptyReason::AllPast) => vec![format!(
                "[{title}] No publish records created: all {} of {} occurrences are in the past",
                self.skipped, self.total
            )],
            None => {
                let mut lines = vec![format!(
                    "[{title}] Prepared {} publish records",
                    self.records.len()
                )];
                if self.skipped > 0 {
                    lines.push(format!(
                        "[{title}] Skipped {} of {} scraped occurrences",
                        self.skipped, self.total
                    ));
                }
                lines
            }
        }
    }
}

/// Expands an event into one record per occurrence starting at or after `now`.
pub fn build_publish_records(
    event: &ScrapedEvent,
    now: DateTime<Utc>,
    image_fetcher: &dyn Fetcher,
) -> Result<Vec<PublishRecord>, FetchError> {
    prepare_records(event, now, image_fetcher).map(|prepared| prepared.records)
}

/// Like [`build_publish_records`], also reporting how many occurrences were
/// skipped as past. The image is fetched at most once, on the first future
/// occurrence, and shared by every record.
pub fn prepare_records(
    event: &ScrapedEvent,
    now: DateTime<Utc>,
    image_fetcher: &dyn Fetcher,
) -> Result<Prepared, FetchError> {
    let title = &event.title;
    let image: OnceCell<Option<Vec<u8>>> = OnceCell::new();

    let mut records = Vec::new();
    let mut skipped = 0;
    for occurrence in &event.occurrences {
        if occurrence.start < now {
            info!(
                "[{title}] Past event occurrence found, skipping: {}",
                occurrence.start.to_rfc3339()
            );
            skipped += 1;
            continue;
        }
        let image = image.get_or_try_init(|| {
            event
                .image_url
                .as_deref()
                .map(|url| image_fetcher.fetch_bytes(url))
                .transpose()
        })?;
        records.push(PublishRecord {
            title: event.title.clone(),
            description: event.description.clone(),
            place_name: event.place_name.clone(),
            place_address: event.place_address.clone(),
            online_locations: vec![event.source_url.clone()],
            start_datetime: occurrence.start.timestamp(),
            end_datetime: occurrence.end.map(|end| end.timestamp()),
            // Gancio mishandles some single-day events sent with multidate=0.
            multidate: true,
            tags: TAGS.iter().map(|tag| tag.to_string()).collect(),
            image: image.clone(),
        });
    }

    let prepared = Prepared {
        records,
        skipped,
        total: event.occurrences.len(),
    };
    for line in prepared.outcome_messages(title) {
        info!("{line}");
    }

    Ok(prepared)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Occurrence;
    use chrono::TimeZone;
    use std::cell::Cell;

    const TZ: chrono_tz::Tz = chrono_tz::Europe::Warsaw;

    struct CountingFetcher {
        calls: Cell<usize>,
    }

    impl CountingFetcher {
        fn new() -> Self {
            Self {
                calls: Cell::new(0),
            }
        }
    }

    impl Fetcher for CountingFetcher {
        fn fetch_bytes(&self, _url: &str) -> Result<Vec<u8>, FetchError> {
            self.calls.set(self.calls.get() + 1);
            Ok(b"\x89PNG".to_vec())
        }
    }

    struct FailingFetcher;

    impl Fetcher for FailingFetcher {
        fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
            Err(FetchError::Other(format!("unreachable {url}")))
        }
    }

    fn at(y: i32, mo: u32, d: u32, h: u32) -> chrono::DateTime<chrono_tz::Tz> {
        TZ.with_ymd_and_hms(y, mo, d, h, 0, 0).unwrap()
    }

    fn utc(y: i32, mo: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, 0, 0, 0).unwrap()
    }

    fn event(occurrences: Vec<Occurrence>) -> ScrapedEvent {
        ScrapedEvent {
            source_url: "https://swingrevolution.pl/wydarzenia/lindy-hop/".to_string(),
            title: "Lindy Hop dla początkujących".to_string(),
            description: "<p>Zapisy</p>".to_string(),
            place_name: "Studio X".to_string(),
            place_address: "Łąkowa 35/38, Gdańsk".to_string(),
            image_url: Some("https://swingrevolution.pl/lindy.jpg".to_string()),
            occurrences,
        }
    }

    fn sundays() -> Vec<Occurrence> {
        (0..8)
            .map(|week| Occurrence {
                start: at(2024, 7, 7, 20) + chrono::Duration::weeks(week),
                end: None,
            })
            .collect()
    }

    #[test]
    fn single_occurrence_maps_to_epoch_seconds() {
        let occurrence = Occurrence {
            start: at(2024, 7, 27, 12),
            end: Some(at(2024, 7, 27, 15)),
        };
        let fetcher = CountingFetcher::new();
        let records =
            build_publish_records(&event(vec![occurrence]), utc(2024, 7, 1), &fetcher).unwrap();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.start_datetime, 1722074400);
        assert_eq!(record.end_datetime, Some(1722085200));
        assert_eq!(
            record.online_locations,
            vec!["https://swingrevolution.pl/wydarzenia/lindy-hop/".to_string()]
        );
        assert_eq!(record.tags, vec!["swing".to_string()]);
        assert!(record.multidate);
        assert_eq!(record.image.as_deref(), Some(&b"\x89PNG"[..]));
    }

    #[test]
    fn image_fetched_once_for_recurring_event() {
        let fetcher = CountingFetcher::new();
        let records = build_publish_records(&event(sundays()), utc(2024, 7, 1), &fetcher).unwrap();
        assert_eq!(records.len(), 8);
        assert_eq!(fetcher.calls.get(), 1);
        assert!(records.iter().all(|r| r.image == records[0].image));
        assert!(records.iter().all(|r| r.multidate));
    }

    #[test]
    fn no_image_url_means_no_fetch() {
        let mut scraped = event(sundays());
        scraped.image_url = None;
        let fetcher = CountingFetcher::new();
        let records = build_publish_records(&scraped, utc(2024, 7, 1), &fetcher).unwrap();
        assert_eq!(fetcher.calls.get(), 0);
        assert!(records.iter().all(|r| r.image.is_none()));
    }

    #[test]
    fn past_occurrences_are_skipped() {
        let occurrences = vec![
            Occurrence {
                start: at(2024, 7, 7, 20),
                end: None,
            },
            Occurrence {
                start: at(2024, 8, 25, 20),
                end: None,
            },
        ];
        let fetcher = CountingFetcher::new();
        let prepared = prepare_records(&event(occurrences), utc(2024, 7, 10), &fetcher).unwrap();
        assert_eq!(prepared.records.len(), 1);
        assert_eq!(prepared.records[0].start_datetime, 1724608800);
        assert_eq!(prepared.skipped, 1);
        assert_eq!(prepared.total, 2);
        assert_eq!(prepared.empty_reason(), None);
    }

    #[test]
    fn all_past_is_distinguished_from_no_schedule() {
        let fetcher = CountingFetcher::new();
        let all_past = prepare_records(&event(sundays()), utc(2025, 1, 1), &fetcher).unwrap();
        assert!(all_past.records.is_empty());
        assert_eq!(all_past.skipped, 8);
        assert_eq!(all_past.empty_reason(), Some(EmptyReason::AllPast));

        let no_schedule = prepare_records(&event(Vec::new()), utc(2025, 1, 1), &fetcher).unwrap();
        assert!(no_schedule.records.is_empty());
        assert_eq!(no_schedule.total, 0);
        assert_eq!(no_schedule.empty_reason(), Some(EmptyReason::NoSchedule));
    }

    #[test]
    fn same_now_gives_same_records() {
        let fetcher = CountingFetcher::new();
        let now = utc(2024, 7, 20);
        let first = prepare_records(&event(sundays()), now, &fetcher).unwrap();
        let second = prepare_records(&event(sundays()), now, &fetcher).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.records.len(), 6);
    }

    #[test]
    fn occurrence_starting_exactly_now_is_kept() {
        let start = at(2024, 7, 27, 12);
        let occurrence = Occurrence { start, end: None };
        let fetcher = CountingFetcher::new();
        let records =
            build_publish_records(&event(vec![occurrence]), start.with_timezone(&Utc), &fetcher)
                .unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn events_without_future_occurrences_fetch_no_image() {
        let all_past = prepare_records(&event(sundays()), utc(2025, 1, 1), &FailingFetcher)
            .expect("nothing to fetch");
        assert!(all_past.records.is_empty());

        let fetcher = CountingFetcher::new();
        prepare_records(&event(Vec::new()), utc(2025, 1, 1), &fetcher).unwrap();
        prepare_records(&event(sundays()), utc(2025, 1, 1), &fetcher).unwrap();
        assert_eq!(fetcher.calls.get(), 0);
    }

    #[test]
    fn outcome_messages_name_the_reason() {
        let fetcher = CountingFetcher::new();
        let title = "Sunday Summer Night";

        let no_schedule = prepare_records(&event(Vec::new()), utc(2024, 7, 1), &fetcher).unwrap();
        assert_eq!(
            no_schedule.outcome_messages(title),
            vec!["[Sunday Summer Night] No publish records created: no schedule found at scrape time"]
        );

        let all_past = prepare_records(&event(sundays()), utc(2025, 1, 1), &fetcher).unwrap();
        assert_eq!(
            all_past.outcome_messages(title),
            vec!["[Sunday Summer Night] No publish records created: all 8 of 8 occurrences are in the past"]
        );

        let partly_past = prepare_records(&event(sundays()), utc(2024, 7, 20), &fetcher).unwrap();
        assert_eq!(
            partly_past.outcome_messages(title),
            vec![
                "[Sunday Summer Night] Prepared 6 publish records",
                "[Sunday Summer Night] Skipped 2 of 8 scraped occurrences",
            ]
        );

        let all_future = prepare_records(&event(sundays()), utc(2024, 7, 1), &fetcher).unwrap();
        assert_eq!(
            all_future.outcome_messages(title),
            vec!["[Sunday Summer Night] Prepared 8 publish records"]
        );
    }

    #[test]
    fn image_failure_propagates() {
        let result = build_publish_records(&event(sundays()), utc(2024, 7, 1), &FailingFetcher);
        assert!(matches!(result, Err(FetchError::Other(_))));
    }
}
