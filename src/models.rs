use chrono::DateTime;
use chrono_tz::Tz;
use serde::{Serialize, Serializer};
use sha2::{Digest, Sha256};

/// One `<url>` element of the events sitemap.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct SitemapEntry {
    pub url: String,
    pub last_modified: String,
}

/// A single showing of an event, in the venue's civil timezone.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct Occurrence {
    pub start: DateTime<Tz>,
    pub end: Option<DateTime<Tz>>,
}

impl Occurrence {
    pub fn is_inverted(&self) -> bool {
        self.end.is_some_and(|end| end < self.start)
    }
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct ScrapedEvent {
    pub source_url: String,
    pub title: String,
    pub description: String, // html fragment
    pub place_name: String,
    pub place_address: String,
    pub image_url: Option<String>,
    pub occurrences: Vec<Occurrence>,
}

/// Payload for `POST /api/event` on a Gancio instance.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct PublishRecord {
    pub title: String,
    pub description: String,
    pub place_name: String,
    pub place_address: String,
    pub online_locations: Vec<String>,
    pub start_datetime: i64,
    pub end_datetime: Option<i64>,
    pub multidate: bool,
    pub tags: Vec<String>,
    #[serde(serialize_with = "image_len", rename = "image_bytes")]
    pub image: Option<Vec<u8>>,
}

impl PublishRecord {
    /// Stable key: source_url|start_datetime|title
    pub fn key(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.source_url().as_bytes());
        hasher.update(b"|");
        hasher.update(self.start_datetime.to_string().as_bytes());
        hasher.update(b"|");
        hasher.update(self.title.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub fn source_url(&self) -> &str {
        self.online_locations
            .first()
            .map(String::as_str)
            .unwrap_or_default()
    }
}

fn image_len<S: Serializer>(image: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
    match image {
        Some(bytes) => serializer.serialize_some(&bytes.len()),
        None => serializer.serialize_none(),
    }
}
