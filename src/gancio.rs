use std::time::Duration;

use reqwest::blocking::multipart::{Form, Part};
use thiserror::Error;

use crate::models::PublishRecord;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("no gancio instance configured")]
    MissingInstance,
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("gancio api error ({status}): {body}")]
    Api { status: u16, body: String },
}

/// Something that accepts publish records, typically a Gancio instance.
pub trait Publisher {
    fn publish(&self, record: &PublishRecord) -> Result<serde_json::Value, PublishError>;
}

pub struct GancioClient {
    endpoint: String,
    client: reqwest::blocking::Client,
}

impl GancioClient {
    pub fn new(instance_url: &str, timeout: Duration) -> Result<Self, PublishError> {
        let instance_url = instance_url.trim().trim_end_matches('/');
        if instance_url.is_empty() {
            return Err(PublishError::MissingInstance);
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(Self {
            endpoint: format!("{instance_url}/api/event"),
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Publisher for GancioClient {
    fn publish(&self, record: &PublishRecord) -> Result<serde_json::Value, PublishError> {
        let response = self
            .client
            .post(&self.endpoint)
            .multipart(event_form(record)?)
            .send()?;

        let status = response.status();
        let body = response.text()?;
        if !status.is_success() {
            return Err(PublishError::Api {
                status: status.as_u16(),
                body,
            });
        }

        // Gancio answers with the created event; keep raw text if it is not JSON.
        Ok(serde_json::from_str(&body).unwrap_or(serde_json::Value::String(body)))
    }
}

/// Form fields Gancio's `/api/event` endpoint reads.
pub fn form_fields(record: &PublishRecord) -> Vec<(&'static str, String)> {
    let mut fields = vec![
        ("title", record.title.clone()),
        ("description", record.description.clone()),
        ("place_name", record.place_name.clone()),
        ("place_address", record.place_address.clone()),
        ("start_datetime", record.start_datetime.to_string()),
    ];
    if let Some(end) = record.end_datetime {
        fields.push(("end_datetime", end.to_string()));
    }
    fields.push(("multidate", u8::from(record.multidate).to_string()));
    // tags and online_locations stay off the form: Gancio answers 500 on tags
    // and splits a location string into one location per character.
    fields
}

fn event_form(record: &PublishRecord) -> Result<Form, PublishError> {
    let mut form = Form::new();
    for (name, value) in form_fields(record) {
        form = form.text(name, value);
    }
    if let Some(image) = &record.image {
        let part = Part::bytes(image.clone())
            .file_name("image")
            .mime_str("application/octet-stream")?;
        form = form.part("image", part);
    }
    Ok(form)
}
