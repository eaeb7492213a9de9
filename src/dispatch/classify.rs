//! Pure classification of a submission response into one of the four
//! handling strategies. Nothing here touches the message store.

use serde_json::Value;

use crate::api::Attachment;
use crate::body::{BodyStream, IncomingResponse};
use crate::error::TransportError;

pub const PENDING_PLACEHOLDER: &str = "Generating your media. This can take a minute or two.";

pub const DIRECT_RESULT_FALLBACK: &str = "Message received.";

pub const RESEND_PLEASE: &str =
    "Something went wrong while reading the response. Please resend your message.";

/// A text body starting with this is an event stream served with the wrong
/// content type and cannot be shown as-is.
pub const MALFORMED_STREAM_PREFIX: &str = "data:";

/// Fields that may carry the job-status URL, in lookup order.
const JOB_URL_FIELDS: [&str; 3] = ["jobStatusUrl", "replicateStreamUrl", "statusUrl"];

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BodyKind {
    Json,
    EventStream,
    Text,
}

/// Picks the transport mode from the declared content type. Matching is on
/// the media type only; parameters such as `charset` are ignored.
pub fn body_kind(content_type: Option<&str>) -> BodyKind {
    let Some(content_type) = content_type else {
        return BodyKind::Text;
    };
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    if essence == "application/json" || essence.ends_with("+json") {
        BodyKind::Json
    } else if essence == "text/event-stream" {
        BodyKind::EventStream
    } else {
        BodyKind::Text
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingJob {
    pub job_status_url: String,
    pub placeholder: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirectResult {
    pub content: String,
    pub attachments: Vec<Attachment>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JsonShape {
    PendingJob(PendingJob),
    DirectResult(DirectResult),
}

pub enum ResponseKind {
    PendingJob(PendingJob),
    DirectResult(DirectResult),
    EventStream(BodyStream),
    PlainText(String),
}

impl ResponseKind {
    pub fn name(&self) -> &'static str {
        match self {
            ResponseKind::PendingJob(_) => "pending_job",
            ResponseKind::DirectResult(_) => "direct_result",
            ResponseKind::EventStream(_) => "event_stream",
            ResponseKind::PlainText(_) => "plain_text",
        }
    }
}

/// Reads as much of the body as classification needs. Event streams are
/// handed back unread.
pub async fn classify(response: IncomingResponse) -> Result<ResponseKind, TransportError> {
    match body_kind(response.content_type()) {
        BodyKind::EventStream => Ok(ResponseKind::EventStream(response.into_body())),
        BodyKind::Json => {
            let raw = response.text().await?;
            match serde_json::from_str::<Value>(&raw) {
                Ok(value) => Ok(match classify_json(&value) {
                    JsonShape::PendingJob(job) => ResponseKind::PendingJob(job),
                    JsonShape::DirectResult(result) => ResponseKind::DirectResult(result),
                }),
                Err(e) => {
                    tracing::warn!(error = %e, "json response did not parse, treating as text");
                    Ok(ResponseKind::PlainText(plain_text_content(raw)))
                }
            }
        }
        BodyKind::Text => Ok(ResponseKind::PlainText(plain_text_content(response.text().await?))),
    }
}

pub fn classify_json(value: &Value) -> JsonShape {
    let is_pending = value.get("status").and_then(Value::as_str) == Some("pending");
    if is_pending {
        if let Some(job_status_url) = job_status_url(value) {
            let placeholder = non_empty_str(value, "content")
                .or_else(|| non_empty_str(value, "message"))
                .unwrap_or(PENDING_PLACEHOLDER)
                .to_string();
            return JsonShape::PendingJob(PendingJob {
                job_status_url,
                placeholder,
            });
        }
        tracing::warn!("pending response without a job url, treating as a direct result");
    }

    let content = non_empty_str(value, "content")
        .or_else(|| non_empty_str(value, "text"))
        .unwrap_or(DIRECT_RESULT_FALLBACK)
        .to_string();
    JsonShape::DirectResult(DirectResult {
        content,
        attachments: attachments(value),
    })
}

pub fn plain_text_content(raw: String) -> String {
    if raw.starts_with(MALFORMED_STREAM_PREFIX) {
        tracing::warn!("text response looks like a raw event stream");
        RESEND_PLEASE.to_string()
    } else {
        raw
    }
}

/// Accepts either `"field": "https://..."` or `"field": [{"url": "https://..."}]`.
fn job_status_url(value: &Value) -> Option<String> {
    JOB_URL_FIELDS.iter().find_map(|field| {
        let url = match value.get(*field)? {
            Value::String(url) => Some(url.as_str()),
            Value::Array(items) => items.first()?.get("url")?.as_str(),
            _ => None,
        }?;
        let url = url.trim();
        (!url.is_empty()).then(|| url.to_string())
    })
}

fn non_empty_str<'a>(value: &'a Value, field: &str) -> Option<&'a str> {
    value
        .get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

fn attachments(value: &Value) -> Vec<Attachment> {
    let Some(items) = value.get("attachments").and_then(Value::as_array) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match serde_json::from_value::<Attachment>(item.clone()) {
            Ok(att) => Some(att),
            Err(e) => {
                tracing::warn!(error = %e, "skipping malformed attachment");
                None
            }
        })
        .collect()
}
