use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Copy, Clone, Debug, Deserialize, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    #[default]
    Assistant,
    System,
}

/// Client-generated message identity, unique for the lifetime of a session.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(Uuid);

impl MessageId {
    pub fn new() -> Self {
        MessageId(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub content_type: String,
    pub url: String,
}

impl Attachment {
    pub fn new(
        name: impl Into<String>,
        content_type: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Attachment {
            name: name.into(),
            content_type: content_type.into(),
            url: url.into(),
        }
    }
}

/// Location of an asynchronous job's status. Never empty.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct JobUrl(String);

impl JobUrl {
    /// Trims surrounding whitespace; `None` if nothing is left.
    pub fn new(url: impl AsRef<str>) -> Option<Self> {
        let url = url.as_ref().trim();
        (!url.is_empty()).then(|| JobUrl(url.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle of an assistant turn. `Completed` and `Failed` are terminal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum MessageStatus {
    Pending {
        #[serde(rename = "jobStatusUrl")]
        job_status_url: JobUrl,
    },
    Completed,
    Failed,
}

impl MessageStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, MessageStatus::Completed | MessageStatus::Failed)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    pub content: String,
    /// `None` is the legacy "immediately complete" state.
    #[serde(flatten)]
    pub status: Option<MessageStatus>,
    pub attachments: Vec<Attachment>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Message {
            id: MessageId::new(),
            role,
            content: content.into(),
            status: None,
            attachments: Vec::new(),
        }
    }

    pub fn user(content: impl Into<String>, attachments: Vec<Attachment>) -> Self {
        Message::new(Role::User, content).with_attachments(attachments)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Message::new(Role::Assistant, content)
    }

    pub fn completed(content: impl Into<String>, attachments: Vec<Attachment>) -> Self {
        Message {
            status: Some(MessageStatus::Completed),
            ..Message::assistant(content).with_attachments(attachments)
        }
    }

    /// Returns `None` when `job_status_url` is empty: a pending message must
    /// always point at the job it waits on.
    pub fn pending(placeholder: impl Into<String>, job_status_url: impl AsRef<str>) -> Option<Self> {
        let job_status_url = JobUrl::new(job_status_url)?;
        Some(Message {
            status: Some(MessageStatus::Pending { job_status_url }),
            ..Message::assistant(placeholder)
        })
    }

    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = attachments;
        self
    }

    pub fn job_status_url(&self) -> Option<&str> {
        match &self.status {
            Some(MessageStatus::Pending { job_status_url }) => Some(job_status_url.as_str()),
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.job_status_url().is_some()
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
pub struct OutgoingMessage {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

impl From<&Message> for OutgoingMessage {
    fn from(msg: &Message) -> Self {
        OutgoingMessage {
            role: msg.role,
            content: msg.content.clone(),
            attachments: msg.attachments.clone(),
        }
    }
}

/// Body of a submission POST.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub message: OutgoingMessage,
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
}
