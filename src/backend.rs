//! Transport seams consumed by the conversation core, and their HTTP
//! implementation.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::time::Duration;
use tracing::instrument;

use crate::api::SubmitRequest;
use crate::body::IncomingResponse;
use crate::client::Client;
use crate::config::Endpoints;
use crate::error::TransportError;
use crate::poller::{JobStatus, StatusResponse};
use crate::validate::LocalFile;

#[async_trait]
pub trait SubmitTransport: Send + Sync {
    /// Sends one user turn. `Ok` means a success status was received; the
    /// body is still unread.
    async fn submit(&self, request: &SubmitRequest) -> Result<IncomingResponse, TransportError>;
}

#[async_trait]
pub trait UploadTransport: Send + Sync {
    /// Uploads a single file and returns its hosted location.
    async fn upload(&self, file: &LocalFile) -> Result<String, TransportError>;
}

#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn check(&self, job_status_url: &str) -> Result<JobStatus, TransportError>;
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(default)]
    url: Option<String>,
}

pub struct HttpBackend {
    client: Client,
    endpoints: Endpoints,
}

impl HttpBackend {
    pub fn new(endpoints: Endpoints, timeout: Duration) -> Result<Self, TransportError> {
        Ok(HttpBackend {
            client: Client::with_timeout(timeout)?,
            endpoints,
        })
    }
}

#[async_trait]
impl SubmitTransport for HttpBackend {
    async fn submit(&self, request: &SubmitRequest) -> Result<IncomingResponse, TransportError> {
        let response = self.client.post_raw(&self.endpoints.submit, request).await?;
        Ok(IncomingResponse::from_reqwest(response))
    }
}

#[async_trait]
impl UploadTransport for HttpBackend {
    #[instrument(level = "info", skip(self, file), fields(name = %file.name, size = file.size()))]
    async fn upload(&self, file: &LocalFile) -> Result<String, TransportError> {
        let mut part = Part::bytes(file.bytes.to_vec()).file_name(file.name.clone());
        if !file.content_type.is_empty() {
            part = part
                .mime_str(&file.content_type)
                .map_err(|e| TransportError::MalformedPayload(e.to_string()))?;
        }
        let form = Form::new().part("file", part);

        let response: UploadResponse = self.client.post_multipart(&self.endpoints.upload, form).await?;
        match response.url {
            Some(url) if !url.trim().is_empty() => Ok(url),
            _ => Err(TransportError::MalformedPayload(
                "upload response has no url".to_string(),
            )),
        }
    }
}

#[async_trait]
impl StatusSource for HttpBackend {
    async fn check(&self, job_status_url: &str) -> Result<JobStatus, TransportError> {
        let response: StatusResponse = self
            .client
            .get(&self.endpoints.status, &[("url", job_status_url)])
            .await?;
        Ok(response.into())
    }
}
