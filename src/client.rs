use reqwest::multipart::Form;
use serde::{Serialize, de::DeserializeOwned};
use std::fmt::Debug;
use std::time::Duration;
use tracing::{Level, event, instrument};

use crate::error::TransportError;

#[derive(Clone)]
pub struct Client {
    client: reqwest::Client,
}

impl Client {
    pub fn with_timeout(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Network(format!("failed to build client: {e}")))?;
        Ok(Client { client })
    }

    #[instrument(level = "info", skip(self))]
    pub async fn get<U, T>(&self, url: U, query: &[(&str, &str)]) -> Result<T, TransportError>
    where
        U: reqwest::IntoUrl + Debug,
        T: DeserializeOwned,
    {
        let response = self.client.get(url).query(query).send().await?;
        let response = ensure_success(response).await?;
        let text = response.text().await?;
        event!(Level::DEBUG, response = text);

        Ok(serde_json::from_str::<T>(&text)?)
    }

    /// Posts `request` as JSON and hands back the unread response so the
    /// caller can decide how to consume the body.
    #[instrument(level = "info", skip(self, request), fields(json_request = serde_json::to_string(request).unwrap_or_default()))]
    pub async fn post_raw<U, S>(&self, url: U, request: &S) -> Result<reqwest::Response, TransportError>
    where
        U: reqwest::IntoUrl + Debug,
        S: Serialize + Sized,
    {
        let response = self.client.post(url).json(request).send().await?;
        ensure_success(response).await
    }

    #[instrument(level = "info", skip(self, form))]
    pub async fn post_multipart<U, T>(&self, url: U, form: Form) -> Result<T, TransportError>
    where
        U: reqwest::IntoUrl + Debug,
        T: DeserializeOwned,
    {
        let response = self.client.post(url).multipart(form).send().await?;
        let response = ensure_success(response).await?;
        let text = response.text().await?;
        event!(Level::DEBUG, response = text);

        Ok(serde_json::from_str::<T>(&text)?)
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    event!(Level::WARN, status = status.as_u16(), body = body, "request failed");
    Err(TransportError::Status {
        status: status.as_u16(),
        body,
    })
}
