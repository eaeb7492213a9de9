use bytes::{Bytes, BytesMut};
use futures::stream::{self, Stream, StreamExt};
use std::pin::Pin;

use crate::error::TransportError;

pub type BoxedStream<T> = Pin<Box<dyn Stream<Item = T> + Send>>;

pub type BodyStream = BoxedStream<Result<Bytes, TransportError>>;

/// A successful response to a submission: declared content type plus a body
/// that has not been read yet.
pub struct IncomingResponse {
    content_type: Option<String>,
    body: BodyStream,
}

impl IncomingResponse {
    pub fn new(content_type: Option<String>, body: BodyStream) -> Self {
        IncomingResponse { content_type, body }
    }

    /// Body delivered as the given sequence of chunks.
    pub fn from_chunks<I, B>(content_type: Option<&str>, chunks: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        let chunks: Vec<Result<Bytes, TransportError>> =
            chunks.into_iter().map(|c| Ok(c.into())).collect();
        Self::new(content_type.map(str::to_string), Box::pin(stream::iter(chunks)))
    }

    pub fn from_reqwest(response: reqwest::Response) -> Self {
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(TransportError::from));
        Self::new(content_type, Box::pin(body))
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn into_body(self) -> BodyStream {
        self.body
    }

    /// Reads the whole body. Invalid UTF-8 is replaced rather than rejected.
    pub async fn text(self) -> Result<String, TransportError> {
        let mut body = self.body;
        let mut buf = BytesMut::new();
        while let Some(chunk) = body.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn text_concatenates_chunks() {
        let resp = IncomingResponse::from_chunks(Some("text/plain"), ["he", "llo"]);
        assert_eq!(resp.content_type(), Some("text/plain"));
        assert_eq!(resp.text().await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn text_propagates_read_errors() {
        let chunks: Vec<Result<Bytes, TransportError>> = vec![
            Ok(Bytes::from_static(b"partial")),
            Err(TransportError::Network("reset".into())),
        ];
        let resp = IncomingResponse::new(None, Box::pin(stream::iter(chunks)));
        assert_eq!(
            resp.text().await,
            Err(TransportError::Network("reset".into()))
        );
    }
}
