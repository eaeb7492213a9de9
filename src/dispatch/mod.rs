//! Routes a submission response into the message store.
//!
//! Classification happens first and is pure (see [`classify`]); only then is
//! the store mutated, once per response. The response is taken by value so
//! it cannot be dispatched twice.

pub mod classify;
pub mod sse;

use futures::StreamExt;

pub use classify::{
    BodyKind, DIRECT_RESULT_FALLBACK, DirectResult, JsonShape, MALFORMED_STREAM_PREFIX,
    PENDING_PLACEHOLDER, PendingJob, RESEND_PLEASE, ResponseKind, body_kind, classify, classify_json,
    plain_text_content,
};
pub use sse::{SseDecoder, delta_content};

use crate::api::{Message, MessageId};
use crate::body::{BodyStream, IncomingResponse};
use crate::error::SubmitError;
use crate::poller::PollScheduler;
use crate::store::SharedStore;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dispatched {
    PendingJob,
    DirectResult,
    EventStream { fragments: usize },
    PlainText,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub message_id: MessageId,
    pub kind: Dispatched,
}

impl DispatchOutcome {
    pub fn registered_job(&self) -> bool {
        self.kind == Dispatched::PendingJob
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    store: SharedStore,
    scheduler: PollScheduler,
}

impl Dispatcher {
    pub fn new(store: SharedStore, scheduler: PollScheduler) -> Self {
        Dispatcher { store, scheduler }
    }

    /// Reading a JSON or text body can fail, in which case no assistant
    /// message is created. A stream that breaks midway keeps what arrived.
    ///
    /// The response is consumed, so the same one cannot be dispatched twice:
    ///
    /// ```compile_fail
    /// # async fn twice(d: relaychat::Dispatcher, r: relaychat::IncomingResponse) {
    /// let _ = d.dispatch(r).await;
    /// let _ = d.dispatch(r).await;
    /// # }
    /// ```
    pub async fn dispatch(&self, response: IncomingResponse) -> Result<DispatchOutcome, SubmitError> {
        let kind = classify(response).await?;
        tracing::info!(kind = kind.name(), "dispatching response");

        match kind {
            ResponseKind::PendingJob(job) => {
                let message = Message::pending(job.placeholder.clone(), job.job_status_url)
                    .unwrap_or_else(|| Message::completed(job.placeholder, Vec::new()));
                let outcome = self.insert(message, Dispatched::PendingJob).await?;
                self.scheduler.ensure_armed().await;
                Ok(outcome)
            }
            ResponseKind::DirectResult(result) => {
                self.insert(
                    Message::completed(result.content, result.attachments),
                    Dispatched::DirectResult,
                )
                .await
            }
            ResponseKind::PlainText(text) => {
                self.insert(Message::completed(text, Vec::new()), Dispatched::PlainText)
                    .await
            }
            ResponseKind::EventStream(body) => self.stream(body).await,
        }
    }

    async fn insert(&self, message: Message, kind: Dispatched) -> Result<DispatchOutcome, SubmitError> {
        let message_id = message.id;
        self.store.lock().await.push(message)?;
        Ok(DispatchOutcome { message_id, kind })
    }

    async fn stream(&self, mut body: BodyStream) -> Result<DispatchOutcome, SubmitError> {
        let message = Message::assistant("");
        let message_id = message.id;
        self.store.lock().await.push(message)?;

        let mut decoder = SseDecoder::new();
        let mut fragments = 0;
        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    tracing::warn!(error = %e, "stream read failed, keeping partial response");
                    break;
                }
            };
            for payload in decoder.push(&chunk) {
                if self.append(message_id, &payload).await {
                    fragments += 1;
                }
            }
        }
        if let Some(payload) = decoder.finish() {
            if self.append(message_id, &payload).await {
                fragments += 1;
            }
        }

        self.store.lock().await.complete(message_id);
        tracing::debug!(fragments, "stream finished");
        Ok(DispatchOutcome {
            message_id,
            kind: Dispatched::EventStream { fragments },
        })
    }

    async fn append(&self, id: MessageId, payload: &str) -> bool {
        match delta_content(payload) {
            Some(fragment) => self.store.lock().await.append_content(id, &fragment),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Attachment, MessageStatus, Role};
    use crate::error::TransportError;
    use crate::poller::JobPoller;
    use crate::poller::tests::ScriptedStatus;
    use crate::store::{MessageStore, StoreEvent};
    use bytes::Bytes;
    use futures::stream;
    use std::sync::Arc;
    use std::time::Duration;

    struct Harness {
        store: SharedStore,
        scheduler: PollScheduler,
        dispatcher: Dispatcher,
    }

    fn harness() -> Harness {
        let store = MessageStore::shared();
        let scheduler = PollScheduler::new(
            JobPoller::new(store.clone(), Arc::new(ScriptedStatus::default())),
            Duration::from_secs(10),
        );
        let dispatcher = Dispatcher::new(store.clone(), scheduler.clone());
        Harness {
            store,
            scheduler,
            dispatcher,
        }
    }

    // Each test builds a fresh response per dispatch: `dispatch` takes the
    // response by value, so a single response is handled at most once (see
    // the compile_fail example on `Dispatcher::dispatch`).
    fn json(body: &str) -> IncomingResponse {
        IncomingResponse::from_chunks(Some("application/json"), [body.to_string()])
    }

    #[tokio::test]
    async fn pending_job_creates_one_tracked_message() {
        for body in [
            r#"{"status":"pending","replicateStreamUrl":"https://x"}"#,
            r#"{"status":"pending","replicateStreamUrl":[{"url":"https://x"}]}"#,
        ] {
            let h = harness();
            let outcome = h.dispatcher.dispatch(json(body)).await.unwrap();
            assert!(outcome.registered_job());

            let store = h.store.lock().await;
            assert_eq!(store.len(), 1);
            let jobs = store.pending_jobs();
            assert_eq!(jobs.len(), 1);
            assert_eq!(jobs[0].message_id, outcome.message_id);
            assert_eq!(jobs[0].job_status_url, "https://x");
            assert_eq!(store.messages()[0].content, classify::PENDING_PLACEHOLDER);
            drop(store);

            assert!(h.scheduler.is_armed().await);
        }
    }

    #[tokio::test]
    async fn direct_result_is_completed_immediately() {
        let h = harness();
        let outcome = h
            .dispatcher
            .dispatch(json(
                r#"{"content":"Here you go","attachments":[{"name":"a.png","contentType":"image/png","url":"https://cdn/a.png"}]}"#,
            ))
            .await
            .unwrap();
        assert_eq!(outcome.kind, Dispatched::DirectResult);

        let store = h.store.lock().await;
        let msg = store.get(outcome.message_id).unwrap();
        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(msg.content, "Here you go");
        assert_eq!(msg.status, Some(MessageStatus::Completed));
        assert_eq!(
            msg.attachments,
            vec![Attachment::new("a.png", "image/png", "https://cdn/a.png")]
        );
        drop(store);
        assert!(!h.scheduler.is_armed().await);
    }

    #[tokio::test]
    async fn event_stream_grows_one_message_progressively() {
        let h = harness();
        let mut events = h.store.lock().await.subscribe();
        let response = IncomingResponse::from_chunks(
            Some("text/event-stream"),
            [
                "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n",
                "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n",
            ],
        );

        let outcome = h.dispatcher.dispatch(response).await.unwrap();
        assert_eq!(outcome.kind, Dispatched::EventStream { fragments: 2 });

        let store = h.store.lock().await;
        assert_eq!(store.len(), 1);
        assert_eq!(store.messages()[0].content, "Hello");
        assert_eq!(store.messages()[0].status, Some(MessageStatus::Completed));
        drop(store);

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let StoreEvent::Updated(msg) = event {
                seen.push(msg.content);
            }
        }
        assert!(seen.len() >= 2);
        assert_eq!(&seen[..2], ["Hel", "Hello"]);
    }

    #[tokio::test]
    async fn malformed_stream_lines_are_skipped() {
        let h = harness();
        let response = IncomingResponse::from_chunks(
            Some("text/event-stream; charset=utf-8"),
            [
                "data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n",
                "data: {oops\n",
                "data: {\"choices\":[{\"delta\":{\"content\":\"b\"}}]}\n",
                "data: [DONE]\n",
            ],
        );
        h.dispatcher.dispatch(response).await.unwrap();
        assert_eq!(h.store.lock().await.messages()[0].content, "ab");
    }

    #[tokio::test]
    async fn broken_stream_keeps_partial_content() {
        let h = harness();
        let chunks: Vec<Result<Bytes, TransportError>> = vec![
            Ok(Bytes::from_static(b"data: {\"choices\":[{\"delta\":{\"content\":\"par\"}}]}\n")),
            Err(TransportError::Network("connection reset".into())),
            Ok(Bytes::from_static(b"data: {\"choices\":[{\"delta\":{\"content\":\"never\"}}]}\n")),
        ];
        let response = IncomingResponse::new(
            Some("text/event-stream".into()),
            Box::pin(stream::iter(chunks)),
        );

        let outcome = h.dispatcher.dispatch(response).await.unwrap();
        assert_eq!(outcome.kind, Dispatched::EventStream { fragments: 1 });
        assert_eq!(h.store.lock().await.messages()[0].content, "par");
    }

    #[tokio::test]
    async fn plain_text_is_used_verbatim_or_replaced() {
        let h = harness();
        h.dispatcher
            .dispatch(IncomingResponse::from_chunks(Some("text/plain"), ["  just text\n"]))
            .await
            .unwrap();
        h.dispatcher
            .dispatch(IncomingResponse::from_chunks(None, ["data: {\"x\":1}"]))
            .await
            .unwrap();

        let store = h.store.lock().await;
        assert_eq!(store.messages()[0].content, "  just text\n");
        assert_eq!(store.messages()[1].content, classify::RESEND_PLEASE);
    }

    #[tokio::test]
    async fn unreadable_body_creates_no_message() {
        let h = harness();
        let chunks: Vec<Result<Bytes, TransportError>> = vec![Err(TransportError::Timeout)];
        let response = IncomingResponse::new(
            Some("application/json".into()),
            Box::pin(stream::iter(chunks)),
        );

        let err = h.dispatcher.dispatch(response).await.unwrap_err();
        assert!(matches!(err, SubmitError::Transport(TransportError::Timeout)));
        assert!(h.store.lock().await.is_empty());
    }
}
