//! One chat session: composer state, submission flow and reset.

use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

use crate::api::{Message, MessageId, OutgoingMessage, SubmitRequest};
use crate::backend::{HttpBackend, StatusSource, SubmitTransport, UploadTransport};
use crate::config::Settings;
use crate::dispatch::{DispatchOutcome, Dispatcher};
use crate::error::{Rejection, SubmitError, TransportError};
use crate::notice::Notifier;
use crate::poller::{JobPoller, PollScheduler};
use crate::session::SessionIdStore;
use crate::store::{MessageStore, SharedStore, StoreEvent};
use crate::tools::next_tool;
use crate::upload::Uploader;
use crate::validate::{FileValidator, LocalFile};

/// What the user typed and picked.
#[derive(Clone, Debug, Default)]
pub struct Draft {
    pub text: String,
    pub files: Vec<LocalFile>,
}

impl Draft {
    pub fn text(text: impl Into<String>) -> Self {
        Draft {
            text: text.into(),
            files: Vec::new(),
        }
    }

    pub fn with_file(mut self, file: LocalFile) -> Self {
        self.files.push(file);
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ComposerState {
    pub mode: Option<String>,
    pub tool: Option<String>,
}

#[derive(Debug)]
pub enum SubmitReport {
    /// Nothing to send.
    Skipped,
    Sent {
        user_message: MessageId,
        dispatch: DispatchOutcome,
        rejected: Vec<Rejection>,
        upload_failures: Vec<String>,
    },
}

pub struct Backends {
    pub submit: Arc<dyn SubmitTransport>,
    pub upload: Arc<dyn UploadTransport>,
    pub status: Arc<dyn StatusSource>,
}

impl Backends {
    pub fn http(backend: Arc<HttpBackend>) -> Self {
        Backends {
            submit: backend.clone(),
            upload: backend.clone(),
            status: backend,
        }
    }
}

pub struct Conversation {
    store: SharedStore,
    validator: FileValidator,
    uploader: Uploader,
    transport: Arc<dyn SubmitTransport>,
    dispatcher: Dispatcher,
    scheduler: PollScheduler,
    session: SessionIdStore,
    notifier: Notifier,
    persistent_tool: Option<String>,
    composer: Mutex<ComposerState>,
    // Replaced on every reset; in-flight submissions hold a clone.
    cancel: Mutex<CancellationToken>,
}

impl Conversation {
    pub fn new(backends: Backends, settings: &Settings, session: SessionIdStore, notifier: Notifier) -> Self {
        let store = MessageStore::shared();
        let scheduler = PollScheduler::new(
            JobPoller::new(store.clone(), backends.status),
            settings.poll_interval(),
        );
        Conversation {
            dispatcher: Dispatcher::new(store.clone(), scheduler.clone()),
            uploader: Uploader::new(backends.upload, notifier.clone()),
            validator: settings.validator(),
            transport: backends.submit,
            persistent_tool: settings.tools.persistent.clone(),
            composer: Mutex::new(ComposerState::default()),
            cancel: Mutex::new(CancellationToken::new()),
            store,
            scheduler,
            session,
            notifier,
        }
    }

    pub fn store(&self) -> SharedStore {
        self.store.clone()
    }

    pub fn scheduler(&self) -> &PollScheduler {
        &self.scheduler
    }

    pub async fn messages(&self) -> Vec<Message> {
        self.store.lock().await.messages().to_vec()
    }

    pub async fn subscribe(&self) -> mpsc::UnboundedReceiver<StoreEvent> {
        self.store.lock().await.subscribe()
    }

    pub async fn composer(&self) -> ComposerState {
        self.composer.lock().await.clone()
    }

    pub async fn select_tool(&self, tool: Option<String>) {
        self.composer.lock().await.tool = tool;
    }

    pub async fn set_mode(&self, mode: Option<String>) {
        self.composer.lock().await.mode = mode;
    }

    /// Sends one turn. Transport failures are reported through the notifier
    /// and leave the store as it was apart from the user's own message.
    pub async fn submit(&self, draft: Draft) -> Result<SubmitReport, SubmitError> {
        if draft.text.trim().is_empty() && draft.files.is_empty() {
            return Ok(SubmitReport::Skipped);
        }

        let cancel = self.cancel.lock().await.clone();
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(SubmitError::Cancelled),
            result = self.send(draft) => result,
        };

        // nothing went out, so the selection still applies to the next turn
        if !matches!(result, Ok(SubmitReport::Skipped) | Err(SubmitError::Cancelled)) {
            let mut composer = self.composer.lock().await;
            composer.tool = next_tool(composer.tool.as_deref(), self.persistent_tool.as_deref());
        }
        result
    }

    async fn send(&self, draft: Draft) -> Result<SubmitReport, SubmitError> {
        let validated = self.validator.partition(draft.files);
        if let Some(rejection) = validated.first_rejection() {
            self.notifier.warn(rejection.to_string());
        }

        let uploads = self.uploader.upload(&validated.accepted).await;
        if draft.text.trim().is_empty() && uploads.attachments.is_empty() {
            self.notifier.warn("Nothing to send: no attachment could be used.");
            return Ok(SubmitReport::Skipped);
        }

        let user = Message::user(draft.text, uploads.attachments);
        let user_message = user.id;
        let outgoing = OutgoingMessage::from(&user);
        self.store.lock().await.push(user)?;

        let session_id = match self.session.get_or_create().await {
            Ok(id) => id,
            Err(e) => {
                tracing::error!(error = %e, "could not obtain session id");
                self.notifier.error("Could not start a session. Please try again.");
                return Err(SubmitError::Session(e));
            }
        };
        let composer = self.composer.lock().await.clone();
        let request = SubmitRequest {
            message: outgoing,
            session_id,
            mode: composer.mode,
            tool: composer.tool,
        };

        let response = match self.transport.submit(&request).await {
            Ok(response) => response,
            Err(e) => {
                self.notify_transport(&e);
                return Err(e.into());
            }
        };

        let dispatch = match self.dispatcher.dispatch(response).await {
            Ok(outcome) => outcome,
            Err(e) => {
                if let SubmitError::Transport(t) = &e {
                    self.notify_transport(t);
                }
                return Err(e);
            }
        };

        Ok(SubmitReport::Sent {
            user_message,
            dispatch,
            rejected: validated.rejected,
            upload_failures: uploads.failed,
        })
    }

    fn notify_transport(&self, err: &TransportError) {
        tracing::warn!(error = %err, "submission failed");
        let text = match err {
            TransportError::Timeout => "The assistant took too long to answer. Please try again.".to_string(),
            TransportError::Status { status, .. } => {
                format!("The server returned an error ({status}). Please try again.")
            }
            TransportError::Network(_) => {
                "Could not reach the server. Check your connection and try again.".to_string()
            }
            TransportError::MalformedPayload(_) => {
                "The server sent a response that could not be read.".to_string()
            }
        };
        self.notifier.error(text);
    }

    /// Clears the conversation: cancels in-flight submissions, stops polling,
    /// drops every message and forgets the session id.
    pub async fn reset(&self) -> std::io::Result<()> {
        {
            let mut cancel = self.cancel.lock().await;
            cancel.cancel();
            *cancel = CancellationToken::new();
        }
        self.scheduler.disarm().await;
        self.store.lock().await.clear();
        let previous = self.session.current().await;
        self.session.clear().await?;
        tracing::info!(session_id = ?previous, "conversation reset");
        Ok(())
    }
}
