pub mod api;
pub mod backend;
pub mod body;
mod client;
pub mod config;
pub mod conversation;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod notice;
pub mod poller;
pub mod session;
pub mod store;
pub mod tools;
pub mod upload;
pub mod validate;

pub use api::{Attachment, JobUrl, Message, MessageId, MessageStatus, Role, SubmitRequest};
pub use backend::{HttpBackend, StatusSource, SubmitTransport, UploadTransport};
pub use body::IncomingResponse;
pub use config::Settings;
pub use conversation::{Backends, Conversation, Draft, SubmitReport};
pub use dispatch::{DispatchOutcome, Dispatched, Dispatcher};
pub use error::{Rejection, SubmitError, TransportError};
pub use notice::{Notice, NoticeLevel, Notifier};
pub use poller::{JobPoller, JobStatus, PollScheduler};
pub use session::SessionIdStore;
pub use store::{MessageStore, SharedStore, StoreEvent};
pub use validate::{FileValidator, LocalFile};
