use futures::future::join_all;
use std::sync::Arc;

use crate::api::Attachment;
use crate::backend::UploadTransport;
use crate::notice::Notifier;
use crate::validate::LocalFile;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct UploadReport {
    /// Successful uploads, in selection order.
    pub attachments: Vec<Attachment>,
    /// Names of the files that could not be uploaded.
    pub failed: Vec<String>,
}

/// Turns local files into hosted attachments. Every file is attempted
/// exactly once; a failure only drops that file.
pub struct Uploader {
    transport: Arc<dyn UploadTransport>,
    notifier: Notifier,
}

impl Uploader {
    pub fn new(transport: Arc<dyn UploadTransport>, notifier: Notifier) -> Self {
        Uploader {
            transport,
            notifier,
        }
    }

    pub async fn upload(&self, files: &[LocalFile]) -> UploadReport {
        let results = join_all(files.iter().map(|file| self.transport.upload(file))).await;

        let mut report = UploadReport::default();
        for (file, result) in files.iter().zip(results) {
            match result {
                Ok(url) => report.attachments.push(Attachment::new(
                    file.name.clone(),
                    file.content_type.clone(),
                    url,
                )),
                Err(e) => {
                    tracing::warn!(name = %file.name, error = %e, "upload failed");
                    self.notifier
                        .warn(format!("Could not upload {}: {}", file.name, e));
                    report.failed.push(file.name.clone());
                }
            }
        }
        report
    }
}
