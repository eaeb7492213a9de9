use bytes::Bytes;
use std::path::Path;

use crate::error::Rejection;

/// Default upload ceiling: 5 MiB.
pub const MAX_FILE_SIZE: u64 = 5 * 1024 * 1024;

/// A file picked in the composer, held in memory until upload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalFile {
    pub name: String,
    /// MIME type as reported by the picker; may be empty when unknown.
    pub content_type: String,
    pub bytes: Bytes,
}

impl LocalFile {
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        LocalFile {
            name: name.into(),
            content_type: content_type.into(),
            bytes: bytes.into(),
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Loads a file from disk, guessing its MIME type from the extension.
    pub async fn read(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let content_type = mime_guess::from_path(path)
            .first()
            .map(|m| m.essence_str().to_string())
            .unwrap_or_default();
        Ok(LocalFile::new(name, content_type, bytes))
    }
}

/// Result of validating a batch. Valid files are kept even when others fail.
#[derive(Debug, Default)]
pub struct Validated {
    pub accepted: Vec<LocalFile>,
    pub rejected: Vec<Rejection>,
}

impl Validated {
    /// The rejection that must be shown to the user, if any.
    pub fn first_rejection(&self) -> Option<&Rejection> {
        self.rejected.first()
    }
}

#[derive(Clone, Debug)]
pub struct FileValidator {
    max_size: u64,
    allowed_types: Vec<String>,
}

impl Default for FileValidator {
    fn default() -> Self {
        FileValidator::new(MAX_FILE_SIZE, Vec::new())
    }
}

impl FileValidator {
    /// An empty `allowed_types` accepts every type. Entries may be exact
    /// (`image/png`) or a top-level wildcard (`image/*`).
    pub fn new(max_size: u64, allowed_types: Vec<String>) -> Self {
        FileValidator {
            max_size,
            allowed_types,
        }
    }

    /// Size is checked before type, so an oversized file of a disallowed
    /// type is always reported as too large.
    pub fn validate(&self, file: &LocalFile) -> Result<(), Rejection> {
        if file.size() > self.max_size {
            return Err(Rejection::TooLarge {
                name: file.name.clone(),
                size: file.size(),
                limit: self.max_size,
            });
        }
        if !self.type_allowed(&file.content_type) {
            return Err(Rejection::UnsupportedType {
                name: file.name.clone(),
                content_type: file.content_type.clone(),
            });
        }
        Ok(())
    }

    pub fn partition(&self, files: Vec<LocalFile>) -> Validated {
        let mut out = Validated::default();
        for file in files {
            match self.validate(&file) {
                Ok(()) => out.accepted.push(file),
                Err(rejection) => {
                    tracing::debug!(%rejection, "file rejected");
                    out.rejected.push(rejection);
                }
            }
        }
        out
    }

    fn type_allowed(&self, content_type: &str) -> bool {
        if self.allowed_types.is_empty() {
            return true;
        }
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        if essence.is_empty() {
            return false;
        }
        self.allowed_types.iter().any(|allowed| {
            let allowed = allowed.trim().to_ascii_lowercase();
            match allowed.strip_suffix("/*") {
                Some(top) => essence
                    .split_once('/')
                    .is_some_and(|(t, _)| t == top),
                None => allowed == essence,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, content_type: &str, size: usize) -> LocalFile {
        LocalFile::new(name, content_type, vec![0u8; size])
    }

    fn images_only(limit: u64) -> FileValidator {
        FileValidator::new(limit, vec!["image/png".into(), "image/jpeg".into()])
    }

    #[test]
    fn accepts_within_limits() {
        assert_eq!(images_only(10).validate(&file("a.png", "image/png", 10)), Ok(()));
    }

    #[test]
    fn rejects_oversized() {
        let err = images_only(10).validate(&file("a.png", "image/png", 11)).unwrap_err();
        assert!(matches!(err, Rejection::TooLarge { size: 11, limit: 10, .. }));
    }

    #[test]
    fn rejects_unlisted_type() {
        let err = images_only(10).validate(&file("a.exe", "application/x-msdownload", 1)).unwrap_err();
        assert!(matches!(err, Rejection::UnsupportedType { .. }));
    }

    #[test]
    fn size_takes_precedence_over_type() {
        let err = images_only(10).validate(&file("big.exe", "application/octet-stream", 50)).unwrap_err();
        assert!(matches!(err, Rejection::TooLarge { .. }));
    }

    #[test]
    fn empty_allow_list_accepts_any_type() {
        let validator = FileValidator::new(10, vec![]);
        assert_eq!(validator.validate(&file("x", "", 1)), Ok(()));
        assert_eq!(validator.validate(&file("y", "application/zip", 1)), Ok(()));
    }

    #[test]
    fn type_matching_ignores_case_and_parameters() {
        let validator = FileValidator::new(10, vec!["text/plain".into(), "audio/*".into()]);
        assert_eq!(validator.validate(&file("a.txt", "Text/Plain; charset=utf-8", 1)), Ok(()));
        assert_eq!(validator.validate(&file("a.mp3", "audio/mpeg", 1)), Ok(()));
        assert!(validator.validate(&file("a.mp4", "video/mp4", 1)).is_err());
        assert!(validator.validate(&file("unknown", "", 1)).is_err());
    }

    #[test]
    fn partition_keeps_valid_files_in_order() {
        let validated = images_only(10).partition(vec![
            file("one.png", "image/png", 1),
            file("big.png", "image/png", 100),
            file("two.jpg", "image/jpeg", 2),
            file("doc.pdf", "application/pdf", 1),
        ]);

        let names: Vec<_> = validated.accepted.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["one.png", "two.jpg"]);
        assert_eq!(validated.rejected.len(), 2);
        assert_eq!(validated.first_rejection().unwrap().file_name(), "big.png");
    }

    #[tokio::test]
    async fn read_guesses_type_from_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.png");
        tokio::fs::write(&path, b"\x89PNG").await.unwrap();

        let file = LocalFile::read(&path).await.unwrap();
        assert_eq!(file.name, "photo.png");
        assert_eq!(file.content_type, "image/png");
        assert_eq!(file.size(), 4);
    }
}
