//! Session correlation id: generated on first use, persisted under a fixed
//! file name, cleared on reset.

use std::io;
use std::path::PathBuf;
use tokio::sync::Mutex;
use uuid::Uuid;

pub struct SessionIdStore {
    path: Option<PathBuf>,
    current: Mutex<Option<String>>,
}

impl SessionIdStore {
    pub fn persisted(path: PathBuf) -> Self {
        SessionIdStore {
            path: Some(path),
            current: Mutex::new(None),
        }
    }

    /// Keeps the id for the life of the process only.
    pub fn in_memory() -> Self {
        SessionIdStore {
            path: None,
            current: Mutex::new(None),
        }
    }

    pub async fn get_or_create(&self) -> io::Result<String> {
        let mut current = self.current.lock().await;
        if let Some(id) = current.as_ref() {
            return Ok(id.clone());
        }

        if let Some(path) = &self.path {
            match tokio::fs::read_to_string(path).await {
                Ok(stored) if !stored.trim().is_empty() => {
                    let id = stored.trim().to_string();
                    *current = Some(id.clone());
                    return Ok(id);
                }
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }

        let id = Uuid::new_v4().to_string();
        if let Some(path) = &self.path {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(path, &id).await?;
        }
        tracing::info!(session_id = %id, "new session");
        *current = Some(id.clone());
        Ok(id)
    }

    pub async fn current(&self) -> Option<String> {
        self.current.lock().await.clone()
    }

    pub async fn clear(&self) -> io::Result<()> {
        let mut current = self.current.lock().await;
        *current = None;
        if let Some(path) = &self.path {
            match tokio::fs::remove_file(path).await {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn id_survives_restart_and_clears() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session_id");

        let first = SessionIdStore::persisted(path.clone());
        let id = first.get_or_create().await.unwrap();
        assert_eq!(first.get_or_create().await.unwrap(), id);

        let reopened = SessionIdStore::persisted(path.clone());
        assert_eq!(reopened.current().await, None);
        assert_eq!(reopened.get_or_create().await.unwrap(), id);

        reopened.clear().await.unwrap();
        assert!(!path.exists());
        assert_eq!(reopened.current().await, None);
        assert_ne!(reopened.get_or_create().await.unwrap(), id);
    }

    #[tokio::test]
    async fn clear_without_file_is_fine() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionIdStore::persisted(dir.path().join("session_id"));
        store.clear().await.unwrap();

        let memory = SessionIdStore::in_memory();
        let id = memory.get_or_create().await.unwrap();
        memory.clear().await.unwrap();
        assert_ne!(memory.get_or_create().await.unwrap(), id);
    }
}
