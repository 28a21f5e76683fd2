// src/upload.rs - Storage collaborator for sealed sessions
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Local};
use tracing::{info, warn};

use crate::session::{Session, SessionError};

/// One upload: the sealed record plus the name to store it under.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub name: String,
    pub session: Session,
}

/// Acknowledgement for a stored session.
#[derive(Debug, Clone)]
pub struct UploadReceipt {
    pub name: String,
    pub location: String,
}

/// Gallery entry for a stored session.
#[derive(Debug, Clone)]
pub struct StoredSession {
    pub name: String,
    pub path: PathBuf,
    pub frame_count: u32,
    pub duration: f64,
    pub modified: DateTime<Local>,
}

/// Where sealed sessions go. One attempt per upload; retry policy, if any,
/// belongs to the caller. Drafts are not accepted anywhere on this trait.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn upload(&self, request: UploadRequest) -> Result<UploadReceipt, SessionError>;

    async fn list(&self) -> Result<Vec<StoredSession>, SessionError>;

    async fn fetch(&self, name: &str) -> Result<Session, SessionError>;
}

/// Directory of pretty-printed session JSON files, one file per session.
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Default store under the user's documents directory, falling back to
    /// a local directory when the platform reports none.
    pub fn default_root() -> PathBuf {
        directories::UserDirs::new()
            .and_then(|dirs| dirs.document_dir().map(|docs| docs.join("MocapSessions")))
            .unwrap_or_else(|| PathBuf::from("./sessions"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.json"))
    }
}

#[async_trait]
impl SessionStore for DirectoryStore {
    async fn upload(&self, request: UploadRequest) -> Result<UploadReceipt, SessionError> {
        std::fs::create_dir_all(&self.root)?;
        let path = self.path_for(&request.name);
        request.session.save(&path)?;
        info!(
            name = %request.name,
            path = %path.display(),
            frames = request.session.frame_count,
            "session stored"
        );
        Ok(UploadReceipt {
            name: request.name,
            location: path.display().to_string(),
        })
    }

    async fn list(&self) -> Result<Vec<StoredSession>, SessionError> {
        let mut sessions = Vec::new();
        if !self.root.exists() {
            return Ok(sessions);
        }
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let session = match Session::load(&path) {
                Ok(session) => session,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable session");
                    continue;
                }
            };
            let modified = entry
                .metadata()
                .and_then(|meta| meta.modified())
                .map(DateTime::<Local>::from)
                .unwrap_or_else(|_| Local::now());
            sessions.push(StoredSession {
                name: path
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                path,
                frame_count: session.frame_count,
                duration: session.duration,
                modified,
            });
        }
        // Newest first, like a capture gallery.
        sessions.sort_by(|a, b| b.modified.cmp(&a.modified));
        Ok(sessions)
    }

    async fn fetch(&self, name: &str) -> Result<Session, SessionError> {
        Session::load(self.path_for(name))
    }
}

/// Timestamped default name for a freshly sealed session.
pub fn default_session_name() -> String {
    format!("session_{}", Local::now().format("%Y%m%d_%H%M%S"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::Landmark;
    use crate::session::{ExtractionSettings, Frame, SessionDraft};
    use uuid::Uuid;

    fn temp_store() -> (DirectoryStore, PathBuf) {
        let root = std::env::temp_dir().join(format!("mocap_store_{}", Uuid::new_v4()));
        (DirectoryStore::new(&root), root)
    }

    fn sealed(source: &str) -> Session {
        let mut draft = SessionDraft::new(source, ExtractionSettings::default());
        draft.push(Frame::new(
            0,
            0.0,
            Some(vec![Landmark::new(0.5, 0.5, 0.0, Some(1.0)); 33]),
            None,
        ));
        draft.seal(0.1)
    }

    #[tokio::test]
    async fn test_upload_then_fetch_round_trips() {
        let (store, root) = temp_store();
        let session = sealed("clip.mp4");
        let receipt = store
            .upload(UploadRequest {
                name: "first".to_string(),
                session: session.clone(),
            })
            .await
            .unwrap();
        assert_eq!(receipt.name, "first");
        assert!(receipt.location.ends_with("first.json"));

        let fetched = store.fetch("first").await.unwrap();
        assert_eq!(fetched, session);

        std::fs::remove_dir_all(&root).unwrap();
    }

    #[tokio::test]
    async fn test_fetch_unknown_name_fails() {
        let (store, root) = temp_store();
        std::fs::create_dir_all(&root).unwrap();
        assert!(matches!(
            store.fetch("missing").await,
            Err(SessionError::Io(_))
        ));
        std::fs::remove_dir_all(&root).unwrap();
    }

    #[tokio::test]
    async fn test_list_skips_unreadable_files() {
        let (store, root) = temp_store();
        store
            .upload(UploadRequest {
                name: "good".to_string(),
                session: sealed("clip.mp4"),
            })
            .await
            .unwrap();
        std::fs::write(root.join("broken.json"), "{ not a session").unwrap();
        std::fs::write(root.join("notes.txt"), "ignored entirely").unwrap();

        let listed = store.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "good");
        assert_eq!(listed[0].frame_count, 1);

        std::fs::remove_dir_all(&root).unwrap();
    }

    #[tokio::test]
    async fn test_list_on_missing_root_is_empty() {
        let (store, _root) = temp_store();
        assert!(store.list().await.unwrap().is_empty());
    }

    #[test]
    fn test_default_session_name_shape() {
        let name = default_session_name();
        assert!(name.starts_with("session_"));
        assert_eq!(name.len(), "session_".len() + 15);
    }
}
