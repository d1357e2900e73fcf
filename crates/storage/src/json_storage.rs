//! JSON file storage implementation.
//!
//! Stores one pretty-printed JSON file per entity under the storage root and
//! keeps small per-object meta markers (version + updated_at).

use ragkit_core::{
    CollectionId, KnowledgeBaseCollection, KnowledgeBaseId, KnowledgeBaseSession, MessageSession,
    SessionId,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{Result, Storage, StorageError};

const SESSIONS: &str = "sessions";
const KNOWLEDGE_BASES: &str = "knowledge_bases";
const COLLECTIONS: &str = "collections";

/// File-based JSON storage backend.
pub struct JsonStorage {
    root: PathBuf,
    pending: Arc<Mutex<bool>>,
}

impl JsonStorage {
    /// Create storage rooted at `root`, creating the entity and meta
    /// directories as needed.
    pub async fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        for kind in [SESSIONS, KNOWLEDGE_BASES, COLLECTIONS] {
            fs::create_dir_all(root.join(kind)).await?;
            fs::create_dir_all(root.join("meta").join(kind)).await?;
        }

        debug!("Opened JSON storage at {}", root.display());
        Ok(Self {
            root,
            pending: Arc::new(Mutex::new(false)),
        })
    }

    /// Storage root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether there are saves since the last commit/rollback.
    pub async fn has_pending(&self) -> bool {
        *self.pending.lock().await
    }

    /// Current meta version of an entity, 0 if never saved.
    pub async fn version(&self, kind: &str, id: &str) -> Result<u64> {
        match fs::read_to_string(self.meta_path(kind, id)).await {
            Ok(s) => {
                let json: serde_json::Value = serde_json::from_str(&s)?;
                Ok(json.get("version").and_then(|v| v.as_u64()).unwrap_or(0))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn entity_path(&self, kind: &str, id: &str) -> Result<PathBuf> {
        Ok(self.root.join(kind).join(format!("{}.json", file_stem(id)?)))
    }

    fn meta_path(&self, kind: &str, id: &str) -> PathBuf {
        self.root.join("meta").join(kind).join(format!("{}.meta.json", id))
    }

    async fn set_pending(&self) {
        *self.pending.lock().await = true;
    }

    /// Read and increment per-object version, return new version.
    async fn bump_version(&self, kind: &str, id: &str) -> Result<u64> {
        let version = self.version(kind, id).await? + 1;
        let meta = serde_json::json!({"version": version, "updated_at": chrono::Utc::now()});
        fs::write(self.meta_path(kind, id), serde_json::to_string_pretty(&meta)?.as_bytes()).await?;
        Ok(version)
    }

    async fn save_entity<T: serde::Serialize>(
        &self,
        kind: &str,
        id: &str,
        value: &T,
    ) -> Result<()> {
        let path = self.entity_path(kind, id)?;
        let json = serde_json::to_string_pretty(value)?;
        fs::write(&path, json.as_bytes()).await?;

        let version = self.bump_version(kind, id).await?;
        debug!("Saved {}/{} (v{})", kind, id, version);

        self.set_pending().await;
        Ok(())
    }
}

#[async_trait::async_trait]
impl Storage for JsonStorage {
    async fn save_session(&mut self, session: &MessageSession) -> Result<()> {
        self.save_entity(SESSIONS, session.id().as_str(), session).await
    }

    async fn load_session(&self, id: &SessionId) -> Result<Option<MessageSession>> {
        let path = self.entity_path(SESSIONS, id.as_str())?;
        let session: Option<MessageSession> = read_json(&path).await?;
        if let Some(s) = &session {
            s.check_invariants()?;
        }
        Ok(session)
    }

    async fn list_sessions(&self) -> Result<Vec<MessageSession>> {
        let sessions: Vec<MessageSession> = list_dir(&self.root.join(SESSIONS)).await?;
        for s in &sessions {
            s.check_invariants()?;
        }
        Ok(sessions)
    }

    async fn save_knowledge_base(&mut self, kb: &KnowledgeBaseSession) -> Result<()> {
        self.save_entity(KNOWLEDGE_BASES, kb.id().as_str(), kb).await
    }

    async fn load_knowledge_base(
        &self,
        id: &KnowledgeBaseId,
    ) -> Result<Option<KnowledgeBaseSession>> {
        read_json(&self.entity_path(KNOWLEDGE_BASES, id.as_str())?).await
    }

    async fn list_knowledge_bases(&self) -> Result<Vec<KnowledgeBaseSession>> {
        list_dir(&self.root.join(KNOWLEDGE_BASES)).await
    }

    async fn save_collection(&mut self, collection: &KnowledgeBaseCollection) -> Result<()> {
        self.save_entity(COLLECTIONS, collection.id().as_str(), collection).await
    }

    async fn load_collection(&self, id: &CollectionId) -> Result<Option<KnowledgeBaseCollection>> {
        read_json(&self.entity_path(COLLECTIONS, id.as_str())?).await
    }

    async fn list_collections(&self) -> Result<Vec<KnowledgeBaseCollection>> {
        list_dir(&self.root.join(COLLECTIONS)).await
    }

    async fn commit(&mut self, message: &str) -> Result<()> {
        // No VCS integration; commit only clears pending state.
        debug!("Commit: {}", message);
        *self.pending.lock().await = false;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        *self.pending.lock().await = false;
        Ok(())
    }
}

/// Ids become file names, so anything that could escape the directory is refused.
fn file_stem(id: &str) -> Result<&str> {
    if id.is_empty() || id.contains(['/', '\\']) || id == "." || id == ".." {
        return Err(StorageError::Other(format!("id `{}` is not usable as a file name", id)));
    }
    Ok(id)
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match fs::read_to_string(path).await {
        Ok(json) => {
            let value = serde_json::from_str(&json)?;
            Ok(Some(value))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn list_dir<T: serde::de::DeserializeOwned>(dir: &Path) -> Result<Vec<T>> {
    let mut items = Vec::new();
    let mut rd = fs::read_dir(dir).await?;
    while let Some(entry) = rd.next_entry().await? {
        if entry.path().extension().and_then(|s| s.to_str()) != Some("json") {
            continue;
        }
        match read_json(&entry.path()).await {
            Ok(Some(item)) => items.push(item),
            Ok(None) => {}
            Err(e) => warn!("Skipping unreadable {}: {}", entry.path().display(), e),
        }
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragkit_core::{Registry, Role};

    fn populated_registry() -> Registry {
        let registry = Registry::new();
        registry.create_message_session("msg_sess_1".into(), "Session 1", None).unwrap();
        registry.append_chat_message(&"msg_sess_1".into(), "Tell me a joke", Role::Human).unwrap();
        registry
            .append_chat_message(
                &"msg_sess_1".into(),
                "Why don't programmers like nature? Because it has too many bugs",
                Role::Assistant,
            )
            .unwrap();
        registry
            .create_knowledge_base_session(
                "kb_sess_1".into(),
                vec![0.1, 0.2, 0.3],
                "Isi dokumen 1",
                "{}",
            )
            .unwrap();
        registry
            .create_collection("kb_coll_1".into(), "KB Coll 1", r#"{"file_type":"pdf"}"#)
            .unwrap();
        registry.add_session_to_collection(&"kb_coll_1".into(), &"kb_sess_1".into()).unwrap();
        registry.attach_knowledge_base(&"msg_sess_1".into(), &"kb_sess_1".into()).unwrap();
        registry.create_message_session("msg_sess_2".into(), "Session 2", None).unwrap();
        registry
    }

    #[tokio::test]
    async fn test_session_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = JsonStorage::new(dir.path()).await.unwrap();
        let registry = populated_registry();
        let session = registry.message_session(&"msg_sess_1".into()).unwrap();

        storage.save_session(&session).await.unwrap();
        let loaded = storage.load_session(session.id()).await.unwrap().unwrap();
        assert_eq!(loaded, session);
        assert_eq!(loaded.document(), Some("Isi dokumen 1"));

        assert!(storage.load_session(&"missing".into()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_versions_and_pending() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = JsonStorage::new(dir.path()).await.unwrap();
        let registry = populated_registry();
        let kb = registry.knowledge_base(&"kb_sess_1".into()).unwrap();

        assert!(!storage.has_pending().await);
        storage.save_knowledge_base(&kb).await.unwrap();
        storage.save_knowledge_base(&kb).await.unwrap();
        assert_eq!(storage.version(KNOWLEDGE_BASES, "kb_sess_1").await.unwrap(), 2);
        assert!(storage.has_pending().await);

        storage.commit("save kb").await.unwrap();
        assert!(!storage.has_pending().await);
    }

    #[tokio::test]
    async fn test_snapshot_restores_into_registry() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = JsonStorage::new(dir.path()).await.unwrap();
        let source = populated_registry();

        storage.save_snapshot(&source.snapshot()).await.unwrap();

        let reopened = JsonStorage::new(dir.path()).await.unwrap();
        let target = Registry::new();
        target.restore(reopened.load_snapshot().await.unwrap()).unwrap();

        assert_eq!(target.snapshot(), source.snapshot());
        let coll = target.collection(&"kb_coll_1".into()).unwrap();
        assert!(coll.contains(&"kb_sess_1".into()));
    }

    #[tokio::test]
    async fn test_corrupt_session_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = JsonStorage::new(dir.path()).await.unwrap();
        let registry = populated_registry();
        let session = registry.message_session(&"msg_sess_2".into()).unwrap();
        storage.save_session(&session).await.unwrap();

        // Hand-edit the file so the session claims a document without a knowledge base.
        let path = dir.path().join(SESSIONS).join("msg_sess_2.json");
        let mut json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        json["document"] = serde_json::json!("orphan");
        std::fs::write(&path, serde_json::to_string(&json).unwrap()).unwrap();

        let err = storage.load_session(&"msg_sess_2".into()).await.unwrap_err();
        assert!(matches!(err, StorageError::Invalid(_)));
    }

    #[tokio::test]
    async fn test_path_like_ids_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonStorage::new(dir.path()).await.unwrap();
        let err = storage.load_collection(&"../escape".into()).await.unwrap_err();
        assert!(matches!(err, StorageError::Other(_)));
    }
}
