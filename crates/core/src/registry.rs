//! The authoritative in-memory store for all entity kinds.
//!
//! Each kind's id namespace is one `RwLock`ed map, so the uniqueness check
//! and the insert happen under a single write guard. Each message session
//! additionally sits behind its own `Mutex`: appends to one session are
//! serialized, appends to different sessions never contend.
//!
//! Lock order, when more than one is held: knowledge bases, collections,
//! sessions map, then a single session.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::{EntityKind, ModelError, Result};
use crate::id::{CollectionId, KnowledgeBaseId, SessionId};
use crate::knowledge_base::{self, KnowledgeBaseCollection, KnowledgeBaseSession};
use crate::message::{ChatMessage, Role};
use crate::session::MessageSession;

/// Every entity in the registry, for handing to a persistence adapter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Message sessions
    pub sessions: Vec<MessageSession>,
    /// Knowledge-base sessions
    pub knowledge_bases: Vec<KnowledgeBaseSession>,
    /// Collections
    pub collections: Vec<KnowledgeBaseCollection>,
}

/// Thread-safe entity registry.
pub struct Registry {
    clock: Arc<dyn Clock>,
    embedding_dimension: Option<usize>,
    sessions: RwLock<HashMap<SessionId, Arc<Mutex<MessageSession>>>>,
    knowledge_bases: RwLock<HashMap<KnowledgeBaseId, KnowledgeBaseSession>>,
    collections: RwLock<HashMap<CollectionId, KnowledgeBaseCollection>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Registry on the system clock, with no embedding dimension enforced.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Registry on a custom clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            embedding_dimension: None,
            sessions: RwLock::new(HashMap::new()),
            knowledge_bases: RwLock::new(HashMap::new()),
            collections: RwLock::new(HashMap::new()),
        }
    }

    /// Require every knowledge-base embedding to have `dimension` components.
    pub fn with_embedding_dimension(mut self, dimension: usize) -> Self {
        self.embedding_dimension = Some(dimension);
        self
    }

    /// The enforced embedding dimension, if any.
    pub fn embedding_dimension(&self) -> Option<usize> {
        self.embedding_dimension
    }

    // === Message sessions ===

    /// Create a message session. Fails on empty title or id collision.
    pub fn create_message_session(
        &self,
        id: SessionId,
        title: impl Into<String>,
        files: Option<Vec<String>>,
    ) -> Result<MessageSession> {
        let session = MessageSession::new(id, title, files, self.clock.now())?;

        let mut sessions = write(&self.sessions);
        match sessions.entry(session.id().clone()) {
            Entry::Occupied(_) => Err(duplicate(EntityKind::MessageSession, session.id().as_str())),
            Entry::Vacant(slot) => {
                info!("Created message session {}", session.id());
                slot.insert(Arc::new(Mutex::new(session.clone())));
                Ok(session)
            }
        }
    }

    /// Append a message stamped with the registry clock.
    pub fn append_chat_message(
        &self,
        session_id: &SessionId,
        content: impl Into<String>,
        role: Role,
    ) -> Result<ChatMessage> {
        let handle = self.session_handle(session_id)?;
        let mut session = lock(&handle);
        // Stamp under the session lock so concurrent appends cannot interleave.
        let at = self.clock.now();
        let message = session.append_message(content, role, at).map_err(|e| {
            warn!("Rejected append to {}: {}", session_id, e);
            e
        })?;
        debug!(
            "Appended {} message to {} ({} total)",
            role,
            session_id,
            session.messages().len()
        );
        Ok(message)
    }

    /// Ground a session in a registered knowledge base. One-shot.
    pub fn attach_knowledge_base(
        &self,
        session_id: &SessionId,
        kb_id: &KnowledgeBaseId,
    ) -> Result<()> {
        let knowledge_bases = read(&self.knowledge_bases);
        let kb = knowledge_bases
            .get(kb_id)
            .ok_or_else(|| not_found(EntityKind::KnowledgeBaseSession, kb_id.as_str()))?;

        let handle = self.session_handle(session_id)?;
        let mut session = lock(&handle);
        session.attach_knowledge_base(kb.clone()).map_err(|e| {
            warn!("Rejected attach of {} to {}: {}", kb_id, session_id, e);
            e
        })?;
        info!("Attached knowledge base {} to session {}", kb_id, session_id);
        Ok(())
    }

    /// Logically close a session.
    pub fn close_message_session(&self, session_id: &SessionId) -> Result<MessageSession> {
        let handle = self.session_handle(session_id)?;
        let mut session = lock(&handle);
        session.close(self.clock.now());
        info!("Closed message session {}", session_id);
        Ok(session.clone())
    }

    /// Snapshot of one session.
    pub fn message_session(&self, session_id: &SessionId) -> Result<MessageSession> {
        let handle = self.session_handle(session_id)?;
        let session = lock(&handle);
        Ok(session.clone())
    }

    /// Snapshots of all sessions, ordered by creation time.
    pub fn list_message_sessions(&self) -> Vec<MessageSession> {
        let handles: Vec<_> = read(&self.sessions).values().cloned().collect();
        let mut sessions: Vec<_> = handles.iter().map(|h| lock(h).clone()).collect();
        sessions.sort_by(|a, b| {
            a.created_at()
                .cmp(&b.created_at())
                .then_with(|| a.id().cmp(b.id()))
        });
        sessions
    }

    // === Knowledge-base sessions ===

    /// Register a knowledge-base session for an embedded document.
    pub fn create_knowledge_base_session(
        &self,
        id: KnowledgeBaseId,
        embedding: Vec<f32>,
        document: impl Into<String>,
        metadata: impl Into<String>,
    ) -> Result<KnowledgeBaseSession> {
        let kb = KnowledgeBaseSession::new(
            id,
            embedding,
            document,
            metadata,
            self.clock.now(),
            self.embedding_dimension,
        )?;

        let mut knowledge_bases = write(&self.knowledge_bases);
        match knowledge_bases.entry(kb.id().clone()) {
            Entry::Occupied(_) => {
                Err(duplicate(EntityKind::KnowledgeBaseSession, kb.id().as_str()))
            }
            Entry::Vacant(slot) => {
                info!("Created knowledge base session {} (dim {})", kb.id(), kb.dimension());
                slot.insert(kb.clone());
                Ok(kb)
            }
        }
    }

    /// Replace a knowledge base's metadata, including the copy held by any
    /// session it is attached to.
    pub fn update_knowledge_base_metadata(
        &self,
        kb_id: &KnowledgeBaseId,
        metadata: impl Into<String>,
    ) -> Result<KnowledgeBaseSession> {
        let mut knowledge_bases = write(&self.knowledge_bases);
        let kb = knowledge_bases
            .get_mut(kb_id)
            .ok_or_else(|| not_found(EntityKind::KnowledgeBaseSession, kb_id.as_str()))?;
        kb.set_metadata(metadata);
        self.refresh_attached(kb);

        debug!("Updated metadata of knowledge base {}", kb_id);
        Ok(kb.clone())
    }

    /// Snapshot of one knowledge base.
    pub fn knowledge_base(&self, kb_id: &KnowledgeBaseId) -> Result<KnowledgeBaseSession> {
        read(&self.knowledge_bases)
            .get(kb_id)
            .cloned()
            .ok_or_else(|| not_found(EntityKind::KnowledgeBaseSession, kb_id.as_str()))
    }

    /// Snapshots of all knowledge bases, ordered by creation time.
    pub fn list_knowledge_bases(&self) -> Vec<KnowledgeBaseSession> {
        let mut all: Vec<_> = read(&self.knowledge_bases).values().cloned().collect();
        all.sort_by(|a, b| a.created_at().cmp(&b.created_at()).then_with(|| a.id().cmp(b.id())));
        all
    }

    // === Collections ===

    /// Create an empty collection.
    pub fn create_collection(
        &self,
        id: CollectionId,
        name: impl Into<String>,
        metadata: impl Into<String>,
    ) -> Result<KnowledgeBaseCollection> {
        let collection = KnowledgeBaseCollection::new(id, name, metadata, self.clock.now())?;

        let mut collections = write(&self.collections);
        match collections.entry(collection.id().clone()) {
            Entry::Occupied(_) => Err(duplicate(EntityKind::Collection, collection.id().as_str())),
            Entry::Vacant(slot) => {
                info!("Created collection {} ({})", collection.id(), collection.name());
                slot.insert(collection.clone());
                Ok(collection)
            }
        }
    }

    /// Add a knowledge base to a collection. Returns whether membership changed.
    pub fn add_session_to_collection(
        &self,
        collection_id: &CollectionId,
        kb_id: &KnowledgeBaseId,
    ) -> Result<bool> {
        let mut knowledge_bases = write(&self.knowledge_bases);
        let mut collections = write(&self.collections);

        let kb = knowledge_bases
            .get_mut(kb_id)
            .ok_or_else(|| not_found(EntityKind::KnowledgeBaseSession, kb_id.as_str()))?;
        let collection = collections
            .get_mut(collection_id)
            .ok_or_else(|| not_found(EntityKind::Collection, collection_id.as_str()))?;

        let added = knowledge_base::add_session_to_collection(collection, kb)?;
        if added {
            self.refresh_attached(kb);
            info!("Added knowledge base {} to collection {}", kb_id, collection_id);
        }
        Ok(added)
    }

    /// Snapshot of one collection.
    pub fn collection(&self, collection_id: &CollectionId) -> Result<KnowledgeBaseCollection> {
        read(&self.collections)
            .get(collection_id)
            .cloned()
            .ok_or_else(|| not_found(EntityKind::Collection, collection_id.as_str()))
    }

    /// Snapshots of all collections, ordered by creation time.
    pub fn list_collections(&self) -> Vec<KnowledgeBaseCollection> {
        let mut all: Vec<_> = read(&self.collections).values().cloned().collect();
        all.sort_by(|a, b| a.created_at().cmp(&b.created_at()).then_with(|| a.id().cmp(b.id())));
        all
    }

    // === Persistence hand-off ===

    /// Export every entity.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            sessions: self.list_message_sessions(),
            knowledge_bases: self.list_knowledge_bases(),
            collections: self.list_collections(),
        }
    }

    /// Load entities produced by an earlier `snapshot`, re-checking every
    /// invariant. Nothing is loaded unless the whole snapshot is valid.
    pub fn restore(&self, snapshot: Snapshot) -> Result<()> {
        let mut knowledge_bases = write(&self.knowledge_bases);
        let mut collections = write(&self.collections);
        let mut sessions = write(&self.sessions);

        let mut new_kbs = HashMap::new();
        for kb in snapshot.knowledge_bases {
            KnowledgeBaseSession::new(
                kb.id().clone(),
                kb.embedding().to_vec(),
                kb.document(),
                kb.metadata(),
                kb.created_at(),
                self.embedding_dimension,
            )?;
            if knowledge_bases.contains_key(kb.id()) || new_kbs.contains_key(kb.id()) {
                return Err(duplicate(EntityKind::KnowledgeBaseSession, kb.id().as_str()));
            }
            new_kbs.insert(kb.id().clone(), kb);
        }

        let mut new_collections = HashMap::new();
        for collection in snapshot.collections {
            if collections.contains_key(collection.id())
                || new_collections.contains_key(collection.id())
            {
                return Err(duplicate(EntityKind::Collection, collection.id().as_str()));
            }
            for member in collection.sessions() {
                let owner = new_kbs
                    .get(member)
                    .or_else(|| knowledge_bases.get(member))
                    .and_then(|kb| kb.collection_id());
                if owner != Some(collection.id()) {
                    return Err(ModelError::invariant(format!(
                        "collection `{}` lists `{}` but the knowledge base does not point back",
                        collection.id(),
                        member
                    )));
                }
            }
            new_collections.insert(collection.id().clone(), collection);
        }

        for kb in new_kbs.values() {
            let Some(owner) = kb.collection_id() else { continue };
            let listed = new_collections
                .get(owner)
                .or_else(|| collections.get(owner))
                .is_some_and(|c| c.contains(kb.id()));
            if !listed {
                return Err(ModelError::invariant(format!(
                    "knowledge base `{}` points to collection `{}` which does not list it",
                    kb.id(),
                    owner
                )));
            }
        }

        let mut new_sessions = HashMap::new();
        for mut session in snapshot.sessions {
            session.check_invariants()?;
            if let Some(attached) = session.knowledge_base() {
                let registered = new_kbs
                    .get(attached.id())
                    .or_else(|| knowledge_bases.get(attached.id()))
                    .ok_or_else(|| {
                        ModelError::invariant(format!(
                            "session `{}` is attached to unknown knowledge base `{}`",
                            session.id(),
                            attached.id()
                        ))
                    })?;
                if registered.document() != attached.document()
                    || registered.embedding() != attached.embedding()
                {
                    return Err(ModelError::invariant(format!(
                        "session `{}` holds a copy of `{}` that differs from the registered one",
                        session.id(),
                        attached.id()
                    )));
                }
                session.refresh_knowledge_base(registered);
            }
            if sessions.contains_key(session.id()) || new_sessions.contains_key(session.id()) {
                return Err(duplicate(EntityKind::MessageSession, session.id().as_str()));
            }
            new_sessions.insert(session.id().clone(), Arc::new(Mutex::new(session)));
        }

        info!(
            "Restored {} sessions, {} knowledge bases, {} collections",
            new_sessions.len(),
            new_kbs.len(),
            new_collections.len()
        );
        knowledge_bases.extend(new_kbs);
        collections.extend(new_collections);
        sessions.extend(new_sessions);
        Ok(())
    }

    /// Push the current state of `kb` into every session it is attached to.
    /// Caller holds the knowledge-base lock.
    fn refresh_attached(&self, kb: &KnowledgeBaseSession) {
        for handle in read(&self.sessions).values() {
            lock(handle).refresh_knowledge_base(kb);
        }
    }

    fn session_handle(&self, session_id: &SessionId) -> Result<Arc<Mutex<MessageSession>>> {
        read(&self.sessions)
            .get(session_id)
            .cloned()
            .ok_or_else(|| not_found(EntityKind::MessageSession, session_id.as_str()))
    }
}

fn duplicate(kind: EntityKind, id: &str) -> ModelError {
    warn!("Duplicate {} id {}", kind, id);
    ModelError::DuplicateId {
        kind,
        id: id.to_string(),
    }
}

fn not_found(kind: EntityKind, id: &str) -> ModelError {
    ModelError::NotFound {
        kind,
        id: id.to_string(),
    }
}

// Poisoning only means another thread panicked mid-operation; every
// mutation validates before writing, so the data is still consistent.
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::{Duration, Utc};

    fn registry_with_clock() -> (Registry, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        (Registry::with_clock(clock.clone()), clock)
    }

    #[test]
    fn test_scenario_s1() {
        let (registry, clock) = registry_with_clock();
        let s1 = SessionId::new("s1");
        registry.create_message_session(s1.clone(), "Session 1", None).unwrap();

        registry.append_chat_message(&s1, "hi", Role::Human).unwrap();
        clock.advance(Duration::milliseconds(10));
        registry.append_chat_message(&s1, "hello", Role::Assistant).unwrap();

        let session = registry.message_session(&s1).unwrap();
        let log: Vec<_> = session.messages().iter().map(|m| (m.content(), m.role())).collect();
        assert_eq!(log, vec![("hi", Role::Human), ("hello", Role::Assistant)]);
        assert!(session.knowledge_base().is_none());
        assert!(session.document().is_none());

        let kb1 = registry
            .create_knowledge_base_session("kb1".into(), vec![0.1, 0.2, 0.3], "D1", "{}")
            .unwrap();
        registry.attach_knowledge_base(&s1, kb1.id()).unwrap();
        assert_eq!(registry.message_session(&s1).unwrap().document(), Some("D1"));

        let kb2 = registry
            .create_knowledge_base_session("kb2".into(), vec![0.3, 0.2, 0.1], "D2", "{}")
            .unwrap();
        let err = registry.attach_knowledge_base(&s1, kb2.id()).unwrap_err();
        assert!(err.is_invariant_violation());

        let session = registry.message_session(&s1).unwrap();
        assert_eq!(session.document(), Some("D1"));
        assert_eq!(session.knowledge_base().unwrap().id(), kb1.id());
    }

    #[test]
    fn test_duplicate_ids_per_kind() {
        let registry = Registry::new();

        registry.create_message_session("dup".into(), "First", None).unwrap();
        let err = registry.create_message_session("dup".into(), "Second", None).unwrap_err();
        assert!(err.is_duplicate());
        assert_eq!(registry.message_session(&"dup".into()).unwrap().title(), "First");

        registry.create_knowledge_base_session("dup".into(), vec![1.0], "doc", "a").unwrap();
        let err = registry
            .create_knowledge_base_session("dup".into(), vec![2.0], "other", "b")
            .unwrap_err();
        assert!(err.is_duplicate());
        assert_eq!(registry.knowledge_base(&"dup".into()).unwrap().document(), "doc");

        registry.create_collection("dup".into(), "Coll", "").unwrap();
        assert!(registry.create_collection("dup".into(), "Other", "").unwrap_err().is_duplicate());
        assert_eq!(registry.collection(&"dup".into()).unwrap().name(), "Coll");
    }

    #[test]
    fn test_create_validation_errors() {
        let registry = Registry::new().with_embedding_dimension(3);
        assert!(registry
            .create_message_session("s".into(), " ", None)
            .unwrap_err()
            .is_validation());
        assert!(registry
            .create_knowledge_base_session("kb".into(), vec![], "doc", "")
            .unwrap_err()
            .is_validation());
        assert!(registry
            .create_knowledge_base_session("kb".into(), vec![1.0], "doc", "")
            .unwrap_err()
            .is_validation());
        assert!(registry
            .create_knowledge_base_session("kb".into(), vec![1.0, 2.0, 3.0], "", "")
            .unwrap_err()
            .is_validation());
        // Failed creates must not reserve the id.
        assert!(registry
            .create_knowledge_base_session("kb".into(), vec![1.0, 2.0, 3.0], "doc", "")
            .is_ok());
    }

    #[test]
    fn test_clock_skew_guard() {
        let (registry, clock) = registry_with_clock();
        let id = SessionId::new("s1");
        registry.create_message_session(id.clone(), "t", None).unwrap();
        registry.append_chat_message(&id, "one", Role::Human).unwrap();

        clock.advance(Duration::seconds(-1));
        let err = registry.append_chat_message(&id, "two", Role::Assistant).unwrap_err();
        assert!(err.is_invariant_violation());
        assert_eq!(registry.message_session(&id).unwrap().messages().len(), 1);
    }

    #[test]
    fn test_unknown_ids_are_not_found() {
        let registry = Registry::new();
        let err = registry.append_chat_message(&"nope".into(), "x", Role::Human).unwrap_err();
        assert!(matches!(err, ModelError::NotFound { kind: EntityKind::MessageSession, .. }));

        registry.create_message_session("s".into(), "t", None).unwrap();
        let err = registry.attach_knowledge_base(&"s".into(), &"missing".into()).unwrap_err();
        assert!(matches!(err, ModelError::NotFound { kind: EntityKind::KnowledgeBaseSession, .. }));
    }

    #[test]
    fn test_collection_membership_is_idempotent() {
        let registry = Registry::new();
        registry.create_collection("c1".into(), "Coll 1", "").unwrap();
        registry.create_knowledge_base_session("kb1".into(), vec![1.0], "doc", "").unwrap();

        assert!(registry.add_session_to_collection(&"c1".into(), &"kb1".into()).unwrap());
        assert!(!registry.add_session_to_collection(&"c1".into(), &"kb1".into()).unwrap());

        let coll = registry.collection(&"c1".into()).unwrap();
        assert_eq!(coll.len(), 1);
        assert_eq!(
            registry.knowledge_base(&"kb1".into()).unwrap().collection_id(),
            Some(&CollectionId::new("c1"))
        );

        registry.create_collection("c2".into(), "Coll 2", "").unwrap();
        let err = registry.add_session_to_collection(&"c2".into(), &"kb1".into()).unwrap_err();
        assert!(err.is_invariant_violation());
        assert!(registry.collection(&"c2".into()).unwrap().is_empty());
    }

    #[test]
    fn test_metadata_update_reaches_attached_sessions() {
        let registry = Registry::new();
        registry.create_message_session("s".into(), "t", None).unwrap();
        registry.create_knowledge_base_session("kb".into(), vec![1.0], "doc", "v1").unwrap();
        registry.attach_knowledge_base(&"s".into(), &"kb".into()).unwrap();

        registry.update_knowledge_base_metadata(&"kb".into(), "v2").unwrap();
        assert_eq!(registry.knowledge_base(&"kb".into()).unwrap().metadata(), "v2");
        let session = registry.message_session(&"s".into()).unwrap();
        assert_eq!(session.knowledge_base().unwrap().metadata(), "v2");
        assert_eq!(session.document(), Some("doc"));
    }

    #[test]
    fn test_concurrent_appends_stay_ordered() {
        let registry = Arc::new(Registry::new());
        let id = SessionId::new("shared");
        registry.create_message_session(id.clone(), "t", None).unwrap();

        let workers: Vec<_> = (0..8)
            .map(|n| {
                let registry = Arc::clone(&registry);
                let id = id.clone();
                std::thread::spawn(move || {
                    for i in 0..25 {
                        registry
                            .append_chat_message(&id, format!("{}-{}", n, i), Role::Human)
                            .unwrap();
                    }
                })
            })
            .collect();
        for w in workers {
            w.join().unwrap();
        }

        let session = registry.message_session(&id).unwrap();
        assert_eq!(session.messages().len(), 200);
        assert!(session
            .messages()
            .windows(2)
            .all(|w| w[0].created_at() <= w[1].created_at()));
    }

    #[test]
    fn test_concurrent_creates_admit_one_winner() {
        let registry = Arc::new(Registry::new());
        let workers: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    registry.create_collection("race".into(), "Coll", "").is_ok()
                })
            })
            .collect();
        let winners = workers.into_iter().map(|w| w.join().unwrap()).filter(|ok| *ok).count();
        assert_eq!(winners, 1);
    }

    #[test]
    fn test_snapshot_restore() {
        let (source, clock) = registry_with_clock();
        source.create_message_session("s".into(), "t", Some(vec!["a.txt".into()])).unwrap();
        source.append_chat_message(&"s".into(), "hi", Role::Human).unwrap();
        clock.advance(Duration::seconds(1));
        source.create_knowledge_base_session("kb".into(), vec![1.0], "doc", "").unwrap();
        source.create_collection("c".into(), "Coll", "").unwrap();
        source.add_session_to_collection(&"c".into(), &"kb".into()).unwrap();
        source.attach_knowledge_base(&"s".into(), &"kb".into()).unwrap();

        let snapshot = source.snapshot();
        let target = Registry::new();
        target.restore(snapshot.clone()).unwrap();
        assert_eq!(target.snapshot(), snapshot);

        // Restoring again collides with what is already loaded.
        assert!(target.restore(snapshot).unwrap_err().is_duplicate());
    }

    fn attached_snapshot() -> Snapshot {
        let source = Registry::new();
        source.create_message_session("s".into(), "t", None).unwrap();
        source.create_knowledge_base_session("kb".into(), vec![1.0], "doc", "v1").unwrap();
        source.create_collection("c".into(), "Coll", "").unwrap();
        source.add_session_to_collection(&"c".into(), &"kb".into()).unwrap();
        source.attach_knowledge_base(&"s".into(), &"kb".into()).unwrap();
        source.snapshot()
    }

    #[test]
    fn test_restore_rejects_unlisted_collection_owner() {
        let mut snapshot = attached_snapshot();
        snapshot.collections.clear();

        let target = Registry::new();
        assert!(target.restore(snapshot).unwrap_err().is_invariant_violation());
        assert!(target.list_knowledge_bases().is_empty());
        assert!(target.list_message_sessions().is_empty());
    }

    #[test]
    fn test_restore_rejects_unknown_attached_knowledge_base() {
        let mut snapshot = attached_snapshot();
        snapshot.knowledge_bases.clear();
        snapshot.collections.clear();

        let target = Registry::new();
        assert!(target.restore(snapshot).unwrap_err().is_invariant_violation());
        assert!(target.list_message_sessions().is_empty());
    }

    #[test]
    fn test_restore_rejects_diverging_attached_copy() {
        let mut snapshot = attached_snapshot();
        let replacement = KnowledgeBaseSession::new(
            "kb".into(),
            vec![1.0],
            "another doc",
            "v1",
            snapshot.knowledge_bases[0].created_at(),
            None,
        )
        .unwrap();
        snapshot.knowledge_bases[0] = replacement;
        snapshot.collections.clear();

        let target = Registry::new();
        assert!(target.restore(snapshot).unwrap_err().is_invariant_violation());
    }

    #[test]
    fn test_restore_refreshes_stale_attached_metadata() {
        let mut snapshot = attached_snapshot();
        let mut kb = snapshot.knowledge_bases[0].clone();
        kb.set_metadata("v2");
        snapshot.knowledge_bases[0] = kb;

        let target = Registry::new();
        target.restore(snapshot).unwrap();
        let session = target.message_session(&"s".into()).unwrap();
        assert_eq!(session.knowledge_base().unwrap().metadata(), "v2");

        target.update_knowledge_base_metadata(&"kb".into(), "v3").unwrap();
        let session = target.message_session(&"s".into()).unwrap();
        assert_eq!(session.knowledge_base().unwrap().metadata(), "v3");
    }

    #[test]
    fn test_restore_rejects_dangling_membership() {
        let source = Registry::new();
        source.create_knowledge_base_session("kb".into(), vec![1.0], "doc", "").unwrap();
        source.create_collection("c".into(), "Coll", "").unwrap();
        source.add_session_to_collection(&"c".into(), &"kb".into()).unwrap();

        let mut snapshot = source.snapshot();
        snapshot.knowledge_bases.clear();

        let target = Registry::new();
        assert!(target.restore(snapshot).unwrap_err().is_invariant_violation());
        assert!(target.list_collections().is_empty());
    }
}
