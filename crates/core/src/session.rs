//! Message session model - a conversation, optionally grounded in one knowledge base.

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};
use crate::id::SessionId;
use crate::knowledge_base::KnowledgeBaseSession;
use crate::message::{ChatMessage, Role};
use crate::validation::{require_non_empty, validate_files};
use crate::Time;

/// A chat session.
///
/// The message log is append-only and ordered by `created_at`. A session
/// is either purely conversational (`knowledge_base` and `document` both
/// absent) or grounded in exactly one knowledge base, in which case
/// `document` mirrors that knowledge base's document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageSession {
    id: SessionId,
    title: String,
    #[serde(default)]
    files: Option<Vec<String>>,
    #[serde(default)]
    document: Option<String>,
    created_at: Time,
    #[serde(default)]
    chat_message: Vec<ChatMessage>,
    #[serde(default)]
    knowledge_base: Option<KnowledgeBaseSession>,
    #[serde(default)]
    closed_at: Option<Time>,
}

impl MessageSession {
    /// Build a validated, empty session.
    pub fn new(
        id: SessionId,
        title: impl Into<String>,
        files: Option<Vec<String>>,
        created_at: Time,
    ) -> Result<Self> {
        let title = title.into();
        require_non_empty("id", id.as_str())?;
        require_non_empty("title", &title)?;
        if let Some(files) = &files {
            validate_files(files)?;
        }

        Ok(Self {
            id,
            title,
            files,
            document: None,
            created_at,
            chat_message: Vec::new(),
            knowledge_base: None,
            closed_at: None,
        })
    }

    /// Id
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Title
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Attached file paths/ids
    pub fn files(&self) -> Option<&[String]> {
        self.files.as_deref()
    }

    /// Grounding document, present only with a knowledge base
    pub fn document(&self) -> Option<&str> {
        self.document.as_deref()
    }

    /// Creation time
    pub fn created_at(&self) -> Time {
        self.created_at
    }

    /// Message log, oldest first
    pub fn messages(&self) -> &[ChatMessage] {
        &self.chat_message
    }

    /// Most recent message
    pub fn last_message(&self) -> Option<&ChatMessage> {
        self.chat_message.last()
    }

    /// Attached knowledge base
    pub fn knowledge_base(&self) -> Option<&KnowledgeBaseSession> {
        self.knowledge_base.as_ref()
    }

    /// When the conversation was closed
    pub fn closed_at(&self) -> Option<Time> {
        self.closed_at
    }

    /// Whether the conversation has been closed
    pub fn is_closed(&self) -> bool {
        self.closed_at.is_some()
    }

    /// Append a message stamped `at`.
    ///
    /// Rejects timestamps earlier than the last message (clock skew) and
    /// appends to closed sessions.
    pub fn append_message(
        &mut self,
        content: impl Into<String>,
        role: Role,
        at: Time,
    ) -> Result<ChatMessage> {
        self.ensure_open("append a message")?;
        if let Some(last) = self.chat_message.last() {
            if at < last.created_at() {
                return Err(ModelError::invariant(format!(
                    "message timestamp {} precedes last message at {} in session `{}`",
                    at.to_rfc3339(),
                    last.created_at().to_rfc3339(),
                    self.id
                )));
            }
        }

        let message = ChatMessage::new(content, role, at);
        self.chat_message.push(message.clone());
        Ok(message)
    }

    /// Ground the session in `kb_session`. One-shot: no replacement.
    pub fn attach_knowledge_base(&mut self, kb_session: KnowledgeBaseSession) -> Result<()> {
        self.ensure_open("attach a knowledge base")?;
        if let Some(existing) = &self.knowledge_base {
            return Err(ModelError::invariant(format!(
                "session `{}` already has knowledge base `{}` attached",
                self.id,
                existing.id()
            )));
        }
        if kb_session.document().trim().is_empty() {
            return Err(ModelError::invariant(format!(
                "knowledge base `{}` has an empty document",
                kb_session.id()
            )));
        }

        self.document = Some(kb_session.document().to_string());
        self.knowledge_base = Some(kb_session);
        Ok(())
    }

    /// Mark the conversation closed. Closing twice keeps the first time.
    pub fn close(&mut self, at: Time) {
        if self.closed_at.is_none() {
            self.closed_at = Some(at);
        }
    }

    /// Re-validate a session built outside the constructors (e.g. loaded
    /// from storage).
    pub fn check_invariants(&self) -> Result<()> {
        require_non_empty("id", self.id.as_str())?;
        require_non_empty("title", &self.title)?;
        if let Some(files) = &self.files {
            validate_files(files)?;
        }

        match (&self.knowledge_base, &self.document) {
            (None, Some(_)) => {
                return Err(ModelError::invariant(format!(
                    "session `{}` has a document but no knowledge base",
                    self.id
                )));
            }
            (Some(kb), doc) if doc.as_deref() != Some(kb.document()) => {
                return Err(ModelError::invariant(format!(
                    "session `{}` document does not match knowledge base `{}`",
                    self.id,
                    kb.id()
                )));
            }
            _ => {}
        }

        let ordered = self
            .chat_message
            .windows(2)
            .all(|w| w[0].created_at() <= w[1].created_at());
        if !ordered {
            return Err(ModelError::invariant(format!(
                "session `{}` messages are not in timestamp order",
                self.id
            )));
        }

        Ok(())
    }

    /// Replace the attached copy of `kb` with its current state. Only
    /// `metadata` and `collection_id` can differ, so `document` still matches.
    pub(crate) fn refresh_knowledge_base(&mut self, kb: &KnowledgeBaseSession) {
        if let Some(current) = self.knowledge_base.as_mut().filter(|c| c.id() == kb.id()) {
            *current = kb.clone();
        }
    }

    fn ensure_open(&self, action: &str) -> Result<()> {
        if self.is_closed() {
            return Err(ModelError::invariant(format!(
                "cannot {} on closed session `{}`",
                action, self.id
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn session(id: &str) -> MessageSession {
        MessageSession::new(SessionId::new(id), "Session 1", None, Utc::now()).unwrap()
    }

    fn kb(id: &str, document: &str) -> KnowledgeBaseSession {
        KnowledgeBaseSession::new(id.into(), vec![0.1, 0.2, 0.3], document, "{}", Utc::now(), None)
            .unwrap()
    }

    #[test]
    fn test_new_rejects_empty_title() {
        let err = MessageSession::new("s1".into(), "", None, Utc::now()).unwrap_err();
        assert!(matches!(err, ModelError::Validation { field: "title", .. }));
    }

    #[test]
    fn test_new_rejects_blank_file_entry() {
        let files = Some(vec!["notes.txt".to_string(), " ".to_string()]);
        let err = MessageSession::new("s1".into(), "t", files, Utc::now()).unwrap_err();
        assert!(matches!(err, ModelError::Validation { field: "files", .. }));
    }

    #[test]
    fn test_append_keeps_order() {
        let mut s = session("s1");
        let t0 = Utc::now();
        s.append_message("hi", Role::Human, t0).unwrap();
        s.append_message("hello", Role::Assistant, t0).unwrap();
        s.append_message("again", Role::Human, t0 + Duration::seconds(1)).unwrap();

        let roles: Vec<_> = s.messages().iter().map(|m| m.role()).collect();
        assert_eq!(roles, vec![Role::Human, Role::Assistant, Role::Human]);
        assert!(s.check_invariants().is_ok());
    }

    #[test]
    fn test_append_rejects_clock_skew() {
        let mut s = session("s1");
        let t0 = Utc::now();
        s.append_message("hi", Role::Human, t0).unwrap();

        let err = s
            .append_message("late", Role::Assistant, t0 - Duration::milliseconds(5))
            .unwrap_err();
        assert!(err.is_invariant_violation());
        assert_eq!(s.messages().len(), 1);
    }

    #[test]
    fn test_attach_is_one_shot() {
        let mut s = session("s1");
        s.attach_knowledge_base(kb("kb1", "D1")).unwrap();
        assert_eq!(s.document(), Some("D1"));

        let err = s.attach_knowledge_base(kb("kb2", "D2")).unwrap_err();
        assert!(err.is_invariant_violation());
        assert_eq!(s.document(), Some("D1"));
        assert_eq!(s.knowledge_base().unwrap().id().as_str(), "kb1");
    }

    #[test]
    fn test_closed_session_rejects_mutation() {
        let mut s = session("s1");
        let t = Utc::now();
        s.close(t);
        s.close(t + Duration::seconds(10));
        assert_eq!(s.closed_at(), Some(t));

        assert!(s.append_message("hi", Role::Human, t).unwrap_err().is_invariant_violation());
        assert!(s.attach_knowledge_base(kb("kb1", "D1")).unwrap_err().is_invariant_violation());
    }

    #[test]
    fn test_check_invariants_catches_orphan_document() {
        let mut json = serde_json::to_value(session("s1")).unwrap();
        json["document"] = serde_json::json!("orphan");
        let loaded: MessageSession = serde_json::from_value(json).unwrap();
        assert!(loaded.check_invariants().unwrap_err().is_invariant_violation());
    }

    #[test]
    fn test_check_invariants_catches_disordered_log() {
        let mut s = session("s1");
        let t0 = Utc::now();
        s.append_message("first", Role::Human, t0).unwrap();
        s.append_message("second", Role::Assistant, t0 + Duration::seconds(1)).unwrap();

        let mut json = serde_json::to_value(&s).unwrap();
        let log = json["chat_message"].as_array_mut().unwrap();
        log.swap(0, 1);
        let loaded: MessageSession = serde_json::from_value(json).unwrap();
        assert!(loaded.check_invariants().is_err());
    }
}
