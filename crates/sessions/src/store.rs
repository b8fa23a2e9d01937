//! In-memory session + message store.
//!
//! One session owns an ordered sequence of messages (`created_at`
//! ascending). Only the outermost user/assistant pair of each run is
//! persisted here; intra-run tool traffic lives on the execution trace.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use nx_domain::error::{Error, Result};
use nx_domain::id::{AgentId, MessageId, ProjectId, SessionId, TraceId};
use nx_domain::message::Role;
use nx_domain::stream::Usage;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Completed,
    Abandoned,
    Expired,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionMetadata {
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default, alias = "contactId")]
    pub contact_id: Option<String>,
    #[serde(default, alias = "agentId")]
    pub agent_id: Option<AgentId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub project_id: ProjectId,
    pub status: SessionStatus,
    pub metadata: SessionMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: MessageId,
    pub session_id: SessionId,
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<TraceId>,
    pub created_at: DateTime<Utc>,
}

/// Filters for the inbox listing. `limit` is clamped to 100.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InboxFilter {
    #[serde(default, alias = "agentId")]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub status: Option<SessionStatus>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default, alias = "contactId")]
    pub contact_id: Option<String>,
    /// Case-insensitive substring search over message content.
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
}

const MAX_INBOX_LIMIT: usize = 100;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<SessionId, Session>>,
    messages: RwLock<HashMap<SessionId, Vec<StoredMessage>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, project_id: ProjectId, metadata: SessionMetadata) -> Session {
        let now = Utc::now();
        let session = Session {
            id: SessionId::new(),
            project_id,
            status: SessionStatus::Active,
            metadata,
            created_at: now,
            updated_at: now,
            expires_at: None,
        };
        self.sessions
            .write()
            .insert(session.id.clone(), session.clone());
        tracing::debug!(session_id = %session.id, "session created");
        session
    }

    pub fn get(&self, id: &SessionId) -> Option<Session> {
        self.sessions.read().get(id).cloned()
    }

    /// Get an existing session or create a fresh one under `project_id`.
    pub fn get_or_create(
        &self,
        id: Option<&SessionId>,
        project_id: &ProjectId,
        metadata: SessionMetadata,
    ) -> Result<Session> {
        match id {
            Some(sid) => {
                let session = self
                    .get(sid)
                    .ok_or_else(|| Error::NotFound(format!("session {sid}")))?;
                if &session.project_id != project_id {
                    return Err(Error::NotFound(format!("session {sid}")));
                }
                Ok(session)
            }
            None => Ok(self.create(project_id.clone(), metadata)),
        }
    }

    pub fn set_status(&self, id: &SessionId, status: SessionStatus) {
        if let Some(session) = self.sessions.write().get_mut(id) {
            session.status = status;
            session.updated_at = Utc::now();
        }
    }

    /// Append a message; keeps the session's `updated_at` fresh.
    pub fn append_message(
        &self,
        session_id: &SessionId,
        role: Role,
        content: String,
        usage: Option<Usage>,
        trace_id: Option<TraceId>,
    ) -> StoredMessage {
        let message = StoredMessage {
            id: MessageId::new(),
            session_id: session_id.clone(),
            role,
            content,
            usage,
            trace_id,
            created_at: Utc::now(),
        };
        self.messages
            .write()
            .entry(session_id.clone())
            .or_default()
            .push(message.clone());
        if let Some(session) = self.sessions.write().get_mut(session_id) {
            session.updated_at = message.created_at;
        }
        message
    }

    /// All messages of a session, oldest first.
    pub fn messages(&self, session_id: &SessionId) -> Vec<StoredMessage> {
        self.messages
            .read()
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Inbox listing for a project: filtered, newest-activity first.
    pub fn inbox(&self, project_id: &ProjectId, filter: &InboxFilter) -> Vec<Session> {
        let sessions = self.sessions.read();
        let mut out: Vec<Session> = sessions
            .values()
            .filter(|s| &s.project_id == project_id)
            .filter(|s| filter.status.is_none_or(|st| s.status == st))
            .filter(|s| {
                filter
                    .channel
                    .as_deref()
                    .is_none_or(|c| s.metadata.channel.as_deref() == Some(c))
            })
            .filter(|s| {
                filter
                    .contact_id
                    .as_deref()
                    .is_none_or(|c| s.metadata.contact_id.as_deref() == Some(c))
            })
            .filter(|s| {
                filter.agent_id.as_deref().is_none_or(|a| {
                    s.metadata.agent_id.as_ref().map(|id| id.as_str()) == Some(a)
                })
            })
            .cloned()
            .collect();

        if let Some(needle) = filter.search.as_deref() {
            let needle = needle.to_lowercase();
            let messages = self.messages.read();
            out.retain(|s| {
                messages
                    .get(&s.id)
                    .map(|msgs| {
                        msgs.iter()
                            .any(|m| m.content.to_lowercase().contains(&needle))
                    })
                    .unwrap_or(false)
            });
        }

        out.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

        let offset = filter.offset.unwrap_or(0);
        let limit = filter.limit.unwrap_or(MAX_INBOX_LIMIT).min(MAX_INBOX_LIMIT);
        out.into_iter().skip(offset).take(limit).collect()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn message_count(&self) -> usize {
        self.messages.read().values().map(Vec::len).sum()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_session(channel: &str) -> (SessionStore, Session) {
        let store = SessionStore::new();
        let session = store.create(
            ProjectId::from("p1"),
            SessionMetadata {
                channel: Some(channel.into()),
                contact_id: Some("c_1".into()),
                agent_id: None,
            },
        );
        (store, session)
    }

    #[test]
    fn create_and_get() {
        let (store, session) = store_with_session("whatsapp");
        let loaded = store.get(&session.id).unwrap();
        assert_eq!(loaded.status, SessionStatus::Active);
        assert_eq!(loaded.metadata.channel.as_deref(), Some("whatsapp"));
    }

    #[test]
    fn get_or_create_rejects_cross_project_access() {
        let (store, session) = store_with_session("telegram");
        let err = store
            .get_or_create(Some(&session.id), &ProjectId::from("p2"), Default::default())
            .unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[test]
    fn messages_keep_insertion_order() {
        let (store, session) = store_with_session("slack");
        store.append_message(&session.id, Role::User, "first".into(), None, None);
        store.append_message(&session.id, Role::Assistant, "second".into(), None, None);
        let msgs = store.messages(&session.id);
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].content, "first");
        assert_eq!(msgs[1].content, "second");
        assert!(msgs[0].created_at <= msgs[1].created_at);
    }

    #[test]
    fn inbox_filters_by_channel_and_status() {
        let store = SessionStore::new();
        let p = ProjectId::from("p1");
        let a = store.create(
            p.clone(),
            SessionMetadata {
                channel: Some("whatsapp".into()),
                ..Default::default()
            },
        );
        let _b = store.create(
            p.clone(),
            SessionMetadata {
                channel: Some("telegram".into()),
                ..Default::default()
            },
        );
        store.set_status(&a.id, SessionStatus::Completed);

        let filter = InboxFilter {
            channel: Some("whatsapp".into()),
            ..Default::default()
        };
        let hits = store.inbox(&p, &filter);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, a.id);

        let filter = InboxFilter {
            status: Some(SessionStatus::Active),
            ..Default::default()
        };
        let hits = store.inbox(&p, &filter);
        assert_eq!(hits.len(), 1);
        assert_ne!(hits[0].id, a.id);
    }

    #[test]
    fn inbox_search_looks_at_message_content() {
        let (store, session) = store_with_session("whatsapp");
        store.append_message(
            &session.id,
            Role::User,
            "do you have rooms in January".into(),
            None,
            None,
        );
        let p = ProjectId::from("p1");

        let filter = InboxFilter {
            search: Some("JANUARY".into()),
            ..Default::default()
        };
        assert_eq!(store.inbox(&p, &filter).len(), 1);

        let filter = InboxFilter {
            search: Some("february".into()),
            ..Default::default()
        };
        assert!(store.inbox(&p, &filter).is_empty());
    }

    #[test]
    fn inbox_limit_is_clamped() {
        let store = SessionStore::new();
        let p = ProjectId::from("p1");
        for _ in 0..150 {
            store.create(p.clone(), Default::default());
        }
        let filter = InboxFilter {
            limit: Some(1000),
            ..Default::default()
        };
        assert_eq!(store.inbox(&p, &filter).len(), 100);

        let filter = InboxFilter {
            limit: Some(10),
            offset: Some(145),
            ..Default::default()
        };
        assert_eq!(store.inbox(&p, &filter).len(), 5);
    }

    #[test]
    fn inbox_scoped_to_project() {
        let store = SessionStore::new();
        store.create(ProjectId::from("p1"), Default::default());
        store.create(ProjectId::from("p2"), Default::default());
        let hits = store.inbox(&ProjectId::from("p1"), &InboxFilter::default());
        assert_eq!(hits.len(), 1);
    }
}
