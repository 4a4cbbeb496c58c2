// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Session lifecycle, event emission, and pub/sub fan-out over a
//! [`KvStore`] (spec §4.9). A session's full state is kept as a single
//! JSON blob under `session:{id}`; `sessions:active` and
//! `sessions:by_agent:{agentId}` sorted sets index it for listing.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use memento_storage::KvStore;
use memento_types::{
    AgentId, CheckpointId, CheckpointReason, MementoError, Result, Session, SessionEvent,
    SessionId, SessionState, StateTransition,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

fn session_key(id: &SessionId) -> String {
    format!("session:{id}")
}

fn agent_sessions_key(agent_id: &AgentId) -> String {
    format!("sessions:by_agent:{agent_id}")
}

fn session_channel(id: &SessionId) -> String {
    format!("sessions:{id}")
}

const GLOBAL_CHANNEL: &str = "sessions:global";
const ACTIVE_INDEX: &str = "sessions:active";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum SessionMessage {
    New { session_id: SessionId },
    Modified { session_id: SessionId, event: SessionEvent },
    CheckpointComplete { session_id: SessionId, checkpoint_id: CheckpointId },
    Handoff { session_id: SessionId, event: SessionEvent },
}

#[derive(Debug, Default, Clone)]
pub struct CreateSessionOptions {
    pub ttl: Option<Duration>,
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone)]
pub struct CheckpointOptions {
    pub reason: CheckpointReason,
    pub grace_ttl: Option<Duration>,
}

impl Default for CheckpointOptions {
    fn default() -> Self {
        Self {
            reason: CheckpointReason::Manual,
            grace_ttl: None,
        }
    }
}

pub struct SessionManager {
    kv: Arc<dyn KvStore>,
    default_ttl: Duration,
}

impl SessionManager {
    pub fn new(kv: Arc<dyn KvStore>, default_ttl: Duration) -> Self {
        Self { kv, default_ttl }
    }

    async fn load_session(&self, id: &SessionId) -> Result<Session> {
        let raw = self
            .kv
            .get(&session_key(id))
            .await?
            .ok_or_else(|| MementoError::NotFound(format!("session {id}")))?;
        serde_json::from_str(&raw).map_err(|e| MementoError::Internal(e.to_string()))
    }

    async fn save_session(&self, session: &Session, ttl: Duration) -> Result<()> {
        let raw = serde_json::to_string(session).map_err(|e| MementoError::Internal(e.to_string()))?;
        self.kv.set(&session_key(&session.session_id), &raw, Some(ttl)).await
    }

    async fn touch_active_index(&self, session_id: &SessionId) -> Result<()> {
        self.kv
            .zadd(ACTIVE_INDEX, session_id.as_str(), Utc::now().timestamp() as f64)
            .await
    }

    async fn publish(&self, session_id: &SessionId, message: &SessionMessage) -> Result<()> {
        let payload = serde_json::to_string(message).map_err(|e| MementoError::Internal(e.to_string()))?;
        self.kv.publish(&session_channel(session_id), &payload).await?;
        self.kv.publish(GLOBAL_CHANNEL, &payload).await
    }

    pub async fn create_session(&self, agent_id: AgentId, opts: CreateSessionOptions) -> Result<Session> {
        let session = Session {
            session_id: SessionId::new(Uuid::new_v4().to_string()),
            agent_ids: vec![agent_id.clone()],
            state: SessionState::Working,
            events: Vec::new(),
            current_checkpoint: None,
            metadata: opts.metadata,
        };
        let ttl = opts.ttl.unwrap_or(self.default_ttl);
        self.save_session(&session, ttl).await?;
        self.touch_active_index(&session.session_id).await?;
        self.kv
            .zadd(&agent_sessions_key(&agent_id), session.session_id.as_str(), Utc::now().timestamp() as f64)
            .await?;
        self.publish(
            &session.session_id,
            &SessionMessage::New {
                session_id: session.session_id.clone(),
            },
        )
        .await?;
        Ok(session)
    }

    pub async fn join_session(&self, session_id: &SessionId, agent_id: AgentId) -> Result<Session> {
        let mut session = self.load_session(session_id).await?;
        if !session.agent_ids.contains(&agent_id) {
            session.agent_ids.push(agent_id.clone());
        }
        self.save_session(&session, self.default_ttl).await?;
        self.kv
            .zadd(&agent_sessions_key(&agent_id), session_id.as_str(), Utc::now().timestamp() as f64)
            .await?;
        Ok(session)
    }

    pub async fn leave_session(&self, session_id: &SessionId, agent_id: &AgentId) -> Result<Session> {
        let mut session = self.load_session(session_id).await?;
        session.agent_ids.retain(|a| a != agent_id);
        self.save_session(&session, self.default_ttl).await?;
        Ok(session)
    }

    /// Appends `event` to the session's log, assigning its `seq`. If the
    /// event carries a [`StateTransition`], it must start from the
    /// session's current state or the event is rejected as a conflict.
    pub async fn emit_event(&self, session_id: &SessionId, event: SessionEvent) -> Result<u64> {
        let mut session = self.load_session(session_id).await?;
        if let Some(transition) = &event.state_transition {
            if transition.from != session.state {
                return Err(MementoError::Conflict(format!(
                    "session {session_id} is in state {:?}, event assumes {:?}",
                    session.state, transition.from
                )));
            }
            session.state = transition.to;
        }
        let seq = session.push_event(event);
        let recorded = session.events.last().expect("just pushed").clone();
        self.save_session(&session, self.default_ttl).await?;
        self.touch_active_index(session_id).await?;

        let message = if matches!(recorded.event_type, memento_types::SessionEventType::Handoff) {
            SessionMessage::Handoff {
                session_id: session_id.clone(),
                event: recorded,
            }
        } else {
            SessionMessage::Modified {
                session_id: session_id.clone(),
                event: recorded,
            }
        };
        self.publish(session_id, &message).await?;
        Ok(seq)
    }

    /// Records a checkpoint reference against the session and notifies
    /// subscribers. The checkpoint's entity snapshot itself is built by
    /// `memento-history`'s `CheckpointStore`; this only tracks the
    /// session-side pointer and optionally extends the session's TTL to
    /// give in-flight agents a grace period before cleanup.
    pub async fn checkpoint(
        &self,
        session_id: &SessionId,
        checkpoint_id: CheckpointId,
        opts: CheckpointOptions,
    ) -> Result<Session> {
        let mut session = self.load_session(session_id).await?;
        session.current_checkpoint = Some(checkpoint_id.clone());
        let ttl = opts.grace_ttl.unwrap_or(self.default_ttl);
        self.save_session(&session, ttl).await?;
        self.publish(
            session_id,
            &SessionMessage::CheckpointComplete {
                session_id: session_id.clone(),
                checkpoint_id,
            },
        )
        .await?;
        Ok(session)
    }

    /// Deletes the session's KV entry. Stale entries in the active/agent
    /// indexes are pruned lazily on the next list call rather than here,
    /// since `KvStore` has no sorted-set member removal primitive.
    pub async fn cleanup(&self, session_id: &SessionId) -> Result<()> {
        self.kv.del(&session_key(session_id)).await?;
        Ok(())
    }

    pub async fn get_session(&self, session_id: &SessionId) -> Result<Session> {
        self.load_session(session_id).await
    }

    pub async fn list_active_sessions(&self) -> Result<Vec<Session>> {
        let ids = self.kv.zrange(ACTIVE_INDEX, 0, -1).await?;
        let mut sessions = Vec::with_capacity(ids.len());
        for id in ids {
            if let Ok(session) = self.load_session(&SessionId::new(id)).await {
                sessions.push(session);
            }
        }
        Ok(sessions)
    }

    pub async fn get_sessions_by_agent(&self, agent_id: &AgentId) -> Result<Vec<Session>> {
        let ids = self.kv.zrange(&agent_sessions_key(agent_id), 0, -1).await?;
        let mut sessions = Vec::with_capacity(ids.len());
        for id in ids {
            if let Ok(session) = self.load_session(&SessionId::new(id)).await {
                sessions.push(session);
            }
        }
        Ok(sessions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memento_storage::InMemoryKvStore;
    use memento_types::SessionEventType;

    fn manager() -> SessionManager {
        SessionManager::new(Arc::new(InMemoryKvStore::new()), Duration::from_secs(600))
    }

    fn event(event_type: SessionEventType, state_transition: Option<StateTransition>) -> SessionEvent {
        SessionEvent {
            seq: 0,
            event_type,
            timestamp: Utc::now(),
            change_info: Map::new(),
            state_transition,
            impact: None,
            actor: AgentId::new("agent-a"),
        }
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let manager = manager();
        let session = manager
            .create_session(AgentId::new("agent-a"), CreateSessionOptions::default())
            .await
            .unwrap();
        let fetched = manager.get_session(&session.session_id).await.unwrap();
        assert_eq!(fetched.session_id, session.session_id);
        assert_eq!(fetched.state, SessionState::Working);
    }

    #[tokio::test]
    async fn emit_event_assigns_sequential_seq() {
        let manager = manager();
        let session = manager
            .create_session(AgentId::new("agent-a"), CreateSessionOptions::default())
            .await
            .unwrap();
        let first = manager
            .emit_event(&session.session_id, event(SessionEventType::Start, None))
            .await
            .unwrap();
        let second = manager
            .emit_event(&session.session_id, event(SessionEventType::Modified, None))
            .await
            .unwrap();
        assert_eq!(first, 1);
        assert_eq!(second, 2);
    }

    #[tokio::test]
    async fn emit_event_with_mismatched_transition_is_conflict() {
        let manager = manager();
        let session = manager
            .create_session(AgentId::new("agent-a"), CreateSessionOptions::default())
            .await
            .unwrap();
        let bad_transition = StateTransition {
            from: SessionState::Broken,
            to: SessionState::Working,
            verified_by: memento_types::VerifiedBy::Test,
            confidence: 0.9,
        };
        let err = manager
            .emit_event(&session.session_id, event(SessionEventType::TestPass, Some(bad_transition)))
            .await
            .unwrap_err();
        assert!(matches!(err, MementoError::Conflict(_)));
    }

    #[tokio::test]
    async fn join_session_adds_agent() {
        let manager = manager();
        let session = manager
            .create_session(AgentId::new("agent-a"), CreateSessionOptions::default())
            .await
            .unwrap();
        let joined = manager
            .join_session(&session.session_id, AgentId::new("agent-b"))
            .await
            .unwrap();
        assert_eq!(joined.agent_ids.len(), 2);
    }

    #[tokio::test]
    async fn list_active_sessions_includes_created_session() {
        let manager = manager();
        let session = manager
            .create_session(AgentId::new("agent-a"), CreateSessionOptions::default())
            .await
            .unwrap();
        let active = manager.list_active_sessions().await.unwrap();
        assert!(active.iter().any(|s| s.session_id == session.session_id));
    }

    #[tokio::test]
    async fn cleanup_removes_session() {
        let manager = manager();
        let session = manager
            .create_session(AgentId::new("agent-a"), CreateSessionOptions::default())
            .await
            .unwrap();
        manager.cleanup(&session.session_id).await.unwrap();
        assert!(manager.get_session(&session.session_id).await.is_err());
    }
}
