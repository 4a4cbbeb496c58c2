//! Session data model (spec §3, §4.9): an ephemeral multi-agent workspace
//! with an ordered event log and a state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::MementoError;
use crate::ids::{AgentId, CheckpointId, SessionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Working,
    Broken,
    Coordinating,
    Completed,
}

impl SessionState {
    /// Enumerates the legal edges of the session state machine (spec
    /// §4.9). `Completed` is terminal.
    pub fn can_transition_to(self, to: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, to),
            (Working, Broken)
                | (Working, Coordinating)
                | (Working, Completed)
                | (Broken, Working)
                | (Broken, Completed)
                | (Coordinating, Working)
                | (Coordinating, Completed)
        )
    }

    /// Validates and performs a transition, carrying the `verifiedBy`
    /// provenance required on every transition.
    pub fn transition(
        self,
        to: SessionState,
        verified_by: VerifiedBy,
        confidence: f32,
    ) -> Result<StateTransition, MementoError> {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(MementoError::InputValidation(format!(
                "confidence {confidence} out of range [0,1]"
            )));
        }
        if !self.can_transition_to(to) {
            return Err(MementoError::InvalidTransition(format!(
                "{self:?} -> {to:?} is not a legal session transition"
            )));
        }
        Ok(StateTransition {
            from: self,
            to,
            verified_by,
            confidence,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifiedBy {
    Test,
    Build,
    Manual,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: SessionState,
    pub to: SessionState,
    pub verified_by: VerifiedBy,
    pub confidence: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEventType {
    Modified,
    Broke,
    Checkpoint,
    Handoff,
    TestPass,
    Start,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEvent {
    /// Monotonic, starting at 1, strictly increasing within a session
    /// (spec §3 invariant, tested as property 3 in §8).
    pub seq: u64,
    pub event_type: SessionEventType,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub change_info: Map<String, Value>,
    pub state_transition: Option<StateTransition>,
    pub impact: Option<Map<String, Value>>,
    pub actor: AgentId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: SessionId,
    pub agent_ids: Vec<AgentId>,
    pub state: SessionState,
    pub events: Vec<SessionEvent>,
    pub current_checkpoint: Option<CheckpointId>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Session {
    pub fn last_seq(&self) -> u64 {
        self.events.last().map(|e| e.seq).unwrap_or(0)
    }

    /// Appends an event, assigning the next `seq`. Callers obtain the seq
    /// from an atomic counter on the KV store in the real implementation;
    /// this mirrors that contract for in-memory/test use.
    pub fn push_event(&mut self, mut event: SessionEvent) -> u64 {
        event.seq = self.last_seq() + 1;
        let seq = event.seq;
        self.events.push(event);
        seq
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completed_is_terminal() {
        assert!(!SessionState::Completed.can_transition_to(SessionState::Working));
        assert!(!SessionState::Completed.can_transition_to(SessionState::Broken));
    }

    #[test]
    fn broken_can_return_to_working_when_verified() {
        let t = SessionState::Broken
            .transition(SessionState::Working, VerifiedBy::Test, 0.9)
            .unwrap();
        assert_eq!(t.to, SessionState::Working);
    }

    #[test]
    fn invalid_transition_is_rejected() {
        let err = SessionState::Coordinating
            .transition(SessionState::Broken, VerifiedBy::Manual, 1.0)
            .unwrap_err();
        assert!(matches!(err, MementoError::InvalidTransition(_)));
    }

    #[test]
    fn confidence_out_of_range_is_rejected() {
        let err = SessionState::Working
            .transition(SessionState::Completed, VerifiedBy::Build, 1.5)
            .unwrap_err();
        assert!(matches!(err, MementoError::InputValidation(_)));
    }

    #[test]
    fn seq_starts_at_one_and_is_strictly_increasing() {
        let mut session = Session {
            session_id: SessionId::new("s-1"),
            agent_ids: vec![AgentId::new("agent-a")],
            state: SessionState::Working,
            events: vec![],
            current_checkpoint: None,
            metadata: Map::new(),
        };
        let make_event = |event_type| SessionEvent {
            seq: 0,
            event_type,
            timestamp: Utc::now(),
            change_info: Map::new(),
            state_transition: None,
            impact: None,
            actor: AgentId::new("agent-a"),
        };
        assert_eq!(session.push_event(make_event(SessionEventType::Start)), 1);
        assert_eq!(
            session.push_event(make_event(SessionEventType::Modified)),
            2
        );
        assert_eq!(
            session.push_event(make_event(SessionEventType::Checkpoint)),
            3
        );
        let seqs: Vec<u64> = session.events.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
    }
}
