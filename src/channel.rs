//! Session event channel for observers

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::role::AgentRole;
use crate::session::{SessionId, Transition};

/// Something that happened in a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    SessionStarted {
        session_id: SessionId,
        roles: Vec<AgentRole>,
    },
    /// A non-blank turn was added to the transcript
    TurnRecorded { speaker: String, chars: usize },
    /// The loop resolved who speaks next after `role` replied
    TransitionResolved { role: AgentRole, transition: Transition },
    /// An agent call failed; the turn was not recorded
    DispatchFailed { role: AgentRole, error: String },
    PolicyChecked { result: String },
    SessionTerminated { reason: ExitReason },
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    /// `exit` or `quit`
    UserExit,
    /// Input closed
    EndOfInput,
    /// Interrupt signal
    Interrupted,
}

/// Sending half, held by the orchestrator
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<SessionEvent>>,
}

impl EventSink {
    /// Create a sink and the receiver observers read from
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// A sink that drops everything
    pub fn none() -> Self {
        Self { tx: None }
    }

    /// Publish an event. A closed receiver is not an error.
    pub fn emit(&self, event: SessionEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.as_ref().map_or(true, |tx| tx.is_closed())
    }
}

/// Drain everything currently queued on `rx`
pub fn drain(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_creation() {
        let (sink, _rx) = EventSink::channel();
        assert!(!sink.is_closed());
        assert!(EventSink::none().is_closed());
    }

    #[test]
    fn test_emit_and_drain() {
        let (sink, mut rx) = EventSink::channel();
        sink.emit(SessionEvent::PolicyChecked {
            result: "ok".into(),
        });
        sink.emit(SessionEvent::SessionTerminated {
            reason: ExitReason::UserExit,
        });

        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], SessionEvent::SessionTerminated { .. }));
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_emit_after_receiver_dropped() {
        let (sink, rx) = EventSink::channel();
        drop(rx);
        assert!(sink.is_closed());
        sink.emit(SessionEvent::PolicyChecked {
            result: "ignored".into(),
        });
    }

    #[test]
    fn test_event_serialization() {
        let event = SessionEvent::DispatchFailed {
            role: AgentRole::Hotel,
            error: "quota".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "dispatch_failed");
        assert_eq!(json["role"], "hotel");
    }
}
