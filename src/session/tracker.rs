use dashmap::DashMap;
use tracing::{debug, warn};

use crate::events::{BridgeEnter, Hangup, NewChannel, QueueCallerJoin, QueueCallerLeave};
use crate::identity::{resolve_caller_number, CallerSignals};

use super::types::{CallDirection, CallId, CallSession, SessionStatus};

/// Result of applying answer evidence to a session.
#[derive(Debug, Clone, Default)]
pub struct AnswerUpdate {
    /// True on the ringing → answered transition (false for replays).
    pub newly_answered: bool,
    /// Queue whose waiting depth this session stopped counting toward.
    pub dequeued_from: Option<String>,
}

/// Result of applying a queue caller-leave event.
#[derive(Debug)]
pub enum QueueLeaveOutcome {
    /// No session known for the id; leave events are idempotent no-ops.
    Ignored,
    /// The caller left the queue because an agent took the call (or the call
    /// was already answered); the session stays live.
    Connected {
        queue: String,
        was_waiting: bool,
    },
    /// The caller left the queue without ever being answered. Terminal: the
    /// session is removed and returned for best-effort reconciliation.
    Abandoned {
        session: CallSession,
        was_waiting: bool,
    },
}

/// Authoritative in-memory table of calls in flight.
///
/// All mutation happens on the engine's event pipeline; concurrent readers
/// copy fields out via the snapshot accessors.
pub struct SessionTracker {
    sessions: DashMap<CallId, CallSession>,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Number of live sessions.
    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }

    /// Copy of a single session, if live.
    pub fn get_copy(&self, id: &CallId) -> Option<CallSession> {
        self.sessions.get(id).map(|s| s.value().clone())
    }

    /// Copies of all live sessions.
    pub fn snapshot_sessions(&self) -> Vec<CallSession> {
        self.sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Whether any live session references the extension as an endpoint.
    pub fn involves_extension(&self, extension: &str) -> bool {
        self.sessions
            .iter()
            .any(|entry| entry.involves_extension(extension))
    }

    /// Resolve an event's identifiers to a live session key. Falls back to a
    /// linked-id scan when the primary id is unseen.
    fn resolve_key(&self, unique_id: &str, linked_id: Option<&str>) -> Option<CallId> {
        let primary = CallId::from(unique_id);
        if self.sessions.contains_key(&primary) {
            return Some(primary);
        }

        let linked = linked_id?;
        self.sessions
            .iter()
            .find(|entry| {
                entry.id.as_str() == linked
                    || entry
                        .linked_id
                        .as_ref()
                        .is_some_and(|l| l.as_str() == linked || l.as_str() == unique_id)
            })
            .map(|entry| entry.id.clone())
    }

    /// Apply a new-channel event: create the session on first evidence, or
    /// update identity fields in place for a duplicate. Returns true when
    /// observable state changed.
    pub fn observe_new_channel(&self, event: &NewChannel, direction: CallDirection) -> bool {
        let key = self
            .resolve_key(&event.unique_id, event.linked_id.as_deref())
            .unwrap_or_else(|| CallId::from(event.unique_id.as_str()));

        let created = !self.sessions.contains_key(&key);
        let mut session = self
            .sessions
            .entry(key.clone())
            .or_insert_with(|| CallSession::new(key.clone(), direction));

        if created {
            debug!("📞 New session {} ({:?})", key, direction);
        }

        if let Some(linked) = &event.linked_id {
            if linked != key.as_str() {
                session.linked_id = Some(CallId::from(linked.as_str()));
            }
        }
        if !event.channel.is_empty() {
            session.channel = event.channel.clone();
        }
        if let Some(source) = &event.source {
            session.source = source.clone();
        }
        if let Some(destination) = &event.destination {
            session.destination = destination.clone();
        }
        if let Some(context) = &event.context {
            session.context = context.clone();
        }

        Self::fold_identity(
            &mut session,
            event.connected_line.as_deref(),
            event.caller_id.as_deref(),
        );

        created
    }

    /// Apply answer evidence (bridge establishment or an "Up" channel state).
    pub fn observe_answer(
        &self,
        unique_id: &str,
        linked_id: Option<&str>,
        bridge: Option<&BridgeEnter>,
    ) -> Option<AnswerUpdate> {
        let key = self.resolve_key(unique_id, linked_id)?;
        let mut session = self.sessions.get_mut(&key)?;

        let newly_answered = session.status == SessionStatus::Ringing;
        if newly_answered {
            session.status = SessionStatus::Answered;
            session.answered_at = Some(chrono::Utc::now());
            debug!("📞 Session {} answered", key);
        }

        if let Some(bridge) = bridge {
            if bridge.bridge_id.is_some() {
                session.bridge_id = bridge.bridge_id.clone();
            }
            if bridge.peer_channel.is_some() {
                session.peer_channel = bridge.peer_channel.clone();
            }
            Self::fold_identity(&mut session, bridge.connected_line.as_deref(), None);
        }

        let dequeued_from = if session.counted_waiting {
            session.counted_waiting = false;
            session.queue_position = None;
            session.queue_name.clone()
        } else {
            None
        };

        Some(AnswerUpdate {
            newly_answered,
            dequeued_from,
        })
    }

    /// Fold caller-id/connected-line signals carried on a state event into
    /// the session's resolved caller number.
    pub fn observe_identity_signals(
        &self,
        unique_id: &str,
        linked_id: Option<&str>,
        connected_line: Option<&str>,
        caller_id: Option<&str>,
    ) {
        if let Some(key) = self.resolve_key(unique_id, linked_id) {
            if let Some(mut session) = self.sessions.get_mut(&key) {
                Self::fold_identity(&mut session, connected_line, caller_id);
            }
        }
    }

    /// Apply a queue caller-join: creates the session on first evidence
    /// (queue-routed calls are inbound), and records queue membership.
    /// Returns true when observable state changed.
    pub fn observe_queue_join(&self, event: &QueueCallerJoin) -> bool {
        let key = self
            .resolve_key(&event.unique_id, None)
            .unwrap_or_else(|| CallId::from(event.unique_id.as_str()));

        let mut session = self
            .sessions
            .entry(key.clone())
            .or_insert_with(|| CallSession::new(key.clone(), CallDirection::Inbound));

        session.queue_name = Some(event.queue.clone());
        session.queue_position = event.position;
        session.counted_waiting = true;

        debug!(
            "📋 Session {} joined queue {} (position {:?})",
            key, event.queue, event.position
        );
        true
    }

    /// Apply a queue caller-leave. A leave for an unknown id is a no-op; a
    /// leave for a never-answered session is terminal abandonment.
    pub fn observe_queue_leave(&self, event: &QueueCallerLeave) -> QueueLeaveOutcome {
        let Some(key) = self.resolve_key(&event.unique_id, None) else {
            debug!(
                "📋 Ignoring queue leave for unknown call {} (queue {})",
                event.unique_id, event.queue
            );
            return QueueLeaveOutcome::Ignored;
        };

        let answered = self
            .sessions
            .get(&key)
            .map(|s| s.status == SessionStatus::Answered)
            .unwrap_or(false);

        if answered {
            let mut was_waiting = false;
            if let Some(mut session) = self.sessions.get_mut(&key) {
                was_waiting = session.counted_waiting;
                session.counted_waiting = false;
                session.queue_position = None;
            }
            QueueLeaveOutcome::Connected {
                queue: event.queue.clone(),
                was_waiting,
            }
        } else {
            // Never answered: the caller gave up (or timed out) while waiting.
            match self.sessions.remove(&key) {
                Some((_, mut session)) => {
                    let was_waiting = session.counted_waiting;
                    session.counted_waiting = false;
                    session.status = SessionStatus::Terminated;
                    warn!(
                        "📋 Caller {} abandoned queue {} before answer",
                        session.id, event.queue
                    );
                    QueueLeaveOutcome::Abandoned {
                        session,
                        was_waiting,
                    }
                }
                None => QueueLeaveOutcome::Ignored,
            }
        }
    }

    /// Remove the session for a hangup and hand back the owned copy for
    /// reconciliation. Identity signals on the hangup are folded in first.
    /// Returns `None` for ids with no live session (the caller then
    /// synthesizes a record from the hangup event alone).
    pub fn terminate(&self, event: &Hangup) -> Option<CallSession> {
        let key = self.resolve_key(&event.unique_id, event.linked_id.as_deref())?;

        let (_, mut session) = self.sessions.remove(&key)?;
        session.status = SessionStatus::Terminated;

        Self::fold_identity(
            &mut session,
            event.connected_line.as_deref(),
            event.caller_id.as_deref(),
        );

        debug!("📞 Session {} terminated (cause {})", key, event.cause);
        Some(session)
    }

    fn fold_identity(
        session: &mut CallSession,
        connected_line: Option<&str>,
        caller_id: Option<&str>,
    ) {
        if session.resolved_caller_number.is_some() {
            return;
        }

        let resolved = resolve_caller_number(&CallerSignals {
            resolved: session.resolved_caller_number.as_deref(),
            connected_line,
            caller_id,
            source: (!session.source.is_empty()).then_some(session.source.as_str()),
            destination: (!session.destination.is_empty()).then_some(session.destination.as_str()),
            externally_originated: session.direction == CallDirection::Inbound,
        });

        if resolved != crate::identity::UNKNOWN_CALLER {
            session.resolved_caller_number = Some(resolved);
        }
    }
}

impl Default for SessionTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_channel(unique_id: &str) -> NewChannel {
        NewChannel {
            unique_id: unique_id.to_string(),
            channel: format!("PJSIP/anon-{unique_id}"),
            source: Some("5550100".to_string()),
            destination: Some("2001".to_string()),
            context: Some("from-trunk".to_string()),
            ..Default::default()
        }
    }

    fn hangup(unique_id: &str, cause: u16) -> Hangup {
        Hangup {
            unique_id: unique_id.to_string(),
            cause,
            ..Default::default()
        }
    }

    #[test]
    fn new_channel_creates_exactly_one_session() {
        let tracker = SessionTracker::new();

        assert!(tracker.observe_new_channel(&new_channel("1.1"), CallDirection::Inbound));
        assert!(!tracker.observe_new_channel(&new_channel("1.1"), CallDirection::Inbound));
        assert_eq!(tracker.active_count(), 1);
    }

    #[test]
    fn duplicate_new_channel_updates_fields_in_place() {
        let tracker = SessionTracker::new();
        tracker.observe_new_channel(&new_channel("1.1"), CallDirection::Inbound);

        let mut dup = new_channel("1.1");
        dup.destination = Some("2002".to_string());
        tracker.observe_new_channel(&dup, CallDirection::Inbound);

        let session = tracker.get_copy(&CallId::from("1.1")).unwrap();
        assert_eq!(session.destination, "2002");
        assert_eq!(tracker.active_count(), 1);
    }

    #[test]
    fn linked_id_resolves_to_existing_session() {
        let tracker = SessionTracker::new();
        let mut first = new_channel("1.1");
        first.linked_id = Some("1.1".to_string());
        tracker.observe_new_channel(&first, CallDirection::Inbound);

        let update = tracker.observe_answer("1.2", Some("1.1"), None);
        assert!(update.is_some_and(|u| u.newly_answered));
        assert_eq!(tracker.active_count(), 1);
        let session = tracker.get_copy(&CallId::from("1.1")).unwrap();
        assert_eq!(session.status, SessionStatus::Answered);
    }

    #[test]
    fn answer_is_idempotent() {
        let tracker = SessionTracker::new();
        tracker.observe_new_channel(&new_channel("1.1"), CallDirection::Inbound);

        assert!(tracker
            .observe_answer("1.1", None, None)
            .is_some_and(|u| u.newly_answered));
        assert!(tracker
            .observe_answer("1.1", None, None)
            .is_some_and(|u| !u.newly_answered));
    }

    #[test]
    fn answer_reports_dequeue_exactly_once() {
        let tracker = SessionTracker::new();
        tracker.observe_queue_join(&QueueCallerJoin {
            unique_id: "1.1".to_string(),
            queue: "support".to_string(),
            position: Some(1),
            count: None,
        });

        let first = tracker.observe_answer("1.1", None, None).unwrap();
        assert_eq!(first.dequeued_from.as_deref(), Some("support"));

        let second = tracker.observe_answer("1.1", None, None).unwrap();
        assert_eq!(second.dequeued_from, None);
    }

    #[test]
    fn queue_join_creates_session_when_absent() {
        let tracker = SessionTracker::new();
        tracker.observe_queue_join(&QueueCallerJoin {
            unique_id: "2.1".to_string(),
            queue: "sales".to_string(),
            position: Some(3),
            count: None,
        });

        let session = tracker.get_copy(&CallId::from("2.1")).unwrap();
        assert_eq!(session.status, SessionStatus::Ringing);
        assert_eq!(session.queue_name.as_deref(), Some("sales"));
        assert_eq!(session.queue_position, Some(3));
    }

    #[test]
    fn leave_for_unknown_id_is_a_noop() {
        let tracker = SessionTracker::new();
        let outcome = tracker.observe_queue_leave(&QueueCallerLeave {
            unique_id: "9.9".to_string(),
            queue: "sales".to_string(),
            count: None,
        });
        assert!(matches!(outcome, QueueLeaveOutcome::Ignored));
    }

    #[test]
    fn unanswered_leave_is_terminal_abandonment() {
        let tracker = SessionTracker::new();
        tracker.observe_queue_join(&QueueCallerJoin {
            unique_id: "2.2".to_string(),
            queue: "sales".to_string(),
            position: None,
            count: None,
        });

        let outcome = tracker.observe_queue_leave(&QueueCallerLeave {
            unique_id: "2.2".to_string(),
            queue: "sales".to_string(),
            count: None,
        });

        match outcome {
            QueueLeaveOutcome::Abandoned {
                session,
                was_waiting,
            } => {
                assert!(was_waiting);
                assert_eq!(session.status, SessionStatus::Terminated);
            }
            other => panic!("expected abandonment, got {:?}", other),
        }
        assert_eq!(tracker.active_count(), 0);
    }

    #[test]
    fn answered_leave_keeps_session_live() {
        let tracker = SessionTracker::new();
        tracker.observe_queue_join(&QueueCallerJoin {
            unique_id: "2.3".to_string(),
            queue: "sales".to_string(),
            position: None,
            count: None,
        });
        tracker.observe_answer("2.3", None, None);

        let outcome = tracker.observe_queue_leave(&QueueCallerLeave {
            unique_id: "2.3".to_string(),
            queue: "sales".to_string(),
            count: None,
        });

        // Waiting already released at answer time, so no double decrement.
        match outcome {
            QueueLeaveOutcome::Connected { queue, was_waiting } => {
                assert_eq!(queue, "sales");
                assert!(!was_waiting);
            }
            other => panic!("expected connected leave, got {:?}", other),
        }
        assert_eq!(tracker.active_count(), 1);
    }

    #[test]
    fn terminate_removes_session_and_returns_copy() {
        let tracker = SessionTracker::new();
        tracker.observe_new_channel(&new_channel("3.1"), CallDirection::Inbound);

        let session = tracker.terminate(&hangup("3.1", 16)).unwrap();
        assert_eq!(session.status, SessionStatus::Terminated);
        assert_eq!(tracker.active_count(), 0);
        assert!(tracker.terminate(&hangup("3.1", 16)).is_none());
    }

    #[test]
    fn resolved_caller_number_is_never_downgraded() {
        let tracker = SessionTracker::new();
        let mut first = new_channel("4.1");
        first.connected_line = Some("5550777".to_string());
        tracker.observe_new_channel(&first, CallDirection::Inbound);

        // A later, noisier event must not clobber the resolved value.
        tracker.observe_identity_signals("4.1", None, Some("1001"), Some("1001"));

        let session = tracker.get_copy(&CallId::from("4.1")).unwrap();
        assert_eq!(session.resolved_caller_number.as_deref(), Some("5550777"));
    }

    #[test]
    fn extension_involvement_checks_both_endpoints() {
        let tracker = SessionTracker::new();
        tracker.observe_new_channel(&new_channel("5.1"), CallDirection::Inbound);

        assert!(tracker.involves_extension("2001"));
        assert!(tracker.involves_extension("5550100"));
        assert!(!tracker.involves_extension("2002"));
    }
}
