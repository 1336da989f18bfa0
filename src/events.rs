//! Typed switch events and the boundary normalization step.
//!
//! The manager-protocol client delivers events as a name plus a flat bag of
//! string fields whose names vary in casing and aliasing between switch
//! versions. Everything behind this module works on one small closed set of
//! typed variants; [`SwitchEvent::from_raw`] is the single place raw fields
//! are interpreted, so bootstrap replays and live traffic share one path.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Raw event as delivered by the event source adapter: an event name and a
/// flat map of string fields.
#[derive(Debug, Clone, Default)]
pub struct RawEvent {
    pub name: String,
    pub fields: HashMap<String, String>,
}

impl RawEvent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: HashMap::new(),
        }
    }

    /// Builder-style field setter, used by adapters and tests.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Case-insensitive single-field lookup. Empty values count as absent.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
            .filter(|v| !v.is_empty())
    }

    /// First present field out of a ranked alias list.
    pub fn first_of(&self, aliases: &[&str]) -> Option<&str> {
        aliases.iter().find_map(|key| self.get(key))
    }
}

/// Field alias tables. Switch versions disagree on these names; the ordering
/// puts the canonical name first.
const UNIQUE_ID: &[&str] = &["Uniqueid", "UniqueID", "Unique-ID", "unique_id"];
const LINKED_ID: &[&str] = &["Linkedid", "LinkedID", "linked_id"];
const CHANNEL: &[&str] = &["Channel", "Channel-Name", "channel"];
const SOURCE: &[&str] = &["Source", "Src", "src"];
const DESTINATION: &[&str] = &["Exten", "Extension", "Destination", "dest"];
const CONTEXT: &[&str] = &["Context", "context"];
const CALLER_ID_NUM: &[&str] = &["CallerIDNum", "CallerIDnum", "Caller-ID-Number", "callerid"];
const CONNECTED_LINE: &[&str] = &["ConnectedLineNum", "Connectedlinenum", "Connected-Line-Number"];
const STATE_DESC: &[&str] = &["ChannelStateDesc", "State", "state"];
const CAUSE: &[&str] = &["Cause", "Hangup-Cause", "cause"];
const BRIDGE_ID: &[&str] = &["BridgeUniqueid", "BridgeId", "bridge_id"];
const PEER_CHANNEL: &[&str] = &["Peer", "PeerChannel", "Other-Leg-Channel-Name"];
const QUEUE: &[&str] = &["Queue", "queue"];
const POSITION: &[&str] = &["Position", "position"];
const COUNT: &[&str] = &["Count", "Callers", "count"];
const MEMBER: &[&str] = &["Interface", "MemberName", "Member", "Location"];
const MEMBER_STATUS: &[&str] = &["Status", "status"];
const PAUSED: &[&str] = &["Paused", "paused"];
const CALLS_TAKEN: &[&str] = &["CallsTaken", "calls_taken"];
const LAST_CALL: &[&str] = &["LastCall", "last_call"];
const COMPLETED: &[&str] = &["Completed", "completed"];
const ABANDONED: &[&str] = &["Abandoned", "abandoned"];
const SERVICE_LEVEL_PERF: &[&str] = &["ServicelevelPerf", "ServiceLevelPerf", "ServiceLevel"];
const HOLD_TIME: &[&str] = &["Holdtime", "HoldTime", "AvgHoldtime"];

/// Closed set of events the engine handles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SwitchEvent {
    NewChannel(NewChannel),
    ChannelStateChange(ChannelStateChange),
    BridgeEnter(BridgeEnter),
    Hangup(Hangup),
    QueueCallerJoin(QueueCallerJoin),
    QueueCallerLeave(QueueCallerLeave),
    QueueMemberStatus(QueueMemberStatus),
    QueueParams(QueueParams),
    QueueSummary(QueueSummary),
}

/// New channel created on the switch (first ringing evidence).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewChannel {
    pub unique_id: String,
    pub linked_id: Option<String>,
    pub channel: String,
    pub source: Option<String>,
    pub destination: Option<String>,
    pub context: Option<String>,
    pub caller_id: Option<String>,
    pub connected_line: Option<String>,
}

/// Channel state transition ("Up" marks the talking state).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelStateChange {
    pub unique_id: String,
    pub linked_id: Option<String>,
    pub state_desc: String,
    pub caller_id: Option<String>,
    pub connected_line: Option<String>,
}

impl ChannelStateChange {
    /// Whether the reported state is the answered/talking state.
    pub fn is_up(&self) -> bool {
        self.state_desc.eq_ignore_ascii_case("up")
    }
}

/// Two channels joined a bridge (answer evidence).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BridgeEnter {
    pub unique_id: String,
    pub linked_id: Option<String>,
    pub bridge_id: Option<String>,
    pub channel: Option<String>,
    pub peer_channel: Option<String>,
    pub connected_line: Option<String>,
}

/// Channel hung up. Carries enough identity fields to synthesize a record
/// even when no session was ever observed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Hangup {
    pub unique_id: String,
    pub linked_id: Option<String>,
    pub cause: u16,
    pub channel: Option<String>,
    pub source: Option<String>,
    pub destination: Option<String>,
    pub context: Option<String>,
    pub caller_id: Option<String>,
    pub connected_line: Option<String>,
}

/// Caller entered a queue.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueCallerJoin {
    pub unique_id: String,
    pub queue: String,
    pub position: Option<u32>,
    pub count: Option<u32>,
}

/// Caller left a queue (answered by an agent, abandoned, or timed out).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueCallerLeave {
    pub unique_id: String,
    pub queue: String,
    pub count: Option<u32>,
}

/// Periodic or change-driven member status report.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueMemberStatus {
    pub queue: String,
    pub member: String,
    pub status_code: u32,
    pub paused: bool,
    pub calls_taken: u32,
    pub last_call_at: Option<DateTime<Utc>>,
}

/// Periodic per-queue parameter snapshot; replaces outcome counters wholesale.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueParams {
    pub queue: String,
    pub completed: u32,
    pub abandoned: u32,
    pub service_level_percent: f64,
    pub avg_wait_seconds: u32,
}

/// Periodic per-queue summary snapshot; replaces waiting depth and wait time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueSummary {
    pub queue: String,
    pub waiting: u32,
    pub avg_wait_seconds: Option<u32>,
}

fn parse_or_default<T: std::str::FromStr + Default>(value: Option<&str>) -> T {
    value.and_then(|v| v.parse().ok()).unwrap_or_default()
}

fn parse_opt<T: std::str::FromStr>(value: Option<&str>) -> Option<T> {
    value.and_then(|v| v.parse().ok())
}

fn parse_flag(value: Option<&str>) -> bool {
    matches!(value, Some("1") | Some("true") | Some("yes"))
}

impl SwitchEvent {
    /// Normalize a raw event into a typed variant.
    ///
    /// Returns `None` for event kinds outside the handled set, and for
    /// call/queue events missing the one field nothing can be done without
    /// (the unique call id, or the queue name for queue-scoped reports).
    /// All other missing fields default best-effort.
    pub fn from_raw(raw: &RawEvent) -> Option<SwitchEvent> {
        let kind = raw.name.trim();

        if kind.eq_ignore_ascii_case("Newchannel") {
            return Some(SwitchEvent::NewChannel(NewChannel {
                unique_id: raw.first_of(UNIQUE_ID)?.to_string(),
                linked_id: raw.first_of(LINKED_ID).map(str::to_string),
                channel: raw.first_of(CHANNEL).unwrap_or_default().to_string(),
                source: raw.first_of(SOURCE).map(str::to_string),
                destination: raw.first_of(DESTINATION).map(str::to_string),
                context: raw.first_of(CONTEXT).map(str::to_string),
                caller_id: raw.first_of(CALLER_ID_NUM).map(str::to_string),
                connected_line: raw.first_of(CONNECTED_LINE).map(str::to_string),
            }));
        }

        if kind.eq_ignore_ascii_case("Newstate") {
            return Some(SwitchEvent::ChannelStateChange(ChannelStateChange {
                unique_id: raw.first_of(UNIQUE_ID)?.to_string(),
                linked_id: raw.first_of(LINKED_ID).map(str::to_string),
                state_desc: raw.first_of(STATE_DESC).unwrap_or_default().to_string(),
                caller_id: raw.first_of(CALLER_ID_NUM).map(str::to_string),
                connected_line: raw.first_of(CONNECTED_LINE).map(str::to_string),
            }));
        }

        if kind.eq_ignore_ascii_case("BridgeEnter") {
            return Some(SwitchEvent::BridgeEnter(BridgeEnter {
                unique_id: raw.first_of(UNIQUE_ID)?.to_string(),
                linked_id: raw.first_of(LINKED_ID).map(str::to_string),
                bridge_id: raw.first_of(BRIDGE_ID).map(str::to_string),
                channel: raw.first_of(CHANNEL).map(str::to_string),
                peer_channel: raw.first_of(PEER_CHANNEL).map(str::to_string),
                connected_line: raw.first_of(CONNECTED_LINE).map(str::to_string),
            }));
        }

        if kind.eq_ignore_ascii_case("Hangup") {
            return Some(SwitchEvent::Hangup(Hangup {
                unique_id: raw.first_of(UNIQUE_ID)?.to_string(),
                linked_id: raw.first_of(LINKED_ID).map(str::to_string),
                cause: parse_or_default(raw.first_of(CAUSE)),
                channel: raw.first_of(CHANNEL).map(str::to_string),
                source: raw.first_of(SOURCE).map(str::to_string),
                destination: raw.first_of(DESTINATION).map(str::to_string),
                context: raw.first_of(CONTEXT).map(str::to_string),
                caller_id: raw.first_of(CALLER_ID_NUM).map(str::to_string),
                connected_line: raw.first_of(CONNECTED_LINE).map(str::to_string),
            }));
        }

        if kind.eq_ignore_ascii_case("QueueCallerJoin") || kind.eq_ignore_ascii_case("Join") {
            return Some(SwitchEvent::QueueCallerJoin(QueueCallerJoin {
                unique_id: raw.first_of(UNIQUE_ID)?.to_string(),
                queue: raw.first_of(QUEUE)?.to_string(),
                position: parse_opt(raw.first_of(POSITION)),
                count: parse_opt(raw.first_of(COUNT)),
            }));
        }

        if kind.eq_ignore_ascii_case("QueueCallerLeave") || kind.eq_ignore_ascii_case("Leave") {
            return Some(SwitchEvent::QueueCallerLeave(QueueCallerLeave {
                unique_id: raw.first_of(UNIQUE_ID)?.to_string(),
                queue: raw.first_of(QUEUE)?.to_string(),
                count: parse_opt(raw.first_of(COUNT)),
            }));
        }

        if kind.eq_ignore_ascii_case("QueueMemberStatus") || kind.eq_ignore_ascii_case("QueueMember")
        {
            return Some(SwitchEvent::QueueMemberStatus(QueueMemberStatus {
                queue: raw.first_of(QUEUE)?.to_string(),
                member: raw.first_of(MEMBER)?.to_string(),
                status_code: parse_or_default(raw.first_of(MEMBER_STATUS)),
                paused: parse_flag(raw.first_of(PAUSED)),
                calls_taken: parse_or_default(raw.first_of(CALLS_TAKEN)),
                last_call_at: parse_opt::<i64>(raw.first_of(LAST_CALL))
                    .filter(|secs| *secs > 0)
                    .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0)),
            }));
        }

        if kind.eq_ignore_ascii_case("QueueParams") {
            return Some(SwitchEvent::QueueParams(QueueParams {
                queue: raw.first_of(QUEUE)?.to_string(),
                completed: parse_or_default(raw.first_of(COMPLETED)),
                abandoned: parse_or_default(raw.first_of(ABANDONED)),
                service_level_percent: parse_or_default(raw.first_of(SERVICE_LEVEL_PERF)),
                avg_wait_seconds: parse_or_default(raw.first_of(HOLD_TIME)),
            }));
        }

        if kind.eq_ignore_ascii_case("QueueSummary") {
            return Some(SwitchEvent::QueueSummary(QueueSummary {
                queue: raw.first_of(QUEUE)?.to_string(),
                waiting: parse_or_default(raw.first_of(COUNT)),
                avg_wait_seconds: parse_opt(raw.first_of(HOLD_TIME)),
            }));
        }

        None
    }

    /// Unique call id, for variants scoped to a single call.
    pub fn unique_id(&self) -> Option<&str> {
        match self {
            SwitchEvent::NewChannel(e) => Some(&e.unique_id),
            SwitchEvent::ChannelStateChange(e) => Some(&e.unique_id),
            SwitchEvent::BridgeEnter(e) => Some(&e.unique_id),
            SwitchEvent::Hangup(e) => Some(&e.unique_id),
            SwitchEvent::QueueCallerJoin(e) => Some(&e.unique_id),
            SwitchEvent::QueueCallerLeave(e) => Some(&e.unique_id),
            SwitchEvent::QueueMemberStatus(_)
            | SwitchEvent::QueueParams(_)
            | SwitchEvent::QueueSummary(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_lookup_is_case_insensitive() {
        let raw = RawEvent::new("Hangup")
            .with("UNIQUEID", "1700000000.42")
            .with("cause", "16");

        assert_eq!(raw.get("Uniqueid"), Some("1700000000.42"));
        assert_eq!(raw.first_of(CAUSE), Some("16"));
    }

    #[test]
    fn empty_fields_count_as_absent() {
        let raw = RawEvent::new("Newchannel")
            .with("Uniqueid", "1.1")
            .with("ConnectedLineNum", "");

        assert_eq!(raw.first_of(CONNECTED_LINE), None);
    }

    #[test]
    fn normalizes_hangup_with_aliased_fields() {
        let raw = RawEvent::new("hangup")
            .with("Unique-ID", "1700000000.7")
            .with("Hangup-Cause", "17")
            .with("Src", "5550100")
            .with("Exten", "2001");

        match SwitchEvent::from_raw(&raw) {
            Some(SwitchEvent::Hangup(h)) => {
                assert_eq!(h.unique_id, "1700000000.7");
                assert_eq!(h.cause, 17);
                assert_eq!(h.source.as_deref(), Some("5550100"));
                assert_eq!(h.destination.as_deref(), Some("2001"));
            }
            other => panic!("unexpected normalization result: {:?}", other),
        }
    }

    #[test]
    fn hangup_without_cause_defaults_to_zero() {
        let raw = RawEvent::new("Hangup").with("Uniqueid", "1.2");
        match SwitchEvent::from_raw(&raw) {
            Some(SwitchEvent::Hangup(h)) => assert_eq!(h.cause, 0),
            other => panic!("unexpected normalization result: {:?}", other),
        }
    }

    #[test]
    fn call_event_without_unique_id_is_rejected() {
        let raw = RawEvent::new("Newchannel").with("Channel", "PJSIP/2001-0001");
        assert!(SwitchEvent::from_raw(&raw).is_none());
    }

    #[test]
    fn unknown_event_kind_is_ignored() {
        let raw = RawEvent::new("MusicOnHoldStart").with("Uniqueid", "1.3");
        assert!(SwitchEvent::from_raw(&raw).is_none());
    }

    #[test]
    fn queue_join_accepts_legacy_name() {
        let raw = RawEvent::new("Join")
            .with("Uniqueid", "1.4")
            .with("Queue", "support")
            .with("Position", "2");

        match SwitchEvent::from_raw(&raw) {
            Some(SwitchEvent::QueueCallerJoin(j)) => {
                assert_eq!(j.queue, "support");
                assert_eq!(j.position, Some(2));
            }
            other => panic!("unexpected normalization result: {:?}", other),
        }
    }

    #[test]
    fn member_status_parses_paused_flag_and_last_call() {
        let raw = RawEvent::new("QueueMemberStatus")
            .with("Queue", "sales")
            .with("Interface", "PJSIP/1001")
            .with("Status", "2")
            .with("Paused", "1")
            .with("CallsTaken", "12")
            .with("LastCall", "1700000100");

        match SwitchEvent::from_raw(&raw) {
            Some(SwitchEvent::QueueMemberStatus(m)) => {
                assert!(m.paused);
                assert_eq!(m.calls_taken, 12);
                assert_eq!(m.status_code, 2);
                assert!(m.last_call_at.is_some());
            }
            other => panic!("unexpected normalization result: {:?}", other),
        }
    }

    #[test]
    fn state_up_detection_ignores_case() {
        let e = ChannelStateChange {
            state_desc: "UP".to_string(),
            ..Default::default()
        };
        assert!(e.is_up());
    }
}
