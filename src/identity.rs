//! Caller identity resolution.
//!
//! The switch never delivers one authoritative caller number: the caller-id
//! field may echo an internal extension, the connected-line field shows up
//! late, and the raw source field is only meaningful for externally
//! originated calls. Resolution is a fixed, ordered decision table over the
//! available signals, kept free of I/O so it is unit-testable on its own.
//!
//! The ordering is load-bearing: ranking the caller-id field above the
//! connected-line field regresses externally originated calls to internal
//! extension numbers.

/// Fallback literal when no usable signal exists.
pub const UNKNOWN_CALLER: &str = "Unknown";

/// Candidate signals for one resolution pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct CallerSignals<'a> {
    /// Value already resolved on the session from an earlier, higher-priority
    /// signal. Never overwritten.
    pub resolved: Option<&'a str>,

    /// Connected-line number field.
    pub connected_line: Option<&'a str>,

    /// Caller-id number field.
    pub caller_id: Option<&'a str>,

    /// Raw switch-reported source field.
    pub source: Option<&'a str>,

    /// Raw switch-reported destination field.
    pub destination: Option<&'a str>,

    /// Whether the call's routing context marks it as externally originated.
    pub externally_originated: bool,
}

/// Sentinel values some switch versions emit instead of omitting the field.
fn is_sentinel(value: &str) -> bool {
    value.is_empty()
        || value.eq_ignore_ascii_case("unknown")
        || value.eq_ignore_ascii_case("<unknown>")
}

fn usable(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !is_sentinel(v))
}

/// Resolve the best available caller number.
///
/// Priority order:
/// 1. the session's already-resolved value,
/// 2. the connected-line number,
/// 3. the caller-id number, unless it merely echoes the raw source,
/// 4. the raw source, when source and destination differ on an externally
///    originated call,
/// 5. [`UNKNOWN_CALLER`].
pub fn resolve_caller_number(signals: &CallerSignals<'_>) -> String {
    if let Some(resolved) = usable(signals.resolved) {
        return resolved.to_string();
    }

    if let Some(connected) = usable(signals.connected_line) {
        return connected.to_string();
    }

    if let Some(caller_id) = usable(signals.caller_id) {
        if usable(signals.source) != Some(caller_id) {
            return caller_id.to_string();
        }
    }

    if signals.externally_originated {
        if let Some(source) = usable(signals.source) {
            if usable(signals.destination) != Some(source) {
                return source.to_string();
            }
        }
    }

    UNKNOWN_CALLER.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn already_resolved_value_wins() {
        let signals = CallerSignals {
            resolved: Some("5550100"),
            connected_line: Some("5550999"),
            caller_id: Some("1001"),
            ..Default::default()
        };
        assert_eq!(resolve_caller_number(&signals), "5550100");
    }

    #[test]
    fn connected_line_beats_raw_source() {
        let signals = CallerSignals {
            connected_line: Some("5550100"),
            source: Some("1001"),
            destination: Some("2002"),
            externally_originated: true,
            ..Default::default()
        };
        assert_eq!(resolve_caller_number(&signals), "5550100");
    }

    #[test]
    fn caller_id_echoing_source_is_skipped() {
        // Caller-id merely repeating the internal extension must not win;
        // the externally-originated source path takes over.
        let signals = CallerSignals {
            caller_id: Some("1001"),
            source: Some("1001"),
            destination: Some("2002"),
            externally_originated: false,
            ..Default::default()
        };
        assert_eq!(resolve_caller_number(&signals), UNKNOWN_CALLER);
    }

    #[test]
    fn caller_id_differing_from_source_is_used() {
        let signals = CallerSignals {
            caller_id: Some("5550123"),
            source: Some("1001"),
            ..Default::default()
        };
        assert_eq!(resolve_caller_number(&signals), "5550123");
    }

    #[test]
    fn external_source_used_when_endpoints_differ() {
        let signals = CallerSignals {
            source: Some("5550100"),
            destination: Some("2002"),
            externally_originated: true,
            ..Default::default()
        };
        assert_eq!(resolve_caller_number(&signals), "5550100");
    }

    #[test]
    fn internal_source_is_never_used() {
        let signals = CallerSignals {
            source: Some("1001"),
            destination: Some("2002"),
            externally_originated: false,
            ..Default::default()
        };
        assert_eq!(resolve_caller_number(&signals), UNKNOWN_CALLER);
    }

    #[test]
    fn source_equal_to_destination_is_rejected() {
        let signals = CallerSignals {
            source: Some("2002"),
            destination: Some("2002"),
            externally_originated: true,
            ..Default::default()
        };
        assert_eq!(resolve_caller_number(&signals), UNKNOWN_CALLER);
    }

    #[test]
    fn sentinel_values_are_ignored() {
        let signals = CallerSignals {
            connected_line: Some("<unknown>"),
            caller_id: Some("unknown"),
            source: Some("5550100"),
            destination: Some("2002"),
            externally_originated: true,
            ..Default::default()
        };
        assert_eq!(resolve_caller_number(&signals), "5550100");
    }

    #[test]
    fn no_signals_yields_fallback() {
        assert_eq!(
            resolve_caller_number(&CallerSignals::default()),
            UNKNOWN_CALLER
        );
    }
}
