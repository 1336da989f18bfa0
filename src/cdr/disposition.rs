//! Hangup cause classification.
//!
//! A fixed, explicit table over the switch's Q.850-style cause codes. The
//! table is provisional against any one switch's full catalogue: extend the
//! match arms here rather than adding heuristics anywhere else.

use super::Disposition;

/// Normal clearing: the called party answered and either side hung up.
pub const CAUSE_NORMAL_CLEARING: u16 = 16;
/// Normal, unspecified: treated as a clean post-answer teardown.
pub const CAUSE_NORMAL_UNSPECIFIED: u16 = 31;
/// User busy.
pub const CAUSE_USER_BUSY: u16 = 17;

/// Classify a hangup cause code into a disposition.
///
/// Codes outside the table default to `NO_ANSWER`.
pub fn classify_cause(cause: u16) -> Disposition {
    match cause {
        CAUSE_NORMAL_CLEARING | CAUSE_NORMAL_UNSPECIFIED => Disposition::Answered,
        CAUSE_USER_BUSY => Disposition::Busy,
        // Routing and network failures.
        1 // unallocated number
        | 22 // number changed
        | 27 // destination out of order
        | 28 // invalid number format
        | 34 // no circuit available
        | 38 // network out of order
        | 41 // temporary failure
        | 42 // switching equipment congestion
        | 44 // requested channel not available
        | 58 // bearer capability not available
            => Disposition::Failed,
        _ => Disposition::NoAnswer,
    }
}
