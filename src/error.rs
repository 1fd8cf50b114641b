//! Internal failure taxonomy. None of these are surfaced to callers as
//! `Result`s — they exist for debug tracing only, since every one of them
//! has a well-defined silent fallback (see the call sites that reference
//! this enum).

use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
    /// A programmer error: caller violated a documented precondition
    /// (e.g. zero-distance `compute_acc_to_stop`). Enforced by `assert!`,
    /// not recovered from.
    PreconditionViolation,
    /// An agent has no pose at the requested timestamp; its contribution
    /// is skipped for that step.
    NoPrediction,
    /// A mode's search interval collapsed to empty; the documented
    /// fallback interval was used instead.
    DegenerateBounds,
    /// The survival term underflowed to zero; further risk contributions
    /// at that step stop mattering.
    NumericUnderflow,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::PreconditionViolation => "precondition violation",
            FailureKind::NoPrediction => "no prediction available",
            FailureKind::DegenerateBounds => "degenerate search bounds",
            FailureKind::NumericUnderflow => "numeric underflow",
        };
        f.write_str(s)
    }
}
