//! arbiter/outcome.rs
//! Result of offering one candidate to a job.

use std::fmt;

/// What happened to a registered candidate.
///
/// Runners branch on all three: only valid results may be recompressed
/// further, and some variants chain only on a new best.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum RegistrationOutcome {
    /// Verified and installed as the new best.
    Improvement,
    /// Not smaller than the current best (verified or not).
    NoImprovement,
    /// Empty, or decodes to something other than the input.
    Invalid,
}

impl RegistrationOutcome {
    pub fn is_improvement(self) -> bool {
        self == RegistrationOutcome::Improvement
    }

    /// Not proven corrupt. `NoImprovement` can be reported before any
    /// decoding happened, so this is not a proof of validity.
    pub fn is_valid(self) -> bool {
        self != RegistrationOutcome::Invalid
    }
}

impl fmt::Display for RegistrationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RegistrationOutcome::Improvement => "improvement",
            RegistrationOutcome::NoImprovement => "no improvement",
            RegistrationOutcome::Invalid => "invalid",
        };
        f.write_str(s)
    }
}
