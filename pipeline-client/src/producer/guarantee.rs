use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PublishGuarantee {
    /// Anything without a success response is resent.
    AtLeastOnce,
    /// Failed requests are reconciled against broker watermarks before a resend.
    #[default]
    ExactlyOnce,
}

impl FromStr for PublishGuarantee {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "at_least_once" => Ok(PublishGuarantee::AtLeastOnce),
            "exactly_once" | "exact_once" => Ok(PublishGuarantee::ExactlyOnce),
            _ => Err(format!("Unknown publish guarantee: {s}")),
        }
    }
}

impl fmt::Display for PublishGuarantee {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublishGuarantee::AtLeastOnce => write!(f, "at_least_once"),
            PublishGuarantee::ExactlyOnce => write!(f, "exactly_once"),
        }
    }
}

/// What exactly-once reconciliation does when the watermark query fails for a
/// reason other than missing metadata.
///
/// `Drop` accepts a possible loss over a duplicate, since a duplicate cannot be
/// removed downstream. `Retry` flips that tradeoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AmbiguousOutcomePolicy {
    #[default]
    Drop,
    Retry,
}

impl FromStr for AmbiguousOutcomePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "drop" => Ok(AmbiguousOutcomePolicy::Drop),
            "retry" => Ok(AmbiguousOutcomePolicy::Retry),
            _ => Err(format!("Unknown ambiguous outcome policy: {s}")),
        }
    }
}

impl fmt::Display for AmbiguousOutcomePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AmbiguousOutcomePolicy::Drop => write!(f, "drop"),
            AmbiguousOutcomePolicy::Retry => write!(f, "retry"),
        }
    }
}
