pub mod guarantee;
pub mod outcome;
pub mod publish;
pub mod request;
pub mod retry_handler;
pub mod stats;
pub mod watermark;

pub use guarantee::{AmbiguousOutcomePolicy, PublishGuarantee};
pub use outcome::{FailureKind, PublishOutcome, PublishResponse};
pub use publish::{publish_with_guarantee, PublishOptions, PublishReport};
pub use request::PublishRequest;
pub use retry_handler::{RetryHandler, RetryState, UnverifiableRequest};
pub use stats::{Stat, StatsTable};
pub use watermark::{Reconciliation, UnverifiableReason, WatermarkReconciler};
