// ==== Producer metrics ====
/// Counter for messages confirmed published (label: via = ack/watermark)
pub const PUBLISHED_MESSAGES_COUNTER: &str = "pipeline_published_messages_total";

/// Counter for publish responses by outcome (label: outcome)
pub const PUBLISH_RESPONSES_COUNTER: &str = "pipeline_publish_responses_total";

/// Counter for requests scheduled for another round
pub const RETRIED_REQUESTS_COUNTER: &str = "pipeline_retried_requests_total";

/// Counter for requests dropped as unverifiable (label: reason)
pub const UNVERIFIABLE_REQUESTS_COUNTER: &str = "pipeline_unverifiable_requests_total";

/// Counter for failed requests found published by the watermark check
pub const HIDDEN_SUCCESS_COUNTER: &str = "pipeline_hidden_successes_total";

/// Histogram for rounds needed by a guaranteed publish
pub const PUBLISH_ROUNDS_HISTOGRAM: &str = "pipeline_publish_rounds";

/// Counter for guaranteed publishes that ran out of rounds
pub const PUBLISH_ROUNDS_EXHAUSTED_COUNTER: &str = "pipeline_publish_rounds_exhausted_total";

// ==== Consumer metrics ====
/// Counter for offset commit requests sent to the broker (label: outcome)
pub const OFFSET_COMMITS_COUNTER: &str = "pipeline_offset_commits_total";

/// Counter for partition offsets skipped because the cache already had them
pub const OFFSET_COMMITS_SUPPRESSED_COUNTER: &str = "pipeline_offset_commits_suppressed_total";

/// Counter for rebalance notifications (label: phase = pre/post)
pub const REBALANCE_EVENTS_COUNTER: &str = "pipeline_rebalance_events_total";

/// Gauge for partitions currently assigned to this consumer
pub const ASSIGNED_PARTITIONS_GAUGE: &str = "pipeline_assigned_partitions";

/// Counter for consumer restarts triggered by topic refreshes
pub const CONSUMER_RESTARTS_COUNTER: &str = "pipeline_consumer_restarts_total";

/// Counter for errors returned by consumer polls (labels: level, error)
pub const CONSUMER_POLL_ERRORS_COUNTER: &str = "pipeline_consumer_poll_errors_total";

/// Counter for failures while stopping the consumer
pub const CONSUMER_STOP_ERRORS_COUNTER: &str = "pipeline_consumer_stop_errors_total";
