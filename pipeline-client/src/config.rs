use std::time::Duration;

use common_kafka::config::{ConsumerConfig, KafkaConfig};
use envconfig::Envconfig;

use crate::producer::guarantee::{AmbiguousOutcomePolicy, PublishGuarantee};
use crate::producer::publish::PublishOptions;

#[derive(Envconfig, Clone, Debug)]
pub struct Config {
    #[envconfig(nested = true)]
    pub kafka: KafkaConfig,

    #[envconfig(nested = true)]
    pub consumer: ConsumerConfig,

    #[envconfig(default = "pipeline-client")]
    pub consumer_name: String,

    #[envconfig(default = "exactly_once")]
    pub publish_guarantee: PublishGuarantee, // at_least_once, exactly_once

    // What to do when the watermark check itself fails: drop risks loss, retry risks duplicates
    #[envconfig(default = "drop")]
    pub ambiguous_outcome_policy: AmbiguousOutcomePolicy, // drop, retry

    #[envconfig(default = "5")]
    pub max_publish_rounds: usize,

    #[envconfig(default = "5000")]
    pub watermark_timeout_ms: u64,

    #[envconfig(default = "5000")]
    pub metadata_timeout_ms: u64,

    // How long start() waits for the first partition assignment
    #[envconfig(default = "30000")]
    pub assignment_timeout_ms: u64,
}

impl Config {
    pub fn init_with_defaults() -> Result<Self, envconfig::Error> {
        ConsumerConfig::set_defaults("pipeline-client");
        Config::init_from_env()
    }

    pub fn publish_options(&self) -> PublishOptions {
        PublishOptions {
            guarantee: self.publish_guarantee,
            ambiguous_policy: self.ambiguous_outcome_policy,
            max_rounds: self.max_publish_rounds,
        }
    }

    pub fn watermark_timeout(&self) -> Duration {
        Duration::from_millis(self.watermark_timeout_ms)
    }

    pub fn metadata_timeout(&self) -> Duration {
        Duration::from_millis(self.metadata_timeout_ms)
    }

    pub fn assignment_timeout(&self) -> Duration {
        Duration::from_millis(self.assignment_timeout_ms)
    }
}
