use std::fs::File;

use mk_core::errors::*;
use mk_core::prelude::*;
use serde::{
    Deserialize,
    Serialize,
};
use tokio::time::Duration;
use tracing::*;

use crate::factory::{
    ResourceFactory,
    ResourceFactoryHandler,
    builtin_factories,
};
use crate::health::HealthCheckOptions;

fn default_health_check_interval_seconds() -> u64 {
    DEFAULT_HEALTH_CHECK_INTERVAL_SECONDS
}

fn default_health_check_timeout_seconds() -> u64 {
    DEFAULT_HEALTH_CHECK_TIMEOUT_SECONDS
}

fn default_debounce_millis() -> u64 {
    DEFAULT_DEBOUNCE_MILLIS
}

fn default_event_channel_capacity() -> usize {
    DEFAULT_EVENT_CHANNEL_CAPACITY
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagerConfig {
    #[serde(default = "default_health_check_interval_seconds")]
    pub health_check_interval_seconds: u64,

    #[serde(default = "default_health_check_timeout_seconds")]
    pub health_check_timeout_seconds: u64,

    #[serde(default = "default_debounce_millis")]
    pub debounce_millis: u64,

    // Unset means follow the permission declarations however deep they go
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_permission_depth: Option<usize>,

    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    // Unset means use the built-in resource list
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<Vec<ResourceFactory>>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        ManagerConfig {
            health_check_interval_seconds: DEFAULT_HEALTH_CHECK_INTERVAL_SECONDS,
            health_check_timeout_seconds: DEFAULT_HEALTH_CHECK_TIMEOUT_SECONDS,
            debounce_millis: DEFAULT_DEBOUNCE_MILLIS,
            max_permission_depth: None,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            resources: None,
        }
    }
}

err_impl! {ConfigError,
    #[error("invalid manager config: {0}")]
    Invalid(String),
}

impl ManagerConfig {
    pub fn load(filename: &str) -> anyhow::Result<ManagerConfig> {
        let config: ManagerConfig = serde_yaml::from_reader(File::open(filename)?)?;
        config.validate()?;
        info!("loaded manager config from {filename}");
        Ok(config)
    }

    pub fn validate(&self) -> EmptyResult {
        if self.event_channel_capacity == 0 {
            return Err(ConfigError::invalid("eventChannelCapacity must be at least 1"));
        }
        if self.health_check_interval_seconds == 0 {
            return Err(ConfigError::invalid("healthCheckIntervalSeconds must be at least 1"));
        }
        Ok(())
    }

    pub fn health_check_options(&self) -> HealthCheckOptions {
        HealthCheckOptions {
            timeout: Duration::from_secs(self.health_check_timeout_seconds),
            interval: Duration::from_secs(self.health_check_interval_seconds),
        }
    }

    pub fn debounce_interval(&self) -> Duration {
        Duration::from_millis(self.debounce_millis)
    }

    pub fn factory_handler(&self) -> anyhow::Result<ResourceFactoryHandler> {
        let factories = self.resources.clone().unwrap_or_else(builtin_factories);
        Ok(ResourceFactoryHandler::new(factories)?.with_max_depth(self.max_permission_depth))
    }
}
