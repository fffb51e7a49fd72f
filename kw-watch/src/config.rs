use std::fs::File;
use std::time::Duration;

use kw_core::backoff::{
    Backoff,
    DEFAULT_RECONNECT_BACKOFF,
    DEFAULT_RELAY_BACKOFF,
};
use kw_core::errors::*;
use kw_core::k8s::GroupVersion;
use kw_core::prelude::*;
use kw_core::time::humantime_duration;
use serde::Deserialize;
use url::Url;

use crate::filter::LabelFilter;

err_impl! {ConfigError,
    #[error("invalid configuration:\n  - {0}")]
    Invalid(String),
}

// How the relay target URL is assembled from the base URL and the event.  The YAML form is either
// `addressing: eventType` or `addressing: {componentPath: {contractVersion: v1, eventPath: event}}`.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum Addressing {
    #[serde(rename_all = "camelCase")]
    ComponentPath { contract_version: String, event_path: String },
    EventType,
}

impl Default for Addressing {
    fn default() -> Addressing {
        Addressing::ComponentPath {
            contract_version: DEFAULT_CONTRACT_VERSION.into(),
            event_path: DEFAULT_EVENT_PATH.into(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RelayConfig {
    pub base_url: String,
    #[serde(with = "serde_yaml::with::singleton_map")]
    pub addressing: Addressing,
    #[serde(with = "humantime_duration")]
    pub timeout: Duration,
    pub max_retries: u32,
    pub backoff: Backoff,
}

impl Default for RelayConfig {
    fn default() -> RelayConfig {
        RelayConfig {
            base_url: DEFAULT_RELAY_BASE_URL.into(),
            addressing: Addressing::default(),
            timeout: DEFAULT_RELAY_TIMEOUT,
            max_retries: DEFAULT_RELAY_MAX_RETRIES,
            backoff: DEFAULT_RELAY_BACKOFF,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PollWatcherConfig {
    pub enabled: bool,
    pub namespace: String,
    pub history_limit: usize,
    pub max_open_attempts: u32,
    pub backoff: Backoff,
}

impl Default for PollWatcherConfig {
    fn default() -> PollWatcherConfig {
        PollWatcherConfig {
            enabled: true,
            namespace: DEFAULT_POLL_NAMESPACE.into(),
            history_limit: DEFAULT_EVENT_HISTORY_LIMIT,
            max_open_attempts: DEFAULT_MAX_OPEN_ATTEMPTS,
            backoff: DEFAULT_RECONNECT_BACKOFF,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WatcherConfig {
    pub cluster_id: String,
    pub component_label: String,
    pub label_selector: LabelFilter,
    pub group_versions: Vec<GroupVersion>,
    #[serde(with = "humantime_duration")]
    pub resync_interval: Duration,
    #[serde(with = "humantime_duration")]
    pub cache_sync_timeout: Duration,
    pub relay: RelayConfig,
    pub poll_watcher: PollWatcherConfig,
}

impl Default for WatcherConfig {
    fn default() -> WatcherConfig {
        WatcherConfig {
            cluster_id: String::new(),
            component_label: APP_KUBERNETES_IO_INSTANCE_KEY.into(),
            label_selector: LabelFilter::default(),
            group_versions: DEFAULT_GROUP_VERSIONS
                .iter()
                .filter_map(|gv| GroupVersion::parse(gv).ok())
                .collect(),
            resync_interval: DEFAULT_RESYNC_INTERVAL,
            cache_sync_timeout: DEFAULT_CACHE_SYNC_TIMEOUT,
            relay: RelayConfig::default(),
            poll_watcher: PollWatcherConfig::default(),
        }
    }
}

impl WatcherConfig {
    pub fn load(filename: &str) -> anyhow::Result<WatcherConfig> {
        let config: WatcherConfig = serde_yaml::from_reader(File::open(filename)?)?;
        config.validate()?;
        Ok(config)
    }

    // Report every problem at once, so that fixing a config file isn't a guessing game
    pub fn validate(&self) -> EmptyResult {
        let mut problems = vec![];

        if self.cluster_id.is_empty() {
            problems.push("clusterId must be set".to_string());
        }
        if self.component_label.is_empty() {
            problems.push("componentLabel must not be empty".to_string());
        }
        if self.label_selector.key.is_empty() {
            problems.push("labelSelector.key must not be empty".to_string());
        }
        if self.group_versions.is_empty() {
            problems.push("groupVersions must name at least one group version".to_string());
        }
        if self.resync_interval.is_zero() {
            problems.push("resyncInterval must be non-zero".to_string());
        }
        if self.cache_sync_timeout.is_zero() {
            problems.push("cacheSyncTimeout must be non-zero".to_string());
        }

        match Url::parse(&self.relay.base_url) {
            Ok(url) if url.cannot_be_a_base() => {
                problems.push(format!("relay.baseUrl {} cannot be used as a base URL", self.relay.base_url))
            },
            Ok(_) => (),
            Err(err) => problems.push(format!("relay.baseUrl {} is not a valid URL: {err}", self.relay.base_url)),
        }
        if let Addressing::ComponentPath { contract_version, event_path } = &self.relay.addressing {
            if contract_version.is_empty() {
                problems.push("relay.addressing.componentPath.contractVersion must not be empty".to_string());
            }
            if event_path.is_empty() {
                problems.push("relay.addressing.componentPath.eventPath must not be empty".to_string());
            }
        }
        if self.relay.timeout.is_zero() {
            problems.push("relay.timeout must be non-zero".to_string());
        }

        if self.poll_watcher.enabled {
            if self.poll_watcher.namespace.is_empty() {
                problems.push("pollWatcher.namespace must not be empty".to_string());
            }
            if self.poll_watcher.history_limit == 0 {
                problems.push("pollWatcher.historyLimit must be at least 1".to_string());
            }
            if self.poll_watcher.max_open_attempts == 0 {
                problems.push("pollWatcher.maxOpenAttempts must be at least 1".to_string());
            }
        }

        if !problems.is_empty() {
            return Err(ConfigError::invalid(&problems.join("\n  - ")));
        }
        Ok(())
    }
}
