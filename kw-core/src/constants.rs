use std::time::Duration;

use lazy_static::lazy_static;

use crate::k8s::GVR;

// Well-known labels
pub const APP_KUBERNETES_IO_INSTANCE_KEY: &str = "app.kubernetes.io/instance";

// Watch selection
pub const DEFAULT_WATCHABLE_LABEL_KEY: &str = "kyma-watchable";
pub const DEFAULT_WATCHABLE_LABEL_VALUE: &str = "true";
pub const DEFAULT_GROUP_VERSIONS: &[&str] = &["v1", "apiextensions.k8s.io/v1"];
pub const WATCH_VERB: &str = "watch";

// Relay addressing
pub const DEFAULT_RELAY_BASE_URL: &str = "http://localhost:8082";
pub const DEFAULT_CONTRACT_VERSION: &str = "v1";
pub const DEFAULT_EVENT_PATH: &str = "event";

// Poll watcher
pub const DEFAULT_POLL_NAMESPACE: &str = "default";
pub const DEFAULT_EVENT_HISTORY_LIMIT: usize = 100;
pub const DEFAULT_MAX_OPEN_ATTEMPTS: u32 = 5;

// Timing
pub const DEFAULT_RESYNC_INTERVAL: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_CACHE_SYNC_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_RELAY_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_RELAY_MAX_RETRIES: u32 = 3;

// Server
pub const DEFAULT_STATUS_SERVER_PORT: &str = "8080";

// Built-in GVRs
lazy_static! {
    pub static ref CONFIG_MAP_GVR: GVR = GVR::new("", "v1", "configmaps");
    pub static ref CRD_GVR: GVR = GVR::new("apiextensions.k8s.io", "v1", "customresourcedefinitions");
}
