pub const TEST_CLUSTER_ID: &str = "skr-1";
pub const TEST_NAMESPACE: &str = "default";
pub const TEST_CONFIG_MAP: &str = "cm1";
pub const TEST_COMPONENT: &str = "compA";
pub const TEST_COMPONENT_LABEL_KEY: &str = "instance";
pub const TEST_WATCHABLE_KEY: &str = "kyma-watchable";
pub const TEST_WATCHABLE_VALUE: &str = "true";
