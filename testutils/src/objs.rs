use std::collections::BTreeMap;

use k8s_openapi::api::core::v1 as corev1;
use kube::api::{
    ApiResource,
    DynamicObject,
};
use rstest::fixture;
use serde_json::json;

use crate::constants::*;

pub fn watchable_labels(component: Option<&str>) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::from([(TEST_WATCHABLE_KEY.to_string(), TEST_WATCHABLE_VALUE.to_string())]);
    if let Some(c) = component {
        labels.insert(TEST_COMPONENT_LABEL_KEY.into(), c.into());
    }
    labels
}

pub fn config_map_json(name: &str, resource_version: &str, labels: &BTreeMap<String, String>) -> serde_json::Value {
    json!({
        "apiVersion": "v1",
        "kind": "ConfigMap",
        "metadata": {
            "name": name,
            "namespace": TEST_NAMESPACE,
            "resourceVersion": resource_version,
            "labels": labels,
        },
        "data": {"example": "data"},
    })
}

pub fn build_config_map(name: &str, resource_version: &str, labels: BTreeMap<String, String>) -> DynamicObject {
    let mut obj = DynamicObject::new(name, &ApiResource::erase::<corev1::ConfigMap>(&()))
        .within(TEST_NAMESPACE)
        .data(json!({"data": {"example": "data"}}));
    obj.metadata.resource_version = Some(resource_version.into());
    obj.metadata.labels = Some(labels);
    obj
}

#[fixture]
pub fn test_config_map(#[default(TEST_CONFIG_MAP)] name: &str) -> DynamicObject {
    build_config_map(name, "1", watchable_labels(Some(TEST_COMPONENT)))
}

#[fixture]
pub fn test_unlabeled_config_map(#[default("unlabeled")] name: &str) -> DynamicObject {
    build_config_map(name, "1", BTreeMap::new())
}
