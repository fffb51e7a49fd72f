use std::fmt;

use kw_core::prelude::*;
use serde::{
    Deserialize,
    Serialize,
};

// A change observed on one of the watch streams.  The payloads are whatever the stream handed us;
// for the multiplexer that's always a DynamicObject, but anything with a name, namespace and
// labels can be normalized.
#[derive(Clone, Debug, PartialEq)]
pub enum RawChangeEvent<K = DynamicObject> {
    Create(K),
    Update { old: K, new: K },
    Delete(K),
    Generic(K),
}

impl<K> RawChangeEvent<K> {
    pub fn event_type(&self) -> EventType {
        match self {
            RawChangeEvent::Create(_) => EventType::Create,
            RawChangeEvent::Update { .. } => EventType::Update,
            RawChangeEvent::Delete(_) => EventType::Delete,
            RawChangeEvent::Generic(_) => EventType::Generic,
        }
    }

    // The most recent state of the object the event is about
    pub fn current(&self) -> &K {
        match self {
            RawChangeEvent::Create(obj)
            | RawChangeEvent::Update { new: obj, .. }
            | RawChangeEvent::Delete(obj)
            | RawChangeEvent::Generic(obj) => obj,
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Create,
    Update,
    Delete,
    Generic,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            EventType::Create => "create",
            EventType::Update => "update",
            EventType::Delete => "delete",
            EventType::Generic => "generic",
        };
        write!(f, "{s}")
    }
}

// The wire format the control plane expects; field names are part of the contract.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct CanonicalWatcherEvent {
    #[serde(rename = "skrClusterID")]
    pub cluster_id: String,
    pub namespace: String,
    pub name: String,
    pub component: String,
    #[serde(rename = "eventType")]
    pub event_type: EventType,
}

impl fmt::Display for CanonicalWatcherEvent {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {}/{} (component: {:?})", self.event_type, self.namespace, self.name, self.component)
    }
}

#[derive(Clone, Debug)]
pub struct Normalizer {
    cluster_id: String,
    component_label: String,
}

impl Normalizer {
    pub fn new(cluster_id: &str, component_label: &str) -> Normalizer {
        Normalizer {
            cluster_id: cluster_id.into(),
            component_label: component_label.into(),
        }
    }

    pub fn normalize<K: WatchedObject>(&self, evt: &RawChangeEvent<K>) -> CanonicalWatcherEvent {
        let obj = evt.current();
        CanonicalWatcherEvent {
            cluster_id: self.cluster_id.clone(),
            namespace: obj.object_namespace(),
            name: obj.object_name(),
            component: obj.label(&self.component_label).unwrap_or_default().into(),
            event_type: evt.event_type(),
        }
    }
}
