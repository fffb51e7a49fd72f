use kube::Resource;

use super::*;
use crate::prelude::*;

impl<T: Resource> KubeResourceExt for T {
    fn namespaced_name(&self) -> String {
        match self.namespace() {
            Some(ns) => format!("{}/{}", ns, self.name_any()),
            None => self.name_any(),
        }
    }
}

impl<T: Resource> WatchedObject for T {
    fn object_name(&self) -> String {
        self.name_any()
    }

    // Cluster-scoped objects have no namespace; the relay contract wants an empty string there
    fn object_namespace(&self) -> String {
        self.namespace().unwrap_or_default()
    }

    fn label(&self, key: &str) -> Option<&str> {
        self.labels().get(key).map(String::as_str)
    }
}
