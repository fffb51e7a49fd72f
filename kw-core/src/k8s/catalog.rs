use std::collections::BTreeMap;
use std::collections::btree_map;

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{
    APIResource,
    APIResourceList,
};
use kube::api::ApiResource;
use kube::core::ErrorResponse;
#[cfg(any(test, feature = "mock"))]
use mockall::automock;
use tracing::*;

use super::*;
use crate::constants::WATCH_VERB;

// The discovery calls we need are a small subset of what kube::Client (or kube::Discovery)
// provides; pulling them out behind a trait lets us test the catalog filtering without an
// apiserver.
#[cfg_attr(any(test, feature = "mock"), automock)]
#[async_trait]
pub trait DiscoveryClient {
    async fn server_resources_for(&self, gv: &GroupVersion) -> kube::Result<APIResourceList>;
}

#[async_trait]
impl DiscoveryClient for kube::Client {
    async fn server_resources_for(&self, gv: &GroupVersion) -> kube::Result<APIResourceList> {
        if gv.is_core() {
            self.list_core_api_resources(&gv.version).await
        } else {
            self.list_api_group_resources(&gv.api_version()).await
        }
    }
}

#[derive(Clone, Debug)]
pub struct WatchedResource {
    pub gvr: GVR,
    pub api_resource: ApiResource,
    pub namespaced: bool,
}

impl PartialEq for WatchedResource {
    fn eq(&self, other: &Self) -> bool {
        self.gvr == other.gvr && self.api_resource.kind == other.api_resource.kind && self.namespaced == other.namespaced
    }
}

// The ResourceCatalog is the set of resource kinds we're going to watch; it's built once at startup
// and never modified afterwards, so it can be shared freely without any locking.  It's keyed by the
// full GVR (never just the resource name) and kept in a BTreeMap so that iteration order, and
// therefore startup order and logging, is deterministic.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResourceCatalog {
    resources: BTreeMap<GVR, WatchedResource>,
}

impl ResourceCatalog {
    pub async fn discover(
        client: &(dyn DiscoveryClient + Sync),
        group_versions: &[GroupVersion],
    ) -> anyhow::Result<ResourceCatalog> {
        let mut catalog = ResourceCatalog::default();
        for gv in group_versions {
            let resource_list = match client.server_resources_for(gv).await {
                Ok(rl) => rl,
                Err(kube::Error::Api(ErrorResponse { code: 404, .. })) => {
                    debug!("group version {gv} not present on the cluster, skipping");
                    continue;
                },
                Err(err) => {
                    return Err(anyhow::Error::from(err).context(KubernetesError::discovery_failed(&gv.to_string())));
                },
            };

            for res in resource_list.resources.iter().filter(|r| is_watchable(r)) {
                let gvr = gv.with_resource(&res.name);
                info!("resource {gvr} will be watched");
                catalog.insert(WatchedResource {
                    api_resource: gvr.api_resource(&res.kind),
                    gvr,
                    namespaced: res.namespaced,
                });
            }
        }

        if catalog.is_empty() {
            warn!("no watchable resources found in any of the configured group versions");
        }
        Ok(catalog)
    }

    pub fn get(&self, gvr: &GVR) -> Option<&WatchedResource> {
        self.resources.get(gvr)
    }

    pub fn gvrs(&self) -> impl Iterator<Item = &GVR> {
        self.resources.keys()
    }

    pub fn iter(&self) -> btree_map::Values<'_, GVR, WatchedResource> {
        self.resources.values()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub(crate) fn insert(&mut self, res: WatchedResource) {
        self.resources.insert(res.gvr.clone(), res);
    }
}

impl FromIterator<WatchedResource> for ResourceCatalog {
    fn from_iter<I: IntoIterator<Item = WatchedResource>>(iter: I) -> Self {
        let mut catalog = ResourceCatalog::default();
        for res in iter {
            catalog.insert(res);
        }
        catalog
    }
}

// Subresources (nodes/proxy, deployments/status, ...) show up in discovery with a slash in the name,
// and can't be watched on their own.
pub fn is_watchable(res: &APIResource) -> bool {
    !res.name.contains('/') && res.verbs.iter().any(|v| v == WATCH_VERB)
}
