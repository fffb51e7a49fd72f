mod catalog;
mod gvr;
mod util;

pub use catalog::*;
pub use gvr::*;
pub use util::*;

use crate::errors::*;

err_impl! {KubernetesError,
    #[error("discovery failed for group version {0}")]
    DiscoveryFailed(String),
}

pub trait KubeResourceExt {
    fn namespaced_name(&self) -> String;
}

// The minimal view of an object that the watch pipeline needs: enough to identify it and decide
// which component owns it.  Everything else stays as opaque JSON.
pub trait WatchedObject {
    fn object_name(&self) -> String;
    fn object_namespace(&self) -> String;
    fn label(&self, key: &str) -> Option<&str>;
}

#[cfg(test)]
mod tests;
