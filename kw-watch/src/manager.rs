use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use kw_core::k8s::{
    GVR,
    ResourceCatalog,
};
use kw_core::prelude::*;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::*;

use crate::config::WatcherConfig;
use crate::event::Normalizer;
use crate::relay::EventSink;
use crate::watchers::{
    WatchError,
    obj_watcher,
};

pub struct WatchManager {
    pending: BTreeSet<GVR>,
    ready_rx: mpsc::Receiver<GVR>,
    js: JoinSet<()>,
    shutdown: CancellationToken,
}

impl WatchManager {
    // Every watcher is spawned before this returns; call wait_ready to block until they've all
    // finished their initial list
    pub fn start(
        client: kube::Client,
        catalog: &ResourceCatalog,
        config: &WatcherConfig,
        sink: Arc<dyn EventSink + Send + Sync>,
        shutdown: CancellationToken,
    ) -> WatchManager {
        let (ready_tx, ready_rx) = mpsc::channel(catalog.len().max(1));
        let (obj_tx, obj_rx): (obj_watcher::Sender, obj_watcher::Receiver) = mpsc::unbounded_channel();

        let mut js = JoinSet::new();
        for res in catalog.iter() {
            let watcher = obj_watcher::new_with_stream(
                client.clone(),
                res,
                &config.label_selector,
                config.resync_interval,
                obj_tx.clone(),
                ready_tx.clone(),
                shutdown.child_token(),
            );
            js.spawn(watcher.start());
        }

        // The dispatcher exits once every watcher (and therefore every sender) is gone
        drop(obj_tx);
        let normalizer = Normalizer::new(&config.cluster_id, &config.component_label);
        js.spawn(dispatch(obj_rx, normalizer, sink));

        WatchManager {
            pending: catalog.gvrs().cloned().collect(),
            ready_rx,
            js,
            shutdown,
        }
    }

    pub async fn wait_ready(&mut self, timeout: Duration) -> EmptyResult {
        if self.pending.is_empty() {
            warn!("no resources to watch; nothing will be relayed");
            return Ok(());
        }

        let pending = &mut self.pending;
        let ready_rx = &mut self.ready_rx;
        let res = tokio::time::timeout(timeout, async {
            while !pending.is_empty() {
                match ready_rx.recv().await {
                    Some(gvr) => {
                        pending.remove(&gvr);
                    },
                    None => return false,
                }
            }
            true
        })
        .await;

        let unsynced = self.pending.iter().map(|gvr| gvr.to_string()).collect::<Vec<_>>().join(", ");
        match res {
            Ok(true) => {
                info!("all watchers synced");
                Ok(())
            },
            Ok(false) => Err(WatchError::streams_closed(&unsynced)),
            Err(_) => Err(WatchError::cache_sync_timeout(&format!("{unsynced} (waited {timeout:?})"))),
        }
    }

    pub async fn shutdown(&mut self) {
        info!("shutting down watchers");
        self.shutdown.cancel();
        while let Some(res) = self.js.join_next().await {
            if let Err(err) = res {
                error!("watch task failed: {err}");
            }
        }
    }
}

// All of the watch streams funnel into this one task, so events for any single object are relayed
// in the order they were observed.  Failures are per-event: we log and move on to the next one.
pub(crate) async fn dispatch(
    mut obj_rx: obj_watcher::Receiver,
    normalizer: Normalizer,
    sink: Arc<dyn EventSink + Send + Sync>,
) {
    while let Some(msg) = obj_rx.recv().await {
        let evt = normalizer.normalize(&msg.event);
        info!("relaying {} ({})", evt, msg.gvr);
        match sink.deliver(&evt).await {
            Ok(resp) => debug!("control plane response for {}/{}: {resp}", evt.namespace, evt.name),
            Err(err) => error!("dropping {evt}: {err:#}"),
        }
    }
    debug!("all watch streams closed, dispatcher exiting");
}
