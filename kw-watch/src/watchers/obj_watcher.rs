use std::collections::HashMap;
use std::mem::take;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::{
    Stream,
    StreamExt,
    TryStreamExt,
};
use kube::api::ApiResource;
use kube::runtime::WatchStreamExt;
use kube::runtime::watcher::{
    Event,
    watcher,
};
use kw_core::k8s::{
    GVR,
    WatchedResource,
};
use kw_core::prelude::*;
#[cfg(any(test, feature = "mock"))]
use mockall::automock;
use tokio::sync::mpsc;
use tokio::time::{
    Instant,
    MissedTickBehavior,
};
use tokio_util::sync::CancellationToken;
use tracing::*;

use crate::event::RawChangeEvent;
use crate::filter::LabelFilter;

#[derive(Debug)]
pub struct Message {
    pub(crate) gvr: GVR,
    pub(crate) event: RawChangeEvent,
}
pub type Sender = mpsc::UnboundedSender<Message>;
pub type Receiver = mpsc::UnboundedReceiver<Message>;

pub type ObjStream = Pin<Box<dyn Stream<Item = anyhow::Result<Event<DynamicObject>>> + Send>>;

// The apiserver reports an object that drops out of a label selector as DELETED, carrying the last
// state that still matched.  The only way to tell that apart from a real deletion is to go and
// look for the object without the selector.
#[cfg_attr(any(test, feature = "mock"), automock)]
#[async_trait]
pub trait ObjectLookup {
    async fn current(&self, obj: &DynamicObject) -> anyhow::Result<Option<DynamicObject>>;
}

pub struct ApiLookup {
    client: kube::Client,
    api_resource: ApiResource,
    namespaced: bool,
}

impl ApiLookup {
    pub fn new(client: kube::Client, res: &WatchedResource) -> ApiLookup {
        ApiLookup {
            client,
            api_resource: res.api_resource.clone(),
            namespaced: res.namespaced,
        }
    }
}

#[async_trait]
impl ObjectLookup for ApiLookup {
    async fn current(&self, obj: &DynamicObject) -> anyhow::Result<Option<DynamicObject>> {
        let api: kube::Api<DynamicObject> = match obj.namespace() {
            Some(ns) if self.namespaced => kube::Api::namespaced_with(self.client.clone(), &ns, &self.api_resource),
            _ => kube::Api::all_with(self.client.clone(), &self.api_resource),
        };
        Ok(api.get_opt(&obj.name_any()).await?)
    }
}

pub fn new_with_stream(
    client: kube::Client,
    res: &WatchedResource,
    filter: &LabelFilter,
    resync_interval: Duration,
    tx: Sender,
    ready_tx: mpsc::Sender<GVR>,
    shutdown: CancellationToken,
) -> ObjWatcher {
    // The "all" api variant lists and watches across every namespace, and also works for
    // cluster-scoped resources
    let api: kube::Api<DynamicObject> = kube::Api::all_with(client.clone(), &res.api_resource);
    let stream: ObjStream = watcher(api, filter.watcher_config())
        .default_backoff()
        .map_err(|e| e.into())
        .boxed();

    let lookup = Box::new(ApiLookup::new(client, res));

    ObjWatcher::new(res.gvr.clone(), stream, lookup, filter.clone(), resync_interval, tx, ready_tx, shutdown)
}

// One ObjWatcher runs per cataloged resource kind.  The underlying kube watcher gives us a flat
// "this object now looks like X" stream; the ObjWatcher keeps its own cache of the (labeled) objects
// it has seen so it can turn that into create/update/delete notifications, and so that it can
// replay everything on a resync.
//
// The kube watcher restarts with a full relist whenever the watch can't be resumed; the relist
// comes through as Init, InitApply(obj)..., InitDone, and we diff the result against our cache so
// that changes that happened while we were disconnected are still reported.
pub struct ObjWatcher {
    gvr: GVR,
    stream: ObjStream,
    lookup: Box<dyn ObjectLookup + Send + Sync>,
    filter: LabelFilter,
    resync_interval: Duration,

    cache: HashMap<String, DynamicObject>,
    relist_buffer: HashMap<String, DynamicObject>,

    tx: Sender,
    ready_tx: mpsc::Sender<GVR>,
    is_ready: bool,
    shutdown: CancellationToken,
}

impl ObjWatcher {
    pub fn new(
        gvr: GVR,
        stream: ObjStream,
        lookup: Box<dyn ObjectLookup + Send + Sync>,
        filter: LabelFilter,
        resync_interval: Duration,
        tx: Sender,
        ready_tx: mpsc::Sender<GVR>,
        shutdown: CancellationToken,
    ) -> ObjWatcher {
        ObjWatcher {
            gvr,
            stream,
            lookup,
            filter,
            resync_interval,
            cache: HashMap::new(),
            relist_buffer: HashMap::new(),
            tx,
            ready_tx,
            is_ready: false,
            shutdown,
        }
    }

    pub async fn start(mut self) {
        let mut resync = tokio::time::interval_at(Instant::now() + self.resync_interval, self.resync_interval);
        resync.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("starting watcher for {} ({})", self.gvr, self.filter);
        loop {
            let maybe_evt = tokio::select! {
                _ = self.shutdown.cancelled() => {
                    debug!("watcher for {} shutting down", self.gvr);
                    break;
                },
                _ = resync.tick() => {
                    self.resync();
                    continue;
                },
                maybe_evt = self.stream.next() => maybe_evt,
            };

            match maybe_evt {
                Some(Ok(evt)) => self.handle_event(evt).await,
                // kube's watcher backs off and retries on its own, so these are transient
                Some(Err(err)) => warn!("watcher for {} received error on stream: {err:#}", self.gvr),
                None => {
                    warn!("watch stream for {} ended", self.gvr);
                    break;
                },
            }
        }
    }

    pub(crate) async fn handle_event(&mut self, evt: Event<DynamicObject>) {
        match evt {
            Event::Init => {
                debug!("relist started for {}", self.gvr);
                self.relist_buffer.clear();
            },
            Event::InitApply(obj) => {
                if self.filter.matches(&obj) {
                    self.relist_buffer.insert(obj.namespaced_name(), obj);
                }
            },
            Event::InitDone => self.handle_relist_done().await,
            Event::Apply(obj) => self.handle_applied(obj),
            Event::Delete(obj) => self.handle_deleted(obj).await,
        }
    }

    pub(crate) fn resync(&self) {
        debug!("resyncing {} cached objects for {}", self.cache.len(), self.gvr);
        for obj in self.cache.values() {
            self.emit(RawChangeEvent::Update { old: obj.clone(), new: obj.clone() });
        }
    }

    async fn handle_relist_done(&mut self) {
        let mut stale = take(&mut self.cache);
        let relisted = take(&mut self.relist_buffer);

        for (ns_name, obj) in relisted {
            match stale.remove(&ns_name) {
                None => self.emit(RawChangeEvent::Create(obj.clone())),
                Some(prev) if prev.resource_version() != obj.resource_version() => {
                    self.emit(RawChangeEvent::Update { old: prev, new: obj.clone() })
                },
                Some(_) => (),
            }
            self.cache.insert(ns_name, obj);
        }

        // Anything we knew about that didn't come back in the relist was either deleted or lost its
        // label while we weren't watching
        for prev in stale.into_values() {
            let evt = self.departure(prev.clone(), prev).await;
            self.emit(evt);
        }

        if !self.is_ready {
            info!("initial sync complete for {} ({} objects)", self.gvr, self.cache.len());
            if let Err(err) = self.ready_tx.try_send(self.gvr.clone()) {
                warn!("could not signal readiness for {}: {err}", self.gvr);
            }
            self.is_ready = true;
        }
    }

    fn handle_applied(&mut self, obj: DynamicObject) {
        let ns_name = obj.namespaced_name();
        if self.filter.matches(&obj) {
            let evt = match self.cache.get(&ns_name) {
                None => RawChangeEvent::Create(obj.clone()),
                Some(prev) => RawChangeEvent::Update { old: prev.clone(), new: obj.clone() },
            };
            self.cache.insert(ns_name, obj);
            self.emit(evt);
        } else if let Some(prev) = self.cache.remove(&ns_name) {
            // The object lost its label; report the change that made it disappear and then forget
            // about it.  It will come back as a Create if the label is ever re-added.
            debug!("{ns_name} no longer matches {}, dropping it", self.filter);
            self.emit(RawChangeEvent::Update { old: prev, new: obj });
        }
    }

    async fn handle_deleted(&mut self, obj: DynamicObject) {
        let ns_name = obj.namespaced_name();
        let Some(prev) = self.cache.remove(&ns_name) else {
            debug!("{ns_name} deleted but was never tracked");
            return;
        };

        let evt = if self.filter.matches(&obj) {
            self.departure(prev, obj).await
        } else {
            RawChangeEvent::Update { old: prev, new: obj }
        };
        self.emit(evt);
    }

    // A tracked object has left the filtered view; `last` is the final labeled state we were given
    // for it.  Look it up without the selector to tell a deletion apart from a removed label.
    async fn departure(&mut self, prev: DynamicObject, last: DynamicObject) -> RawChangeEvent {
        match self.lookup.current(&last).await {
            Ok(Some(current)) if !self.filter.matches(&current) => {
                debug!("{} no longer matches {}, dropping it", last.namespaced_name(), self.filter);
                RawChangeEvent::Update { old: prev, new: current }
            },
            Ok(_) => RawChangeEvent::Delete(last),
            Err(err) => {
                warn!("could not look up {}, reporting it as deleted: {err:#}", last.namespaced_name());
                RawChangeEvent::Delete(last)
            },
        }
    }

    fn emit(&self, event: RawChangeEvent) {
        if let Err(err) = self.tx.send(Message { gvr: self.gvr.clone(), event }) {
            warn!("dispatcher has stopped, dropping event for {}: {err}", self.gvr);
        }
    }
}

#[cfg(test)]
impl ObjWatcher {
    pub(crate) fn cached(&self) -> Vec<String> {
        let mut names: Vec<_> = self.cache.keys().cloned().collect();
        names.sort();
        names
    }
}
