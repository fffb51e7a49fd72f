use std::fmt::Debug;
use std::time::Duration;

use futures::stream::BoxStream;
use futures::{
    StreamExt,
    TryStreamExt,
};
use kube::Resource;
use kube::api::{
    WatchEvent,
    WatchParams,
};
use kw_core::backoff::Backoff;
use kw_core::errors::*;
use kw_core::prelude::*;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::*;

use super::event_log::EventLogWriter;
use super::WatchError;
use crate::config::PollWatcherConfig;

// Resuming from resourceVersion "0" asks the apiserver for "any recent state", which is the only
// safe place to restart from once our last seen version has been compacted away
const RESTART_RESOURCE_VERSION: &str = "0";
const GONE: u16 = 410;

type WatchStream<K> = BoxStream<'static, kube::Result<WatchEvent<K>>>;

enum StreamEnd {
    Closed { events_seen: usize },
    Cancelled,
}

// The PollWatcher is the small sibling of the ObjWatcher: it watches a single resource type in a
// single namespace with a plain watch call (no informer, no cache), and records a one-line summary
// of every change in the event log for the status endpoint.  It owns its reconnect loop, so it has
// to deal with the things the kube watcher would otherwise handle for us: resuming from the last
// resourceVersion, starting over when that version is gone, and not hammering the apiserver when
// the watch keeps getting closed.
pub struct PollWatcher<K> {
    api: kube::Api<K>,
    kind: String,
    log: EventLogWriter,
    backoff: Backoff,
    max_open_attempts: u32,
    resource_version: String,
    shutdown: CancellationToken,
}

impl<K> PollWatcher<K>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug + Send + 'static,
{
    pub fn new(api: kube::Api<K>, log: EventLogWriter, config: &PollWatcherConfig, shutdown: CancellationToken) -> Self {
        PollWatcher {
            api,
            kind: K::kind(&()).to_string(),
            log,
            backoff: config.backoff,
            max_open_attempts: config.max_open_attempts,
            resource_version: RESTART_RESOURCE_VERSION.into(),
            shutdown,
        }
    }

    // Runs until cancelled (Ok) or until the watch can't be (re-)opened (Err)
    pub async fn start(mut self) -> EmptyResult {
        let mut open_failures = 0;
        let mut empty_closes = 0;

        info!("starting {} poll watcher", self.kind);
        loop {
            let stream = match self.open().await {
                None => return Ok(()),
                Some(Ok(stream)) => {
                    open_failures = 0;
                    stream
                },
                Some(Err(err)) => {
                    open_failures += 1;
                    if open_failures >= self.max_open_attempts {
                        return Err(anyhow!(err).context(WatchError::open_watch_failed(&open_failures)));
                    }

                    let delay = self.backoff.delay(open_failures);
                    warn!(
                        "could not open {} watch (attempt {open_failures}/{}), retrying in {delay:?}: {err}",
                        self.kind, self.max_open_attempts
                    );
                    if self.sleep(delay).await {
                        return Ok(());
                    }
                    continue;
                },
            };

            match self.consume(stream).await {
                StreamEnd::Cancelled => return Ok(()),
                StreamEnd::Closed { events_seen } if events_seen > 0 => {
                    empty_closes = 0;
                    debug!("{} watch closed after {events_seen} events, reconnecting", self.kind);
                },
                StreamEnd::Closed { .. } => {
                    empty_closes += 1;
                    let delay = self.backoff.delay(empty_closes);
                    debug!("{} watch closed without any events, reconnecting in {delay:?}", self.kind);
                    if self.sleep(delay).await {
                        return Ok(());
                    }
                },
            }
        }
    }

    async fn open(&self) -> Option<kube::Result<WatchStream<K>>> {
        debug!("opening {} watch at resource version {}", self.kind, self.resource_version);
        let wp = WatchParams::default();
        tokio::select! {
            _ = self.shutdown.cancelled() => None,
            res = self.api.watch(&wp, &self.resource_version) => Some(res.map(|s| s.boxed())),
        }
    }

    async fn consume(&mut self, mut stream: WatchStream<K>) -> StreamEnd {
        let mut events_seen = 0;
        loop {
            let maybe_evt = tokio::select! {
                _ = self.shutdown.cancelled() => return StreamEnd::Cancelled,
                maybe_evt = stream.try_next() => maybe_evt,
            };

            match maybe_evt {
                Ok(Some(WatchEvent::Added(obj))) => self.record(&obj, "ADDED"),
                Ok(Some(WatchEvent::Modified(obj))) => self.record(&obj, "MODIFIED"),
                Ok(Some(WatchEvent::Deleted(obj))) => self.record(&obj, "DELETED"),
                Ok(Some(WatchEvent::Bookmark(bm))) => {
                    self.resource_version = bm.metadata.resource_version;
                    continue;
                },
                Ok(Some(WatchEvent::Error(err))) => {
                    if err.code == GONE {
                        info!("{} resource version {} is too old, restarting from scratch", self.kind, self.resource_version);
                        self.resource_version = RESTART_RESOURCE_VERSION.into();
                    } else {
                        warn!("{} watch returned an error: {err:?}", self.kind);
                    }
                    break;
                },
                Ok(None) => break,
                Err(err) => {
                    warn!("{} watch stream failed: {err}", self.kind);
                    break;
                },
            }
            events_seen += 1;
        }

        StreamEnd::Closed { events_seen }
    }

    fn record(&mut self, obj: &K, action: &str) {
        if let Some(rv) = obj.resource_version() {
            self.resource_version = rv;
        }
        let entry = format!("{} '{}' {action}", self.kind, obj.namespaced_name());
        info!("{entry}");
        self.log.append(entry);
    }

    // Returns true if we were cancelled while sleeping
    async fn sleep(&self, delay: Duration) -> bool {
        tokio::select! {
            _ = self.shutdown.cancelled() => true,
            _ = tokio::time::sleep(delay) => false,
        }
    }
}
