#![cfg_attr(coverage, feature(coverage_attribute))]
mod config;
mod event;
mod filter;
mod manager;
mod relay;
pub mod watchers;

pub use crate::config::{
    Addressing,
    PollWatcherConfig,
    RelayConfig,
    WatcherConfig,
};
pub use crate::event::{
    CanonicalWatcherEvent,
    EventType,
    Normalizer,
    RawChangeEvent,
};
pub use crate::filter::LabelFilter;
pub use crate::manager::WatchManager;
pub use crate::relay::{
    EventSink,
    RelayForwarder,
};

pub mod mock {
    #[cfg(any(test, feature = "mock"))]
    pub use crate::relay::MockEventSink;
    #[cfg(any(test, feature = "mock"))]
    pub use crate::watchers::obj_watcher::MockObjectLookup;
}

#[cfg(test)]
mod tests;
