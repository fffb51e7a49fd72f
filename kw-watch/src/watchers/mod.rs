pub mod event_log;
pub mod obj_watcher;
pub mod poll_watcher;

pub use self::event_log::{
    EventLogReader,
    EventLogWriter,
    event_log,
};
pub use self::obj_watcher::{
    ApiLookup,
    ObjWatcher,
    ObjectLookup,
};
pub use self::poll_watcher::PollWatcher;

use kw_core::errors::*;

err_impl! {WatchError,
    #[error("cache sync timed out for: {0}")]
    CacheSyncTimeout(String),

    #[error("all watch streams stopped before cache sync completed for: {0}")]
    StreamsClosed(String),

    #[error("could not open watch after {0} attempts")]
    OpenWatchFailed(u32),
}

#[cfg(test)]
mod tests;
