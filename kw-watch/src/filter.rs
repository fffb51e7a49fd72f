use std::fmt;

use kube::runtime::watcher;
use kw_core::prelude::*;
use serde::{
    Deserialize,
    Serialize,
};

// Objects are only interesting to the pipeline if they carry `key=value`.  The selector is pushed
// down to the apiserver so we never list or watch anything else, but we also check it client-side,
// since an object that loses the label still shows up once on the stream (as a modification) and
// we need to notice that.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct LabelFilter {
    pub key: String,
    pub value: String,
}

impl LabelFilter {
    pub fn new(key: &str, value: &str) -> LabelFilter {
        LabelFilter { key: key.into(), value: value.into() }
    }

    pub fn selector(&self) -> String {
        format!("{}={}", self.key, self.value)
    }

    pub fn watcher_config(&self) -> watcher::Config {
        watcher::Config::default().labels(&self.selector())
    }

    pub fn matches(&self, obj: &impl WatchedObject) -> bool {
        obj.label(&self.key) == Some(self.value.as_str())
    }
}

impl Default for LabelFilter {
    fn default() -> LabelFilter {
        LabelFilter::new(DEFAULT_WATCHABLE_LABEL_KEY, DEFAULT_WATCHABLE_LABEL_VALUE)
    }
}

impl fmt::Display for LabelFilter {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.selector())
    }
}
