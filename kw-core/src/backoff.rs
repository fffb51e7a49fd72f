use std::time::Duration;

use rand::Rng;
use serde::{
    Deserialize,
    Deserializer,
};

use crate::errors::*;

// Exponential backoff with "equal jitter": the nth delay is drawn uniformly from the upper half of
// min(base * 2^(n-1), max).  Keeping half of the delay fixed means the delays still grow, while the
// random half spreads out clients that all failed at the same time.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Backoff {
    base: Duration,
    max: Duration,
}

pub const DEFAULT_RELAY_BACKOFF: Backoff = Backoff {
    base: Duration::from_millis(100),
    max: Duration::from_secs(5),
};

pub const DEFAULT_RECONNECT_BACKOFF: Backoff = Backoff {
    base: Duration::from_millis(500),
    max: Duration::from_secs(30),
};

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> anyhow::Result<Backoff> {
        ensure!(!base.is_zero(), "backoff base delay must be non-zero");
        ensure!(base <= max, "backoff base delay {base:?} is larger than max delay {max:?}");
        Ok(Backoff { base, max })
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    // The un-jittered upper bound for the given (1-indexed) attempt
    pub fn ceiling(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        self.base.saturating_mul(1 << exp).min(self.max)
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        let ceiling = self.ceiling(attempt).as_millis() as u64;
        let floor = ceiling / 2;
        Duration::from_millis(rand::thread_rng().gen_range(floor..=ceiling))
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BackoffConfig {
    #[serde(with = "crate::time::humantime_duration")]
    base: Duration,
    #[serde(with = "crate::time::humantime_duration")]
    max: Duration,
}

impl<'de> Deserialize<'de> for Backoff {
    fn deserialize<D>(deserializer: D) -> Result<Backoff, D::Error>
    where
        D: Deserializer<'de>,
    {
        let cfg = BackoffConfig::deserialize(deserializer)?;
        Backoff::new(cfg.base, cfg.max).map_err(serde::de::Error::custom)
    }
}
