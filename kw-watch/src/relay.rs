use async_trait::async_trait;
use kw_core::backoff::Backoff;
use kw_core::errors::*;
#[cfg(any(test, feature = "mock"))]
use mockall::automock;
use reqwest::StatusCode;
use reqwest::header::CONTENT_TYPE;
use tracing::*;
use tryhard::RetryPolicy;
use url::Url;

use crate::config::{
    Addressing,
    RelayConfig,
};
use crate::event::CanonicalWatcherEvent;

err_impl! {RelayError,
    #[error("relay base URL {0} cannot have path segments appended")]
    InvalidBaseUrl(String),

    #[error("could not serialize event for {0}")]
    SerializationFailed(String),

    #[error("could not deliver event to {0}")]
    DeliveryFailed(String),
}

// Anything that can take a canonical event off our hands.  The returned string is whatever the
// receiving end said about it, which we only ever log.
#[cfg_attr(any(test, feature = "mock"), automock)]
#[async_trait]
pub trait EventSink {
    async fn deliver(&self, evt: &CanonicalWatcherEvent) -> anyhow::Result<String>;
}

// Only transport errors, where we never got a response, are safe to retry: once the control plane
// has answered, the event may have been acted on, so sending it again could duplicate it.
#[derive(Debug, Error)]
enum PostError {
    #[error("request failed before a response was received: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("could not read response body: {0}")]
    Body(#[source] reqwest::Error),
}

#[derive(Debug)]
pub struct RelayForwarder {
    client: reqwest::Client,
    base_url: Url,
    addressing: Addressing,
    max_retries: u32,
    backoff: Backoff,
}

impl RelayForwarder {
    pub fn new(config: &RelayConfig) -> anyhow::Result<RelayForwarder> {
        let base_url = Url::parse(&config.base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(RelayError::invalid_base_url(&config.base_url));
        }
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;

        Ok(RelayForwarder {
            client,
            base_url,
            addressing: config.addressing.clone(),
            max_retries: config.max_retries,
            backoff: config.backoff,
        })
    }

    pub fn target_url(&self, evt: &CanonicalWatcherEvent) -> anyhow::Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| RelayError::invalid_base_url(self.base_url.as_str()))?;

            // A trailing slash on the base URL shows up as an empty final segment
            segments.pop_if_empty();
            match &self.addressing {
                Addressing::ComponentPath { contract_version, event_path } => {
                    segments
                        .push(contract_version)
                        .push(&evt.component)
                        .extend(event_path.split('/').filter(|s| !s.is_empty()));
                },
                Addressing::EventType => {
                    segments.push(&evt.event_type.to_string());
                },
            }
        }
        Ok(url)
    }

    async fn post(&self, url: &Url, body: &[u8]) -> Result<(StatusCode, String), PostError> {
        let resp = self
            .client
            .post(url.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(body.to_vec())
            .send()
            .await
            .map_err(PostError::Transport)?;

        let status = resp.status();
        let text = resp.text().await.map_err(PostError::Body)?;
        Ok((status, text))
    }
}

#[async_trait]
impl EventSink for RelayForwarder {
    async fn deliver(&self, evt: &CanonicalWatcherEvent) -> anyhow::Result<String> {
        let body = serde_json::to_vec(evt)
            .map_err(|err| anyhow!(err).context(RelayError::serialization_failed(&format!("{evt}"))))?;
        let url = self.target_url(evt)?;

        let backoff = self.backoff;
        let res = tryhard::retry_fn(|| self.post(&url, &body))
            .retries(self.max_retries)
            .custom_backoff(|attempt, err: &PostError| match err {
                PostError::Transport(_) => {
                    let delay = backoff.delay(attempt);
                    warn!("relay to {url} failed (attempt {attempt}), retrying in {delay:?}: {err}");
                    RetryPolicy::Delay(delay)
                },
                PostError::Body(_) => RetryPolicy::Break,
            })
            .await;

        match res {
            Ok((status, text)) => {
                if status.is_success() {
                    debug!("relayed {evt} to {url}: {status}");
                } else {
                    warn!("control plane answered {status} for {evt} at {url}");
                }
                Ok(text)
            },
            Err(err) => Err(anyhow!(err).context(RelayError::delivery_failed(url.as_str()))),
        }
    }
}
