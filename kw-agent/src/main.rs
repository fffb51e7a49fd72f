mod errors;

use std::net::Ipv4Addr;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use futures::future;
use kube::Client;
use kw_core::errors::*;
use kw_core::k8s::ResourceCatalog;
use kw_core::logging;
use kw_core::prelude::*;
use kw_watch::watchers::{
    EventLogReader,
    PollWatcher,
    event_log,
};
use kw_watch::{
    RelayForwarder,
    WatchManager,
    WatcherConfig,
};
use rocket::{
    Build,
    Rocket,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::*;

use crate::errors::StatusResponseError;

#[derive(Parser, Debug)]
struct Options {
    #[arg(short, long)]
    config_file: String,

    #[arg(long, default_value = DEFAULT_STATUS_SERVER_PORT)]
    server_port: u16,

    #[arg(short, long, default_value = "info")]
    verbosity: String,
}

#[rocket::get("/events")]
fn events(log: &rocket::State<Option<EventLogReader>>) -> Result<String, StatusResponseError> {
    match log.inner() {
        Some(reader) => Ok(format!("Events on cluster: {}", reader.render())),
        None => Err(StatusResponseError::PollWatcherDisabled("the poll watcher is not enabled".into())),
    }
}

fn build_server(rkt_config: &rocket::Config, log: Option<EventLogReader>) -> Rocket<Build> {
    rocket::custom(rkt_config).mount("/", rocket::routes![events]).manage(log)
}

// Resolves only if the poll watcher stops on its own; a disabled poll watcher never does
async fn poll_watcher_exit(task: Option<JoinHandle<EmptyResult>>) -> EmptyResult {
    match task {
        Some(task) => task.await?,
        None => future::pending().await,
    }
}

#[instrument(skip_all)]
async fn run(args: Options) -> EmptyResult {
    let config = WatcherConfig::load(&args.config_file)
        .with_context(|| format!("could not load config from {}", args.config_file))?;
    let client = Client::try_default().await.context("could not create kubernetes client")?;

    let catalog = ResourceCatalog::discover(&client, &config.group_versions).await?;
    let relay = Arc::new(RelayForwarder::new(&config.relay)?);

    let shutdown = CancellationToken::new();
    let mut manager = WatchManager::start(client.clone(), &catalog, &config, relay, shutdown.clone());
    if let Err(err) = manager.wait_ready(config.cache_sync_timeout).await {
        manager.shutdown().await;
        return Err(err);
    }

    let (poll_task, log) = if config.poll_watcher.enabled {
        let (writer, reader) = event_log(config.poll_watcher.history_limit);
        let api = kube::Api::<corev1::ConfigMap>::namespaced(client, &config.poll_watcher.namespace);
        let pw = PollWatcher::new(api, writer, &config.poll_watcher, shutdown.child_token());
        (Some(tokio::spawn(pw.start())), Some(reader))
    } else {
        (None, None)
    };

    // Rocket handles SIGINT and SIGTERM itself, so the server finishing is our signal to shut down
    let rkt_config = rocket::Config {
        port: args.server_port,
        address: Ipv4Addr::UNSPECIFIED.into(),
        ..Default::default()
    };
    let server = build_server(&rkt_config, log);

    let res = tokio::select! {
        res = server.launch() => res.map(|_| ()).map_err(|err| err.into()),
        res = poll_watcher_exit(poll_task) => res.context("poll watcher stopped"),
    };

    shutdown.cancel();
    manager.shutdown().await;
    res
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Options::parse();
    logging::setup(&args.verbosity);

    if let Err(err) = run(args).await {
        skerr!(err, "kw-agent exited with an error");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

#[cfg(test)]
mod tests;
