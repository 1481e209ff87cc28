use std::sync::Arc;

use axum::Router;
use cleanup::Cleaner;
use config::Config;
use envconfig::Envconfig;
use eyre::Result;
use futures::future::{select, Either};
use tokio::sync::mpsc;

use harvest_common::metrics;
use harvest_common::retry::RetryPolicy;
use harvest_common::sparql::SparqlClient;
use harvest_common::task::DeltaEntry;

mod cleanup;
mod config;
mod delete;
mod error;
mod files;
mod handlers;
mod retention;
mod storage;
#[cfg(test)]
mod test_support;

async fn listen(app: Router, bind: String) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;

    axum::serve(listener, app).await?;

    Ok(())
}

/// Triggered runs are drained one at a time, so overlapping delta callbacks
/// queue up instead of racing each other on the shared graph.
async fn cleanup_loop(
    cleaner: Cleaner,
    mut triggers: mpsc::Receiver<Vec<DeltaEntry>>,
) -> Result<()> {
    while let Some(delta) = triggers.recv().await {
        cleaner.run(delta).await;
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = Config::init_from_env().expect("failed to load configuration from env");

    let store = Arc::new(
        SparqlClient::new(config.sparql_endpoint.clone()).with_retries(RetryPolicy::default()),
    );
    let cleaner = Cleaner::new(store, &config);

    let (trigger_tx, trigger_rx) = mpsc::channel(64);
    let cleanup_loop = Box::pin(cleanup_loop(cleaner, trigger_rx));

    let recorder_handle = metrics::setup_metrics_recorder();
    let app = handlers::app(trigger_tx, Some(recorder_handle));
    let http_server = Box::pin(listen(app, config.bind()));

    match select(http_server, cleanup_loop).await {
        Either::Left((listen_result, _)) => match listen_result {
            Ok(_) => {}
            Err(e) => tracing::error!("failed to start harvest-janitor http server, {}", e),
        },
        Either::Right((cleanup_result, _)) => match cleanup_result {
            Ok(_) => {}
            Err(e) => tracing::error!("harvest-janitor cleanup loop exited, {}", e),
        },
    };
}
