use std::{process, sync::Arc};

use dispensa::{
    config,
    dispatch::Dispatcher,
    infra::{error::InfraError, http, telemetry},
    service::CacheService,
    store::{ContentStore, LookupIndex, StoreConfig},
    util::bytes::format_bytes,
};
use thiserror::Error;
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[derive(Debug, Error)]
enum AppError {
    #[error("failed to load configuration: {0}")]
    Config(#[from] config::LoadError),
    #[error(transparent)]
    Infra(#[from] InfraError),
}

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let store_config = StoreConfig::from(&settings.storage);

    info!(
        target = "dispensa::server",
        capacity = %format_bytes(store_config.capacity_bytes),
        max_artifact = %format_bytes(store_config.max_artifact_bytes),
        shards = store_config.shard_count_normalized(),
        inline_association = settings.service.inline_association,
        max_concurrent = settings.limits.max_concurrent_requests.get(),
        "Starting artifact cache server"
    );

    let content = Arc::new(ContentStore::new(&store_config));
    let index = Arc::new(LookupIndex::new());
    let service = Arc::new(CacheService::new(
        content,
        index,
        settings.service.inline_association,
    ));
    let dispatcher = Arc::new(Dispatcher::new(
        service,
        settings.limits.max_concurrent_requests.get() as usize,
        settings.limits.request_timeout,
    ));

    let router = http::build_router(http::AppState {
        dispatch: dispatcher,
    });

    http::serve(&settings.server, router).await?;
    Ok(())
}
