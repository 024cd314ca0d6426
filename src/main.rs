use std::process;
use std::sync::Arc;

use reelpress::{
    application::error::AppError,
    application::jobs::RenderJobService,
    config,
    infra::{
        archive::ArchiveStore,
        error::InfraError,
        http::{self, HttpState},
        renderer::SubprocessRenderer,
        telemetry,
        workspace::WorkspaceManager,
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

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
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let jobs = Arc::new(RenderJobService::new(
        WorkspaceManager::new(settings.renderer.scratch_dir.clone()),
        Arc::new(SubprocessRenderer::new(
            settings.renderer.command.clone(),
            settings.renderer.max_capture_bytes,
        )),
        ArchiveStore::new(settings.archive.directory.clone()),
        settings.renderer.timeout,
    ));

    let upload_body_limit = settings.uploads.max_request_bytes.get() as usize;
    let router = http::build_router(HttpState { jobs }, upload_body_limit);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target = "reelpress::serve",
        addr = %settings.server.addr,
        renderer = %settings.renderer.command.display(),
        archive = %settings.archive.directory.display(),
        "listening"
    );

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to install shutdown signal handler");
        return;
    }
    info!(target = "reelpress::serve", "shutdown signal received");
}
