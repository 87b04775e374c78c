use std::{collections::BTreeMap, future::IntoFuture, net::SocketAddr, process, sync::Arc};

use folio_views::{
    application::{
        error::AppError,
        provider::ViewsProvider,
        views::{ViewCountService, ViewsConfig},
    },
    config,
    infra::{
        analytics::CloudflareAnalytics,
        error::InfraError,
        http::{
            self, ApiRateLimiter, ApiState,
            api::models::{BulkViewsResponse, ViewDetail},
        },
        telemetry,
    },
};
use tokio::sync::Notify;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
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

    let subscriber = tracing_fmt()
        .with_writer(std::io::stderr)
        .with_max_level(Level::ERROR)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli().map_err(AppError::from)?;

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match cli_args.command {
        Some(config::Command::Views(args)) => run_views(settings, args).await,
        Some(config::Command::Serve(_)) | None => run_serve(settings).await,
    }
}

fn build_view_service(settings: &config::Settings) -> Result<Arc<ViewCountService>, AppError> {
    let provider = CloudflareAnalytics::from_settings(&settings.provider)?
        .map(|adapter| Arc::new(adapter) as Arc<dyn ViewsProvider>);

    let service = ViewCountService::new(ViewsConfig::from(&settings.views), provider);
    info!(
        target = "folio_views::bootstrap",
        mode = service.mode(),
        cache_ttl_secs = settings.views.cache_ttl.as_secs(),
        min_request_delay_ms = settings.views.min_request_delay.as_millis() as u64,
        fixture = %settings.views.hello_world_fixture,
        "View service ready"
    );
    Ok(Arc::new(service))
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let views = build_view_service(&settings)?;
    let state = ApiState::new(views, ApiRateLimiter::from_settings(&settings.api_rate_limit));
    let router = http::build_router(state, &settings.cors);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(
        target = "folio_views::bootstrap",
        addr = %settings.server.addr,
        "Listening"
    );

    let drain = Arc::new(Notify::new());
    let drain_signal = drain.clone();
    let server = axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { drain_signal.notified().await });
    let mut server = tokio::spawn(server.into_future());

    tokio::select! {
        joined = &mut server => return server_outcome(joined),
        _ = shutdown_signal() => {}
    }

    info!(
        target = "folio_views::bootstrap",
        grace_secs = settings.server.graceful_shutdown.as_secs(),
        "Shutdown requested; draining connections"
    );
    drain.notify_one();

    match tokio::time::timeout(settings.server.graceful_shutdown, server).await {
        Ok(joined) => server_outcome(joined),
        Err(_) => {
            warn!(
                target = "folio_views::bootstrap",
                "Graceful shutdown timed out; dropping open connections"
            );
            Ok(())
        }
    }
}

fn server_outcome(
    joined: Result<std::io::Result<()>, tokio::task::JoinError>,
) -> Result<(), AppError> {
    match joined {
        Ok(result) => result.map_err(|err| AppError::from(InfraError::from(err))),
        Err(err) => Err(AppError::unexpected(format!("server task failed: {err}"))),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

async fn run_views(settings: config::Settings, args: config::ViewsArgs) -> Result<(), AppError> {
    let views = build_view_service(&settings)?;

    let encoded = if args.detailed {
        let mut details = BTreeMap::new();
        for path in &args.paths {
            let lookup = views.lookup(path).await?;
            details.insert(
                path.clone(),
                ViewDetail {
                    views: lookup.views,
                    origin: lookup.origin,
                    cached: lookup.cached,
                },
            );
        }
        serde_json::to_string_pretty(&details)
    } else {
        let views = views.get_bulk_views(&args.paths).await;
        serde_json::to_string_pretty(&BulkViewsResponse { views })
    };
    let output =
        encoded.map_err(|err| AppError::unexpected(format!("failed to encode output: {err}")))?;

    println!("{output}");
    Ok(())
}
