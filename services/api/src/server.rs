use crate::cli::ServeArgs;
use crate::infra::{build_application_service, AppState};
use crate::routes::with_application_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use pasantia::config::AppConfig;
use pasantia::db;
use pasantia::error::AppError;
use pasantia::notifications::OutboundMail;
use pasantia::staff::StaffDirectory;
use pasantia::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry, config.environment)?;

    let pool = db::connect(&config.database).await?;
    db::migrate(&pool).await?;
    info!(database = %config.database.url, "database ready");

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
        pool: pool.clone(),
    };

    let mail = OutboundMail::from_config(&config.mail)?;
    let application_service =
        Arc::new(build_application_service(&config, pool.clone(), mail).await?);
    let directory = Arc::new(StaffDirectory::new(pool));

    let app = with_application_routes(application_service, directory)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        content_dir = %config.storage.content_dir.display(),
        "exemption request service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
