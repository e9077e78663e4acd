use metrics_exporter_prometheus::PrometheusHandle;
use pasantia::config::AppConfig;
use pasantia::error::AppError;
use pasantia::notifications::{NotificationService, OutboundMail};
use pasantia::solicitudes::{SolicitudService, SqliteSolicitudRepository, UploadPolicy};
use pasantia::storage::FileStore;
use sqlx::SqlitePool;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

pub(crate) type ApiService = SolicitudService<SqliteSolicitudRepository, OutboundMail>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
    pub(crate) pool: SqlitePool,
}

/// Wires the application service against the configured database, content
/// directory and mail transport.
pub(crate) async fn build_application_service(
    config: &AppConfig,
    pool: SqlitePool,
    mail: OutboundMail,
) -> Result<ApiService, AppError> {
    let files = FileStore::new(config.storage.content_dir.clone());
    files.ensure_root().await?;

    Ok(SolicitudService::new(
        Arc::new(SqliteSolicitudRepository::new(pool)),
        files,
        NotificationService::new(Arc::new(mail), config.mail.public_url.clone()),
        UploadPolicy::new(config.storage.max_upload_bytes),
    ))
}
