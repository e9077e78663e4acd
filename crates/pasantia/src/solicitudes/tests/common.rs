use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{header, Request};
use axum::response::Response;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use tempfile::TempDir;

use crate::db;
use crate::notifications::{EmailMessage, NotificationError, NotificationService, Notifier};
use crate::solicitudes::domain::{
    Application, ApplicationId, ApplicationNumber, ApplicationState, ApplicationSummary,
    Attachment, AttachmentId, Certification, HistoryEntry, IncomingFile, NewApplication,
};
use crate::solicitudes::numbering::FixedClock;
use crate::solicitudes::repository::{CorrectionCycle, RepositoryError, SolicitudRepository};
use crate::solicitudes::sqlite::SqliteSolicitudRepository;
use crate::solicitudes::validation::UploadPolicy;
use crate::solicitudes::{application_router, SolicitudService};
use crate::storage::{FileStore, StoredFile};

pub(super) const BOUNDARY: &str = "pasantia-test-boundary";

/// Captures every message; optionally fails each send.
#[derive(Default)]
pub(super) struct RecordingNotifier {
    sent: Mutex<Vec<EmailMessage>>,
    failing: bool,
}

impl RecordingNotifier {
    pub(super) fn failing() -> Self {
        Self {
            sent: Mutex::default(),
            failing: true,
        }
    }

    pub(super) fn messages(&self) -> Vec<EmailMessage> {
        self.sent.lock().expect("notifier lock").clone()
    }
}

impl Notifier for RecordingNotifier {
    async fn send(&self, message: EmailMessage) -> Result<(), NotificationError> {
        if self.failing {
            return Err(NotificationError::Transport("relay refused".to_string()));
        }
        self.sent.lock().expect("notifier lock").push(message);
        Ok(())
    }
}

pub(super) type TestService = SolicitudService<SqliteSolicitudRepository, RecordingNotifier>;

pub(super) struct Harness {
    pub(super) service: Arc<TestService>,
    pub(super) notifier: Arc<RecordingNotifier>,
    pub(super) content: TempDir,
}

pub(super) fn february_2026() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 2, 14).expect("valid date")
}

pub(super) async fn build_service() -> Harness {
    build_service_with(RecordingNotifier::default(), UploadPolicy::default()).await
}

pub(super) async fn build_service_with(notifier: RecordingNotifier, policy: UploadPolicy) -> Harness {
    let pool = db::connect_in_memory().await.expect("in-memory pool");
    db::migrate(&pool).await.expect("migrations apply");

    let content = tempfile::tempdir().expect("temp dir");
    let notifier = Arc::new(notifier);
    let service = SolicitudService::new(
        Arc::new(SqliteSolicitudRepository::new(pool)),
        FileStore::new(content.path()),
        NotificationService::new(notifier.clone(), "https://registro.local"),
        policy,
    )
    .with_clock(Arc::new(FixedClock {
        date: february_2026(),
    }));

    Harness {
        service: Arc::new(service),
        notifier,
        content,
    }
}

pub(super) fn juan_perez() -> NewApplication {
    NewApplication {
        national_id: "00112345678".to_string(),
        full_name: "Juan Perez".to_string(),
        email: "juan@test.com".to_string(),
    }
}

pub(super) fn pdf(name: &str) -> IncomingFile {
    IncomingFile {
        file_name: name.to_string(),
        content_type: Some("application/pdf".to_string()),
        bytes: format!("%PDF-1.7 {name}").into_bytes(),
    }
}

pub(super) fn stored_file_count(content: &TempDir) -> usize {
    std::fs::read_dir(content.path())
        .map(|entries| entries.count())
        .unwrap_or(0)
}

/// Yields so detached notification tasks can finish.
pub(super) async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

#[derive(Clone, Copy)]
pub(super) enum Part<'a> {
    Text(&'a str, &'a str),
    File(&'a str, &'a str, &'a [u8]),
}

pub(super) fn multipart_request(uri: &str, parts: &[Part<'_>]) -> Request<Body> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                        .as_bytes(),
                );
            }
            Part::File(name, file_name, bytes) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
                body.extend_from_slice(b"\r\n");
            }
        }
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::post(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .expect("request builds")
}

pub(super) fn json_request(uri: &str, payload: &Value) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(payload).expect("json")))
        .expect("request builds")
}

pub(super) fn get_request(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).expect("request builds")
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body readable");
    serde_json::from_slice(&bytes).expect("json body")
}

pub(super) async fn read_bytes(response: Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body readable")
        .to_vec()
}

pub(super) fn router_for(harness: &Harness) -> axum::Router {
    application_router(harness.service.clone())
}

/// Store whose every call fails as if the database were down.
pub(super) struct UnavailableRepository;

fn unavailable<T>() -> Result<T, RepositoryError> {
    Err(RepositoryError::Unavailable("database offline".to_string()))
}

impl SolicitudRepository for UnavailableRepository {
    async fn latest_number(&self, _prefix: &str) -> Result<Option<ApplicationNumber>, RepositoryError> {
        unavailable()
    }

    async fn insert(
        &self,
        _draft: &NewApplication,
        _number: &ApplicationNumber,
        _files: &[StoredFile],
        _at: DateTime<Utc>,
    ) -> Result<Application, RepositoryError> {
        unavailable()
    }

    async fn find_by_number(
        &self,
        _number: &ApplicationNumber,
    ) -> Result<Option<Application>, RepositoryError> {
        unavailable()
    }

    async fn find_by_id(&self, _id: ApplicationId) -> Result<Option<Application>, RepositoryError> {
        unavailable()
    }

    async fn current_attachments(
        &self,
        _id: ApplicationId,
    ) -> Result<Vec<Attachment>, RepositoryError> {
        unavailable()
    }

    async fn history(&self, _id: ApplicationId) -> Result<Vec<HistoryEntry>, RepositoryError> {
        unavailable()
    }

    async fn certification(
        &self,
        _id: ApplicationId,
    ) -> Result<Option<Certification>, RepositoryError> {
        unavailable()
    }

    async fn summaries(&self) -> Result<Vec<ApplicationSummary>, RepositoryError> {
        unavailable()
    }

    async fn find_attachment(
        &self,
        _id: AttachmentId,
    ) -> Result<Option<Attachment>, RepositoryError> {
        unavailable()
    }

    async fn retire_current(
        &self,
        _id: ApplicationId,
        _cycle: CorrectionCycle<'_>,
    ) -> Result<HistoryEntry, RepositoryError> {
        unavailable()
    }

    async fn issue_certification(
        &self,
        _id: ApplicationId,
        _file: &StoredFile,
        _at: DateTime<Utc>,
    ) -> Result<Certification, RepositoryError> {
        unavailable()
    }

    async fn close(&self, _id: ApplicationId, _state: ApplicationState) -> Result<(), RepositoryError> {
        unavailable()
    }
}
