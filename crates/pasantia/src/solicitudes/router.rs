use std::sync::Arc;

use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tracing::error;

use super::domain::{
    state_catalogue, ApplicationId, ApplicationSummaryView, AttachmentId, CreatedApplicationView,
    IncomingFile, NewApplication,
};
use super::repository::{RepositoryError, SolicitudRepository};
use super::service::{DocumentContent, SolicitudService, SolicitudServiceError};
use super::validation::{
    ValidationError, FIELD_CERTIFICATION, FIELD_EMAIL, FIELD_FILES, FIELD_NAME, FIELD_NATIONAL_ID,
};
use crate::notifications::Notifier;

type SharedService<R, N> = Arc<SolicitudService<R, N>>;

/// HTTP surface for citizens and staff working on exemption applications.
///
/// `:solicitud` is the public number on citizen routes and the numeric id on staff routes.
pub fn application_router<R, N>(service: SharedService<R, N>) -> Router
where
    R: SolicitudRepository + 'static,
    N: Notifier + 'static,
{
    let body_limit = service.policy().request_body_limit();

    Router::new()
        .route(
            "/api/Solicitudes",
            get(list_handler::<R, N>).post(create_handler::<R, N>),
        )
        .route("/api/Solicitudes/estados", get(states_handler))
        .route(
            "/api/Solicitudes/archivo/:archivo_id",
            get(attachment_handler::<R, N>),
        )
        .route("/api/Solicitudes/:solicitud", get(detail_handler::<R, N>))
        .route(
            "/api/Solicitudes/:solicitud/archivos",
            post(resubmit_handler::<R, N>),
        )
        .route(
            "/api/Solicitudes/:solicitud/devolver",
            post(return_handler::<R, N>),
        )
        .route(
            "/api/Solicitudes/:solicitud/rechazar",
            post(reject_handler::<R, N>),
        )
        .route(
            "/api/Solicitudes/:solicitud/certificacion",
            get(certification_handler::<R, N>).post(approve_handler::<R, N>),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(service)
}

pub(crate) async fn create_handler<R, N>(
    State(service): State<SharedService<R, N>>,
    multipart: Multipart,
) -> Response
where
    R: SolicitudRepository + 'static,
    N: Notifier + 'static,
{
    let form = match read_form(multipart).await {
        Ok(form) => form,
        Err(err) => return multipart_error(err),
    };

    let submission = NewApplication {
        national_id: form.national_id,
        full_name: form.full_name,
        email: form.email,
    };
    match service.create(submission, form.files).await {
        Ok(application) => {
            let view = CreatedApplicationView {
                id: application.id,
                number: application.number,
            };
            (StatusCode::OK, Json(view)).into_response()
        }
        Err(err) => error_response(err),
    }
}

pub(crate) async fn detail_handler<R, N>(
    State(service): State<SharedService<R, N>>,
    Path(number): Path<String>,
) -> Response
where
    R: SolicitudRepository + 'static,
    N: Notifier + 'static,
{
    match service.detail_by_number(&number).await {
        Ok(detail) => (StatusCode::OK, Json(detail.view())).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn list_handler<R, N>(State(service): State<SharedService<R, N>>) -> Response
where
    R: SolicitudRepository + 'static,
    N: Notifier + 'static,
{
    match service.list().await {
        Ok(summaries) => {
            let views: Vec<ApplicationSummaryView> =
                summaries.iter().map(ApplicationSummaryView::from).collect();
            (StatusCode::OK, Json(views)).into_response()
        }
        Err(err) => error_response(err),
    }
}

async fn states_handler() -> Response {
    (StatusCode::OK, Json(state_catalogue())).into_response()
}

pub(crate) async fn attachment_handler<R, N>(
    State(service): State<SharedService<R, N>>,
    Path(attachment_id): Path<i64>,
) -> Response
where
    R: SolicitudRepository + 'static,
    N: Notifier + 'static,
{
    match service.attachment_content(AttachmentId(attachment_id)).await {
        Ok(content) => download(content),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn resubmit_handler<R, N>(
    State(service): State<SharedService<R, N>>,
    Path(number): Path<String>,
    multipart: Multipart,
) -> Response
where
    R: SolicitudRepository + 'static,
    N: Notifier + 'static,
{
    let form = match read_form(multipart).await {
        Ok(form) => form,
        Err(err) => return multipart_error(err),
    };

    match service.resubmit(&number, form.files).await {
        Ok(_) => StatusCode::OK.into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn return_handler<R, N>(
    State(service): State<SharedService<R, N>>,
    Path(raw_id): Path<String>,
    Json(comment): Json<String>,
) -> Response
where
    R: SolicitudRepository + 'static,
    N: Notifier + 'static,
{
    let Some(id) = parse_id(&raw_id) else {
        return not_found(&raw_id);
    };
    match service.return_for_correction(id, &comment).await {
        Ok(_) => StatusCode::OK.into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn reject_handler<R, N>(
    State(service): State<SharedService<R, N>>,
    Path(raw_id): Path<String>,
    Json(comment): Json<String>,
) -> Response
where
    R: SolicitudRepository + 'static,
    N: Notifier + 'static,
{
    let Some(id) = parse_id(&raw_id) else {
        return not_found(&raw_id);
    };
    match service.reject(id, &comment).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn approve_handler<R, N>(
    State(service): State<SharedService<R, N>>,
    Path(raw_id): Path<String>,
    multipart: Multipart,
) -> Response
where
    R: SolicitudRepository + 'static,
    N: Notifier + 'static,
{
    let Some(id) = parse_id(&raw_id) else {
        return not_found(&raw_id);
    };
    let form = match read_form(multipart).await {
        Ok(form) => form,
        Err(err) => return multipart_error(err),
    };
    let Some(certification) = form.certification else {
        return error_response(
            ValidationError::single(FIELD_CERTIFICATION, "Debe adjuntar la certificación").into(),
        );
    };

    match service.approve(id, certification).await {
        Ok(issued) => {
            let payload = json!({
                "nombre": issued.file_name,
                "fechaEmision": issued.issued_at,
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(err) => error_response(err),
    }
}

pub(crate) async fn certification_handler<R, N>(
    State(service): State<SharedService<R, N>>,
    Path(raw_id): Path<String>,
) -> Response
where
    R: SolicitudRepository + 'static,
    N: Notifier + 'static,
{
    let Some(id) = parse_id(&raw_id) else {
        return not_found(&raw_id);
    };
    match service.certification_content(id).await {
        Ok(content) => download(content),
        Err(err) => error_response(err),
    }
}

/// Text fields and files pulled out of a multipart body. Field names match
/// case-insensitively and `Archivos[]` is accepted for the file list.
#[derive(Debug, Default)]
struct UploadForm {
    national_id: String,
    full_name: String,
    email: String,
    files: Vec<IncomingFile>,
    certification: Option<IncomingFile>,
}

async fn read_form(mut multipart: Multipart) -> Result<UploadForm, MultipartError> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field
            .name()
            .unwrap_or_default()
            .trim_end_matches("[]")
            .to_ascii_lowercase();

        if name == FIELD_FILES.to_ascii_lowercase()
            || name == FIELD_CERTIFICATION.to_ascii_lowercase()
        {
            let file = IncomingFile {
                file_name: field.file_name().unwrap_or_default().to_string(),
                content_type: field.content_type().map(str::to_string),
                bytes: field.bytes().await?.to_vec(),
            };
            // Browsers send an empty part when no file was picked.
            if file.file_name.is_empty() && file.bytes.is_empty() {
                continue;
            }
            if name == FIELD_FILES.to_ascii_lowercase() {
                form.files.push(file);
            } else {
                form.certification = Some(file);
            }
        } else if name == FIELD_NATIONAL_ID.to_ascii_lowercase() {
            form.national_id = field.text().await?;
        } else if name == FIELD_NAME.to_ascii_lowercase() {
            form.full_name = field.text().await?;
        } else if name == FIELD_EMAIL.to_ascii_lowercase() {
            form.email = field.text().await?;
        }
    }

    Ok(form)
}

fn parse_id(raw: &str) -> Option<ApplicationId> {
    raw.trim().parse().ok().map(ApplicationId)
}

fn download(content: DocumentContent) -> Response {
    let content_type = HeaderValue::from_str(&content.content_type)
        .unwrap_or(HeaderValue::from_static("application/octet-stream"));
    let disposition = HeaderValue::from_str(&format!(
        "attachment; filename=\"{}\"",
        content.file_name.replace(['"', '\\'], "_")
    ))
    .unwrap_or(HeaderValue::from_static("attachment"));

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        content.bytes,
    )
        .into_response()
}

fn not_found(reference: &str) -> Response {
    let payload = json!({
        "error": format!("application '{reference}' not found"),
    });
    (StatusCode::NOT_FOUND, Json(payload)).into_response()
}

fn multipart_error(err: MultipartError) -> Response {
    let payload = json!({
        "error": err.body_text(),
    });
    (err.status(), Json(payload)).into_response()
}

pub(crate) fn error_response(err: SolicitudServiceError) -> Response {
    match err {
        SolicitudServiceError::Validation(errors) => {
            let payload = json!({
                "error": "La solicitud contiene datos inválidos",
                "errors": errors.fields(),
            });
            (StatusCode::UNPROCESSABLE_ENTITY, Json(payload)).into_response()
        }
        SolicitudServiceError::NotFound(reference) => not_found(&reference),
        SolicitudServiceError::Repository(RepositoryError::NotFound) => not_found("unknown"),
        SolicitudServiceError::Numbering(err) => {
            error!(error = %err, "application number unavailable");
            let payload = json!({
                "error": err.to_string(),
            });
            (StatusCode::SERVICE_UNAVAILABLE, Json(payload)).into_response()
        }
        err @ SolicitudServiceError::InvalidTransition { .. } => {
            let payload = json!({
                "error": err.to_string(),
            });
            (StatusCode::CONFLICT, Json(payload)).into_response()
        }
        err @ SolicitudServiceError::Repository(RepositoryError::Conflict(_)) => {
            let payload = json!({
                "error": err.to_string(),
            });
            (StatusCode::CONFLICT, Json(payload)).into_response()
        }
        SolicitudServiceError::Notification(err) => {
            error!(error = %err, "correction saved but applicant was not notified");
            let payload = json!({
                "error": "La solicitud fue devuelta pero no se pudo enviar el correo",
                "detail": err.to_string(),
            });
            (StatusCode::BAD_GATEWAY, Json(payload)).into_response()
        }
        other => {
            error!(error = %other, "application request failed");
            let payload = json!({
                "error": other.to_string(),
            });
            (StatusCode::INTERNAL_SERVER_ERROR, Json(payload)).into_response()
        }
    }
}
