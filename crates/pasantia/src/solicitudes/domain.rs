use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Comment stored on the correction record created by a citizen resubmission.
pub const RESUBMISSION_COMMENT: &str = "Actualización de documentos";

/// Database identity of an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApplicationId(pub i64);

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Human-readable `{YY}{MM}{NNN}` number handed to the citizen.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApplicationNumber(pub String);

impl ApplicationNumber {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ApplicationNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttachmentId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrectionRecordId(pub i64);

/// Lifecycle of an application. Numeric codes are what the store and the API carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApplicationState {
    New,
    PendingResponse,
    UserResponse,
    Approved,
    Rejected,
}

impl ApplicationState {
    pub const ALL: [ApplicationState; 5] = [
        ApplicationState::New,
        ApplicationState::PendingResponse,
        ApplicationState::UserResponse,
        ApplicationState::Approved,
        ApplicationState::Rejected,
    ];

    pub const fn code(self) -> i64 {
        match self {
            ApplicationState::New => 0,
            ApplicationState::PendingResponse => 1,
            ApplicationState::UserResponse => 2,
            ApplicationState::Approved => 3,
            ApplicationState::Rejected => 4,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|state| state.code() == code)
    }

    /// The one place state labels are defined; clients read them from `/api/Solicitudes/estados`.
    pub const fn label(self) -> &'static str {
        match self {
            ApplicationState::New => "Nueva",
            ApplicationState::PendingResponse => "Pendiente de respuesta",
            ApplicationState::UserResponse => "Respuesta del usuario",
            ApplicationState::Approved => "Aprobada",
            ApplicationState::Rejected => "Rechazada",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, ApplicationState::Approved | ApplicationState::Rejected)
    }

    /// State shown to citizens and staff. Any correction history reads as pending
    /// unless a final decision has been made.
    pub const fn display(self, has_history: bool) -> ApplicationState {
        if has_history && !self.is_terminal() {
            ApplicationState::PendingResponse
        } else {
            self
        }
    }
}

/// Identifying data supplied by the citizen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewApplication {
    pub national_id: String,
    pub full_name: String,
    pub email: String,
}

/// A persisted application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Application {
    pub id: ApplicationId,
    pub number: ApplicationNumber,
    pub national_id: String,
    pub full_name: String,
    pub email: String,
    pub state: ApplicationState,
    pub created_at: DateTime<Utc>,
}

/// A stored document. `correction_record_id` is set once a correction cycle retires it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attachment {
    pub id: AttachmentId,
    pub application_id: ApplicationId,
    pub correction_record_id: Option<CorrectionRecordId>,
    pub file_name: String,
    pub storage_path: String,
    pub is_current: bool,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CorrectionRecord {
    pub id: CorrectionRecordId,
    pub application_id: ApplicationId,
    pub comment: String,
    pub recorded_at: DateTime<Utc>,
}

/// A correction record together with the attachments it retired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub record: CorrectionRecord,
    pub retired: Vec<Attachment>,
}

/// The document issued when an application is approved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Certification {
    pub id: i64,
    pub application_id: ApplicationId,
    pub file_name: String,
    pub storage_path: String,
    pub content_type: String,
    pub issued_at: DateTime<Utc>,
}

/// Lightweight listing row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationSummary {
    pub id: ApplicationId,
    pub number: ApplicationNumber,
    pub full_name: String,
    pub email: String,
    pub state: ApplicationState,
    pub attachment_count: i64,
}

/// Everything the status-check page needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationDetail {
    pub application: Application,
    pub current_attachments: Vec<Attachment>,
    pub history: Vec<HistoryEntry>,
    pub certification: Option<Certification>,
}

impl ApplicationDetail {
    pub fn display_state(&self) -> ApplicationState {
        self.application.state.display(!self.history.is_empty())
    }

    pub fn view(&self) -> ApplicationDetailView {
        let display = self.display_state();
        ApplicationDetailView {
            id: self.application.id,
            number: self.application.number.clone(),
            national_id: self.application.national_id.clone(),
            full_name: self.application.full_name.clone(),
            email: self.application.email.clone(),
            state: self.application.state.code(),
            display_state: display.code(),
            display_label: display.label(),
            created_at: self.application.created_at,
            attachments: self.current_attachments.iter().map(AttachmentView::from).collect(),
            history: self
                .history
                .iter()
                .map(|entry| CorrectionRecordView {
                    id: entry.record.id,
                    comment: entry.record.comment.clone(),
                    recorded_at: entry.record.recorded_at,
                    attachments: entry.retired.iter().map(AttachmentView::from).collect(),
                })
                .collect(),
            certification: self.certification.as_ref().map(|certification| {
                CertificationView {
                    file_name: certification.file_name.clone(),
                    content_type: certification.content_type.clone(),
                    issued_at: certification.issued_at,
                }
            }),
        }
    }
}

/// Uploaded bytes before they reach the content directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatedApplicationView {
    pub id: ApplicationId,
    #[serde(rename = "numeroSolicitud")]
    pub number: ApplicationNumber,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttachmentView {
    pub id: AttachmentId,
    #[serde(rename = "nombre")]
    pub file_name: String,
    #[serde(rename = "esActual")]
    pub is_current: bool,
    #[serde(rename = "fechaSubida")]
    pub uploaded_at: DateTime<Utc>,
}

impl From<&Attachment> for AttachmentView {
    fn from(attachment: &Attachment) -> Self {
        Self {
            id: attachment.id,
            file_name: attachment.file_name.clone(),
            is_current: attachment.is_current,
            uploaded_at: attachment.uploaded_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CorrectionRecordView {
    pub id: CorrectionRecordId,
    #[serde(rename = "comentario")]
    pub comment: String,
    #[serde(rename = "fecha")]
    pub recorded_at: DateTime<Utc>,
    #[serde(rename = "archivos")]
    pub attachments: Vec<AttachmentView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CertificationView {
    #[serde(rename = "nombre")]
    pub file_name: String,
    #[serde(rename = "tipoContenido")]
    pub content_type: String,
    #[serde(rename = "fechaEmision")]
    pub issued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApplicationDetailView {
    pub id: ApplicationId,
    #[serde(rename = "numeroSolicitud")]
    pub number: ApplicationNumber,
    #[serde(rename = "cedula")]
    pub national_id: String,
    #[serde(rename = "nombre")]
    pub full_name: String,
    #[serde(rename = "correo")]
    pub email: String,
    #[serde(rename = "estado")]
    pub state: i64,
    #[serde(rename = "estadoVisible")]
    pub display_state: i64,
    #[serde(rename = "estadoTexto")]
    pub display_label: &'static str,
    #[serde(rename = "fechaCreacion")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "archivos")]
    pub attachments: Vec<AttachmentView>,
    #[serde(rename = "historial")]
    pub history: Vec<CorrectionRecordView>,
    #[serde(rename = "certificacion", skip_serializing_if = "Option::is_none")]
    pub certification: Option<CertificationView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApplicationSummaryView {
    pub id: ApplicationId,
    #[serde(rename = "numeroSolicitud")]
    pub number: ApplicationNumber,
    #[serde(rename = "nombre")]
    pub full_name: String,
    #[serde(rename = "correo")]
    pub email: String,
    #[serde(rename = "estado")]
    pub state: i64,
    #[serde(rename = "cantidadArchivos")]
    pub attachment_count: i64,
}

impl From<&ApplicationSummary> for ApplicationSummaryView {
    fn from(summary: &ApplicationSummary) -> Self {
        Self {
            id: summary.id,
            number: summary.number.clone(),
            full_name: summary.full_name.clone(),
            email: summary.email.clone(),
            state: summary.state.code(),
            attachment_count: summary.attachment_count,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StateLabelView {
    #[serde(rename = "codigo")]
    pub code: i64,
    #[serde(rename = "clave")]
    pub key: ApplicationState,
    #[serde(rename = "texto")]
    pub label: &'static str,
    #[serde(rename = "final")]
    pub terminal: bool,
}

pub fn state_catalogue() -> Vec<StateLabelView> {
    ApplicationState::ALL
        .into_iter()
        .map(|state| StateLabelView {
            code: state.code(),
            key: state,
            label: state.label(),
            terminal: state.is_terminal(),
        })
        .collect()
}
