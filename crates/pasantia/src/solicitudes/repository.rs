use std::future::Future;

use chrono::{DateTime, Utc};

use super::domain::{
    Application, ApplicationId, ApplicationNumber, ApplicationState, ApplicationSummary,
    Attachment, AttachmentId, Certification, HistoryEntry, NewApplication,
};
use crate::storage::StoredFile;

/// One retire-and-replace step: current attachments move into a new correction record,
/// `replacements` become the current set, and the application moves to `next_state`.
#[derive(Debug, Clone, Copy)]
pub struct CorrectionCycle<'a> {
    pub comment: &'a str,
    pub replacements: &'a [StoredFile],
    pub next_state: ApplicationState,
    pub at: DateTime<Utc>,
}

/// Storage abstraction for applications, attachments, correction history and certifications.
///
/// Every mutating method is a single unit of work: it either applies fully or not at all.
/// Mutations refuse applications that already carry a final decision.
pub trait SolicitudRepository: Send + Sync {
    /// Greatest stored number starting with `prefix`, compared lexicographically.
    fn latest_number(
        &self,
        prefix: &str,
    ) -> impl Future<Output = Result<Option<ApplicationNumber>, RepositoryError>> + Send;

    /// Persists a new application in state `New` with `files` as its current attachments.
    fn insert(
        &self,
        draft: &NewApplication,
        number: &ApplicationNumber,
        files: &[StoredFile],
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<Application, RepositoryError>> + Send;

    fn find_by_number(
        &self,
        number: &ApplicationNumber,
    ) -> impl Future<Output = Result<Option<Application>, RepositoryError>> + Send;

    fn find_by_id(
        &self,
        id: ApplicationId,
    ) -> impl Future<Output = Result<Option<Application>, RepositoryError>> + Send;

    fn current_attachments(
        &self,
        id: ApplicationId,
    ) -> impl Future<Output = Result<Vec<Attachment>, RepositoryError>> + Send;

    /// Correction records with the attachments each retired, newest first.
    fn history(
        &self,
        id: ApplicationId,
    ) -> impl Future<Output = Result<Vec<HistoryEntry>, RepositoryError>> + Send;

    fn certification(
        &self,
        id: ApplicationId,
    ) -> impl Future<Output = Result<Option<Certification>, RepositoryError>> + Send;

    fn summaries(
        &self,
    ) -> impl Future<Output = Result<Vec<ApplicationSummary>, RepositoryError>> + Send;

    fn find_attachment(
        &self,
        id: AttachmentId,
    ) -> impl Future<Output = Result<Option<Attachment>, RepositoryError>> + Send;

    /// Applies a correction cycle and returns the new record with what it retired.
    fn retire_current(
        &self,
        id: ApplicationId,
        cycle: CorrectionCycle<'_>,
    ) -> impl Future<Output = Result<HistoryEntry, RepositoryError>> + Send;

    /// Records the issued certification and marks the application approved.
    fn issue_certification(
        &self,
        id: ApplicationId,
        file: &StoredFile,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<Certification, RepositoryError>> + Send;

    /// Moves the application into a final state without touching its attachments.
    fn close(
        &self,
        id: ApplicationId,
        state: ApplicationState,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record not found")]
    NotFound,
    #[error("record conflicts with an existing one: {0}")]
    Conflict(String),
    #[error("application {0} already has a final decision")]
    Finalized(ApplicationId),
    #[error("stored data is inconsistent: {0}")]
    Corrupt(String),
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound,
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                RepositoryError::Conflict(db_err.message().to_string())
            }
            _ => RepositoryError::Unavailable(err.to_string()),
        }
    }
}
