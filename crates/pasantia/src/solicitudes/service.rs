use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};

use super::domain::{
    Application, ApplicationDetail, ApplicationId, ApplicationNumber, ApplicationState,
    ApplicationSummary, AttachmentId, Certification, HistoryEntry, IncomingFile, NewApplication,
    RESUBMISSION_COMMENT,
};
use super::numbering::{self, Clock, NumberingError, SystemClock};
use super::repository::{CorrectionCycle, RepositoryError, SolicitudRepository};
use super::validation::{self, UploadPolicy, ValidationError, FIELD_CERTIFICATION};
use crate::notifications::{NotificationError, NotificationService, Notifier};
use crate::storage::{FileStore, StorageError, StoredFile};

/// Bytes of a stored document ready to be streamed back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentContent {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Coordinates validation, file storage, persistence and notifications for applications.
pub struct SolicitudService<R, N> {
    repository: Arc<R>,
    files: FileStore,
    notifications: NotificationService<N>,
    policy: UploadPolicy,
    clock: Arc<dyn Clock>,
    numbering: Mutex<()>,
}

impl<R, N> SolicitudService<R, N>
where
    R: SolicitudRepository + 'static,
    N: Notifier + 'static,
{
    pub fn new(
        repository: Arc<R>,
        files: FileStore,
        notifications: NotificationService<N>,
        policy: UploadPolicy,
    ) -> Self {
        Self {
            repository,
            files,
            notifications,
            policy,
            clock: Arc::new(SystemClock),
            numbering: Mutex::new(()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn policy(&self) -> &UploadPolicy {
        &self.policy
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Registers a new application and returns it with its assigned number.
    pub async fn create(
        &self,
        submission: NewApplication,
        files: Vec<IncomingFile>,
    ) -> Result<Application, SolicitudServiceError> {
        let draft = self.policy.validate_submission(submission, &files)?;
        let stored = self.files.store_all(&files).await?;

        let application = match self.register(&draft, &stored).await {
            Ok(application) => application,
            Err(err) => {
                self.files.discard(&stored).await;
                return Err(err);
            }
        };

        info!(
            number = %application.number,
            attachments = stored.len(),
            "application registered"
        );
        self.notifications.spawn_created(application.clone());
        Ok(application)
    }

    /// Number assignment and insert happen under one lock so two submissions in the
    /// same month never read the same latest number.
    async fn register(
        &self,
        draft: &NewApplication,
        stored: &[StoredFile],
    ) -> Result<Application, SolicitudServiceError> {
        let _guard = self.numbering.lock().await;

        let prefix = numbering::period_prefix(self.clock.today());
        let latest = self.repository.latest_number(&prefix).await?;
        let number = numbering::next_number(&prefix, latest.as_ref())?;

        let application = self
            .repository
            .insert(draft, &number, stored, self.clock.now())
            .await?;
        Ok(application)
    }

    pub async fn detail_by_number(
        &self,
        number: &str,
    ) -> Result<ApplicationDetail, SolicitudServiceError> {
        let number = ApplicationNumber(number.trim().to_string());
        let application = self
            .repository
            .find_by_number(&number)
            .await?
            .ok_or_else(|| SolicitudServiceError::NotFound(number.to_string()))?;
        self.detail(application).await
    }

    pub async fn detail_by_id(
        &self,
        id: ApplicationId,
    ) -> Result<ApplicationDetail, SolicitudServiceError> {
        let application = self.require(id).await?;
        self.detail(application).await
    }

    async fn detail(
        &self,
        application: Application,
    ) -> Result<ApplicationDetail, SolicitudServiceError> {
        let current_attachments = self.repository.current_attachments(application.id).await?;
        let history = self.repository.history(application.id).await?;
        let certification = self.repository.certification(application.id).await?;
        Ok(ApplicationDetail {
            application,
            current_attachments,
            history,
            certification,
        })
    }

    pub async fn list(&self) -> Result<Vec<ApplicationSummary>, SolicitudServiceError> {
        Ok(self.repository.summaries().await?)
    }

    /// Citizen replaces their current documents; the old set is kept in history.
    pub async fn resubmit(
        &self,
        number: &str,
        files: Vec<IncomingFile>,
    ) -> Result<HistoryEntry, SolicitudServiceError> {
        self.policy.validate_documents(&files)?;

        let number = ApplicationNumber(number.trim().to_string());
        let application = self
            .repository
            .find_by_number(&number)
            .await?
            .ok_or_else(|| SolicitudServiceError::NotFound(number.to_string()))?;
        ensure_open(&application)?;

        let stored = self.files.store_all(&files).await?;
        let cycle = CorrectionCycle {
            comment: RESUBMISSION_COMMENT,
            replacements: &stored,
            next_state: ApplicationState::PendingResponse,
            at: self.clock.now(),
        };
        let entry = match self.repository.retire_current(application.id, cycle).await {
            Ok(entry) => entry,
            Err(err) => {
                self.files.discard(&stored).await;
                return Err(transition_error(&application, err));
            }
        };

        info!(
            number = %application.number,
            retired = entry.retired.len(),
            replacements = stored.len(),
            "documents resubmitted"
        );
        Ok(entry)
    }

    /// Staff send the application back; every current document is retired and the
    /// applicant is told what to fix.
    pub async fn return_for_correction(
        &self,
        id: ApplicationId,
        comment: &str,
    ) -> Result<HistoryEntry, SolicitudServiceError> {
        let comment = validation::require_comment(comment)?;
        let application = self.require(id).await?;
        ensure_open(&application)?;

        let cycle = CorrectionCycle {
            comment: &comment,
            replacements: &[],
            next_state: ApplicationState::PendingResponse,
            at: self.clock.now(),
        };
        let entry = self
            .repository
            .retire_current(id, cycle)
            .await
            .map_err(|err| transition_error(&application, err))?;

        info!(
            number = %application.number,
            retired = entry.retired.len(),
            "application returned for correction"
        );

        let notified = Application {
            state: ApplicationState::PendingResponse,
            ..application
        };
        self.notifications
            .returned_for_correction(&notified, &comment)
            .await?;
        Ok(entry)
    }

    /// Issues the certification and closes the application as approved.
    pub async fn approve(
        &self,
        id: ApplicationId,
        certification: IncomingFile,
    ) -> Result<Certification, SolicitudServiceError> {
        let mut errors = ValidationError::default();
        self.policy.check_files(
            FIELD_CERTIFICATION,
            std::slice::from_ref(&certification),
            &mut errors,
        );
        if !errors.is_empty() {
            return Err(errors.into());
        }

        let application = self.require(id).await?;
        ensure_open(&application)?;

        let stored = self.files.store(&certification).await?;
        let issued = match self
            .repository
            .issue_certification(id, &stored, self.clock.now())
            .await
        {
            Ok(issued) => issued,
            Err(err) => {
                self.files.discard(std::slice::from_ref(&stored)).await;
                return Err(transition_error(&application, err));
            }
        };

        info!(number = %application.number, file = %issued.file_name, "application approved");
        self.notifications.spawn_status_updated(
            Application {
                state: ApplicationState::Approved,
                ..application
            },
            None,
        );
        Ok(issued)
    }

    /// Closes the application as rejected, keeping its documents as they are.
    pub async fn reject(
        &self,
        id: ApplicationId,
        comment: &str,
    ) -> Result<(), SolicitudServiceError> {
        let comment = validation::require_comment(comment)?;
        let application = self.require(id).await?;
        ensure_open(&application)?;

        self.repository
            .close(id, ApplicationState::Rejected)
            .await
            .map_err(|err| transition_error(&application, err))?;

        info!(number = %application.number, "application rejected");
        self.notifications.spawn_status_updated(
            Application {
                state: ApplicationState::Rejected,
                ..application
            },
            Some(comment),
        );
        Ok(())
    }

    pub async fn attachment_content(
        &self,
        id: AttachmentId,
    ) -> Result<DocumentContent, SolicitudServiceError> {
        let attachment = self
            .repository
            .find_attachment(id)
            .await?
            .ok_or_else(|| SolicitudServiceError::NotFound(format!("archivo {}", id.0)))?;
        let bytes = self.read_stored(&attachment.storage_path).await?;
        let content_type = mime_guess::from_path(&attachment.file_name)
            .first_or(mime::APPLICATION_OCTET_STREAM)
            .essence_str()
            .to_string();
        Ok(DocumentContent {
            file_name: attachment.file_name,
            content_type,
            bytes,
        })
    }

    pub async fn certification_content(
        &self,
        id: ApplicationId,
    ) -> Result<DocumentContent, SolicitudServiceError> {
        let certification = self
            .repository
            .certification(id)
            .await?
            .ok_or_else(|| SolicitudServiceError::NotFound(format!("certificación {id}")))?;
        let bytes = self.read_stored(&certification.storage_path).await?;
        Ok(DocumentContent {
            file_name: certification.file_name,
            content_type: certification.content_type,
            bytes,
        })
    }

    async fn read_stored(&self, storage_path: &str) -> Result<Vec<u8>, SolicitudServiceError> {
        self.files.read(storage_path).await.map_err(|err| match err {
            StorageError::Missing(path) => {
                warn!(file = %path, "recorded document missing from content directory");
                SolicitudServiceError::NotFound(path)
            }
            other => other.into(),
        })
    }

    async fn require(&self, id: ApplicationId) -> Result<Application, SolicitudServiceError> {
        self.repository
            .find_by_id(id)
            .await?
            .ok_or_else(|| SolicitudServiceError::NotFound(id.to_string()))
    }
}

/// A decision may land between the read and the write; the store reports it as `Finalized`.
fn transition_error(application: &Application, err: RepositoryError) -> SolicitudServiceError {
    match err {
        RepositoryError::Finalized(_) => SolicitudServiceError::InvalidTransition {
            number: application.number.clone(),
            state: "decided",
        },
        RepositoryError::NotFound => {
            SolicitudServiceError::NotFound(application.number.to_string())
        }
        other => other.into(),
    }
}

fn ensure_open(application: &Application) -> Result<(), SolicitudServiceError> {
    if application.state.is_terminal() {
        return Err(SolicitudServiceError::InvalidTransition {
            number: application.number.clone(),
            state: application.state.label(),
        });
    }
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum SolicitudServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Numbering(#[from] NumberingError),
    #[error("application '{0}' not found")]
    NotFound(String),
    #[error("application {number} is already {state} and cannot change")]
    InvalidTransition {
        number: ApplicationNumber,
        state: &'static str,
    },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Notification(#[from] NotificationError),
}
