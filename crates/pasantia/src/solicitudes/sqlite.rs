use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnection, SqlitePool};
use sqlx::FromRow;

use super::domain::{
    Application, ApplicationId, ApplicationNumber, ApplicationState, ApplicationSummary,
    Attachment, AttachmentId, Certification, CorrectionRecord, CorrectionRecordId, HistoryEntry,
    NewApplication,
};
use super::repository::{CorrectionCycle, RepositoryError, SolicitudRepository};
use crate::storage::StoredFile;

const APPLICATION_COLUMNS: &str =
    "id, number, national_id, full_name, email, state, created_at";
const ATTACHMENT_COLUMNS: &str =
    "id, application_id, correction_record_id, file_name, storage_path, is_current, uploaded_at";
const CERTIFICATION_COLUMNS: &str =
    "id, application_id, file_name, storage_path, content_type, issued_at";

/// SQLite-backed application store.
#[derive(Debug, Clone)]
pub struct SqliteSolicitudRepository {
    pool: SqlitePool,
}

impl SqliteSolicitudRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[derive(FromRow)]
struct ApplicationRow {
    id: i64,
    number: String,
    national_id: String,
    full_name: String,
    email: String,
    state: i64,
    created_at: DateTime<Utc>,
}

impl TryFrom<ApplicationRow> for Application {
    type Error = RepositoryError;

    fn try_from(row: ApplicationRow) -> Result<Self, Self::Error> {
        Ok(Application {
            id: ApplicationId(row.id),
            number: ApplicationNumber(row.number),
            national_id: row.national_id,
            full_name: row.full_name,
            email: row.email,
            state: decode_state(row.state)?,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct AttachmentRow {
    id: i64,
    application_id: i64,
    correction_record_id: Option<i64>,
    file_name: String,
    storage_path: String,
    is_current: bool,
    uploaded_at: DateTime<Utc>,
}

impl From<AttachmentRow> for Attachment {
    fn from(row: AttachmentRow) -> Self {
        Attachment {
            id: AttachmentId(row.id),
            application_id: ApplicationId(row.application_id),
            correction_record_id: row.correction_record_id.map(CorrectionRecordId),
            file_name: row.file_name,
            storage_path: row.storage_path,
            is_current: row.is_current,
            uploaded_at: row.uploaded_at,
        }
    }
}

#[derive(FromRow)]
struct CorrectionRecordRow {
    id: i64,
    application_id: i64,
    comment: String,
    recorded_at: DateTime<Utc>,
}

impl From<CorrectionRecordRow> for CorrectionRecord {
    fn from(row: CorrectionRecordRow) -> Self {
        CorrectionRecord {
            id: CorrectionRecordId(row.id),
            application_id: ApplicationId(row.application_id),
            comment: row.comment,
            recorded_at: row.recorded_at,
        }
    }
}

#[derive(FromRow)]
struct CertificationRow {
    id: i64,
    application_id: i64,
    file_name: String,
    storage_path: String,
    content_type: String,
    issued_at: DateTime<Utc>,
}

impl From<CertificationRow> for Certification {
    fn from(row: CertificationRow) -> Self {
        Certification {
            id: row.id,
            application_id: ApplicationId(row.application_id),
            file_name: row.file_name,
            storage_path: row.storage_path,
            content_type: row.content_type,
            issued_at: row.issued_at,
        }
    }
}

#[derive(FromRow)]
struct SummaryRow {
    id: i64,
    number: String,
    full_name: String,
    email: String,
    state: i64,
    attachment_count: i64,
}

fn decode_state(code: i64) -> Result<ApplicationState, RepositoryError> {
    ApplicationState::from_code(code)
        .ok_or_else(|| RepositoryError::Corrupt(format!("unknown application state code {code}")))
}

async fn insert_attachment(
    conn: &mut SqliteConnection,
    application_id: ApplicationId,
    file: &StoredFile,
    at: DateTime<Utc>,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO attachments
            (application_id, correction_record_id, file_name, storage_path, is_current, uploaded_at)
         VALUES (?, NULL, ?, ?, 1, ?)",
    )
    .bind(application_id.0)
    .bind(&file.file_name)
    .bind(&file.storage_path)
    .bind(at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Moves a non-final application to `next_state`. Taking the write lock first keeps
/// concurrent corrections of the same application from interleaving.
async fn transition(
    conn: &mut SqliteConnection,
    id: ApplicationId,
    next_state: ApplicationState,
) -> Result<(), RepositoryError> {
    let updated = sqlx::query(
        "UPDATE applications SET state = ?
         WHERE id = ? AND state NOT IN (?, ?)",
    )
    .bind(next_state.code())
    .bind(id.0)
    .bind(ApplicationState::Approved.code())
    .bind(ApplicationState::Rejected.code())
    .execute(&mut *conn)
    .await?
    .rows_affected();

    if updated == 1 {
        return Ok(());
    }

    let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM applications WHERE id = ?")
        .bind(id.0)
        .fetch_optional(&mut *conn)
        .await?;
    match exists {
        Some(_) => Err(RepositoryError::Finalized(id)),
        None => Err(RepositoryError::NotFound),
    }
}

impl SolicitudRepository for SqliteSolicitudRepository {
    async fn latest_number(
        &self,
        prefix: &str,
    ) -> Result<Option<ApplicationNumber>, RepositoryError> {
        let latest: Option<String> = sqlx::query_scalar(
            "SELECT number FROM applications
             WHERE substr(number, 1, length(?1)) = ?1
             ORDER BY number DESC
             LIMIT 1",
        )
        .bind(prefix)
        .fetch_optional(&self.pool)
        .await?;
        Ok(latest.map(ApplicationNumber))
    }

    async fn insert(
        &self,
        draft: &NewApplication,
        number: &ApplicationNumber,
        files: &[StoredFile],
        at: DateTime<Utc>,
    ) -> Result<Application, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let id = sqlx::query(
            "INSERT INTO applications (number, national_id, full_name, email, state, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(number.as_str())
        .bind(&draft.national_id)
        .bind(&draft.full_name)
        .bind(&draft.email)
        .bind(ApplicationState::New.code())
        .bind(at)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();
        let id = ApplicationId(id);

        for file in files {
            insert_attachment(&mut tx, id, file, at).await?;
        }

        tx.commit().await?;

        Ok(Application {
            id,
            number: number.clone(),
            national_id: draft.national_id.clone(),
            full_name: draft.full_name.clone(),
            email: draft.email.clone(),
            state: ApplicationState::New,
            created_at: at,
        })
    }

    async fn find_by_number(
        &self,
        number: &ApplicationNumber,
    ) -> Result<Option<Application>, RepositoryError> {
        let query = format!("SELECT {APPLICATION_COLUMNS} FROM applications WHERE number = ?");
        sqlx::query_as::<_, ApplicationRow>(&query)
            .bind(number.as_str())
            .fetch_optional(&self.pool)
            .await?
            .map(Application::try_from)
            .transpose()
    }

    async fn find_by_id(&self, id: ApplicationId) -> Result<Option<Application>, RepositoryError> {
        let query = format!("SELECT {APPLICATION_COLUMNS} FROM applications WHERE id = ?");
        sqlx::query_as::<_, ApplicationRow>(&query)
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?
            .map(Application::try_from)
            .transpose()
    }

    async fn current_attachments(
        &self,
        id: ApplicationId,
    ) -> Result<Vec<Attachment>, RepositoryError> {
        let query = format!(
            "SELECT {ATTACHMENT_COLUMNS} FROM attachments
             WHERE application_id = ? AND is_current = 1
             ORDER BY id"
        );
        let rows = sqlx::query_as::<_, AttachmentRow>(&query)
            .bind(id.0)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Attachment::from).collect())
    }

    async fn history(&self, id: ApplicationId) -> Result<Vec<HistoryEntry>, RepositoryError> {
        let records = sqlx::query_as::<_, CorrectionRecordRow>(
            "SELECT id, application_id, comment, recorded_at FROM correction_records
             WHERE application_id = ?
             ORDER BY recorded_at DESC, id DESC",
        )
        .bind(id.0)
        .fetch_all(&self.pool)
        .await?;

        let query = format!(
            "SELECT {ATTACHMENT_COLUMNS} FROM attachments
             WHERE application_id = ? AND correction_record_id IS NOT NULL
             ORDER BY id"
        );
        let retired = sqlx::query_as::<_, AttachmentRow>(&query)
            .bind(id.0)
            .fetch_all(&self.pool)
            .await?;

        let mut by_record: HashMap<i64, Vec<Attachment>> = HashMap::new();
        for row in retired {
            if let Some(record_id) = row.correction_record_id {
                by_record
                    .entry(record_id)
                    .or_default()
                    .push(Attachment::from(row));
            }
        }

        Ok(records
            .into_iter()
            .map(|row| {
                let retired = by_record.remove(&row.id).unwrap_or_default();
                HistoryEntry {
                    record: CorrectionRecord::from(row),
                    retired,
                }
            })
            .collect())
    }

    async fn certification(
        &self,
        id: ApplicationId,
    ) -> Result<Option<Certification>, RepositoryError> {
        let query =
            format!("SELECT {CERTIFICATION_COLUMNS} FROM certifications WHERE application_id = ?");
        let row = sqlx::query_as::<_, CertificationRow>(&query)
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Certification::from))
    }

    async fn summaries(&self) -> Result<Vec<ApplicationSummary>, RepositoryError> {
        let rows = sqlx::query_as::<_, SummaryRow>(
            "SELECT a.id, a.number, a.full_name, a.email, a.state,
                    (SELECT COUNT(*) FROM attachments f
                     WHERE f.application_id = a.id AND f.is_current = 1) AS attachment_count
             FROM applications a
             ORDER BY a.id DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(ApplicationSummary {
                    id: ApplicationId(row.id),
                    number: ApplicationNumber(row.number),
                    full_name: row.full_name,
                    email: row.email,
                    state: decode_state(row.state)?,
                    attachment_count: row.attachment_count,
                })
            })
            .collect()
    }

    async fn find_attachment(
        &self,
        id: AttachmentId,
    ) -> Result<Option<Attachment>, RepositoryError> {
        let query = format!("SELECT {ATTACHMENT_COLUMNS} FROM attachments WHERE id = ?");
        let row = sqlx::query_as::<_, AttachmentRow>(&query)
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Attachment::from))
    }

    async fn retire_current(
        &self,
        id: ApplicationId,
        cycle: CorrectionCycle<'_>,
    ) -> Result<HistoryEntry, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        transition(&mut tx, id, cycle.next_state).await?;

        let record_id = sqlx::query(
            "INSERT INTO correction_records (application_id, comment, recorded_at)
             VALUES (?, ?, ?)",
        )
        .bind(id.0)
        .bind(cycle.comment)
        .bind(cycle.at)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        sqlx::query(
            "UPDATE attachments SET is_current = 0, correction_record_id = ?
             WHERE application_id = ? AND is_current = 1",
        )
        .bind(record_id)
        .bind(id.0)
        .execute(&mut *tx)
        .await?;

        let query = format!(
            "SELECT {ATTACHMENT_COLUMNS} FROM attachments
             WHERE correction_record_id = ?
             ORDER BY id"
        );
        let retired = sqlx::query_as::<_, AttachmentRow>(&query)
            .bind(record_id)
            .fetch_all(&mut *tx)
            .await?;

        for file in cycle.replacements {
            insert_attachment(&mut tx, id, file, cycle.at).await?;
        }

        tx.commit().await?;

        Ok(HistoryEntry {
            record: CorrectionRecord {
                id: CorrectionRecordId(record_id),
                application_id: id,
                comment: cycle.comment.to_string(),
                recorded_at: cycle.at,
            },
            retired: retired.into_iter().map(Attachment::from).collect(),
        })
    }

    async fn issue_certification(
        &self,
        id: ApplicationId,
        file: &StoredFile,
        at: DateTime<Utc>,
    ) -> Result<Certification, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        transition(&mut tx, id, ApplicationState::Approved).await?;

        let certification_id = sqlx::query(
            "INSERT INTO certifications
                (application_id, file_name, storage_path, content_type, issued_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(id.0)
        .bind(&file.file_name)
        .bind(&file.storage_path)
        .bind(&file.content_type)
        .bind(at)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        tx.commit().await?;

        Ok(Certification {
            id: certification_id,
            application_id: id,
            file_name: file.file_name.clone(),
            storage_path: file.storage_path.clone(),
            content_type: file.content_type.clone(),
            issued_at: at,
        })
    }

    async fn close(&self, id: ApplicationId, state: ApplicationState) -> Result<(), RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        transition(&mut conn, id, state).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    async fn repository() -> SqliteSolicitudRepository {
        let pool = db::connect_in_memory().await.expect("pool");
        db::migrate(&pool).await.expect("migrate");
        SqliteSolicitudRepository::new(pool)
    }

    fn draft() -> NewApplication {
        NewApplication {
            national_id: "00112345678".to_string(),
            full_name: "Juan Perez".to_string(),
            email: "juan@test.com".to_string(),
        }
    }

    fn stored(name: &str) -> StoredFile {
        StoredFile {
            file_name: name.to_string(),
            storage_path: format!("fixture_{name}"),
            content_type: "application/pdf".to_string(),
        }
    }

    #[tokio::test]
    async fn latest_number_only_considers_matching_prefix() {
        let repo = repository().await;
        for number in ["2601007", "2602001", "2602002"] {
            repo.insert(
                &draft(),
                &ApplicationNumber(number.to_string()),
                &[],
                Utc::now(),
            )
            .await
            .expect("insert");
        }

        let latest = repo.latest_number("2602").await.expect("query");
        assert_eq!(latest, Some(ApplicationNumber("2602002".to_string())));
        assert_eq!(repo.latest_number("2603").await.expect("query"), None);
    }

    #[tokio::test]
    async fn duplicate_numbers_conflict() {
        let repo = repository().await;
        let number = ApplicationNumber("2602001".to_string());
        repo.insert(&draft(), &number, &[], Utc::now())
            .await
            .expect("first insert");

        match repo.insert(&draft(), &number, &[], Utc::now()).await {
            Err(RepositoryError::Conflict(_)) => {}
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn retire_current_moves_attachments_into_history() {
        let repo = repository().await;
        let application = repo
            .insert(
                &draft(),
                &ApplicationNumber("2602001".to_string()),
                &[stored("cedula.pdf"), stored("carta.pdf")],
                Utc::now(),
            )
            .await
            .expect("insert");

        let entry = repo
            .retire_current(
                application.id,
                CorrectionCycle {
                    comment: "Falta firma",
                    replacements: &[stored("carta-firmada.pdf")],
                    next_state: ApplicationState::PendingResponse,
                    at: Utc::now(),
                },
            )
            .await
            .expect("retire");

        assert_eq!(entry.retired.len(), 2);
        assert!(entry.retired.iter().all(|a| !a.is_current
            && a.correction_record_id == Some(entry.record.id)));

        let current = repo
            .current_attachments(application.id)
            .await
            .expect("current");
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].file_name, "carta-firmada.pdf");

        let history = repo.history(application.id).await.expect("history");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].record.comment, "Falta firma");
        assert_eq!(history[0].retired.len(), 2);

        let reloaded = repo
            .find_by_id(application.id)
            .await
            .expect("query")
            .expect("present");
        assert_eq!(reloaded.state, ApplicationState::PendingResponse);
    }

    #[tokio::test]
    async fn history_is_newest_first() {
        let repo = repository().await;
        let application = repo
            .insert(
                &draft(),
                &ApplicationNumber("2602001".to_string()),
                &[stored("a.pdf")],
                Utc::now(),
            )
            .await
            .expect("insert");

        for comment in ["primera", "segunda", "tercera"] {
            repo.retire_current(
                application.id,
                CorrectionCycle {
                    comment,
                    replacements: &[stored("b.pdf")],
                    next_state: ApplicationState::PendingResponse,
                    at: Utc::now(),
                },
            )
            .await
            .expect("retire");
        }

        let comments: Vec<String> = repo
            .history(application.id)
            .await
            .expect("history")
            .into_iter()
            .map(|entry| entry.record.comment)
            .collect();
        assert_eq!(comments, vec!["tercera", "segunda", "primera"]);
    }

    #[tokio::test]
    async fn finalized_applications_refuse_changes() {
        let repo = repository().await;
        let application = repo
            .insert(
                &draft(),
                &ApplicationNumber("2602001".to_string()),
                &[stored("a.pdf")],
                Utc::now(),
            )
            .await
            .expect("insert");

        repo.close(application.id, ApplicationState::Rejected)
            .await
            .expect("reject");

        let result = repo
            .retire_current(
                application.id,
                CorrectionCycle {
                    comment: "tarde",
                    replacements: &[],
                    next_state: ApplicationState::PendingResponse,
                    at: Utc::now(),
                },
            )
            .await;
        assert!(matches!(result, Err(RepositoryError::Finalized(_))));

        let current = repo
            .current_attachments(application.id)
            .await
            .expect("current");
        assert_eq!(current.len(), 1, "rolled back cycle keeps attachments current");
        assert!(repo.history(application.id).await.expect("history").is_empty());
    }

    #[tokio::test]
    async fn unknown_application_is_not_found() {
        let repo = repository().await;
        assert!(matches!(
            repo.close(ApplicationId(404), ApplicationState::Rejected).await,
            Err(RepositoryError::NotFound)
        ));
        assert!(repo
            .find_by_number(&ApplicationNumber("2602999".to_string()))
            .await
            .expect("query")
            .is_none());
    }

    #[tokio::test]
    async fn certification_marks_application_approved() {
        let repo = repository().await;
        let application = repo
            .insert(
                &draft(),
                &ApplicationNumber("2602001".to_string()),
                &[stored("a.pdf")],
                Utc::now(),
            )
            .await
            .expect("insert");

        let certification = repo
            .issue_certification(application.id, &stored("certificacion.pdf"), Utc::now())
            .await
            .expect("issue");
        assert_eq!(certification.file_name, "certificacion.pdf");

        let stored_certification = repo
            .certification(application.id)
            .await
            .expect("query")
            .expect("present");
        assert_eq!(stored_certification, certification);

        let summaries = repo.summaries().await.expect("summaries");
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].state, ApplicationState::Approved);
        assert_eq!(summaries[0].attachment_count, 1);
    }
}
