use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePool;
use sqlx::FromRow;
use tracing::info;

use super::{StaffError, StaffRole, StaffUser, StaffUserId, ValidStaffUser};

const USER_COLUMNS: &str = "id, name, email, role, active, last_access_at";

#[derive(FromRow)]
struct StaffUserRow {
    id: i64,
    name: String,
    email: String,
    role: i64,
    active: bool,
    last_access_at: Option<DateTime<Utc>>,
}

impl TryFrom<StaffUserRow> for StaffUser {
    type Error = StaffError;

    fn try_from(row: StaffUserRow) -> Result<Self, Self::Error> {
        Ok(StaffUser {
            id: StaffUserId(row.id),
            name: row.name,
            email: row.email,
            role: StaffRole::from_code(row.role).ok_or(StaffError::CorruptRole(row.role))?,
            active: row.active,
            last_access_at: row.last_access_at,
        })
    }
}

/// Staff accounts stored alongside applications.
#[derive(Debug, Clone)]
pub struct StaffDirectory {
    pool: SqlitePool,
}

impl StaffDirectory {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn list(&self) -> Result<Vec<StaffUser>, StaffError> {
        let query = format!("SELECT {USER_COLUMNS} FROM staff_users ORDER BY name, id");
        sqlx::query_as::<_, StaffUserRow>(&query)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(StaffUser::try_from)
            .collect()
    }

    pub async fn get(&self, id: StaffUserId) -> Result<StaffUser, StaffError> {
        let query = format!("SELECT {USER_COLUMNS} FROM staff_users WHERE id = ?");
        sqlx::query_as::<_, StaffUserRow>(&query)
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StaffError::NotFound(id.0))?
            .try_into()
    }

    /// New accounts start active and without a recorded access.
    pub async fn create(&self, user: ValidStaffUser) -> Result<StaffUser, StaffError> {
        let result = sqlx::query(
            "INSERT INTO staff_users (name, email, role, active, last_access_at)
             VALUES (?, ?, ?, 1, NULL)",
        )
        .bind(&user.name)
        .bind(&user.email)
        .bind(user.role.code())
        .execute(&self.pool)
        .await;

        let id = match result {
            Ok(done) => StaffUserId(done.last_insert_rowid()),
            Err(sqlx::Error::Database(err)) if err.is_unique_violation() => {
                return Err(StaffError::DuplicateEmail(user.email));
            }
            Err(err) => return Err(err.into()),
        };

        info!(user = id.0, role = user.role.label(), "staff user created");
        Ok(StaffUser {
            id,
            name: user.name,
            email: user.email,
            role: user.role,
            active: true,
            last_access_at: None,
        })
    }

    pub async fn set_active(&self, id: StaffUserId, active: bool) -> Result<StaffUser, StaffError> {
        let updated = sqlx::query("UPDATE staff_users SET active = ? WHERE id = ?")
            .bind(active)
            .bind(id.0)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if updated == 0 {
            return Err(StaffError::NotFound(id.0));
        }

        info!(user = id.0, active, "staff user status changed");
        self.get(id).await
    }

    pub async fn record_access(
        &self,
        id: StaffUserId,
        at: DateTime<Utc>,
    ) -> Result<StaffUser, StaffError> {
        let updated = sqlx::query("UPDATE staff_users SET last_access_at = ? WHERE id = ?")
            .bind(at)
            .bind(id.0)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if updated == 0 {
            return Err(StaffError::NotFound(id.0));
        }
        self.get(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    async fn directory() -> StaffDirectory {
        let pool = db::connect_in_memory().await.expect("pool");
        db::migrate(&pool).await.expect("migrate");
        StaffDirectory::new(pool)
    }

    fn validator(email: &str) -> ValidStaffUser {
        ValidStaffUser {
            name: "Ana Gomez".to_string(),
            email: email.to_string(),
            role: StaffRole::Validator,
        }
    }

    #[tokio::test]
    async fn create_and_fetch() {
        let directory = directory().await;
        let created = directory
            .create(validator("ana@registro.gob"))
            .await
            .expect("created");
        assert!(created.active);

        let fetched = directory.get(created.id).await.expect("fetched");
        assert_eq!(fetched, created);
        assert_eq!(directory.list().await.expect("list").len(), 1);
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let directory = directory().await;
        directory
            .create(validator("ana@registro.gob"))
            .await
            .expect("first");

        assert!(matches!(
            directory.create(validator("ana@registro.gob")).await,
            Err(StaffError::DuplicateEmail(_))
        ));
    }

    #[tokio::test]
    async fn deactivate_and_record_access() {
        let directory = directory().await;
        let created = directory
            .create(validator("ana@registro.gob"))
            .await
            .expect("created");

        let inactive = directory
            .set_active(created.id, false)
            .await
            .expect("updated");
        assert!(!inactive.active);

        let seen = directory
            .record_access(created.id, Utc::now())
            .await
            .expect("recorded");
        assert!(seen.last_access_at.is_some());

        assert!(matches!(
            directory.set_active(StaffUserId(99), true).await,
            Err(StaffError::NotFound(99))
        ));
    }
}
