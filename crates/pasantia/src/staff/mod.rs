//! Registry staff accounts. Accounts are managed over HTTP without authentication.

mod directory;
pub mod router;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::solicitudes::validation::{is_valid_email, ValidationError, FIELD_EMAIL, FIELD_NAME};

pub use directory::StaffDirectory;
pub use router::staff_router;

pub const FIELD_ROLE: &str = "Rol";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StaffUserId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StaffRole {
    Validator,
    Reader,
    Admin,
}

impl StaffRole {
    pub const fn code(self) -> i64 {
        match self {
            StaffRole::Validator => 0,
            StaffRole::Reader => 1,
            StaffRole::Admin => 2,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(StaffRole::Validator),
            1 => Some(StaffRole::Reader),
            2 => Some(StaffRole::Admin),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            StaffRole::Validator => "Validador",
            StaffRole::Reader => "Lector",
            StaffRole::Admin => "Administrador",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StaffUser {
    pub id: StaffUserId,
    #[serde(rename = "nombre")]
    pub name: String,
    #[serde(rename = "correo")]
    pub email: String,
    #[serde(rename = "rol", serialize_with = "serialize_role")]
    pub role: StaffRole,
    #[serde(rename = "activo")]
    pub active: bool,
    #[serde(rename = "ultimoAcceso")]
    pub last_access_at: Option<DateTime<Utc>>,
}

fn serialize_role<S: serde::Serializer>(role: &StaffRole, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_i64(role.code())
}

/// Account creation payload as posted by the admin screen.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewStaffUser {
    #[serde(rename = "nombre")]
    pub name: String,
    #[serde(rename = "correo")]
    pub email: String,
    #[serde(rename = "rol")]
    pub role: i64,
}

/// An account that passed validation; emails are stored lower-cased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidStaffUser {
    pub name: String,
    pub email: String,
    pub role: StaffRole,
}

impl NewStaffUser {
    pub fn validate(self) -> Result<ValidStaffUser, ValidationError> {
        let mut errors = ValidationError::default();

        let name = self.name.trim().to_string();
        if name.is_empty() {
            errors.push(FIELD_NAME, "El nombre es obligatorio");
        }

        let email = self.email.trim().to_ascii_lowercase();
        if !is_valid_email(&email) {
            errors.push(FIELD_EMAIL, "El correo electrónico no es válido");
        }

        let role = StaffRole::from_code(self.role);
        if role.is_none() {
            errors.push(FIELD_ROLE, "El rol indicado no existe");
        }

        match role {
            Some(role) if errors.is_empty() => Ok(ValidStaffUser { name, email, role }),
            _ => Err(errors),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StaffError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("staff user {0} not found")]
    NotFound(i64),
    #[error("a staff user with email '{0}' already exists")]
    DuplicateEmail(String),
    #[error("stored staff role code {0} is unknown")]
    CorruptRole(i64),
    #[error("staff directory unavailable: {0}")]
    Database(#[from] sqlx::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_normalizes_email_and_role() {
        let valid = NewStaffUser {
            name: " Ana Gomez ".to_string(),
            email: "Ana.Gomez@Registro.gob".to_string(),
            role: 2,
        }
        .validate()
        .expect("valid account");

        assert_eq!(valid.name, "Ana Gomez");
        assert_eq!(valid.email, "ana.gomez@registro.gob");
        assert_eq!(valid.role, StaffRole::Admin);
    }

    #[test]
    fn validation_reports_every_field() {
        let errors = NewStaffUser {
            name: String::new(),
            email: "sin-correo".to_string(),
            role: 7,
        }
        .validate()
        .expect_err("invalid account");

        assert_eq!(errors.messages_for(FIELD_NAME).len(), 1);
        assert_eq!(errors.messages_for(FIELD_EMAIL).len(), 1);
        assert_eq!(errors.messages_for(FIELD_ROLE).len(), 1);
    }

    #[test]
    fn users_serialize_with_role_codes() {
        let user = StaffUser {
            id: StaffUserId(3),
            name: "Ana".to_string(),
            email: "ana@registro.gob".to_string(),
            role: StaffRole::Reader,
            active: true,
            last_access_at: None,
        };
        let json = serde_json::to_value(&user).expect("serializes");
        assert_eq!(json["rol"], 1);
        assert_eq!(json["activo"], true);
        assert!(json["ultimoAcceso"].is_null());
    }
}
