use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use super::domain::{IncomingFile, NewApplication};
use crate::config::DEFAULT_MAX_UPLOAD_BYTES;

pub const FIELD_NATIONAL_ID: &str = "Cedula";
pub const FIELD_NAME: &str = "Nombre";
pub const FIELD_EMAIL: &str = "Correo";
pub const FIELD_FILES: &str = "Archivos";
pub const FIELD_COMMENT: &str = "Comentario";
pub const FIELD_CERTIFICATION: &str = "Certificacion";

const NATIONAL_ID_DIGITS: usize = 11;
const ALLOWED_EXTENSIONS: [&str; 4] = ["pdf", "jpg", "jpeg", "png"];

/// Field-level validation failures, keyed by the form field the client submitted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationError {
    fields: BTreeMap<String, Vec<String>>,
}

impl ValidationError {
    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut error = Self::default();
        error.push(field, message);
        error
    }

    pub fn push(&mut self, field: &str, message: impl Into<String>) {
        self.fields
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> &BTreeMap<String, Vec<String>> {
        &self.fields
    }

    pub fn messages_for(&self, field: &str) -> &[String] {
        self.fields.get(field).map(Vec::as_slice).unwrap_or_default()
    }

    fn into_result(self) -> Result<(), ValidationError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "submission failed validation")?;
        for (field, messages) in &self.fields {
            write!(f, "; {field}: {}", messages.join(", "))?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

/// Server-side limits applied to every uploaded document.
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    max_file_bytes: usize,
}

impl UploadPolicy {
    pub fn new(max_file_bytes: usize) -> Self {
        let max_file_bytes = if max_file_bytes == 0 {
            DEFAULT_MAX_UPLOAD_BYTES
        } else {
            max_file_bytes
        };
        Self { max_file_bytes }
    }

    pub fn max_file_bytes(&self) -> usize {
        self.max_file_bytes
    }

    /// Multipart bodies carry several files plus form overhead; oversized files must
    /// still reach validation so the caller gets a field-level message.
    pub fn request_body_limit(&self) -> usize {
        self.max_file_bytes.saturating_mul(10).saturating_add(1024 * 1024)
    }

    /// Checks every file against the extension allow-list and size cap.
    pub fn check_files(
        &self,
        field: &str,
        files: &[IncomingFile],
        errors: &mut ValidationError,
    ) {
        for file in files {
            let extension = Path::new(&file.file_name)
                .extension()
                .and_then(|ext| ext.to_str())
                .map(str::to_ascii_lowercase);

            match extension {
                Some(ext) if ALLOWED_EXTENSIONS.contains(&ext.as_str()) => {}
                _ => errors.push(
                    field,
                    format!(
                        "'{}' no es un tipo permitido (pdf, jpg, jpeg, png)",
                        file.file_name
                    ),
                ),
            }

            if file.bytes.is_empty() {
                errors.push(field, format!("'{}' está vacío", file.file_name));
            } else if file.bytes.len() > self.max_file_bytes {
                errors.push(
                    field,
                    format!(
                        "'{}' supera el tamaño máximo de {} MB",
                        file.file_name,
                        self.max_file_bytes / (1024 * 1024)
                    ),
                );
            }
        }
    }

    /// Validates a document set for creation or resubmission: at least one file, all acceptable.
    pub fn validate_documents(&self, files: &[IncomingFile]) -> Result<(), ValidationError> {
        let mut errors = ValidationError::default();
        if files.is_empty() {
            errors.push(FIELD_FILES, "Debe adjuntar al menos un archivo");
        }
        self.check_files(FIELD_FILES, files, &mut errors);
        errors.into_result()
    }

    /// Validates and trims a new application together with its documents.
    pub fn validate_submission(
        &self,
        submission: NewApplication,
        files: &[IncomingFile],
    ) -> Result<NewApplication, ValidationError> {
        let mut errors = ValidationError::default();

        let national_id = submission.national_id.trim().to_string();
        if national_id.len() != NATIONAL_ID_DIGITS
            || !national_id.bytes().all(|b| b.is_ascii_digit())
        {
            errors.push(
                FIELD_NATIONAL_ID,
                "La cédula debe tener exactamente 11 dígitos",
            );
        }

        let full_name = submission.full_name.trim().to_string();
        if full_name.is_empty() {
            errors.push(FIELD_NAME, "El nombre es obligatorio");
        }

        let email = submission.email.trim().to_string();
        if !is_valid_email(&email) {
            errors.push(FIELD_EMAIL, "El correo electrónico no es válido");
        }

        if files.is_empty() {
            errors.push(FIELD_FILES, "Debe adjuntar al menos un archivo");
        }
        self.check_files(FIELD_FILES, files, &mut errors);

        errors.into_result()?;
        Ok(NewApplication {
            national_id,
            full_name,
            email,
        })
    }
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_UPLOAD_BYTES)
    }
}

/// Basic address shape check: one `@`, non-empty local part, dotted domain, no spaces.
pub fn is_valid_email(email: &str) -> bool {
    if email.len() < 3 || email.len() > 254 || email.chars().any(char::is_whitespace) {
        return false;
    }

    let mut parts = email.split('@');
    let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };

    !local.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains("..")
}

/// Trims a staff comment; an empty comment is rejected.
pub fn require_comment(comment: &str) -> Result<String, ValidationError> {
    let trimmed = comment.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::single(
            FIELD_COMMENT,
            "El comentario es obligatorio",
        ));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pdf(name: &str, len: usize) -> IncomingFile {
        IncomingFile {
            file_name: name.to_string(),
            content_type: Some("application/pdf".to_string()),
            bytes: vec![b'%'; len],
        }
    }

    fn submission() -> NewApplication {
        NewApplication {
            national_id: "00112345678".to_string(),
            full_name: "  Juan Perez ".to_string(),
            email: "juan@test.com".to_string(),
        }
    }

    #[test]
    fn accepts_well_formed_submission_and_trims() {
        let policy = UploadPolicy::default();
        let cleaned = policy
            .validate_submission(submission(), &[pdf("acta.pdf", 10)])
            .expect("valid submission");
        assert_eq!(cleaned.full_name, "Juan Perez");
    }

    #[test]
    fn reports_each_invalid_field() {
        let policy = UploadPolicy::default();
        let bad = NewApplication {
            national_id: "0011234567X".to_string(),
            full_name: "   ".to_string(),
            email: "juan.test.com".to_string(),
        };

        let errors = policy
            .validate_submission(bad, &[])
            .expect_err("invalid submission");
        assert_eq!(errors.messages_for(FIELD_NATIONAL_ID).len(), 1);
        assert_eq!(errors.messages_for(FIELD_NAME).len(), 1);
        assert_eq!(errors.messages_for(FIELD_EMAIL).len(), 1);
        assert_eq!(errors.messages_for(FIELD_FILES).len(), 1);
    }

    #[test]
    fn national_id_must_have_eleven_digits() {
        let policy = UploadPolicy::default();
        let mut short = submission();
        short.national_id = "1234567890".to_string();
        assert!(policy
            .validate_submission(short, &[pdf("a.pdf", 1)])
            .is_err());
    }

    #[test]
    fn rejects_disallowed_extension_and_oversized_files() {
        let policy = UploadPolicy::new(1024);
        let files = vec![pdf("script.exe", 10), pdf("scan.PNG", 2048)];
        let errors = policy
            .validate_documents(&files)
            .expect_err("files rejected");
        let messages = errors.messages_for(FIELD_FILES);
        assert_eq!(messages.len(), 2);
        assert!(messages[0].contains("script.exe"));
        assert!(messages[1].contains("scan.PNG"));
    }

    #[test]
    fn five_megabytes_is_the_default_ceiling() {
        let policy = UploadPolicy::default();
        assert!(policy
            .validate_documents(&[pdf("limite.pdf", 5 * 1024 * 1024)])
            .is_ok());
        assert!(policy
            .validate_documents(&[pdf("grande.pdf", 5 * 1024 * 1024 + 1)])
            .is_err());
    }

    #[test]
    fn email_shape_checks() {
        assert!(is_valid_email("juan@test.com"));
        assert!(!is_valid_email("juan@test"));
        assert!(!is_valid_email("juan@@test.com"));
        assert!(!is_valid_email("@test.com"));
        assert!(!is_valid_email("juan perez@test.com"));
    }

    #[test]
    fn blank_comment_is_rejected() {
        assert!(require_comment("   ").is_err());
        assert_eq!(require_comment(" Falta firma ").expect("ok"), "Falta firma");
    }
}
