//! Internship exemption applications: citizen intake, staff review, correction cycles
//! and final decisions.
//!
//! Applications are numbered per calendar month, carry a set of current attachments, and
//! accumulate an append-only correction history whenever documents are retired.

pub mod domain;
pub mod numbering;
pub mod repository;
pub mod router;
pub mod service;
pub mod sqlite;
pub mod validation;

#[cfg(test)]
mod tests;

pub use domain::{
    state_catalogue, Application, ApplicationDetail, ApplicationDetailView, ApplicationId,
    ApplicationNumber, ApplicationState, ApplicationSummary, Attachment, AttachmentId,
    Certification, CorrectionRecord, HistoryEntry, IncomingFile, NewApplication,
};
pub use numbering::{Clock, FixedClock, NumberingError, SystemClock};
pub use repository::{CorrectionCycle, RepositoryError, SolicitudRepository};
pub use router::application_router;
pub use service::{DocumentContent, SolicitudService, SolicitudServiceError};
pub use sqlite::SqliteSolicitudRepository;
pub use validation::{UploadPolicy, ValidationError};
