//! Internship exemption certification requests for the civil registry.
//!
//! Citizens submit identifying data plus supporting documents and receive a monthly
//! `{YY}{MM}{NNN}` number; staff review, return for correction, approve or reject.

pub mod config;
pub mod db;
pub mod error;
pub mod notifications;
pub mod solicitudes;
pub mod staff;
pub mod storage;
pub mod telemetry;
