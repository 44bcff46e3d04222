//! ZATCA e-invoicing integration: CSR generation, CSID onboarding, invoice
//! submission (compliance, reporting, clearance) and Phase One QR codes.
//!
//! # Examples
//! ```rust
//! use zatca_core::config::{Config, EnvironmentType};
//!
//! let config = Config::new(EnvironmentType::Simulation);
//! assert!(config.base_url().ends_with("/developer-portal/"));
//! ```
pub mod api;
pub mod config;
pub mod csr;
pub mod envelope;
pub mod profile;
pub mod qr;
pub mod sign;

use thiserror::Error;

pub use api::ZatcaError;
pub use config::ConfigError;
pub use csr::CsrError;
pub use profile::ProfileError;
pub use qr::QrCodeError;
pub use sign::SigningError;

/// Top-level error wrapper for core operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Profile(#[from] ProfileError),
    #[error(transparent)]
    Csr(#[from] CsrError),
    #[error(transparent)]
    Api(#[from] ZatcaError),
    #[error(transparent)]
    Signing(#[from] SigningError),
    #[error(transparent)]
    Qr(#[from] QrCodeError),
}
