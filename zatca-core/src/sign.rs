//! Invoice signing through an external provider.
//!
//! XML canonicalization, hashing and XAdES signing are delegated to an
//! [`InvoiceSigningProvider`]. The hash it returns must be the one the
//! authority re-derives, so its output is handed on untouched.
use base64ct::{Base64, Encoding};
use std::{
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::envelope::{InvoiceEnvelope, SignedEnvelope};

#[derive(Debug, Error)]
pub enum SigningError {
    #[error("private key file '{path}' does not exist")]
    MissingPrivateKey { path: PathBuf },

    #[error("failed to read private key '{path}': {source}")]
    ReadPrivateKey {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("certificate is not valid base64: {0}")]
    InvalidCertificate(String),

    #[error("signing provider failed: {0}")]
    Provider(String),
}

/// Inputs handed to a signing provider.
#[derive(Clone, Copy)]
pub struct SigningRequest<'a> {
    pub invoice_xml: &'a str,
    /// DER certificate, decoded from the CSID `binarySecurityToken`.
    pub certificate: &'a [u8],
    pub private_key_pem: &'a str,
    pub secret: &'a str,
}

impl std::fmt::Debug for SigningRequest<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningRequest")
            .field("invoice_xml_len", &self.invoice_xml.len())
            .field("certificate_len", &self.certificate.len())
            .field("private_key_pem", &"<redacted>")
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// What a provider produces for one invoice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningOutput {
    pub hash: String,
    pub signed_invoice: String,
    pub qr_code: String,
}

/// Signs invoices per the authority's canonicalization rules.
pub trait InvoiceSigningProvider {
    fn sign_invoice(&self, request: SigningRequest<'_>) -> Result<SigningOutput, SigningError>;
}

impl<P: InvoiceSigningProvider + ?Sized> InvoiceSigningProvider for &P {
    fn sign_invoice(&self, request: SigningRequest<'_>) -> Result<SigningOutput, SigningError> {
        (**self).sign_invoice(request)
    }
}

/// Checks local preconditions, then delegates to a provider.
///
/// # Examples
/// ```rust,no_run
/// use zatca_core::envelope::InvoiceEnvelope;
/// use zatca_core::sign::{InvoiceSigner, InvoiceSigningProvider, SigningError, SigningOutput, SigningRequest};
///
/// struct External;
/// impl InvoiceSigningProvider for External {
///     fn sign_invoice(&self, _request: SigningRequest<'_>) -> Result<SigningOutput, SigningError> {
///         Err(SigningError::Provider("not wired".into()))
///     }
/// }
///
/// let envelope = InvoiceEnvelope::new("<Invoice/>", uuid::Uuid::new_v4());
/// let signed = InvoiceSigner::new(External)
///     .sign(&envelope, "TUlJQ...", "storage/app/zatca/private_key.pem".as_ref(), "secret")?;
/// # let _ = signed;
/// # Ok::<(), SigningError>(())
/// ```
#[derive(Debug, Clone)]
pub struct InvoiceSigner<P> {
    provider: P,
}

impl<P: InvoiceSigningProvider> InvoiceSigner<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// # Errors
    /// Returns [`SigningError::MissingPrivateKey`] before anything else runs
    /// if `private_key_path` does not exist, then certificate decoding, key
    /// reading and provider errors.
    pub fn sign(
        &self,
        envelope: &InvoiceEnvelope,
        certificate_b64: &str,
        private_key_path: &Path,
        secret: &str,
    ) -> Result<SignedEnvelope, SigningError> {
        if !private_key_path.exists() {
            return Err(SigningError::MissingPrivateKey {
                path: private_key_path.to_path_buf(),
            });
        }
        let certificate = Base64::decode_vec(certificate_b64.trim())
            .map_err(|e| SigningError::InvalidCertificate(e.to_string()))?;
        let private_key_pem = Zeroizing::new(fs::read_to_string(private_key_path).map_err(
            |e| SigningError::ReadPrivateKey {
                path: private_key_path.to_path_buf(),
                source: e,
            },
        )?);
        debug!(uuid = %envelope.uuid(), "delegating invoice signing");

        let output = self.provider.sign_invoice(SigningRequest {
            invoice_xml: envelope.document(),
            certificate: &certificate,
            private_key_pem: &private_key_pem,
            secret,
        })?;
        info!(uuid = %envelope.uuid(), hash = %output.hash, "signed invoice");

        Ok(
            SignedEnvelope::new(output.signed_invoice, output.hash, envelope.uuid())
                .with_qr_code(output.qr_code),
        )
    }
}
