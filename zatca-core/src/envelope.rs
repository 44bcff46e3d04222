//! Invoice documents as they move through sign → submit.
use base64ct::{Base64, Encoding};
use uuid::Uuid;

/// An unsigned invoice and the transaction UUID it carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceEnvelope {
    document: String,
    uuid: Uuid,
}

impl InvoiceEnvelope {
    /// `uuid` must match the `cbc:UUID` inside `document`.
    pub fn new(document: impl Into<String>, uuid: Uuid) -> Self {
        Self {
            document: document.into(),
            uuid,
        }
    }

    pub fn document(&self) -> &str {
        &self.document
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }
}

/// A signed invoice ready for submission.
///
/// Hash and UUID are fixed here and sent as-is by every submission call, so
/// a retry or a second endpoint always sees the values the signer produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedEnvelope {
    uuid: Uuid,
    hash: String,
    signed_document: String,
    qr_code: Option<String>,
}

impl SignedEnvelope {
    /// Wrap an invoice that was signed elsewhere.
    pub fn new(signed_document: impl Into<String>, hash: impl Into<String>, uuid: Uuid) -> Self {
        Self {
            uuid,
            hash: hash.into(),
            signed_document: signed_document.into(),
            qr_code: None,
        }
    }

    pub(crate) fn with_qr_code(mut self, qr_code: String) -> Self {
        self.qr_code = Some(qr_code);
        self
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn signed_document(&self) -> &str {
        &self.signed_document
    }

    pub fn qr_code(&self) -> Option<&str> {
        self.qr_code.as_deref()
    }

    /// `invoice` field of a submission body.
    pub fn invoice_base64(&self) -> String {
        Base64::encode_string(self.signed_document.as_bytes())
    }

    /// `invoiceHash` field of a submission body.
    pub fn hash_base64(&self) -> String {
        Base64::encode_string(self.hash.as_bytes())
    }
}
