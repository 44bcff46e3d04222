//! Response bodies returned by the authority.
use base64ct::{Base64, Encoding};
use serde::{Deserialize, Serialize};

use super::ZatcaError;

/// Outcome of a submission call: the HTTP status and the authority's JSON
/// body exactly as received.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionResult {
    status: u16,
    body: serde_json::Value,
}

impl SubmissionResult {
    pub(crate) fn new(status: u16, body: serde_json::Value) -> Self {
        Self { status, body }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn body(&self) -> &serde_json::Value {
        &self.body
    }

    pub fn into_body(self) -> serde_json::Value {
        self.body
    }

    /// Typed view over the validation part of the body.
    ///
    /// # Errors
    /// Returns [`ZatcaError::InvalidResponse`] if the body does not carry
    /// `validationResults`.
    pub fn validation(&self) -> Result<ValidationResponse, ZatcaError> {
        serde_json::from_value(self.body.clone())
            .map_err(|e| ZatcaError::InvalidResponse(format!("unexpected validation body: {e}")))
    }

    pub fn reporting_status(&self) -> Option<&str> {
        self.body.get("reportingStatus").and_then(|v| v.as_str())
    }

    pub fn clearance_status(&self) -> Option<&str> {
        self.body.get("clearanceStatus").and_then(|v| v.as_str())
    }

    /// The stamped invoice returned by clearance, decoded from base64.
    ///
    /// # Errors
    /// Returns [`ZatcaError::InvalidResponse`] if `clearedInvoice` is present
    /// but is not base64-encoded UTF-8.
    pub fn cleared_invoice(&self) -> Result<Option<String>, ZatcaError> {
        let Some(encoded) = self.body.get("clearedInvoice").and_then(|v| v.as_str()) else {
            return Ok(None);
        };
        let bytes = Base64::decode_vec(encoded)
            .map_err(|e| ZatcaError::InvalidResponse(format!("clearedInvoice: {e}")))?;
        String::from_utf8(bytes)
            .map(Some)
            .map_err(|e| ZatcaError::InvalidResponse(format!("clearedInvoice: {e}")))
    }
}

/// API validation response.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValidationResponse {
    #[serde(rename = "validationResults")]
    validation_results: ValidationResults,
    #[serde(rename = "reportingStatus", default)]
    reporting_status: Option<String>,
    #[serde(rename = "clearanceStatus", default)]
    clearance_status: Option<String>,
    #[serde(rename = "qrSellertStatus", default)]
    qr_seller_status: Option<String>,
    #[serde(rename = "qrBuyertStatus", default)]
    qr_buyer_status: Option<String>,
}

impl ValidationResponse {
    pub fn validation_results(&self) -> &ValidationResults {
        &self.validation_results
    }

    pub fn reporting_status(&self) -> Option<&str> {
        self.reporting_status.as_deref()
    }

    pub fn clearance_status(&self) -> Option<&str> {
        self.clearance_status.as_deref()
    }

    pub fn qr_seller_status(&self) -> Option<&str> {
        self.qr_seller_status.as_deref()
    }

    pub fn qr_buyer_status(&self) -> Option<&str> {
        self.qr_buyer_status.as_deref()
    }
}

/// Validation results container.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValidationResults {
    #[serde(rename = "infoMessages", default)]
    info_messages: MessageList,
    #[serde(rename = "warningMessages", default)]
    warning_messages: Vec<ValidationMessage>,
    #[serde(rename = "errorMessages", default)]
    error_messages: Vec<ValidationMessage>,
    #[serde(default)]
    status: Option<String>,
}

impl ValidationResults {
    pub fn info_messages(&self) -> &MessageList {
        &self.info_messages
    }

    pub fn warning_messages(&self) -> &[ValidationMessage] {
        &self.warning_messages
    }

    pub fn error_messages(&self) -> &[ValidationMessage] {
        &self.error_messages
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }
}

/// Validation message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValidationMessage {
    #[serde(rename = "type")]
    message_type: Option<String>,
    code: Option<String>,
    category: Option<String>,
    message: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

impl ValidationMessage {
    pub fn message_type(&self) -> Option<&str> {
        self.message_type.as_deref()
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }
}

/// `infoMessages` arrives as a single object or as a list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum MessageList {
    One(ValidationMessage),
    Many(Vec<ValidationMessage>),
    #[default]
    Empty,
}

impl MessageList {
    pub fn as_slice(&self) -> &[ValidationMessage] {
        match self {
            MessageList::One(message) => std::slice::from_ref(message),
            MessageList::Many(messages) => messages,
            MessageList::Empty => &[],
        }
    }
}

/// CSID issuance body, shared by the compliance and production endpoints.
#[derive(Debug, Deserialize)]
pub(crate) struct CsidResponseBody {
    #[serde(rename = "requestID")]
    pub(crate) request_id: Option<u64>,
    #[serde(rename = "binarySecurityToken")]
    pub(crate) binary_security_token: String,
    pub(crate) secret: String,
    #[serde(rename = "dispositionMessage", default)]
    pub(crate) disposition_message: Option<String>,
}
