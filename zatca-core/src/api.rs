//! ZATCA HTTP API client.
mod response;

pub use response::{
    MessageList, SubmissionResult, ValidationMessage, ValidationResponse, ValidationResults,
};

use base64ct::{Base64, Encoding};
use reqwest::{Client, RequestBuilder};
use std::marker::PhantomData;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    config::{BasicCredentials, Config, EnvironmentType, HttpSettings},
    envelope::SignedEnvelope,
};
use response::CsidResponseBody;

/// Errors returned by the ZATCA API client.
#[derive(Error, Debug)]
pub enum ZatcaError {
    /// The authority answered with a non-success status. `body` is the raw
    /// response text.
    #[error("{operation} failed with status {status}: {body}")]
    Protocol {
        operation: &'static str,
        status: u16,
        body: String,
    },
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Invalid response from ZATCA: {0}")]
    InvalidResponse(String),
    #[error("Client state error: {0}")]
    ClientState(String),
}

/// Marker trait for API token scope, either Compliance (CCSID) or Production (PCSID).
pub trait TokenScope {
    /// Lowercase name, stable for persisted bundles.
    const NAME: &'static str;
}
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
/// Compliance (CCSID) token scope.
pub struct Compliance;
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
/// Production (PCSID) token scope.
pub struct Production;
impl TokenScope for Compliance {
    const NAME: &'static str = "compliance";
}
impl TokenScope for Production {
    const NAME: &'static str = "production";
}

/// CSID credentials used for API calls.
/// Usually obtained through
/// [request_compliance_certificate][ZatcaClient::request_compliance_certificate] or
/// [exchange_for_production_certificate][ZatcaClient::exchange_for_production_certificate],
/// but can also be rebuilt from stored values.
///
/// # Examples
/// ```rust
/// use zatca_core::api::{Compliance, CsidCredentials};
/// use zatca_core::config::EnvironmentType;
///
/// let creds = CsidCredentials::<Compliance>::new(
///     EnvironmentType::Simulation,
///     Some(1234567890123),             // requestID field
///     "TUlJQ1BUQ0NBZU9nQXdJQkFnS....", // binarySecurityToken field
///     "Dehvg1fc8GF6Jwt5bOxXwC6en....", // secret field
/// );
/// assert_eq!(creds.request_id(), Some(1234567890123));
/// ```
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct CsidCredentials<T> {
    env: EnvironmentType,
    request_id: Option<u64>,
    binary_security_token: String,
    secret: String,
    disposition_message: Option<String>,
    _marker: PhantomData<T>,
}

impl<T> CsidCredentials<T> {
    /// Create credential bundle for ZATCA requests.
    pub fn new(
        env: EnvironmentType,
        request_id: Option<u64>,
        binary_security_token: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            env,
            request_id,
            binary_security_token: binary_security_token.into(),
            secret: secret.into(),
            disposition_message: None,
            _marker: PhantomData,
        }
    }

    fn from_body(env: EnvironmentType, body: CsidResponseBody) -> Self {
        Self {
            disposition_message: body.disposition_message,
            ..Self::new(env, body.request_id, body.binary_security_token, body.secret)
        }
    }

    pub fn env(&self) -> EnvironmentType {
        self.env
    }

    pub fn request_id(&self) -> Option<u64> {
        self.request_id
    }

    pub fn binary_security_token(&self) -> &str {
        &self.binary_security_token
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn disposition_message(&self) -> Option<&str> {
        self.disposition_message.as_deref()
    }
}

impl<T> std::fmt::Debug for CsidCredentials<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsidCredentials")
            .field("env", &self.env)
            .field("request_id", &self.request_id)
            .field("binary_security_token", &self.binary_security_token)
            .field("secret", &"<redacted>")
            .field("disposition_message", &self.disposition_message)
            .finish()
    }
}

/// ZATCA API client.
///
/// Holds the environment, gateway URL and test-mode reporting credentials
/// resolved from [`Config`]; nothing is re-read after construction.
///
/// # Examples
/// ```rust,no_run
/// use zatca_core::api::{ZatcaClient, ZatcaError};
/// use zatca_core::config::Config;
///
/// let client = ZatcaClient::new(Config::default())?;
/// # let _ = client;
/// # Ok::<(), ZatcaError>(())
/// ```
#[derive(Debug)]
pub struct ZatcaClient {
    env: EnvironmentType,
    base_url: String,
    test_mode_reporting: Option<BasicCredentials>,
    http: HttpSettings,
    client: Client,
}

// Public API
impl ZatcaClient {
    /// Create a new API client using the provided configuration.
    ///
    /// # Errors
    /// Returns [`ZatcaError::Transport`] if the HTTP client cannot be built.
    pub fn new(config: Config) -> Result<Self, ZatcaError> {
        let client = Client::builder()
            .timeout(config.http().timeout())
            .build()?;

        Ok(Self {
            env: config.env(),
            base_url: config.base_url(),
            test_mode_reporting: config.test_mode_reporting().cloned(),
            http: *config.http(),
            client,
        })
    }

    pub fn env(&self) -> EnvironmentType {
        self.env
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Request a compliance CSID by submitting a PEM CSR and a one-time
    /// password. An expired or reused OTP comes back as
    /// [`ZatcaError::Protocol`] with the authority's message.
    /// See [ZATCA documentation](https://sandbox.zatca.gov.sa/IntegrationSandbox/complianceCert-api) for more details.
    ///
    /// # Errors
    /// Returns [`ZatcaError`] if the request fails or the response cannot be parsed.
    pub async fn request_compliance_certificate(
        &self,
        csr_pem: &str,
        otp: &str,
    ) -> Result<CsidCredentials<Compliance>, ZatcaError> {
        let operation = "compliance certificate request";
        let payload = serde_json::json!({ "csr": Base64::encode_string(csr_pem.as_bytes()) });
        let request = self
            .client
            .post(self.build_endpoint("compliance"))
            .header("Accept", "application/json")
            .header("Accept-Version", "V2")
            .header("OTP", otp)
            .header("Content-Type", "application/json")
            .json(&payload);

        let (_, body) = self.execute(operation, request).await?;
        let parsed: CsidResponseBody = serde_json::from_str(&body)
            .map_err(|e| ZatcaError::InvalidResponse(format!("{operation}: {e}")))?;
        let credentials = CsidCredentials::from_body(self.env, parsed);
        info!(
            env = %self.env,
            request_id = ?credentials.request_id(),
            disposition = ?credentials.disposition_message(),
            "issued compliance CSID"
        );
        Ok(credentials)
    }

    /// Check a signed invoice against the compliance endpoint.
    /// Always authenticates with the supplied compliance bundle.
    /// See [ZATCA documentation](https://sandbox.zatca.gov.sa/IntegrationSandbox/preInvoice-api) for more details.
    ///
    /// # Errors
    /// Returns [`ZatcaError`] for network failures, non-success statuses, or client state issues.
    pub async fn check_invoice_compliance(
        &self,
        invoice: &SignedEnvelope,
        credentials: &CsidCredentials<Compliance>,
    ) -> Result<SubmissionResult, ZatcaError> {
        self.ensure_env(credentials)?;
        let request = self
            .submission("compliance/invoices", invoice)
            .basic_auth(
                credentials.binary_security_token(),
                Some(credentials.secret()),
            );
        self.submit("compliance check", request).await
    }

    /// Exchange a compliance CSID for a production CSID.
    /// See [ZATCA documentation](https://sandbox.zatca.gov.sa/Integration/request-api) for more details.
    ///
    /// # Errors
    /// Returns [`ZatcaError`] if the request fails or the compliance CSID is missing data.
    pub async fn exchange_for_production_certificate(
        &self,
        ccsid: &CsidCredentials<Compliance>,
    ) -> Result<CsidCredentials<Production>, ZatcaError> {
        let operation = "production certificate exchange";
        self.ensure_env(ccsid)?;
        let request_id = ccsid
            .request_id()
            .ok_or_else(|| ZatcaError::ClientState("Missing compliance request_id".into()))?;
        let payload = serde_json::json!({
            "compliance_request_id": request_id,
        });
        let request = self
            .client
            .post(self.build_endpoint("production/csids"))
            .header("Accept", "application/json")
            .header("Accept-Version", "V2")
            .header("Content-Type", "application/json")
            .basic_auth(ccsid.binary_security_token(), Some(ccsid.secret()))
            .json(&payload);

        let (_, body) = self.execute(operation, request).await?;
        let parsed: CsidResponseBody = serde_json::from_str(&body)
            .map_err(|e| ZatcaError::InvalidResponse(format!("{operation}: {e}")))?;
        let credentials = CsidCredentials::from_body(self.env, parsed);
        info!(
            env = %self.env,
            compliance_request_id = request_id,
            request_id = ?credentials.request_id(),
            "issued production CSID"
        );
        Ok(credentials)
    }

    /// Report an invoice to ZATCA's gateway with `Clearance-Status: 1`.
    ///
    /// In the simulation environment the Basic credentials are the configured
    /// test-mode pair, whatever bundle is passed. Production uses `credentials`.
    /// See [ZATCA documentation](https://sandbox.zatca.gov.sa/IntegrationSandbox/reporting-api) for more details.
    ///
    /// # Errors
    /// Returns [`ZatcaError::ClientState`] in simulation when no test-mode
    /// credentials are configured, plus the usual transport and protocol errors.
    pub async fn report_invoice(
        &self,
        invoice: &SignedEnvelope,
        credentials: &CsidCredentials<Production>,
    ) -> Result<SubmissionResult, ZatcaError> {
        self.ensure_env(credentials)?;
        let (username, password) = match self.env {
            EnvironmentType::Simulation => {
                let test_mode = self.test_mode_reporting.as_ref().ok_or_else(|| {
                    ZatcaError::ClientState(
                        "simulation reporting needs test-mode credentials".into(),
                    )
                })?;
                debug!("reporting with test-mode credentials");
                (test_mode.username(), test_mode.password())
            }
            EnvironmentType::Production => (
                credentials.binary_security_token(),
                credentials.secret(),
            ),
        };
        let request = self
            .submission("invoices/reporting/single", invoice)
            .header("Clearance-Status", "1")
            .basic_auth(username, Some(password));
        self.submit("reporting", request).await
    }

    /// Clear an invoice through ZATCA's gateway. The response carries the
    /// stamped invoice, see [`SubmissionResult::cleared_invoice`].
    /// See [ZATCA documentation](https://sandbox.zatca.gov.sa/Integration/clearance-api) for more details.
    ///
    /// # Errors
    /// Returns [`ZatcaError`] for network failures, non-success statuses, or client state issues.
    pub async fn clear_invoice(
        &self,
        invoice: &SignedEnvelope,
        credentials: &CsidCredentials<Production>,
    ) -> Result<SubmissionResult, ZatcaError> {
        self.ensure_env(credentials)?;
        let request = self
            .submission("invoices/clearance/single", invoice)
            .header("Clearance-Status", "1")
            .basic_auth(
                credentials.binary_security_token(),
                Some(credentials.secret()),
            );
        self.submit("clearance", request).await
    }
}

// Private API
impl ZatcaClient {
    fn build_endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path.trim_start_matches('/'))
    }

    fn ensure_env<T>(&self, creds: &CsidCredentials<T>) -> Result<(), ZatcaError> {
        if creds.env() != self.env {
            return Err(ZatcaError::ClientState(format!(
                "CSID issued for {} used against {}",
                creds.env(),
                self.env
            )));
        }
        Ok(())
    }

    fn submission(&self, path: &str, invoice: &SignedEnvelope) -> RequestBuilder {
        let payload = serde_json::json!({
            "invoiceHash": invoice.hash_base64(),
            "uuid": invoice.uuid(),
            "invoice": invoice.invoice_base64(),
        });
        self.client
            .post(self.build_endpoint(path))
            .header("Accept", "application/json")
            .header("Accept-Version", "V2")
            .header("Accept-Language", "en")
            .header("Content-Type", "application/json")
            .json(&payload)
    }

    async fn submit(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<SubmissionResult, ZatcaError> {
        let (status, body) = self.execute(operation, request).await?;
        let json = if body.trim().is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_str(&body)
                .map_err(|e| ZatcaError::InvalidResponse(format!("{operation}: {e}")))?
        };
        Ok(SubmissionResult::new(status, json))
    }

    /// Send `request`, resending only when the connection could not be
    /// established. Returns status and body of a success response.
    async fn execute(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> Result<(u16, String), ZatcaError> {
        let mut attempt = 0u32;
        let response = loop {
            let pending = request.try_clone().ok_or_else(|| {
                ZatcaError::ClientState(format!("{operation} request cannot be replayed"))
            })?;
            match pending.send().await {
                Ok(response) => break response,
                Err(err)
                    if err.is_connect()
                        && !err.is_timeout()
                        && attempt < self.http.connect_retries() =>
                {
                    attempt += 1;
                    let delay = self.http.retry_backoff() * attempt;
                    warn!(
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "connection failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(ZatcaError::Transport(err)),
            }
        };

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            warn!(operation, status = status.as_u16(), "authority rejected request");
            return Err(ZatcaError::Protocol {
                operation,
                status: status.as_u16(),
                body,
            });
        }
        info!(operation, status = status.as_u16(), "authority accepted request");
        Ok((status.as_u16(), body))
    }
}
