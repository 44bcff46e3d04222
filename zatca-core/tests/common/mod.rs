use base64ct::{Base64, Encoding};
use httpmock::MockServer;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use zatca_core::config::{Config, EnvironmentType, HttpSettings, SolutionInfo};
use zatca_core::profile::MerchantProfile;
use zatca_core::sign::{InvoiceSigningProvider, SigningError, SigningOutput, SigningRequest};

#[allow(dead_code)]
pub fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

#[allow(dead_code)]
pub fn sample_profile() -> MerchantProfile {
    MerchantProfile::from_properties(
        &fixture("merchant-profile.properties"),
        &SolutionInfo::new("MyERP", "1.0.0"),
    )
    .expect("fixture profile")
}

#[allow(dead_code)]
pub fn try_start_server() -> Option<MockServer> {
    std::panic::catch_unwind(MockServer::start).ok()
}

/// Config pointed at `server`, with connection retries disabled.
#[allow(dead_code)]
pub fn mock_config(server: &MockServer, env: EnvironmentType) -> Config {
    Config::new(env)
        .with_base_url(server.base_url())
        .with_http(HttpSettings::new(
            Duration::from_secs(5),
            0,
            Duration::from_millis(1),
        ))
}

#[allow(dead_code)]
pub fn basic_auth(username: &str, password: &str) -> String {
    format!(
        "Basic {}",
        Base64::encode_string(format!("{username}:{password}").as_bytes())
    )
}

#[allow(dead_code)]
pub const VALIDATION_BODY: &str = r#"{
  "validationResults": {
    "infoMessages": [
      {
        "type": "INFO",
        "code": "XSD_ZATCA_VALID",
        "category": "XSD validation",
        "message": "Complied with UBL 2.1 standards in line with ZATCA specifications",
        "status": "PASS"
      }
    ],
    "warningMessages": [],
    "errorMessages": [],
    "status": "PASS"
  },
  "reportingStatus": "REPORTED",
  "clearanceStatus": null,
  "qrSellertStatus": null,
  "qrBuyertStatus": null
}"#;

/// Stands in for an external signer: hashes the document with SHA-256 and
/// counts how often it was asked to sign.
#[derive(Default)]
#[allow(dead_code)]
pub struct DigestSigner {
    calls: AtomicUsize,
}

#[allow(dead_code)]
impl DigestSigner {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl InvoiceSigningProvider for DigestSigner {
    fn sign_invoice(&self, request: SigningRequest<'_>) -> Result<SigningOutput, SigningError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if request.private_key_pem.trim().is_empty() {
            return Err(SigningError::Provider("empty private key".into()));
        }
        let hash = Base64::encode_string(&Sha256::digest(request.invoice_xml.as_bytes()));
        Ok(SigningOutput {
            signed_invoice: request
                .invoice_xml
                .replace("</Invoice>", "<ds:Signature/></Invoice>"),
            qr_code: Base64::encode_string(request.certificate),
            hash,
        })
    }
}
