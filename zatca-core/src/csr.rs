//! CSR generation and persistence.
use crate::{
    config::{EnvironmentType, StoragePaths},
    profile::MerchantProfile,
};
use k256::{
    ecdsa::{DerSignature, SigningKey},
    pkcs8::{EncodePrivateKey, LineEnding as KeyLineEnding},
};
use rand_core::OsRng;
use std::{
    fs,
    io::Write as _,
    path::{Path, PathBuf},
    str::FromStr,
};
use thiserror::Error;
use tracing::{debug, info};
use x509_cert::{
    builder::{Builder, RequestBuilder},
    der::{
        Encode, EncodePem, Error as DerError, Length, Result as DerResult, Writer, asn1,
        pem::LineEnding,
    },
    ext::{
        AsExtension, Extension,
        pkix::{SubjectAltName, name::GeneralName},
    },
    name,
};
use zeroize::Zeroizing;

/// Errors that can occur while generating or persisting CSRs.
#[derive(Debug, Error)]
pub enum CsrError {
    #[error("merchant profile does not allow any invoice type")]
    NoInvoiceTypes,

    #[error("invalid subject distinguished name constructed from profile: {message}")]
    InvalidSubject { message: String },

    #[error("invalid Subject Alternative Name (SAN) from profile: {message}")]
    InvalidSan { message: String },

    #[error("failed to construct CSR request: {message}")]
    RequestBuild { message: String },

    #[error("failed adding CSR extension '{which}': {message}")]
    AddExtension {
        which: &'static str,
        message: String,
    },

    #[error("failed to build CSR: {message}")]
    CsrBuild { message: String },

    #[error("failed DER encoding for {context}: {source}")]
    DerEncode {
        context: &'static str,
        #[source]
        source: DerError,
    },

    #[error("failed to encode private key: {message}")]
    KeyEncode { message: String },

    #[error("failed to write '{path}': {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// PEM CSR plus the private key it was signed with.
pub struct GeneratedCsr {
    csr_pem: String,
    private_key_pem: Zeroizing<String>,
}

impl GeneratedCsr {
    pub fn new(csr_pem: String, private_key_pem: Zeroizing<String>) -> Self {
        Self {
            csr_pem,
            private_key_pem,
        }
    }

    pub fn csr_pem(&self) -> &str {
        &self.csr_pem
    }

    pub fn private_key_pem(&self) -> &str {
        &self.private_key_pem
    }
}

impl std::fmt::Debug for GeneratedCsr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeneratedCsr")
            .field("csr_pem", &self.csr_pem)
            .field("private_key_pem", &"<redacted>")
            .finish()
    }
}

/// Produces a key pair and a certificate signing request for a merchant.
pub trait CsrProvider {
    fn generate(
        &self,
        profile: &MerchantProfile,
        env: EnvironmentType,
    ) -> Result<GeneratedCsr, CsrError>;
}

struct TemplateNameExtension(asn1::PrintableString);

impl const_oid::AssociatedOid for TemplateNameExtension {
    const OID: const_oid::ObjectIdentifier =
        const_oid::ObjectIdentifier::new_unwrap("1.3.6.1.4.1.311.20.2");
}

impl Encode for TemplateNameExtension {
    fn encoded_len(&self) -> DerResult<Length> {
        self.0.encoded_len()
    }
    fn encode(&self, encoder: &mut impl Writer) -> DerResult<()> {
        self.0.encode(encoder)
    }
}

impl AsExtension for TemplateNameExtension {
    fn critical(&self, _name: &name::Name, _exts: &[Extension]) -> bool {
        false
    }
}

impl EnvironmentType {
    pub const fn certificate_template_name(&self) -> &'static str {
        match self {
            EnvironmentType::Simulation => "PREZATCA-Code-Signing",
            EnvironmentType::Production => "ZATCA-Code-Signing",
        }
    }

    fn to_extension(self) -> Result<TemplateNameExtension, CsrError> {
        let value = asn1::PrintableString::new(self.certificate_template_name()).map_err(|e| {
            CsrError::RequestBuild {
                message: format!("invalid template name for extension: {e}"),
            }
        })?;
        Ok(TemplateNameExtension(value))
    }
}

/// secp256k1 ECDSA keys and PKCS#10 requests via RustCrypto.
#[derive(Debug, Clone, Copy, Default)]
pub struct K256CsrProvider;

impl K256CsrProvider {
    fn generate_subject(profile: &MerchantProfile) -> Result<name::Name, CsrError> {
        name::Name::from_str(&format!(
            "C=SA,OU={},O={},CN={}",
            profile.organizational_unit(),
            profile.organization_name(),
            profile.common_name()
        ))
        .map_err(|e| CsrError::InvalidSubject {
            message: e.to_string(),
        })
    }

    fn generate_san_extension(profile: &MerchantProfile) -> Result<SubjectAltName, CsrError> {
        let name = name::Name::from_str(&format!(
            "sn={},uid={},title={},registeredAddress={},businessCategory={}",
            profile.serial_number(),
            profile.vat_number(),
            profile.invoice_types().to_title(),
            profile.registered_address(),
            profile.business_category()
        ))
        .map_err(|e| CsrError::InvalidSan {
            message: e.to_string(),
        })?;
        Ok(SubjectAltName(vec![GeneralName::DirectoryName(name)]))
    }

    /// Build a PEM CSR signed by `signer`.
    pub fn build_pem(
        &self,
        profile: &MerchantProfile,
        signer: &SigningKey,
        env: EnvironmentType,
    ) -> Result<String, CsrError> {
        if profile.invoice_types().is_empty() {
            return Err(CsrError::NoInvoiceTypes);
        }
        let subject = Self::generate_subject(profile)?;
        let template_extension = env.to_extension()?;
        let san_extension = Self::generate_san_extension(profile)?;

        let mut csr_builder =
            RequestBuilder::new(subject, signer).map_err(|e| CsrError::RequestBuild {
                message: e.to_string(),
            })?;
        csr_builder
            .add_extension(&template_extension)
            .map_err(|e| CsrError::AddExtension {
                which: "TemplateName",
                message: e.to_string(),
            })?;
        csr_builder
            .add_extension(&san_extension)
            .map_err(|e| CsrError::AddExtension {
                which: "SubjectAltName",
                message: e.to_string(),
            })?;
        let csr = csr_builder
            .build::<DerSignature>()
            .map_err(|e| CsrError::CsrBuild {
                message: e.to_string(),
            })?;
        csr.to_pem(LineEnding::LF).map_err(|e| CsrError::DerEncode {
            context: "certificate request (PEM)",
            source: e,
        })
    }
}

impl CsrProvider for K256CsrProvider {
    fn generate(
        &self,
        profile: &MerchantProfile,
        env: EnvironmentType,
    ) -> Result<GeneratedCsr, CsrError> {
        let signer = SigningKey::random(&mut OsRng);
        let csr_pem = self.build_pem(profile, &signer, env)?;
        let private_key_pem =
            signer
                .to_pkcs8_pem(KeyLineEnding::LF)
                .map_err(|e| CsrError::KeyEncode {
                    message: e.to_string(),
                })?;
        Ok(GeneratedCsr::new(
            csr_pem,
            Zeroizing::new(private_key_pem.to_string()),
        ))
    }
}

/// Destination files for a CSR run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrTargets {
    private_key: PathBuf,
    csr: PathBuf,
}

impl CsrTargets {
    pub fn new(private_key: impl Into<PathBuf>, csr: impl Into<PathBuf>) -> Self {
        Self {
            private_key: private_key.into(),
            csr: csr.into(),
        }
    }

    pub fn private_key(&self) -> &Path {
        &self.private_key
    }

    pub fn csr(&self) -> &Path {
        &self.csr
    }
}

impl From<&StoragePaths> for CsrTargets {
    fn from(paths: &StoragePaths) -> Self {
        Self::new(paths.private_key(), paths.csr())
    }
}

/// What a CSR run left behind. The private key itself is only on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrArtifacts {
    csr_pem: String,
    csr_path: PathBuf,
    private_key_path: PathBuf,
}

impl CsrArtifacts {
    pub fn csr_pem(&self) -> &str {
        &self.csr_pem
    }

    pub fn csr_path(&self) -> &Path {
        &self.csr_path
    }

    pub fn private_key_path(&self) -> &Path {
        &self.private_key_path
    }
}

/// Generates a CSR through a [`CsrProvider`] and writes key and request to disk.
///
/// # Examples
/// ```rust,no_run
/// use zatca_core::config::{Config, EnvironmentType, SolutionInfo};
/// use zatca_core::csr::{CertificateRequestBuilder, CsrTargets};
/// use zatca_core::profile::MerchantProfile;
///
/// let config = Config::new(EnvironmentType::Simulation);
/// let profile = MerchantProfile::from_properties("merchant.properties".as_ref(), config.solution())?;
/// let artifacts = CertificateRequestBuilder::default()
///     .generate(&profile, config.env(), &CsrTargets::from(config.storage()))?;
/// println!("{}", artifacts.csr_pem());
/// # Ok::<(), zatca_core::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct CertificateRequestBuilder<P = K256CsrProvider> {
    provider: P,
}

impl Default for CertificateRequestBuilder<K256CsrProvider> {
    fn default() -> Self {
        Self::new(K256CsrProvider)
    }
}

impl<P: CsrProvider> CertificateRequestBuilder<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// # Errors
    /// Returns [`CsrError::Storage`] if a target directory cannot be created
    /// or a file cannot be written, or any provider error.
    pub fn generate(
        &self,
        profile: &MerchantProfile,
        env: EnvironmentType,
        targets: &CsrTargets,
    ) -> Result<CsrArtifacts, CsrError> {
        let generated = self.provider.generate(profile, env)?;

        write_private_key(targets.private_key(), generated.private_key_pem())?;
        write_artifact(targets.csr(), generated.csr_pem())?;
        info!(
            env = %env,
            invoice_types = %profile.invoice_types().to_title(),
            csr_path = %targets.csr().display(),
            private_key_path = %targets.private_key().display(),
            "generated certificate signing request"
        );

        Ok(CsrArtifacts {
            csr_pem: generated.csr_pem().to_string(),
            csr_path: targets.csr().to_path_buf(),
            private_key_path: targets.private_key().to_path_buf(),
        })
    }
}

fn ensure_parent(path: &Path) -> Result<(), CsrError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if !parent.exists() {
            debug!(dir = %parent.display(), "creating storage directory");
            fs::create_dir_all(parent).map_err(|e| CsrError::Storage {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
    }
    Ok(())
}

fn write_artifact(path: &Path, contents: &str) -> Result<(), CsrError> {
    ensure_parent(path)?;
    fs::write(path, contents).map_err(|e| CsrError::Storage {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Owner read/write only on unix, including when replacing an older key.
fn write_private_key(path: &Path, contents: &str) -> Result<(), CsrError> {
    ensure_parent(path)?;
    let storage_err = |source| CsrError::Storage {
        path: path.to_path_buf(),
        source,
    };
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path).map_err(storage_err)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))
            .map_err(storage_err)?;
    }
    file.write_all(contents.as_bytes()).map_err(storage_err)
}
