//! Merchant identity used to build certificate signing requests.
use crate::config::SolutionInfo;
use bitflags::bitflags;
use java_properties::read;
use std::{fs::File, io::BufReader, path::Path, path::PathBuf};
use thiserror::Error;
use zatca_derive::Validate;

/// Errors raised while assembling a [`MerchantProfile`].
#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("failed to open merchant profile '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse merchant properties from '{path}': {source}")]
    PropertiesRead {
        path: PathBuf,
        #[source]
        source: java_properties::PropertiesError,
    },

    #[error("missing required property '{key}' in file '{path}'")]
    MissingProperty { path: PathBuf, key: String },

    #[error("invalid invoice type flags '{value}', expected four digits such as 1100")]
    InvalidInvoiceTypes { value: String },

    #[error("validation error: {message}")]
    Validation { message: String },
}

impl From<String> for ProfileError {
    fn from(message: String) -> Self {
        ProfileError::Validation { message }
    }
}

bitflags! {
    /// Invoice kinds a device is allowed to issue. Burned into the CSR `title`
    /// attribute; changing it means generating a new key pair and CSR.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct InvoiceTypes: u8 {
        /// Standard tax invoices (B2B).
        const STANDARD = 0b01;
        /// Simplified tax invoices (B2C).
        const SIMPLIFIED = 0b10;
    }
}

impl InvoiceTypes {
    /// Four-digit form used in the CSR: standard, simplified, then two
    /// reserved zeros.
    pub fn to_title(self) -> String {
        let digit = |flag: InvoiceTypes| if self.contains(flag) { '1' } else { '0' };
        format!(
            "{}{}00",
            digit(InvoiceTypes::STANDARD),
            digit(InvoiceTypes::SIMPLIFIED)
        )
    }

    pub fn from_title(value: &str) -> Result<Self, ProfileError> {
        let invalid = || ProfileError::InvalidInvoiceTypes {
            value: value.to_string(),
        };
        let bytes = value.trim().as_bytes();
        if bytes.len() != 4 || !bytes.iter().all(|b| *b == b'0' || *b == b'1') {
            return Err(invalid());
        }
        if bytes[2] != b'0' || bytes[3] != b'0' {
            return Err(invalid());
        }
        let mut types = InvoiceTypes::empty();
        types.set(InvoiceTypes::STANDARD, bytes[0] == b'1');
        types.set(InvoiceTypes::SIMPLIFIED, bytes[1] == b'1');
        Ok(types)
    }
}

/// Merchant and device identity. Immutable once constructed; every text field
/// is checked so it can be embedded in an X.509 distinguished name.
///
/// # Examples
/// ```rust
/// use zatca_core::profile::{InvoiceTypes, MerchantProfile};
///
/// let profile = MerchantProfile::new(
///     "399999999900003".into(),
///     "Maximum Speed Tech Supply LTD".into(),
///     "Riyadh Branch".into(),
///     "TST-886431145-399999999900003".into(),
///     "RRRD2929".into(),
///     "Supply activities".into(),
///     "ed22f1d8-e6a2-1118-9b58-d9a8f11e445f".into(),
///     "MyERP".into(),
///     "1.0.0".into(),
///     InvoiceTypes::STANDARD | InvoiceTypes::SIMPLIFIED,
/// )?;
/// assert_eq!(profile.serial_number(), "1-MyERP|2-1.0.0|3-ed22f1d8-e6a2-1118-9b58-d9a8f11e445f");
/// # Ok::<(), zatca_core::profile::ProfileError>(())
/// ```
#[derive(Validate, Debug, Clone, PartialEq, Eq)]
#[validate_error(ProfileError)]
#[validate(non_empty, dn_safe)]
pub struct MerchantProfile {
    #[validate(is_vat_number)]
    vat_number: String,
    organization_name: String,
    organizational_unit: String,
    common_name: String,
    registered_address: String,
    business_category: String,
    device_serial_number: String,
    solution_name: String,
    solution_version: String,
    #[validate(skip)]
    invoice_types: InvoiceTypes,
}

impl MerchantProfile {
    pub fn vat_number(&self) -> &str {
        &self.vat_number
    }

    pub fn organization_name(&self) -> &str {
        &self.organization_name
    }

    pub fn organizational_unit(&self) -> &str {
        &self.organizational_unit
    }

    pub fn common_name(&self) -> &str {
        &self.common_name
    }

    pub fn registered_address(&self) -> &str {
        &self.registered_address
    }

    pub fn business_category(&self) -> &str {
        &self.business_category
    }

    pub fn device_serial_number(&self) -> &str {
        &self.device_serial_number
    }

    pub fn solution_name(&self) -> &str {
        &self.solution_name
    }

    pub fn solution_version(&self) -> &str {
        &self.solution_version
    }

    pub fn invoice_types(&self) -> InvoiceTypes {
        self.invoice_types
    }

    /// EGS serial in the `1-solution|2-version|3-device` form.
    pub fn serial_number(&self) -> String {
        format!(
            "1-{}|2-{}|3-{}",
            self.solution_name, self.solution_version, self.device_serial_number
        )
    }

    /// Read a profile from a Java properties file. Solution name and version
    /// come from configuration rather than the file.
    pub fn from_properties(
        path: &Path,
        solution: &SolutionInfo,
    ) -> Result<MerchantProfile, ProfileError> {
        let pathbuf = path.to_path_buf();
        let file = File::open(path).map_err(|e| ProfileError::Io {
            path: pathbuf.clone(),
            source: e,
        })?;
        let dst_map = read(BufReader::new(file)).map_err(|e| ProfileError::PropertiesRead {
            path: pathbuf.clone(),
            source: e,
        })?;

        let req = |key: &str| -> Result<String, ProfileError> {
            dst_map
                .get(key)
                .map(|s| s.trim().to_string())
                .ok_or_else(|| ProfileError::MissingProperty {
                    path: pathbuf.clone(),
                    key: key.to_string(),
                })
        };

        MerchantProfile::new(
            req("csr.organization.identifier")?,
            req("csr.organization.name")?,
            req("csr.organization.unit.name")?,
            req("csr.common.name")?,
            req("csr.location.address")?,
            req("csr.industry.business.category")?,
            req("csr.device.serial.number")?,
            solution.name().to_string(),
            solution.version().to_string(),
            InvoiceTypes::from_title(&req("csr.invoice.type")?)?,
        )
    }
}
