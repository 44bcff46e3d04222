//! Configuration and environment selection.
use ::config::{Config as Settings, Environment};
use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};
use thiserror::Error;

/// ZATCA environment selection for API endpoints.
/// This determines which URL the API client will use, which CSR template name
/// is burned into certificate requests, and how reporting authenticates.
/// - Simulation: the developer portal. Reporting calls authenticate with the
///   configured test-mode credentials instead of the caller's bundle.
/// - Production: the live production environment.
///
/// # Examples
/// ```rust
/// use std::str::FromStr;
/// use zatca_core::config::EnvironmentType;
///
/// let env = EnvironmentType::from_str("Simulation")?;
/// assert_eq!(env, EnvironmentType::Simulation);
/// # Ok::<(), zatca_core::config::EnvironmentParseError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentType {
    Simulation,
    Production,
}

/// Error returned when parsing an [`EnvironmentType`] from a string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvironmentParseError {
    #[error("invalid environment type: {input}")]
    Invalid { input: String },
}

impl FromStr for EnvironmentType {
    type Err = EnvironmentParseError;
    fn from_str(env: &str) -> Result<EnvironmentType, EnvironmentParseError> {
        match env.trim().to_ascii_lowercase().as_str() {
            "simulation" => Ok(EnvironmentType::Simulation),
            "production" => Ok(EnvironmentType::Production),
            _ => Err(EnvironmentParseError::Invalid {
                input: env.to_string(),
            }),
        }
    }
}

impl EnvironmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvironmentType::Simulation => "simulation",
            EnvironmentType::Production => "production",
        }
    }

    pub fn endpoint_url(&self) -> &'static str {
        match self {
            EnvironmentType::Simulation => {
                "https://gw-fatoora.zatca.gov.sa/e-invoicing/developer-portal/"
            }
            EnvironmentType::Production => "https://gw-fatoora.zatca.gov.sa/e-invoicing/core/",
        }
    }
}

impl std::fmt::Display for EnvironmentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised while assembling a [`Config`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),
    #[error(transparent)]
    Environment(#[from] EnvironmentParseError),
    #[error("test-mode reporting credentials need both a username and a password")]
    IncompleteTestModeCredentials,
}

/// ERP/POS solution identity, stamped into the CSR serial number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolutionInfo {
    name: String,
    version: String,
}

impl SolutionInfo {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }
}

/// Where onboarding artifacts live on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoragePaths {
    certificate: PathBuf,
    secret: PathBuf,
    private_key: PathBuf,
    csr: PathBuf,
}

impl StoragePaths {
    pub fn new(
        certificate: impl Into<PathBuf>,
        secret: impl Into<PathBuf>,
        private_key: impl Into<PathBuf>,
        csr: impl Into<PathBuf>,
    ) -> Self {
        Self {
            certificate: certificate.into(),
            secret: secret.into(),
            private_key: private_key.into(),
            csr: csr.into(),
        }
    }

    pub fn certificate(&self) -> &Path {
        &self.certificate
    }

    pub fn secret(&self) -> &Path {
        &self.secret
    }

    pub fn private_key(&self) -> &Path {
        &self.private_key
    }

    pub fn csr(&self) -> &Path {
        &self.csr
    }
}

impl Default for StoragePaths {
    fn default() -> Self {
        Self::new(
            "storage/app/zatca/certificate.txt",
            "storage/app/zatca/secret.txt",
            "storage/app/zatca/private_key.pem",
            "storage/app/zatca/csr.pem",
        )
    }
}

/// Username/password pair sent as HTTP Basic credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct BasicCredentials {
    username: String,
    password: String,
}

impl BasicCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl std::fmt::Debug for BasicCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Transport settings for the HTTP client.
///
/// Only connection failures are retried: the request never reached the
/// authority, so resending it cannot duplicate a submission. Timeouts and
/// every HTTP status are surfaced immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpSettings {
    timeout: Duration,
    connect_retries: u32,
    retry_backoff: Duration,
}

impl HttpSettings {
    pub fn new(timeout: Duration, connect_retries: u32, retry_backoff: Duration) -> Self {
        Self {
            timeout,
            connect_retries,
            retry_backoff,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn connect_retries(&self) -> u32 {
        self.connect_retries
    }

    pub fn retry_backoff(&self) -> Duration {
        self.retry_backoff
    }
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self::new(
            Duration::from_secs(default_http_timeout_secs()),
            default_connect_retries(),
            Duration::from_millis(default_retry_backoff_ms()),
        )
    }
}

/// Configuration for the API client and the onboarding pipeline.
///
/// Resolved once, then handed to [`ZatcaClient::new`](crate::api::ZatcaClient::new).
///
/// # Examples
/// ```rust
/// use zatca_core::config::{BasicCredentials, Config, EnvironmentType};
///
/// let config = Config::new(EnvironmentType::Simulation)
///     .with_test_mode_reporting(BasicCredentials::new("user", "pass"));
/// assert_eq!(config.env(), EnvironmentType::Simulation);
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    env: EnvironmentType,
    base_url: Option<String>,
    otp: Option<String>,
    solution: SolutionInfo,
    storage: StoragePaths,
    test_mode_reporting: Option<BasicCredentials>,
    http: HttpSettings,
    log_level: String,
}

#[derive(Debug, Deserialize)]
struct EnvSettings {
    #[serde(default = "default_environment")]
    environment: String,
    otp: Option<String>,
    #[serde(default = "default_solution_name")]
    solution_name: String,
    #[serde(default = "default_solution_version")]
    version: String,
    certificate_path: Option<PathBuf>,
    secret_path: Option<PathBuf>,
    private_key_path: Option<PathBuf>,
    csr_path: Option<PathBuf>,
    test_mode_reporting_username: Option<String>,
    test_mode_reporting_password: Option<String>,
    base_url: Option<String>,
    #[serde(default = "default_http_timeout_secs")]
    http_timeout_secs: u64,
    #[serde(default = "default_connect_retries")]
    connect_retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    retry_backoff_ms: u64,
    #[serde(default = "default_log_level")]
    log_level: String,
}

fn default_environment() -> String {
    "simulation".to_string()
}

fn default_solution_name() -> String {
    "MyERP".to_string()
}

fn default_solution_version() -> String {
    "1.0.0".to_string()
}

fn default_http_timeout_secs() -> u64 {
    30
}

fn default_connect_retries() -> u32 {
    2
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn new(env: EnvironmentType) -> Self {
        Self {
            env,
            base_url: None,
            otp: None,
            solution: SolutionInfo::new(default_solution_name(), default_solution_version()),
            storage: StoragePaths::default(),
            test_mode_reporting: None,
            http: HttpSettings::default(),
            log_level: default_log_level(),
        }
    }

    /// Load configuration from `ZATCA_*` environment variables.
    ///
    /// # Errors
    /// Returns [`ConfigError`] for unknown environments, unparsable numbers, or
    /// a test-mode credential pair with only one half set.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_environment(Environment::with_prefix("ZATCA"))
    }

    pub(crate) fn from_environment(source: Environment) -> Result<Self, ConfigError> {
        let raw: EnvSettings = Settings::builder()
            .add_source(source)
            .build()?
            .try_deserialize()?;

        let env = EnvironmentType::from_str(&raw.environment)?;
        let defaults = StoragePaths::default();
        let storage = StoragePaths::new(
            raw.certificate_path
                .unwrap_or_else(|| defaults.certificate().to_path_buf()),
            raw.secret_path
                .unwrap_or_else(|| defaults.secret().to_path_buf()),
            raw.private_key_path
                .unwrap_or_else(|| defaults.private_key().to_path_buf()),
            raw.csr_path.unwrap_or_else(|| defaults.csr().to_path_buf()),
        );
        let test_mode_reporting = match (
            raw.test_mode_reporting_username,
            raw.test_mode_reporting_password,
        ) {
            (Some(username), Some(password)) => Some(BasicCredentials::new(username, password)),
            (None, None) => None,
            _ => return Err(ConfigError::IncompleteTestModeCredentials),
        };

        Ok(Self {
            env,
            base_url: raw.base_url.filter(|url| !url.trim().is_empty()),
            otp: raw.otp.filter(|otp| !otp.trim().is_empty()),
            solution: SolutionInfo::new(raw.solution_name, raw.version),
            storage,
            test_mode_reporting,
            http: HttpSettings::new(
                Duration::from_secs(raw.http_timeout_secs),
                raw.connect_retries,
                Duration::from_millis(raw.retry_backoff_ms),
            ),
            log_level: raw.log_level,
        })
    }

    /// Point the client at another gateway, e.g. a local mock of the authority.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_otp(mut self, otp: impl Into<String>) -> Self {
        self.otp = Some(otp.into());
        self
    }

    pub fn with_solution(mut self, solution: SolutionInfo) -> Self {
        self.solution = solution;
        self
    }

    pub fn with_storage(mut self, storage: StoragePaths) -> Self {
        self.storage = storage;
        self
    }

    pub fn with_test_mode_reporting(mut self, credentials: BasicCredentials) -> Self {
        self.test_mode_reporting = Some(credentials);
        self
    }

    pub fn with_http(mut self, http: HttpSettings) -> Self {
        self.http = http;
        self
    }

    pub fn env(&self) -> EnvironmentType {
        self.env
    }

    /// Gateway base URL, always ending in `/`.
    pub fn base_url(&self) -> String {
        match self.base_url.as_deref() {
            Some(value) if value.ends_with('/') => value.to_string(),
            Some(value) => format!("{value}/"),
            None => self.env.endpoint_url().to_string(),
        }
    }

    pub fn otp(&self) -> Option<&str> {
        self.otp.as_deref()
    }

    pub fn solution(&self) -> &SolutionInfo {
        &self.solution
    }

    pub fn storage(&self) -> &StoragePaths {
        &self.storage
    }

    pub fn test_mode_reporting(&self) -> Option<&BasicCredentials> {
        self.test_mode_reporting.as_ref()
    }

    pub fn http(&self) -> &HttpSettings {
        &self.http
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::new(EnvironmentType::Simulation)
    }
}
