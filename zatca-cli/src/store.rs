//! Certificate and secret files at the configured storage paths.
//!
//! Each bundle is saved with a JSON record next to the certificate naming the
//! environment and scope it was issued for. Loading checks both.
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};
use zatca_core::api::{CsidCredentials, TokenScope};
use zatca_core::config::{EnvironmentType, StoragePaths};

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BundleRecord {
    environment: EnvironmentType,
    scope: String,
    #[serde(rename = "requestID")]
    request_id: Option<u64>,
}

pub struct CredentialStore<'a> {
    paths: &'a StoragePaths,
}

impl<'a> CredentialStore<'a> {
    pub fn new(paths: &'a StoragePaths) -> Self {
        Self { paths }
    }

    /// Overwrites whatever bundle was stored before.
    pub fn save<T: TokenScope>(&self, credentials: &CsidCredentials<T>) -> Result<()> {
        write(self.paths.certificate(), credentials.binary_security_token())?;
        write(self.paths.secret(), credentials.secret())?;
        let record = BundleRecord {
            environment: credentials.env(),
            scope: T::NAME.to_string(),
            request_id: credentials.request_id(),
        };
        write(&self.record_path(), &serde_json::to_string_pretty(&record)?)
    }

    /// Loads the stored bundle, refusing one issued for another environment
    /// or scope.
    pub fn load<T: TokenScope>(&self, env: EnvironmentType) -> Result<CsidCredentials<T>> {
        let record_path = self.record_path();
        let raw = read(&record_path).context("no stored CSID found; run `zatca onboard` first")?;
        let record: BundleRecord = serde_json::from_str(&raw)
            .with_context(|| format!("parsing {}", record_path.display()))?;

        if record.environment != env {
            bail!(
                "stored {} CSID was issued for {}, but the configured environment is {}",
                record.scope,
                record.environment,
                env
            );
        }
        if record.scope != T::NAME {
            bail!(
                "stored CSID has {} scope, but this command needs a {} CSID",
                record.scope,
                T::NAME
            );
        }

        let certificate = read(self.paths.certificate())?;
        let secret = read(self.paths.secret())?;
        Ok(CsidCredentials::new(
            record.environment,
            record.request_id,
            certificate,
            secret,
        ))
    }

    fn record_path(&self) -> PathBuf {
        let mut path = self.paths.certificate().as_os_str().to_owned();
        path.push(".meta.json");
        PathBuf::from(path)
    }
}

fn write(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating storage directory {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("writing {}", path.display()))
}

fn read(path: &Path) -> Result<String> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(contents.trim().to_string())
}
