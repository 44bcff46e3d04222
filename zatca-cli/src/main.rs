mod store;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;
use zatca_core::api::{Compliance, CsidCredentials, Production, SubmissionResult, ZatcaClient};
use zatca_core::config::Config;
use zatca_core::csr::{CertificateRequestBuilder, CsrTargets};
use zatca_core::envelope::SignedEnvelope;
use zatca_core::profile::MerchantProfile;
use zatca_core::qr::{EyeStyle, ModuleShape, PhaseOneQr, QrRenderOptions};

use store::CredentialStore;

#[derive(Parser)]
#[command(name = "zatca")]
#[command(about = "ZATCA e-invoicing onboarding, submission and QR codes")]
#[command(long_about = "Settings come from ZATCA_* environment variables \
    (ZATCA_ENVIRONMENT, ZATCA_OTP, ZATCA_CERTIFICATE_PATH, ...).")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a private key and CSR from a merchant properties file.
    Csr {
        #[arg(long)]
        profile: PathBuf,
        /// Defaults to ZATCA_PRIVATE_KEY_PATH.
        #[arg(long)]
        private_key: Option<PathBuf>,
        /// Defaults to ZATCA_CSR_PATH.
        #[arg(long)]
        csr: Option<PathBuf>,
    },
    /// Exchange the CSR and an OTP for a compliance certificate.
    Onboard {
        #[arg(long)]
        csr: Option<PathBuf>,
        /// Defaults to ZATCA_OTP.
        #[arg(long)]
        otp: Option<String>,
    },
    /// Validate a signed invoice with the stored compliance certificate.
    ComplianceCheck {
        #[command(flatten)]
        invoice: SubmissionArgs,
    },
    /// Exchange the stored compliance certificate for a production one.
    ProductionCsid {
        /// Defaults to the requestID saved by `onboard`.
        #[arg(long)]
        request_id: Option<u64>,
    },
    /// Report a signed invoice with the stored production certificate.
    Report {
        #[command(flatten)]
        invoice: SubmissionArgs,
    },
    /// Clear a signed invoice with the stored production certificate.
    Clear {
        #[command(flatten)]
        invoice: SubmissionArgs,
        /// Where to write the stamped invoice returned by the authority.
        #[arg(long)]
        cleared_output: Option<PathBuf>,
    },
    /// Render a Phase One QR code.
    Qr {
        #[arg(long)]
        seller_name: String,
        #[arg(long)]
        vat_number: String,
        /// RFC 3339, e.g. 2024-01-01T12:30:00Z.
        #[arg(long)]
        timestamp: DateTime<Utc>,
        #[arg(long)]
        total_with_vat: String,
        #[arg(long)]
        vat_total: String,
        #[arg(long, value_enum, default_value_t = QrFormat::Svg)]
        format: QrFormat,
        #[arg(long, default_value_t = 100)]
        size: u32,
        #[arg(long, default_value_t = 0)]
        margin: u32,
        #[arg(long, value_enum, default_value_t = ShapeArg::Square)]
        shape: ShapeArg,
        #[arg(long, value_enum, default_value_t = EyeArg::Square)]
        eye: EyeArg,
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[derive(Args)]
struct SubmissionArgs {
    /// Signed invoice XML.
    #[arg(long)]
    invoice: PathBuf,
    /// Invoice hash produced by the signer.
    #[arg(long)]
    hash: String,
    #[arg(long)]
    uuid: Uuid,
}

impl SubmissionArgs {
    fn envelope(&self) -> Result<SignedEnvelope> {
        let document = std::fs::read_to_string(&self.invoice)
            .with_context(|| format!("reading {}", self.invoice.display()))?;
        Ok(SignedEnvelope::new(document, self.hash.trim(), self.uuid))
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum QrFormat {
    Svg,
    Png,
}

#[derive(Clone, Copy, ValueEnum)]
enum ShapeArg {
    Square,
    Dot,
}

#[derive(Clone, Copy, ValueEnum)]
enum EyeArg {
    Square,
    Circle,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env().context("loading ZATCA_* configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.log_level())),
        )
        .with_writer(std::io::stderr)
        .init();

    run(cli.command, config).await
}

async fn run(command: Commands, config: Config) -> Result<()> {
    let store = CredentialStore::new(config.storage());
    match command {
        Commands::Csr {
            profile,
            private_key,
            csr,
        } => {
            let merchant = MerchantProfile::from_properties(&profile, config.solution())?;
            let targets = CsrTargets::new(
                private_key.unwrap_or_else(|| config.storage().private_key().to_path_buf()),
                csr.unwrap_or_else(|| config.storage().csr().to_path_buf()),
            );
            let artifacts = CertificateRequestBuilder::default().generate(
                &merchant,
                config.env(),
                &targets,
            )?;
            print!("{}", artifacts.csr_pem());
        }
        Commands::Onboard { csr, otp } => {
            let csr_path = csr.unwrap_or_else(|| config.storage().csr().to_path_buf());
            let csr_pem = std::fs::read_to_string(&csr_path)
                .with_context(|| format!("reading {}", csr_path.display()))?;
            let Some(otp) = otp.or_else(|| config.otp().map(str::to_string)) else {
                bail!("an OTP is required: pass --otp or set ZATCA_OTP");
            };
            let client = ZatcaClient::new(config.clone())?;
            let ccsid = client.request_compliance_certificate(&csr_pem, &otp).await?;
            store.save(&ccsid)?;
            info!(
                certificate = %config.storage().certificate().display(),
                "stored compliance certificate"
            );
            print_json(&serde_json::json!({
                "requestID": ccsid.request_id(),
                "dispositionMessage": ccsid.disposition_message(),
            }))?;
        }
        Commands::ComplianceCheck { invoice } => {
            let client = ZatcaClient::new(config.clone())?;
            let ccsid = store.load::<Compliance>(config.env())?;
            let result = client
                .check_invoice_compliance(&invoice.envelope()?, &ccsid)
                .await?;
            print_result(&result)?;
        }
        Commands::ProductionCsid { request_id } => {
            let client = ZatcaClient::new(config.clone())?;
            let stored = store.load::<Compliance>(config.env())?;
            let ccsid = match request_id {
                Some(id) => CsidCredentials::new(
                    stored.env(),
                    Some(id),
                    stored.binary_security_token(),
                    stored.secret(),
                ),
                None => stored,
            };
            let pcsid = client.exchange_for_production_certificate(&ccsid).await?;
            store.save(&pcsid)?;
            info!(
                certificate = %config.storage().certificate().display(),
                "stored production certificate"
            );
            print_json(&serde_json::json!({
                "requestID": pcsid.request_id(),
                "dispositionMessage": pcsid.disposition_message(),
            }))?;
        }
        Commands::Report { invoice } => {
            let client = ZatcaClient::new(config.clone())?;
            let pcsid = store.load::<Production>(config.env())?;
            let result = client.report_invoice(&invoice.envelope()?, &pcsid).await?;
            print_result(&result)?;
        }
        Commands::Clear {
            invoice,
            cleared_output,
        } => {
            let client = ZatcaClient::new(config.clone())?;
            let pcsid = store.load::<Production>(config.env())?;
            let result = client.clear_invoice(&invoice.envelope()?, &pcsid).await?;
            if let Some(path) = cleared_output {
                let cleared = result
                    .cleared_invoice()?
                    .context("clearance response has no clearedInvoice")?;
                std::fs::write(&path, cleared)
                    .with_context(|| format!("writing {}", path.display()))?;
            }
            print_result(&result)?;
        }
        Commands::Qr {
            seller_name,
            vat_number,
            timestamp,
            total_with_vat,
            vat_total,
            format,
            size,
            margin,
            shape,
            eye,
            output,
        } => {
            let qr = PhaseOneQr::new(seller_name, vat_number, timestamp, total_with_vat, vat_total)?;
            let options = QrRenderOptions {
                size,
                margin,
                module_shape: match shape {
                    ShapeArg::Square => ModuleShape::Square,
                    ShapeArg::Dot => ModuleShape::Dot,
                },
                eye_style: match eye {
                    EyeArg::Square => EyeStyle::Square,
                    EyeArg::Circle => EyeStyle::Circle,
                },
                ..QrRenderOptions::default()
            };
            let rendered = match format {
                QrFormat::Svg => qr.render_svg(&options)?,
                QrFormat::Png => qr.render_png_base64(&options)?,
            };
            match output {
                Some(path) => std::fs::write(&path, rendered)
                    .with_context(|| format!("writing {}", path.display()))?,
                None => println!("{rendered}"),
            }
        }
    }
    Ok(())
}

fn print_result(result: &SubmissionResult) -> Result<()> {
    print_json(result.body())
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
