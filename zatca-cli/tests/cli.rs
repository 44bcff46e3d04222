use base64ct::{Base64, Encoding};
use httpmock::Method::POST;
use httpmock::MockServer;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn cli_exe() -> &'static str {
    env!("CARGO_BIN_EXE_zatca")
}

fn profile_fixture() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("zatca-core")
        .join("tests")
        .join("fixtures")
        .join("merchant-profile.properties")
}

fn try_start_server() -> Option<MockServer> {
    std::panic::catch_unwind(MockServer::start).ok()
}

/// Command with storage under `dir` and nothing inherited from a real setup.
fn zatca(dir: &Path) -> Command {
    let mut cmd = Command::new(cli_exe());
    for (key, _) in std::env::vars() {
        if key.starts_with("ZATCA_") {
            cmd.env_remove(key);
        }
    }
    cmd.env_remove("RUST_LOG")
        .env("ZATCA_LOG_LEVEL", "warn")
        .env("ZATCA_CERTIFICATE_PATH", dir.join("certificate.txt"))
        .env("ZATCA_SECRET_PATH", dir.join("secret.txt"))
        .env("ZATCA_PRIVATE_KEY_PATH", dir.join("private_key.pem"))
        .env("ZATCA_CSR_PATH", dir.join("csr.pem"))
        .env("ZATCA_CONNECT_RETRIES", "0");
    cmd
}

fn assert_success(output: &Output, what: &str) {
    assert!(
        output.status.success(),
        "{what} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

/// A bundle as `onboard` / `production-csid` leave it on disk.
fn store_bundle(dir: &Path, environment: &str, scope: &str, certificate: &str, secret: &str) {
    std::fs::write(dir.join("certificate.txt"), certificate).unwrap();
    std::fs::write(dir.join("secret.txt"), secret).unwrap();
    let record = serde_json::json!({
        "environment": environment,
        "scope": scope,
        "requestID": 1234567890123u64,
    });
    std::fs::write(dir.join("certificate.txt.meta.json"), record.to_string()).unwrap();
}

fn stored_record(dir: &Path) -> serde_json::Value {
    let raw = std::fs::read_to_string(dir.join("certificate.txt.meta.json")).unwrap();
    serde_json::from_str(&raw).unwrap()
}

const INVOICE_UUID: &str = "8e6000cf-1a98-4174-b3e7-b5d5954bc10d";

fn submission_args(invoice: &Path) -> Vec<String> {
    vec![
        "--invoice".into(),
        invoice.display().to_string(),
        "--hash".into(),
        "abc=".into(),
        "--uuid".into(),
        INVOICE_UUID.into(),
    ]
}

/// Runs `onboard` against `server` in the simulation environment.
fn onboard(server: &MockServer, dir: &Path) {
    std::fs::write(dir.join("csr.pem"), "csr").unwrap();
    let mock = server.mock(|when, then| {
        when.method(POST).path("/compliance").header("OTP", "123345");
        then.status(200)
            .header("content-type", "application/json")
            .body(r#"{"requestID":1234567890123,"dispositionMessage":"ISSUED","binarySecurityToken":"SIMCERT","secret":"simsecret"}"#);
    });
    let output = zatca(dir)
        .env("ZATCA_ENVIRONMENT", "simulation")
        .env("ZATCA_BASE_URL", server.base_url())
        .args(["onboard", "--otp", "123345"])
        .output()
        .expect("run onboard command");
    assert_success(&output, "onboard");
    mock.assert();
}

fn write_invoice(dir: &Path) -> PathBuf {
    let path = dir.join("signed.xml");
    std::fs::write(&path, "<Invoice><ds:Signature/></Invoice>").unwrap();
    path
}

#[test]
fn csr_command_writes_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let output = zatca(dir.path())
        .args(["csr", "--profile", profile_fixture().to_str().unwrap()])
        .output()
        .expect("run csr command");

    assert_success(&output, "csr command");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("-----BEGIN CERTIFICATE REQUEST-----"));

    let csr_contents = std::fs::read_to_string(dir.path().join("csr.pem")).expect("read csr");
    let key_contents =
        std::fs::read_to_string(dir.path().join("private_key.pem")).expect("read key");
    assert_eq!(csr_contents, stdout);
    assert!(key_contents.contains("PRIVATE KEY"));
}

#[test]
fn csr_command_honours_explicit_paths() {
    let dir = tempfile::tempdir().unwrap();
    let csr_path = dir.path().join("out/generated.csr");
    let key_path = dir.path().join("out/keys/generated.pem");
    let output = zatca(dir.path())
        .args([
            "csr",
            "--profile",
            profile_fixture().to_str().unwrap(),
            "--csr",
            csr_path.to_str().unwrap(),
            "--private-key",
            key_path.to_str().unwrap(),
        ])
        .output()
        .expect("run csr command");

    assert_success(&output, "csr command");
    assert!(csr_path.exists(), "CSR output not written");
    assert!(key_path.exists(), "key output not written");
    assert!(!dir.path().join("csr.pem").exists());
}

#[test]
fn csr_command_rejects_invalid_profile() {
    let dir = tempfile::tempdir().unwrap();
    let profile = dir.path().join("bad.properties");
    let contents = std::fs::read_to_string(profile_fixture())
        .unwrap()
        .replace("csr.organization.identifier=399999999900003", "csr.organization.identifier=3999");
    std::fs::write(&profile, contents).unwrap();

    let output = zatca(dir.path())
        .args(["csr", "--profile", profile.to_str().unwrap()])
        .output()
        .expect("run csr command");

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("vat_number"));
    assert!(!dir.path().join("private_key.pem").exists());
}

#[test]
fn qr_command_renders_svg_and_png() {
    let dir = tempfile::tempdir().unwrap();
    let base_args = [
        "qr",
        "--seller-name",
        "Acme",
        "--vat-number",
        "123456789123456",
        "--timestamp",
        "2024-01-01T12:30:00Z",
        "--total-with-vat",
        "115.00",
        "--vat-total",
        "15.00",
    ];

    let output = zatca(dir.path())
        .args(base_args)
        .args(["--eye", "circle", "--size", "200"])
        .output()
        .expect("run qr command");
    assert_success(&output, "qr svg");
    let svg = String::from_utf8_lossy(&output.stdout);
    assert!(svg.contains("<svg"));
    assert!(svg.contains(r#"width="200""#));

    let png_path = dir.path().join("qr.txt");
    let output = zatca(dir.path())
        .args(base_args)
        .args(["--format", "png", "--output", png_path.to_str().unwrap()])
        .output()
        .expect("run qr command");
    assert_success(&output, "qr png");
    let encoded = std::fs::read_to_string(&png_path).unwrap();
    let png = Base64::decode_vec(encoded.trim()).unwrap();
    assert_eq!(&png[1..4], b"PNG");
}

#[test]
fn qr_command_requires_valid_vat() {
    let dir = tempfile::tempdir().unwrap();
    let output = zatca(dir.path())
        .args([
            "qr",
            "--seller-name",
            "Acme",
            "--vat-number",
            "12345",
            "--timestamp",
            "2024-01-01T12:30:00Z",
            "--total-with-vat",
            "115.00",
            "--vat-total",
            "15.00",
        ])
        .output()
        .expect("run qr command");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("vat_number"));
}

#[test]
fn onboard_stores_compliance_certificate() {
    let server = match try_start_server() {
        Some(server) => server,
        None => return,
    };
    let dir = tempfile::tempdir().unwrap();
    let csr_pem = "-----BEGIN CERTIFICATE REQUEST-----\nMIIB\n-----END CERTIFICATE REQUEST-----\n";
    std::fs::write(dir.path().join("csr.pem"), csr_pem).unwrap();

    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/compliance")
            .header("OTP", "123345")
            .json_body(serde_json::json!({ "csr": Base64::encode_string(csr_pem.as_bytes()) }));
        then.status(200)
            .header("content-type", "application/json")
            .body(r#"{"requestID":1234567890123,"dispositionMessage":"ISSUED","binarySecurityToken":"TUlJQ0lq","secret":"s3cr3t"}"#);
    });

    let output = zatca(dir.path())
        .env("ZATCA_BASE_URL", server.base_url())
        .env("ZATCA_OTP", "123345")
        .arg("onboard")
        .output()
        .expect("run onboard command");

    assert_success(&output, "onboard");
    mock.assert();
    let stdout: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(stdout["requestID"], 1234567890123u64);
    assert_eq!(
        std::fs::read_to_string(dir.path().join("certificate.txt")).unwrap(),
        "TUlJQ0lq"
    );
    assert_eq!(
        std::fs::read_to_string(dir.path().join("secret.txt")).unwrap(),
        "s3cr3t"
    );
    let record = stored_record(dir.path());
    assert_eq!(record["environment"], "simulation");
    assert_eq!(record["scope"], "compliance");
    assert_eq!(record["requestID"], 1234567890123u64);
}

#[test]
fn onboard_surfaces_authority_rejection() {
    let server = match try_start_server() {
        Some(server) => server,
        None => return,
    };
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("csr.pem"), "csr").unwrap();
    server.mock(|when, then| {
        when.method(POST).path("/compliance");
        then.status(400).body(r#"{"error":"INVALID_OTP"}"#);
    });

    let output = zatca(dir.path())
        .env("ZATCA_BASE_URL", server.base_url())
        .args(["onboard", "--otp", "000000"])
        .output()
        .expect("run onboard command");

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("INVALID_OTP"));
    assert!(!dir.path().join("certificate.txt").exists());
}

#[test]
fn production_report_uses_stored_certificate() {
    let server = match try_start_server() {
        Some(server) => server,
        None => return,
    };
    let dir = tempfile::tempdir().unwrap();
    store_bundle(dir.path(), "production", "production", "cert\n", "secret\n");
    let invoice = write_invoice(dir.path());

    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/invoices/reporting/single")
            .header(
                "authorization",
                format!("Basic {}", Base64::encode_string(b"cert:secret")),
            )
            .header("clearance-status", "1");
        then.status(202)
            .header("content-type", "application/json")
            .body(r#"{"reportingStatus":"REPORTED","validationResults":{"status":"WARNING"}}"#);
    });

    let output = zatca(dir.path())
        .env("ZATCA_ENVIRONMENT", "production")
        .env("ZATCA_BASE_URL", server.base_url())
        .args([
            "report",
            "--invoice",
            invoice.to_str().unwrap(),
            "--hash",
            "abc=",
            "--uuid",
            "8e6000cf-1a98-4174-b3e7-b5d5954bc10d",
        ])
        .output()
        .expect("run report command");

    assert_success(&output, "report");
    mock.assert();
    let stdout: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(stdout["reportingStatus"], "REPORTED");
}

#[test]
fn clear_writes_stamped_invoice() {
    let server = match try_start_server() {
        Some(server) => server,
        None => return,
    };
    let dir = tempfile::tempdir().unwrap();
    store_bundle(dir.path(), "simulation", "production", "cert", "secret");
    let invoice = write_invoice(dir.path());
    let cleared_path = dir.path().join("cleared.xml");

    let mock = server.mock(|when, then| {
        when.method(POST).path("/invoices/clearance/single");
        then.status(200)
            .header("content-type", "application/json")
            .json_body(serde_json::json!({
                "clearanceStatus": "CLEARED",
                "clearedInvoice": Base64::encode_string(b"<Invoice>stamped</Invoice>"),
            }));
    });

    let output = zatca(dir.path())
        .env("ZATCA_BASE_URL", server.base_url())
        .args([
            "clear",
            "--invoice",
            invoice.to_str().unwrap(),
            "--hash",
            "abc=",
            "--uuid",
            "8e6000cf-1a98-4174-b3e7-b5d5954bc10d",
            "--cleared-output",
            cleared_path.to_str().unwrap(),
        ])
        .output()
        .expect("run clear command");

    assert_success(&output, "clear");
    mock.assert();
    assert_eq!(
        std::fs::read_to_string(&cleared_path).unwrap(),
        "<Invoice>stamped</Invoice>"
    );
}

#[test]
fn compliance_check_uses_stored_compliance_certificate() {
    let server = match try_start_server() {
        Some(server) => server,
        None => return,
    };
    let dir = tempfile::tempdir().unwrap();
    store_bundle(dir.path(), "simulation", "compliance", "ccsid", "ccsecret");
    let invoice = write_invoice(dir.path());

    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/compliance/invoices")
            .header(
                "authorization",
                format!("Basic {}", Base64::encode_string(b"ccsid:ccsecret")),
            )
            .json_body(serde_json::json!({
                "invoiceHash": Base64::encode_string(b"abc="),
                "uuid": INVOICE_UUID,
                "invoice": Base64::encode_string(b"<Invoice><ds:Signature/></Invoice>"),
            }));
        then.status(200)
            .header("content-type", "application/json")
            .body(r#"{"validationResults":{"status":"PASS"},"reportingStatus":"REPORTED"}"#);
    });

    let output = zatca(dir.path())
        .env("ZATCA_BASE_URL", server.base_url())
        .arg("compliance-check")
        .args(submission_args(&invoice))
        .output()
        .expect("run compliance-check command");

    assert_success(&output, "compliance-check");
    mock.assert();
    let stdout: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(stdout["validationResults"]["status"], "PASS");
}

#[test]
fn production_csid_replaces_compliance_bundle() {
    let server = match try_start_server() {
        Some(server) => server,
        None => return,
    };
    let dir = tempfile::tempdir().unwrap();
    onboard(&server, dir.path());

    let exchange = server.mock(|when, then| {
        when.method(POST)
            .path("/production/csids")
            .header(
                "authorization",
                format!("Basic {}", Base64::encode_string(b"SIMCERT:simsecret")),
            )
            .json_body(serde_json::json!({ "compliance_request_id": 987654321 }));
        then.status(200)
            .header("content-type", "application/json")
            .body(r#"{"requestID":30368,"dispositionMessage":"ISSUED","binarySecurityToken":"PRODCERT","secret":"prodsecret"}"#);
    });

    let output = zatca(dir.path())
        .env("ZATCA_BASE_URL", server.base_url())
        .args(["production-csid", "--request-id", "987654321"])
        .output()
        .expect("run production-csid command");

    assert_success(&output, "production-csid");
    exchange.assert();
    let stdout: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(stdout["requestID"], 30368);
    assert_eq!(
        std::fs::read_to_string(dir.path().join("certificate.txt")).unwrap(),
        "PRODCERT"
    );
    assert_eq!(
        std::fs::read_to_string(dir.path().join("secret.txt")).unwrap(),
        "prodsecret"
    );
    let record = stored_record(dir.path());
    assert_eq!(record["environment"], "simulation");
    assert_eq!(record["scope"], "production");

    // The compliance bundle is gone, so a second exchange has nothing to use.
    let output = zatca(dir.path())
        .env("ZATCA_BASE_URL", server.base_url())
        .arg("production-csid")
        .output()
        .expect("run production-csid command");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("needs a compliance CSID"));
    assert_eq!(exchange.hits(), 1);
}

#[test]
fn production_csid_defaults_to_stored_request_id() {
    let server = match try_start_server() {
        Some(server) => server,
        None => return,
    };
    let dir = tempfile::tempdir().unwrap();
    onboard(&server, dir.path());

    let exchange = server.mock(|when, then| {
        when.method(POST)
            .path("/production/csids")
            .json_body(serde_json::json!({ "compliance_request_id": 1234567890123u64 }));
        then.status(200)
            .header("content-type", "application/json")
            .body(r#"{"requestID":30368,"binarySecurityToken":"PRODCERT","secret":"prodsecret"}"#);
    });

    let output = zatca(dir.path())
        .env("ZATCA_BASE_URL", server.base_url())
        .arg("production-csid")
        .output()
        .expect("run production-csid command");

    assert_success(&output, "production-csid");
    exchange.assert();
}

#[test]
fn report_refuses_compliance_certificate() {
    let server = match try_start_server() {
        Some(server) => server,
        None => return,
    };
    let dir = tempfile::tempdir().unwrap();
    onboard(&server, dir.path());
    let invoice = write_invoice(dir.path());
    let reporting = server.mock(|when, then| {
        when.method(POST).path("/invoices/reporting/single");
        then.status(200).body("{}");
    });

    let output = zatca(dir.path())
        .env("ZATCA_BASE_URL", server.base_url())
        .env("ZATCA_TEST_MODE_REPORTING_USERNAME", "test-user")
        .env("ZATCA_TEST_MODE_REPORTING_PASSWORD", "test-pass")
        .arg("report")
        .args(submission_args(&invoice))
        .output()
        .expect("run report command");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("compliance scope"), "{stderr}");
    assert!(stderr.contains("needs a production CSID"), "{stderr}");
    assert_eq!(reporting.hits(), 0);
}

#[test]
fn report_refuses_bundle_from_other_environment() {
    let server = match try_start_server() {
        Some(server) => server,
        None => return,
    };
    let dir = tempfile::tempdir().unwrap();
    onboard(&server, dir.path());
    server.mock(|when, then| {
        when.method(POST).path("/production/csids");
        then.status(200)
            .header("content-type", "application/json")
            .body(r#"{"requestID":30368,"binarySecurityToken":"PRODCERT","secret":"prodsecret"}"#);
    });
    let output = zatca(dir.path())
        .env("ZATCA_BASE_URL", server.base_url())
        .arg("production-csid")
        .output()
        .expect("run production-csid command");
    assert_success(&output, "production-csid");

    let invoice = write_invoice(dir.path());
    let reporting = server.mock(|when, then| {
        when.method(POST).path("/invoices/reporting/single");
        then.status(200).body("{}");
    });

    let output = zatca(dir.path())
        .env("ZATCA_ENVIRONMENT", "production")
        .env("ZATCA_BASE_URL", server.base_url())
        .arg("report")
        .args(submission_args(&invoice))
        .output()
        .expect("run report command");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("issued for simulation, but the configured environment is production"),
        "{stderr}"
    );
    assert_eq!(reporting.hits(), 0);
}
