//! End-to-end tests for the `nfse-dps` binary.

use std::path::PathBuf;

use assert_cmd::Command;
use predicates::prelude::*;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn nfse_dps() -> Command {
    let mut cmd = Command::cargo_bin("nfse-dps").unwrap();
    cmd.env_remove("XSD_VALIDATOR_URL")
        .env_remove("XSD_VALIDATOR_TIMEOUT_SECS")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_build_to_stdout() {
    nfse_dps()
        .arg("build")
        .arg(fixture("documento_nacional.json"))
        .assert()
        .success()
        .stdout(predicate::str::starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?><DPS"))
        .stdout(predicate::str::contains(
            "<infDPS Id=\"DPS330455710001234567890900900000000000000015\">",
        ));
}

#[test]
fn test_build_to_file() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("dps.xml");

    nfse_dps()
        .arg("build")
        .arg(fixture("documento_exportacao.yaml"))
        .arg("--output")
        .arg(&out)
        .assert()
        .success()
        .stderr(predicate::str::contains("Saved to:"));

    let xml = std::fs::read_to_string(&out).unwrap();
    assert!(xml.contains("<exportacao><paisDest>PT</paisDest>"));
}

#[test]
fn test_build_rejects_bad_document() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("doc.json");
    std::fs::write(&input, r#"{"cabecalho": {}}"#).unwrap();

    nfse_dps()
        .arg("build")
        .arg(&input)
        .assert()
        .failure()
        .stderr(predicate::str::starts_with("Error: JSON error"));
}

#[test]
fn test_normalize_moves_signature() {
    nfse_dps()
        .arg("normalize")
        .arg(fixture("dps_assinada.xml"))
        .assert()
        .success()
        .stdout(predicate::str::contains("</infDPS><ds:Signature"))
        .stdout(predicate::str::contains(
            "versao=\"1.00\" xmlns:ds=\"http://www.w3.org/2000/09/xmldsig#\">",
        ));
}

#[test]
fn test_parse_prints_json() {
    nfse_dps()
        .arg("parse")
        .arg(fixture("nfse_resposta.xml"))
        .assert()
        .success()
        .stdout(predicate::str::contains("\"numeroNfse\": \"1024\""))
        .stdout(predicate::str::contains("\"ambiente\": \"homologacao\""));
}

#[test]
fn test_validate_with_unreachable_engine_is_advisory() {
    nfse_dps()
        .arg("validate")
        .arg(fixture("dps_assinada.xml"))
        .args(["--url", "http://127.0.0.1:9/validate", "--timeout", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"valid\": true"))
        .stdout(predicate::str::contains("engine unavailable"));
}

#[test]
fn test_missing_file_fails() {
    nfse_dps()
        .args(["parse", "/nonexistent/response.xml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("IO error"));
}
