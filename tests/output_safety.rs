//! Integration tests for output handling: no silent overwrites, sibling
//! suggestions, and the Base64 operations that need no external tool.

use certkit::cert_ops::Engine;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const CERT_PEM: &str = "-----BEGIN CERTIFICATE-----\nMIIBkTCB+wIJAL\n-----END CERTIFICATE-----\n";

#[tokio::test]
async fn test_base64_roundtrip() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("server.pem");
    std::fs::write(&input, CERT_PEM).unwrap();

    let engine = Engine::with_defaults();
    let cancel = CancellationToken::new();

    let encoded = engine.to_base64(&cancel, &input, None).await.unwrap();
    assert_eq!(encoded, dir.path().join("server.b64"));
    let text = std::fs::read_to_string(&encoded).unwrap();
    assert!(text.ends_with('\n'));
    assert!(!text.trim_end().contains(char::is_whitespace));

    let decoded = engine
        .from_base64(&cancel, &encoded, Some(&dir.path().join("restored.pem")))
        .await
        .unwrap();
    assert_eq!(std::fs::read_to_string(decoded).unwrap(), CERT_PEM);
}

#[tokio::test]
async fn test_base64_default_decode_name_strips_extension() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("server.pem.b64");
    std::fs::write(&input, "aGVsbG8=\n").unwrap();

    let engine = Engine::with_defaults();
    let cancel = CancellationToken::new();

    let decoded = engine.from_base64(&cancel, &input, None).await.unwrap();
    assert_eq!(decoded, dir.path().join("server.pem"));
    assert_eq!(std::fs::read(decoded).unwrap(), b"hello");
}

#[tokio::test]
async fn test_existing_output_is_never_overwritten() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("server.pem");
    std::fs::write(&input, CERT_PEM).unwrap();
    let existing = dir.path().join("server.b64");
    std::fs::write(&existing, "precious bytes").unwrap();

    let engine = Engine::with_defaults();
    let cancel = CancellationToken::new();

    let err = engine.to_base64(&cancel, &input, None).await.unwrap_err();
    assert!(err.is_output_exists());
    assert_eq!(
        err.suggestion().unwrap(),
        dir.path().join("server-1.b64").as_path()
    );
    assert_eq!(std::fs::read_to_string(&existing).unwrap(), "precious bytes");
}

#[tokio::test]
async fn test_suggestion_skips_taken_siblings() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("server.pem");
    std::fs::write(&input, CERT_PEM).unwrap();
    std::fs::write(dir.path().join("server.b64"), "x").unwrap();
    std::fs::write(dir.path().join("server-1.b64"), "x").unwrap();

    let engine = Engine::with_defaults();
    let cancel = CancellationToken::new();

    let err = engine.to_base64(&cancel, &input, None).await.unwrap_err();
    assert_eq!(
        err.suggestion().unwrap(),
        dir.path().join("server-2.b64").as_path()
    );
}

#[tokio::test]
async fn test_invalid_base64_input_is_rejected() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("garbage.b64");
    std::fs::write(&input, "this is &&& not base64").unwrap();

    let engine = Engine::with_defaults();
    let cancel = CancellationToken::new();

    let err = engine.from_base64(&cancel, &input, None).await.unwrap_err();
    assert!(err.to_string().contains("Base64"));
    assert!(!dir.path().join("garbage").exists());
}
