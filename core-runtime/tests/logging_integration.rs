//! Integration tests for the logging helpers

use core_runtime::logging::{
    fingerprint, init_logging, redact_if_sensitive, LogFormat, LogLevel, LoggingConfig,
};

#[test]
fn test_second_initialization_fails() {
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Warn);

    // Only this test installs a global subscriber in this binary.
    init_logging(config.clone()).expect("first initialization");

    let err = init_logging(config).unwrap_err();
    assert!(err.to_string().contains("Failed to initialize logging"));
}

#[test]
fn test_credentials_are_redacted() {
    for field in ["access_token", "refresh_token", "accessToken", "password", "Authorization"] {
        assert_eq!(redact_if_sensitive(field, "value"), "[REDACTED]", "{field}");
    }
}

#[test]
fn test_login_identifier_is_masked() {
    let redacted = redact_if_sensitive("identifier", "pharmacist@clinic.example");

    assert!(redacted.starts_with('p'));
    assert!(redacted.contains("[REDACTED]"));
    assert!(!redacted.contains("clinic.example"));
}

#[test]
fn test_plain_values_pass_through() {
    assert_eq!(redact_if_sensitive("namespace", "hr"), "hr");
    assert_eq!(redact_if_sensitive("origin", "monitor"), "monitor");
    assert_eq!(redact_if_sensitive("status", "401"), "401");
}

#[test]
fn test_fingerprints_differ_for_rotated_tokens() {
    let before = fingerprint("header.payload.signature-0001");
    let after = fingerprint("header.payload.signature-0002");

    assert_ne!(before, after);
    assert!(!before.contains("payload"));
}
