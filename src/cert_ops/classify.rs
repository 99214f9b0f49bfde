//! Maps raw openssl stderr text into the typed error taxonomy
//!
//! openssl's diagnostics are unstructured text, so substring matching is the
//! only available policy. The match result is wrapped immediately in
//! `EngineError` so nothing above this boundary pattern-matches on text again.
//! Fingerprints are checked in priority order; first match wins.

use crate::error::EngineError;

/// True when stderr carries the "modern openssl refusing an old cipher"
/// fingerprint (provider/algorithm fetch failure). The wording is openssl's,
/// not ours; a future release could change it and silently disable the legacy
/// retry path.
pub fn is_legacy_cipher_failure(stderr_lower: &str) -> bool {
    (stderr_lower.contains("digital envelope routines") && stderr_lower.contains("unsupported"))
        || stderr_lower.contains("fetch failed")
}

fn is_incorrect_password(stderr_lower: &str) -> bool {
    stderr_lower.contains("mac verify failure")
        || stderr_lower.contains("mac verify error")
        || stderr_lower.contains("bad decrypt")
        || stderr_lower.contains("invalid password")
        || (stderr_lower.contains("incorrect") && stderr_lower.contains("password"))
}

fn is_not_pkcs12(stderr_lower: &str) -> bool {
    stderr_lower.contains("expecting an asn1 sequence")
        || stderr_lower.contains("not a pkcs12")
        || (stderr_lower.contains("pkcs12")
            && (stderr_lower.contains("wrong tag")
                || stderr_lower.contains("nested asn1 error")
                || stderr_lower.contains("not enough data")))
}

/// Classify a failed openssl invocation.
///
/// When no fingerprint matches, non-empty stderr becomes the error message
/// verbatim; a bare "exit status N" is only surfaced when openssl produced no
/// diagnostics at all.
pub fn classify_failure(exit_code: Option<i32>, stderr: &str) -> EngineError {
    let lower = stderr.to_lowercase();
    let detail = stderr.trim().to_string();

    if is_legacy_cipher_failure(&lower) {
        EngineError::LegacyUnsupported { detail }
    } else if is_incorrect_password(&lower) {
        EngineError::IncorrectPassword { detail }
    } else if is_not_pkcs12(&lower) {
        EngineError::NotPkcs12 { detail }
    } else if !detail.is_empty() {
        EngineError::Tool(detail)
    } else {
        match exit_code {
            Some(code) => EngineError::Tool(format!(
                "openssl exited with status {} and produced no diagnostics",
                code
            )),
            None => EngineError::Tool(
                "openssl was terminated by a signal and produced no diagnostics".to_string(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classifies_legacy_cipher_failure() {
        let stderr = "Error outputting keys and certificates\n\
            40E7B6F5327F0000:error:0308010C:digital envelope routines:inner_evp_generic_fetch:\
            unsupported:crypto/evp/evp_fetch.c:349:Global default library context, \
            Algorithm (RC2-40-CBC : 0), Properties ()";
        let err = classify_failure(Some(1), stderr);
        assert!(err.is_legacy_unsupported());
    }

    #[test]
    fn test_classifies_incorrect_password() {
        for stderr in [
            "Mac verify error: invalid password?",
            "Error decrypting PKCS#12: mac verify failure",
            "error:1C800064:Provider routines::bad decrypt",
            "The password you entered was incorrect",
        ] {
            let err = classify_failure(Some(1), stderr);
            assert!(err.is_incorrect_password(), "stderr: {}", stderr);
        }
    }

    #[test]
    fn test_classifies_not_pkcs12() {
        for stderr in [
            "error:0688010A:asn1 encoding routines::nested asn1 error: Type=PKCS12",
            "Error: this file is not a PKCS12 container",
            "asn1 encoding routines: expecting an asn1 sequence",
            "asn1 encoding routines::wrong tag while decoding Type=PKCS12",
        ] {
            let err = classify_failure(Some(1), stderr);
            assert!(err.is_not_pkcs12(), "stderr: {}", stderr);
        }
    }

    #[test]
    fn test_legacy_wins_over_password() {
        // Priority order: the fetch failure fingerprint beats the password one
        // even when both co-occur.
        let stderr = "digital envelope routines: unsupported; Mac verify error: invalid password?";
        assert!(classify_failure(Some(1), stderr).is_legacy_unsupported());
    }

    #[test]
    fn test_unmatched_stderr_is_verbatim() {
        let err = classify_failure(Some(1), "unable to load certificate\n");
        match err {
            EngineError::Tool(msg) => assert_eq!(msg, "unable to load certificate"),
            other => panic!("unexpected classification: {:?}", other),
        }
    }

    #[test]
    fn test_empty_stderr_reports_exit_status() {
        match classify_failure(Some(2), "") {
            EngineError::Tool(msg) => assert!(msg.contains("status 2")),
            other => panic!("unexpected classification: {:?}", other),
        }
        match classify_failure(None, "  ") {
            EngineError::Tool(msg) => assert!(msg.contains("signal")),
            other => panic!("unexpected classification: {:?}", other),
        }
    }
}
