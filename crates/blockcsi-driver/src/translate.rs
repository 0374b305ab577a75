//! Backend error translation
//!
//! Maps [`ApiError`]s onto [`CsiError`]. The attach-limit check matches the
//! provider's free-text message because the API exposes no structured code
//! for that condition; [`is_attach_limit`] is the only place that knows the
//! phrase.

use blockcsi_cloud::ApiError;
use regex::Regex;
use std::sync::LazyLock;
use tracing::warn;

use crate::error::CsiError;

const ATTACH_LIMIT_PATTERN: &str =
    r"Due to internal limitations, it is currently not possible to attach more than \d+ volumes";

static ATTACH_LIMIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(ATTACH_LIMIT_PATTERN).expect("valid attach limit pattern"));

/// Translate a backend failure of `operation`.
///
/// Not-found responses become [`CsiError::NotFound`]; everything else is
/// treated as transient and becomes [`CsiError::Aborted`].
pub fn translate(error: &ApiError, operation: &str) -> CsiError {
    if error.is_not_found() {
        warn!(operation, %error, "server or volume not found");
        return CsiError::NotFound(error.to_string());
    }

    warn!(operation, %error, "backend operation failed");
    match error {
        ApiError::Response { .. } => CsiError::Aborted(format!("{operation}: request failed")),
        other => CsiError::Aborted(format!("{operation}: {other}")),
    }
}

/// Check a backend error for the per-server attach limit
#[must_use]
pub fn is_attach_limit(error: &ApiError) -> bool {
    let message = match error {
        ApiError::Response { detail, .. } => detail.as_str(),
        _ => return false,
    };
    ATTACH_LIMIT.is_match(message)
}

/// Translate a failed attach, reporting the attach limit as
/// [`CsiError::ResourceExhausted`] regardless of status.
pub fn translate_attach(error: &ApiError, operation: &str) -> CsiError {
    if is_attach_limit(error) {
        warn!(operation, %error, "server attach limit reached");
        return CsiError::ResourceExhausted(error.to_string());
    }
    translate(error, operation)
}
