use crate::error::{ApiError, ErrorKind, FetchError};

/// Classify a raw service error into one of the five error kinds.
///
/// The structured reason code from the platform response is authoritative.
/// Text heuristics only run when no recognizable reason code is present,
/// so their brittleness stays contained here.
pub fn classify(err: &ApiError) -> ErrorKind {
    if let Some(reason) = err.reason.as_deref() {
        match reason {
            "quotaExceeded" | "dailyLimitExceeded" | "rateLimitExceeded"
            | "userRateLimitExceeded" | "rate_limit_exceeded" | "insufficient_quota" => {
                return ErrorKind::QuotaExceeded
            }
            "forbidden" | "insufficientPermissions" | "accessNotConfigured"
            | "insufficient_scope" => return ErrorKind::PermissionDenied,
            "captionsNotAvailable" | "captionNotFound" | "videoNotFound" | "notFound"
            | "playlistNotFound" | "channelNotFound" => return ErrorKind::NotAvailable,
            "authError" | "invalid_token" | "expiredToken" | "invalid_grant"
            | "invalid_api_key" => return ErrorKind::AuthInvalid,
            _ => {}
        }
    }

    classify_by_text(err)
}

/// Normalize a raw service error into the surfaced taxonomy, preserving the
/// original message for diagnostics.
pub fn normalize(err: &ApiError) -> FetchError {
    FetchError::from_kind(classify(err), err.message.clone())
}

// 没有 reason code 时按消息文本推断
fn classify_by_text(err: &ApiError) -> ErrorKind {
    let message = err.message.to_lowercase();

    // Caption absence phrases come first: the platform reports them with the
    // same 403/404 statuses it uses for real permission problems.
    if message.contains("no captions available")
        || message.contains("no captions found")
        || message.contains("captions are not available")
        || message.contains("not publicly accessible")
        || message.contains("not have enabled third-party")
    {
        return ErrorKind::NotAvailable;
    }

    if err.status == 401
        && (message.contains("invalid token")
            || message.contains("token validation failed")
            || message.contains("token expired"))
    {
        return ErrorKind::AuthInvalid;
    }

    if (err.status == 403 || err.status == 401) && message.contains("quota") {
        return ErrorKind::QuotaExceeded;
    }

    if (err.status == 403 || err.status == 401)
        && (message.contains("permission")
            || message.contains("insufficient")
            || message.contains("required youtube api scopes"))
    {
        return ErrorKind::PermissionDenied;
    }

    match err.status {
        404 => ErrorKind::NotAvailable,
        401 => ErrorKind::AuthInvalid,
        429 => ErrorKind::QuotaExceeded,
        _ => ErrorKind::Unknown,
    }
}
