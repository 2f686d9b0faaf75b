use thiserror::Error;

/// Raw error shape returned by the external HTTP services (video platform,
/// summarization backend). Carries the transport status plus the structured
/// reason code when the service supplied one.
#[derive(Error, Debug, Clone)]
#[error("HTTP {status}: {message}")]
pub struct ApiError {
    pub status: u16,
    pub reason: Option<String>,
    pub message: String,
}

impl ApiError {
    pub fn new(status: u16, reason: Option<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            reason,
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(0, None, message)
    }

    pub fn timeout(budget: std::time::Duration) -> Self {
        Self::new(
            0,
            Some("timeout".to_string()),
            format!("request timed out after {:?}", budget),
        )
    }

    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::new(0, Some("cancelled".to_string()), reason)
    }

    pub fn captions_not_available(video_id: &str) -> Self {
        Self::new(
            404,
            Some("captionsNotAvailable".to_string()),
            format!("no captions available for video {}", video_id),
        )
    }

    pub fn insufficient_scope() -> Self {
        Self::new(
            403,
            Some("insufficientPermissions".to_string()),
            "granted scopes do not include caption access",
        )
    }
}

/// Classification of a raw service error into the kinds downstream layers
/// act on. Consumers branch on this instead of string-matching messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    QuotaExceeded,
    PermissionDenied,
    NotAvailable,
    AuthInvalid,
    Unknown,
}

/// Terminal fetch failure surfaced to callers. Each variant keeps the human
/// message so the consuming UI can render it next to a kind-specific remedy.
#[derive(Error, Debug, Clone)]
pub enum FetchError {
    #[error("API quota exceeded: {0}")]
    QuotaExceeded(String),
    #[error("insufficient permissions: {0}")]
    PermissionDenied(String),
    #[error("resource not available: {0}")]
    NotAvailable(String),
    #[error("invalid credentials: {0}")]
    AuthInvalid(String),
    #[error("{0}")]
    Unknown(String),
}

impl FetchError {
    pub fn from_kind(kind: ErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        match kind {
            ErrorKind::QuotaExceeded => Self::QuotaExceeded(message),
            ErrorKind::PermissionDenied => Self::PermissionDenied(message),
            ErrorKind::NotAvailable => Self::NotAvailable(message),
            ErrorKind::AuthInvalid => Self::AuthInvalid(message),
            ErrorKind::Unknown => Self::Unknown(message),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::QuotaExceeded(_) => ErrorKind::QuotaExceeded,
            Self::PermissionDenied(_) => ErrorKind::PermissionDenied,
            Self::NotAvailable(_) => ErrorKind::NotAvailable,
            Self::AuthInvalid(_) => ErrorKind::AuthInvalid,
            Self::Unknown(_) => ErrorKind::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trip() {
        let kinds = [
            ErrorKind::QuotaExceeded,
            ErrorKind::PermissionDenied,
            ErrorKind::NotAvailable,
            ErrorKind::AuthInvalid,
            ErrorKind::Unknown,
        ];
        for kind in kinds {
            assert_eq!(FetchError::from_kind(kind, "msg").kind(), kind);
        }
    }

    #[test]
    fn messages_keep_detail() {
        let err = FetchError::from_kind(ErrorKind::QuotaExceeded, "daily limit reached");
        assert_eq!(err.to_string(), "API quota exceeded: daily limit reached");
    }
}
