use std::future::Future;
use std::pin::Pin;

use tracing::{debug, info, warn};

use crate::error::{ApiError, ErrorKind, FetchError};

/// A fetch result plus whether it was served from cache after a failed live
/// call. Degraded values may be stale; callers surface that to the user.
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched<T> {
    pub value: T,
    pub degraded: bool,
}

impl<T> Fetched<T> {
    pub fn fresh(value: T) -> Self {
        Self {
            value,
            degraded: false,
        }
    }

    pub fn degraded(value: T) -> Self {
        Self {
            value,
            degraded: true,
        }
    }
}

pub type Strategy<T> = Pin<Box<dyn Future<Output = Result<T, ApiError>> + Send>>;

/// One alternative fetch strategy with a short label for the log.
pub struct Alternative<T> {
    pub label: &'static str,
    pub attempt: Strategy<T>,
}

impl<T> Alternative<T> {
    pub fn new(label: &'static str, attempt: Strategy<T>) -> Self {
        Self { label, attempt }
    }
}

/// Run the primary strategy, then alternatives in order, with error-kind
/// specific policy:
///
/// - `QuotaExceeded` short-circuits to the emergency cache if present and
///   never tries further network alternatives (they would fail the same way
///   and waste quota).
/// - `PermissionDenied` tries the remaining alternatives first (a different
///   endpoint or format may not need the missing scope), then the emergency
///   cache.
/// - `NotAvailable` and `AuthInvalid` are terminal immediately; no cache
///   entry can substitute for a resource that does not exist, and invalid
///   credentials need the caller to re-authorize.
/// - `Unknown` is retried against the remaining alternatives, then surfaced
///   verbatim.
pub async fn execute<T, C, L, LFut>(
    primary: Strategy<T>,
    alternatives: Vec<Alternative<T>>,
    classify: C,
    emergency_lookup: L,
) -> Result<Fetched<T>, FetchError>
where
    C: Fn(&ApiError) -> ErrorKind,
    L: Fn() -> LFut,
    LFut: Future<Output = Option<T>>,
{
    let mut pending = vec![Alternative::new("primary", primary)];
    pending.extend(alternatives);

    let mut permission_failure: Option<ApiError> = None;
    let mut last_failure: Option<ApiError> = None;

    for strategy in pending {
        match strategy.attempt.await {
            Ok(value) => {
                if strategy.label != "primary" {
                    info!("fallback strategy '{}' succeeded", strategy.label);
                }
                return Ok(Fetched::fresh(value));
            }
            Err(err) => {
                let kind = classify(&err);
                warn!("strategy '{}' failed ({:?}): {}", strategy.label, kind, err);
                match kind {
                    ErrorKind::QuotaExceeded => {
                        if let Some(value) = emergency_lookup().await {
                            info!("quota exhausted, serving cached value as degraded");
                            return Ok(Fetched::degraded(value));
                        }
                        return Err(FetchError::QuotaExceeded(err.message));
                    }
                    ErrorKind::NotAvailable => {
                        return Err(FetchError::NotAvailable(err.message));
                    }
                    ErrorKind::AuthInvalid => {
                        return Err(FetchError::AuthInvalid(err.message));
                    }
                    ErrorKind::PermissionDenied => {
                        permission_failure = Some(err);
                    }
                    ErrorKind::Unknown => {
                        last_failure = Some(err);
                    }
                }
            }
        }
    }

    // 所有策略都失败了
    if let Some(err) = permission_failure {
        if let Some(value) = emergency_lookup().await {
            info!("permission denied everywhere, serving cached value as degraded");
            return Ok(Fetched::degraded(value));
        }
        return Err(FetchError::PermissionDenied(err.message));
    }

    match last_failure {
        Some(err) => {
            debug!("all strategies exhausted, surfacing last error verbatim");
            Err(FetchError::Unknown(err.message))
        }
        None => Err(FetchError::Unknown("no fetch strategy available".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::classify;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn quota_err() -> ApiError {
        ApiError::new(403, Some("quotaExceeded".to_string()), "quota exceeded")
    }

    fn permission_err() -> ApiError {
        ApiError::new(403, Some("insufficientPermissions".to_string()), "missing scope")
    }

    fn not_available_err() -> ApiError {
        ApiError::captions_not_available("vid")
    }

    fn counting_alternative(
        label: &'static str,
        calls: &Arc<AtomicUsize>,
        result: Result<String, ApiError>,
    ) -> Alternative<String> {
        let calls = calls.clone();
        Alternative::new(
            label,
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                result
            }),
        )
    }

    #[tokio::test]
    async fn primary_success_touches_nothing_else() {
        let alt_calls = Arc::new(AtomicUsize::new(0));
        let result = execute(
            Box::pin(async { Ok("live".to_string()) }),
            vec![counting_alternative("alt", &alt_calls, Ok("alt".to_string()))],
            classify,
            || async { Some("cached".to_string()) },
        )
        .await
        .unwrap();

        assert_eq!(result, Fetched::fresh("live".to_string()));
        assert_eq!(alt_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn quota_short_circuits_to_emergency_cache() {
        let alt_calls = Arc::new(AtomicUsize::new(0));
        let result = execute(
            Box::pin(async { Err::<String, _>(quota_err()) }),
            vec![counting_alternative("alt", &alt_calls, Ok("alt".to_string()))],
            classify,
            || async { Some("cached".to_string()) },
        )
        .await
        .unwrap();

        assert_eq!(result, Fetched::degraded("cached".to_string()));
        // No network alternative may run once quota is exhausted.
        assert_eq!(alt_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn quota_without_cache_is_terminal() {
        let alt_calls = Arc::new(AtomicUsize::new(0));
        let err = execute(
            Box::pin(async { Err::<String, _>(quota_err()) }),
            vec![counting_alternative("alt", &alt_calls, Ok("alt".to_string()))],
            classify,
            || async { None },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, FetchError::QuotaExceeded(_)));
        assert_eq!(alt_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn permission_denied_tries_alternatives_before_cache() {
        let alt_calls = Arc::new(AtomicUsize::new(0));
        let result = execute(
            Box::pin(async { Err::<String, _>(permission_err()) }),
            vec![counting_alternative(
                "alternate format",
                &alt_calls,
                Ok("from alternative".to_string()),
            )],
            classify,
            || async { Some("cached".to_string()) },
        )
        .await
        .unwrap();

        // The alternative's success is a normal, non-degraded result; the
        // primary's permission error never surfaces.
        assert_eq!(result, Fetched::fresh("from alternative".to_string()));
        assert_eq!(alt_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn permission_denied_falls_back_to_cache_after_alternatives() {
        let alt_calls = Arc::new(AtomicUsize::new(0));
        let result = execute(
            Box::pin(async { Err::<String, _>(permission_err()) }),
            vec![counting_alternative("alt", &alt_calls, Err(permission_err()))],
            classify,
            || async { Some("cached".to_string()) },
        )
        .await
        .unwrap();

        assert_eq!(result, Fetched::degraded("cached".to_string()));
        assert_eq!(alt_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn not_available_is_never_masked_by_cache() {
        let alt_calls = Arc::new(AtomicUsize::new(0));
        let err = execute(
            Box::pin(async { Err::<String, _>(not_available_err()) }),
            vec![counting_alternative("alt", &alt_calls, Ok("alt".to_string()))],
            classify,
            || async { Some("cached".to_string()) },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, FetchError::NotAvailable(_)));
        assert_eq!(alt_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn auth_invalid_is_terminal() {
        let err = execute(
            Box::pin(async {
                Err::<String, _>(ApiError::new(401, Some("invalid_token".to_string()), "expired"))
            }),
            vec![],
            classify,
            || async { Some("cached".to_string()) },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, FetchError::AuthInvalid(_)));
    }

    #[tokio::test]
    async fn unknown_retries_alternatives_then_surfaces_verbatim() {
        let alt_calls = Arc::new(AtomicUsize::new(0));
        let err = execute(
            Box::pin(async { Err::<String, _>(ApiError::new(500, None, "first blow-up")) }),
            vec![counting_alternative(
                "alt",
                &alt_calls,
                Err(ApiError::new(500, None, "second blow-up")),
            )],
            classify,
            || async { None },
        )
        .await
        .unwrap_err();

        assert_eq!(alt_calls.load(Ordering::SeqCst), 1);
        match err {
            FetchError::Unknown(message) => assert_eq!(message, "second blow-up"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn unknown_then_successful_alternative_recovers() {
        let alt_calls = Arc::new(AtomicUsize::new(0));
        let result = execute(
            Box::pin(async { Err::<String, _>(ApiError::new(500, None, "hiccup")) }),
            vec![counting_alternative("alt", &alt_calls, Ok("recovered".to_string()))],
            classify,
            || async { None },
        )
        .await
        .unwrap();

        assert_eq!(result, Fetched::fresh("recovered".to_string()));
    }
}
