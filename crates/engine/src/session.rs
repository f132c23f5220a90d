//! Calls that carry an access token.

use std::future::Future;

use radar_core::error::RemoteError;
use radar_core::ports::{AccessToken, SessionProvider};

/// Run `call` with a current access token. If the remote reports the
/// session expired, force one refresh and retry exactly once; a second
/// expiry is returned to the caller.
pub async fn call_with_session<T, F, Fut>(
    session: &dyn SessionProvider,
    mut call: F,
) -> Result<T, RemoteError>
where
    F: FnMut(AccessToken) -> Fut,
    Fut: Future<Output = Result<T, RemoteError>>,
{
    let token = session.access_token().await?;
    match call(token).await {
        Err(RemoteError::SessionExpired) => {
            tracing::info!("Access token rejected, refreshing session");
            let token = session.force_refresh().await?;
            call(token).await
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use radar_core::types::UserId;

    use super::*;

    #[derive(Default)]
    struct CountingSession {
        refreshes: AtomicU32,
    }

    #[async_trait]
    impl SessionProvider for CountingSession {
        async fn access_token(&self) -> Result<AccessToken, RemoteError> {
            Ok(AccessToken::new("stale"))
        }

        async fn force_refresh(&self) -> Result<AccessToken, RemoteError> {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            Ok(AccessToken::new("fresh"))
        }

        fn user_id(&self) -> Option<UserId> {
            None
        }
    }

    #[tokio::test]
    async fn retries_once_with_fresh_token() {
        let session = CountingSession::default();
        let calls = AtomicU32::new(0);

        let result = call_with_session(&session, |token| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if token.as_str() == "stale" {
                    Err(RemoteError::SessionExpired)
                } else {
                    Ok(7)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(session.refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn second_expiry_is_surfaced() {
        let session = CountingSession::default();
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = call_with_session(&session, |_token| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(RemoteError::SessionExpired) }
        })
        .await;

        assert_eq!(result, Err(RemoteError::SessionExpired));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let session = CountingSession::default();
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = call_with_session(&session, |_token| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(RemoteError::Unavailable("down".into())) }
        })
        .await;

        assert!(matches!(result, Err(RemoteError::Unavailable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(session.refreshes.load(Ordering::SeqCst), 0);
    }
}
