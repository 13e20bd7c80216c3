use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, OnceLock};
use tracing::warn;

use super::{PrivateKey, PrivateKeyProvider, PublicKeyProvider, PublicKeySet};
use crate::error::KeyError;

type Memo<T> = Shared<BoxFuture<'static, Result<T, KeyError>>>;

/// Memoizing decorator over any key provider
///
/// The first call goes through to the wrapped provider, concurrent first
/// callers included, exactly once. Its result is returned for the lifetime of
/// the decorator, whether it succeeded or failed: a failed first fetch is
/// never retried.
///
/// The fetch runs on its own task, so a caller that gives up waiting (a
/// timeout, a cancelled RPC) does not abandon it; the next caller picks up
/// the same result.
///
/// ```rust,no_run
/// use network_claims::{CachedKeyProvider, UrlKeyProvider};
///
/// # fn example() -> Result<(), network_claims::KeyError> {
/// let url = "https://iam.example.com/.well-known/jwks.json".parse().unwrap();
/// let keys = CachedKeyProvider::new(UrlKeyProvider::new(url)?);
/// # Ok(())
/// # }
/// ```
pub struct CachedKeyProvider<P> {
    inner: Arc<P>,
    public_keys: OnceLock<Memo<PublicKeySet>>,
    private_key: OnceLock<Memo<PrivateKey>>,
}

impl<P> CachedKeyProvider<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner: Arc::new(inner),
            public_keys: OnceLock::new(),
            private_key: OnceLock::new(),
        }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }
}

impl<P: fmt::Debug> fmt::Debug for CachedKeyProvider<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedKeyProvider")
            .field("inner", &self.inner)
            .field("public_keys_fetched", &self.public_keys.get().is_some())
            .field("private_key_fetched", &self.private_key.get().is_some())
            .finish()
    }
}

fn log_memoized<T>(result: &Result<T, KeyError>, what: &str) {
    if let Err(err) = result {
        warn!(error = %err, "Caching {} failure for the lifetime of the provider", what);
    }
}

/// Spawn the one fetch and share its result with every caller
fn memoize<T, F>(fetch: F, what: &'static str) -> Memo<T>
where
    T: Clone + Send + Sync + 'static,
    F: Future<Output = Result<T, KeyError>> + Send + 'static,
{
    let task = tokio::spawn(async move {
        let result = fetch.await;
        log_memoized(&result, what);
        result
    });

    async move {
        task.await.unwrap_or_else(|e| {
            Err(KeyError::Configuration(format!(
                "{what} fetch task failed: {e}"
            )))
        })
    }
    .boxed()
    .shared()
}

#[async_trait]
impl<P: PublicKeyProvider + 'static> PublicKeyProvider for CachedKeyProvider<P> {
    async fn public_keys(&self) -> Result<PublicKeySet, KeyError> {
        let memo = self
            .public_keys
            .get_or_init(|| {
                let inner = Arc::clone(&self.inner);
                memoize(async move { inner.public_keys().await }, "public key set")
            })
            .clone();
        memo.await
    }
}

#[async_trait]
impl<P: PrivateKeyProvider + 'static> PrivateKeyProvider for CachedKeyProvider<P> {
    async fn private_key(&self) -> Result<PrivateKey, KeyError> {
        let memo = self
            .private_key
            .get_or_init(|| {
                let inner = Arc::clone(&self.inner);
                memoize(async move { inner.private_key().await }, "private key")
            })
            .clone();
        memo.await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::generate_ed25519;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    /// Fails on the first call, succeeds afterwards
    struct FlakyProvider {
        calls: AtomicU32,
        document: Vec<u8>,
    }

    #[async_trait]
    impl PublicKeyProvider for FlakyProvider {
        async fn public_keys(&self) -> Result<PublicKeySet, KeyError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(KeyError::Fetch {
                    url: "https://iam.example.com/jwks".to_string(),
                    message: "connection refused".to_string(),
                });
            }
            PublicKeySet::from_json(&self.document)
        }
    }

    fn flaky() -> FlakyProvider {
        FlakyProvider {
            calls: AtomicU32::new(0),
            document: generate_ed25519("k1").public_key_set().to_string().into_bytes(),
        }
    }

    #[tokio::test]
    async fn test_first_failure_is_memoized() {
        let cached = CachedKeyProvider::new(flaky());

        for _ in 0..3 {
            let err = cached.public_keys().await.unwrap_err();
            assert!(matches!(err, KeyError::Fetch { .. }));
        }

        assert_eq!(cached.inner().calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_first_success_is_memoized() {
        let provider = flaky();
        // Burn the failing call so the cache sees a success first
        assert!(provider.public_keys().await.is_err());
        let cached = CachedKeyProvider::new(provider);

        assert_eq!(cached.public_keys().await.unwrap().len(), 1);
        assert_eq!(cached.public_keys().await.unwrap().len(), 1);
        assert_eq!(cached.inner().calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_concurrent_first_calls_hit_inner_once() {
        let cached = Arc::new(CachedKeyProvider::new(flaky()));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let cached = Arc::clone(&cached);
                tokio::spawn(async move { cached.public_keys().await.is_err() })
            })
            .collect();

        for handle in handles {
            assert!(handle.await.unwrap());
        }
        assert_eq!(cached.inner().calls.load(Ordering::SeqCst), 1);
    }

    /// Fails slowly on the first call, succeeds afterwards
    struct SlowFlakyProvider {
        calls: AtomicU32,
        document: Vec<u8>,
    }

    #[async_trait]
    impl PublicKeyProvider for SlowFlakyProvider {
        async fn public_keys(&self) -> Result<PublicKeySet, KeyError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_secs(10)).await;
                return Err(KeyError::Status {
                    url: "https://iam.example.com/jwks".to_string(),
                    status: 503,
                });
            }
            PublicKeySet::from_json(&self.document)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_first_call_still_memoized() {
        let cached = CachedKeyProvider::new(SlowFlakyProvider {
            calls: AtomicU32::new(0),
            document: generate_ed25519("k1").public_key_set().to_string().into_bytes(),
        });

        let abandoned = tokio::time::timeout(Duration::from_secs(1), cached.public_keys()).await;
        assert!(abandoned.is_err());

        for _ in 0..2 {
            let err = cached.public_keys().await.unwrap_err();
            assert!(matches!(err, KeyError::Status { status: 503, .. }));
        }
        assert_eq!(cached.inner().calls.load(Ordering::SeqCst), 1);
    }
}
