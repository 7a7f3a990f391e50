use nd_core::{ArticleStorage, Error, Result};
use std::sync::Arc;
#[cfg(any(feature = "sqlite", feature = "postgres"))]
use std::{future::Future, time::Duration};
#[cfg(any(feature = "sqlite", feature = "postgres"))]
use tracing::{info, warn};

pub mod backends;

pub use backends::*;

#[cfg(any(feature = "sqlite", feature = "postgres"))]
const CONNECT_ATTEMPTS: u32 = 3;

/// Build a storage backend from a database URL.
///
/// `memory` (or `memory://`) selects the in-process store, `sqlite:<path>`
/// selects SQLite and `postgres://...` selects PostgreSQL, each when the
/// matching feature is enabled. Connecting is retried a few times before
/// giving up.
pub async fn create_storage(database_url: &str) -> Result<Arc<dyn ArticleStorage>> {
    let kind = database_url.split(':').next().unwrap_or_default();
    match kind {
        "memory" => Ok(Arc::new(InMemoryStorage::new())),
        "sqlite" => open_sqlite(database_url).await,
        "postgres" | "postgresql" => open_postgres(database_url).await,
        other => Err(Error::Config(format!(
            "Unsupported storage backend '{}' in database url '{}'",
            other, database_url
        ))),
    }
}

#[cfg(feature = "sqlite")]
async fn open_sqlite(database_url: &str) -> Result<Arc<dyn ArticleStorage>> {
    connect_with_retry("SQLite", || async move {
        let storage = SQLiteStorage::new_with_url(database_url).await?;
        Ok(Arc::new(storage) as Arc<dyn ArticleStorage>)
    })
    .await
}

#[cfg(not(feature = "sqlite"))]
async fn open_sqlite(database_url: &str) -> Result<Arc<dyn ArticleStorage>> {
    Err(missing_feature(database_url, "sqlite"))
}

#[cfg(feature = "postgres")]
async fn open_postgres(database_url: &str) -> Result<Arc<dyn ArticleStorage>> {
    connect_with_retry("PostgreSQL", || async move {
        let storage = PgStorage::new_with_url(database_url).await?;
        Ok(Arc::new(storage) as Arc<dyn ArticleStorage>)
    })
    .await
}

#[cfg(not(feature = "postgres"))]
async fn open_postgres(database_url: &str) -> Result<Arc<dyn ArticleStorage>> {
    Err(missing_feature(database_url, "postgres"))
}

#[cfg(not(all(feature = "sqlite", feature = "postgres")))]
fn missing_feature(database_url: &str, feature: &str) -> Error {
    Error::Config(format!(
        "'{}' needs the {} feature of nd_storage",
        database_url, feature
    ))
}

#[cfg(any(feature = "sqlite", feature = "postgres"))]
async fn connect_with_retry<F, Fut>(backend: &str, connect: F) -> Result<Arc<dyn ArticleStorage>>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<Arc<dyn ArticleStorage>>>,
{
    let mut attempt = 1;
    loop {
        match connect().await {
            Ok(storage) => {
                info!(backend, "Storage ready");
                return Ok(storage);
            }
            Err(e) if attempt < CONNECT_ATTEMPTS => {
                warn!(
                    "{} initialization failed ({}), retrying {}/{}...",
                    backend, e, attempt, CONNECT_ATTEMPTS
                );
                attempt += 1;
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nd_core::PageQuery;

    #[tokio::test]
    async fn test_memory_backend_from_url() {
        let storage = create_storage("memory").await.unwrap();
        let page = storage.page(&PageQuery::for_sites(["Any"])).await.unwrap();
        assert_eq!(page.total, 0);
    }

    #[tokio::test]
    async fn test_unknown_backend_is_rejected() {
        let err = create_storage("mysql://localhost/db").await.err().unwrap();
        assert!(matches!(err, Error::Config(_)));
    }

    #[cfg(not(feature = "postgres"))]
    #[tokio::test]
    async fn test_postgres_needs_feature() {
        let err = create_storage("postgres://localhost/db").await.err().unwrap();
        match err {
            Error::Config(message) => assert!(message.contains("postgres feature")),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[cfg(feature = "postgres")]
    #[tokio::test(start_paused = true)]
    async fn test_postgres_connect_failure_is_database_error() {
        let err = create_storage("postgres://nd:nd@127.0.0.1:1/nd").await.err().unwrap();
        assert!(matches!(err, Error::Database(_)));
    }

    #[cfg(feature = "sqlite")]
    #[tokio::test]
    async fn test_sqlite_backend_from_url() {
        let temp_dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}", temp_dir.path().join("nd.db").display());
        let storage = create_storage(&url).await.unwrap();
        assert!(storage.fetch_unscored().await.unwrap().is_empty());
    }
}
