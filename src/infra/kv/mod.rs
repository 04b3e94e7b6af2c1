//! Key-value store adapters behind [`KeyValueStore`](crate::application::repos::KeyValueStore).

use std::sync::Arc;

use crate::application::error::AppError;
use crate::application::repos::KeyValueStore;
use crate::config::StoreSettings;
use crate::infra::error::InfraError;

pub mod hyperloglog;
pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;

pub use memory::MemoryKeyValueStore;
#[cfg(feature = "redis")]
pub use self::redis::RedisKeyValueStore;

/// Connects the store named by `store.url`. A missing url is a configuration
/// error, never an in-memory fallback.
pub async fn connect(settings: &StoreSettings) -> Result<Arc<dyn KeyValueStore>, AppError> {
    let url = settings
        .url
        .as_deref()
        .ok_or_else(|| InfraError::configuration("store url is not configured"))?;

    connect_url(url).await
}

#[cfg(feature = "redis")]
async fn connect_url(url: &str) -> Result<Arc<dyn KeyValueStore>, AppError> {
    Ok(Arc::new(RedisKeyValueStore::connect(url).await?))
}

#[cfg(not(feature = "redis"))]
async fn connect_url(_url: &str) -> Result<Arc<dyn KeyValueStore>, AppError> {
    Err(AppError::from(InfraError::configuration(
        "store.url requires plaza to be built with the `redis` feature",
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_store_url_is_a_configuration_error() {
        let err = connect(&StoreSettings { url: None })
            .await
            .err()
            .expect("no url configured");

        match err {
            AppError::Infra(InfraError::Configuration { message }) => {
                assert_eq!(message, "store url is not configured");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[cfg(not(feature = "redis"))]
    #[tokio::test]
    async fn store_url_without_redis_support_is_rejected() {
        let err = connect(&StoreSettings {
            url: Some("redis://127.0.0.1:6379".to_string()),
        })
        .await
        .err()
        .expect("redis feature disabled");

        assert!(matches!(
            err,
            AppError::Infra(InfraError::Configuration { .. })
        ));
    }
}
