//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::entities::PostRecord;
use crate::domain::error::DomainError;
use crate::domain::types::{OrderMode, PostStatus, PostType, UserScope};

#[derive(Debug, Clone, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }
}

impl From<DomainError> for RepoError {
    fn from(error: DomainError) -> Self {
        match error {
            DomainError::Validation { message } => Self::InvalidInput { message },
        }
    }
}

/// Read access to the post listing.
#[async_trait]
pub trait PostsRepo: Send + Sync {
    /// Posts `[offset, offset + limit)` of the listing for `scope` in `order`.
    async fn select_posts(
        &self,
        scope: UserScope,
        offset: u32,
        limit: u32,
        order: OrderMode,
    ) -> Result<Vec<PostRecord>, RepoError>;

    /// Total number of listed posts for `scope`.
    async fn select_post_rows(&self, scope: UserScope) -> Result<u64, RepoError>;

    /// One post by id, blocked posts included.
    async fn find_post_by_id(&self, id: i64) -> Result<Option<PostRecord>, RepoError>;
}

/// Single-column post updates. Each returns the updated row or `NotFound`.
#[async_trait]
pub trait PostsWriteRepo: Send + Sync {
    async fn update_comment_count(
        &self,
        id: i64,
        comment_count: i32,
    ) -> Result<PostRecord, RepoError>;

    async fn update_post_type(&self, id: i64, post_type: PostType)
    -> Result<PostRecord, RepoError>;

    async fn update_post_status(
        &self,
        id: i64,
        status: PostStatus,
    ) -> Result<PostRecord, RepoError>;

    async fn update_score(&self, id: i64, score: f64) -> Result<PostRecord, RepoError>;
}

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("key-value store unavailable: {message}")]
    Unavailable { message: String },
    #[error("key `{key}` holds a value of the wrong type")]
    WrongType { key: String },
    #[error("key-value store timeout")]
    Timeout,
}

impl StoreError {
    pub fn unavailable(err: impl std::fmt::Display) -> Self {
        Self::Unavailable {
            message: err.to_string(),
        }
    }
}

/// Probabilistic-set and bitmap primitives of the shared key-value store.
///
/// Missing source keys behave as empty structures. Implementations must be
/// safe to call concurrently for the same key.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Add `element` to the approximate set at `key`. Returns whether the
    /// set's internal registers changed.
    async fn approx_add(&self, key: &str, element: &str) -> Result<bool, StoreError>;

    /// Merge `sources` into `dest` and return the estimated distinct count of
    /// the merged set.
    async fn approx_union_cardinality(
        &self,
        dest: &str,
        sources: &[String],
    ) -> Result<u64, StoreError>;

    /// Set or clear bit `offset` of the bitmap at `key`. Returns the previous bit.
    async fn set_bit(&self, key: &str, offset: u32, value: bool) -> Result<bool, StoreError>;

    /// Store the bitwise OR of `sources` at `dest`. Returns the byte length of `dest`.
    async fn bit_or(&self, dest: &str, sources: &[String]) -> Result<u64, StoreError>;

    /// Number of set bits in the bitmap at `key`.
    async fn bit_count(&self, key: &str) -> Result<u64, StoreError>;
}
