//! Post listing service with a hot-listing cache.
//!
//! Only the public homepage shape (every author, hot ordering) goes through
//! the caches. All other query shapes are long-tail and read through to the
//! repository on every call.
//!
//! Updates write straight to the repository and do not touch the caches; a
//! cached listing may show the old values until it expires.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::application::repos::{PostsRepo, PostsWriteRepo, RepoError};
use crate::cache::{CacheConfig, CacheLoader, LoadingCache, PostListKey};
use crate::domain::entities::PostRecord;
use crate::domain::types::{OrderMode, PostStatus, PostType, UserScope};

/// Largest page a single listing query may request.
pub const MAX_PAGE_LIMIT: u32 = 100;

const POST_LIST_CACHE: &str = "post_list";
const POST_ROWS_CACHE: &str = "post_rows";

fn validate_limit(limit: u32) -> Result<(), RepoError> {
    if limit == 0 || limit > MAX_PAGE_LIMIT {
        return Err(RepoError::invalid_input(format!(
            "page limit {limit} must be between 1 and {MAX_PAGE_LIMIT}"
        )));
    }
    Ok(())
}

struct HotPostListLoader {
    repo: Arc<dyn PostsRepo>,
}

#[async_trait]
impl CacheLoader<PostListKey, Vec<PostRecord>> for HotPostListLoader {
    type Error = RepoError;

    async fn load(&self, key: &PostListKey) -> Result<Vec<PostRecord>, RepoError> {
        validate_limit(key.limit)?;
        debug!(key = %key, "Loading hot post list from repository");
        self.repo
            .select_posts(UserScope::Global, key.offset, key.limit, OrderMode::Hot)
            .await
    }
}

struct PostRowsLoader {
    repo: Arc<dyn PostsRepo>,
}

#[async_trait]
impl CacheLoader<UserScope, u64> for PostRowsLoader {
    type Error = RepoError;

    async fn load(&self, scope: &UserScope) -> Result<u64, RepoError> {
        debug!(scope = %scope, "Loading post row count from repository");
        self.repo.select_post_rows(*scope).await
    }
}

#[derive(Clone)]
pub struct PostService {
    repo: Arc<dyn PostsRepo>,
    writer: Arc<dyn PostsWriteRepo>,
    post_lists: LoadingCache<PostListKey, Vec<PostRecord>, RepoError>,
    post_rows: LoadingCache<UserScope, u64, RepoError>,
}

impl PostService {
    pub fn new(
        repo: Arc<dyn PostsRepo>,
        writer: Arc<dyn PostsWriteRepo>,
        config: &CacheConfig,
    ) -> Self {
        let post_lists = LoadingCache::new(
            POST_LIST_CACHE,
            config,
            HotPostListLoader {
                repo: Arc::clone(&repo),
            },
        );
        let post_rows = LoadingCache::new(
            POST_ROWS_CACHE,
            config,
            PostRowsLoader {
                repo: Arc::clone(&repo),
            },
        );

        Self {
            repo,
            writer,
            post_lists,
            post_rows,
        }
    }

    /// Posts `[offset, offset + limit)` for `scope` in `order`.
    pub async fn find_posts(
        &self,
        scope: UserScope,
        offset: u32,
        limit: u32,
        order: OrderMode,
    ) -> Result<Vec<PostRecord>, RepoError> {
        if scope.is_global() && order == OrderMode::Hot {
            return self.post_lists.get(PostListKey::new(offset, limit)).await;
        }

        validate_limit(limit)?;
        debug!(
            scope = %scope,
            order = order.as_str(),
            offset,
            limit,
            "Post list outside cached shape; reading repository"
        );
        self.repo.select_posts(scope, offset, limit, order).await
    }

    /// Total listed posts for `scope`.
    pub async fn find_post_rows(&self, scope: UserScope) -> Result<u64, RepoError> {
        if scope.is_global() {
            return self.post_rows.get(scope).await;
        }

        debug!(scope = %scope, "Post rows outside cached shape; reading repository");
        self.repo.select_post_rows(scope).await
    }

    pub async fn find_post_by_id(&self, id: i64) -> Result<Option<PostRecord>, RepoError> {
        self.repo.find_post_by_id(id).await
    }

    pub async fn update_comment_count(
        &self,
        id: i64,
        comment_count: i32,
    ) -> Result<PostRecord, RepoError> {
        if comment_count < 0 {
            return Err(RepoError::invalid_input(format!(
                "comment count {comment_count} must not be negative"
            )));
        }
        self.writer.update_comment_count(id, comment_count).await
    }

    pub async fn update_post_type(
        &self,
        id: i64,
        post_type: PostType,
    ) -> Result<PostRecord, RepoError> {
        self.writer.update_post_type(id, post_type).await
    }

    pub async fn update_post_status(
        &self,
        id: i64,
        status: PostStatus,
    ) -> Result<PostRecord, RepoError> {
        self.writer.update_post_status(id, status).await
    }

    pub async fn update_score(&self, id: i64, score: f64) -> Result<PostRecord, RepoError> {
        if !score.is_finite() {
            return Err(RepoError::invalid_input(format!(
                "score {score} must be a finite number"
            )));
        }
        self.writer.update_score(id, score).await
    }
}
