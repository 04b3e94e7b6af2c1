use async_trait::async_trait;
use sqlx::QueryBuilder;
use time::OffsetDateTime;

use crate::application::repos::{PostsRepo, PostsWriteRepo, RepoError};
use crate::domain::entities::PostRecord;
use crate::domain::types::{OrderMode, PostStatus, PostType, UserScope};

use super::PostgresRepositories;
use super::map_sqlx_error;

const POST_COLUMNS: &str = "id, user_id, title, content, type AS post_type, status, \
     comment_count, score, create_time";

#[derive(sqlx::FromRow)]
struct PostRow {
    id: i64,
    user_id: i64,
    title: String,
    content: String,
    post_type: PostType,
    status: PostStatus,
    comment_count: i32,
    score: f64,
    create_time: OffsetDateTime,
}

impl From<PostRow> for PostRecord {
    fn from(row: PostRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            title: row.title,
            content: row.content,
            post_type: row.post_type,
            status: row.status,
            comment_count: row.comment_count,
            score: row.score,
            created_at: row.create_time,
        }
    }
}

#[async_trait]
impl PostsRepo for PostgresRepositories {
    async fn select_posts(
        &self,
        scope: UserScope,
        offset: u32,
        limit: u32,
        order: OrderMode,
    ) -> Result<Vec<PostRecord>, RepoError> {
        let mut qb = QueryBuilder::new(
            "SELECT p.id, p.user_id, p.title, p.content, p.type AS post_type, p.status, \
             p.comment_count, p.score, p.create_time FROM discuss_post p WHERE 1=1 ",
        );
        Self::apply_scope_conditions(&mut qb, scope);
        Self::apply_ordering(&mut qb, order);

        qb.push(" OFFSET ");
        qb.push_bind(i64::from(offset));
        qb.push(" LIMIT ");
        qb.push_bind(i64::from(limit));

        let rows = qb
            .build_query_as::<PostRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(PostRecord::from).collect())
    }

    async fn select_post_rows(&self, scope: UserScope) -> Result<u64, RepoError> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM discuss_post p WHERE 1=1 ");
        Self::apply_scope_conditions(&mut qb, scope);

        let count: i64 = qb
            .build_query_scalar()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        u64::try_from(count).map_err(RepoError::from_persistence)
    }

    async fn find_post_by_id(&self, id: i64) -> Result<Option<PostRecord>, RepoError> {
        let row = sqlx::query_as::<_, PostRow>(&format!(
            "SELECT {POST_COLUMNS} FROM discuss_post WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(PostRecord::from))
    }
}

impl PostgresRepositories {
    async fn update_post_column<T>(
        &self,
        id: i64,
        column: &'static str,
        value: T,
    ) -> Result<PostRecord, RepoError>
    where
        T: for<'q> sqlx::Encode<'q, sqlx::Postgres>
            + sqlx::Type<sqlx::Postgres>
            + Send
            + 'static,
    {
        let row = sqlx::query_as::<_, PostRow>(&format!(
            "UPDATE discuss_post SET {column} = $2 WHERE id = $1 RETURNING {POST_COLUMNS}"
        ))
        .bind(id)
        .bind(value)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        row.map(PostRecord::from).ok_or(RepoError::NotFound)
    }
}

#[async_trait]
impl PostsWriteRepo for PostgresRepositories {
    async fn update_comment_count(
        &self,
        id: i64,
        comment_count: i32,
    ) -> Result<PostRecord, RepoError> {
        self.update_post_column(id, "comment_count", comment_count).await
    }

    async fn update_post_type(
        &self,
        id: i64,
        post_type: PostType,
    ) -> Result<PostRecord, RepoError> {
        self.update_post_column(id, "type", post_type).await
    }

    async fn update_post_status(
        &self,
        id: i64,
        status: PostStatus,
    ) -> Result<PostRecord, RepoError> {
        self.update_post_column(id, "status", status).await
    }

    async fn update_score(&self, id: i64, score: f64) -> Result<PostRecord, RepoError> {
        self.update_post_column(id, "score", score).await
    }
}
