//! Postgres-backed repository implementations.

mod posts;
mod util;

pub use util::map_sqlx_error;

use std::sync::Arc;

use sqlx::{
    Postgres, QueryBuilder,
    postgres::{PgPool, PgPoolOptions},
};

use crate::domain::types::{OrderMode, PostStatus, UserScope};

#[derive(Clone)]
pub struct PostgresRepositories {
    pool: Arc<PgPool>,
}

impl PostgresRepositories {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
        PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
    }

    pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations")
            .run(pool)
            .await
            .map_err(Into::into)
    }

    /// Check out one pooled connection and hand it straight back.
    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        let connection = self.pool.acquire().await?;
        drop(connection);
        Ok(())
    }

    fn apply_scope_conditions<'q>(qb: &mut QueryBuilder<'q, Postgres>, scope: UserScope) {
        qb.push(" AND p.status <> ");
        qb.push_bind(PostStatus::Blocked);
        if let Some(user_id) = scope.user_id() {
            qb.push(" AND p.user_id = ");
            qb.push_bind(user_id);
        }
    }

    fn apply_ordering<'q>(qb: &mut QueryBuilder<'q, Postgres>, order: OrderMode) {
        match order {
            OrderMode::Latest => {
                qb.push(" ORDER BY p.type DESC, p.create_time DESC, p.id DESC ");
            }
            OrderMode::Hot => {
                qb.push(" ORDER BY p.type DESC, p.score DESC, p.create_time DESC, p.id DESC ");
            }
        }
    }
}
