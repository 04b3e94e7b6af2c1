use plaza::application::repos::{PostsRepo, PostsWriteRepo, RepoError};
use plaza::domain::types::{OrderMode, PostStatus, PostType, UserScope};
use plaza::infra::db::PostgresRepositories;
use sqlx::PgPool;

struct Seed {
    user_id: i64,
    title: &'static str,
    post_type: i32,
    status: i32,
    score: f64,
    minutes_ago: i32,
}

const SEED: &[Seed] = &[
    Seed { user_id: 1, title: "old favourite", post_type: 0, status: 0, score: 90.0, minutes_ago: 300 },
    Seed { user_id: 2, title: "fresh but cold", post_type: 0, status: 0, score: 1.0, minutes_ago: 5 },
    Seed { user_id: 1, title: "rules", post_type: 1, status: 0, score: 0.0, minutes_ago: 600 },
    Seed { user_id: 3, title: "featured", post_type: 0, status: 1, score: 40.0, minutes_ago: 60 },
    Seed { user_id: 1, title: "spam", post_type: 0, status: 2, score: 500.0, minutes_ago: 1 },
];

async fn seed(pool: &PgPool) -> Vec<i64> {
    let mut ids = Vec::with_capacity(SEED.len());
    for post in SEED {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO discuss_post (user_id, title, content, type, status, score, create_time) \
             VALUES ($1, $2, 'body', $3, $4, $5, now() - make_interval(mins => $6)) \
             RETURNING id",
        )
        .bind(post.user_id)
        .bind(post.title)
        .bind(post.post_type)
        .bind(post.status)
        .bind(post.score)
        .bind(post.minutes_ago)
        .fetch_one(pool)
        .await
        .expect("insert post");
        ids.push(id);
    }
    ids
}

fn titles(posts: &[plaza::domain::entities::PostRecord]) -> Vec<&str> {
    posts.iter().map(|post| post.title.as_str()).collect()
}

#[sqlx::test(migrations = "./migrations")]
async fn hot_listing_puts_pinned_first_then_score(pool: PgPool) {
    seed(&pool).await;
    let repo = PostgresRepositories::new(pool);

    let posts = repo
        .select_posts(UserScope::Global, 0, 10, OrderMode::Hot)
        .await
        .expect("hot listing");

    assert_eq!(
        titles(&posts),
        ["rules", "old favourite", "featured", "fresh but cold"]
    );
    assert_eq!(posts[0].post_type, PostType::Pinned);
}

#[sqlx::test(migrations = "./migrations")]
async fn latest_listing_puts_pinned_first_then_newest(pool: PgPool) {
    seed(&pool).await;
    let repo = PostgresRepositories::new(pool);

    let posts = repo
        .select_posts(UserScope::Global, 0, 10, OrderMode::Latest)
        .await
        .expect("latest listing");

    assert_eq!(
        titles(&posts),
        ["rules", "fresh but cold", "featured", "old favourite"]
    );
}

#[sqlx::test(migrations = "./migrations")]
async fn blocked_posts_are_never_listed_or_counted(pool: PgPool) {
    seed(&pool).await;
    let repo = PostgresRepositories::new(pool);

    for order in [OrderMode::Hot, OrderMode::Latest] {
        let posts = repo
            .select_posts(UserScope::Global, 0, 10, order)
            .await
            .expect("listing");
        assert!(posts.iter().all(|post| post.status != PostStatus::Blocked));
    }

    assert_eq!(
        repo.select_post_rows(UserScope::Global).await.expect("count"),
        4
    );
}

#[sqlx::test(migrations = "./migrations")]
async fn user_scope_filters_listing_and_count(pool: PgPool) {
    seed(&pool).await;
    let repo = PostgresRepositories::new(pool);

    let posts = repo
        .select_posts(UserScope::User(1), 0, 10, OrderMode::Latest)
        .await
        .expect("user listing");
    assert_eq!(titles(&posts), ["rules", "old favourite"]);
    assert!(posts.iter().all(|post| post.user_id == 1));

    assert_eq!(
        repo.select_post_rows(UserScope::User(1)).await.expect("count"),
        2
    );
    assert_eq!(
        repo.select_post_rows(UserScope::User(99)).await.expect("count"),
        0
    );
}

#[sqlx::test(migrations = "./migrations")]
async fn offset_and_limit_page_through_the_listing(pool: PgPool) {
    seed(&pool).await;
    let repo = PostgresRepositories::new(pool);

    let first = repo
        .select_posts(UserScope::Global, 0, 2, OrderMode::Hot)
        .await
        .expect("first page");
    let second = repo
        .select_posts(UserScope::Global, 2, 2, OrderMode::Hot)
        .await
        .expect("second page");
    let past_end = repo
        .select_posts(UserScope::Global, 4, 2, OrderMode::Hot)
        .await
        .expect("past the end");

    assert_eq!(titles(&first), ["rules", "old favourite"]);
    assert_eq!(titles(&second), ["featured", "fresh but cold"]);
    assert!(past_end.is_empty());
}

#[sqlx::test(migrations = "./migrations")]
async fn find_post_by_id_includes_blocked_posts(pool: PgPool) {
    let ids = seed(&pool).await;
    let repo = PostgresRepositories::new(pool);

    let blocked = repo
        .find_post_by_id(ids[4])
        .await
        .expect("lookup")
        .expect("blocked post exists");
    assert_eq!(blocked.title, "spam");
    assert_eq!(blocked.status, PostStatus::Blocked);

    assert!(repo.find_post_by_id(-1).await.expect("lookup").is_none());
}

#[sqlx::test(migrations = "./migrations")]
async fn updates_write_one_column_and_return_the_row(pool: PgPool) {
    let ids = seed(&pool).await;
    let repo = PostgresRepositories::new(pool);
    let id = ids[1];

    let post = repo.update_comment_count(id, 7).await.expect("comments");
    assert_eq!(post.comment_count, 7);

    let post = repo
        .update_post_type(id, PostType::Pinned)
        .await
        .expect("type");
    assert_eq!(post.post_type, PostType::Pinned);

    let post = repo
        .update_post_status(id, PostStatus::Featured)
        .await
        .expect("status");
    assert_eq!(post.status, PostStatus::Featured);

    let post = repo.update_score(id, 123.25).await.expect("score");
    assert_eq!(post.score, 123.25);
    assert_eq!(post.comment_count, 7);
    assert_eq!(post.title, "fresh but cold");

    let hot = repo
        .select_posts(UserScope::Global, 0, 1, OrderMode::Hot)
        .await
        .expect("hot listing");
    assert_eq!(titles(&hot), ["fresh but cold"]);
}

#[sqlx::test(migrations = "./migrations")]
async fn updating_a_missing_post_is_not_found(pool: PgPool) {
    let repo = PostgresRepositories::new(pool);

    let err = repo
        .update_score(-1, 1.0)
        .await
        .expect_err("no such post");
    assert!(matches!(err, RepoError::NotFound), "{err:?}");
}

#[sqlx::test(migrations = "./migrations")]
async fn health_check_acquires_a_connection(pool: PgPool) {
    let repo = PostgresRepositories::new(pool);
    repo.health_check().await.expect("database reachable");
}
