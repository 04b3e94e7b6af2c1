use std::{process, str::FromStr, sync::Arc};

use plaza::{
    application::{
        analytics::AnalyticsService,
        error::AppError,
        posts::PostService,
        repos::{PostsRepo, PostsWriteRepo, RepoError},
    },
    cache::CacheConfig,
    config,
    domain::{
        analytics::{DateRange, Metric, format_day, parse_day},
        types::{OrderMode, UserScope},
    },
    infra::{db::PostgresRepositories, error::InfraError, telemetry},
};
use serde::Serialize;
use serde_json::json;
use time::Date;
use tracing::{Dispatch, Level, dispatcher, error};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(error.exit_code());
    }
}

fn report_application_error(error: &AppError) {
    let report = error.report();
    if dispatcher::has_been_set() {
        error!(
            error = %error,
            kind = ?report.kind,
            chain = ?report.messages,
            "application error"
        );
        eprintln!("{}", error.presentation_message());
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, kind = ?report.kind, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match cli_args.command {
        config::Command::Posts(args) => run_posts(&settings, args).await,
        config::Command::Rows(args) => run_rows(&settings, args).await,
        config::Command::Post(args) => run_post(&settings, args).await,
        config::Command::Visit(args) => run_visit(&settings, args).await,
        config::Command::Active(args) => run_active(&settings, args).await,
        config::Command::UniqueVisitors(args) => {
            run_range(&settings, Metric::UniqueVisitors, args).await
        }
        config::Command::ActiveUsers(args) => run_range(&settings, Metric::ActiveUsers, args).await,
        config::Command::Health => run_health(&settings).await,
    }
}

async fn run_posts(settings: &config::Settings, args: config::PostsArgs) -> Result<(), AppError> {
    let order = OrderMode::from_str(&args.order)?;
    let scope = UserScope::from(args.user_id);
    let posts = build_post_service(settings).await?;

    let listing = posts
        .find_posts(scope, args.offset, args.limit, order)
        .await?;
    print_json(&listing)
}

async fn run_rows(settings: &config::Settings, args: config::RowsArgs) -> Result<(), AppError> {
    let scope = UserScope::from(args.user_id);
    let posts = build_post_service(settings).await?;

    let rows = posts.find_post_rows(scope).await?;
    print_json(&json!({ "scope": scope, "rows": rows }))
}

async fn run_post(settings: &config::Settings, args: config::PostArgs) -> Result<(), AppError> {
    let posts = build_post_service(settings).await?;

    let post = posts
        .find_post_by_id(args.id)
        .await?
        .ok_or(AppError::Repo(RepoError::NotFound))?;
    print_json(&post)
}

async fn run_visit(settings: &config::Settings, args: config::VisitArgs) -> Result<(), AppError> {
    let analytics = build_analytics_service(settings).await?;
    let day = resolve_day(&analytics, args.day.as_deref())?;

    analytics.record_visit_on(day, &args.visitor).await?;
    let key = Metric::UniqueVisitors.day_key(day)?;
    print_json(&json!({ "key": key, "visitor": args.visitor }))
}

async fn run_active(settings: &config::Settings, args: config::ActiveArgs) -> Result<(), AppError> {
    let analytics = build_analytics_service(settings).await?;
    let day = resolve_day(&analytics, args.day.as_deref())?;

    analytics.record_active_user_on(day, args.user_id).await?;
    let key = Metric::ActiveUsers.day_key(day)?;
    print_json(&json!({ "key": key, "user_id": args.user_id }))
}

async fn run_range(
    settings: &config::Settings,
    metric: Metric,
    args: config::RangeArgs,
) -> Result<(), AppError> {
    let start = args.start.as_deref().map(parse_day).transpose()?;
    let end = args.end.as_deref().map(parse_day).transpose()?;
    let range = DateRange::from_bounds(start, end)?;

    let analytics = build_analytics_service(settings).await?;
    let count = match metric {
        Metric::UniqueVisitors => analytics.count_unique_visitors(range).await?,
        Metric::ActiveUsers => analytics.count_active_users(range).await?,
    };

    print_json(&json!({
        "metric": metric.prefix(),
        "start": format_day(range.start())?,
        "end": format_day(range.end())?,
        "count": count,
    }))
}

async fn run_health(settings: &config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(settings).await?;
    repositories
        .health_check()
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    #[cfg(feature = "redis")]
    if let Some(url) = settings.store.url.as_deref() {
        plaza::infra::kv::RedisKeyValueStore::connect(url)
            .await?
            .ping()
            .await?;
    }

    print_json(&json!({ "database": "ok" }))
}

async fn build_post_service(settings: &config::Settings) -> Result<PostService, AppError> {
    let repositories = init_repositories(settings).await?;
    let posts_repo: Arc<dyn PostsRepo> = repositories.clone();
    let writer: Arc<dyn PostsWriteRepo> = repositories;
    Ok(PostService::new(
        posts_repo,
        writer,
        &CacheConfig::from(&settings.cache),
    ))
}

async fn build_analytics_service(settings: &config::Settings) -> Result<AnalyticsService, AppError> {
    let store = plaza::infra::kv::connect(&settings.store).await?;
    Ok(AnalyticsService::new(store, settings.analytics.timezone))
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    let pool = PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    Ok(Arc::new(PostgresRepositories::new(pool)))
}

fn resolve_day(analytics: &AnalyticsService, day: Option<&str>) -> Result<Date, AppError> {
    match day {
        Some(value) => Ok(parse_day(value)?),
        None => Ok(analytics.today()),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), AppError> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|err| AppError::unexpected(format!("failed to encode output: {err}")))?;
    println!("{rendered}");
    Ok(())
}
