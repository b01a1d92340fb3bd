use axum::Router;
use itgov_core::approvals::ApprovalService;
use itgov_core::config::{AppConfig, ConfigError, LoadOptions};
use itgov_db::{
    connection::connect_with_config, migrations, DbPool, SqlApplicationRepository,
    SqlApprovalStore,
};
use thiserror::Error;
use tracing::info;

use crate::{applications, health};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub router: Router,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool =
        connect_with_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let router = build_router(&config, db_pool.clone());
    Ok(Application { config, db_pool, router })
}

pub fn build_router(config: &AppConfig, db_pool: DbPool) -> Router {
    let approvals = ApprovalService::new(SqlApprovalStore::new(db_pool.clone()), &config.workflow);
    let repository = SqlApplicationRepository::new(db_pool.clone());
    let state = applications::ApplicationsState::new(repository, approvals);

    applications::router(state).merge(health::router(db_pool))
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use itgov_core::config::{ConfigOverrides, LoadOptions};
    use tower::ServiceExt;

    use crate::bootstrap::bootstrap;

    fn memory_options(bulk_max_items: Option<usize>) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                bulk_max_items,
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_on_invalid_workflow_config() {
        let result = bootstrap(memory_options(Some(5000))).await;

        let message = result.err().expect("error").to_string();
        assert!(message.contains("workflow.bulk_max_items"));
    }

    #[tokio::test]
    async fn bootstrap_migrates_and_serves_health() {
        let app = bootstrap(memory_options(None)).await.expect("bootstrap should succeed");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('application', 'approval_step', 'origin_link')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("workflow tables should exist after bootstrap");
        assert_eq!(table_count, 3);

        let response = app
            .router
            .clone()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        app.db_pool.close().await;
    }
}
