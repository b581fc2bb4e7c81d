use std::sync::Arc;

use quoteflow_core::audit::TracingAuditSink;
use quoteflow_core::config::{AppConfig, ConfigError, LoadOptions};
use quoteflow_core::{Catalog, CatalogError, DeterministicPricingEngine};
use quoteflow_db::{connect, migrations, DbPool, DraftSyncService, SqlDraftRepository};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub catalog: Arc<Catalog>,
    pub pricing: Arc<DeterministicPricingEngine>,
    pub drafts: DraftSyncService,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("catalog failed validation: {0}")]
    Catalog(#[from] CatalogError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

/// Builds the catalog before touching the database so a bad price override fails fast.
pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        database_url = %config.database.url,
        "starting application bootstrap"
    );

    let catalog = Arc::new(Catalog::from_config(&config.catalog)?);
    info!(
        event_name = "system.bootstrap.catalog_loaded",
        correlation_id = "bootstrap",
        tiers = catalog.tiers().len(),
        features = catalog.features().len(),
        maintenance_plans = catalog.maintenance_plans().len(),
        "catalog validated"
    );

    let db_pool = connect(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
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

    let pricing = Arc::new(DeterministicPricingEngine::new(config.pricing.clone()));
    let drafts = DraftSyncService::new(Arc::new(SqlDraftRepository::new(db_pool.clone())))
        .with_audit(Arc::new(TracingAuditSink));

    Ok(Application { config, db_pool, catalog, pricing, drafts })
}

#[cfg(test)]
mod tests {
    use quoteflow_core::config::{AppConfig, ConfigOverrides, LoadOptions, PricingConfig};
    use quoteflow_core::{MaintenancePlanId, PricingEngine, QuoteSelection, TierId};
    use rust_decimal::Decimal;

    use crate::bootstrap::{bootstrap, bootstrap_with_config, BootstrapError};

    fn in_memory(pricing: Option<PricingConfig>) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                pricing,
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_migrates_and_wires_draft_sync() {
        let app = bootstrap(in_memory(None)).await.expect("bootstrap");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'quote_draft'",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("schema query");
        assert_eq!(table_count, 1);

        let draft = app.drafts.ensure_draft(None).await.expect("ensure draft");
        assert_eq!(app.drafts.get_draft(&draft.token).await.expect("get draft"), draft);

        app.db_pool.close().await;
    }

    #[tokio::test]
    async fn pricing_overrides_reach_the_engine() {
        let pricing = PricingConfig { rush_multiplier: Decimal::new(120, 2), ..Default::default() };
        let app = bootstrap(in_memory(Some(pricing))).await.expect("bootstrap");

        let result = app
            .pricing
            .price(
                &app.catalog,
                &QuoteSelection {
                    tier: TierId::Starter,
                    selected_feature_ids: Default::default(),
                    rush_requested: true,
                    maintenance_plan: MaintenancePlanId::new("basic"),
                },
            )
            .expect("price");

        assert_eq!(result.totals.rush_fee, result.totals.package_base / 5);

        app.db_pool.close().await;
    }

    #[tokio::test]
    async fn unknown_price_override_fails_before_connecting() {
        let mut config = AppConfig::default();
        config.database.url = "sqlite:///nonexistent-dir/never-created.db".to_string();
        config.catalog.feature_prices.insert("hologram".to_string(), 10_000);

        let error = bootstrap_with_config(config).await.err().expect("catalog error");

        assert!(matches!(error, BootstrapError::Catalog(_)));
    }
}
