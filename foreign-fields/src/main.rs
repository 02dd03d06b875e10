//! Foreign Fields demo
//!
//! Installs a `rating` field shared by all sites, saves a rating for one
//! element and lists the elements rated 4 or more with their ratings
//! eager-loaded.

use std::env;
use std::sync::Arc;

use dotenv::dotenv;
use foreign_fields::query::{ForeignFieldFilterHook, StaticFieldLayouts};
use foreign_fields::{
    AttachOptions, AttributeBundle, Dependencies, ElementQuery, EngineConfig, ForeignField,
    ForeignFieldError, ForeignModel, ModelErrors,
};
use foreign_fields_repository::{AttributeColumn, ColumnType};
use foreign_fields_shared::{Element, ElementSnapshot};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const HOST_TABLES: &str =
    include_str!("../../foreign-fields-repository/src/postgres/migrations/0001_host_tables.sql");

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Rating {
    score: Option<i64>,
    comment: Option<String>,
}

impl AttributeBundle for Rating {
    fn record_columns() -> &'static [AttributeColumn] {
        const COLUMNS: &[AttributeColumn] = &[
            AttributeColumn::new("score", ColumnType::Integer),
            AttributeColumn::new("comment", ColumnType::Text),
        ];
        COLUMNS
    }

    fn is_empty(&self) -> bool {
        self.score.is_none() && self.comment.is_none()
    }

    fn validate(&self) -> Result<(), ModelErrors> {
        let mut errors = ModelErrors::new();
        if let Some(score) = self.score {
            if !(1..=5).contains(&score) {
                errors.add("score", "Score must be between 1 and 5.");
            }
        }
        errors.into_result()
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("foreign_fields=info,foreign_fields_repository=info"));

    if env::var("LOG_FORMAT").is_ok_and(|format| format == "json") {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(true).pretty())
            .init();
    }

    info!(
        service_name = "foreign-fields-demo",
        service_version = env!("CARGO_PKG_VERSION"),
        "Tracing initialized"
    );
}

async fn seed_host_rows(deps: &Dependencies) -> Result<(), ForeignFieldError> {
    sqlx::raw_sql(HOST_TABLES).execute(&deps.pool).await?;

    sqlx::query(r#"INSERT INTO "fields" ("id", "handle") VALUES (7, 'rating') ON CONFLICT DO NOTHING"#)
        .execute(&deps.pool)
        .await?;
    sqlx::query(r#"INSERT INTO "elements" ("id", "type") VALUES (42, 'entry') ON CONFLICT DO NOTHING"#)
        .execute(&deps.pool)
        .await?;
    sqlx::query(
        r#"INSERT INTO "elements_sites" ("elementId", "siteId", "title")
           VALUES (42, 1, 'Hello'), (42, 2, 'Bonjour')
           ON CONFLICT DO NOTHING"#,
    )
    .execute(&deps.pool)
    .await?;

    Ok(())
}

async fn run(deps: Dependencies) -> Result<(), ForeignFieldError> {
    seed_host_rows(&deps).await?;

    let field = ForeignField::<Rating>::new(7, "rating", "ratings", deps.repository.clone());
    field
        .install(&deps.config.elements_table, &deps.config.fields_table)
        .await?;

    let model = ForeignModel::new(
        field.definition().clone(),
        None,
        Rating {
            score: Some(4),
            comment: Some("solid".to_string()),
        },
    );
    field.validator().validate_value(&model)?;

    let element = ElementSnapshot::new(42, 1).with_field_value(field.handle(), model);
    field.after_save(&element, true).await?;

    let mut layouts = StaticFieldLayouts::new();
    layouts.add_layout("entry", vec![field.definition().clone()]);
    let context = deps
        .query_context()
        .with_hook(Arc::new(ForeignFieldFilterHook::new(Arc::new(layouts))));

    let mut query = ElementQuery::new("entry")
        .site(1)
        .field_param("rating", json!({"score": ">= 4"}));
    foreign_fields::attach_to(&mut query, field.definition(), AttachOptions::eager_load())?;

    let prepared = query.prepare(&context)?;
    let alias = field.definition().eager_load_alias();

    for row in deps.runner.fetch_all(&prepared).await? {
        let owner: Arc<dyn Element> = Arc::new(ElementSnapshot::new(
            row.get("id").and_then(|id| id.as_i64()).unwrap_or_default(),
            1,
        ));
        let rating = field.normalize_eager_loaded(row.get(&alias), Some(owner));
        info!(
            element_id = ?rating.owner().and_then(|owner| owner.id()),
            title = ?row.get("title"),
            score = ?rating.attributes().score,
            comment = ?rating.attributes().comment,
            "Rated element"
        );
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), ForeignFieldError> {
    dotenv().ok();
    init_tracing();

    let config = EngineConfig::from_env();
    let deps = match Dependencies::new(config).await {
        Ok(deps) => {
            info!("Dependencies initialized successfully");
            deps
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize dependencies");
            return Err(e);
        }
    };

    if let Err(e) = run(deps).await {
        error!(error = %e, "Demo failed");
        return Err(e);
    }

    info!("Demo completed successfully");
    Ok(())
}
