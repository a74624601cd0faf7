mod app;

use anyhow::{Context, Result};
use rhtmx_forms::config::StorageBackend;
use rhtmx_forms::{
    ContentStore, FormDefinitions, FormEngine, FormsConfig, MemoryContentStore, SqlContentStore,
    TracingMailer,
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug")),
        )
        .init();

    let mut config = FormsConfig::load_default().unwrap_or_else(|e| {
        warn!("Failed to load config: {:#}, using defaults", e);
        FormsConfig::default()
    });

    if let Ok(url) = std::env::var("DATABASE_URL") {
        config.storage.database_url = url;
    }

    let content: Arc<dyn ContentStore> = match config.storage.backend {
        StorageBackend::Memory => Arc::new(MemoryContentStore::new()),
        StorageBackend::Sql => {
            info!("Connecting to {}", config.storage.database_url);
            Arc::new(SqlContentStore::connect(&config.storage.database_url).await?)
        }
    };
    info!("Content store: {}", content.name());

    let mut builder = FormEngine::builder(content)
        .config(config.clone())
        .mailer(Arc::new(TracingMailer));

    if let Some(path) = &config.forms.definitions {
        let definitions = FormDefinitions::load(path)?;
        info!(
            "Loaded {} form definitions and {} field groups from {}",
            definitions.form.len(),
            definitions.field_group.len(),
            path
        );
        builder = builder.schema(Arc::new(definitions.schema()));
        for definition in definitions.form {
            builder = builder.register_form(definition);
        }
    }

    let engine = builder.build();
    info!("Serving {} code-registered forms", engine.registry().registered_count());

    let app = app::router(engine);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Server running at http://{}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}
