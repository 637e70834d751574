use std::sync::Arc;

use folio_reading::config::AppConfig;
use folio_reading::visibility::{PgVisibilityStore, VisibilityResolver};
use folio_reading::AppState;
use folio_shared::clients::db::create_pool;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    folio_shared::middleware::init_tracing("folio-reading");

    let config = AppConfig::load()?;
    let port = config.port;

    let db = create_pool(&config.database_url, config.db_pool_size)?;
    let metrics_handle = folio_shared::middleware::init_metrics()?;
    let visibility = VisibilityResolver::new(Arc::new(PgVisibilityStore::new(db.clone())));

    let state = Arc::new(AppState {
        db,
        config,
        visibility,
        metrics_handle: Some(metrics_handle),
    });

    let app = folio_reading::router(state);

    let addr = format!("0.0.0.0:{port}");
    tracing::info!(addr = %addr, "folio-reading starting");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
