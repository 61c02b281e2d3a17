mod api;
mod config;
mod counter;
mod extract;
mod pipeline;
mod proxy;
mod session;
mod stealth;

use axum::{routing::get, Router};
use std::sync::Arc;
use dotenv::dotenv;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::CONFIG;
use crate::counter::FileCounter;

#[derive(OpenApi)]
#[openapi(
    paths(api::root, api::search, api::counter),
    components(
        schemas(
            api::SearchResponse,
            api::CounterResponse,
            api::StatusResponse,
            extract::ExtractionResult,
            extract::OrganicEntry,
            extract::SponsoredEntry,
            extract::Sitelink,
            extract::SponsoredSitelink
        )
    ),
    tags(
        (name = "search", description = "Stealth SERP acquisition API")
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    tracing_subscriber::fmt::init();

    let state = Arc::new(api::AppState {
        counter: Arc::new(FileCounter::new(&CONFIG.counter_path)),
    });

    let app = Router::new()
        .merge(SwaggerUi::new("/serp-crawler-swagger").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/", get(api::root))
        .route("/search", get(api::search))
        .route("/counter", get(api::counter))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("0.0.0.0:8000").await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
