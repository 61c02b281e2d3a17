//! HTTP surface: the search operation and the request counter.
//!
//! Handlers translate pipeline/extraction outcomes into caller-facing
//! responses. Every terminal response bumps the counter exactly once,
//! whatever the outcome.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use utoipa::{IntoParams, ToSchema};

use crate::config::CONFIG;
use crate::counter::CounterStore;
use crate::extract::{self, ExtractionResult};
use crate::pipeline::{self, AcquireError, PageOutcome, QuerySpec};

pub struct AppState {
    pub counter: Arc<dyn CounterStore>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct SearchParams {
    /// Search query
    pub query: String,
    /// Google domain, e.g. google.com
    pub domain: Option<String>,
    /// Quantity of results (10-100)
    pub num: Option<u32>,
    /// Geo parameter, e.g. us, ru
    pub gl: Option<String>,
    /// Interface language, e.g. en, ru
    pub hl: Option<String>,
    /// Result language, e.g. lang_en
    pub lr: Option<String>,
    /// Country restriction, e.g. countryUS
    pub cr: Option<String>,
    /// Free-text location, e.g. "New York,United States"
    pub location: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SearchResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parsed_data: Option<ExtractionResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organic_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ads_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CounterResponse {
    pub total_requests: u64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StatusResponse {
    pub status: String,
}

impl SearchParams {
    fn into_query_spec(self) -> QuerySpec {
        QuerySpec {
            query: self.query,
            domain: self
                .domain
                .unwrap_or_else(|| CONFIG.default_search_domain.clone()),
            num: self.num.unwrap_or(CONFIG.default_results_count),
            gl: self
                .gl
                .unwrap_or_else(|| CONFIG.default_lang_location.clone()),
            hl: self
                .hl
                .unwrap_or_else(|| CONFIG.default_lang_interface.clone()),
            lr: Some(self.lr.unwrap_or_else(|| "lang_en".to_string())),
            cr: self.cr,
            location: self.location,
            // The API path never holds the browser open for inspection
            hold_secs: 0,
        }
    }
}

/// Translate a terminal pipeline outcome into the caller-facing response,
/// bumping the counter exactly once.
fn report(outcome: PageOutcome, counter: &dyn CounterStore) -> (StatusCode, SearchResponse) {
    let response = match outcome {
        PageOutcome::Success { html } => match extract::extract(&html) {
            Ok(data) => {
                let organic_count = data.organic.len();
                let ads_count = data.ads.len();
                (
                    StatusCode::OK,
                    SearchResponse {
                        success: true,
                        organic_count: Some(organic_count),
                        ads_count: Some(ads_count),
                        parsed_data: Some(data),
                        error: None,
                    },
                )
            }
            Err(e) => (
                StatusCode::OK,
                SearchResponse {
                    success: false,
                    parsed_data: None,
                    organic_count: None,
                    ads_count: None,
                    error: Some(format!("error while parsing results: {}", e)),
                },
            ),
        },
        PageOutcome::Blocked { reason, .. } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            SearchResponse {
                success: false,
                parsed_data: None,
                organic_count: None,
                ads_count: None,
                error: Some(reason),
            },
        ),
        PageOutcome::Failure(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            SearchResponse {
                success: false,
                parsed_data: None,
                organic_count: None,
                ads_count: None,
                error: Some(err.to_string()),
            },
        ),
    };
    counter.increment();
    response
}

/// Run a stealth Google search and return the extracted result set
#[utoipa::path(
    get,
    path = "/search",
    params(SearchParams),
    responses(
        (status = 200, description = "Search completed (success flag indicates parse outcome)", body = SearchResponse),
        (status = 500, description = "Acquisition failed or page was blocked", body = SearchResponse)
    ),
    tag = "search"
)]
pub async fn search(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> (StatusCode, Json<SearchResponse>) {
    let spec = params.into_query_spec();

    // The pipeline blocks on browser I/O; keep it off the async runtime
    let outcome = tokio::task::spawn_blocking(move || pipeline::acquire(&spec, &CONFIG)).await;
    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("pipeline task aborted: {}", e);
            PageOutcome::Failure(AcquireError::Automation(format!(
                "pipeline task aborted: {}",
                e
            )))
        }
    };

    let (status, response) = report(outcome, state.counter.as_ref());
    (status, Json(response))
}

/// Current value of the terminal-response counter
#[utoipa::path(
    get,
    path = "/counter",
    responses((status = 200, body = CounterResponse)),
    tag = "search"
)]
pub async fn counter(State(state): State<Arc<AppState>>) -> Json<CounterResponse> {
    Json(CounterResponse {
        total_requests: state.counter.read(),
    })
}

#[utoipa::path(get, path = "/", responses((status = 200, body = StatusResponse)))]
pub async fn root() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "API is running".to_string(),
    })
}
