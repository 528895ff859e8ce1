//! REST routes.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::get,
};
use serde::Deserialize;

use crate::application::ports::{BarsQuery, DEFAULT_TIMEFRAME, OptionsQuery};
use crate::domain::streaming::{
    Bar, OptionSnapshot, OptionsChain, OptionsWindow, Quote, normalize_symbol,
};
use crate::infrastructure::health;

use super::AppState;
use super::error::{ApiError, ApiResponse};
use super::ws::ws_handler;

/// Build the application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/bars/{symbol}", get(get_bars))
        .route("/api/quote/{symbol}", get(get_quote))
        .route("/api/options/{symbol}", get(get_options))
        .route("/api/option/{contract}", get(get_option))
        .route("/api/health", get(health::health_handler))
        .route("/metrics", get(health::metrics_handler))
        .route("/ws", get(ws_handler))
        .with_state(state)
}

// =============================================================================
// Query Parameters
// =============================================================================

/// `GET /api/bars/{symbol}` query string.
#[derive(Debug, Default, Deserialize)]
struct BarsParams {
    timeframe: Option<String>,
    start: Option<String>,
    end: Option<String>,
    limit: Option<String>,
}

/// `GET /api/options/{symbol}` query string.
#[derive(Debug, Default, Deserialize)]
struct OptionsParams {
    minimal: Option<String>,
}

impl BarsParams {
    fn into_query(self, symbol: String) -> Result<BarsQuery, ApiError> {
        let timeframe = match self.timeframe.as_deref().map(str::trim) {
            None | Some("") => DEFAULT_TIMEFRAME.to_string(),
            Some(tf) if tf.chars().all(|c| c.is_ascii_alphanumeric()) => tf.to_string(),
            Some(tf) => {
                return Err(ApiError::InvalidParameter(format!("timeframe={tf:?}")));
            }
        };

        let limit = match self.limit.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => match raw.parse::<u32>() {
                Ok(n) if n > 0 => Some(n),
                _ => return Err(ApiError::InvalidParameter(format!("limit={raw:?}"))),
            },
        };

        Ok(BarsQuery {
            symbol,
            timeframe,
            start: non_empty(self.start),
            end: non_empty(self.end),
            limit,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// `?minimal`, `?minimal=true` and `?minimal=1` all enable the projection.
fn is_flag_set(value: Option<&str>) -> bool {
    value.is_some_and(|v| {
        let v = v.trim();
        v.is_empty() || v == "1" || v.eq_ignore_ascii_case("true")
    })
}

fn symbol_param(raw: &str) -> Result<String, ApiError> {
    normalize_symbol(raw).ok_or_else(|| ApiError::InvalidSymbol(raw.to_string()))
}

// =============================================================================
// Handlers
// =============================================================================

async fn get_bars(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
    Query(params): Query<BarsParams>,
) -> Result<Json<ApiResponse<Vec<Bar>>>, ApiError> {
    let query = params.into_query(symbol_param(&symbol)?)?;
    let bars = state.market_data.get_bars(&query).await?;
    Ok(ApiResponse::ok(bars))
}

async fn get_quote(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<ApiResponse<Quote>>, ApiError> {
    let symbol = symbol_param(&symbol)?;
    let quote = state.market_data.get_latest_quote(&symbol).await?;
    Ok(ApiResponse::ok(quote))
}

async fn get_options(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
    Query(params): Query<OptionsParams>,
) -> Result<Json<ApiResponse<OptionsChain>>, ApiError> {
    let query = OptionsQuery::new(symbol_param(&symbol)?)
        .with_window(OptionsWindow::current())
        .minimal(is_flag_set(params.minimal.as_deref()));

    let chain = state.market_data.get_options_snapshots(&query).await?;
    Ok(ApiResponse::ok(chain))
}

async fn get_option(
    State(state): State<AppState>,
    Path(contract): Path<String>,
) -> Result<Json<ApiResponse<OptionSnapshot>>, ApiError> {
    let contract = symbol_param(&contract)?;
    let snapshot = state.market_data.get_option_snapshot(&contract).await?;
    Ok(ApiResponse::ok(snapshot))
}

// =============================================================================
// Tests
// =============================================================================
