//! Alpaca REST Adapter Integration Tests
//!
//! Runs the REST client against a `wiremock` server standing in for the
//! market data API.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

use dashboard_proxy::application::ports::{
    BarsQuery, MarketDataError, MarketDataPort, OptionsQuery,
};
use dashboard_proxy::domain::streaming::OptionsWindow;
use dashboard_proxy::infrastructure::alpaca::{
    AlpacaRestClient, AlpacaRestConfig, Credentials, RetryConfig,
};

const CHAIN_PATH: &str = "/v1beta1/options/snapshots/AAPL";

fn client(server: &MockServer) -> AlpacaRestClient {
    client_with(server, |_| {})
}

fn client_with(server: &MockServer, tweak: impl FnOnce(&mut AlpacaRestConfig)) -> AlpacaRestClient {
    let mut config = AlpacaRestConfig::new(Credentials::new("key-id", "secret-key"), server.uri());
    config.retry = RetryConfig {
        max_attempts: 3,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(5),
        multiplier: 2.0,
    };
    tweak(&mut config);
    AlpacaRestClient::new(config).unwrap()
}

fn window() -> OptionsWindow {
    OptionsWindow::forward_from(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())
}

fn full_snapshot(delta: f64) -> serde_json::Value {
    json!({
        "latestQuote": {"t": "2024-03-01T15:00:00Z", "ap": 2.75, "as": 12, "bp": 2.5, "bs": 10, "ax": "C", "bx": "X"},
        "latestTrade": {"t": "2024-03-01T14:59:00Z", "p": 2.625, "s": 3, "x": "C"},
        "greeks": {"delta": delta, "gamma": 0.0625, "theta": -0.125, "vega": 0.25, "rho": 0.03125},
        "impliedVolatility": 0.25,
        "openInterest": 1500
    })
}

// =============================================================================
// Options Chain
// =============================================================================

#[tokio::test]
async fn chain_merges_calls_and_puts() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(CHAIN_PATH))
        .and(query_param("type", "call"))
        .and(query_param("feed", "indicative"))
        .and(query_param("expiration_date_gte", "2024-03-15"))
        .and(query_param("expiration_date_lte", "2024-09-01"))
        .and(header("APCA-API-KEY-ID", "key-id"))
        .and(header("APCA-API-SECRET-KEY", "secret-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "snapshots": {
                "AAPL240315C00172500": full_snapshot(0.5),
                "AAPL240315C00175000": full_snapshot(0.375)
            },
            "next_page_token": null
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(CHAIN_PATH))
        .and(query_param("type", "put"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "snapshots": {"AAPL240315P00172500": full_snapshot(-0.5)}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let query = OptionsQuery::new("AAPL").with_window(window());
    let chain = client(&server).get_options_snapshots(&query).await.unwrap();

    assert_eq!(chain.len(), 3);
    let put = &chain["AAPL240315P00172500"];
    assert_eq!(put.greeks.unwrap().delta, -0.5);
    assert_eq!(put.greeks.unwrap().rho, Some(0.03125));
    assert_eq!(put.quote.as_ref().unwrap().bid_exchange.as_deref(), Some("X"));
    assert_eq!(put.trade.as_ref().unwrap().price, Decimal::new(2625, 3));
    assert_eq!(put.open_interest, Some(1500));
}

#[tokio::test]
async fn minimal_chain_strips_extras() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(CHAIN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "snapshots": {"AAPL240315C00172500": full_snapshot(0.5)}
        })))
        .mount(&server)
        .await;

    let query = OptionsQuery::new("AAPL").minimal(true);
    let chain = client(&server).get_options_snapshots(&query).await.unwrap();

    let snapshot = &chain["AAPL240315C00172500"];
    let quote = snapshot.quote.as_ref().unwrap();
    assert_eq!(quote.bid_price, Decimal::new(25, 1));
    assert_eq!(quote.ask_size, 12);
    assert!(quote.bid_exchange.is_none());
    assert!(quote.time.is_none());
    let trade = snapshot.trade.as_ref().unwrap();
    assert_eq!(trade.size, 3);
    assert!(trade.exchange.is_none());
    let greeks = snapshot.greeks.unwrap();
    assert_eq!(greeks.vega, 0.25);
    assert!(greeks.rho.is_none());
    assert_eq!(snapshot.implied_volatility, Some(0.25));
}

#[tokio::test]
async fn chain_follows_page_tokens() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(CHAIN_PATH))
        .and(query_param("type", "call"))
        .and(query_param_is_missing("page_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "snapshots": {"AAPL240315C00172500": full_snapshot(0.5)},
            "next_page_token": "page-2"
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(CHAIN_PATH))
        .and(query_param("type", "call"))
        .and(query_param("page_token", "page-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "snapshots": {"AAPL240315C00175000": full_snapshot(0.375)}
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(CHAIN_PATH))
        .and(query_param("type", "put"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"snapshots": {}})))
        .mount(&server)
        .await;

    let chain = client(&server)
        .get_options_snapshots(&OptionsQuery::new("AAPL"))
        .await
        .unwrap();

    assert_eq!(chain.len(), 2);
    assert!(chain.contains_key("AAPL240315C00175000"));
}

#[tokio::test]
async fn chain_stops_at_page_cap() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(CHAIN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "snapshots": {"AAPL240315C00172500": full_snapshot(0.5)},
            "next_page_token": "more"
        })))
        // One page per side.
        .expect(2)
        .mount(&server)
        .await;

    let client = client_with(&server, |config| config.max_option_pages = 1);
    let chain = client
        .get_options_snapshots(&OptionsQuery::new("AAPL"))
        .await
        .unwrap();

    assert_eq!(chain.len(), 1);
}

#[tokio::test]
async fn chain_fails_when_either_side_fails() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(CHAIN_PATH))
        .and(query_param("type", "call"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"snapshots": {}})))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(CHAIN_PATH))
        .and(query_param("type", "put"))
        .respond_with(
            ResponseTemplate::new(403).set_body_json(json!({"code": 40_310_000, "message": "forbidden"})),
        )
        .mount(&server)
        .await;

    let err = client(&server)
        .get_options_snapshots(&OptionsQuery::new("AAPL"))
        .await
        .unwrap_err();

    assert_eq!(err, MarketDataError::Unauthorized("forbidden".to_string()));
}

// =============================================================================
// Single Contract
// =============================================================================

#[tokio::test]
async fn single_contract_found_and_missing() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1beta1/options/snapshots"))
        .and(query_param("symbols", "AAPL240315C00172500"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "snapshots": {"AAPL240315C00172500": full_snapshot(0.5)}
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1beta1/options/snapshots"))
        .and(query_param("symbols", "AAPL240315C00999000"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"snapshots": {}})))
        .mount(&server)
        .await;

    let client = client(&server);

    let snapshot = client
        .get_option_snapshot("AAPL240315C00172500")
        .await
        .unwrap();
    assert_eq!(snapshot.greeks.unwrap().delta, 0.5);

    let err = client
        .get_option_snapshot("AAPL240315C00999000")
        .await
        .unwrap_err();
    assert!(matches!(err, MarketDataError::NotFound(_)));
}

// =============================================================================
// Bars and Quotes
// =============================================================================

#[tokio::test]
async fn bars_forward_query_and_feed() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v2/stocks/AAPL/bars"))
        .and(query_param("timeframe", "1Min"))
        .and(query_param("feed", "iex"))
        .and(query_param("start", "2024-03-01"))
        .and(query_param("limit", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "bars": [
                {"t": "2024-03-01T14:30:00Z", "o": 179.5, "h": 180.25, "l": 179.25, "c": 180.0, "v": 1200, "vw": 179.8, "n": 40},
                {"t": "2024-03-01T14:31:00Z", "o": 180.0, "h": 180.5, "l": 179.75, "c": 180.25, "v": 900}
            ],
            "symbol": "AAPL",
            "next_page_token": "ignored-because-limit-reached"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let query = BarsQuery {
        timeframe: "1Min".to_string(),
        start: Some("2024-03-01".to_string()),
        limit: Some(2),
        ..BarsQuery::new("AAPL")
    };
    let bars = client(&server).get_bars(&query).await.unwrap();

    assert_eq!(bars.len(), 2);
    assert_eq!(bars[0].symbol, "AAPL");
    assert_eq!(bars[0].open, Decimal::new(1795, 1));
    assert_eq!(bars[1].close, Decimal::new(18025, 2));
    assert_eq!(bars[1].volume, 900);
}

#[tokio::test]
async fn empty_bar_range_is_empty_list() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v2/stocks/AAPL/bars"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"bars": null, "next_page_token": null})),
        )
        .mount(&server)
        .await;

    let bars = client(&server).get_bars(&BarsQuery::new("AAPL")).await.unwrap();
    assert!(bars.is_empty());
}

#[tokio::test]
async fn latest_quote_maps_fields() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v2/stocks/AAPL/quotes/latest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "symbol": "AAPL",
            "quote": {"t": "2024-03-01T15:00:00Z", "bp": 179.5, "bs": 3, "ap": 179.75, "as": 5, "bx": "V", "ax": "V", "c": ["R"], "z": "C"}
        })))
        .mount(&server)
        .await;

    let quote = client(&server).get_latest_quote("AAPL").await.unwrap();

    assert_eq!(quote.symbol, "AAPL");
    assert_eq!(quote.bid_price, Decimal::new(1795, 1));
    assert_eq!(quote.ask_price, Decimal::new(17975, 2));
    assert_eq!(quote.ask_size, 5);
}

// =============================================================================
// Errors and Retries
// =============================================================================

#[tokio::test]
async fn not_found_maps_to_not_found() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "symbol not found"})))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server).get_latest_quote("ZZZZ").await.unwrap_err();
    assert_eq!(err, MarketDataError::NotFound("symbol not found".to_string()));
}

#[tokio::test]
async fn unprocessable_maps_to_invalid_request() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({"message": "invalid timeframe"})))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server)
        .get_bars(&BarsQuery::new("AAPL"))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        MarketDataError::InvalidRequest("invalid timeframe".to_string())
    );
}

#[tokio::test]
async fn server_errors_retry_then_give_up() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(3)
        .mount(&server)
        .await;

    let err = client(&server).get_latest_quote("AAPL").await.unwrap_err();

    let MarketDataError::Network(message) = err else {
        panic!("expected network error, got {err:?}");
    };
    assert!(message.contains("3 attempts"));
    assert!(message.contains("500"));
}

#[tokio::test]
async fn transient_error_recovers() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v2/stocks/AAPL/quotes/latest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "symbol": "AAPL",
            "quote": {"t": "2024-03-01T15:00:00Z", "bp": 1, "bs": 1, "ap": 2, "as": 1}
        })))
        .mount(&server)
        .await;

    let quote = client(&server).get_latest_quote("AAPL").await.unwrap();
    assert_eq!(quote.ask_price, Decimal::from(2));
}

#[tokio::test]
async fn rate_limit_without_retries_reports_retry_after() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "7"))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_with(&server, |config| config.retry.max_attempts = 1);
    let err = client.get_latest_quote("AAPL").await.unwrap_err();

    assert_eq!(
        err,
        MarketDataError::RateLimited {
            retry_after_secs: Some(7)
        }
    );
}

#[tokio::test]
async fn undecodable_body_is_decode_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let err = client(&server).get_latest_quote("AAPL").await.unwrap_err();
    assert!(matches!(err, MarketDataError::Decode(_)));
}

#[tokio::test]
async fn unreachable_upstream_is_network_error() {
    let server = MockServer::start().await;
    let uri = server.uri();
    drop(server);

    let mut config = AlpacaRestConfig::new(Credentials::new("k", "s"), uri);
    config.retry.max_attempts = 1;
    let client = AlpacaRestClient::new(config).unwrap();

    let err = client.get_latest_quote("AAPL").await.unwrap_err();
    assert!(matches!(err, MarketDataError::Network(_)));
}
