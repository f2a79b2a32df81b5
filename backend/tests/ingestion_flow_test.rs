use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use pair_token_indexer::api::{create_app, ApiState};
use pair_token_indexer::database::{InMemoryTokenStore, Token, TokenStore};
use pair_token_indexer::ledger::{Address, StaticLedger};
use pair_token_indexer::token_registry::{
    FailurePolicy, IngestionConfig, IngestionScheduler, TokenIngestionService,
};

const WBONE: Address = Address::repeat_byte(0x01);
const SHIB: Address = Address::repeat_byte(0x02);
const LEASH: Address = Address::repeat_byte(0x03);

fn factory() -> Address {
    Address::repeat_byte(0xfa)
}

fn service(
    ledger: Arc<StaticLedger>,
    store: Arc<InMemoryTokenStore>,
    config: IngestionConfig,
) -> Arc<TokenIngestionService> {
    Arc::new(TokenIngestionService::new(ledger, store.clone(), store, config))
}

fn app(store: Arc<InMemoryTokenStore>, scheduler: Option<Arc<IngestionScheduler>>) -> Router {
    create_app(ApiState::new(store, scheduler))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_empty_factory_creates_nothing() {
    let store = Arc::new(InMemoryTokenStore::new());
    let ledger = Arc::new(StaticLedger::new(factory()));

    let report = service(ledger, store.clone(), IngestionConfig::default())
        .run()
        .await
        .unwrap();

    assert_eq!(report.pair_count, 0);
    assert_eq!(report.tokens_created, 0);
    assert_eq!(store.token_count().await, 0);
}

#[tokio::test]
async fn test_ingested_tokens_are_served_over_http() {
    let store = Arc::new(InMemoryTokenStore::new());
    let ledger = Arc::new(
        StaticLedger::new(factory())
            .with_token(WBONE, "Wrapped Bone", "WBONE", 18)
            .with_token(SHIB, "Shiba Inu", "SHIB", 18)
            .with_pair(Address::repeat_byte(0x10), WBONE, SHIB),
    );

    service(ledger, store.clone(), IngestionConfig::default())
        .run()
        .await
        .unwrap();

    let (status, body) = send(&app(store, None), get("/tokens")).await;
    assert_eq!(status, StatusCode::OK);

    let tokens: Vec<Token> = serde_json::from_value(body).unwrap();
    assert_eq!(tokens.len(), 2);
    assert_eq!(tokens[0].address, WBONE.to_string().to_lowercase());
    assert_eq!(tokens[0].name, "Wrapped Bone");
    assert_eq!(tokens[0].symbol.as_deref(), Some("WBONE"));
    assert_eq!(tokens[0].decimals, Some(18));
    assert_eq!(tokens[0].flag, None);
    assert_eq!(tokens[0].logo, None);
    assert_eq!(tokens[1].symbol.as_deref(), Some("SHIB"));
}

#[tokio::test]
async fn test_new_pairs_are_picked_up_on_the_next_run() {
    let store = Arc::new(InMemoryTokenStore::new());
    let ledger = Arc::new(
        StaticLedger::new(factory())
            .with_token(WBONE, "Wrapped Bone", "WBONE", 18)
            .with_token(SHIB, "Shiba Inu", "SHIB", 18)
            .with_token(LEASH, "Doge Killer", "LEASH", 18)
            .with_pair(Address::repeat_byte(0x10), WBONE, SHIB),
    );
    let ingestion = service(ledger.clone(), store.clone(), IngestionConfig::default());

    let first = ingestion.run().await.unwrap();
    assert_eq!(first.end_index, 1);

    ledger.add_pair(Address::repeat_byte(0x11), WBONE, LEASH);
    let second = ingestion.run().await.unwrap();

    assert_eq!(second.start_index, 1);
    assert_eq!(second.end_index, 2);
    assert_eq!(second.tokens_created, 1);
    assert_eq!(store.token_count().await, 3);

    let third = ingestion.run().await.unwrap();
    assert_eq!(third.pairs_processed, 0);
    assert_eq!(store.token_count().await, 3);
}

#[tokio::test]
async fn test_client_records_survive_ingestion() {
    let store = Arc::new(InMemoryTokenStore::new());
    let router = app(store.clone(), None);

    let address = WBONE.to_string();
    let (status, created) = send(
        &router,
        post_json("/tokens", json!({ "name": "Bone Curated", "address": address, "logo": "bone.png" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["address"], address.to_lowercase());

    let ledger = Arc::new(
        StaticLedger::new(factory())
            .with_token(WBONE, "Wrapped Bone", "WBONE", 18)
            .with_token(SHIB, "Shiba Inu", "SHIB", 18)
            .with_pair(Address::repeat_byte(0x10), WBONE, SHIB),
    );
    let report = service(ledger, store.clone(), IngestionConfig::default())
        .run()
        .await
        .unwrap();
    assert_eq!(report.tokens_created, 1);
    assert_eq!(report.tokens_existing, 1);

    let kept = store
        .get_token_by_address(&address.to_lowercase())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(kept.name, "Bone Curated");
    assert_eq!(kept.logo.as_deref(), Some("bone.png"));
}

#[tokio::test]
async fn test_hidden_tokens_stay_hidden() {
    let store = Arc::new(InMemoryTokenStore::with_tokens(vec![
        Token {
            address: "0xdead".to_string(),
            name: "Scam".to_string(),
            symbol: None,
            decimals: None,
            flag: Some(false),
            logo: None,
        },
        Token {
            address: "0xbeef".to_string(),
            name: "Listed".to_string(),
            symbol: None,
            decimals: None,
            flag: None,
            logo: None,
        },
    ]));

    let (status, body) = send(&app(store, None), get("/tokens")).await;

    assert_eq!(status, StatusCode::OK);
    let addresses: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["address"].as_str().unwrap())
        .collect();
    assert_eq!(addresses, vec!["0xbeef"]);
}

#[tokio::test]
async fn test_second_create_with_same_address_fails() {
    let router = app(Arc::new(InMemoryTokenStore::new()), None);
    let body = json!({ "name": "Foo", "address": "0xabc", "logo": "x.png" });

    let (first, created) = send(&router, post_json("/tokens", body.clone())).await;
    let (second, error) = send(&router, post_json("/tokens", body)).await;

    assert_eq!(first, StatusCode::CREATED);
    assert_eq!(created["name"], "Foo");
    assert_eq!(second, StatusCode::BAD_REQUEST);
    assert!(error["message"].is_string());
}

#[tokio::test]
async fn test_manual_trigger_and_status() {
    let store = Arc::new(InMemoryTokenStore::new());
    let ledger = Arc::new(
        StaticLedger::new(factory())
            .with_token(WBONE, "Wrapped Bone", "WBONE", 18)
            .with_token(SHIB, "Shiba Inu", "SHIB", 18)
            .with_pair(Address::repeat_byte(0x10), WBONE, SHIB)
            .with_pair(Address::repeat_byte(0x11), WBONE, LEASH),
    );
    let config = IngestionConfig {
        failure_policy: FailurePolicy::Skip,
        ..Default::default()
    };
    let scheduler = Arc::new(IngestionScheduler::new(
        service(ledger, store.clone(), config),
        None,
    ));
    let router = app(store.clone(), Some(scheduler.clone()));

    let (status, _) = send(&router, post_json("/ingestion/run", json!({}))).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let mut body = Value::Null;
    for _ in 0..100 {
        let (_, current) = send(&router, get("/ingestion/status")).await;
        if current["state"] == "completed" || current["state"] == "failed" {
            body = current;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    // LEASH has no metadata, so the second pair is recorded as a failure and skipped
    assert_eq!(body["state"], "completed");
    assert_eq!(body["cursor"], 2);
    assert_eq!(body["last_report"]["failures"].as_array().unwrap().len(), 1);
    assert_eq!(store.token_count().await, 2);
}
