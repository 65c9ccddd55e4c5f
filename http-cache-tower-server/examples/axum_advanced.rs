//! Query-aware caching, tag-based invalidation, and simple hit/miss
//! counting with `http-cache-tower-server` and Axum.
//!
//! ```bash
//! cargo run --example axum_advanced --features manager-cacache
//!
//! curl -i "http://localhost:3000/search?q=rust"   # MISS, runs the handler
//! curl -i "http://localhost:3000/search?q=rust"   # HIT, carries Age
//! curl -i "http://localhost:3000/search?q=cache"  # different query, different key: MISS
//! curl http://localhost:3000/metrics
//! curl -X DELETE http://localhost:3000/cache/products
//! curl -i http://localhost:3000/products/42       # MISS again after invalidation
//! ```

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use axum::{
    error_handling::HandleErrorLayer,
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
    routing::{delete, get},
    Router,
};
use http::StatusCode;
use http_cache_core::{CachePolicy, CacacheStore, OutputCacheStore, QueryKeyProvider, RequestContext};
use http_cache_tower_server::{BoxError, OutputCacheLayer, OutputCacheOptions};
use serde::Deserialize;
use tempfile::TempDir;
use tower::ServiceBuilder;

#[derive(Default)]
struct Metrics {
    requests: AtomicU64,
    hits: AtomicU64,
}

/// Tags every cached response under `tag` with a fixed expiration, and
/// counts a hit whenever a fresh candidate entry is found.
struct Tagged {
    tag: &'static str,
    ttl: Duration,
    metrics: Arc<Metrics>,
}

#[async_trait::async_trait]
impl CachePolicy for Tagged {
    async fn cache_request(&self, ctx: &mut RequestContext) {
        self.metrics.requests.fetch_add(1, Ordering::Relaxed);
        ctx.tags.insert(self.tag.to_string());
        ctx.response_expiration = Some(self.ttl);
    }

    async fn serve_from_cache(&self, ctx: &mut RequestContext) {
        if ctx.is_cache_entry_fresh {
            self.metrics.hits.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[derive(Clone)]
struct AppState {
    store: CacacheStore,
    metrics: Arc<Metrics>,
}

#[tokio::main]
async fn main() {
    let temp_dir = TempDir::new().expect("failed to create temp directory");
    let store = CacacheStore::new(temp_dir.path());
    let metrics = Arc::new(Metrics::default());

    let search_cache = OutputCacheLayer::new(
        store.clone(),
        OutputCacheOptions::new()
            .key_provider(QueryKeyProvider)
            .policy(Tagged { tag: "search", ttl: Duration::from_secs(300), metrics: metrics.clone() }),
    );
    let products_cache = OutputCacheLayer::new(
        store.clone(),
        OutputCacheOptions::new()
            .policy(Tagged { tag: "products", ttl: Duration::from_secs(600), metrics: metrics.clone() }),
    );

    let state = AppState { store, metrics };

    let cached = Router::new()
        .route("/search", get(search))
        .layer(ServiceBuilder::new().layer(HandleErrorLayer::new(handle_cache_error)).layer(search_cache))
        .merge(
            Router::new().route("/products/{id}", get(get_product)).layer(
                ServiceBuilder::new()
                    .layer(HandleErrorLayer::new(handle_cache_error))
                    .layer(products_cache),
            ),
        );

    let admin = Router::new().route("/metrics", get(metrics_endpoint)).route("/cache/{tag}", delete(invalidate));

    let app = cached.merge(admin).with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await.unwrap();
    println!("listening on http://{}", listener.local_addr().unwrap());
    axum::serve(listener, app).await.unwrap();
}

async fn handle_cache_error(err: BoxError) -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, format!("cache error: {err}")).into_response()
}

#[derive(Deserialize)]
struct SearchQuery {
    q: String,
}

async fn search(Query(params): Query<SearchQuery>) -> Response {
    tokio::time::sleep(Duration::from_millis(50)).await;
    (StatusCode::OK, format!("search results for: {}", params.q)).into_response()
}

async fn get_product(Path(id): Path<u32>) -> Response {
    tokio::time::sleep(Duration::from_millis(100)).await;
    (StatusCode::OK, format!("product {id} details, cached for 10 minutes")).into_response()
}

async fn metrics_endpoint(State(state): State<AppState>) -> Response {
    let requests = state.metrics.requests.load(Ordering::Relaxed);
    let hits = state.metrics.hits.load(Ordering::Relaxed);
    let hit_rate = if requests > 0 { (hits as f64 / requests as f64) * 100.0 } else { 0.0 };
    (
        StatusCode::OK,
        format!("requests: {requests}\nhits: {hits}\nhit rate: {hit_rate:.1}%"),
    )
        .into_response()
}

async fn invalidate(State(state): State<AppState>, Path(tag): Path<String>) -> Response {
    match state.store.evict_by_tag(&tag).await {
        Ok(()) => (StatusCode::OK, format!("invalidated tag: {tag}")).into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, format!("failed to invalidate: {err}")).into_response(),
    }
}
