//! Output caching with `http-cache-tower-server` and Axum.
//!
//! ```bash
//! cargo run --example axum_basic --features manager-cacache
//!
//! curl -v http://localhost:3000/           # first request: runs the handler
//! curl -v http://localhost:3000/           # second request: served from cache, carries Age
//! curl -v http://localhost:3000/users/42   # a second cached route, shorter TTL
//! curl -v http://localhost:3000/no-cache   # never intercepted
//! ```

use std::time::Duration;

use axum::{
    error_handling::HandleErrorLayer,
    extract::Path,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use http::StatusCode;
use http_cache_core::{CachePolicy, CacacheStore, RequestContext};
use http_cache_tower_server::{BoxError, OutputCacheLayer, OutputCacheOptions};
use tempfile::TempDir;
use tower::ServiceBuilder;

/// Caches every request that reaches it, for a fixed duration.
#[derive(Clone, Copy)]
struct CacheFor(Duration);

#[async_trait::async_trait]
impl CachePolicy for CacheFor {
    async fn cache_request(&self, ctx: &mut RequestContext) {
        ctx.response_expiration = Some(self.0);
    }
}

#[tokio::main]
async fn main() {
    let temp_dir = TempDir::new().expect("failed to create temp directory");
    let store = CacacheStore::new(temp_dir.path());

    let index_cache = OutputCacheLayer::new(store.clone(), OutputCacheOptions::new().policy(CacheFor(Duration::from_secs(60))));
    let users_cache = OutputCacheLayer::new(store, OutputCacheOptions::new().policy(CacheFor(Duration::from_secs(30))));

    let cached = Router::new()
        .route("/", get(index))
        .layer(ServiceBuilder::new().layer(HandleErrorLayer::new(handle_cache_error)).layer(index_cache))
        .merge(
            Router::new().route("/users/{id}", get(get_user)).layer(
                ServiceBuilder::new().layer(HandleErrorLayer::new(handle_cache_error)).layer(users_cache),
            ),
        );

    let app = cached.route("/no-cache", get(no_cache));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await.unwrap();
    println!("listening on http://{}", listener.local_addr().unwrap());
    axum::serve(listener, app).await.unwrap();
}

async fn handle_cache_error(err: BoxError) -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, format!("cache error: {err}")).into_response()
}

async fn index() -> Response {
    (StatusCode::OK, "hello, this response is cached for 60 seconds").into_response()
}

async fn get_user(Path(id): Path<u32>) -> Response {
    (StatusCode::OK, format!("user {id}, cached for 30 seconds")).into_response()
}

async fn no_cache() -> Response {
    (StatusCode::OK, "this route is never intercepted by the cache").into_response()
}
