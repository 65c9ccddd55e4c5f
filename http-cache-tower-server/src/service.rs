//! The middleware core (spec §4.5): orchestrates policy hooks, coalesced
//! lookup and execution, conditional (304) serving, and response
//! finalization.

use std::{
    convert::Infallible,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};

use bytes::{Bytes, BytesMut};
use http::{header::CACHE_CONTROL, HeaderName, HeaderValue, Request, Response, StatusCode};
use http_body::Body;
use http_body_util::BodyExt;
use http_cache_core::{
    http_date, CacheEntry, CacheHeaders, CachePolicy, ConditionalEvaluator, EntryFormatter,
    KeyProvider, OutputCacheStore, SharedClock, WorkDispatcher, NOT_MODIFIED_HEADERS,
};
use tokio::sync::Mutex;
use tower_layer::Layer;
use tower_service::Service;

use crate::{
    body::{empty_body, full_body, passthrough_body, BoxError, CacheBody},
    error::MiddlewareError,
    feature::{OutputCacheFeature, RoutePolicies},
    options::OutputCacheOptions,
    stream::OutputCacheStream,
};

/// The data a just-executed request produces: enough to build a
/// [`Response`] and, if storage was allowed and nothing disqualified it, an
/// entry to hand to coalesced late-arrivers and to persist (spec §4.5 step
/// 5, "the current request has already been served" / "attempt
/// `ServeCached` on `producedEntry`").
///
/// Plain, `Send + Sync` data — never the `Response` itself — because this
/// is the value [`WorkDispatcher`] shares across concurrent callers via
/// `Arc`, and a boxed response body is not generally `Sync`.
struct ExecutionOutcome {
    status: u16,
    headers: http::HeaderMap,
    body: Bytes,
    entry: Option<CacheEntry>,
}

fn outcome_response(outcome: &ExecutionOutcome) -> Response<CacheBody> {
    let mut builder = Response::builder()
        .status(StatusCode::from_u16(outcome.status).unwrap_or(StatusCode::OK));
    *builder.headers_mut().expect("builder has no error yet") = outcome.headers.clone();
    builder.body(full_body(outcome.body.clone())).expect("status/headers already validated")
}

/// Tower layer installing the output cache in front of a service.
#[derive(Clone)]
pub struct OutputCacheLayer {
    inner: Arc<Shared>,
}

struct Shared {
    store: Arc<dyn OutputCacheStore>,
    options: OutputCacheOptions,
    formatter: EntryFormatter,
    conditional: ConditionalEvaluator,
    lookup_dispatcher: WorkDispatcher<Option<CacheEntry>, Infallible>,
    execute_dispatcher: WorkDispatcher<ExecutionOutcome, String>,
}

impl OutputCacheLayer {
    /// Builds a layer backed by `store`, configured by `options`.
    pub fn new(store: impl OutputCacheStore, options: OutputCacheOptions) -> Self {
        Self {
            inner: Arc::new(Shared {
                store: Arc::new(store),
                options,
                formatter: EntryFormatter::new(),
                conditional: ConditionalEvaluator::new(),
                lookup_dispatcher: WorkDispatcher::new(),
                execute_dispatcher: WorkDispatcher::new(),
            }),
        }
    }
}

impl<S> Layer<S> for OutputCacheLayer {
    type Service = OutputCacheService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        OutputCacheService { inner, shared: self.inner.clone() }
    }
}

/// The wrapped `Service`. Clones of `inner` run inside a dispatcher's
/// detached task, so `S: Clone` — the same requirement every
/// body-buffering Tower middleware places on its inner service.
#[derive(Clone)]
pub struct OutputCacheService<S> {
    inner: S,
    shared: Arc<Shared>,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for OutputCacheService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Error: Into<BoxError>,
    S::Future: Send + 'static,
    ReqBody: Send + 'static,
    ResBody: Body<Data = Bytes> + Send + Unpin + 'static,
    ResBody::Error: Into<BoxError>,
{
    type Response = Response<CacheBody>;
    type Error = BoxError;
    type Future =
        Pin<Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let shared = self.shared.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let (mut parts, body) = req.into_parts();

            let route_policies =
                parts.extensions.get::<RoutePolicies>().cloned().unwrap_or_default();
            let mut policies = shared.options.base_policies.clone();
            policies.extend(route_policies.0);

            if policies.is_empty() {
                let req = Request::from_parts(parts, body);
                return inner
                    .call(req)
                    .await
                    .map(|resp| resp.map(passthrough_body::<ResBody>))
                    .map_err(|err| {
                        Box::new(MiddlewareError::HandlerFailure(err.into())) as BoxError
                    });
            }

            if parts.extensions.get::<OutputCacheFeature>().is_some() {
                return Err(Box::new(MiddlewareError::FeatureAlreadyInstalled) as BoxError);
            }
            let feature = OutputCacheFeature::new();
            let ctx = feature.0.clone();
            // Spec §4.5 step 2: "attach a per-request handle to the HTTP
            // context so nested handlers can read/modify the
            // `RequestContext`." Installed on every request `parts` built
            // from here on, so a nested handler can pull it back out via
            // `parts.extensions`, and so a second, stacked
            // `OutputCacheLayer` sees it and trips the guard above instead
            // of silently double-installing. Nothing downstream of this
            // `call` ever sees `parts` again once `inner.call` consumes the
            // request it's moved into, so the installation does not
            // outlive this request (spec §4.5 step 7 cleanup).
            parts.extensions.insert(feature.clone());

            {
                let mut guard = ctx.lock().await;
                for policy in &policies {
                    policy.cache_request(&mut guard).await;
                }
            }

            let (enable, mut allow_lookup, mut allow_storage, allow_locking) = {
                let guard = ctx.lock().await;
                (
                    guard.enable_output_caching,
                    guard.allow_cache_lookup,
                    guard.allow_cache_storage,
                    guard.allow_locking,
                )
            };

            if !enable {
                let req = Request::from_parts(parts, body);
                return inner
                    .call(req)
                    .await
                    .map(|resp| resp.map(passthrough_body::<ResBody>))
                    .map_err(|err| {
                        Box::new(MiddlewareError::HandlerFailure(err.into())) as BoxError
                    });
            }

            let key = if allow_lookup || allow_storage {
                let vary_by = ctx.lock().await.vary_by.clone();
                let computed = shared.options.key_provider.create_storage_key(&parts, &vary_by);
                let mut guard = ctx.lock().await;
                guard.cache_key_or_compute(|| computed).to_string()
            } else {
                String::new()
            };
            if key.is_empty() {
                log::debug!("request is not keyable; skipping cache lookup and storage");
                allow_lookup = false;
                allow_storage = false;
            }

            // Cache lookup path (spec §4.5 step 4).
            if allow_lookup {
                let store = shared.store.clone();
                let formatter = shared.formatter;
                let factory_key = key.clone();
                let (_, result) = shared
                    .lookup_dispatcher
                    .schedule(key.clone(), move || async move {
                        Ok::<_, Infallible>(formatter.get(&factory_key, store.as_ref()).await)
                    })
                    .await;
                let Ok(entry_opt) = result else { unreachable!("Infallible") };

                if let Some(entry) = entry_opt.as_ref() {
                    if let Some(response) = serve_cached(
                        &ctx,
                        entry,
                        &policies,
                        &shared.options.clock,
                        &shared.conditional,
                        &parts,
                    )
                    .await
                    {
                        return Ok(response);
                    }
                }

                if only_if_cached(&parts) {
                    log::debug!(
                        "only-if-cached miss for key `{key}`; responding 504 without calling upstream"
                    );
                    return Ok(Response::builder()
                        .status(StatusCode::GATEWAY_TIMEOUT)
                        .body(empty_body())
                        .expect("status is valid"));
                }
            }

            // Execute-and-store path (spec §4.5 step 5).
            if allow_storage {
                let method = parts.method.clone();
                let factory_ctx = ctx.clone();
                let factory_policies = policies.clone();
                let factory_options_clock = shared.options.clock.clone();
                let default_expiration = shared.options.default_expiration;
                let maximum_body_size = shared.options.maximum_body_size;
                let factory_store = shared.store.clone();
                let factory_formatter = shared.formatter;
                let factory_key = key.clone();
                let mut factory_inner = inner.clone();
                let req = Request::from_parts(parts.clone(), body);

                let factory = move || async move {
                    execute_and_capture(
                        &mut factory_inner,
                        req,
                        method,
                        factory_ctx,
                        factory_policies,
                        factory_options_clock,
                        default_expiration,
                        maximum_body_size,
                        factory_store,
                        factory_formatter,
                        factory_key,
                    )
                    .await
                };

                if allow_locking {
                    let (provenance, result) =
                        shared.execute_dispatcher.schedule(key.clone(), factory).await;
                    match result {
                        Ok(outcome) => {
                            if provenance.is_owner() {
                                return Ok(outcome_response(&outcome));
                            }
                            if let Some(entry) = outcome.entry.as_ref() {
                                if let Some(response) = serve_cached(
                                    &ctx,
                                    entry,
                                    &policies,
                                    &shared.options.clock,
                                    &shared.conditional,
                                    &parts,
                                )
                                .await
                                {
                                    return Ok(response);
                                }
                            }
                            // Redesign (spec §9): never re-execute after the
                            // locking branch was entered. Serve the
                            // just-produced response verbatim.
                            return Ok(outcome_response(&outcome));
                        }
                        Err(err) => {
                            return Err(Box::new(MiddlewareError::HandlerFailure(
                                err.to_string().into(),
                            )) as BoxError)
                        }
                    }
                }

                // Unlocked execution: same factory, no dispatcher coalescing.
                return factory()
                    .await
                    .map(|outcome| outcome_response(&outcome))
                    .map_err(|err| {
                        Box::new(MiddlewareError::HandlerFailure(err.into())) as BoxError
                    });
            }

            // Pass-through (spec §4.5 step 6): neither lookup nor storage
            // allowed.
            let req = Request::from_parts(parts, body);
            inner
                .call(req)
                .await
                .map(|resp| resp.map(passthrough_body::<ResBody>))
                .map_err(|err| Box::new(MiddlewareError::HandlerFailure(err.into())) as BoxError)
        })
    }
}

fn only_if_cached(parts: &http::request::Parts) -> bool {
    parts
        .headers
        .get(CACHE_CONTROL)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|cc| cc.split(',').map(str::trim).any(|d| d.eq_ignore_ascii_case("only-if-cached")))
}

/// ServeCached (spec §4.5): evaluates freshness and conditional headers
/// against `entry`, returning the response to serve on success or `None`
/// if the entry should not be served (stale, or a policy rejected it).
async fn serve_cached(
    ctx: &Arc<Mutex<http_cache_core::RequestContext>>,
    entry: &CacheEntry,
    policies: &[Arc<dyn CachePolicy>],
    clock: &SharedClock,
    conditional: &ConditionalEvaluator,
    parts: &http::request::Parts,
) -> Option<Response<CacheBody>> {
    let now = clock.now();

    {
        let mut guard = ctx.lock().await;
        guard.response_time = Some(now);
        guard.cached_response = Some(entry.clone());
        // Spec §4.5 "Initial IsCacheEntryFresh = true; if age ≤ 0 (clock
        // anomaly), set to false." Using the raw timestamps (rather than
        // the already-clamped `age_secs`) so a legitimate near-instant hit
        // (response_time a few micros after created) is not mistaken for
        // the anomaly case.
        guard.is_cache_entry_fresh = now > entry.created;
        guard.cached_entry_age = Some(Duration::from_secs(entry.age_secs(now)));
        for policy in policies {
            policy.serve_from_cache(&mut guard).await;
        }
        if !guard.is_cache_entry_fresh {
            return None;
        }
    }

    if conditional.is_not_modified(parts, entry) {
        let mut builder = Response::builder().status(StatusCode::NOT_MODIFIED);
        for name in NOT_MODIFIED_HEADERS {
            for value in entry.headers.get_all(name) {
                builder = builder.header(*name, value);
            }
        }
        return Some(builder.body(empty_body()).expect("only allow-listed headers are set"));
    }

    let mut builder = Response::builder()
        .status(StatusCode::from_u16(entry.status_code).unwrap_or(StatusCode::OK));
    for (name, value) in entry.headers.iter() {
        if let (Ok(name), Ok(value)) =
            (HeaderName::try_from(name), HeaderValue::from_str(value))
        {
            builder = builder.header(name, value);
        }
    }
    let age = entry.age_secs(now);
    builder = builder.header("age", age.to_string());
    Some(builder.body(full_body(entry.body.clone())).expect("cached headers were already valid"))
}

/// ExecuteFactory (spec §4.5): runs the downstream handler, applies
/// `ServeResponse` hooks, captures the body up to the configured ceiling,
/// and persists a `CacheEntry` when nothing disqualifies it.
#[allow(clippy::too_many_arguments)]
async fn execute_and_capture<S, ReqBody, ResBody>(
    inner: &mut S,
    req: Request<ReqBody>,
    method: http::Method,
    ctx: Arc<Mutex<http_cache_core::RequestContext>>,
    policies: Vec<Arc<dyn CachePolicy>>,
    clock: SharedClock,
    default_expiration: Duration,
    maximum_body_size: usize,
    store: Arc<dyn OutputCacheStore>,
    formatter: EntryFormatter,
    key: String,
) -> Result<ExecutionOutcome, String>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Send,
    S::Error: Into<BoxError>,
    S::Future: Send + 'static,
    ReqBody: Send + 'static,
    ResBody: Body<Data = Bytes> + Send + Unpin + 'static,
    ResBody::Error: Into<BoxError>,
{
    let response =
        inner.call(req).await.map_err(|err| Into::<BoxError>::into(err).to_string())?;
    let (mut parts, body) = response.into_parts();

    let allow_storage = {
        let mut guard = ctx.lock().await;
        for policy in &policies {
            policy.serve_response(&mut guard).await;
        }
        guard.mark_response_started();
        guard.allow_cache_storage
    };

    let response_time = clock.now();
    // Spec §4.5 FinalizeHeaders: "if storage allowed, set outbound `Date`
    // to `ResponseTime`" — stamped on the response before it is snapshotted
    // into a `CacheEntry`, so a stored entry's `Date` always reflects the
    // moment it was captured rather than whatever the handler set (or left
    // unset).
    if allow_storage {
        if let Ok(value) = http::HeaderValue::from_str(&http_date(response_time)) {
            parts.headers.insert(http::header::DATE, value);
        }
    }
    let entry_headers = CacheHeaders::from_header_map(&parts.headers);
    let (tags, ttl) = {
        let guard = ctx.lock().await;
        (
            guard.tags.iter().cloned().collect::<Vec<_>>(),
            guard.response_expiration.unwrap_or(default_expiration),
        )
    };

    let mut capture = OutputCacheStream::new(body, maximum_body_size, || {});
    let mut forwarded = BytesMut::new();
    loop {
        match capture.frame().await {
            None => break,
            Some(Ok(frame)) => {
                if let Some(data) = frame.data_ref() {
                    forwarded.extend_from_slice(data);
                }
            }
            Some(Err(err)) => return Err(Into::<BoxError>::into(err).to_string()),
        }
    }
    let forwarded = forwarded.freeze();

    let mut entry = None;
    if allow_storage && capture.buffering_enabled() {
        let mut headers = entry_headers.clone();
        let content_length_ok = match headers
            .get("content-length")
            .and_then(|v| v.parse::<usize>().ok())
        {
            Some(declared) => {
                declared == forwarded.len() || (method == http::Method::HEAD && forwarded.is_empty())
            }
            None => true,
        };
        if content_length_ok {
            if !headers.contains_key("content-length") && !headers.contains_key("transfer-encoding") {
                headers.insert("content-length", forwarded.len().to_string());
            }
            let built =
                CacheEntry::new(response_time, parts.status.as_u16(), headers, forwarded.to_vec(), tags);
            formatter.store(&key, &built, ttl, store.as_ref()).await;
            entry = Some(built);
        } else {
            log::warn!("content-length mismatch for key `{key}`; not storing");
        }
    }

    Ok(ExecutionOutcome { status: parts.status.as_u16(), headers: parts.headers, body: forwarded, entry })
}
