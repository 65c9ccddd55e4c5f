//! Derives a stable storage key string from a request (spec §4.2).

use http::request::Parts;

/// The request attributes a policy can ask the key provider to fold into
/// the cache key beyond method/scheme/host/path (spec: "specific query-
/// string keys, specific request-header values, route-value bindings, and
/// an explicit vary-by custom value bag").
#[derive(Debug, Clone, Default)]
pub struct VaryBy {
    /// Query-string parameter names to include (case-insensitive).
    pub query_keys: Vec<String>,
    /// Request header names to include (case-insensitive).
    pub headers: Vec<String>,
    /// Route-value bindings, captured by the caller since this crate has no
    /// router of its own (name, value) pairs already resolved.
    pub route_values: Vec<(String, String)>,
    /// Arbitrary caller-supplied values, for anything not covered above.
    pub custom: Vec<(String, String)>,
}

impl VaryBy {
    /// An empty vary-by bag: only method/scheme/host/path contribute to the
    /// key.
    pub fn none() -> Self {
        Self::default()
    }

    /// Adds a query-string key to vary by.
    pub fn query(mut self, key: impl Into<String>) -> Self {
        self.query_keys.push(key.into());
        self
    }

    /// Adds a request header to vary by.
    pub fn header(mut self, name: impl Into<String>) -> Self {
        self.headers.push(name.into());
        self
    }

    /// Adds a resolved route-value binding to vary by.
    pub fn route_value(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.route_values.push((name.into(), value.into()));
        self
    }

    /// Adds an arbitrary custom value to vary by.
    pub fn custom(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom.push((name.into(), value.into()));
        self
    }
}

/// Derives a deterministic, case-normalized storage key from a request.
///
/// Returns the empty string to signal "not keyable" (spec: "skip cache"),
/// e.g. for a request whose path or host cannot be determined.
pub trait KeyProvider: Send + Sync + 'static {
    /// Builds the storage key for `parts`, incorporating `vary_by`.
    fn create_storage_key(&self, parts: &Parts, vary_by: &VaryBy) -> String;
}

/// Scheme-aware, RFC-agnostic key derivation shared by the built-in
/// providers: method, scheme (from a forwarded-proto header, falling back
/// to a fixed default since this crate sits behind a transport it doesn't
/// own), host, and path are always included; `vary_by` extends it.
fn base_key(parts: &Parts) -> String {
    let scheme = parts
        .headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("http");
    let host = parts
        .headers
        .get(http::header::HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| parts.uri.host())
        .unwrap_or("");
    format!(
        "{} {}://{}{}",
        parts.method.as_str(),
        scheme,
        host,
        parts.uri.path()
    )
}

fn append_vary_by(mut key: String, parts: &Parts, vary_by: &VaryBy) -> String {
    if !vary_by.query_keys.is_empty() {
        let query = parts.uri.query().unwrap_or("");
        let pairs: std::collections::BTreeMap<String, String> = query
            .split('&')
            .filter(|p| !p.is_empty())
            .filter_map(|p| p.split_once('='))
            .map(|(k, v)| (k.to_ascii_lowercase(), v.to_string()))
            .collect();
        for qk in &vary_by.query_keys {
            let lower = qk.to_ascii_lowercase();
            if let Some(v) = pairs.get(&lower) {
                key.push_str(&format!(" q:{lower}={v}"));
            }
        }
    }
    for h in &vary_by.headers {
        if let Some(v) = parts.headers.get(h).and_then(|v| v.to_str().ok()) {
            key.push_str(&format!(" h:{}={}", h.to_ascii_lowercase(), v));
        }
    }
    for (name, value) in &vary_by.route_values {
        key.push_str(&format!(" r:{name}={value}"));
    }
    for (name, value) in &vary_by.custom {
        key.push_str(&format!(" c:{name}={value}"));
    }
    key
}

/// The default key provider: method, scheme, host, path, plus whatever
/// `vary_by` a policy registered during `CacheRequest`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultKeyProvider;

impl KeyProvider for DefaultKeyProvider {
    fn create_storage_key(&self, parts: &Parts, vary_by: &VaryBy) -> String {
        append_vary_by(base_key(parts), parts, vary_by)
    }
}

/// A key provider that always includes the raw query string, for endpoints
/// where every query parameter is meaningful (e.g. search results).
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryKeyProvider;

impl KeyProvider for QueryKeyProvider {
    fn create_storage_key(&self, parts: &Parts, vary_by: &VaryBy) -> String {
        let mut key = base_key(parts);
        if let Some(query) = parts.uri.query() {
            key.push('?');
            key.push_str(query);
        }
        append_vary_by(key, parts, vary_by)
    }
}
