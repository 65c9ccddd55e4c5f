//! `If-None-Match` / `If-Modified-Since` evaluation (spec §4.4).

use http::request::Parts;

use crate::entry::CacheEntry;

/// Header names allowed on a synthesized `304 Not Modified` response (spec
/// §4.4: "304 assembly").
pub const NOT_MODIFIED_HEADERS: &[&str] = &[
    "cache-control",
    "content-location",
    "date",
    "etag",
    "expires",
    "vary",
];

/// Decides whether a cache hit should be answered with `304 Not Modified`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConditionalEvaluator;

impl ConditionalEvaluator {
    /// Creates a new evaluator. Stateless.
    pub fn new() -> Self {
        Self
    }

    /// Evaluates `request` against `entry` per the ordered rules in spec
    /// §4.4: `If-None-Match` is checked first and, if present, makes the
    /// decision on its own (an accompanying `If-Modified-Since` is
    /// ignored); only in its absence does `If-Modified-Since` apply.
    pub fn is_not_modified(&self, request: &Parts, entry: &CacheEntry) -> bool {
        if let Some(if_none_match) = request
            .headers
            .get(http::header::IF_NONE_MATCH)
            .and_then(|v| v.to_str().ok())
        {
            return Self::if_none_match_matches(if_none_match, entry);
        }

        if let Some(if_modified_since) = request
            .headers
            .get(http::header::IF_MODIFIED_SINCE)
            .and_then(|v| v.to_str().ok())
        {
            return Self::if_modified_since_matches(if_modified_since, entry);
        }

        false
    }

    fn if_none_match_matches(header_value: &str, entry: &CacheEntry) -> bool {
        let trimmed = header_value.trim();
        if trimmed == "*" {
            return true;
        }

        let Some(cached_etag) = entry.headers.get("etag") else {
            return false;
        };
        let cached = strip_weak_prefix(cached_etag);

        trimmed
            .split(',')
            .map(str::trim)
            .filter(|candidate| !candidate.is_empty())
            .any(|candidate| strip_weak_prefix(candidate) == cached)
    }

    fn if_modified_since_matches(header_value: &str, entry: &CacheEntry) -> bool {
        let Some(modified) = entry
            .headers
            .get("last-modified")
            .or_else(|| entry.headers.get("date"))
            .and_then(|v| httpdate::parse_http_date(v).ok())
        else {
            return false;
        };

        let Ok(since) = httpdate::parse_http_date(header_value.trim()) else {
            return false;
        };

        modified <= since
    }
}

/// Strips an optional leading `W/` weak-validator marker, for weak
/// comparison of entity tags (the quoted value itself, including quotes,
/// is compared verbatim — only the weakness marker is ignored).
fn strip_weak_prefix(tag: &str) -> &str {
    tag.strip_prefix("W/").or_else(|| tag.strip_prefix("w/")).unwrap_or(tag)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headers::CacheHeaders;
    use http::Request;
    use std::time::SystemTime;

    fn entry_with_headers(pairs: &[(&str, &str)]) -> CacheEntry {
        let mut headers = CacheHeaders::new();
        for (name, value) in pairs {
            headers.insert(*name, *value);
        }
        CacheEntry::new(SystemTime::now(), 200, headers, b"hi".to_vec(), vec![])
    }

    fn request_with(name: &str, value: &str) -> Parts {
        Request::builder()
            .uri("/x")
            .header(name, value)
            .body(())
            .unwrap()
            .into_parts()
            .0
    }

    #[test]
    fn star_if_none_match_is_always_not_modified() {
        let entry = entry_with_headers(&[("etag", "\"v1\"")]);
        let request = request_with("if-none-match", "*");
        assert!(ConditionalEvaluator::new().is_not_modified(&request, &entry));
    }

    #[test]
    fn matching_etag_is_not_modified() {
        let entry = entry_with_headers(&[("etag", "\"v1\"")]);
        let request = request_with("if-none-match", "\"v1\"");
        assert!(ConditionalEvaluator::new().is_not_modified(&request, &entry));
    }

    #[test]
    fn weak_etag_prefix_is_ignored_in_comparison() {
        let entry = entry_with_headers(&[("etag", "W/\"v1\"")]);
        let request = request_with("if-none-match", "\"v1\"");
        assert!(ConditionalEvaluator::new().is_not_modified(&request, &entry));
    }

    #[test]
    fn non_matching_etag_list_is_modified() {
        let entry = entry_with_headers(&[("etag", "\"v1\"")]);
        let request = request_with("if-none-match", "\"a\", \"b\"");
        assert!(!ConditionalEvaluator::new().is_not_modified(&request, &entry));
    }

    #[test]
    fn if_modified_since_is_ignored_when_if_none_match_present() {
        let entry = entry_with_headers(&[
            ("etag", "\"v1\""),
            ("last-modified", "Wed, 21 Oct 2015 07:28:00 GMT"),
        ]);
        let request = Request::builder()
            .uri("/x")
            .header("if-none-match", "\"different\"")
            .header("if-modified-since", "Wed, 21 Oct 2015 07:28:00 GMT")
            .body(())
            .unwrap()
            .into_parts()
            .0;
        assert!(!ConditionalEvaluator::new().is_not_modified(&request, &entry));
    }

    #[test]
    fn if_modified_since_at_or_before_last_modified_is_not_modified() {
        let entry = entry_with_headers(&[("last-modified", "Wed, 21 Oct 2015 07:28:00 GMT")]);
        let request = request_with("if-modified-since", "Wed, 21 Oct 2015 07:28:00 GMT");
        assert!(ConditionalEvaluator::new().is_not_modified(&request, &entry));
    }

    #[test]
    fn if_modified_since_before_last_modified_is_modified() {
        let entry = entry_with_headers(&[("last-modified", "Wed, 21 Oct 2015 07:28:00 GMT")]);
        let request = request_with("if-modified-since", "Tue, 20 Oct 2015 07:28:00 GMT");
        assert!(!ConditionalEvaluator::new().is_not_modified(&request, &entry));
    }

    #[test]
    fn falls_back_to_date_header_when_last_modified_absent() {
        let entry = entry_with_headers(&[("date", "Wed, 21 Oct 2015 07:28:00 GMT")]);
        let request = request_with("if-modified-since", "Wed, 21 Oct 2015 07:28:00 GMT");
        assert!(ConditionalEvaluator::new().is_not_modified(&request, &entry));
    }

    #[test]
    fn no_conditional_headers_is_not_not_modified() {
        let entry = entry_with_headers(&[("etag", "\"v1\"")]);
        let request = Request::builder().uri("/x").body(()).unwrap().into_parts().0;
        assert!(!ConditionalEvaluator::new().is_not_modified(&request, &entry));
    }

    #[test]
    fn unparseable_if_modified_since_is_not_not_modified() {
        let entry = entry_with_headers(&[("last-modified", "Wed, 21 Oct 2015 07:28:00 GMT")]);
        let request = request_with("if-modified-since", "not-a-date");
        assert!(!ConditionalEvaluator::new().is_not_modified(&request, &entry));
    }
}
