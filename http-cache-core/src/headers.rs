//! Case-insensitive, multi-valued, order-preserving header storage for a
//! [`crate::entry::CacheEntry`].
//!
//! `http::HeaderMap` already normalizes names, but a `CacheEntry` has to
//! round-trip through an arbitrary byte-blob store (see
//! [`crate::formatter`]), so headers are kept in a plain serde-friendly
//! shape here and converted to/from `http::HeaderMap` at the edges.

use std::collections::BTreeMap;

use http::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A single header name's captured casing plus its stored values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct HeaderSlot {
    /// The casing the name was first captured with (e.g. `Content-Type`,
    /// `ETag`), returned by [`CacheHeaders::iter`] and
    /// [`CacheHeaders::to_header_map`] instead of the lowercase lookup key.
    name: String,
    values: Vec<String>,
}

/// A case-insensitive, multi-valued header bag.
///
/// Keys are compared and looked up by lowercase, but the casing a name was
/// first captured with is retained and is what gets emitted again (spec §9
/// "Case-insensitive headers... preserving original casing on emit").
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheHeaders {
    // BTreeMap (keyed by lowercase name) keeps serialized output
    // deterministic, which matters for cache-entry round-trip tests.
    inner: BTreeMap<String, HeaderSlot>,
}

impl CacheHeaders {
    /// Creates an empty header bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a header, replacing any existing values for that name. The
    /// casing of `name` becomes the one emitted on iteration/serialization,
    /// even if a prior `insert`/`append` used different casing.
    pub fn insert(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        let name = name.as_ref();
        self.inner.insert(
            name.to_ascii_lowercase(),
            HeaderSlot { name: name.to_string(), values: vec![value.into()] },
        );
    }

    /// Appends a header value, preserving existing values for that name.
    /// The first casing seen for a name is the one retained.
    pub fn append(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        let name = name.as_ref();
        self.inner
            .entry(name.to_ascii_lowercase())
            .or_insert_with(|| HeaderSlot { name: name.to_string(), values: Vec::new() })
            .values
            .push(value.into());
    }

    /// Removes a header and all its values.
    pub fn remove(&mut self, name: impl AsRef<str>) {
        self.inner.remove(&name.as_ref().to_ascii_lowercase());
    }

    /// Returns the first value for a header name, if present.
    pub fn get(&self, name: impl AsRef<str>) -> Option<&str> {
        self.inner
            .get(&name.as_ref().to_ascii_lowercase())
            .and_then(|slot| slot.values.first())
            .map(String::as_str)
    }

    /// Returns all values for a header name.
    pub fn get_all(&self, name: impl AsRef<str>) -> &[String] {
        self.inner
            .get(&name.as_ref().to_ascii_lowercase())
            .map(|slot| slot.values.as_slice())
            .unwrap_or(&[])
    }

    /// Returns whether a header name is present.
    pub fn contains_key(&self, name: impl AsRef<str>) -> bool {
        self.inner.contains_key(&name.as_ref().to_ascii_lowercase())
    }

    /// Iterates over `(name, value)` pairs, one per stored value, emitting
    /// each name with the casing it was first captured with.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner
            .values()
            .flat_map(|slot| slot.values.iter().map(move |v| (slot.name.as_str(), v.as_str())))
    }

    /// Builds a header bag from an `http::HeaderMap`, capturing every value
    /// for headers that repeat (e.g. `Set-Cookie`).
    ///
    /// The `Age` header is never carried into a cache entry (spec: "The
    /// `Age` header is never stored"); callers that want to build a
    /// `CacheEntry` should filter it out before or after calling this.
    pub fn from_header_map(headers: &HeaderMap) -> Self {
        let mut out = Self::new();
        for name in headers.keys() {
            for value in headers.get_all(name) {
                if let Ok(s) = value.to_str() {
                    out.append(name.as_str(), s.to_string());
                }
            }
        }
        out
    }

    /// Converts back into an `http::HeaderMap`.
    pub fn to_header_map(&self) -> Result<HeaderMap> {
        let mut map = HeaderMap::new();
        for (name, value) in self.iter() {
            let name = HeaderName::try_from(name)?;
            let value = HeaderValue::from_str(value)?;
            map.append(name, value);
        }
        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        let mut h = CacheHeaders::new();
        h.insert("Content-Type", "text/plain");
        assert_eq!(h.get("content-type"), Some("text/plain"));
        assert_eq!(h.get("CONTENT-TYPE"), Some("text/plain"));
    }

    #[test]
    fn append_preserves_multiple_values() {
        let mut h = CacheHeaders::new();
        h.append("set-cookie", "a=1");
        h.append("Set-Cookie", "b=2");
        assert_eq!(h.get_all("set-cookie"), &["a=1".to_string(), "b=2".to_string()]);
    }

    #[test]
    fn insert_replaces_existing_values() {
        let mut h = CacheHeaders::new();
        h.append("x-tag", "one");
        h.insert("x-tag", "two");
        assert_eq!(h.get_all("x-tag"), &["two".to_string()]);
    }

    #[test]
    fn iteration_preserves_the_casing_a_name_was_first_captured_with() {
        let mut h = CacheHeaders::new();
        h.insert("Content-Type", "text/plain");
        let (name, _) = h.iter().next().unwrap();
        assert_eq!(name, "Content-Type");
    }

    #[test]
    fn append_keeps_the_casing_from_the_first_append_for_later_ones() {
        let mut h = CacheHeaders::new();
        h.append("X-Tag", "one");
        h.append("x-tag", "two");
        let names: Vec<_> = h.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["X-Tag", "X-Tag"]);
    }

    #[test]
    fn insert_after_append_adopts_the_new_casing() {
        let mut h = CacheHeaders::new();
        h.append("x-tag", "one");
        h.insert("X-Tag", "two");
        let (name, _) = h.iter().next().unwrap();
        assert_eq!(name, "X-Tag");
    }

    #[test]
    fn round_trips_through_header_map() {
        let mut map = HeaderMap::new();
        map.append("vary", HeaderValue::from_static("accept-language"));
        map.append("vary", HeaderValue::from_static("accept-encoding"));
        let headers = CacheHeaders::from_header_map(&map);
        let back = headers.to_header_map().unwrap();
        let values: Vec<_> =
            back.get_all("vary").iter().map(|v| v.to_str().unwrap()).collect();
        assert_eq!(values, vec!["accept-language", "accept-encoding"]);
    }
}
