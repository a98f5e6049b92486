//! Parameters captured from the HTTP upgrade request.
//!
//! Browsers cannot attach custom headers to a WebSocket upgrade, so
//! everything the server needs up front (session token, room id) travels
//! in the request path, the query string, or a cookie.

use std::collections::HashMap;

use cookie::Cookie;
use percent_encoding::percent_decode_str;
use url::form_urlencoded;

/// Request path, query parameters, and cookies of an upgraded connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Handshake {
    path: String,
    query: HashMap<String, String>,
    cookies: HashMap<String, String>,
}

impl Handshake {
    /// Builds a handshake from raw request parts.
    ///
    /// `query` is the part of the URI after `?` (without the `?`).
    /// `cookie_headers` are the raw values of every `Cookie` header.
    /// Malformed cookie pairs are skipped.
    pub fn from_parts<'a>(
        path: &str,
        query: Option<&str>,
        cookie_headers: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        let query = query
            .map(|q| {
                form_urlencoded::parse(q.as_bytes())
                    .into_owned()
                    .collect()
            })
            .unwrap_or_default();

        let cookies = cookie_headers
            .into_iter()
            .flat_map(Cookie::split_parse)
            .filter_map(Result::ok)
            .map(|c| (c.name().to_string(), c.value().to_string()))
            .collect();

        Self {
            path: path.to_string(),
            query,
            cookies,
        }
    }

    /// The request path, e.g. `/ws/table1`.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Non-empty path segments, percent-decoded.
    pub fn path_segments(&self) -> impl Iterator<Item = String> + '_ {
        self.path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| percent_decode_str(s).decode_utf8_lossy().into_owned())
    }

    /// Returns a query parameter by name. A repeated name keeps its last value.
    pub fn query(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    /// Returns a cookie by name.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }
}
