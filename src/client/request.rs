//! Fluent construction of [`RequestDescriptor`]s.
//!
//! # Examples
//!
//! ```
//! use chained_http::client::RequestBuilder;
//! use chained_http::CachePolicy;
//! use serde_json::json;
//! use std::time::Duration;
//!
//! let request = RequestBuilder::post("https://api.example.com/login")
//!     .with_user_agent("demo/1.0")
//!     .with_timeout(Duration::from_secs(5))
//!     .with_cache_policy(CachePolicy::ReloadIgnoringCache)
//!     .with_json(&json!({"user": "ann"}))
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(request.headers["Content-Type"], "application/json");
//! assert_eq!(request.body.as_deref(), Some(&br#"{"user":"ann"}"#[..]));
//! ```

use crate::error::RequestError;
use crate::protocol::{encode_json_body, encode_query_string};
use crate::types::{CachePolicy, RequestDescriptor};
use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http::Method;
use serde_json::Value;
use std::time::Duration;

/// Builder for [`RequestDescriptor`].
///
/// Errors are deferred to [`build`](Self::build) so calls can be chained.
#[derive(Debug)]
pub struct RequestBuilder {
    request: RequestDescriptor,
    query: Option<String>,
    error: Option<RequestError>,
}

impl RequestBuilder {
    /// Start a GET request for `url`.
    pub fn new(url: impl Into<String>) -> Self {
        RequestBuilder {
            request: RequestDescriptor::get(url),
            query: None,
            error: None,
        }
    }

    /// Start a POST request for `url`.
    pub fn post(url: impl Into<String>) -> Self {
        Self::new(url).with_method(Method::POST)
    }

    /// Set the HTTP method.
    pub fn with_method(mut self, method: Method) -> Self {
        self.request.method = method;
        self
    }

    /// Add or replace a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let value = value.into();
        if HeaderName::from_bytes(name.as_bytes()).is_err() || HeaderValue::from_str(&value).is_err() {
            self.error.get_or_insert(RequestError::InvalidHeader(name));
            return self;
        }
        self.request.headers.insert(name, value);
        self
    }

    /// Add several headers.
    pub fn with_headers<I, K, V>(self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        headers
            .into_iter()
            .fold(self, |builder, (name, value)| builder.with_header(name, value))
    }

    /// Set the `User-Agent` header.
    pub fn with_user_agent(self, user_agent: impl Into<String>) -> Self {
        self.with_header("User-Agent", user_agent)
    }

    /// Set the cache policy.
    pub fn with_cache_policy(mut self, policy: CachePolicy) -> Self {
        self.request.cache_policy = policy;
        self
    }

    /// Set the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request.timeout = Some(timeout);
        self
    }

    /// Whether this request sends and stores cookies.
    ///
    /// The cookie jar itself belongs to the manager
    /// (`ManagerConfig::cookie_store`); this only opts a request out of it.
    pub fn with_cookies(mut self, handle_cookies: bool) -> Self {
        self.request.handle_cookies = handle_cookies;
        self
    }

    /// Append `params` to the URL as a query string.
    pub fn with_query(mut self, params: &Value) -> Self {
        let encoded = encode_query_string(params);
        if !encoded.is_empty() {
            self.query = Some(match self.query.take() {
                Some(existing) => format!("{existing}&{encoded}"),
                None => encoded,
            });
        }
        self
    }

    /// Send `params` as a form-encoded body.
    pub fn with_form(self, params: &Value) -> Self {
        let body = Bytes::from(encode_query_string(params));
        self.with_header("Content-Type", "application/x-www-form-urlencoded")
            .with_body(body)
    }

    /// Send `params` as a JSON body.
    pub fn with_json(mut self, params: &Value) -> Self {
        match encode_json_body(params) {
            Ok(body) => self
                .with_header("Content-Type", "application/json")
                .with_body(body),
            Err(e) => {
                self.error.get_or_insert(e);
                self
            }
        }
    }

    /// Set a raw body.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.request.body = Some(body.into());
        self
    }

    /// Finish the descriptor, validating its address.
    pub fn build(mut self) -> Result<RequestDescriptor, RequestError> {
        if let Some(error) = self.error {
            return Err(error);
        }
        if let Some(query) = self.query {
            let separator = if self.request.url.contains('?') { '&' } else { '?' };
            self.request.url = format!("{}{}{}", self.request.url, separator, query);
        }
        self.request.validate()?;
        Ok(self.request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let request = RequestBuilder::new("http://a.test/").build().unwrap();
        assert_eq!(request.method, Method::GET);
        assert!(request.body.is_none());
        assert!(request.timeout.is_none());
        assert_eq!(request.cache_policy, CachePolicy::UseProtocolPolicy);
        assert!(request.handle_cookies);
    }

    #[test]
    fn test_cookie_opt_out() {
        let request = RequestBuilder::new("http://a.test/")
            .with_cookies(false)
            .build()
            .unwrap();
        assert!(!request.handle_cookies);
    }

    #[test]
    fn test_query_appended() {
        let request = RequestBuilder::new("http://a.test/search")
            .with_query(&json!({"q": "a b"}))
            .build()
            .unwrap();
        assert_eq!(request.url, "http://a.test/search?q=a%20b");

        let request = RequestBuilder::new("http://a.test/search?x=1")
            .with_query(&json!({"y": 2}))
            .build()
            .unwrap();
        assert_eq!(request.url, "http://a.test/search?x=1&y=2");
    }

    #[test]
    fn test_form_body() {
        let request = RequestBuilder::post("http://a.test/form")
            .with_form(&json!({"name": "ann", "age": 3}))
            .build()
            .unwrap();
        assert_eq!(request.method, Method::POST);
        assert_eq!(
            request.headers["Content-Type"],
            "application/x-www-form-urlencoded"
        );
        assert_eq!(request.body, Some(Bytes::from_static(b"age=3&name=ann")));
    }

    #[test]
    fn test_invalid_header_reported_on_build() {
        let result = RequestBuilder::new("http://a.test/")
            .with_header("bad header", "x")
            .build();
        assert!(matches!(result, Err(RequestError::InvalidHeader(name)) if name == "bad header"));
    }

    #[test]
    fn test_invalid_url_reported_on_build() {
        assert!(matches!(
            RequestBuilder::new("not a url").build(),
            Err(RequestError::InvalidUrl { .. })
        ));
    }
}
