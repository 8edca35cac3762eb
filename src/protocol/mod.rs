//! Encoding helpers used while building request descriptors.
//!
//! Request tasks never call into this module; it serves the
//! [`RequestBuilder`](crate::client::RequestBuilder) and the manager's
//! convenience constructors.
//!
//! # Parameter Flattening
//!
//! | Parameter | Encoded |
//! |-----------|---------|
//! | `{"a": 1}` | `a=1` |
//! | `{"a": {"b": "c"}}` | `a%5Bb%5D=c` |
//! | `{"a": [1, 2]}` | `a%5B%5D=1&a%5B%5D=2` |
//! | `{"a": null}` | `a` |
//!
//! # Examples
//!
//! ```
//! use chained_http::protocol::encode_query_string;
//! use serde_json::json;
//!
//! let query = encode_query_string(&json!({"q": "rust lang", "page": 2}));
//! assert_eq!(query, "page=2&q=rust%20lang");
//! ```

mod encoding;

pub use encoding::{encode_json_body, encode_query_string, percent_escape, query_pairs, QueryPair};
