//! Response interpreters.
//!
//! A task carries at most one interpreter of each kind. On success they run
//! in a fixed order: raw bytes, then text, then structured data. On terminal
//! failure only the failure interpreter runs. A task without a failure
//! interpreter drops its terminal error; error visibility is opt-in.

use crate::client::utils::decode_text;
use crate::error::TaskError;
use crate::types::{RedirectResponse, RequestDescriptor, ResponseHead, TaskId};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// Consumer of a successful response body, already adapted to its kind.
pub(crate) type BodyInterpreter = Box<dyn FnOnce(&ResponseHead, &Bytes) + Send>;

/// Consumer of the terminal error.
pub(crate) type FailureInterpreter = Box<dyn FnOnce(TaskError) + Send>;

/// Maps `(original request, redirect)` to the request to issue instead.
pub(crate) type RedirectPolicy =
    Arc<dyn Fn(&RequestDescriptor, &RedirectResponse) -> RequestDescriptor + Send + Sync>;

pub(crate) fn data_interpreter<F>(f: F) -> BodyInterpreter
where
    F: FnOnce(&ResponseHead, Bytes) + Send + 'static,
{
    Box::new(move |head: &ResponseHead, body: &Bytes| f(head, body.clone()))
}

pub(crate) fn text_interpreter<F>(f: F) -> BodyInterpreter
where
    F: FnOnce(&ResponseHead, String) + Send + 'static,
{
    Box::new(move |head: &ResponseHead, body: &Bytes| f(head, decode_text(body)))
}

pub(crate) fn json_interpreter<T, F>(f: F) -> BodyInterpreter
where
    T: DeserializeOwned + 'static,
    F: FnOnce(&ResponseHead, Result<T, serde_json::Error>) + Send + 'static,
{
    Box::new(move |head: &ResponseHead, body: &Bytes| f(head, serde_json::from_slice(body)))
}

/// Interpreters registered on one task.
#[derive(Default)]
pub(crate) struct Interpreters {
    pub(crate) data: Option<BodyInterpreter>,
    pub(crate) text: Option<BodyInterpreter>,
    pub(crate) json: Option<BodyInterpreter>,
    pub(crate) failure: Option<FailureInterpreter>,
}

impl Interpreters {
    /// Run the success interpreters in order: data, text, json.
    pub(crate) fn deliver_success(self, head: &ResponseHead, body: &Bytes) {
        if let Some(data) = self.data {
            data(head, body);
        }
        if let Some(text) = self.text {
            text(head, body);
        }
        if let Some(json) = self.json {
            json(head, body);
        }
    }

    pub(crate) fn deliver_failure(self, task_id: TaskId, error: TaskError) {
        match self.failure {
            Some(failure) => failure(error),
            None => tracing::trace!(
                task_id = %task_id,
                error = %error,
                "No failure interpreter registered, dropping terminal error"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::Value;

    fn head() -> ResponseHead {
        ResponseHead {
            url: "http://a.test/".to_string(),
            status: 200,
            headers: Default::default(),
        }
    }

    #[test]
    fn test_success_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (l1, l2, l3) = (log.clone(), log.clone(), log.clone());

        let interpreters = Interpreters {
            json: Some(json_interpreter(move |_, parsed: Result<Value, _>| {
                assert!(parsed.is_ok());
                l3.lock().push("json");
            })),
            text: Some(text_interpreter(move |_, text| {
                assert_eq!(text, "[1]");
                l2.lock().push("text");
            })),
            data: Some(data_interpreter(move |_, bytes| {
                assert_eq!(bytes, Bytes::from_static(b"[1]"));
                l1.lock().push("data");
            })),
            failure: None,
        };

        interpreters.deliver_success(&head(), &Bytes::from_static(b"[1]"));
        assert_eq!(*log.lock(), vec!["data", "text", "json"]);
    }

    #[test]
    fn test_json_parse_error_goes_to_json_interpreter() {
        let seen = Arc::new(Mutex::new(None));
        let slot = seen.clone();
        let interpreters = Interpreters {
            json: Some(json_interpreter(move |_, parsed: Result<Value, _>| {
                *slot.lock() = Some(parsed.is_err());
            })),
            ..Default::default()
        };

        interpreters.deliver_success(&head(), &Bytes::from_static(b"<html>"));
        assert_eq!(*seen.lock(), Some(true));
    }

    #[test]
    fn test_failure_without_interpreter_is_dropped() {
        Interpreters::default().deliver_failure(TaskId::new(), TaskError::Timeout);
    }
}
