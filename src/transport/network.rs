//! `reqwest`-backed transport.
//!
//! Automatic redirects are disabled on the underlying client so every
//! redirect reaches the task's redirect policy. Each exchange runs on a
//! spawned pump task that forwards events through a bounded channel. The
//! pump races every await on the network against the channel closing, so
//! dropping the stream drops the in-flight `reqwest` future and with it the
//! connection.
//!
//! # Examples
//!
//! ```ignore
//! use chained_http::client::ManagerConfig;
//! use chained_http::transport::{ReqwestTransport, Transport};
//! use chained_http::RequestDescriptor;
//! use futures::StreamExt;
//!
//! let transport = ReqwestTransport::new(&ManagerConfig::default())?;
//! let mut events = transport.send(&RequestDescriptor::get("http://example.com/"));
//! while let Some(event) = events.next().await {
//!     println!("{:?}", event);
//! }
//! ```

use crate::client::utils::{
    is_redirect_status, redirect_keeps_body, redirect_method, resolve_location,
};
use crate::client::ManagerConfig;
use crate::error::{Error, Result, TaskError};
use crate::transport::{EventStream, Transport, TransportEvent};
use crate::types::{CachePolicy, RedirectResponse, RequestDescriptor, ResponseHead};
use futures::StreamExt;
use reqwest::header::{HeaderMap, CACHE_CONTROL};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Default [`Transport`] built on a shared `reqwest::Client`.
///
/// When the manager keeps a cookie store, a second client without a cookie
/// jar serves requests whose descriptor sets `handle_cookies` to `false`.
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    cookieless: Option<reqwest::Client>,
}

impl ReqwestTransport {
    /// Build a transport from manager settings.
    pub fn new(config: &ManagerConfig) -> Result<Self> {
        let client = build_client(config, config.cookie_store)?;
        let cookieless = if config.cookie_store {
            Some(build_client(config, false)?)
        } else {
            None
        };
        Ok(ReqwestTransport { client, cookieless })
    }

    /// Wrap an existing client.
    ///
    /// The client should have automatic redirects disabled, otherwise
    /// redirect policies never see a redirect. Every request goes through
    /// this client, whatever its `handle_cookies` setting.
    pub fn from_client(client: reqwest::Client) -> Self {
        ReqwestTransport {
            client,
            cookieless: None,
        }
    }

    fn client_for(&self, request: &RequestDescriptor) -> &reqwest::Client {
        match &self.cookieless {
            Some(cookieless) if !request.handle_cookies => cookieless,
            _ => &self.client,
        }
    }
}

fn build_client(config: &ManagerConfig, cookie_store: bool) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .timeout(config.request_timeout())
        .connect_timeout(config.connect_timeout())
        .pool_idle_timeout(Duration::from_secs(90))
        .pool_max_idle_per_host(config.max_idle_per_host)
        .redirect(reqwest::redirect::Policy::none())
        .cookie_store(cookie_store)
        .user_agent(config.user_agent.as_str());

    if !config.proxy_url.is_empty() {
        let proxy = reqwest::Proxy::all(&config.proxy_url)
            .map_err(|e| Error::Client(format!("invalid proxy: {}", e)))?;
        builder = builder.proxy(proxy);
    }

    builder.build().map_err(|e| Error::Client(e.to_string()))
}

impl Transport for ReqwestTransport {
    /// Spawns the exchange on the current tokio runtime.
    fn send(&self, request: &RequestDescriptor) -> EventStream {
        let (tx, rx) = mpsc::channel(32);
        let client = self.client_for(request).clone();
        let request = request.clone();

        tokio::spawn(async move {
            exchange(client, request, tx).await;
        });

        ReceiverStream::new(rx).boxed()
    }
}

async fn exchange(
    client: reqwest::Client,
    request: RequestDescriptor,
    tx: mpsc::Sender<TransportEvent>,
) {
    tracing::trace!(url = %request.url, method = %request.method, "Sending request");

    let sent = tokio::select! {
        _ = tx.closed() => None,
        result = build_request(&client, &request).send() => Some(result),
    };
    let Some(sent) = sent else {
        tracing::trace!(url = %request.url, "Exchange dropped before response");
        return;
    };

    let response = match sent {
        Ok(response) => response,
        Err(e) => {
            let _ = tx.send(TransportEvent::Complete(Err(map_error(&e)))).await;
            return;
        }
    };

    let status = response.status().as_u16();
    let headers = collect_headers(response.headers());
    let final_url = response.url().to_string();

    if is_redirect_status(status) {
        if let Some(redirect) = redirect_from(&request, &final_url, status, &headers) {
            let _ = tx.send(TransportEvent::Redirect(redirect)).await;
            return;
        }
    }

    let head = ResponseHead {
        url: final_url,
        status,
        headers,
    };

    let mut body = response.bytes_stream();
    loop {
        let next = tokio::select! {
            _ = tx.closed() => None,
            chunk = body.next() => Some(chunk),
        };
        let Some(chunk) = next else {
            tracing::trace!(url = %head.url, "Exchange dropped while reading body");
            return;
        };

        match chunk {
            Some(Ok(chunk)) => {
                if tx.send(TransportEvent::Data(chunk)).await.is_err() {
                    // Receiver dropped
                    return;
                }
            }
            Some(Err(e)) => {
                let _ = tx.send(TransportEvent::Complete(Err(map_error(&e)))).await;
                return;
            }
            None => break,
        }
    }

    let _ = tx.send(TransportEvent::Complete(Ok(head))).await;
}

fn build_request(client: &reqwest::Client, request: &RequestDescriptor) -> reqwest::RequestBuilder {
    let mut builder = client.request(request.method.clone(), request.url.as_str());

    for (name, value) in &request.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }

    match request.cache_policy {
        CachePolicy::UseProtocolPolicy => {}
        CachePolicy::ReloadIgnoringCache => builder = builder.header(CACHE_CONTROL, "no-cache"),
        CachePolicy::ReturnCacheElseLoad => builder = builder.header(CACHE_CONTROL, "max-stale"),
    }

    if let Some(timeout) = request.timeout {
        builder = builder.timeout(timeout);
    }

    if let Some(body) = &request.body {
        builder = builder.body(body.clone());
    }

    builder
}

/// The request a browser would issue for this redirect, or `None` when the
/// response carries no usable `Location`.
fn redirect_from(
    request: &RequestDescriptor,
    response_url: &str,
    status: u16,
    headers: &BTreeMap<String, String>,
) -> Option<RedirectResponse> {
    let location = headers.get("location")?;
    let target = resolve_location(response_url, location)?;

    let mut proposed = request.clone();
    proposed.url = target;
    proposed.method = redirect_method(status, &request.method);
    if !redirect_keeps_body(status) {
        proposed.body = None;
        proposed
            .headers
            .retain(|name, _| !name.eq_ignore_ascii_case("content-type"));
    }

    Some(RedirectResponse {
        status,
        location: location.clone(),
        headers: headers.clone(),
        proposed,
    })
}

fn collect_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut collected = BTreeMap::new();
    for (name, value) in headers {
        if let Ok(value) = value.to_str() {
            collected.insert(name.as_str().to_string(), value.to_string());
        }
    }
    collected
}

fn map_error(e: &reqwest::Error) -> TaskError {
    if e.is_timeout() {
        TaskError::Timeout
    } else if e.is_connect() {
        TaskError::Connect(e.to_string())
    } else {
        TaskError::Transport(e.to_string())
    }
}
