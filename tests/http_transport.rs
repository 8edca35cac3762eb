//! End-to-end tests of the `reqwest` transport against a mock HTTP server.

use bytes::Bytes;
use chained_http::transport::{ReqwestTransport, Transport, TransportEvent};
use chained_http::{
    ManagerConfig, NetworkManager, RequestBuilder, RequestDescriptor, ResponseHead, TaskError,
    TaskState,
};
use futures::StreamExt;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

fn manager() -> NetworkManager {
    NetworkManager::new(ManagerConfig::default()).expect("manager")
}

async fn within<F: std::future::Future>(future: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(10), future)
        .await
        .expect("timed out")
}

#[tokio::test]
async fn test_body_is_delivered_to_interpreters() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/items")
        .match_query(mockito::Matcher::UrlEncoded("page".into(), "2".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"items":["a","b"]}"#)
        .create_async()
        .await;

    let manager = manager();
    let seen: Arc<Mutex<Option<(ResponseHead, Value)>>> = Arc::new(Mutex::new(None));
    let sink = seen.clone();

    let task = manager
        .get(&format!("{}/items", server.url()), Some(&json!({"page": 2})))
        .unwrap()
        .on_json(move |head, value: Result<Value, _>| {
            *sink.lock() = Some((head.clone(), value.unwrap()));
        })
        .unwrap();
    task.start().unwrap();

    assert_eq!(within(task.wait()).await, TaskState::Succeeded);
    mock.assert_async().await;

    let (head, value) = seen.lock().take().expect("json interpreter ran");
    assert_eq!(head.status, 200);
    assert_eq!(head.headers["content-type"], "application/json");
    assert_eq!(value, json!({"items": ["a", "b"]}));
}

#[tokio::test]
async fn test_transport_surfaces_redirects() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/old")
        .with_status(302)
        .with_header("location", "/new")
        .create_async()
        .await;

    let transport = ReqwestTransport::new(&ManagerConfig::default()).unwrap();
    let request = RequestDescriptor::get(format!("{}/old", server.url()));
    let events: Vec<_> = transport.send(&request).collect().await;

    assert_eq!(events.len(), 1);
    match &events[0] {
        TransportEvent::Redirect(redirect) => {
            assert_eq!(redirect.status, 302);
            assert_eq!(redirect.location, "/new");
            assert_eq!(redirect.proposed.url, format!("{}/new", server.url()));
        }
        other => panic!("expected redirect, got {:?}", other),
    }
}

#[tokio::test]
async fn test_task_follows_see_other_as_get() {
    let mut server = mockito::Server::new_async().await;
    let submit = server
        .mock("POST", "/submit")
        .match_header("content-type", "application/x-www-form-urlencoded")
        .match_body("name=ann")
        .with_status(303)
        .with_header("location", "/result")
        .create_async()
        .await;
    let result = server
        .mock("GET", "/result")
        .with_status(200)
        .with_body("stored")
        .create_async()
        .await;

    let manager = manager();
    let body: Arc<Mutex<Option<Bytes>>> = Arc::new(Mutex::new(None));
    let sink = body.clone();

    let task = manager
        .post(&format!("{}/submit", server.url()), Some(&json!({"name": "ann"})))
        .unwrap()
        .on_data(move |_, data| *sink.lock() = Some(data))
        .unwrap();
    task.start().unwrap();

    assert_eq!(within(task.wait()).await, TaskState::Succeeded);
    submit.assert_async().await;
    result.assert_async().await;
    assert_eq!(body.lock().take(), Some(Bytes::from_static(b"stored")));
    assert_eq!(task.attempts(), 1);
}

#[tokio::test]
async fn test_server_error_status_still_succeeds() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/broken")
        .with_status(500)
        .with_body("oops")
        .expect(1)
        .create_async()
        .await;

    let manager = manager();
    let status = Arc::new(Mutex::new(None));
    let sink = status.clone();

    let task = manager
        .get(&format!("{}/broken", server.url()), None)
        .unwrap()
        .retry_count(3)
        .unwrap()
        .on_text(move |head, text| *sink.lock() = Some((head.status, text)))
        .unwrap();
    task.start().unwrap();

    assert_eq!(within(task.wait()).await, TaskState::Succeeded);
    mock.assert_async().await;
    assert_eq!(*status.lock(), Some((500, "oops".to_string())));
}

#[tokio::test]
async fn test_connection_refused_exhausts_budget() {
    let manager = manager();
    let failures = Arc::new(Mutex::new(Vec::new()));
    let sink = failures.clone();

    let task = manager
        .get("http://127.0.0.1:1/unreachable", None)
        .unwrap()
        .retry_count(2)
        .unwrap()
        .on_failure(move |error| sink.lock().push(error))
        .unwrap();
    task.start().unwrap();

    assert_eq!(within(task.wait()).await, TaskState::Exhausted);
    assert_eq!(task.attempts(), 2);
    let failures = failures.lock();
    assert_eq!(failures.len(), 1);
    assert!(matches!(failures[0], TaskError::Connect(_) | TaskError::Transport(_)));
}

#[tokio::test]
async fn test_cancel_closes_pending_connection() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (request_seen, request_rx) = oneshot::channel();
    let (closed, closed_rx) = oneshot::channel();

    // Reads the request and never answers.
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = vec![0u8; 4096];
        let _ = socket.read(&mut buf).await;
        let _ = request_seen.send(());
        loop {
            match socket.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(_) => continue,
            }
        }
        let _ = closed.send(());
    });

    let manager = manager();
    let failures = Arc::new(Mutex::new(Vec::new()));
    let sink = failures.clone();
    let task = manager
        .get(&format!("http://{}/never", addr), None)
        .unwrap()
        .on_failure(move |error| sink.lock().push(error))
        .unwrap();
    task.start().unwrap();

    within(request_rx).await.unwrap();
    task.cancel();
    assert_eq!(within(task.wait()).await, TaskState::Exhausted);
    assert_eq!(*failures.lock(), vec![TaskError::Cancelled]);

    tokio::time::timeout(Duration::from_secs(5), closed_rx)
        .await
        .expect("connection still open after cancel")
        .unwrap();
}

#[tokio::test]
async fn test_request_can_opt_out_of_cookie_store() {
    let mut server = mockito::Server::new_async().await;
    let login = server
        .mock("GET", "/login")
        .with_status(200)
        .with_header("set-cookie", "session=abc; Path=/")
        .create_async()
        .await;
    let private = server
        .mock("GET", "/private")
        .match_header("cookie", "session=abc")
        .with_status(200)
        .create_async()
        .await;
    let anonymous = server
        .mock("GET", "/anonymous")
        .match_header("cookie", mockito::Matcher::Missing)
        .with_status(200)
        .create_async()
        .await;

    let manager = NetworkManager::new(ManagerConfig {
        cookie_store: true,
        ..Default::default()
    })
    .unwrap();

    let requests = [
        RequestDescriptor::get(format!("{}/login", server.url())),
        RequestDescriptor::get(format!("{}/private", server.url())),
        RequestBuilder::new(format!("{}/anonymous", server.url()))
            .with_cookies(false)
            .build()
            .unwrap(),
    ];
    for request in requests {
        let task = manager.request(request);
        task.start().unwrap();
        assert_eq!(within(task.wait()).await, TaskState::Succeeded);
    }

    login.assert_async().await;
    private.assert_async().await;
    anonymous.assert_async().await;
}
