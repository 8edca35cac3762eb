//! Chained request example
//!
//! Fetches a resource, chains a follow-up request built from its body, and
//! waits for a batch of requests to finish.
//!
//! Run with: cargo run --example chained_fetch

use chained_http::client::RetryBackoff;
use chained_http::{ManagerConfig, NetworkManager, RequestBuilder};
use serde_json::{json, Value};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    println!("Chained HTTP Example");
    println!("====================\n");

    let config = ManagerConfig {
        max_concurrent_tasks: 4,
        retry_backoff: RetryBackoff::Exponential { base_ms: 250 },
        ..Default::default()
    };
    let manager = NetworkManager::new(config)?;

    // 1. A single GET with JSON interpretation and retries
    let uuid = manager
        .get("https://httpbin.org/uuid", None)?
        .retry_count(3)?
        .on_json(|head, body: Result<Value, _>| match body {
            Ok(value) => println!("[uuid] {} -> {}", head.status, value["uuid"]),
            Err(e) => println!("[uuid] {} -> not JSON: {}", head.status, e),
        })?
        .on_failure(|error| println!("[uuid] failed: {}", error))?;
    uuid.start()?;
    uuid.wait().await;

    // 2. Chaining: the follow-up request is built from the first response
    let login = manager
        .post_json("https://httpbin.org/anything/login", &json!({"user": "demo"}))?
        .next(&manager, |next, head, body| {
            println!("[login] {} ({} bytes)", head.status, body.len());
            let request = RequestBuilder::new("https://httpbin.org/headers")
                .with_header("X-Session", "demo-session")
                .build()
                .ok()?;
            let task = next
                .request(request)
                .on_text(|head, text| println!("[profile] {}: {}", head.status, text.len()))
                .ok()?;
            Some(task)
        })?;
    login.start()?;
    login.wait().await;

    // 3. Redirect rewriting
    let redirected = manager
        .get("https://httpbin.org/redirect-to?url=%2Fget", None)?
        .redirect(|_original, redirect| {
            println!("[redirect] {} -> {}", redirect.status, redirect.location);
            redirect.proposed.clone()
        })?
        .on_data(|head, body| println!("[redirect] landed on {} ({} bytes)", head.url, body.len()))?;
    redirected.start()?;
    redirected.wait().await;

    // 4. A batch of tasks with one completion callback
    let tasks = vec![
        manager.get("https://httpbin.org/status/200", None)?,
        manager.get("https://httpbin.org/status/503", None)?.retry_count(2)?,
        manager
            .get("https://httpbin.org/delay/1", None)?
            .on_failure(|error| println!("[batch] delay failed: {}", error))?,
    ];
    let group = manager.group(tasks, || println!("[batch] all requests finished"))?;
    group.wait().await;

    println!("\nOutstanding tasks: {}", manager.all_tasks().len());
    Ok(())
}
