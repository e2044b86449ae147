use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use tokio::runtime::Handle;

use devtools::transport::memory::{self, RemoteEnd};
use devtools::{ConnectionState, Correlator, CorrelatorConfig, Error, UsageError};

fn start(config: CorrelatorConfig) -> (Arc<Correlator>, RemoteEnd) {
    let (transport, remote) = memory::pair();
    (Correlator::start(&Handle::current(), transport, config), remote)
}

/// The reader runs on its own task; give it time to file pushed messages.
async fn wait_until_buffered(client: &Correlator, count: usize) {
    let deadline = Instant::now() + Duration::from_secs(1);
    while client.buffered() < count {
        assert!(Instant::now() < deadline, "messages never reached the buffer");
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}

#[tokio::test]
async fn echoed_response_is_returned_unmodified() {
    let (client, mut remote) = start(CorrelatorConfig::default());

    tokio::spawn(async move {
        while let Some(request) = remote.recv().await {
            remote.push(json!({
                "id": request["id"],
                "result": {"echo": request["params"], "nested": [1, 2, {"x": null}]},
            }));
        }
    });

    let response = client
        .call("Runtime.evaluate", Some(json!({"expression": "1 + 1"})))
        .await
        .unwrap();

    assert_eq!(
        response.into_value(),
        json!({
            "id": 1,
            "result": {"echo": {"expression": "1 + 1"}, "nested": [1, 2, {"x": null}]},
        })
    );
}

#[tokio::test]
async fn ids_count_up_and_wrap() {
    let (client, _remote) = start(CorrelatorConfig::default().with_id_ceiling(4));
    let ids: Vec<_> = (0..6).map(|_| client.next_id()).collect();
    assert_eq!(ids, vec![1, 2, 3, 4, 1, 2]);
}

#[tokio::test]
async fn buffered_responses_are_found_in_any_order() {
    let (client, remote) = start(CorrelatorConfig::default());

    for id in [5, 7, 9] {
        remote.push(json!({"id": id, "result": {"n": id}}));
    }
    wait_until_buffered(&client, 3).await;

    let timeout = Duration::from_millis(100);
    for id in [7, 5, 9] {
        let response = client.await_response(id, timeout).await.unwrap();
        assert_eq!(response.result(), Some(&json!({"n": id})));
    }
    assert_eq!(client.buffered(), 0);
}

#[tokio::test]
async fn overflow_evicts_the_oldest() {
    let capacity = 3;
    let (client, remote) =
        start(CorrelatorConfig::default().with_skip_buffer_capacity(capacity));

    for id in 1..=(capacity as u64 + 1) {
        remote.push(json!({"id": id, "result": {}}));
    }
    // Single-threaded test runtime: the reader drains every queued frame
    // the first time it gets to run.
    wait_until_buffered(&client, capacity).await;

    let ids: Vec<_> = client.pop_messages().iter().filter_map(|m| m.id()).collect();
    assert_eq!(ids, vec![2, 3, 4]);
}

#[tokio::test]
async fn overflow_leaves_newer_entries_retrievable() {
    let (client, remote) = start(CorrelatorConfig::default().with_skip_buffer_capacity(2));

    remote.push(json!({"id": 1, "result": {}}));
    remote.push(json!({"id": 2, "result": {}}));
    remote.push(json!({"method": "Page.loadEventFired"}));
    // The event is filed last, so once it is seen the eviction has happened
    client
        .wait_event("Page.loadEventFired", Duration::from_secs(1))
        .await
        .unwrap();

    let short = Duration::from_millis(30);
    assert!(client.await_response(1, short).await.unwrap_err().is_timeout());
    assert_eq!(client.await_response(2, short).await.unwrap().id(), Some(2));
}

#[tokio::test]
async fn missing_response_times_out() {
    let (client, _remote) = start(CorrelatorConfig::default());

    let started = Instant::now();
    let result = client.await_response(42, Duration::from_millis(50)).await;
    let elapsed = started.elapsed();

    assert!(matches!(result, Err(Error::Timeout(_))));
    assert!(elapsed >= Duration::from_millis(50));
    assert!(elapsed < Duration::from_secs(2));
    assert_eq!(client.state(), ConnectionState::Open);
}

#[tokio::test]
async fn concurrent_calls_get_their_own_responses() {
    let (client, mut remote) = start(CorrelatorConfig::default());

    let first = {
        let client = client.clone();
        tokio::spawn(async move { client.call("Target.getTargets", None).await })
    };
    let second = {
        let client = client.clone();
        tokio::spawn(async move { client.call("Browser.getVersion", None).await })
    };

    let a = remote.recv().await.unwrap();
    let b = remote.recv().await.unwrap();

    // Answer in reverse order with an unsolicited event in between
    remote.respond(&b, json!({"for": b["method"]}));
    remote.push(json!({"method": "Target.targetCreated", "params": {}}));
    remote.respond(&a, json!({"for": a["method"]}));

    let first = first.await.unwrap().unwrap();
    let second = second.await.unwrap().unwrap();
    assert_eq!(first.result(), Some(&json!({"for": "Target.getTargets"})));
    assert_eq!(second.result(), Some(&json!({"for": "Browser.getVersion"})));

    let event = client.wait_message(Duration::from_secs(1)).await.unwrap();
    assert_eq!(event.method(), Some("Target.targetCreated"));
}

#[tokio::test]
async fn stream_end_fails_waits_with_connection_closed() {
    let (client, mut remote) = start(CorrelatorConfig::default());

    let pending = {
        let client = client.clone();
        tokio::spawn(async move { client.call("Page.navigate", None).await })
    };
    remote.recv().await.unwrap();
    remote.hang_up();

    let result = pending.await.unwrap();
    assert!(result.unwrap_err().is_connection_closed());

    let deadline = Instant::now() + Duration::from_secs(1);
    while client.state() != ConnectionState::Closed {
        assert!(Instant::now() < deadline, "correlator never closed");
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    let again = client.notify("Page.enable", None).await;
    assert!(matches!(again, Err(Error::ConnectionClosed)));
    let again = client.call("Page.enable", None).await;
    assert!(matches!(again, Err(Error::ConnectionClosed)));
    assert!(remote.try_recv().is_none(), "nothing may be written after close");
}

#[tokio::test]
async fn transport_error_fails_waits_with_connection_closed() {
    let (client, mut remote) = start(CorrelatorConfig::default());

    let pending = {
        let client = client.clone();
        tokio::spawn(async move { client.await_response(1, Duration::from_secs(10)).await })
    };
    tokio::task::yield_now().await;
    remote.fail("connection reset by peer");

    let result = pending.await.unwrap();
    assert!(result.unwrap_err().is_connection_closed());
}

#[tokio::test]
async fn error_field_is_returned_not_raised() {
    let (client, mut remote) = start(CorrelatorConfig::default());

    let pending = {
        let client = client.clone();
        tokio::spawn(async move { client.call("Page.bogus", None).await })
    };
    let request = remote.recv().await.unwrap();
    remote.push(json!({
        "id": request["id"],
        "error": {"code": -32601, "message": "'Page.bogus' wasn't found"},
    }));

    let response = pending.await.unwrap().unwrap();
    let error = response.error().unwrap();
    assert_eq!(error.code, -32601);
    assert_eq!(client.state(), ConnectionState::Open);
}

#[tokio::test]
async fn late_response_after_timeout_becomes_unmatched() {
    let (client, mut remote) = start(CorrelatorConfig::default());

    let result = client
        .call_with_timeout("Page.captureScreenshot", None, Duration::from_millis(20))
        .await;
    assert!(result.unwrap_err().is_timeout());

    let request = remote.recv().await.unwrap();
    remote.respond(&request, json!({"data": "..."}));

    let late = client.wait_message(Duration::from_secs(1)).await.unwrap();
    assert_eq!(late.id(), request["id"].as_u64());
}

#[tokio::test]
async fn second_await_on_same_id_is_rejected() {
    let (client, remote) = start(CorrelatorConfig::default());

    let first = {
        let client = client.clone();
        tokio::spawn(async move { client.await_response(7, Duration::from_secs(10)).await })
    };
    tokio::task::yield_now().await;

    let second = client.await_response(7, Duration::from_millis(20)).await;
    assert!(matches!(
        second,
        Err(Error::Usage(UsageError::AlreadyAwaiting(7)))
    ));

    // The rejected wait must not disturb the first one
    remote.push(json!({"id": 7, "result": {"ok": true}}));
    let response = first.await.unwrap().unwrap();
    assert_eq!(response.result(), Some(&json!({"ok": true})));
}

#[tokio::test]
async fn wait_message_accepts_unbounded_timeout() {
    let (client, remote) = start(CorrelatorConfig::default());

    remote.push(json!({"method": "Page.loadEventFired"}));
    wait_until_buffered(&client, 1).await;

    let event = client.wait_message(Duration::MAX).await.unwrap();
    assert_eq!(event.method(), Some("Page.loadEventFired"));
}
