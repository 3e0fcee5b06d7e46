//! Integration Tests for the Engine
//!
//! Runs real multi-core engines and drives them the way a listener would:
//! submissions on arbitrary cores, frames on the wire, shutdown at the end.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::Poll;
use std::time::{Duration, Instant};

use kvcache::models::{decode_request, decode_response, encode_request, encode_response};
use kvcache::{merge_reports, shard_for, Config, Engine, Request, Response, Status};

// == Helper Functions ==

fn config(cores: usize, shard_budget_bytes: usize) -> Config {
    Config {
        cores,
        shard_budget_bytes,
        default_deadline_ms: 2000,
        sweep_interval_ms: 50,
        sweep_batch: 32,
        channel_capacity: 256,
        send_retries: 64,
    }
}

fn start(cores: usize) -> Engine {
    Engine::start(config(cores, 1 << 20)).unwrap()
}

/// The `n`th key owned by `shard` among `cores` shards.
fn key_on(shard: usize, cores: usize, n: usize) -> String {
    (0..)
        .map(|i| format!("key-{}", i))
        .filter(|k| shard_for(k.as_bytes(), cores) == shard)
        .nth(n)
        .unwrap()
}

/// Polls a future exactly once.
async fn poll_once<F: Future + Unpin>(mut fut: F) -> Option<F::Output> {
    std::future::poll_fn(|cx| {
        Poll::Ready(match Pin::new(&mut fut).poll(cx) {
            Poll::Ready(out) => Some(out),
            Poll::Pending => None,
        })
    })
    .await
}

// == Routing ==

#[tokio::test]
async fn test_put_then_get_from_every_core() {
    let engine = start(4);

    for i in 0..50 {
        let key = format!("user:{}", i);
        let resp = engine
            .submit_on(i % 4, Request::put(key.as_str(), format!("value-{}", i)))
            .await;
        assert!(resp.is_ok(), "put {} failed: {:?}", key, resp);
    }

    for core in 0..4 {
        for i in 0..50 {
            let key = format!("user:{}", i);
            let resp = engine.submit_on(core, Request::get(key.as_str())).await;
            assert_eq!(resp.status, Status::Ok);
            assert_eq!(resp.value, Some(format!("value-{}", i).into_bytes()));
        }
    }

    let reports = engine.shutdown();
    assert_eq!(reports.len(), 4);
    for report in &reports {
        let owned = (0..50)
            .filter(|i| shard_for(format!("user:{}", i).as_bytes(), 4) == report.core_id)
            .count();
        assert_eq!(report.cache.total_entries, owned);
    }
    assert_eq!(merge_reports(&reports).total_entries, 50);
}

#[tokio::test]
async fn test_correlation_id_survives_cross_core_trip() {
    let engine = start(3);

    for i in 0..30u64 {
        let key = format!("k{}", i);
        let resp = engine
            .submit(Request::put(key.as_str(), "v").with_correlation_id(1000 + i))
            .await;
        assert_eq!(resp, Response::ok(1000 + i));
    }
}

// == Cache Semantics ==

#[tokio::test]
async fn test_lru_eviction_under_budget() {
    let engine = Engine::start(config(1, 2)).unwrap();

    assert!(engine.submit(Request::put("a", "1")).await.is_ok());
    assert!(engine.submit(Request::put("b", "2")).await.is_ok());
    assert_eq!(engine.submit(Request::get("a")).await.value, Some(b"1".to_vec()));
    assert!(engine.submit(Request::put("c", "3")).await.is_ok());

    assert_eq!(engine.submit(Request::get("b")).await.status, Status::NotFound);
    assert_eq!(engine.submit(Request::get("a")).await.value, Some(b"1".to_vec()));
    assert_eq!(engine.submit(Request::get("c")).await.value, Some(b"3".to_vec()));

    let reports = engine.shutdown();
    assert_eq!(reports[0].cache.evictions, 1);
    assert_eq!(reports[0].cache.memory_used, 2);
}

#[tokio::test]
async fn test_value_larger_than_budget_rejected() {
    let engine = Engine::start(config(2, 8)).unwrap();

    let resp = engine.submit(Request::put("big", vec![0u8; 9])).await;
    assert_eq!(resp.status, Status::ValueTooLarge);
    assert_eq!(engine.submit(Request::get("big")).await.status, Status::NotFound);
}

#[tokio::test]
async fn test_delete_is_idempotent() {
    let engine = start(2);

    assert!(engine.submit(Request::put("gone", "soon")).await.is_ok());
    assert!(engine.submit(Request::delete("gone")).await.is_ok());
    assert_eq!(engine.submit(Request::delete("gone")).await.status, Status::NotFound);
    assert_eq!(engine.submit(Request::get("gone")).await.status, Status::NotFound);
}

#[tokio::test]
async fn test_ttl_expiry() {
    let engine = start(2);

    let resp = engine
        .submit(Request::put("short", "lived").with_ttl(Duration::from_millis(100)))
        .await;
    assert!(resp.is_ok());
    assert!(engine.submit(Request::put("long", "lived")).await.is_ok());

    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(engine.submit(Request::get("short")).await.status, Status::NotFound);
    assert!(engine.submit(Request::get("long")).await.is_ok());

    let totals = merge_reports(&engine.shutdown());
    assert_eq!(totals.expirations, 1);
    assert_eq!(totals.total_entries, 1);
}

#[tokio::test]
async fn test_unbounded_ttl_keeps_core_serving() {
    let engine = start(2);
    let first = key_on(1, 2, 0);
    let second = key_on(1, 2, 1);

    let resp = engine
        .submit_on(0, Request::put(first.as_str(), "v").with_ttl(Duration::MAX))
        .await;
    assert!(resp.is_ok());

    // core 1 still answers cross-core traffic afterwards
    assert!(engine.submit_on(0, Request::put(second.as_str(), "w")).await.is_ok());
    let resp = engine.submit_on(0, Request::get(first.as_str())).await;
    assert_eq!(resp.value, Some(b"v".to_vec()));

    // overwrite with an unbounded ttl keeps accounting exact
    let resp = engine
        .submit_on(0, Request::put(first.as_str(), vec![1u8; 50]).with_ttl(Duration::MAX))
        .await;
    assert!(resp.is_ok());

    let reports = engine.shutdown();
    assert_eq!(reports[1].cache.memory_used, 51);
}

#[tokio::test]
async fn test_zero_ttl_never_expires() {
    let engine = start(2);

    let resp = engine
        .submit(Request::put("forever", "v").with_ttl(Duration::ZERO))
        .await;
    assert!(resp.is_ok());
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(engine.submit(Request::get("forever")).await.is_ok());
}

#[tokio::test]
async fn test_malformed_request_rejected() {
    let engine = start(2);

    let resp = engine.submit(Request::get(Vec::new()).with_correlation_id(8)).await;
    assert_eq!(resp.status, Status::MalformedRequest);
    assert_eq!(resp.correlation_id, 8);
}

#[tokio::test]
async fn test_elapsed_deadline_times_out() {
    let engine = start(2);

    // find a key the submitting core does not own
    let key = (0..)
        .map(|i| format!("remote-{}", i))
        .find(|k| shard_for(k.as_bytes(), 2) == 1)
        .unwrap();
    let resp = engine
        .submit_on(0, Request::get(key.as_str()).with_deadline(Instant::now()))
        .await;
    assert_eq!(resp.status, Status::Timeout);
}

// == Shard Independence ==

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_busy_shard_does_not_delay_other_shard() {
    let engine = Arc::new(start(2));

    // keep core 1 busy with large writes that evict constantly
    let flood = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move {
            for i in 0..500 {
                let key = key_on(1, 2, i % 64);
                let resp = engine.submit_on(1, Request::put(key, vec![0u8; 64 * 1024])).await;
                assert!(resp.is_ok());
            }
        }
    });

    for i in 0..100 {
        let key = key_on(0, 2, i);
        let resp = engine
            .submit_on(0, Request::put(key.as_str(), "v").with_correlation_id(i as u64))
            .await;
        assert_eq!(resp, Response::ok(i as u64));
        assert!(engine.submit_on(0, Request::get(key.as_str())).await.is_ok());
    }

    flood.await.unwrap();
    let reports = engine.shutdown();
    assert_eq!(reports[0].router.remote, 0);
    assert_eq!(reports[0].cache.total_entries, 100);
}

// == Wire Frames ==

#[tokio::test]
async fn test_frames_through_engine() {
    let engine = start(2);

    let put = encode_request(&Request::put("framed", "payload")).unwrap();
    let resp = engine.submit(decode_request(&put).unwrap()).await;
    let wire = encode_response(&resp).unwrap();
    assert_eq!(decode_response(&wire).unwrap().status, Status::Ok);

    let get = encode_request(&Request::get("framed")).unwrap();
    let resp = engine.submit(decode_request(&get).unwrap()).await;
    let decoded = decode_response(&encode_response(&resp).unwrap()).unwrap();
    assert_eq!(decoded.status, Status::Ok);
    assert_eq!(decoded.value, Some(b"payload".to_vec()));

    let garbage = [9u8, 0, 1, b'x'];
    assert!(decode_request(&garbage).is_err());
}

// == Shutdown ==

#[tokio::test]
async fn test_submit_after_shutdown() {
    let engine = start(2);
    assert!(engine.submit(Request::put("k", "v")).await.is_ok());

    let reports = engine.shutdown();
    assert_eq!(reports.len(), 2);

    let resp = engine.submit(Request::get("k")).await;
    assert_eq!(resp.status, Status::RoutingUnavailable);
}

#[tokio::test]
async fn test_shutdown_waits_for_cross_core_call() {
    let engine = Arc::new(start(2));
    let key = key_on(1, 2, 0);

    // the first poll hands the submission to core 0
    let mut call = Box::pin(engine.submit_on(0, Request::put(key.as_str(), "v")));
    let early = poll_once(call.as_mut()).await;

    let stopper = tokio::task::spawn_blocking({
        let engine = Arc::clone(&engine);
        move || engine.shutdown()
    });

    let resp = match early {
        Some(resp) => resp,
        None => call.await,
    };
    let reports = stopper.await.unwrap();

    assert!(
        matches!(resp.status, Status::Ok | Status::Timeout),
        "in-flight call ended with {:?}",
        resp.status
    );
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].router.remote, 1);
    if resp.is_ok() {
        assert_eq!(reports[1].router.served, 1);
        assert_eq!(reports[1].cache.total_entries, 1);
    }
}

#[test]
fn test_invalid_config_refuses_to_start() {
    let mut bad = config(2, 1024);
    bad.channel_capacity = 0;
    assert!(Engine::start(bad).is_err());
}
