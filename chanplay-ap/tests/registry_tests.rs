//! Channel registry: lazy creation, routing of control operations, teardown

mod helpers;

use chanplay_ap::error::Error;
use chanplay_ap::playback::Transcoder;
use chanplay_ap::request::{ParserChain, RequestContext};
use chanplay_ap::sink::SinkFactory;
use chanplay_ap::ChannelRegistry;
use chanplay_common::events::SourceKind;
use helpers::*;
use std::sync::Arc;
use std::time::Duration;

fn registry_with(sinks: Arc<RecordingSinkFactory>) -> ChannelRegistry {
    let transcoder: Arc<dyn Transcoder> = Arc::new(FakeTranscoder::default());
    let ctx = RequestContext::new(transcoder).with_debug_sources(true);
    let factory: Arc<dyn SinkFactory> = sinks;
    ChannelRegistry::new(factory, ParserChain::from_context(&ctx), test_config(2))
}

fn registry() -> (ChannelRegistry, Arc<RecordingSinkFactory>) {
    let sinks = Arc::new(RecordingSinkFactory::default());
    (registry_with(sinks.clone()), sinks)
}

#[tokio::test]
async fn test_enqueue_creates_channel_lazily() {
    let (registry, sinks) = registry();
    assert!(registry.channels().await.is_empty());

    let info = registry.enqueue("lobby", "tone:440:20", "alice").await.unwrap();
    assert_eq!(info.label, "tone 440 Hz (20 ms)");
    assert_eq!(info.requester, "alice");
    assert_eq!(info.source, SourceKind::Synthetic);

    assert_eq!(registry.channels().await, vec!["lobby".to_string()]);
    let log = sinks.log_for("lobby").unwrap();
    // 20 ms of s16le stereo at 48 kHz
    wait_until(|| log.data().len() == 3840).await;

    registry.shutdown().await;
}

#[tokio::test]
async fn test_start_reuses_running_worker() {
    let (registry, sinks) = registry();

    let first = registry.start("lobby").await.unwrap();
    let second = registry.start("lobby").await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(sinks.logs.lock().unwrap().len(), 1);

    registry.start("studio").await.unwrap();
    assert_eq!(registry.channels().await, vec!["lobby".to_string(), "studio".to_string()]);

    registry.shutdown().await;
}

#[tokio::test]
async fn test_terminated_worker_is_replaced() {
    let (registry, _sinks) = registry();

    let first = registry.start("lobby").await.unwrap();
    first.stop().await;

    let second = registry.start("lobby").await.unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
    assert!(!second.is_stopped());

    registry.shutdown().await;
}

#[tokio::test]
async fn test_sink_failure_registers_nothing() {
    let sinks = Arc::new(RecordingSinkFactory {
        fail_open: true,
        ..Default::default()
    });
    let registry = registry_with(sinks);

    assert!(matches!(registry.start("lobby").await, Err(Error::Sink(_))));
    assert!(registry.channels().await.is_empty());
}

#[tokio::test]
async fn test_unparseable_request_is_rejected() {
    let (registry, _sinks) = registry();

    let err = registry.enqueue("lobby", "gopher://nowhere", "alice").await.unwrap_err();
    match err {
        Error::Unparseable(msg) => {
            assert!(msg.contains("remote"));
            assert!(msg.contains("synthetic"));
        }
        other => panic!("expected Unparseable, got {:?}", other),
    }
    assert_eq!(registry.queue("lobby").await.items.len(), 0);

    registry.shutdown().await;
}

#[tokio::test]
async fn test_control_operations_on_unknown_channel() {
    let (registry, _sinks) = registry();

    registry.skip("ghost", 1).await.unwrap();
    registry.clear("ghost").await.unwrap();
    assert!(matches!(registry.skip("ghost", 0).await, Err(Error::InvalidArgument(_))));

    let snapshot = registry.queue("ghost").await;
    assert!(snapshot.current.is_none());
    assert!(snapshot.items.is_empty());
    assert!(registry.subscribe("ghost").await.is_none());
    assert!(!registry.stop("ghost").await);
    assert!(registry.channels().await.is_empty());
}

#[tokio::test]
async fn test_stop_removes_channel_and_closes_sink() {
    let (registry, sinks) = registry();

    registry.enqueue("lobby", "silence:500", "alice").await.unwrap();
    let log = sinks.log_for("lobby").unwrap();

    assert!(registry.stop("lobby").await);
    assert_eq!(log.closes(), 1);
    assert!(registry.get("lobby").await.is_none());
    assert!(!registry.stop("lobby").await);
}

#[tokio::test]
async fn test_skip_routes_to_worker() {
    let sinks = Arc::new(RecordingSinkFactory {
        delay: Duration::from_millis(2),
        ..Default::default()
    });
    let registry = registry_with(sinks);

    registry.start("lobby").await.unwrap();
    let mut events = registry.subscribe("lobby").await.unwrap();

    registry.enqueue("lobby", "silence:2000", "alice").await.unwrap();
    registry.enqueue("lobby", "tone:220:20", "bob").await.unwrap();

    collect_until(&mut events, |e| is_started(e, "silence (2000 ms)")).await;
    registry.skip("lobby", 1).await.unwrap();

    let seen = collect_until(&mut events, |e| is_stopped(e, "tone 220 Hz (20 ms)")).await;
    assert!(seen.iter().any(|e| is_stopped(e, "silence (2000 ms)")));
    assert_eq!(started_labels(&seen), vec!["tone 220 Hz (20 ms)"]);

    registry.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_refuses_new_channels() {
    let (registry, sinks) = registry();

    registry.start("lobby").await.unwrap();
    registry.shutdown().await;

    assert!(registry.channels().await.is_empty());
    assert_eq!(sinks.log_for("lobby").unwrap().closes(), 1);
    assert!(matches!(registry.start("lobby").await, Err(Error::QueueClosed)));
}

#[tokio::test]
async fn test_channel_ids_are_restricted() {
    let (registry, sinks) = registry();

    assert!(matches!(registry.start("lobby/1").await, Err(Error::InvalidArgument(_))));
    assert!(matches!(
        registry.enqueue("../lobby", "tone:440:20", "alice").await,
        Err(Error::InvalidArgument(_))
    ));
    assert!(registry.start("").await.is_err());

    // Ids that used to collapse onto one output name stay distinct
    registry.start("lobby_1").await.unwrap();
    registry.start("lobby-1").await.unwrap();
    assert_eq!(registry.channels().await, vec!["lobby-1".to_string(), "lobby_1".to_string()]);
    assert_eq!(sinks.logs.lock().unwrap().len(), 2);

    registry.shutdown().await;
}

#[tokio::test]
async fn test_slow_output_does_not_block_other_channels() {
    let sinks = Arc::new(RecordingSinkFactory {
        slow_open: Some(("studio".to_string(), Duration::from_secs(2))),
        ..Default::default()
    });
    let registry = Arc::new(registry_with(sinks));
    registry.start("lobby").await.unwrap();

    let opening = {
        let registry = registry.clone();
        tokio::spawn(async move { registry.start("studio").await.map(|_| ()) })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let other_channels = tokio::time::timeout(Duration::from_millis(500), async {
        registry.skip("lobby", 1).await.unwrap();
        registry.queue("lobby").await;
        registry.start("hall").await.unwrap();
        registry.channels().await
    })
    .await
    .expect("registry blocked by a slow output");
    assert_eq!(other_channels, vec!["hall".to_string(), "lobby".to_string()]);

    opening.await.unwrap().unwrap();
    assert_eq!(registry.channels().await.len(), 3);

    registry.shutdown().await;
}

#[tokio::test]
async fn test_concurrent_starts_share_one_worker() {
    let sinks = Arc::new(RecordingSinkFactory {
        slow_open: Some(("lobby".to_string(), Duration::from_millis(100))),
        ..Default::default()
    });
    let registry = registry_with(sinks.clone());

    let (first, second) = tokio::join!(registry.start("lobby"), registry.start("lobby"));
    let (first, second) = (first.unwrap(), second.unwrap());
    assert!(Arc::ptr_eq(&first, &second));

    // The losing output was closed without ever being used
    let logs: Vec<_> = sinks.logs.lock().unwrap().iter().map(|(_, log)| log.clone()).collect();
    assert_eq!(logs.len(), 2);
    assert_eq!(logs.iter().filter(|log| log.closes() == 1).count(), 1);

    registry.shutdown().await;
    assert!(logs.iter().all(|log| log.closes() == 1));
}
