/// Integration tests for tail subscriptions
mod common;

use common::{fast_tail, memory_sink, FlakyStore};
use sql_log_sink::{
    config::SinkConfig,
    error::SinkError,
    sink::{LogRecord, Sink, TailEvent, TailHandle, TailStart},
};
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::time::timeout;

async fn next_record(tail: &mut TailHandle) -> LogRecord {
    loop {
        match timeout(Duration::from_secs(2), tail.next()).await {
            Ok(Some(TailEvent::Record(record))) => return record,
            Ok(Some(TailEvent::Error(_))) => continue,
            Ok(None) => panic!("Tail stopped unexpectedly"),
            Err(_) => panic!("Timed out waiting for a record"),
        }
    }
}

async fn write(sink: &Sink, message: &str) -> i64 {
    match sink.write("error", message, Default::default()).await.unwrap() {
        sql_log_sink::sink::WriteOutcome::Persisted { id: Some(id) } => id,
        other => panic!("Unexpected outcome {:?}", other),
    }
}

#[tokio::test]
async fn test_tail_from_beginning_then_cancel() {
    let sink = memory_sink(SinkConfig::default()).await;
    let mut tail = sink.tail(fast_tail().start(TailStart::Beginning));

    for message in ["first", "second", "third"] {
        write(&sink, message).await;
    }

    let mut ids = Vec::new();
    for expected in ["first", "second", "third"] {
        let record = next_record(&mut tail).await;
        assert_eq!(record.message, expected);
        ids.push(record.id);
    }
    assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));

    tail.cancel();
    write(&sink, "fourth").await;
    tokio::time::sleep(Duration::from_millis(60)).await;

    assert!(tail.next().await.is_none());
    assert!(!tail.is_active());
}

#[tokio::test]
async fn test_tail_from_now_before_any_writes() {
    let sink = memory_sink(SinkConfig::default()).await;
    let mut tail = sink.tail(fast_tail());

    let mut written = Vec::new();
    for i in 0..5 {
        written.push(write(&sink, &format!("n{}", i)).await);
    }

    let mut seen = Vec::new();
    for _ in 0..5 {
        seen.push(next_record(&mut tail).await.id);
    }
    assert_eq!(seen, written);

    // Nothing further is pending
    assert!(timeout(Duration::from_millis(100), tail.next()).await.is_err());
}

#[tokio::test]
async fn test_tail_from_now_skips_older_history() {
    let sink = memory_sink(SinkConfig::default()).await;
    write(&sink, "old 1").await;
    write(&sink, "old 2").await;
    let newest_before = write(&sink, "old 3").await;

    let mut tail = sink.tail(fast_tail().start(TailStart::Now));
    write(&sink, "new").await;

    // The start cursor sits one below the advisory last-id, so the newest
    // pre-existing row may be replayed once
    let mut record = next_record(&mut tail).await;
    if record.id == newest_before {
        record = next_record(&mut tail).await;
    }
    assert_eq!(record.message, "new");
}

#[tokio::test]
async fn test_tail_from_explicit_id() {
    let sink = memory_sink(SinkConfig::default()).await;
    let first = write(&sink, "a").await;
    write(&sink, "b").await;
    write(&sink, "c").await;

    let mut tail = sink.tail(fast_tail().start(TailStart::Id(first)));
    assert_eq!(next_record(&mut tail).await.message, "b");
    assert_eq!(next_record(&mut tail).await.message, "c");
}

#[tokio::test]
async fn test_poll_error_is_reported_and_tail_recovers() {
    let store = FlakyStore::new().await;
    let sink = Sink::new(store.clone(), &SinkConfig::default()).await.unwrap();
    write(&sink, "before outage").await;

    FlakyStore::set(&store.fail_reads, true);
    let mut tail = sink.tail(fast_tail().start(TailStart::Beginning));

    match timeout(Duration::from_secs(2), tail.next()).await {
        Ok(Some(TailEvent::Error(SinkError::Poll(_)))) => {}
        other => panic!("Expected a poll error event, got {:?}", other),
    }

    FlakyStore::set(&store.fail_reads, false);
    assert_eq!(next_record(&mut tail).await.message, "before outage");

    write(&sink, "after outage").await;
    assert_eq!(next_record(&mut tail).await.message, "after outage");
}

#[tokio::test]
async fn test_cancel_discards_in_flight_read() {
    let store = FlakyStore::new().await;
    let sink = Sink::new(store.clone(), &SinkConfig::default()).await.unwrap();
    write(&sink, "never delivered").await;

    store.read_delay_ms.store(500, Ordering::SeqCst);
    let mut tail = sink.tail(fast_tail().start(TailStart::Beginning));

    // Let the poller start its slow read
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(store.reads.load(Ordering::SeqCst), 1);

    tail.cancel();
    timeout(Duration::from_millis(200), tail.stopped())
        .await
        .expect("poller should stop without waiting for the read");

    assert!(tail.next().await.is_none());
}

#[tokio::test]
async fn test_dropping_handle_ends_subscription() {
    let sink = memory_sink(SinkConfig::default()).await;

    let tail = sink.tail(fast_tail());
    assert_eq!(sink.active_tails(), 1);
    drop(tail);

    for _ in 0..50 {
        if sink.active_tails() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(sink.active_tails(), 0);
}

#[tokio::test]
async fn test_shutdown_cancels_every_subscription() {
    let sink = memory_sink(SinkConfig::default()).await;
    let mut first = sink.tail(fast_tail());
    let mut second = sink.tail(fast_tail().start(TailStart::Beginning));

    sink.shutdown();

    assert!(first.next().await.is_none());
    assert!(second.next().await.is_none());
    first.stopped().await;
    second.stopped().await;
    assert_eq!(sink.active_tails(), 0);
}
