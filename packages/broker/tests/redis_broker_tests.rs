//! Runs against a live server when `REDIS_URL` is set, e.g.
//! `REDIS_URL=redis://127.0.0.1:6379 cargo test -p jobbox-broker --features redis`.
#![cfg(feature = "redis")]

use std::collections::HashSet;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use jobbox_broker::{Broker, RedisBroker, Subscription};

async fn connect() -> Option<RedisBroker> {
    let url = std::env::var("REDIS_URL").ok()?;
    Some(RedisBroker::connect(&url).await.expect("redis should be reachable"))
}

fn unique(name: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("jobbox-test:{}:{nanos}:{name}", std::process::id())
}

#[tokio::test]
async fn concurrent_blpop_hands_out_each_element_once() {
    let Some(broker) = connect().await else {
        return;
    };
    let queue = unique("queue");

    for i in 0..40 {
        broker.push_tail(&queue, &i.to_string()).await.unwrap();
    }

    let mut consumers = Vec::new();
    for _ in 0..4 {
        let broker = broker.clone();
        let queue = queue.clone();
        consumers.push(tokio::spawn(async move {
            let mut got = Vec::new();
            while let Some(v) = broker
                .pop_blocking(&queue, Duration::from_millis(200))
                .await
                .unwrap()
            {
                got.push(v);
            }
            got
        }));
    }

    let mut all = Vec::new();
    for consumer in consumers {
        all.extend(consumer.await.unwrap());
    }
    assert_eq!(all.len(), 40);
    let unique_values: HashSet<_> = all.into_iter().collect();
    assert_eq!(unique_values.len(), 40);
}

#[tokio::test]
async fn zero_timeout_pop_still_returns() {
    let Some(broker) = connect().await else {
        return;
    };
    let popped = tokio::time::timeout(
        Duration::from_secs(2),
        broker.pop_blocking(&unique("empty"), Duration::ZERO),
    )
    .await
    .expect("pop should not block forever")
    .unwrap();
    assert!(popped.is_none());
}

#[tokio::test]
async fn missing_hash_reads_as_none() {
    let Some(broker) = connect().await else {
        return;
    };
    let key = unique("job");

    assert!(broker.hash_get(&key).await.unwrap().is_none());

    broker
        .hash_set(&key, &[("status".to_string(), "queued".to_string())])
        .await
        .unwrap();
    let fields = broker.hash_get(&key).await.unwrap().unwrap();
    assert_eq!(fields["status"], "queued");
}

#[tokio::test]
async fn subscribers_receive_until_unsubscribed() {
    let Some(broker) = connect().await else {
        return;
    };
    let channel = unique("events");

    let mut sub = broker.subscribe(&channel).await.unwrap();
    assert_eq!(broker.publish(&channel, "hello").await.unwrap(), 1);

    let got = tokio::time::timeout(Duration::from_secs(2), sub.next_message())
        .await
        .unwrap();
    assert_eq!(got.as_deref(), Some("hello"));

    sub.unsubscribe().await.unwrap();
    assert_eq!(broker.publish(&channel, "gone").await.unwrap(), 0);
    assert_eq!(sub.next_message().await, None);
}
