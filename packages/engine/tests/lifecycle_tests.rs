mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use jobbox_broker::{Broker, MemorySubscription, Subscription};
use jobbox_core::{Job, JobEvent, JobId, JobStatus, JobStore, QueueLayout};
use jobbox_engine::{EnqueueRequest, FnHandler, HandlerRegistry, Outcome};
use serde_json::{Value, json};

use common::{Harness, counting_handlers, drain};

async fn collect_events(sub: &mut MemorySubscription) -> Vec<JobEvent> {
    let mut events = Vec::new();
    while let Ok(Some(raw)) =
        tokio::time::timeout(std::time::Duration::from_millis(50), sub.next_message()).await
    {
        events.push(JobEvent::from_message(&raw).expect("event decodes"));
    }
    events
}

#[tokio::test]
async fn enqueued_job_reads_back_queued() {
    let h = Harness::new().await;
    let payload = json!({"to": "a@b.com", "attachments": [1, 2, {"x": null}], "n": -3.25});

    let job = h
        .producer()
        .enqueue(EnqueueRequest::new("send-email", payload.clone()))
        .await
        .unwrap();

    let stored = h.queries().get(&job.id.to_string()).await.unwrap();
    assert_eq!(stored.status, JobStatus::Queued);
    assert_eq!(stored.retry_count, 0);
    assert_eq!(stored.job_type, "send-email");
    assert_eq!(stored.payload, payload);

    let mirror = h
        .broker
        .hash_get(&h.layout.mirror_key(&job.id))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(Job::from_mirror(job.id, &mirror).unwrap(), stored);

    let queued = h.broker.list_range(&h.layout.work_queue, 0, 10).await.unwrap();
    assert_eq!(queued, vec![job.id.to_string()]);
}

#[tokio::test]
async fn every_enqueue_creates_a_new_job() {
    let h = Harness::new().await;
    let producer = h.producer();

    let a = producer.enqueue(EnqueueRequest::new("ok", json!({}))).await.unwrap();
    let b = producer.enqueue(EnqueueRequest::new("ok", json!({}))).await.unwrap();

    assert_ne!(a.id, b.id);
    assert_eq!(h.broker.list_len(&h.layout.work_queue).unwrap(), 2);
}

#[tokio::test]
async fn blank_type_is_rejected_without_side_effects() {
    let h = Harness::new().await;

    let err = h
        .producer()
        .enqueue(EnqueueRequest::new("  ", json!({})))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "type is required");
    assert_eq!(h.broker.list_len(&h.layout.work_queue).unwrap(), 0);
    assert!(h.store.list_recent(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn succeeding_handler_completes_without_retries() {
    let h = Harness::new().await;
    let calls = Arc::new(AtomicUsize::new(0));
    let mut worker = h.worker("w1", counting_handlers(calls.clone()));

    let job = h
        .producer()
        .enqueue(EnqueueRequest::new("ok", json!({"n": 1})))
        .await
        .unwrap();

    assert_eq!(worker.run_once().await.unwrap(), Some(Outcome::Completed));
    assert_eq!(worker.run_once().await.unwrap(), None);

    let stored = h.queries().get(&job.id.to_string()).await.unwrap();
    assert_eq!(stored.status, JobStatus::Completed);
    assert_eq!(stored.retry_count, 0);
    assert!(stored.last_error.is_none());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn always_failing_job_is_dead_lettered_after_budget() {
    let h = Harness::new().await;
    let calls = Arc::new(AtomicUsize::new(0));
    let mut worker = h.worker("w1", counting_handlers(calls.clone()));
    let mut sub = h.broker.subscribe(&h.layout.events_channel).await.unwrap();

    let job = h
        .producer()
        .enqueue(EnqueueRequest::new("fail", json!({})).with_max_retries(2))
        .await
        .unwrap();

    drain(&mut worker).await;

    assert_eq!(calls.load(Ordering::SeqCst), 3);

    let stored = h.queries().get(&job.id.to_string()).await.unwrap();
    assert_eq!(stored.status, JobStatus::Failed);
    assert_eq!(stored.retry_count, 3);
    assert_eq!(stored.last_error.as_deref(), Some("always fails"));

    let dead = h.broker.list_range(&h.layout.dead_letter, 0, 100).await.unwrap();
    assert_eq!(dead, vec![job.id.to_string()]);

    // queued -> running three times, failed once, retry count strictly rising
    let events = collect_events(&mut sub).await;
    let started: Vec<u32> = events
        .iter()
        .filter(|e| matches!(e, JobEvent::Started(_)))
        .map(|e| e.job().retry_count)
        .collect();
    assert_eq!(started, vec![0, 1, 2]);

    let after_failure: Vec<u32> = events
        .iter()
        .filter(|e| matches!(e, JobEvent::Retrying(_) | JobEvent::DeadLettered(_)))
        .map(|e| e.job().retry_count)
        .collect();
    assert_eq!(after_failure, vec![1, 2, 3]);
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, JobEvent::DeadLettered(_)))
            .count(),
        1
    );

    let stats = worker.stats();
    assert_eq!(stats.processed, 3);
    assert_eq!(stats.retried, 2);
    assert_eq!(stats.dead_lettered, 1);
}

#[tokio::test]
async fn zero_retries_dead_letters_on_first_failure() {
    let h = Harness::new().await;
    let calls = Arc::new(AtomicUsize::new(0));
    let mut worker = h.worker("w1", counting_handlers(calls.clone()));

    h.producer()
        .enqueue(EnqueueRequest::new("fail", json!({})).with_max_retries(0))
        .await
        .unwrap();

    assert_eq!(worker.run_once().await.unwrap(), Some(Outcome::DeadLettered));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn transitions_are_broadcast_in_order() {
    let h = Harness::new().await;
    let mut worker = h.worker("w1", counting_handlers(Arc::new(AtomicUsize::new(0))));
    let mut sub = h.broker.subscribe(&h.layout.events_channel).await.unwrap();

    let job = h
        .producer()
        .enqueue(EnqueueRequest::new("ok", json!({})))
        .await
        .unwrap();
    drain(&mut worker).await;

    let events = collect_events(&mut sub).await;
    let tags: Vec<&str> = events
        .iter()
        .map(|e| match e {
            JobEvent::Enqueued(_) => "enqueued",
            JobEvent::Started(_) => "started",
            JobEvent::Completed(_) => "completed",
            JobEvent::Retrying(_) => "retrying",
            JobEvent::DeadLettered(_) => "dead_lettered",
        })
        .collect();
    assert_eq!(tags, vec!["enqueued", "started", "completed"]);
    assert!(events.iter().all(|e| e.job_id() == job.id));
}

#[tokio::test]
async fn missing_handler_is_a_failure() {
    let h = Harness::new().await;
    let mut worker = h.worker("w1", HandlerRegistry::new());

    let job = h
        .producer()
        .enqueue(EnqueueRequest::new("resize-image", json!({})).with_max_retries(0))
        .await
        .unwrap();
    drain(&mut worker).await;

    let stored = h.queries().get(&job.id.to_string()).await.unwrap();
    assert_eq!(stored.status, JobStatus::Failed);
    assert_eq!(
        stored.last_error.as_deref(),
        Some("no handler registered for job type 'resize-image'")
    );
}

#[tokio::test]
async fn panicking_handler_is_a_failure() {
    let h = Harness::new().await;
    let handlers = HandlerRegistry::new().with(FnHandler::new("explode", |_| async {
        if true {
            panic!("boom");
        }
        Ok(())
    }));
    let mut worker = h.worker("w1", handlers);

    let job = h
        .producer()
        .enqueue(EnqueueRequest::new("explode", json!({})).with_max_retries(1))
        .await
        .unwrap();

    assert_eq!(worker.run_once().await.unwrap(), Some(Outcome::Retried));

    let stored = h.queries().get(&job.id.to_string()).await.unwrap();
    assert_eq!(stored.status, JobStatus::Queued);
    assert_eq!(stored.last_error.as_deref(), Some("handler panicked: boom"));
}

#[tokio::test]
async fn handler_receives_the_payload() {
    let h = Harness::new().await;
    let seen: Arc<std::sync::Mutex<Vec<Value>>> = Arc::default();
    let sink = seen.clone();
    let handlers = HandlerRegistry::new().with(FnHandler::new("record", move |payload| {
        let sink = sink.clone();
        async move {
            sink.lock().unwrap().push(payload);
            Ok(())
        }
    }));
    let mut worker = h.worker("w1", handlers);

    let payload = json!({"deep": {"list": [true, false, null], "s": "ünïcode"}});
    h.producer()
        .enqueue(EnqueueRequest::new("record", payload.clone()))
        .await
        .unwrap();
    drain(&mut worker).await;

    assert_eq!(*seen.lock().unwrap(), vec![payload]);
}

#[tokio::test]
async fn unknown_ids_are_dropped() {
    let h = Harness::new().await;
    let mut worker = h.worker("w1", HandlerRegistry::new());

    h.broker
        .push_tail(&h.layout.work_queue, &JobId::new().to_string())
        .await
        .unwrap();
    h.broker.push_tail(&h.layout.work_queue, "not-an-id").await.unwrap();

    assert_eq!(worker.run_once().await.unwrap(), Some(Outcome::Skipped));
    assert_eq!(worker.run_once().await.unwrap(), Some(Outcome::Skipped));
    assert_eq!(worker.stats().processed, 0);
    assert_eq!(worker.stats().skipped, 2);
}

#[tokio::test]
async fn stale_ids_are_dropped() {
    let h = Harness::new().await;
    let calls = Arc::new(AtomicUsize::new(0));
    let mut worker = h.worker("w1", counting_handlers(calls.clone()));

    let job = h
        .producer()
        .enqueue(EnqueueRequest::new("ok", json!({})))
        .await
        .unwrap();
    drain(&mut worker).await;

    // A duplicate of an id that already completed.
    h.broker
        .push_tail(&h.layout.work_queue, &job.id.to_string())
        .await
        .unwrap();
    assert_eq!(worker.run_once().await.unwrap(), Some(Outcome::Skipped));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn mirror_with_unknown_status_is_not_rerun() {
    let h = Harness::new().await;
    let calls = Arc::new(AtomicUsize::new(0));
    let mut worker = h.worker("w1", counting_handlers(calls.clone()));

    let job = h
        .producer()
        .enqueue(EnqueueRequest::new("ok", json!({})))
        .await
        .unwrap();
    h.broker
        .hash_set(
            &h.layout.mirror_key(&job.id),
            &[("status".to_string(), "archived".to_string())],
        )
        .await
        .unwrap();

    assert_eq!(worker.run_once().await.unwrap(), Some(Outcome::Skipped));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(h.queries().recent(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn missing_mirror_falls_back_to_store() {
    let h = Harness::new().await;
    let calls = Arc::new(AtomicUsize::new(0));
    let mut worker = h.worker("w1", counting_handlers(calls.clone()));

    // Record written to the store only, as if the mirror had been evicted.
    let job = Job::new("ok", json!({"from": "store"}));
    h.store.insert(&job).await.unwrap();
    h.broker
        .push_tail(&h.layout.work_queue, &job.id.to_string())
        .await
        .unwrap();

    assert_eq!(worker.run_once().await.unwrap(), Some(Outcome::Completed));
    let stored = h.store.get(&job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Completed);
}

#[tokio::test]
async fn recent_index_stays_capped() {
    let h = Harness::with_layout(QueueLayout::default().with_recent_cap(5)).await;
    let producer = h.producer();

    let mut ids = Vec::new();
    for i in 0..12 {
        let job = producer
            .enqueue(EnqueueRequest::new("ok", json!({ "i": i })))
            .await
            .unwrap();
        ids.push(job.id);
        assert!(h.broker.list_len(&h.layout.recent).unwrap() <= 5);
    }

    let recent = h.queries().recent(20).await.unwrap();
    let recent_ids: Vec<JobId> = recent.iter().map(|j| j.id).collect();
    let expected: Vec<JobId> = ids.iter().rev().take(5).copied().collect();
    assert_eq!(recent_ids, expected);
}

#[tokio::test]
async fn recent_listing_skips_vanished_mirrors() {
    let h = Harness::new().await;

    let job = h
        .producer()
        .enqueue(EnqueueRequest::new("ok", json!({})))
        .await
        .unwrap();
    h.broker
        .push_head(&h.layout.recent, &JobId::new().to_string())
        .await
        .unwrap();

    let recent = h.queries().recent(20).await.unwrap();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].id, job.id);
}

#[tokio::test]
async fn unknown_and_malformed_ids_are_not_found() {
    let h = Harness::new().await;
    let queries = h.queries();

    for id in [JobId::new().to_string(), "garbage".to_string()] {
        let err = queries.get(&id).await.unwrap_err();
        assert!(matches!(err, jobbox_core::JobError::NotFound(_)));
    }
}

#[tokio::test]
async fn dead_letters_are_listed_newest_first() {
    let h = Harness::new().await;
    let mut worker = h.worker("w1", counting_handlers(Arc::new(AtomicUsize::new(0))));
    let producer = h.producer();

    let first = producer
        .enqueue(EnqueueRequest::new("fail", json!({})).with_max_retries(0))
        .await
        .unwrap();
    let second = producer
        .enqueue(EnqueueRequest::new("fail", json!({})).with_max_retries(0))
        .await
        .unwrap();
    drain(&mut worker).await;

    let dead = h.queries().dead_letters(20).await.unwrap();
    let dead_ids: Vec<JobId> = dead.iter().map(|j| j.id).collect();
    assert_eq!(dead_ids, vec![second.id, first.id]);
    assert!(dead.iter().all(|j| j.status == JobStatus::Failed));
}

#[tokio::test]
async fn send_email_end_to_end() {
    let h = Harness::new().await;
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let handlers = HandlerRegistry::new().with(FnHandler::new("send-email", move |_| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err("smtp unavailable".to_string())
        }
    }));
    let mut worker = h.worker("w1", handlers);
    let mut sub = h.broker.subscribe(&h.layout.events_channel).await.unwrap();

    let request = EnqueueRequest::from_json(&json!({
        "type": "send-email",
        "payload": {"to": "a@b.com"},
        "maxRetries": 1
    }))
    .unwrap();
    let job = h.producer().enqueue(request).await.unwrap();
    drain(&mut worker).await;

    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let stored = h.queries().get(&job.id.to_string()).await.unwrap();
    assert_eq!(stored.status, JobStatus::Failed);

    let failures: Vec<JobEvent> = collect_events(&mut sub)
        .await
        .into_iter()
        .filter(|e| matches!(e, JobEvent::Retrying(_) | JobEvent::DeadLettered(_)))
        .collect();
    assert_eq!(failures.len(), 2);
    assert_eq!(failures[0].job().retry_count, 1);
    assert_eq!(failures[1].job().last_error.as_deref(), Some("smtp unavailable"));

    let dead = h.broker.list_range(&h.layout.dead_letter, 0, 100).await.unwrap();
    assert!(dead.contains(&job.id.to_string()));
}
