//! Broker-side writes shared by producers and workers.

use jobbox_core::{Broker, BrokerError, Job, JobEvent, QueueLayout};

/// Overwrite the job's dispatch mirror with its current fields.
pub(crate) async fn write_mirror<B: Broker>(
    broker: &B,
    layout: &QueueLayout,
    job: &Job,
) -> Result<(), BrokerError> {
    broker
        .hash_set(&layout.mirror_key(&job.id), &job.to_mirror_fields())
        .await
}

/// Broadcast the event matching the job's latest transition.
pub(crate) async fn publish_transition<B: Broker>(
    broker: &B,
    layout: &QueueLayout,
    job: &Job,
) -> Result<JobEvent, BrokerError> {
    let event = JobEvent::from_transition(job);
    let message = event
        .to_message()
        .map_err(|e| BrokerError::Command(format!("encode event: {e}")))?;

    let receivers = broker.publish(&layout.events_channel, &message).await?;
    tracing::debug!(receivers, "{}", event.description());

    Ok(event)
}
