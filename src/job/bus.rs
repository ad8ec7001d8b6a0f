//! Per-job event fan-out with bounded, drop-oldest subscriber buffers.
//!
//! `tokio::sync::broadcast` cannot express "drop the oldest event instead of
//! lagging the publisher" on a per-subscriber basis, so subscriber queues are
//! hand-rolled here, the same way the teacher favors a guarded `HashMap` over
//! pulling in a crate for its job table.
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;
use uuid::Uuid;

use crate::observability::metrics::Metrics;

use super::events::Event;

struct Subscriber {
    queue: Mutex<VecDeque<Event>>,
    notify: Notify,
    capacity: usize,
}

impl Subscriber {
    fn new(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity.min(64))),
            notify: Notify::new(),
            capacity,
        }
    }

    /// Pushes `event` onto the queue, dropping the oldest entry if full.
    /// Returns whether an entry was dropped to make room.
    fn push(&self, event: Event) -> bool {
        let mut queue = self.queue.lock().expect("subscriber queue lock");
        let dropped = queue.len() >= self.capacity;
        if dropped {
            queue.pop_front();
        }
        queue.push_back(event);
        drop(queue);
        self.notify.notify_one();
        dropped
    }

    async fn recv(&self) -> Event {
        loop {
            if let Some(event) = self.queue.lock().expect("subscriber queue lock").pop_front() {
                return event;
            }
            self.notify.notified().await;
        }
    }
}

struct JobChannel {
    subscribers: Mutex<Vec<std::sync::Arc<Subscriber>>>,
    last_status: Mutex<Option<Event>>,
}

impl JobChannel {
    fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            last_status: Mutex::new(None),
        }
    }
}

/// A live subscription to one job's event stream.
pub(crate) struct EventSubscription {
    subscriber: std::sync::Arc<Subscriber>,
}

impl EventSubscription {
    pub(crate) async fn recv(&self) -> Event {
        self.subscriber.recv().await
    }
}

/// Fan-out hub for every job's progress events.
pub(crate) struct EventBus {
    jobs: Mutex<HashMap<Uuid, std::sync::Arc<JobChannel>>>,
    buffer_size: usize,
    metrics: Arc<Metrics>,
}

impl EventBus {
    pub(crate) fn new(buffer_size: usize, metrics: Arc<Metrics>) -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            buffer_size,
            metrics,
        }
    }

    fn channel_for(&self, job_id: Uuid) -> std::sync::Arc<JobChannel> {
        let mut jobs = self.jobs.lock().expect("event bus jobs lock");
        std::sync::Arc::clone(
            jobs.entry(job_id)
                .or_insert_with(|| std::sync::Arc::new(JobChannel::new())),
        )
    }

    /// Publish an event to every current subscriber of `job_id`. Never blocks:
    /// a full subscriber queue silently drops its oldest entry.
    pub(crate) fn publish(&self, job_id: Uuid, event: Event) {
        let channel = self.channel_for(job_id);
        if event.event_type == "status_update" {
            *channel.last_status.lock().expect("last_status lock") = Some(event.clone());
        }
        for subscriber in channel.subscribers.lock().expect("subscribers lock").iter() {
            if subscriber.push(event.clone()) {
                self.metrics.event_bus_dropped_total.inc();
            }
        }
    }

    /// Subscribe to `job_id`. The first event the caller receives is a
    /// synthetic replay of the last published `status_update`, if any —
    /// this is what lets a late subscriber catch up.
    pub(crate) fn subscribe(&self, job_id: Uuid) -> EventSubscription {
        let channel = self.channel_for(job_id);
        let subscriber = std::sync::Arc::new(Subscriber::new(self.buffer_size));

        if let Some(snapshot) = channel.last_status.lock().expect("last_status lock").clone() {
            let _ = subscriber.push(snapshot);
        }

        channel
            .subscribers
            .lock()
            .expect("subscribers lock")
            .push(std::sync::Arc::clone(&subscriber));

        EventSubscription { subscriber }
    }

    /// Drop all bus state for a job. Called by the retention sweep once a
    /// terminal job is old enough to be forgotten.
    pub(crate) fn remove_job(&self, job_id: Uuid) {
        self.jobs.lock().expect("event bus jobs lock").remove(&job_id);
    }
}
