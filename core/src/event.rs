//! In-process fan-out of VM lifecycle events to external subscribers.
//!
//! Mirrors the teacher's broadcast-channel event emitter, generalized from a
//! single-box event stream to multi-VM events and extended with the bounded
//! backpressure policy required by the concurrency model: slow subscribers
//! lose events (and a counter records how many) rather than blocking
//! producers.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

/// The kind of lifecycle transition or log line a `VmEvent` reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum VmEventKind {
    Created,
    Starting,
    Running,
    Stopped,
    Crashed { reason: String },
    Log { line: String },
}

/// A single VM lifecycle event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmEvent {
    /// Name of the VM the event concerns.
    pub vm_name: String,
    pub kind: VmEventKind,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl VmEvent {
    pub fn new(vm_name: impl Into<String>, kind: VmEventKind) -> Self {
        Self {
            vm_name: vm_name.into(),
            kind,
            timestamp: chrono::Utc::now(),
        }
    }
}

/// Per-subscriber drop counters, keyed by a monotonically assigned
/// subscriber id. Exposed so operators can see which consumers are falling
/// behind.
#[derive(Debug, Default)]
pub struct DropCounters {
    counters: DashMap<u64, Arc<AtomicU64>>,
}

impl DropCounters {
    fn register(&self) -> (u64, Arc<AtomicU64>) {
        let id = self.counters.len() as u64;
        let counter = Arc::new(AtomicU64::new(0));
        self.counters.insert(id, Arc::clone(&counter));
        (id, counter)
    }

    /// Snapshot of lost-event counts per subscriber id.
    pub fn snapshot(&self) -> HashMap<u64, u64> {
        self.counters
            .iter()
            .map(|entry| (*entry.key(), entry.value().load(Ordering::Relaxed)))
            .collect()
    }
}

/// Bounded, per-VM-ordered event bus.
///
/// Per-VM ordering is a property of the producer: the orchestrator always
/// emits a given VM's events from the single task that owns its supervisor,
/// so `tokio::sync::broadcast`'s FIFO delivery within one sender is
/// sufficient; cross-VM ordering is explicitly not guaranteed by `spec.md`.
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<VmEvent>>,
    capacity: usize,
    drops: Arc<DropCounters>,
}

impl EventBus {
    /// Create a bus with the given per-subscriber channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
            capacity,
            drops: Arc::new(DropCounters::default()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Emit an event. Never blocks; if there are no subscribers this is a
    /// silent no-op (matches `broadcast::Sender::send`'s semantics).
    pub fn emit(&self, event: VmEvent) {
        let _ = self.sender.send(event);
    }

    /// Subscribe to the raw event stream.
    pub fn subscribe(&self) -> EventSubscription {
        let (id, counter) = self.drops.register();
        EventSubscription {
            id,
            receiver: self.sender.subscribe(),
            lost: counter,
        }
    }

    /// Drop counters across all subscribers, for observability.
    pub fn drop_counters(&self) -> HashMap<u64, u64> {
        self.drops.snapshot()
    }
}

/// A subscription handle. Lagging subscribers observe a jump in sequence
/// rather than blocking the bus; the number of skipped events is added to
/// this subscriber's drop counter.
pub struct EventSubscription {
    id: u64,
    receiver: broadcast::Receiver<VmEvent>,
    lost: Arc<AtomicU64>,
}

impl EventSubscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Receive the next event, transparently skipping past any events lost
    /// to lag (and recording how many).
    pub async fn recv(&mut self) -> Option<VmEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    self.lost.fetch_add(skipped, Ordering::Relaxed);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn emits_and_receives_in_order() {
        let bus = EventBus::new(16);
        let mut sub = bus.subscribe();

        bus.emit(VmEvent::new("web", VmEventKind::Created));
        bus.emit(VmEvent::new("web", VmEventKind::Starting));
        bus.emit(VmEvent::new("web", VmEventKind::Running));

        assert_eq!(sub.recv().await.unwrap().kind, VmEventKind::Created);
        assert_eq!(sub.recv().await.unwrap().kind, VmEventKind::Starting);
        assert_eq!(sub.recv().await.unwrap().kind, VmEventKind::Running);
    }

    #[tokio::test]
    async fn multiple_subscribers_each_see_every_event() {
        let bus = EventBus::new(16);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        bus.emit(VmEvent::new("web", VmEventKind::Created));

        assert_eq!(a.recv().await.unwrap().vm_name, "web");
        assert_eq!(b.recv().await.unwrap().vm_name, "web");
    }

    #[tokio::test]
    async fn lagging_subscriber_records_drops_instead_of_blocking() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();

        // Overflow the bounded channel far past its capacity; emit must not
        // block even though nobody is reading yet.
        for _ in 0..10 {
            bus.emit(VmEvent::new("web", VmEventKind::Running));
        }

        // The subscriber can still make progress afterwards.
        let event = sub.recv().await;
        assert!(event.is_some());

        let drops = bus.drop_counters();
        assert!(drops.values().any(|&n| n > 0));
    }

    #[test]
    fn crashed_event_carries_reason() {
        let event = VmEvent::new(
            "web",
            VmEventKind::Crashed {
                reason: "exit code 1".into(),
            },
        );
        match event.kind {
            VmEventKind::Crashed { reason } => assert_eq!(reason, "exit code 1"),
            _ => panic!("expected Crashed"),
        }
    }

    #[test]
    fn event_serializes_with_tag() {
        let event = VmEvent::new("web", VmEventKind::Running);
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"kind\":\"running\""));
        assert!(json.contains("\"vm_name\":\"web\""));
    }
}
