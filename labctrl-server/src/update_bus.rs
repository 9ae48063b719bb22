//! The Update Bus.
//!
//! Grounded on `uwb_hub.rs::process_packet`, which pushes fused position
//! updates onto a bounded queue and, rather than ever awaiting a send that
//! could stall the UDP receive loop, makes room by discarding the packet
//! that has sat there longest. The same rule applies here: a device session
//! publishing an update must never block on a slow or wedged Subscription
//! Manager, so `publish` never awaits — when the queue is at capacity it
//! drops the oldest queued sample (logging a warning) to make room for the
//! new one, rather than dropping the new one itself.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;
use tracing::warn;

use labctrl_core::UpdateEvent;

/// Matches the UWB hub channel size this module is grounded on; large
/// enough to absorb a burst of parameter-changed events from a single
/// command, small enough that a stalled consumer can't accumulate
/// unbounded memory.
pub const DEFAULT_CAPACITY: usize = 64;

struct Inner {
    device_name: String,
    capacity: usize,
    queue: Mutex<VecDeque<UpdateEvent>>,
    notify: Notify,
}

#[derive(Clone)]
pub struct UpdateBus {
    inner: Arc<Inner>,
}

impl UpdateBus {
    pub fn new(device_name: impl Into<String>, capacity: usize) -> (Self, UpdateReceiver) {
        let inner = Arc::new(Inner {
            device_name: device_name.into(),
            capacity,
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            notify: Notify::new(),
        });
        (
            Self {
                inner: inner.clone(),
            },
            UpdateReceiver { inner },
        )
    }

    /// Publish an update. When the queue is already at capacity, the oldest
    /// queued event is dropped to make room rather than rejecting this one.
    pub fn publish(&self, event: UpdateEvent) {
        let mut queue = self.inner.queue.lock().expect("update bus queue poisoned");
        if queue.len() >= self.inner.capacity {
            queue.pop_front();
            warn!(device = %self.inner.device_name, "update bus full, dropping oldest queued event");
        }
        queue.push_back(event);
        drop(queue);
        self.inner.notify.notify_one();
    }
}

/// The consuming half of an `UpdateBus`, handed the same `.recv().await`
/// shape as the `mpsc::Receiver` this module previously used so the
/// fan-out task in `main` needs no change beyond its type.
pub struct UpdateReceiver {
    inner: Arc<Inner>,
}

impl UpdateReceiver {
    pub async fn recv(&mut self) -> Option<UpdateEvent> {
        loop {
            {
                let mut queue = self.inner.queue.lock().expect("update bus queue poisoned");
                if let Some(event) = queue.pop_front() {
                    return Some(event);
                }
            }
            self.inner.notify.notified().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn full_bus_drops_oldest_instead_of_newest() {
        let (bus, mut rx) = UpdateBus::new("stage", 1);
        bus.publish(UpdateEvent::PositionReached { value: 1 });
        // Second publish must return immediately rather than await capacity,
        // and must evict the first sample rather than reject this one.
        bus.publish(UpdateEvent::PositionReached { value: 2 });
        let received = rx.recv().await.unwrap();
        assert!(matches!(received, UpdateEvent::PositionReached { value: 2 }));
    }
}
